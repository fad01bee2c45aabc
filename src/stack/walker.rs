//! Stack walker (§4.4): walk one thread's control stack using per-PC GC
//! metadata to identify live slots, dynamic-extent roots, and incoming
//! arguments.
//!
//! New code — `fgc`'s `marker::stack_scan::StackScanner` is watermark-
//! based (conservative), not precise, so only its struct-naming shape is
//! borrowed; the algorithm itself is this spec's §4.4/§4.5a directly.

use crate::driver::{CycleContext, GarbageCollector};
use crate::error::GcPanic;
use crate::stack::metadata::{ExtraRegisters, GcMetadata, IncomingArguments};
use crate::tagging::{PrimaryTag, TaggedWord};
use crate::vm::{RegisterSlot, Registers, Vm};

/// Registers live at an interrupt-precise point (§4.5a), supplied only
/// when walking a full-save frame. `None` for the ordinary mid-call path
/// (§4.4), where `extra_registers`/`block_or_tagbody_thunk`/
/// `multiple_values`/`:rcx` incoming-arguments are all forbidden by step 3.
pub struct FullSaveContext<'a, V: Vm> {
    pub thread: V::Thread,
    pub registers: &'a Registers,
    pub mv_slots: (usize, usize),
}

/// §4.4: walk a thread's stack starting at `(sp, fp, return_pc)`.
/// `full_save` is `Some` only for the first (innermost) frame of a
/// full-save walk (§4.5a); every frame after that is an ordinary mid-call
/// frame, per §4.5a's final bullet ("continue walking into the caller").
pub fn walk_stack<V: Vm>(
    gc: &GarbageCollector<V>,
    ctx: &mut CycleContext,
    initial: (usize, usize, usize),
    mut full_save: Option<FullSaveContext<'_, V>>,
) {
    let (mut sp, mut fp, mut pc) = initial;

    loop {
        // Termination: "empty return address (zero PC) or zero frame
        // pointer ends the walk."
        if pc == 0 || fp == 0 {
            break;
        }

        let func = gc
            .vm()
            .return_address_to_function(pc)
            .unwrap_or_else(|| GcPanic::bad_stack_metadata("no function for return address", sp, fp, pc));
        let func_base = gc.vm().function_base_address(func);
        let table = gc.vm().function_gc_metadata(func);
        let offset = (pc - func_base) as u32;
        let meta = *table
            .lookup(offset)
            .unwrap_or_else(|| GcPanic::bad_stack_metadata("no gc metadata entry for pc", sp, fp, pc));

        validate_metadata(&meta, full_save.is_some(), sp, fp, pc);

        // Step 4: scavenge the function pointer itself.
        let func_word = TaggedWord::from_address(func_base, PrimaryTag::Object);
        crate::scavenger::scavenge(gc, ctx, func_word);

        // Step 5: layout bitmap, with step 6's dynamic-extent handling.
        scan_layout_bitmap(gc, ctx, &meta, sp, fp);

        // §4.5a: data registers and extra_registers are scavenged
        // unconditionally at a full-save point.
        if let Some(fs) = &full_save {
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R8, fs.registers.r8);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R9, fs.registers.r9);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R10, fs.registers.r10);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R11, fs.registers.r11);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R12, fs.registers.r12);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::R13, fs.registers.r13);
            scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rbx, fs.registers.rbx);
            match meta.extra_registers {
                ExtraRegisters::None => {}
                ExtraRegisters::Rax => scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rax, fs.registers.rax),
                ExtraRegisters::RaxRcx => {
                    scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rax, fs.registers.rax);
                    scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rcx, fs.registers.rcx);
                }
                ExtraRegisters::RaxRcxRdx => {
                    scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rax, fs.registers.rax);
                    scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rcx, fs.registers.rcx);
                    scavenge_register(gc, ctx, fs.thread, RegisterSlot::Rdx, fs.registers.rdx);
                }
            }

            if meta.multiple_values != 0 {
                let (mv_base, mv_end) = fs.mv_slots;
                let mut addr = mv_base;
                while addr < mv_end {
                    crate::scavenger::scavenge_slot(gc, ctx, addr);
                    addr += 8;
                }
            }
        }

        // Step 7: pushed_values, plus §4.5a's register-counted extra.
        let extra_pushed = if meta.pushed_values_register {
            full_save.as_ref().map(|fs| fs.registers.rcx).unwrap_or(0)
        } else {
            0
        };
        let total_pushed = meta.pushed_values as u64 + extra_pushed;
        for i in 0..total_pushed {
            crate::scavenger::scavenge_slot(gc, ctx, sp + (i as usize) * 8);
        }

        // Step 8 / §4.5a incoming arguments.
        match meta.incoming_arguments {
            IncomingArguments::None => {}
            IncomingArguments::StackSlot(k) => {
                let n_args = unsafe { *((sp + k as usize * 8) as *const u64) };
                scavenge_outgoing_args(gc, ctx, pc, n_args);
            }
            IncomingArguments::Rcx => {
                let n_args = full_save.as_ref().map(|fs| fs.registers.rcx).unwrap_or(0);
                scavenge_outgoing_args(gc, ctx, pc, n_args);
            }
        }

        // §4.5a: an NLX thunk buries the live sp/fp inside an info block
        // pointed to by rax; pull them out before advancing.
        let (effective_sp, effective_fp) = if meta.block_or_tagbody_thunk {
            let rax = full_save.as_ref().map(|fs| fs.registers.rax).unwrap_or(0) as usize;
            let nlx_sp = unsafe { *((rax + 16) as *const usize) };
            let nlx_fp = unsafe { *((rax + 24) as *const usize) };
            (nlx_sp, nlx_fp)
        } else {
            (sp, fp)
        };

        // Step 9: advance to the caller, or stop if this frame has no
        // caller (the outermost frame of a thread's call chain).
        if !meta.framep {
            break;
        }
        let new_sp = effective_fp + 16;
        let new_fp = unsafe { *(effective_fp as *const usize) };
        let new_pc = unsafe { *((effective_fp + 8) as *const usize) };
        sp = new_sp;
        fp = new_fp;
        pc = new_pc;

        // Only the innermost frame of a full-save walk carries register
        // state; every caller after that is an ordinary mid-call frame.
        full_save = None;
    }
}

fn validate_metadata(meta: &GcMetadata, is_full_save: bool, sp: usize, fp: usize, pc: usize) {
    if meta.interruptp {
        GcPanic::bad_stack_metadata("interruptp is unsupported in stack frames", sp, fp, pc);
    }
    if !is_full_save && meta.full_save_only_fields_present() {
        GcPanic::bad_stack_metadata("full-save-only metadata fields in a mid-call frame", sp, fp, pc);
    }
}

fn scan_layout_bitmap<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, meta: &GcMetadata, sp: usize, fp: usize) {
    for i in 0..meta.layout_length as usize {
        let byte = unsafe { *((meta.layout_addr + i / 8) as *const u8) };
        if (byte >> (i % 8)) & 1 == 0 {
            continue;
        }
        let addr = if meta.framep { fp - (i + 1) * 8 } else { sp + i * 8 };
        let value = unsafe { *(addr as *const u64) };
        let tagged = TaggedWord::new(value);

        if tagged.tag() == PrimaryTag::DxRootObject {
            // Step 6: dynamic-extent root. Guard against a dangling slot
            // left by an in-progress nonlocal exit (§9 "Partial NLX"):
            // `payload_addr >= sp` is the sole guard.
            let payload_addr = tagged.pointer_field();
            if payload_addr >= sp {
                let payload = TaggedWord::from_address(payload_addr, PrimaryTag::Object);
                crate::scavenger::scan(gc, ctx, payload);
            }
            // Never scavenge/overwrite the dx-root slot itself.
        } else {
            crate::scavenger::scavenge_slot(gc, ctx, addr);
        }
    }
}

/// Scavenges one register's value and, if the scavenge forwarded it to a
/// new address, writes the new value back into the thread's real register
/// file (§4.5a) — a register is as much a root as a stack slot, and must
/// not keep pointing at an oldspace address once the oldspace is
/// unmapped.
pub(crate) fn scavenge_register<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, t: V::Thread, reg: RegisterSlot, value: u64) {
    let new = crate::scavenger::scavenge(gc, ctx, TaggedWord::new(value));
    if new.0 != value {
        gc.vm().set_thread_register(t, reg, new.0);
    }
}

/// §4.4 step 8 / §4.5a: `scavenge max(0, n_args - 5) slots in the
/// caller's outgoing-args strip above the return address`.
fn scavenge_outgoing_args<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, return_pc: usize, n_args: u64) {
    let extra = n_args.saturating_sub(5);
    let strip_base = return_pc + 8;
    for i in 0..extra {
        crate::scavenger::scavenge_slot(gc, ctx, strip_base + (i as usize) * 8);
    }
}
