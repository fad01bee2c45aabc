//! Thread scanning (§4.5, §4.5a): per-thread root enumeration, dispatching
//! either to the full-save register/MV path or the ordinary mid-call stack
//! walker.
//!
//! Grounded in `fgc::runtime::safepoint`'s per-thread state machine
//! (dead/partially-initialized/running) for the dispatch shape; the
//! full-save field list and MV-area formula are this spec's §4.5a.

use crate::driver::{CycleContext, GarbageCollector};
use crate::stack::walker::{scavenge_register, walk_stack, FullSaveContext};
use crate::tagging::{PrimaryTag, TaggedWord};
use crate::vm::{RegisterSlot, ThreadState, Vm};

/// §4.5: scan one thread's roots. Always scavenges the thread object's own
/// identity/admin slots first (the thread is itself a heap object, §4.3
/// "Threads: delegate to §4.5"); the rest depends on thread state.
pub fn scan_thread<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, t: V::Thread) {
    let obj_addr = gc.vm().thread_object_addr(t);
    let thread_word = TaggedWord::from_address(obj_addr, PrimaryTag::Object);
    crate::scavenger::scavenge(gc, ctx, thread_word);

    match gc.vm().thread_state(t) {
        ThreadState::Dead => {}
        ThreadState::PartiallyInitialized => {
            // §4.5 "partially-initialized: scavenge only the data
            // registers and the TLS slot range; the stack is not yet
            // meaningful."
            scavenge_data_registers(gc, ctx, t);
            scavenge_range(gc, ctx, gc.vm().thread_tls_slots_range(t));
        }
        ThreadState::Runnable => {
            if gc.vm().thread_stack_known_wired(t) {
                // §4.5: system threads whose stacks transitively reference
                // only wired objects are skipped entirely.
                return;
            }

            scavenge_range(gc, ctx, gc.vm().thread_tls_slots_range(t));

            if gc.vm().thread_full_save_p(t) {
                scan_full_save(gc, ctx, t);
            } else {
                let triple = gc.vm().thread_stack_triple(t);
                walk_stack(gc, ctx, triple, None);
            }
        }
    }
}

fn scavenge_data_registers<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, t: V::Thread) {
    let regs = gc.vm().thread_registers(t);
    for (slot, value) in [
        (RegisterSlot::R8, regs.r8),
        (RegisterSlot::R9, regs.r9),
        (RegisterSlot::R10, regs.r10),
        (RegisterSlot::R11, regs.r11),
        (RegisterSlot::R12, regs.r12),
        (RegisterSlot::R13, regs.r13),
        (RegisterSlot::Rbx, regs.rbx),
    ] {
        scavenge_register(gc, ctx, t, slot, value);
    }
}

fn scavenge_range<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, (start, end): (usize, usize)) {
    let mut addr = start;
    while addr < end {
        crate::scavenger::scavenge_slot(gc, ctx, addr);
        addr += 8;
    }
}

/// §4.5a: a thread interrupted at a precise (full-save) point has its
/// entire register file and MV area live, plus an innermost stack frame
/// that must be walked with that extra context before falling through to
/// ordinary mid-call frames.
fn scan_full_save<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, t: V::Thread) {
    let regs = gc.vm().thread_registers(t);
    let mv_slots = gc.vm().thread_mv_slots_range(t);
    let triple = gc.vm().thread_stack_triple(t);

    let full_save = FullSaveContext { thread: t, registers: &regs, mv_slots };
    walk_stack(gc, ctx, triple, Some(full_save));
}
