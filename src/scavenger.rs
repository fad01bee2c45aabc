//! Scavenger (§4.3): update a single slot, or walk all of an object's
//! reference slots, dispatching on tag/type; plus the drain loop (§4.8
//! step 7) that keeps scanning newly-transported objects until both
//! newspace fingers catch up to their bump pointers.
//!
//! Grounded in the dispatch shape of `fgc`'s object scanner, generalized
//! from FGC's mark-and-sweep object graph to this spec's tag/type matrix.
//! §9 calls dense-switch dispatch on the 6-bit tag "the expected
//! implementation"; `match` on [`ObjectType`] here is exactly that (rustc
//! lowers a dense integer match to a jump table).

use crate::driver::{CycleContext, GarbageCollector};
use crate::error::GcPanic;
use crate::tagging::{
    decode_function_header, object_header_data, object_size_at, object_tag, AddressRegion, ObjectType, PrimaryTag,
    TaggedWord,
};
use crate::util::pad_to_even_words;
use crate::vm::Vm;
use crate::weak;

/// §4.3 `scavenge(w) -> w'`.
pub fn scavenge<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, w: TaggedWord) -> TaggedWord {
    if w.is_immediate() {
        return w;
    }
    match w.tag() {
        PrimaryTag::Cons | PrimaryTag::Object => {
            let addr = w.pointer_field();
            match crate::tagging::address_tag(addr, gc.config()) {
                AddressRegion::General => scavenge_copying(gc, ctx, w, addr, gc.config().general_base, gc.general_area_limit(), false),
                AddressRegion::Cons => scavenge_copying(gc, ctx, w, addr, gc.config().cons_base, gc.cons_area_limit(), true),
                AddressRegion::Pinned => {
                    crate::pinned::mark_pinned(gc, ctx, w);
                    w
                }
                // Stack pointers are handled during the stack walk itself
                // (§4.3's last bullet); nothing to do here.
                AddressRegion::Stack => w,
            }
        }
        // gc-forward and dx-root-object never appear as ordinary slot
        // values outside transport/stack-walking, which handle them
        // directly.
        _ => w,
    }
}

fn scavenge_copying<V: Vm>(
    gc: &GarbageCollector<V>,
    ctx: &mut CycleContext,
    w: TaggedWord,
    addr: usize,
    region_base: usize,
    area_limit: usize,
    is_cons: bool,
) -> TaggedWord {
    let offset = addr - region_base;
    if crate::tagging::is_newspace_offset(offset, area_limit, gc.dynamic_mark_bit()) {
        w
    } else {
        let _ = is_cons;
        unsafe { crate::transport::transport(gc, ctx, w) }
    }
}

/// §4.3 `scavenge_slot(addr, i)` — read-modify-write, writing only if the
/// value changed (§5: avoids a spurious store concurrent with e.g. a
/// debugger sampling the slot).
pub fn scavenge_slot<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, slot_addr: usize) {
    let old = unsafe { *(slot_addr as *const u64) };
    let new = scavenge(gc, ctx, TaggedWord::new(old)).0;
    if new != old {
        unsafe {
            *(slot_addr as *mut u64) = new;
        }
    }
}

/// §4.3 `scan(obj)` — walk an object's reference slots, dispatching on
/// type. Slot counts for fixed-size types are read as "data slots after
/// the header" (see DESIGN.md for how this reconciles §3's parenthetical
/// sizes with this section's slot counts).
pub fn scan<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, obj: TaggedWord) {
    match obj.tag() {
        PrimaryTag::Cons => {
            let addr = obj.pointer_field();
            scavenge_slot(gc, ctx, addr);
            scavenge_slot(gc, ctx, addr + 8);
        }
        PrimaryTag::Object => scan_object(gc, ctx, obj.pointer_field()),
        _ => {}
    }
}

fn scan_slots<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, addr: usize, count: usize) {
    for i in 1..=count {
        scavenge_slot(gc, ctx, addr + i * 8);
    }
}

fn scan_object<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, addr: usize) {
    let header = unsafe { *(addr as *const u64) };
    let tag = object_tag(header);
    let ty = ObjectType::from_tag(tag).unwrap_or_else(|| GcPanic::unrecognized_object_tag(tag, addr));
    let data = object_header_data(header);

    use ObjectType::*;
    match ty {
        ReferenceArray | StructureInstance => scan_slots(gc, ctx, addr, data as usize),
        Symbol => scan_slots(gc, ctx, addr, 6),
        StandardInstance | FunctionReference | SimpleArray => scan_slots(gc, ctx, addr, 4),
        Complex | Ratio => scan_slots(gc, ctx, addr, 3),
        Function => {
            let f = decode_function_header(data);
            let pool_base = crate::util::round_up(addr + f.mc_size_bytes as usize, 8);
            for i in 0..f.pool_length_words as usize {
                scavenge_slot(gc, ctx, pool_base + i * 8);
            }
        }
        Thread => {
            let t = gc.vm().thread_for_object_addr(addr);
            crate::thread_scan::scan_thread(gc, ctx, t);
        }
        WeakPointer => weak::scan_weak_pointer(gc, ctx, addr, data),
        // True leaf types: no reference slots (§4.3's last bullet).
        NumericArray | SimpleString | Bignum | DoubleFloat | SimdVector | UnboundValue => {}
        FreelistEntry => {}
    }
}

/// §4.8 step 7: drain both newspace regions until their fingers meet their
/// bump pointers.
pub fn drain<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext) {
    loop {
        let mut advanced = false;

        if ctx.general_finger < ctx.general_bump {
            let addr = ctx.general_finger;
            let size = unsafe { object_size_at(addr) };
            let padded = pad_to_even_words(size);
            scan(gc, ctx, TaggedWord::from_address(addr, PrimaryTag::Object));
            ctx.general_finger += padded * 8;
            advanced = true;
        }

        if ctx.cons_finger < ctx.cons_bump {
            let addr = ctx.cons_finger;
            scan(gc, ctx, TaggedWord::from_address(addr, PrimaryTag::Cons));
            ctx.cons_finger += 16;
            advanced = true;
        }

        if !advanced {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::GarbageCollector;
    use crate::tagging::PrimaryTag;
    use crate::testutil::MockVm;

    fn fresh_gc() -> GarbageCollector<MockVm> {
        let (vm, config) = MockVm::new();
        GarbageCollector::new(vm, config).unwrap()
    }

    #[test]
    fn scavenge_immediate_is_identity() {
        let gc = fresh_gc();
        let mut ctx = CycleContext::new(gc.config().general_base, gc.config().cons_base, 0, (gc.general_area_limit(), gc.cons_area_limit()));
        let fixnum = TaggedWord::from_address(42 << 3, PrimaryTag::Fixnum0);
        assert_eq!(scavenge(&gc, &mut ctx, fixnum), fixnum);
    }
}
