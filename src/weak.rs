//! Weak pointers and finalizers (§4.7): the Haible/Peyton-Jones fixpoint
//! algorithm for weak-key liveness, plus finalizer scheduling.
//!
//! Grounded in `fgc::object::weak` (`WeakReference`/`ReferenceQueue` shape,
//! a process-wide registry of known weak pointers) and
//! `fgc::runtime::finalizer::Finalizer` (a pending queue drained after the
//! stop-the-world phase, `FinalizerEntry` as object + boxed closure).

use std::collections::VecDeque;

use crate::driver::{CycleContext, GarbageCollector};
use crate::tagging::{object_header_data, with_header_data, AddressRegion, PrimaryTag, TaggedWord};
use crate::vm::Vm;

// Weak pointer slot layout: key(1) value(2) link(3) finalizer-link(4)
// finalizer(5), plus one reserved/padding slot(6) to round the object to
// the fixed size recorded in spec.md §3 ("weak pointer (6)").
const KEY_SLOT: usize = 1;
const VALUE_SLOT: usize = 2;
#[allow(dead_code)]
const LINK_SLOT: usize = 3;
const FINALIZER_LINK_SLOT: usize = 4;
const FINALIZER_SLOT: usize = 5;

fn slot_addr(obj_addr: usize, slot: usize) -> usize {
    obj_addr + slot * 8
}

fn read_slot(obj_addr: usize, slot: usize) -> u64 {
    unsafe { *(slot_addr(obj_addr, slot) as *const u64) }
}

fn write_slot(obj_addr: usize, slot: usize, value: u64) {
    unsafe {
        *(slot_addr(obj_addr, slot) as *mut u64) = value;
    }
}

/// §3 "Its header data field carries a `livep` bit": the low bit of the
/// 56-bit data field.
pub fn livep(header_data: u64) -> bool {
    header_data & 1 != 0
}

pub fn with_livep(header_data: u64, live: bool) -> u64 {
    if live {
        header_data | 1
    } else {
        header_data & !1
    }
}

/// Per-crate state: the set of all known finalizable weak pointers and the
/// queue of finalizers ready to run post-cycle. Kept off `GarbageCollector`
/// as its own mutex-guarded struct so the driver can hand it to the
/// fixpoint/splice functions without borrowing the whole collector
/// mutably.
#[derive(Debug, Default)]
pub struct WeakState {
    /// §4.7 "known-finalizers": every weak pointer that was ever
    /// registered with a finalizer, by object address.
    pub known_finalizers: Vec<usize>,
    /// §4.7 "pending-finalizers": dead weak pointers whose finalizer is
    /// ready to run.
    pub pending: VecDeque<PendingFinalizer>,
}

/// A dead, finalizable weak pointer whose finalizer callable is ready to be
/// invoked. `finalizer` is the raw tagged word read from `FINALIZER_SLOT`;
/// invoking it is the embedder's job ([`Vm::invoke_finalizer`]), since only
/// the embedder knows how to call into a heap-resident callable.
#[derive(Debug, Clone, Copy)]
pub struct PendingFinalizer {
    pub object: usize,
    pub finalizer: TaggedWord,
}

/// §4.3's "Weak pointers: splice onto `weak-pointer-worklist` if the
/// `livep` header bit is set; also scavenge the finalizer-link and
/// finalizer slots" — called from [`crate::scavenger::scan_object`] when a
/// weak pointer is encountered while scanning.
pub fn scan_weak_pointer<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, addr: usize, header_data: u64) {
    if livep(header_data) {
        ctx.weak_worklist.push(TaggedWord::from_address(addr, PrimaryTag::Object));
    }
    crate::scavenger::scavenge_slot(gc, ctx, slot_addr(addr, FINALIZER_LINK_SLOT));
    crate::scavenger::scavenge_slot(gc, ctx, slot_addr(addr, FINALIZER_SLOT));
}

/// §4.7 "Key examination".
fn key_is_live<V: Vm>(gc: &GarbageCollector<V>, key: TaggedWord) -> Option<TaggedWord> {
    if key.is_immediate() {
        return Some(key);
    }
    let addr = key.pointer_field();
    match crate::tagging::address_tag(addr, gc.config()) {
        AddressRegion::General | AddressRegion::Cons => {
            let first_word = unsafe { *(addr as *const u64) };
            if PrimaryTag::from_bits(first_word) == PrimaryTag::GcForward {
                let new_addr = (first_word & !crate::tagging::TAG_MASK) as usize;
                Some(TaggedWord::from_address(new_addr, key.tag()))
            } else {
                None
            }
        }
        AddressRegion::Pinned => {
            let header_addr = if key.tag() == PrimaryTag::Cons { addr - 16 } else { addr };
            let header = unsafe { *(header_addr as *const u64) };
            if crate::tagging::pinned_mark_bit(header) == gc.pinned_mark_bit() {
                Some(key)
            } else {
                None
            }
        }
        AddressRegion::Stack => Some(key),
    }
}

/// §4.7 "Fixpoint". Returns `(passes, keys_cleared)`.
pub fn run_fixpoint<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext) -> (u32, usize) {
    let mut passes: u32 = 0;
    let mut cleared = 0usize;

    loop {
        passes += 1;
        let worklist = std::mem::take(&mut ctx.weak_worklist);
        let mut retained = Vec::with_capacity(worklist.len());
        let mut progressed = false;

        for w in worklist {
            let addr = w.pointer_field();
            let header = unsafe { *(addr as *const u64) };
            let data = object_header_data(header);
            let key = TaggedWord::new(read_slot(addr, KEY_SLOT));

            if let Some(live_key) = key_is_live(gc, key) {
                write_slot(addr, KEY_SLOT, live_key.0);
                crate::scavenger::scavenge_slot(gc, ctx, slot_addr(addr, VALUE_SLOT));
                progressed = true;
                let _ = data;
            } else {
                retained.push(w);
            }
        }

        ctx.weak_worklist = retained;
        if progressed {
            crate::scavenger::drain(gc, ctx);
        } else {
            break;
        }
    }

    // Every survivor's key is truly dead: clear key, value, livep.
    for w in &ctx.weak_worklist {
        let addr = w.pointer_field();
        write_slot(addr, KEY_SLOT, 0);
        write_slot(addr, VALUE_SLOT, 0);
        let header = unsafe { *(addr as *const u64) };
        let data = with_livep(object_header_data(header), false);
        unsafe {
            *(addr as *mut u64) = with_header_data(header, data);
        }
        cleared += 1;
    }

    (passes, cleared)
}

/// §4.7 "Finalizer processing": walk `known-finalizers`, move anything now
/// dead onto `pending-finalizers`. Invocation happens later, after world
/// restart (§4.8 step 13), by draining `state.pending`.
pub fn splice_finalizers(state: &mut WeakState) {
    let mut still_known = Vec::new();

    for addr in state.known_finalizers.drain(..) {
        let header = unsafe { *(addr as *const u64) };
        let data = object_header_data(header);
        if livep(data) {
            still_known.push(addr);
        } else {
            let finalizer = TaggedWord::new(read_slot(addr, FINALIZER_SLOT));
            state.pending.push_back(PendingFinalizer { object: addr, finalizer });
            // Drop the reference from the finalizer slot immediately so
            // the finalized object isn't inadvertently kept alive.
            write_slot(addr, FINALIZER_SLOT, 0);
        }
    }

    state.known_finalizers = still_known;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn livep_roundtrip() {
        let d = with_livep(0x1234, true);
        assert!(livep(d));
        let d2 = with_livep(d, false);
        assert!(!livep(d2));
        assert_eq!(d2 & !1, 0x1234 & !1);
    }
}
