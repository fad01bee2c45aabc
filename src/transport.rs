//! Transport (§4.2): copy a live object from oldspace to newspace,
//! install a forwarding pointer, preserve the original tag.
//!
//! Grounded in `fgc::relocate::copy::ObjectCopier` (`memcpy`-based copy
//! plus meters) and `fgc::relocate::forwarding::ForwardingTable` — except
//! here the forwarding "table" is the tagged-word trick spec.md §9
//! describes ("the second encounter of an oldspace object finds the
//! `gc-forward` tag in its first word"), not a side `HashMap`.

use crate::driver::{CycleContext, GarbageCollector};
use crate::error::GcPanic;
use crate::tagging::{object_size_at, PrimaryTag, TaggedWord};
use crate::util::pad_to_even_words;
use crate::vm::Vm;

/// §4.2 `transport(obj) -> new_obj`.
///
/// # Safety
/// `word` must be tagged `cons` or `object` and its address must lie in
/// oldspace (the scavenger enforces this before calling).
pub unsafe fn transport<V: Vm>(gc: &GarbageCollector<V>, ctx: &mut CycleContext, word: TaggedWord) -> TaggedWord {
    let tag = word.tag();
    debug_assert!(matches!(tag, PrimaryTag::Cons | PrimaryTag::Object));
    let old_addr = word.pointer_field();

    // Step 1: forwarding check — idempotent under repeated invocation.
    let first_word = *(old_addr as *const u64);
    if PrimaryTag::from_bits(first_word) == PrimaryTag::GcForward {
        let new_addr = (first_word & !crate::tagging::TAG_MASK) as usize;
        return TaggedWord::from_address(new_addr, tag);
    }

    // Step 2: compute size.
    let is_cons = tag == PrimaryTag::Cons;
    let size = if is_cons {
        2
    } else {
        object_size_at(old_addr)
    };
    if size == 0 {
        GcPanic::undefined_size(old_addr);
    }

    // Step 3: reserve newspace, padding general-area allocations to an
    // even word count (§3 invariant 4); cons entries are always 2 words.
    let padded = if is_cons { 2 } else { pad_to_even_words(size) };
    let new_addr = gc.reserve_newspace(ctx, is_cons, padded);

    // Step 4: memcpy.
    std::ptr::copy_nonoverlapping(old_addr as *const u64, new_addr as *mut u64, size);
    if padded > size {
        *((new_addr + size * 8) as *mut u64) = 0;
    }

    // Step 5: overwrite the oldspace first word with the forwarding
    // marker.
    *(old_addr as *mut u64) = (new_addr as u64 & !crate::tagging::TAG_MASK) | PrimaryTag::GcForward.bits();

    gc.stats().record_transport(size);
    TaggedWord::from_address(new_addr, tag)
}
