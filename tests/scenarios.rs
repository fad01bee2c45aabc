//! End-to-end scenarios from spec.md §8: seed a heap directly in a
//! [`tagc::testutil::MockVm`]'s real memory mappings, run one full cycle,
//! and inspect the result the way the spec's literal scenarios do.

use tagc::config::GcConfig;
use tagc::driver::{GarbageCollector, StaticRoots};
use tagc::tagging::{with_header_data, ObjectType, PrimaryTag, TaggedWord, TAG_MASK};
use tagc::testutil::{MockThreadSpec, MockVm, MockVmBuilder, ThreadHandle};
use tagc::vm::ThreadState;

fn fixnum(n: i64) -> u64 {
    (n as u64) << 3
}

fn tagged(addr: usize, tag: PrimaryTag) -> u64 {
    (addr as u64 & !TAG_MASK) | tag.bits()
}

unsafe fn write_word(addr: usize, value: u64) {
    *(addr as *mut u64) = value;
}

unsafe fn read_word(addr: usize) -> u64 {
    *(addr as *const u64)
}

fn fresh_roots() -> StaticRoots {
    let nil = TaggedWord::from_address(0, PrimaryTag::Fixnum0);
    StaticRoots {
        nil,
        unbound_value: nil,
        unbound_tls_slot: nil,
        undefined_function: nil,
        closure_trampoline: nil,
    }
}

/// A `MockVm` whose single thread has one extra heap-visible root slot
/// (its TLS range, a single word), so scenario setup can make an
/// arbitrary tagged word reachable without touching `StaticRoots`.
struct RootedVm {
    vm: MockVm,
    config: GcConfig,
    root_cell: Box<u64>,
}

fn build_vm() -> RootedVm {
    let root_cell = Box::new(0u64);
    let root_addr = root_cell.as_ref() as *const u64 as usize;

    let spec = MockThreadSpec {
        obj_addr: 0,
        state: ThreadState::Runnable,
        full_save: false,
        registers: Default::default(),
        stack_triple: (0, 0, 0),
        tls_range: (root_addr, root_addr + 8),
        mv_range: (0, 0),
        known_wired: false,
        siblings: Vec::new(),
    };

    let (vm, config) = MockVmBuilder::new()
        .with_thread(ThreadHandle(0), spec)
        .with_current(ThreadHandle(0))
        .build();

    RootedVm { vm, config, root_cell }
}

/// S1 + S2: `A: cons(B, nil); B: vector[4]{C,D,E,F}` reachable from the
/// root, plus unreachable garbage `G: cons(H, H); H: string "x"` seeded
/// alongside it. After a cycle: A and B are relocated once each,
/// `words_copied == 2 + 5 == 7`, and G/H are never touched.
#[test]
fn s1_s2_reachable_copied_unreachable_left_behind() {
    let root = build_vm();
    let RootedVm { vm, config, root_cell } = root;
    let root_addr = root_cell.as_ref() as *const u64 as usize;
    let cons_base = config.cons_base;
    let general_base = config.general_base;

    // B: vector[4]{10, 20, 30, 40} at general_base.
    unsafe {
        write_word(general_base, with_header_data(ObjectType::ReferenceArray.tag() as u64, 4));
        for i in 0..4u64 {
            write_word(general_base + (i as usize + 1) * 8, fixnum(10 * (i as i64 + 1)));
        }
    }
    let b_addr = general_base;

    // A: cons(B, nil) at cons_base.
    unsafe {
        write_word(cons_base, tagged(b_addr, PrimaryTag::Object));
        write_word(cons_base + 8, fixnum(0));
    }
    let a_addr = cons_base;

    // Unreachable garbage seeded alongside the live structure.
    let h_addr = general_base + 5 * 8;
    unsafe {
        write_word(h_addr, with_header_data(ObjectType::SimpleString.tag() as u64, 1));
        write_word(h_addr + 8, 0);
    }
    let g_addr = cons_base + 16;
    let h_word = tagged(h_addr, PrimaryTag::Object);
    unsafe {
        write_word(g_addr, h_word);
        write_word(g_addr + 8, h_word);
    }

    unsafe { write_word(root_addr, tagged(a_addr, PrimaryTag::Cons)) };

    let gc = GarbageCollector::new(vm, config).unwrap();
    let mut roots = fresh_roots();
    gc.gc(&mut roots).unwrap();

    assert_eq!(gc.stats().objects_copied(), 2);
    assert_eq!(gc.stats().words_copied(), 7);

    let cons_new = tagc::tagging::newspace_base(gc.config().cons_base, gc.cons_area_limit(), gc.dynamic_mark_bit());
    let general_new =
        tagc::tagging::newspace_base(gc.config().general_base, gc.general_area_limit(), gc.dynamic_mark_bit());

    let new_root = TaggedWord::new(unsafe { read_word(root_addr) });
    assert_eq!(new_root.tag(), PrimaryTag::Cons);
    assert_eq!(new_root.pointer_field(), cons_new);

    let new_car = TaggedWord::new(unsafe { read_word(cons_new) });
    assert_eq!(new_car.tag(), PrimaryTag::Object);
    assert_eq!(new_car.pointer_field(), general_new);

    for i in 0..4u64 {
        let slot = unsafe { read_word(general_new + (i as usize + 1) * 8) };
        assert_eq!(slot, fixnum(10 * (i as i64 + 1)));
    }
}

/// S3: cyclic cons structure. `A: cons(nil, B); B: cons(A, A)`, root =
/// `{A}`. After a cycle: exactly one copy of each, `B.car == forwarded(A)`,
/// `words_copied == 4`.
#[test]
fn s3_cyclic_cons_forwards_without_duplication() {
    let root = build_vm();
    let RootedVm { vm, config, root_cell } = root;
    let root_addr = root_cell.as_ref() as *const u64 as usize;
    let cons_base = config.cons_base;

    let a_addr = cons_base;
    let b_addr = cons_base + 16;

    unsafe {
        write_word(a_addr, fixnum(0));
        write_word(a_addr + 8, tagged(b_addr, PrimaryTag::Cons));
        write_word(b_addr, tagged(a_addr, PrimaryTag::Cons));
        write_word(b_addr + 8, tagged(a_addr, PrimaryTag::Cons));
        write_word(root_addr, tagged(a_addr, PrimaryTag::Cons));
    }

    let gc = GarbageCollector::new(vm, config).unwrap();
    let mut roots = fresh_roots();
    gc.gc(&mut roots).unwrap();

    assert_eq!(gc.stats().objects_copied(), 2);
    assert_eq!(gc.stats().words_copied(), 4);

    let cons_new = tagc::tagging::newspace_base(gc.config().cons_base, gc.cons_area_limit(), gc.dynamic_mark_bit());
    let a_new = cons_new;
    let b_new = cons_new + 16;

    let new_root = TaggedWord::new(unsafe { read_word(root_addr) });
    assert_eq!(new_root.pointer_field(), a_new);

    let a_cdr = TaggedWord::new(unsafe { read_word(a_new + 8) });
    assert_eq!(a_cdr.pointer_field(), b_new);

    let b_car = TaggedWord::new(unsafe { read_word(b_new) });
    let b_cdr = TaggedWord::new(unsafe { read_word(b_new + 8) });
    assert_eq!(b_car.pointer_field(), a_new);
    assert_eq!(b_cdr.pointer_field(), a_new);
}

/// S5: weak pointer `W{key: K, value: 0, livep: 1}`, root holds only `W`
/// (not `K`). After a cycle: `W.key == nil`, `W.value == nil`,
/// `livep == 0`.
#[test]
fn s5_weak_pointer_cleared_when_key_unreachable() {
    let root = build_vm();
    let RootedVm { vm, config, root_cell } = root;
    let root_addr = root_cell.as_ref() as *const u64 as usize;
    let general_base = config.general_base;

    // K: a minimal live-looking object, reachable only through W's key
    // slot (which scan_weak_pointer deliberately does not scavenge).
    let k_addr = general_base;
    unsafe {
        write_word(k_addr, with_header_data(ObjectType::ReferenceArray.tag() as u64, 0));
    }

    // W: weak pointer, slots key/value/link/finalizer-link/finalizer/pad.
    let w_addr = general_base + 8;
    unsafe {
        write_word(w_addr, with_header_data(ObjectType::WeakPointer.tag() as u64, tagc::weak::with_livep(0, true)));
        write_word(w_addr + 8, tagged(k_addr, PrimaryTag::Object)); // key
        write_word(w_addr + 16, fixnum(0)); // value
        write_word(w_addr + 24, 0); // link
        write_word(w_addr + 32, 0); // finalizer-link
        write_word(w_addr + 40, 0); // finalizer
        write_word(w_addr + 48, 0); // padding
        write_word(root_addr, tagged(w_addr, PrimaryTag::Object));
    }

    let gc = GarbageCollector::new(vm, config).unwrap();
    let mut roots = fresh_roots();
    gc.gc(&mut roots).unwrap();

    let general_new =
        tagc::tagging::newspace_base(gc.config().general_base, gc.general_area_limit(), gc.dynamic_mark_bit());
    let w_new = general_new; // the only object transported from general this cycle

    let new_root = TaggedWord::new(unsafe { read_word(root_addr) });
    assert_eq!(new_root.pointer_field(), w_new);

    let header = unsafe { read_word(w_new) };
    let data = tagc::tagging::object_header_data(header);
    assert!(!tagc::weak::livep(data));
    assert_eq!(unsafe { read_word(w_new + 8) }, 0); // key cleared
    assert_eq!(unsafe { read_word(w_new + 16) }, 0); // value cleared
}

/// Invariant 4 (mark-bit parity): a reachable pinned object's header bit
/// matches the collector's pinned mark bit after the cycle that reaches
/// it.
#[test]
fn pinned_object_gets_current_mark_bit() {
    let root = build_vm();
    let RootedVm { vm, config, root_cell } = root;
    let root_addr = root_cell.as_ref() as *const u64 as usize;
    let p_addr = config.wired_base;

    unsafe {
        write_word(p_addr, with_header_data(ObjectType::ReferenceArray.tag() as u64, 0));
        write_word(root_addr, tagged(p_addr, PrimaryTag::Object));
    }

    let gc = GarbageCollector::new(vm, config).unwrap();
    let mut roots = fresh_roots();
    gc.gc(&mut roots).unwrap();

    let header = unsafe { read_word(p_addr) };
    assert_eq!(tagc::tagging::pinned_mark_bit(header), gc.pinned_mark_bit());
    assert_eq!(gc.pinned_mark_bit(), 1);

    let new_root = TaggedWord::new(unsafe { read_word(root_addr) });
    assert_eq!(new_root.pointer_field(), p_addr);
}
