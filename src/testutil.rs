//! Test-only [`Vm`] implementation, backed by real anonymous memory
//! mappings rather than a fake in-process simulation — so the scavenger,
//! transport, and stack walker run against genuine addresses exactly as
//! they would under a real embedder.
//!
//! Grounded in `fgc::heap::memory_mapping::MemoryMapping::anonymous`,
//! which also leaves the mapping's address to the kernel rather than
//! pinning it — this harness builds its [`GcConfig`] from whatever
//! addresses the mappings land at, instead of spec.md's fixed example
//! layout.

use std::cell::Cell;
use std::collections::HashMap;

use memmap2::MmapMut;

use crate::config::GcConfig;
use crate::stack::metadata::GcMetadataTable;
use crate::tagging::TaggedWord;
use crate::vm::{ProtectionFlags, RegisterSlot, Registers, ThreadState, Vm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(pub u32);

#[derive(Clone)]
pub struct MockThreadSpec {
    pub obj_addr: usize,
    pub state: ThreadState,
    pub full_save: bool,
    pub registers: Registers,
    /// `(sp, fp, return_pc)`.
    pub stack_triple: (usize, usize, usize),
    pub tls_range: (usize, usize),
    pub mv_range: (usize, usize),
    pub known_wired: bool,
    pub siblings: Vec<ThreadHandle>,
}

impl Default for MockThreadSpec {
    fn default() -> Self {
        Self {
            obj_addr: 0,
            state: ThreadState::Dead,
            full_save: false,
            registers: Registers::default(),
            stack_triple: (0, 0, 0),
            tls_range: (0, 0),
            mv_range: (0, 0),
            known_wired: false,
            siblings: Vec::new(),
        }
    }
}

struct Region {
    mmap: MmapMut,
}

impl Region {
    fn anonymous(size: usize) -> Self {
        Self {
            mmap: MmapMut::map_anon(size).expect("anonymous test mapping"),
        }
    }

    fn base(&self) -> usize {
        self.mmap.as_ptr() as usize
    }
}

/// Builds a [`MockVm`] plus the [`GcConfig`] that matches its actual
/// mapping addresses. Thread/function identities and stack state are
/// fixed at construction; only registers are mutable afterwards, via
/// `Vm::set_thread_register`.
pub struct MockVmBuilder {
    threads: HashMap<ThreadHandle, MockThreadSpec>,
    current: ThreadHandle,
    functions: HashMap<FunctionHandle, FunctionEntry>,
    general_area_limit: usize,
    cons_area_limit: usize,
    wired_size: usize,
    pinned_size: usize,
    paranoid_allocation: bool,
}

struct FunctionEntry {
    base: usize,
    code_len: usize,
    table: GcMetadataTable,
}

impl MockVmBuilder {
    pub fn new() -> Self {
        let mut threads = HashMap::new();
        threads.insert(ThreadHandle(0), MockThreadSpec::default());
        Self {
            threads,
            current: ThreadHandle(0),
            functions: HashMap::new(),
            general_area_limit: 4 * 1024 * 1024,
            cons_area_limit: 2 * 1024 * 1024,
            wired_size: 1024 * 1024,
            pinned_size: 2 * 1024 * 1024,
            paranoid_allocation: true,
        }
    }

    pub fn with_thread(mut self, handle: ThreadHandle, spec: MockThreadSpec) -> Self {
        self.threads.insert(handle, spec);
        self
    }

    pub fn with_current(mut self, handle: ThreadHandle) -> Self {
        self.current = handle;
        self
    }

    pub fn with_function(mut self, handle: FunctionHandle, base: usize, code_len: usize, table: GcMetadataTable) -> Self {
        self.functions.insert(handle, FunctionEntry { base, code_len, table });
        self
    }

    pub fn build(self) -> (MockVm, GcConfig) {
        let general = Region::anonymous(self.general_area_limit * 2);
        let cons = Region::anonymous(self.cons_area_limit * 2);
        let wired = Region::anonymous(self.wired_size);
        let pinned = Region::anonymous(self.pinned_size);

        let config = GcConfig {
            wired_base: wired.base(),
            wired_size: self.wired_size,
            pinned_base: pinned.base(),
            pinned_size: self.pinned_size,
            general_base: general.base(),
            general_area_limit: self.general_area_limit,
            cons_base: cons.base(),
            cons_area_limit: self.cons_area_limit,
            paranoid_allocation: self.paranoid_allocation,
            headroom_blocks: crate::config::DEFAULT_HEADROOM_BLOCKS,
        };

        let registers = self.threads.iter().map(|(h, spec)| (*h, Cell::new(spec.registers))).collect();

        let vm = MockVm {
            _general: general,
            _cons: cons,
            _wired: wired,
            _pinned: pinned,
            threads: self.threads,
            current: self.current,
            functions: self.functions,
            registers,
        };

        (vm, config)
    }
}

pub struct MockVm {
    // Kept only to keep the mappings alive for the lifetime of the VM;
    // every address used by the collector is read out of `GcConfig`
    // instead.
    _general: Region,
    _cons: Region,
    _wired: Region,
    _pinned: Region,
    threads: HashMap<ThreadHandle, MockThreadSpec>,
    current: ThreadHandle,
    functions: HashMap<FunctionHandle, FunctionEntry>,
    /// Registers live in their own cell per thread, separate from the rest
    /// of `MockThreadSpec`, since `Vm::set_thread_register` writes one back
    /// through `&self`.
    registers: HashMap<ThreadHandle, Cell<Registers>>,
}

impl MockVm {
    /// Convenience constructor for tests that don't care about thread or
    /// function setup.
    pub fn new() -> (Self, GcConfig) {
        MockVmBuilder::new().build()
    }

    fn thread(&self, t: ThreadHandle) -> &MockThreadSpec {
        self.threads.get(&t).expect("unregistered thread handle")
    }
}

impl Vm for MockVm {
    type Thread = ThreadHandle;
    type Function = FunctionHandle;

    fn with_world_stopped(&self, f: &mut dyn FnMut(&Self)) {
        // Single-threaded test harness: there is no other thread to halt
        // at a safepoint, so the callback just runs inline.
        f(self);
    }

    fn protect_memory_range(&self, _base: usize, _size: usize, _flags: ProtectionFlags) {
        // Anonymous mappings are already read/write/zero-filled; nothing
        // to flip for a test harness.
    }

    fn release_memory_range(&self, _base: usize, _size: usize) {}

    fn store_statistics(&self) -> (usize, usize) {
        (4096, 8192)
    }

    fn threads(&self) -> Vec<Self::Thread> {
        self.threads.keys().copied().collect()
    }

    fn current_thread(&self) -> Self::Thread {
        self.current
    }

    fn thread_for_object_addr(&self, addr: usize) -> Self::Thread {
        *self
            .threads
            .iter()
            .find(|(_, spec)| spec.obj_addr == addr)
            .map(|(h, _)| h)
            .expect("no thread registered at that object address")
    }

    fn thread_object_addr(&self, t: Self::Thread) -> usize {
        self.thread(t).obj_addr
    }

    fn thread_state(&self, t: Self::Thread) -> ThreadState {
        self.thread(t).state
    }

    fn thread_full_save_p(&self, t: Self::Thread) -> bool {
        self.thread(t).full_save
    }

    fn thread_registers(&self, t: Self::Thread) -> Registers {
        self.registers[&t].get()
    }

    fn set_thread_register(&self, t: Self::Thread, reg: RegisterSlot, value: u64) {
        let cell = &self.registers[&t];
        let mut regs = cell.get();
        match reg {
            RegisterSlot::Rax => regs.rax = value,
            RegisterSlot::Rcx => regs.rcx = value,
            RegisterSlot::Rdx => regs.rdx = value,
            RegisterSlot::Rbx => regs.rbx = value,
            RegisterSlot::R8 => regs.r8 = value,
            RegisterSlot::R9 => regs.r9 = value,
            RegisterSlot::R10 => regs.r10 = value,
            RegisterSlot::R11 => regs.r11 = value,
            RegisterSlot::R12 => regs.r12 = value,
            RegisterSlot::R13 => regs.r13 = value,
        }
        cell.set(regs);
    }

    fn thread_stack_triple(&self, t: Self::Thread) -> (usize, usize, usize) {
        self.thread(t).stack_triple
    }

    fn thread_tls_slots_range(&self, t: Self::Thread) -> (usize, usize) {
        self.thread(t).tls_range
    }

    fn thread_mv_slots_range(&self, t: Self::Thread) -> (usize, usize) {
        self.thread(t).mv_range
    }

    fn thread_siblings(&self, t: Self::Thread) -> Vec<Self::Thread> {
        self.thread(t).siblings.clone()
    }

    fn thread_stack_known_wired(&self, t: Self::Thread) -> bool {
        self.thread(t).known_wired
    }

    fn return_address_to_function(&self, pc: usize) -> Option<Self::Function> {
        self.functions
            .iter()
            .find(|(_, e)| pc >= e.base && pc < e.base + e.code_len)
            .map(|(h, _)| *h)
    }

    fn function_base_address(&self, f: Self::Function) -> usize {
        self.functions[&f].base
    }

    fn function_gc_metadata(&self, f: Self::Function) -> &GcMetadataTable {
        &self.functions[&f].table
    }

    fn debug_print_line(&self, line: &str) {
        eprintln!("[mockvm] {line}");
    }

    fn invoke_finalizer(&self, finalizer: TaggedWord, object: TaggedWord) {
        eprintln!("[mockvm] finalizer {:#x} for object {:#x}", finalizer.0, object.0);
    }
}
