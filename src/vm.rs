//! The supervisor/runtime boundary (§4.9, §6): every interface this crate
//! consumes from its embedder, expressed as a single trait the collector
//! is generic over.
//!
//! Grounded in `mmtk-mmtk-core`'s `VMBinding` pattern (a collector generic
//! over an embedder-supplied trait) since `fgc` owns its heap concretely
//! and has no analogous abstraction to generalize. `panic` from §6 is not
//! a callback here: every fatal condition in §7 is a Rust `panic!` (see
//! [`crate::error::GcPanic`]).

use crate::stack::metadata::GcMetadataTable;
use crate::tagging::TaggedWord;

/// §6: `protect_memory_range` flags ("present/writable/zero-fill").
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionFlags {
    pub present: bool,
    pub writable: bool,
    pub zero_fill: bool,
}

/// §6 thread accessors: "state (`:dead`, 0 for partially-initialized, or
/// runnable)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Dead,
    PartiallyInitialized,
    Runnable,
}

/// §6 "register-value accessors (`rax`, `rcx`, `rdx`, `r8..r13`, `rbx`)".
/// Stored as tagged words since every one of these is a potential root.
#[derive(Debug, Clone, Copy, Default)]
pub struct Registers {
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rbx: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
}

/// Identifies a function object for per-PC metadata lookup; opaque to this
/// crate beyond what `Vm::function_base_address` reveals.
pub trait VmFunction: Copy {}
impl<T: Copy> VmFunction for T {}

/// Names one field of [`Registers`], for [`Vm::set_thread_register`]'s
/// write-back of a scavenged (possibly forwarded) register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSlot {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
}

/// The full supervisor/runtime boundary. A managed-runtime embedder
/// implements this once; every collector component is generic over it.
pub trait Vm: Sized {
    type Thread: Copy + Eq + std::hash::Hash;
    type Function: Copy;

    /// §6 `with_world_stopped(fn)`: runs `f` with all other threads
    /// halted at safepoints.
    fn with_world_stopped(&self, f: &mut dyn FnMut(&Self));

    fn protect_memory_range(&self, base: usize, size: usize, flags: ProtectionFlags);
    fn release_memory_range(&self, base: usize, size: usize);

    /// §6 `store_statistics() -> (free_blocks, total_blocks)`.
    fn store_statistics(&self) -> (usize, usize);

    fn threads(&self) -> Vec<Self::Thread>;
    fn current_thread(&self) -> Self::Thread;
    /// Map a thread object's heap address (encountered while scanning,
    /// §4.3 "Threads: delegate to §4.5") back to its thread handle.
    fn thread_for_object_addr(&self, addr: usize) -> Self::Thread;

    fn thread_object_addr(&self, t: Self::Thread) -> usize;
    fn thread_state(&self, t: Self::Thread) -> ThreadState;
    fn thread_full_save_p(&self, t: Self::Thread) -> bool;
    fn thread_registers(&self, t: Self::Thread) -> Registers;
    /// Writes a scavenged value back into a thread's real register file
    /// (§4.5a: a register holding the only reference to an object must be
    /// updated to the transported address, or it dangles after the flip).
    fn set_thread_register(&self, t: Self::Thread, reg: RegisterSlot, value: u64);
    /// `(sp, fp, return_pc)` for the mid-call walker entry (§4.5 "read
    /// `(sp, fp, *sp)` as the initial walker triple").
    fn thread_stack_triple(&self, t: Self::Thread) -> (usize, usize, usize);
    fn thread_tls_slots_range(&self, t: Self::Thread) -> (usize, usize);
    fn thread_mv_slots_range(&self, t: Self::Thread) -> (usize, usize);
    fn thread_siblings(&self, t: Self::Thread) -> Vec<Self::Thread>;
    /// §4.5: "a small, named set of system threads whose stacks are
    /// guaranteed to reference only wired objects transitively".
    fn thread_stack_known_wired(&self, t: Self::Thread) -> bool;

    /// §6 `return_address_to_function(pc) -> function`.
    fn return_address_to_function(&self, pc: usize) -> Option<Self::Function>;
    fn function_base_address(&self, f: Self::Function) -> usize;
    /// §6 `map_function_gc_metadata(fn, callback)`, realized as a handle
    /// to the sorted table rather than a callback (§4.4 step 2 / §9).
    fn function_gc_metadata(&self, f: Self::Function) -> &GcMetadataTable;

    fn debug_print_line(&self, line: &str);

    /// §4.7 "invoke each pending finalizer": called once per dead,
    /// finalizable weak pointer, after the world has resumed (§4.8 step
    /// 13). `finalizer` is the tagged callable read from the weak
    /// pointer's finalizer slot; `object` is the (already-transported, if
    /// applicable) object that died.
    fn invoke_finalizer(&self, finalizer: TaggedWord, object: TaggedWord);
}
