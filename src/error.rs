//! Error handling: recoverable errors as `Result`, fatal GC-invariant
//! violations as panics.
//!
//! Grounded in `fgc::error`'s split between a `thiserror`-derived enum for
//! caller-level failures and diagnostic panics for invariant violations.
//! spec.md §7 is explicit that "no error is recoverable locally" for the
//! GC's own invariants ("either completes a full cycle or halts the
//! system"); only nested invocation and configuration validation are
//! caller-recoverable.

use thiserror::Error;

/// Caller-recoverable errors. Everything else that can go wrong inside a
/// cycle is a panic (see [`GcPanic`]).
#[derive(Debug, Error)]
pub enum GcError {
    #[error("gc() called while a cycle is already in progress")]
    AlreadyInProgress,

    #[error("invalid configuration: {0}")]
    Configuration(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, GcError>;

/// Diagnostic panic helpers for the fatal conditions enumerated in
/// spec.md §7: unrecognized object tag, bad stack metadata, pinned-header
/// mismatch. These are `-> !` functions rather than an error enum because
/// the spec's contract is that none of them are recoverable locally.
pub struct GcPanic;

impl GcPanic {
    /// §4.1 "Errors: transport-error / scan-error on an unrecognized
    /// object tag (fatal, triggers panic)."
    pub fn unrecognized_object_tag(tag: u8, header_addr: usize) -> ! {
        panic!(
            "gc invariant violated: unrecognized object tag {} at header {:#x}",
            tag, header_addr
        )
    }

    /// §4.4 step 3: forbidden field combinations outside full-save frames.
    pub fn bad_stack_metadata(reason: &str, sp: usize, fp: usize, pc: usize) -> ! {
        panic!(
            "gc invariant violated: bad stack metadata ({reason}) at sp={:#x} fp={:#x} pc={:#x}",
            sp, fp, pc
        )
    }

    /// §4.6 `mark_pinned`: cons header not tagged cons, or marking a
    /// freelist entry.
    pub fn pinned_header_mismatch(reason: &str, addr: usize) -> ! {
        panic!("gc invariant violated: pinned header mismatch ({reason}) at {:#x}", addr)
    }

    /// §4.2 step 2: object size undefined for an unknown object tag,
    /// surfaced from `transport` specifically (distinct call site from
    /// `unrecognized_object_tag` so panic messages name the failing phase).
    pub fn undefined_size(addr: usize) -> ! {
        panic!("gc invariant violated: undefined object size at {:#x}", addr)
    }
}
