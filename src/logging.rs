//! Cycle-level narration: a typed event enum logged through the `log`
//! facade, mirroring `fgc::logging`'s `GcEvent`/`LogLevel` shape. Deeper
//! modules (walker, scavenger) call `log::{debug,warn}!` directly at their
//! own call sites, same split as the teacher.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Narration points through one `gc()` invocation, logged at `Info` unless
/// noted. Named after the driver steps of spec.md §4.8.
#[derive(Debug, Clone)]
pub enum GcEvent {
    CycleStart { epoch: u64 },
    Flip { dynamic_mark_bit: u8, pinned_mark_bit: u8 },
    RootsScavenged,
    DrainComplete { objects_copied: u64, words_copied: u64 },
    WeakFixpoint { passes: u32, cleared: usize },
    FreelistsRebuilt { wired_entries: usize, pinned_entries: usize },
    Trimmed { new_limit: usize },
    CycleEnd { epoch: u64, pause: std::time::Duration },
    FinalizersRun { count: usize },
}

impl fmt::Display for GcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcEvent::CycleStart { epoch } => write!(f, "gc cycle {epoch} starting"),
            GcEvent::Flip { dynamic_mark_bit, pinned_mark_bit } => {
                write!(f, "flipped mark bits: dynamic={dynamic_mark_bit} pinned={pinned_mark_bit}")
            }
            GcEvent::RootsScavenged => write!(f, "static roots and current thread stack scavenged"),
            GcEvent::DrainComplete { objects_copied, words_copied } => {
                write!(f, "drain complete: {objects_copied} objects, {words_copied} words copied")
            }
            GcEvent::WeakFixpoint { passes, cleared } => {
                write!(f, "weak fixpoint: {passes} passes, {cleared} keys cleared")
            }
            GcEvent::FreelistsRebuilt { wired_entries, pinned_entries } => {
                write!(f, "freelists rebuilt: wired={wired_entries} pinned={pinned_entries}")
            }
            GcEvent::Trimmed { new_limit } => write!(f, "newspace trimmed to {new_limit:#x}"),
            GcEvent::CycleEnd { epoch, pause } => {
                write!(f, "gc cycle {epoch} complete in {:.3}ms", pause.as_secs_f64() * 1000.0)
            }
            GcEvent::FinalizersRun { count } => write!(f, "ran {count} finalizers"),
        }
    }
}

pub fn emit(event: GcEvent) {
    log::info!("{event}");
}
