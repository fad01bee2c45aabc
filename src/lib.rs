//! `tagc`: a stop-the-world tag-bit garbage collector.
//!
//! Two heap families:
//!   - **Copying** (general + cons regions): a semispace collector.
//!     Surviving objects are transported from oldspace to newspace during
//!     each cycle; forwarding pointers are written in place, no side table.
//!   - **Mark-sweep** (wired + pinned regions): objects never move.
//!     A cycle marks reachable objects in place and rebuilds a coalescing
//!     freelist by a single linear header walk.
//!
//! The collector is generic over [`vm::Vm`], the trait an embedding
//! runtime implements to supply world-stop, memory protection, thread
//! state, and per-PC GC metadata (§4.9). [`driver::GarbageCollector`] is
//! the crate's entry point; [`driver::GarbageCollector::gc`] runs one full
//! stop-the-world cycle (§4.8).
//!
//! ```ignore
//! use tagc::config::GcConfig;
//! use tagc::driver::{GarbageCollector, StaticRoots};
//!
//! let gc = GarbageCollector::new(my_vm, GcConfig::default())?;
//! let mut roots = StaticRoots { /* ... */ };
//! gc.gc(&mut roots)?;
//! println!("{:?}", gc.stats().summary());
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod pinned;
pub mod scavenger;
pub mod stack;
pub mod stats;
pub mod tagging;
pub mod thread_scan;
pub mod transport;
pub mod util;
pub mod vm;
pub mod weak;

#[cfg(any(test, feature = "test-support"))]
pub mod testutil;

pub use config::GcConfig;
pub use driver::{GarbageCollector, GcState, StaticRoots};
pub use error::{GcError, GcPanic, Result};
pub use stats::{GcStats, GcSummary};
pub use vm::Vm;
