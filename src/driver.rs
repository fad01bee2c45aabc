//! Cycle driver (§4.8): orchestrates the flip, root scavenge, drain loop,
//! weak/finalizer pass, region trimming, and VM reprotection.
//!
//! Grounded in `fgc::gc::GarbageCollector`'s shape: a struct owning heap
//! state and stats, a state enum, and `collect()` decomposed into phase
//! methods logged at each boundary. The phase bodies themselves implement
//! spec.md §4.8's thirteen-step sequence rather than the teacher's
//! concurrent mark/relocate cycle.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::logging::{emit, GcEvent};
use crate::pinned::Freelist;
use crate::stats::{GcStats, GcTimer};
use crate::tagging::TaggedWord;
use crate::vm::Vm;
use crate::weak::WeakState;

/// §9 "global mutable state ... An implementation may bundle them in a
/// context object passed explicitly." Bump pointers, scan fingers, and the
/// weak worklist live here, recreated fresh at the top of every cycle
/// (§4.8 step 4 "reset ... to 0", step 3 "clear weak worklist"). The two
/// mark-bit parities are *not* here: they must survive between cycles to
/// encode which half of each copying window is newspace, so they live on
/// [`GarbageCollector`] itself.
pub struct CycleContext {
    pub general_bump: usize,
    pub general_finger: usize,
    pub cons_bump: usize,
    pub cons_finger: usize,
    pub weak_worklist: Vec<TaggedWord>,
}

impl CycleContext {
    pub(crate) fn new(gc_general_base: usize, gc_cons_base: usize, dynamic_mark_bit: u8, area_limits: (usize, usize)) -> Self {
        let general_ns = crate::tagging::newspace_base(gc_general_base, area_limits.0, dynamic_mark_bit);
        let cons_ns = crate::tagging::newspace_base(gc_cons_base, area_limits.1, dynamic_mark_bit);
        Self {
            general_bump: general_ns,
            general_finger: general_ns,
            cons_bump: cons_ns,
            cons_finger: cons_ns,
            weak_worklist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Idle,
    Flipping,
    ScavengingRoots,
    Draining,
    WeakFixpoint,
    RebuildingFreelists,
    Trimming,
}

/// The four named runtime singletons scavenged as static roots (§4.8 step
/// 6). Function references, not addresses, so the embedder supplies their
/// current tagged-word values each cycle.
pub struct StaticRoots {
    pub nil: TaggedWord,
    pub unbound_value: TaggedWord,
    pub unbound_tls_slot: TaggedWord,
    pub undefined_function: TaggedWord,
    pub closure_trampoline: TaggedWord,
}

impl StaticRoots {
    fn each_mut(&mut self) -> [&mut TaggedWord; 5] {
        [
            &mut self.nil,
            &mut self.unbound_value,
            &mut self.unbound_tls_slot,
            &mut self.undefined_function,
            &mut self.closure_trampoline,
        ]
    }
}

pub struct GarbageCollector<V: Vm> {
    vm: V,
    config: GcConfig,
    state: Mutex<GcState>,
    in_progress: AtomicBool,
    dynamic_mark_bit: AtomicU8,
    pinned_mark_bit: AtomicU8,
    general_area_limit: AtomicUsize,
    cons_area_limit: AtomicUsize,
    wired_freelist: Mutex<Freelist>,
    pinned_freelist: Mutex<Freelist>,
    weak_state: Mutex<WeakState>,
    stats: GcStats,
}

impl<V: Vm> GarbageCollector<V> {
    pub fn new(vm: V, config: GcConfig) -> Result<Self> {
        config.validate()?;
        let general_area_limit = config.general_area_limit;
        let cons_area_limit = config.cons_area_limit;
        Ok(Self {
            vm,
            config,
            state: Mutex::new(GcState::Idle),
            in_progress: AtomicBool::new(false),
            dynamic_mark_bit: AtomicU8::new(0),
            pinned_mark_bit: AtomicU8::new(0),
            general_area_limit: AtomicUsize::new(general_area_limit),
            cons_area_limit: AtomicUsize::new(cons_area_limit),
            wired_freelist: Mutex::new(Freelist::default()),
            pinned_freelist: Mutex::new(Freelist::default()),
            weak_state: Mutex::new(WeakState::default()),
            stats: GcStats::new(),
        })
    }

    pub fn vm(&self) -> &V {
        &self.vm
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn state(&self) -> GcState {
        *self.state.lock().unwrap()
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn dynamic_mark_bit(&self) -> u8 {
        self.dynamic_mark_bit.load(Ordering::Relaxed)
    }

    pub fn pinned_mark_bit(&self) -> u8 {
        self.pinned_mark_bit.load(Ordering::Relaxed)
    }

    pub fn general_area_limit(&self) -> usize {
        self.general_area_limit.load(Ordering::Relaxed)
    }

    pub fn cons_area_limit(&self) -> usize {
        self.cons_area_limit.load(Ordering::Relaxed)
    }

    pub(crate) fn weak_state(&self) -> &Mutex<WeakState> {
        &self.weak_state
    }

    /// §4.2 step 3: reserve `padded_words` in the current newspace half of
    /// the general or cons region, bumping the per-cycle cursor.
    pub(crate) fn reserve_newspace(&self, ctx: &mut CycleContext, is_cons: bool, padded_words: usize) -> usize {
        let bump = if is_cons { &mut ctx.cons_bump } else { &mut ctx.general_bump };
        let addr = *bump;
        *bump += padded_words * 8;
        addr
    }

    /// Trigger a full cycle (§4.8). Fails fast per step 1 if a cycle is
    /// already running; everything else is infallible from the caller's
    /// perspective (fatal conditions panic, per §7).
    pub fn gc(&self, roots: &mut StaticRoots) -> Result<()> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            self.in_progress.store(false, Ordering::SeqCst);
            return Err(GcError::AlreadyInProgress);
        }

        let epoch = self.stats.gc_epoch() + 1;
        emit(GcEvent::CycleStart { epoch });
        let timer = GcTimer::start(self.stats.pause_histogram());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.run_cycle(roots);
        }));

        self.in_progress.store(false, Ordering::SeqCst);
        let pause = timer.stop();

        match result {
            Ok(()) => {
                emit(GcEvent::CycleEnd { epoch: self.stats.gc_epoch(), pause });
                Ok(())
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    fn run_cycle(&self, roots: &mut StaticRoots) {
        let mut pending = None;
        // `with_world_stopped` runs the whole cycle body under the
        // supervisor's stop-the-world guarantee (§5 "the world is stopped
        // for the duration of the cycle"). Finalizer invocation is
        // deliberately excluded from that closure (§4.8 step 13, §5:
        // "finalizers run after world restart, on a logically separate
        // context") and happens below, once the world has resumed.
        let vm = &self.vm;
        vm.with_world_stopped(&mut |_vm: &V| {
            pending = Some(self.run_cycle_stopped(roots));
        });
        let pending = pending.expect("with_world_stopped must invoke its callback");

        for entry in &pending {
            self.vm.invoke_finalizer(entry.finalizer, TaggedWord::from_address(entry.object, crate::tagging::PrimaryTag::Object));
        }
        emit(GcEvent::FinalizersRun { count: pending.len() });
    }

    fn run_cycle_stopped(&self, roots: &mut StaticRoots) -> std::collections::VecDeque<crate::weak::PendingFinalizer> {
        // Step 3: reset meters, clear weak worklist (folded into the fresh
        // CycleContext built after the flip).
        self.stats.reset_cycle_meters();

        // Step 4: flip.
        *self.state.lock().unwrap() = GcState::Flipping;
        let new_dynamic = self.dynamic_mark_bit() ^ 1;
        let new_pinned = self.pinned_mark_bit() ^ 1;
        self.dynamic_mark_bit.store(new_dynamic, Ordering::Relaxed);
        self.pinned_mark_bit.store(new_pinned, Ordering::Relaxed);
        emit(GcEvent::Flip { dynamic_mark_bit: new_dynamic, pinned_mark_bit: new_pinned });

        let mut ctx = CycleContext::new(
            self.config.general_base,
            self.config.cons_base,
            new_dynamic,
            (self.general_area_limit(), self.cons_area_limit()),
        );

        // Step 5: reprotect newspace, writable + zero-fill-on-demand.
        let general_ns = crate::tagging::newspace_base(self.config.general_base, self.general_area_limit(), new_dynamic);
        let cons_ns = crate::tagging::newspace_base(self.config.cons_base, self.cons_area_limit(), new_dynamic);
        let flags = crate::vm::ProtectionFlags { present: true, writable: true, zero_fill: true };
        self.vm.protect_memory_range(general_ns, self.general_area_limit(), flags);
        self.vm.protect_memory_range(cons_ns, self.cons_area_limit(), flags);

        // Step 6: scavenge static roots, then the current thread's stack.
        *self.state.lock().unwrap() = GcState::ScavengingRoots;
        for slot in roots.each_mut() {
            *slot = crate::scavenger::scavenge(self, &mut ctx, *slot);
        }
        let current = self.vm.current_thread();
        crate::thread_scan::scan_thread(self, &mut ctx, current);
        for t in self.vm.threads() {
            if t == current {
                continue;
            }
            crate::thread_scan::scan_thread(self, &mut ctx, t);
        }
        emit(GcEvent::RootsScavenged);

        // Step 7: drain, alternating general/cons until both fingers meet
        // their bump pointers.
        *self.state.lock().unwrap() = GcState::Draining;
        crate::scavenger::drain(self, &mut ctx);
        emit(GcEvent::DrainComplete {
            objects_copied: self.stats.objects_copied(),
            words_copied: self.stats.words_copied(),
        });

        // Step 8: weak-pointer fixpoint, finalizer splicing.
        *self.state.lock().unwrap() = GcState::WeakFixpoint;
        let (passes, cleared) = crate::weak::run_fixpoint(self, &mut ctx);
        let pending = {
            let mut weak = self.weak_state.lock().unwrap();
            crate::weak::splice_finalizers(&mut weak);
            std::mem::take(&mut weak.pending)
        };
        emit(GcEvent::WeakFixpoint { passes, cleared });

        // Step 9: unmap oldspace (both regions) — done only after weak
        // work, since key examination reads oldspace headers (§5).
        let general_old = crate::tagging::oldspace_base(self.config.general_base, self.general_area_limit(), new_dynamic);
        let cons_old = crate::tagging::oldspace_base(self.config.cons_base, self.cons_area_limit(), new_dynamic);
        self.vm.release_memory_range(general_old, self.general_area_limit());
        self.vm.release_memory_range(cons_old, self.cons_area_limit());

        // Step 10: rebuild pinned and wired freelists.
        *self.state.lock().unwrap() = GcState::RebuildingFreelists;
        let wired_entries = {
            let mut fl = self.wired_freelist.lock().unwrap();
            crate::pinned::rebuild_freelist(
                &mut fl,
                self.config.wired_base,
                self.config.wired_base + self.config.wired_size,
                new_pinned,
                self.config.paranoid_allocation,
            )
        };
        let pinned_entries = {
            let mut fl = self.pinned_freelist.lock().unwrap();
            crate::pinned::rebuild_freelist(
                &mut fl,
                self.config.pinned_base,
                self.config.pinned_base + self.config.pinned_size,
                new_pinned,
                self.config.paranoid_allocation,
            )
        };
        emit(GcEvent::FreelistsRebuilt { wired_entries, pinned_entries });

        // Step 11: trim newspace to a 2 MiB boundary.
        *self.state.lock().unwrap() = GcState::Trimming;
        let new_general_limit = crate::util::round_up_to_trim_boundary(ctx.general_bump - general_ns).max(8);
        let new_cons_limit = crate::util::round_up_to_trim_boundary(ctx.cons_bump - cons_ns).max(8);
        self.general_area_limit.store(new_general_limit.min(self.config.general_area_limit), Ordering::Relaxed);
        self.cons_area_limit.store(new_cons_limit.min(self.config.cons_area_limit), Ordering::Relaxed);
        emit(GcEvent::Trimmed { new_limit: new_general_limit });

        // Step 12: update memory-expansion-remaining, keeping >= headroom.
        let (free_blocks, _total_blocks) = self.vm.store_statistics();
        let remaining = free_blocks.saturating_sub(self.config.headroom_blocks);
        self.stats.set_memory_expansion_remaining(remaining);

        // Step 13: increment epoch; in-progress flag and world resume are
        // handled by `gc()`'s caller and `with_world_stopped`'s return.
        // Finalizer invocation happens in `run_cycle`, after the world has
        // resumed.
        self.stats.increment_epoch();

        *self.state.lock().unwrap() = GcState::Idle;
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockVm;

    #[test]
    fn new_gc_starts_idle() {
        let (vm, config) = MockVm::new();
        let gc = GarbageCollector::new(vm, config).unwrap();
        assert_eq!(gc.state(), GcState::Idle);
        assert!(!gc.is_in_progress());
        assert_eq!(gc.dynamic_mark_bit(), 0);
    }

    #[test]
    fn rejects_bad_config() {
        let (vm, mut config) = MockVm::new();
        config.wired_size = 0;
        assert!(GarbageCollector::new(vm, config).is_err());
    }
}
