//! Read-only meters exposed by §6: `objects-copied`, `words-copied`,
//! `gc-epoch`, `memory-expansion-remaining`, plus a pause-time histogram.
//! Grounded in `fgc::stats::GcStats` (atomics-backed counters, a
//! `summary()` snapshot struct, a `GcTimer`).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Histogram {
    samples: std::sync::Mutex<Vec<Duration>>,
}

impl Histogram {
    pub fn record(&self, d: Duration) {
        self.samples.lock().unwrap().push(d);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.lock().unwrap().iter().copied().max()
    }

    pub fn mean(&self) -> Option<Duration> {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }
}

/// RAII pause timer, started at `GcTimer::start` and recorded into a
/// histogram on drop or explicit `stop`.
pub struct GcTimer<'a> {
    histogram: &'a Histogram,
    start: Instant,
}

impl<'a> GcTimer<'a> {
    pub fn start(histogram: &'a Histogram) -> Self {
        Self { histogram, start: Instant::now() }
    }

    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        self.histogram.record(elapsed);
        elapsed
    }
}

/// The four read-only meters of §6, plus the pause histogram from §2.1.
/// `objects_copied`/`words_copied` are reset at the top of each cycle
/// (§4.8 step 3 "Reset meters"), so they describe the most recently
/// completed cycle, not a cumulative total.
#[derive(Debug, Default)]
pub struct GcStats {
    objects_copied: AtomicU64,
    words_copied: AtomicU64,
    gc_epoch: AtomicU64,
    memory_expansion_remaining: AtomicUsize,
    pause_histogram: Histogram,
}

impl GcStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_cycle_meters(&self) {
        self.objects_copied.store(0, Ordering::Relaxed);
        self.words_copied.store(0, Ordering::Relaxed);
    }

    pub fn record_transport(&self, size_words: usize) {
        self.objects_copied.fetch_add(1, Ordering::Relaxed);
        self.words_copied.fetch_add(size_words as u64, Ordering::Relaxed);
    }

    pub fn objects_copied(&self) -> u64 {
        self.objects_copied.load(Ordering::Relaxed)
    }

    pub fn words_copied(&self) -> u64 {
        self.words_copied.load(Ordering::Relaxed)
    }

    pub fn gc_epoch(&self) -> u64 {
        self.gc_epoch.load(Ordering::Relaxed)
    }

    pub fn increment_epoch(&self) -> u64 {
        self.gc_epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn memory_expansion_remaining(&self) -> usize {
        self.memory_expansion_remaining.load(Ordering::Relaxed)
    }

    pub fn set_memory_expansion_remaining(&self, value: usize) {
        self.memory_expansion_remaining.store(value, Ordering::Relaxed);
    }

    pub fn pause_histogram(&self) -> &Histogram {
        &self.pause_histogram
    }

    pub fn summary(&self) -> GcSummary {
        GcSummary {
            objects_copied: self.objects_copied(),
            words_copied: self.words_copied(),
            gc_epoch: self.gc_epoch(),
            memory_expansion_remaining: self.memory_expansion_remaining(),
            cycles: self.pause_histogram.count(),
            max_pause: self.pause_histogram.max(),
            mean_pause: self.pause_histogram.mean(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GcSummary {
    pub objects_copied: u64,
    pub words_copied: u64,
    pub gc_epoch: u64,
    pub memory_expansion_remaining: usize,
    pub cycles: usize,
    pub max_pause: Option<Duration>,
    pub mean_pause: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meters_reset_each_cycle() {
        let stats = GcStats::new();
        stats.record_transport(4);
        stats.record_transport(2);
        assert_eq!(stats.objects_copied(), 2);
        assert_eq!(stats.words_copied(), 6);
        stats.reset_cycle_meters();
        assert_eq!(stats.objects_copied(), 0);
        assert_eq!(stats.words_copied(), 0);
    }

    #[test]
    fn epoch_increments() {
        let stats = GcStats::new();
        assert_eq!(stats.increment_epoch(), 1);
        assert_eq!(stats.increment_epoch(), 2);
        assert_eq!(stats.gc_epoch(), 2);
    }

    #[test]
    fn timer_records_into_histogram() {
        let hist = Histogram::default();
        {
            let timer = GcTimer::start(&hist);
            timer.stop();
        }
        assert_eq!(hist.count(), 1);
    }
}
