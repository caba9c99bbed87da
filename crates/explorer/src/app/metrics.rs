use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct LoopMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) tick_time_ms: f32,
    pub(crate) fps: f32,
    pub(crate) frame_time_ms: f32,
}

/// Latest loop rates, written by the update and render threads.
#[derive(Clone, Debug, Default)]
pub(crate) struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub(crate) fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish_ticks(&self, sample: RateSample) {
        self.modify(|snapshot| {
            snapshot.tps = sample.per_second;
            snapshot.tick_time_ms = sample.mean_busy_ms;
        });
    }

    pub(crate) fn publish_frames(&self, sample: RateSample) {
        self.modify(|snapshot| {
            snapshot.fps = sample.per_second;
            snapshot.frame_time_ms = sample.mean_busy_ms;
        });
    }

    fn modify(&self, apply: impl FnOnce(&mut LoopMetricsSnapshot)) {
        match self.snapshot.write() {
            Ok(mut guard) => apply(&mut guard),
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                apply(&mut guard);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RateSample {
    pub(crate) per_second: f32,
    pub(crate) mean_busy_ms: f32,
}

/// Counts events of one loop over a reporting interval.
#[derive(Debug)]
pub(crate) struct RateAccumulator {
    interval_start: Instant,
    interval: Duration,
    events: u32,
    busy_sum: Duration,
}

impl RateAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            interval_start: start,
            interval,
            events: 0,
            busy_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, busy: Duration) {
        self.events = self.events.saturating_add(1);
        self.busy_sum = self.busy_sum.saturating_add(busy);
    }

    pub(crate) fn maybe_sample(&mut self, now: Instant) -> Option<RateSample> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let mean_busy_ms = if self.events == 0 {
            0.0
        } else {
            (self.busy_sum.as_secs_f32() / self.events as f32) * 1000.0
        };
        let sample = RateSample {
            per_second: self.events as f32 / elapsed_seconds,
            mean_busy_ms,
        };

        self.interval_start = now;
        self.events = 0;
        self.busy_sum = Duration::ZERO;

        Some(sample)
    }
}
