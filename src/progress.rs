//! Progress sinks threaded through every asynchronous conversion step.
//!
//! A conversion reports a single percentage, 0–100. Each step owns a band
//! of that range (rendering 0–40, the provider call 40–100) and reports its
//! own 0–100 progress into a [`Banded`] sink that rescales it. The outermost
//! sink is wrapped in [`Monotonic`] so observers never see progress go
//! backwards, whatever the individual steps emit.
//!
//! Any `Fn(u8) + Send + Sync` closure is a sink:
//!
//! ```rust
//! use pdf2md_queue::progress::{banded, ProgressHandle, ProgressSink};
//! use std::sync::{Arc, atomic::{AtomicU8, Ordering}};
//!
//! let seen = Arc::new(AtomicU8::new(0));
//! let seen_by_sink = Arc::clone(&seen);
//! let sink: ProgressHandle = Arc::new(move |p: u8| seen_by_sink.store(p, Ordering::SeqCst));
//!
//! let render = banded(&sink, 0, 40);
//! render.on_progress(50);
//! assert_eq!(seen.load(Ordering::SeqCst), 20);
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Receives percentage updates from a running conversion.
///
/// Implementations must be `Send + Sync`: the page renderer reports from a
/// blocking thread-pool thread while the provider reports from the async
/// task.
pub trait ProgressSink: Send + Sync {
    /// Called with a percentage in `0..=100`.
    fn on_progress(&self, percent: u8);

    /// Report `done` out of `total` units of work as a percentage.
    fn on_fraction(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let pct = done.min(total) * 100 / total;
        self.on_progress(pct as u8);
    }
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

/// Shared handle to a progress sink.
pub type ProgressHandle = Arc<dyn ProgressSink>;

/// A sink that discards every update.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _percent: u8) {}
}

/// Convenience constructor for a [`NoopProgress`] handle.
pub fn noop() -> ProgressHandle {
    Arc::new(NoopProgress)
}

/// Maps a step's own 0–100 progress into the `[start, end]` band of its parent.
pub struct Banded {
    inner: ProgressHandle,
    start: u8,
    end: u8,
}

impl ProgressSink for Banded {
    fn on_progress(&self, percent: u8) {
        let span = u32::from(self.end - self.start);
        let scaled = u32::from(self.start) + span * u32::from(percent.min(100)) / 100;
        self.inner.on_progress(scaled as u8);
    }
}

/// Wrap `inner` so that 0–100 maps onto `start..=end`.
pub fn banded(inner: &ProgressHandle, start: u8, end: u8) -> ProgressHandle {
    let end = end.min(100);
    let start = start.min(end);
    Arc::new(Banded {
        inner: Arc::clone(inner),
        start,
        end,
    })
}

/// Forwards only values strictly greater than anything seen before.
pub struct Monotonic {
    inner: ProgressHandle,
    high_water: AtomicU8,
}

impl ProgressSink for Monotonic {
    fn on_progress(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.high_water.fetch_max(percent, Ordering::SeqCst);
        if percent > previous {
            self.inner.on_progress(percent);
        }
    }
}

/// Wrap `inner` so it only ever sees non-decreasing values.
pub fn monotonic(inner: ProgressHandle) -> ProgressHandle {
    Arc::new(Monotonic {
        inner,
        high_water: AtomicU8::new(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (ProgressHandle, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: ProgressHandle = Arc::new(move |p: u8| sink_seen.lock().unwrap().push(p));
        (sink, seen)
    }

    #[test]
    fn noop_does_not_panic() {
        let sink = noop();
        sink.on_progress(10);
        sink.on_fraction(1, 3);
        sink.on_fraction(1, 0);
    }

    #[test]
    fn banded_rescales_into_range() {
        let (sink, seen) = recorder();
        let band = banded(&sink, 40, 100);
        band.on_progress(0);
        band.on_progress(50);
        band.on_progress(100);
        assert_eq!(*seen.lock().unwrap(), vec![40, 70, 100]);
    }

    #[test]
    fn fraction_reports_pages_rendered() {
        let (sink, seen) = recorder();
        let band = banded(&sink, 0, 40);
        for done in 1..=4 {
            band.on_fraction(done, 4);
        }
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30, 40]);
    }

    #[test]
    fn monotonic_drops_regressions_and_repeats() {
        let (sink, seen) = recorder();
        let mono = monotonic(sink);
        for p in [10, 30, 20, 30, 95, 100, 100, 150] {
            mono.on_progress(p);
        }
        assert_eq!(*seen.lock().unwrap(), vec![10, 30, 95, 100]);
    }
}
