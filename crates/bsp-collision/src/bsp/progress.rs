//! Build progress shared between the builder and observers on other threads.

use std::sync::atomic::{AtomicU32, Ordering};

/// Relative amount `[0, 1]` of tree building work done.
///
/// The builder updates it while [`build`](super::BspTreeBuilder::build)
/// runs; another thread can poll it through a handle obtained from
/// [`BspTreeBuilder::progress_handle`](super::BspTreeBuilder::progress_handle).
#[derive(Debug, Default)]
pub struct BuildProgress {
    bits: AtomicU32,
}

impl BuildProgress {
    /// Creates a progress counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current progress.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, progress: f32) {
        self.bits
            .store(progress.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// Estimates progress from placed vs. still pending polygon fragments.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    placed: usize,
    pending: usize,
    last_logged: f32,
}

impl ProgressTracker {
    pub(crate) fn new(pending: usize) -> Self {
        Self {
            placed: 0,
            pending,
            last_logged: 0.0,
        }
    }

    /// Records that a working set of `taken` polygons was consumed, placing
    /// `placed` of them and passing `forwarded` fragments on to the children.
    pub(crate) fn advance(
        &mut self,
        progress: &BuildProgress,
        taken: usize,
        placed: usize,
        forwarded: usize,
    ) {
        self.pending = self.pending.saturating_sub(taken) + forwarded;
        self.placed += placed;

        let total = self.placed + self.pending;
        if total == 0 {
            return;
        }

        // splits can grow the pending count, so never report going backwards
        let value = (self.placed as f32 / total as f32).max(progress.get());
        progress.set(value);

        if value - self.last_logged > 0.01 {
            tracing::trace!("bsp: building progress {:.0}%", value * 100.0);
            self.last_logged = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_starts_at_zero() {
        assert_eq!(BuildProgress::new().get(), 0.0);
    }

    #[test]
    fn tracker_is_monotonic() {
        let progress = BuildProgress::new();
        let mut tracker = ProgressTracker::new(4);

        tracker.advance(&progress, 4, 2, 2);
        assert!((progress.get() - 0.5).abs() < 1e-6);

        // a split grows the pending set
        tracker.advance(&progress, 1, 0, 2);
        assert!((progress.get() - 0.5).abs() < 1e-6);

        tracker.advance(&progress, 3, 3, 0);
        assert!((progress.get() - 1.0).abs() < 1e-6);
    }
}
