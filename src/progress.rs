//! Progress-callback trait for submission events.
//!
//! Inject an `Arc<dyn SubmissionProgress>` via
//! [`crate::ledger::Ledger::with_progress`] to observe a submission as it
//! moves through its states: uploading images, writing the record, done.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a UI spinner, or a log sink without the
//! library knowing how the host application communicates. The trait is
//! `Send + Sync` because image uploads within one submission run
//! concurrently.

use std::sync::Arc;

/// Called by the persistence orchestrator as a submission progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Upload events may fire concurrently from different
/// tasks; implementations must protect shared mutable state.
pub trait SubmissionProgress: Send + Sync {
    /// Called once before any image upload starts.
    fn on_uploads_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when one image reaches the object store.
    fn on_upload_complete(&self, ordinal: usize, total_images: usize, url: &str) {
        let _ = (ordinal, total_images, url);
    }

    /// Called when one image upload fails (non-fatal; the submission
    /// continues without it).
    fn on_upload_error(&self, ordinal: usize, total_images: usize, error: &str) {
        let _ = (ordinal, total_images, error);
    }

    /// Called when the (authoritative) record write begins.
    fn on_write_start(&self) {}

    /// Called once the record is persisted.
    ///
    /// `uploaded`/`failed` report how the image fan-out went; `failed > 0`
    /// means a degraded success, not a failed submission.
    fn on_complete(&self, uploaded: usize, failed: usize) {
        let _ = (uploaded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopSubmissionProgress;

impl SubmissionProgress for NoopSubmissionProgress {}

/// Convenience alias matching the type stored in [`crate::ledger::Ledger`].
pub type ProgressCallback = Arc<dyn SubmissionProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProgress {
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl SubmissionProgress for CountingProgress {
        fn on_upload_complete(&self, _ordinal: usize, _total: usize, _url: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_upload_error(&self, _ordinal: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopSubmissionProgress;
        cb.on_uploads_start(3);
        cb.on_upload_complete(0, 3, "memory://x");
        cb.on_upload_error(1, 3, "boom");
        cb.on_write_start();
        cb.on_complete(2, 1);
    }

    #[test]
    fn counting_callback_receives_events() {
        let cb = CountingProgress::default();
        cb.on_upload_complete(0, 2, "u0");
        cb.on_upload_complete(1, 2, "u1");
        cb.on_upload_error(2, 3, "failed");
        assert_eq!(cb.completes.load(Ordering::SeqCst), 2);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopSubmissionProgress);
        cb.on_uploads_start(1);
        cb.on_complete(1, 0);
    }
}
