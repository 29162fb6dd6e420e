use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::BackendKind;

/// Read-only view of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingDiagnostics {
    pub enqueued: u64,
    pub uploaded: u64,
    pub uploaded_bytes: u64,
    pub staged_uploads: u64,
    pub fallback_uploads: u64,
    pub dropped_invalid: u64,
    pub deferred: u64,
    pub backend_resets: u64,
    /// Requests waiting in the admission queue.
    pub pending: usize,
    /// Staged regions whose fences have not been observed yet.
    pub in_flight: usize,
    pub active_backend: BackendKind,
}

/// Monotonic counters. Producers bump `enqueued` from any thread; everything
/// else is written by the render thread.
#[derive(Debug, Default)]
pub struct StreamingCounters {
    enqueued: AtomicU64,
    uploaded: AtomicU64,
    uploaded_bytes: AtomicU64,
    staged_uploads: AtomicU64,
    fallback_uploads: AtomicU64,
    dropped_invalid: AtomicU64,
    deferred: AtomicU64,
    backend_resets: AtomicU64,
}

impl StreamingCounters {
    pub fn on_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_staged_upload(&self, bytes: u64) {
        self.staged_uploads.fetch_add(1, Ordering::Relaxed);
        self.on_uploaded(bytes);
    }

    pub fn on_direct_upload(&self, bytes: u64) {
        self.fallback_uploads.fetch_add(1, Ordering::Relaxed);
        self.on_uploaded(bytes);
    }

    fn on_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn on_rejected(&self) {
        self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_deferred(&self) {
        self.deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_backend_reset(&self) {
        self.backend_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        pending: usize,
        in_flight: usize,
        active_backend: BackendKind,
    ) -> StreamingDiagnostics {
        StreamingDiagnostics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            staged_uploads: self.staged_uploads.load(Ordering::Relaxed),
            fallback_uploads: self.fallback_uploads.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            backend_resets: self.backend_resets.load(Ordering::Relaxed),
            pending,
            in_flight,
            active_backend,
        }
    }
}
