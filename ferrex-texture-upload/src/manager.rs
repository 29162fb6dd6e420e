//! Per-frame driver of the upload pipeline.
//!
//! Producers submit through an [`UploadSubmitter`] from any thread. The render
//! loop calls [`StreamingManager::tick`] once per frame; the tick keeps the
//! staging backend in sync with the configuration, retires finished work and
//! issues as many uploads as the frame budget admits.

use std::sync::Arc;

use crate::backend::{self, BackendKind, StagingBackend};
use crate::budget::{FrameBudget, FrameBudgetConfig};
use crate::config::{BackendSignature, StreamingConfig};
use crate::context::{GraphicsContext, PixelSource, SubImageUpload};
use crate::error::Result;
use crate::queue::PriorityAdmissionQueue;
use crate::request::{
    PreparedUpload, RejectReason, UploadRequest, prepare,
};
use crate::stats::{StreamingCounters, StreamingDiagnostics};

/// Thread-safe entry point for producers.
#[derive(Debug, Clone)]
pub struct UploadSubmitter {
    queue: Arc<PriorityAdmissionQueue<UploadRequest>>,
    counters: Arc<StreamingCounters>,
}

impl UploadSubmitter {
    /// Queue `request` at its own priority. Never blocks on the GPU.
    pub fn submit(&self, request: UploadRequest) {
        let priority = request.priority;
        self.queue.enqueue(priority, request);
        self.counters.on_enqueued();
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

/// Outcome of one [`StreamingManager::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub uploads: u32,
    pub bytes: u64,
    pub staged: u32,
    pub direct: u32,
    pub rejected: u32,
    pub deferred: u32,
    /// Staged regions or slots released because their fences signaled.
    pub retired: usize,
    pub backend_reset: bool,
}

enum UploadPath {
    Staged,
    Direct,
}

#[derive(Debug)]
pub struct StreamingManager {
    config: StreamingConfig,
    queue: Arc<PriorityAdmissionQueue<UploadRequest>>,
    counters: Arc<StreamingCounters>,
    budget: FrameBudget,
    backend: Option<StagingBackend>,
    /// Signature the current backend state was negotiated for. `None` until
    /// the next tick negotiates; `Some` with no backend means direct-only.
    negotiated: Option<BackendSignature>,
}

impl StreamingManager {
    pub fn new(config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let budget = FrameBudget::new(FrameBudgetConfig::from(&config));
        Ok(Self {
            config,
            queue: Arc::new(PriorityAdmissionQueue::new()),
            counters: Arc::new(StreamingCounters::default()),
            budget,
            backend: None,
            negotiated: None,
        })
    }

    pub fn submitter(&self) -> UploadSubmitter {
        UploadSubmitter {
            queue: Arc::clone(&self.queue),
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn submit(&self, request: UploadRequest) {
        self.submitter().submit(request);
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Replace the configuration. Backend-affecting changes take effect on
    /// the next tick; an invalid config is refused and the old one kept.
    pub fn set_config(&mut self, config: StreamingConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn active_backend(&self) -> BackendKind {
        self.backend
            .as_ref()
            .map_or(BackendKind::Direct, StagingBackend::kind)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drop every queued request without uploading it.
    pub fn clear_pending(&self) -> usize {
        self.queue.clear()
    }

    pub fn diagnostics(&self) -> StreamingDiagnostics {
        let in_flight = self
            .backend
            .as_ref()
            .map_or(0, StagingBackend::in_flight);
        self.counters
            .snapshot(self.queue.len(), in_flight, self.active_backend())
    }

    /// Run one frame's worth of streaming. Render thread only.
    pub fn tick<C: GraphicsContext>(&mut self, ctx: &mut C) -> TickReport {
        let mut report = TickReport {
            backend_reset: self.sync_backend(ctx),
            ..TickReport::default()
        };

        if let Some(backend) = self.backend.as_mut() {
            report.retired = backend.retire(ctx);
        }

        self.budget.begin_frame(FrameBudgetConfig::from(&self.config));
        let mut deferred = None;

        while self.budget.has_headroom() {
            let Some((priority, request)) = self.queue.dequeue() else {
                break;
            };

            let prepared = match prepare(request)
                .and_then(|prepared| self.within_frame_cap(prepared))
            {
                Ok(prepared) => prepared,
                Err(reason) => {
                    log::warn!("dropping texture upload: {}", reason);
                    self.counters.on_rejected();
                    report.rejected += 1;
                    continue;
                }
            };

            let bytes = prepared.byte_count() as u64;
            let path = if self.budget.admits(bytes) {
                self.upload(ctx, &prepared)
            } else {
                None
            };

            match path {
                Some(path) => {
                    self.budget.record_upload(bytes);
                    report.uploads += 1;
                    report.bytes += bytes;
                    match path {
                        UploadPath::Staged => {
                            self.counters.on_staged_upload(bytes);
                            report.staged += 1;
                        }
                        UploadPath::Direct => {
                            self.counters.on_direct_upload(bytes);
                            report.direct += 1;
                        }
                    }
                }
                None => {
                    self.log_deferral(&prepared);
                    self.counters.on_deferred();
                    report.deferred += 1;
                    deferred = Some((priority, prepared.into_request()));
                    break;
                }
            }
        }

        if let Some((priority, request)) = deferred {
            self.queue.requeue_front(priority, request);
        }
        if report.staged > 0 {
            ctx.flush();
        }
        report
    }

    /// Finish outstanding GPU work and release the staging backend. Queued
    /// requests stay queued; the next tick renegotiates.
    pub fn shutdown<C: GraphicsContext>(&mut self, ctx: &mut C) {
        if let Some(backend) = self.backend.take() {
            ctx.finish();
            log::debug!("disposing {} backend on shutdown", backend.kind());
            backend.dispose(ctx);
        }
        self.negotiated = None;
    }

    /// Tear down a stale backend and negotiate a new one if needed. Returns
    /// whether a reset happened.
    fn sync_backend<C: GraphicsContext>(&mut self, ctx: &mut C) -> bool {
        let signature = self.config.backend_signature();
        let mut reset = false;

        if let Some(negotiated) = self.negotiated
            && negotiated != signature
        {
            if let Some(backend) = self.backend.take() {
                log::debug!(
                    "streaming settings changed; resetting {} backend",
                    backend.kind()
                );
                ctx.finish();
                backend.dispose(ctx);
            }
            self.negotiated = None;
            self.counters.on_backend_reset();
            reset = true;
        }

        if self.negotiated.is_none() {
            self.backend = backend::create_with_fallback(&self.config, ctx);
            self.negotiated = Some(signature);
        }
        reset
    }

    /// An upload larger than the per-frame byte cap can never be admitted.
    fn within_frame_cap(
        &self,
        prepared: PreparedUpload,
    ) -> Result<PreparedUpload, RejectReason> {
        let required = prepared.byte_count() as u64;
        let limit = self.config.max_bytes_per_frame;
        if required > limit {
            return Err(RejectReason::ExceedsFrameBudget { required, limit });
        }
        Ok(prepared)
    }

    fn upload<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        prepared: &PreparedUpload,
    ) -> Option<UploadPath> {
        if self.upload_staged(ctx, prepared) {
            return Some(UploadPath::Staged);
        }
        if self.config.allow_direct_uploads && upload_direct(ctx, prepared) {
            return Some(UploadPath::Direct);
        }
        None
    }

    fn upload_staged<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        prepared: &PreparedUpload,
    ) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        let bytes = prepared.byte_count();
        if bytes as u64 > self.config.max_staging_bytes
            || bytes > backend.max_stage_bytes()
        {
            return false;
        }
        let Some(allocation) = backend.try_stage(ctx, prepared.bytes()) else {
            return false;
        };

        let request = prepared.request();
        ctx.bind_texture(request.target, request.texture);
        ctx.bind_unpack_buffer(Some(allocation.buffer));
        ctx.set_pixel_store(prepared.pixel_store());
        let result = ctx.tex_sub_image(&SubImageUpload {
            target: request.target,
            region: request.region,
            format: request.format,
            ty: request.ty,
            source: PixelSource::UnpackBuffer {
                offset: allocation.offset,
                len: allocation.len,
            },
        });
        ctx.bind_unpack_buffer(None);
        // Submit even on failure so the range retires through its fence.
        backend.submit(ctx, allocation);

        match result {
            Ok(()) => {
                log::trace!(
                    "staged {} bytes for texture {} via {} at offset {}",
                    bytes,
                    request.texture.0,
                    backend.kind(),
                    allocation.offset
                );
                true
            }
            Err(err) => {
                log::warn!(
                    "staged upload to texture {} failed: {}",
                    request.texture.0,
                    err
                );
                false
            }
        }
    }

    fn log_deferral(&self, prepared: &PreparedUpload) {
        let bytes = prepared.byte_count() as u64;
        let stageable = self.backend.as_ref().is_some_and(|backend| {
            bytes <= self.config.max_staging_bytes
                && prepared.byte_count() <= backend.max_stage_bytes()
        });
        if !stageable && !self.config.allow_direct_uploads {
            log::warn!(
                "texture {} upload of {} bytes cannot proceed under the \
                 current streaming settings; holding it in the queue",
                prepared.request().texture.0,
                bytes
            );
        } else {
            log::debug!(
                "deferring {} byte upload for texture {} to the next frame",
                bytes,
                prepared.request().texture.0
            );
        }
    }
}

fn upload_direct<C: GraphicsContext>(
    ctx: &mut C,
    prepared: &PreparedUpload,
) -> bool {
    let request = prepared.request();
    ctx.bind_texture(request.target, request.texture);
    ctx.bind_unpack_buffer(None);
    ctx.set_pixel_store(prepared.pixel_store());
    let result = ctx.tex_sub_image(&SubImageUpload {
        target: request.target,
        region: request.region,
        format: request.format,
        ty: request.ty,
        source: PixelSource::Client(prepared.bytes()),
    });
    match result {
        Ok(()) => true,
        Err(err) => {
            log::warn!(
                "direct upload to texture {} failed: {}",
                request.texture.0,
                err
            );
            false
        }
    }
}
