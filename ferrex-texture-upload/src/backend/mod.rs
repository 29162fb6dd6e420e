//! Staging backends and their negotiation.
//!
//! At most one staging backend is live at a time. The preferred order is the
//! persistent-mapped ring, then triple buffering; when neither can be built
//! (or streaming is disabled) uploads go straight from client memory.

pub mod ring;
pub mod triple;

use std::fmt;

pub use ring::{PersistentRingBackend, RingAllocator, RingRange};
pub use triple::{TRIPLE_BUFFER_SLOTS, TripleBufferBackend};

use crate::config::StreamingConfig;
use crate::context::{BufferId, GraphicsContext};
use crate::error::BackendError;

/// Which upload path is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    PersistentRing,
    TripleBuffer,
    /// No staging backend; uploads read client memory directly.
    #[default]
    Direct,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::PersistentRing => "persistent-ring",
            BackendKind::TripleBuffer => "triple-buffer",
            BackendKind::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// Where a payload was staged, valid until the matching submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingAllocation {
    pub buffer: BufferId,
    pub offset: usize,
    /// Bytes reserved, including alignment padding.
    pub size: usize,
    /// Payload bytes actually written.
    pub len: usize,
    /// Triple-buffer slot; `None` for the ring.
    pub slot: Option<usize>,
}

/// The live staging backend.
#[derive(Debug)]
pub enum StagingBackend {
    PersistentRing(PersistentRingBackend),
    TripleBuffer(TripleBufferBackend),
}

impl StagingBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            StagingBackend::PersistentRing(_) => BackendKind::PersistentRing,
            StagingBackend::TripleBuffer(_) => BackendKind::TripleBuffer,
        }
    }

    /// Largest payload that could ever fit in one staging allocation.
    pub fn max_stage_bytes(&self) -> usize {
        match self {
            StagingBackend::PersistentRing(ring) => ring.capacity(),
            StagingBackend::TripleBuffer(triple) => triple.slot_bytes(),
        }
    }

    pub fn try_stage<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        bytes: &[u8],
    ) -> Option<StagingAllocation> {
        match self {
            StagingBackend::PersistentRing(ring) => {
                ring.try_stage(ctx, bytes)
            }
            StagingBackend::TripleBuffer(triple) => {
                triple.try_stage(ctx, bytes)
            }
        }
    }

    pub fn submit<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        allocation: StagingAllocation,
    ) {
        match self {
            StagingBackend::PersistentRing(ring) => {
                ring.submit(ctx, allocation)
            }
            StagingBackend::TripleBuffer(triple) => {
                triple.submit(ctx, allocation)
            }
        }
    }

    pub fn retire<C: GraphicsContext>(&mut self, ctx: &mut C) -> usize {
        match self {
            StagingBackend::PersistentRing(ring) => ring.retire(ctx),
            StagingBackend::TripleBuffer(triple) => triple.retire(ctx),
        }
    }

    pub fn in_flight(&self) -> usize {
        match self {
            StagingBackend::PersistentRing(ring) => ring.in_flight(),
            StagingBackend::TripleBuffer(triple) => triple.in_flight(),
        }
    }

    /// Release all GPU objects. Callers drain the pipeline first.
    pub fn dispose<C: GraphicsContext>(self, ctx: &mut C) {
        match self {
            StagingBackend::PersistentRing(ring) => ring.dispose(ctx),
            StagingBackend::TripleBuffer(triple) => triple.dispose(ctx),
        }
    }
}

/// Pick the preferred path for `config` on this context, without creating
/// anything.
pub fn negotiate_backend<C: GraphicsContext>(
    config: &StreamingConfig,
    ctx: &C,
) -> BackendKind {
    if !config.enable_pbo_streaming {
        BackendKind::Direct
    } else if !config.force_disable_persistent
        && ctx.supports_persistent_mapping()
    {
        BackendKind::PersistentRing
    } else {
        BackendKind::TripleBuffer
    }
}

fn create_backend<C: GraphicsContext>(
    kind: BackendKind,
    config: &StreamingConfig,
    ctx: &mut C,
) -> Result<Option<StagingBackend>, BackendError> {
    Ok(match kind {
        BackendKind::PersistentRing => Some(StagingBackend::PersistentRing(
            PersistentRingBackend::create(
                ctx,
                byte_size(config.persistent_ring_bytes),
                byte_size(config.pbo_alignment),
                config.use_coherent_mapping,
            )?,
        )),
        BackendKind::TripleBuffer => Some(StagingBackend::TripleBuffer(
            TripleBufferBackend::create(
                ctx,
                byte_size(config.triple_buffer_bytes),
            )?,
        )),
        BackendKind::Direct => None,
    })
}

/// Build the best backend that actually works, walking ring -> triple ->
/// direct. `None` means direct uploads only.
pub fn create_with_fallback<C: GraphicsContext>(
    config: &StreamingConfig,
    ctx: &mut C,
) -> Option<StagingBackend> {
    let mut kind = negotiate_backend(config, ctx);
    loop {
        match create_backend(kind, config, ctx) {
            Ok(backend) => {
                log::info!("texture streaming backend: {}", kind);
                return backend;
            }
            Err(err) => {
                let next = match kind {
                    BackendKind::PersistentRing => BackendKind::TripleBuffer,
                    _ => BackendKind::Direct,
                };
                log::warn!(
                    "failed to create {} backend ({}); falling back to {}",
                    kind,
                    err,
                    next
                );
                kind = next;
            }
        }
    }
}

fn byte_size(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
