//! # Ferrex Texture Upload
//!
//! Render-thread texture streaming: many producer threads submit texture
//! writes, and the render thread drains them once per frame under a strict
//! upload budget without ever blocking on the GPU.
//!
//! ## Overview
//!
//! - **Admission**: [`UploadSubmitter`] queues [`UploadRequest`]s into a
//!   priority queue (highest priority first, FIFO within a priority).
//! - **Preparation**: every request is validated and its exact byte count
//!   resolved before any GPU work ([`request::prepare`]).
//! - **Staging**: uploads are copied through a persistently mapped ring when
//!   the context supports it, through three round-robin buffers otherwise,
//!   and straight from client memory as the last resort.
//! - **Completion**: fences are polled with zero timeout; staging memory is
//!   reused only after its fence signals.
//! - **Deletion**: [`ResourceManagerSystem`] defers GPU object deletion from
//!   worker threads to the render thread.
//!
//! ## Example
//!
//! ```
//! use ferrex_texture_upload::{
//!     SoftwareContext, StreamingConfig, StreamingManager, TextureId,
//!     UploadRequest,
//! };
//!
//! let mut ctx = SoftwareContext::new();
//! let mut manager = StreamingManager::new(StreamingConfig::default())?;
//!
//! let submitter = manager.submitter();
//! std::thread::spawn(move || {
//!     let pixels = vec![255; 16];
//!     submitter.submit(UploadRequest::rgba8(TextureId(1), 2, 2, pixels));
//! })
//! .join()
//! .unwrap();
//!
//! let report = manager.tick(&mut ctx);
//! assert_eq!(report.uploads, 1);
//! # Ok::<(), ferrex_texture_upload::StreamingError>(())
//! ```

pub mod backend;
pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod fence;
pub mod format;
pub mod manager;
pub mod queue;
pub mod request;
pub mod resources;
pub mod stats;

pub use backend::{BackendKind, StagingBackend, negotiate_backend};
pub use config::{BackendSignature, ConfigSource, StreamingConfig};
pub use context::{
    BufferId, FenceHandle, FenceStatus, GraphicsContext, SoftwareContext,
    TextureId,
};
pub use error::{
    BackendError, ConfigError, ConfigLoadError, ContextError, ResourceError,
    Result, StreamingError,
};
pub use fence::Fence;
pub use format::{PixelFormat, PixelType, bytes_per_pixel};
pub use manager::{StreamingManager, TickReport, UploadSubmitter};
pub use queue::PriorityAdmissionQueue;
pub use request::{
    PixelData, PreparedUpload, RejectReason, TextureTarget, UnpackParams,
    UploadRegion, UploadRequest,
};
pub use resources::{
    DeleteCommand, DisposeOutcome, GpuResource, ImmediateDelete,
    ResourceKind, ResourceManager, ResourceManagerSystem,
};
pub use stats::StreamingDiagnostics;
