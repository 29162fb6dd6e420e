//! The slice of the graphics API the upload pipeline drives.
//!
//! Every method is called from the render thread only. Implementations wrap
//! a real context (or, for headless runs and tests, [`SoftwareContext`]).
//! All calls are fallible; the pipeline degrades to a simpler path on error
//! instead of propagating.

pub mod software;

pub use software::SoftwareContext;

use crate::error::ContextError;
use crate::format::{PixelFormat, PixelType};
use crate::request::{TextureTarget, UploadRegion};
use crate::resources::DeleteCommand;

/// Name of a buffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Name of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Opaque sync object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FenceHandle(pub u64);

/// Result of a zero-timeout fence query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    Unsignaled,
    /// The query itself failed (typically after context loss).
    Failed,
}

/// Access flags for buffer storage and mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapAccess {
    pub write: bool,
    pub persistent: bool,
    pub coherent: bool,
    pub flush_explicit: bool,
    pub invalidate_buffer: bool,
}

impl MapAccess {
    /// Write-only persistent mapping; non-coherent mappings flush explicitly.
    pub fn persistent_write(coherent: bool) -> Self {
        Self {
            write: true,
            persistent: true,
            coherent,
            flush_explicit: !coherent,
            invalidate_buffer: false,
        }
    }

    /// Transient write mapping that discards the previous contents.
    pub fn write_invalidate() -> Self {
        Self {
            write: true,
            invalidate_buffer: true,
            ..Self::default()
        }
    }
}

/// Unpack pixel-store state applied before a sub-image call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelStoreParams {
    pub alignment: u32,
    pub row_length: u32,
    pub image_height: u32,
}

impl Default for PixelStoreParams {
    fn default() -> Self {
        Self {
            alignment: 4,
            row_length: 0,
            image_height: 0,
        }
    }
}

/// Where a sub-image call reads its pixels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelSource<'a> {
    /// Byte range of the currently bound pixel-unpack buffer.
    UnpackBuffer { offset: usize, len: usize },
    /// Client memory; requires no unpack buffer to be bound.
    Client(&'a [u8]),
}

/// Arguments of one sub-image upload.
#[derive(Debug, Clone, Copy)]
pub struct SubImageUpload<'a> {
    pub target: TextureTarget,
    pub region: UploadRegion,
    pub format: PixelFormat,
    pub ty: PixelType,
    pub source: PixelSource<'a>,
}

/// Graphics-context operations consumed by the upload pipeline.
pub trait GraphicsContext {
    /// Whether buffers can be mapped persistently (immutable storage with
    /// persistent, optionally coherent, mappings).
    fn supports_persistent_mapping(&self) -> bool;

    fn create_buffer(&mut self) -> Result<BufferId, ContextError>;

    /// Allocate immutable storage of `size` bytes usable with `access`.
    fn allocate_immutable_storage(
        &mut self,
        buffer: BufferId,
        size: usize,
        access: MapAccess,
    ) -> Result<(), ContextError>;

    /// Replace the buffer's backing store with fresh, uninitialised storage
    /// of `size` bytes for streaming writes.
    fn orphan_buffer(
        &mut self,
        buffer: BufferId,
        size: usize,
    ) -> Result<(), ContextError>;

    fn map_buffer_range(
        &mut self,
        buffer: BufferId,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Result<(), ContextError>;

    /// Copy `bytes` into the mapped range of `buffer` at absolute `offset`.
    fn write_mapped(
        &mut self,
        buffer: BufferId,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), ContextError>;

    /// Make `len` bytes at `offset` of an explicit-flush mapping visible.
    fn flush_mapped_range(
        &mut self,
        buffer: BufferId,
        offset: usize,
        len: usize,
    ) -> Result<(), ContextError>;

    /// Unmap the buffer. `Ok(false)` means the contents were lost while
    /// mapped and must be rewritten.
    fn unmap_buffer(&mut self, buffer: BufferId) -> Result<bool, ContextError>;

    fn bind_unpack_buffer(&mut self, buffer: Option<BufferId>);

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId);

    fn set_pixel_store(&mut self, params: PixelStoreParams);

    fn tex_sub_image(
        &mut self,
        upload: &SubImageUpload<'_>,
    ) -> Result<(), ContextError>;

    /// Insert a fence after all previously issued commands.
    fn insert_fence(&mut self) -> Result<FenceHandle, ContextError>;

    /// Zero-timeout status query; never blocks.
    fn poll_fence(&mut self, fence: FenceHandle) -> FenceStatus;

    fn delete_fence(&mut self, fence: FenceHandle);

    /// Submit queued commands without waiting.
    fn flush(&mut self);

    /// Block until every issued command has completed.
    fn finish(&mut self);

    /// Delete one GPU object.
    fn delete_object(&mut self, command: DeleteCommand);
}
