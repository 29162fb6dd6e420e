//! In-memory [`GraphicsContext`] for headless runs and tests.
//!
//! Buffers hold real bytes, mappings distinguish coherent, explicit-flush and
//! unmap-time visibility, fences only signal when told to (or on
//! [`GraphicsContext::finish`]), and every call is logged so callers can
//! assert on ordering. Clones share state, which lets a clone act as the
//! [`ImmediateDelete`] sink on other threads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::{
    BufferId, FenceHandle, FenceStatus, GraphicsContext, MapAccess,
    PixelSource, PixelStoreParams, SubImageUpload, TextureId,
};
use crate::error::ContextError;
use crate::format::{PixelFormat, PixelType};
use crate::request::{TextureTarget, UploadRegion};
use crate::resources::{DeleteCommand, ImmediateDelete};

/// One logged context call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextCall {
    CreateBuffer(BufferId),
    ImmutableStorage { buffer: BufferId, size: usize, access: MapAccess },
    Orphan { buffer: BufferId, size: usize },
    Map { buffer: BufferId, offset: usize, len: usize },
    Write { buffer: BufferId, offset: usize, len: usize },
    FlushRange { buffer: BufferId, offset: usize, len: usize },
    Unmap(BufferId),
    BindUnpack(Option<BufferId>),
    BindTexture(TextureTarget, TextureId),
    PixelStore(PixelStoreParams),
    SubImage { texture: Option<TextureId>, staged: Option<BufferId> },
    InsertFence(FenceHandle),
    DeleteFence(FenceHandle),
    Flush,
    Finish,
    Delete(DeleteCommand),
}

/// A completed sub-image upload as the GPU would have received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedUpload {
    pub texture: Option<TextureId>,
    pub target: TextureTarget,
    pub region: UploadRegion,
    pub format: PixelFormat,
    pub ty: PixelType,
    pub pixel_store: PixelStoreParams,
    /// Unpack buffer the pixels came from, `None` for client memory.
    pub staged_from: Option<BufferId>,
    pub bytes: Vec<u8>,
}

/// A deletion observed by the context, with the thread that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRecord {
    pub command: DeleteCommand,
    pub thread: ThreadId,
}

#[derive(Debug)]
struct Mapping {
    offset: usize,
    access: MapAccess,
    shadow: Vec<u8>,
}

#[derive(Debug, Default)]
struct SoftBuffer {
    storage: Vec<u8>,
    immutable: Option<MapAccess>,
    mapping: Option<Mapping>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_immutable_storage: bool,
    fail_next_map: bool,
    fail_fences: bool,
    fail_sub_image: bool,
    corrupt_next_unmap: bool,
}

#[derive(Debug)]
struct SoftwareState {
    persistent_mapping: bool,
    next_buffer: u32,
    next_fence: u64,
    buffers: HashMap<BufferId, SoftBuffer>,
    fences: BTreeMap<FenceHandle, bool>,
    deleted_fences: usize,
    bound_unpack: Option<BufferId>,
    bound_texture: Option<TextureId>,
    pixel_store: PixelStoreParams,
    uploads: Vec<RecordedUpload>,
    deletions: Vec<DeletionRecord>,
    calls: Vec<ContextCall>,
    finish_count: usize,
    faults: Faults,
}

impl Default for SoftwareState {
    fn default() -> Self {
        Self {
            persistent_mapping: true,
            next_buffer: 1,
            next_fence: 1,
            buffers: HashMap::new(),
            fences: BTreeMap::new(),
            deleted_fences: 0,
            bound_unpack: None,
            bound_texture: None,
            pixel_store: PixelStoreParams::default(),
            uploads: Vec::new(),
            deletions: Vec::new(),
            calls: Vec::new(),
            finish_count: 0,
            faults: Faults::default(),
        }
    }
}

impl SoftwareState {
    fn buffer_mut(
        &mut self,
        buffer: BufferId,
    ) -> Result<&mut SoftBuffer, ContextError> {
        self.buffers.get_mut(&buffer).ok_or_else(|| {
            ContextError::UnknownObject(format!("buffer {}", buffer.0))
        })
    }

    fn record_deletion(&mut self, command: DeleteCommand) {
        if let DeleteCommand::Buffer(id) = command {
            let buffer = BufferId(id);
            self.buffers.remove(&buffer);
            if self.bound_unpack == Some(buffer) {
                self.bound_unpack = None;
            }
        }
        self.calls.push(ContextCall::Delete(command));
        self.deletions.push(DeletionRecord {
            command,
            thread: thread::current().id(),
        });
    }
}

/// Shared-state software implementation of [`GraphicsContext`].
#[derive(Debug, Clone, Default)]
pub struct SoftwareContext {
    state: Arc<Mutex<SoftwareState>>,
}

impl SoftwareContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that reports no persistent mapping.
    pub fn without_persistent_mapping() -> Self {
        let ctx = Self::new();
        ctx.set_persistent_mapping_supported(false);
        ctx
    }

    pub fn set_persistent_mapping_supported(&self, supported: bool) {
        self.state.lock().persistent_mapping = supported;
    }

    // --- GPU timeline control ---

    /// Mark every outstanding fence as signaled.
    pub fn signal_all_fences(&self) {
        for signaled in self.state.lock().fences.values_mut() {
            *signaled = true;
        }
    }

    /// Signal the oldest unsignaled fence, returning it.
    pub fn signal_oldest_fence(&self) -> Option<FenceHandle> {
        let mut state = self.state.lock();
        let (handle, signaled) =
            state.fences.iter_mut().find(|(_, signaled)| !**signaled)?;
        *signaled = true;
        Some(*handle)
    }

    pub fn live_fence_count(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn deleted_fence_count(&self) -> usize {
        self.state.lock().deleted_fences
    }

    pub fn finish_count(&self) -> usize {
        self.state.lock().finish_count
    }

    // --- fault injection ---

    pub fn set_fail_immutable_storage(&self, fail: bool) {
        self.state.lock().faults.fail_immutable_storage = fail;
    }

    pub fn fail_next_map(&self) {
        self.state.lock().faults.fail_next_map = true;
    }

    pub fn set_fail_fence_insertion(&self, fail: bool) {
        self.state.lock().faults.fail_fences = fail;
    }

    pub fn set_fail_sub_image(&self, fail: bool) {
        self.state.lock().faults.fail_sub_image = fail;
    }

    pub fn corrupt_next_unmap(&self) {
        self.state.lock().faults.corrupt_next_unmap = true;
    }

    // --- inspection ---

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().uploads.clone()
    }

    pub fn deletions(&self) -> Vec<DeletionRecord> {
        self.state.lock().deletions.clone()
    }

    pub fn calls(&self) -> Vec<ContextCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Bytes the GPU would read from `buffer`, ignoring unflushed writes.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .map(|buffer| buffer.storage.clone())
    }

    pub fn is_mapped(&self, buffer: BufferId) -> bool {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .is_some_and(|buffer| buffer.mapping.is_some())
    }
}

impl GraphicsContext for SoftwareContext {
    fn supports_persistent_mapping(&self) -> bool {
        self.state.lock().persistent_mapping
    }

    fn create_buffer(&mut self) -> Result<BufferId, ContextError> {
        let mut state = self.state.lock();
        let id = BufferId(state.next_buffer);
        state.next_buffer += 1;
        state.buffers.insert(id, SoftBuffer::default());
        state.calls.push(ContextCall::CreateBuffer(id));
        Ok(id)
    }

    fn allocate_immutable_storage(
        &mut self,
        buffer: BufferId,
        size: usize,
        access: MapAccess,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        if state.faults.fail_immutable_storage {
            return Err(ContextError::OutOfMemory(format!(
                "immutable storage of {size} bytes"
            )));
        }
        if access.persistent && !state.persistent_mapping {
            return Err(ContextError::Unsupported(
                "persistent buffer storage".to_string(),
            ));
        }
        let slot = state.buffer_mut(buffer)?;
        if slot.immutable.is_some() {
            return Err(ContextError::InvalidOperation(
                "buffer storage is already immutable".to_string(),
            ));
        }
        slot.storage = vec![0; size];
        slot.immutable = Some(access);
        state
            .calls
            .push(ContextCall::ImmutableStorage { buffer, size, access });
        Ok(())
    }

    fn orphan_buffer(
        &mut self,
        buffer: BufferId,
        size: usize,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        let slot = state.buffer_mut(buffer)?;
        if slot.immutable.is_some() {
            return Err(ContextError::InvalidOperation(
                "cannot respecify immutable storage".to_string(),
            ));
        }
        if slot.mapping.is_some() {
            return Err(ContextError::InvalidOperation(
                "cannot orphan a mapped buffer".to_string(),
            ));
        }
        slot.storage = vec![0; size];
        state.calls.push(ContextCall::Orphan { buffer, size });
        Ok(())
    }

    fn map_buffer_range(
        &mut self,
        buffer: BufferId,
        offset: usize,
        len: usize,
        access: MapAccess,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.faults.fail_next_map) {
            return Err(ContextError::MapFailed(format!("buffer {}", buffer.0)));
        }
        let slot = state.buffer_mut(buffer)?;
        if slot.mapping.is_some() {
            return Err(ContextError::InvalidOperation(
                "buffer is already mapped".to_string(),
            ));
        }
        if offset + len > slot.storage.len() {
            return Err(ContextError::InvalidOperation(format!(
                "map range {offset}+{len} exceeds {} bytes",
                slot.storage.len()
            )));
        }
        if access.persistent && slot.immutable.is_none() {
            return Err(ContextError::InvalidOperation(
                "persistent mapping requires immutable storage".to_string(),
            ));
        }
        let shadow = if access.invalidate_buffer {
            vec![0; len]
        } else {
            slot.storage[offset..offset + len].to_vec()
        };
        slot.mapping = Some(Mapping {
            offset,
            access,
            shadow,
        });
        state.calls.push(ContextCall::Map {
            buffer,
            offset,
            len,
        });
        Ok(())
    }

    fn write_mapped(
        &mut self,
        buffer: BufferId,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        let slot = state.buffer_mut(buffer)?;
        let Some(mapping) = slot.mapping.as_mut() else {
            return Err(ContextError::InvalidOperation(
                "write to unmapped buffer".to_string(),
            ));
        };
        let start = offset.checked_sub(mapping.offset).ok_or_else(|| {
            ContextError::InvalidOperation("write before mapped range".into())
        })?;
        let end = start + bytes.len();
        if end > mapping.shadow.len() {
            return Err(ContextError::InvalidOperation(
                "write past mapped range".to_string(),
            ));
        }
        mapping.shadow[start..end].copy_from_slice(bytes);
        if mapping.access.coherent {
            slot.storage[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        state.calls.push(ContextCall::Write {
            buffer,
            offset,
            len: bytes.len(),
        });
        Ok(())
    }

    fn flush_mapped_range(
        &mut self,
        buffer: BufferId,
        offset: usize,
        len: usize,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        let slot = state.buffer_mut(buffer)?;
        let Some(mapping) = slot.mapping.as_ref() else {
            return Err(ContextError::InvalidOperation(
                "flush of unmapped buffer".to_string(),
            ));
        };
        if !mapping.access.flush_explicit {
            return Err(ContextError::InvalidOperation(
                "mapping was not created for explicit flushes".to_string(),
            ));
        }
        let start = offset
            .checked_sub(mapping.offset)
            .filter(|start| start + len <= mapping.shadow.len())
            .ok_or_else(|| {
                ContextError::InvalidOperation(
                    "flush outside mapped range".to_string(),
                )
            })?;
        let visible = mapping.shadow[start..start + len].to_vec();
        slot.storage[offset..offset + len].copy_from_slice(&visible);
        state.calls.push(ContextCall::FlushRange {
            buffer,
            offset,
            len,
        });
        Ok(())
    }

    fn unmap_buffer(&mut self, buffer: BufferId) -> Result<bool, ContextError> {
        let mut state = self.state.lock();
        let corrupt = std::mem::take(&mut state.faults.corrupt_next_unmap);
        let slot = state.buffer_mut(buffer)?;
        let Some(mapping) = slot.mapping.take() else {
            return Err(ContextError::InvalidOperation(
                "buffer is not mapped".to_string(),
            ));
        };
        if !mapping.access.flush_explicit && !corrupt {
            let end = mapping.offset + mapping.shadow.len();
            slot.storage[mapping.offset..end].copy_from_slice(&mapping.shadow);
        }
        state.calls.push(ContextCall::Unmap(buffer));
        Ok(!corrupt)
    }

    fn bind_unpack_buffer(&mut self, buffer: Option<BufferId>) {
        let mut state = self.state.lock();
        state.bound_unpack = buffer;
        state.calls.push(ContextCall::BindUnpack(buffer));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: TextureId) {
        let mut state = self.state.lock();
        state.bound_texture = Some(texture);
        state.calls.push(ContextCall::BindTexture(target, texture));
    }

    fn set_pixel_store(&mut self, params: PixelStoreParams) {
        let mut state = self.state.lock();
        state.pixel_store = params;
        state.calls.push(ContextCall::PixelStore(params));
    }

    fn tex_sub_image(
        &mut self,
        upload: &SubImageUpload<'_>,
    ) -> Result<(), ContextError> {
        let mut state = self.state.lock();
        if state.faults.fail_sub_image {
            return Err(ContextError::InvalidOperation(
                "sub-image upload rejected".to_string(),
            ));
        }

        let (bytes, staged_from) = match upload.source {
            PixelSource::UnpackBuffer { offset, len } => {
                let Some(bound) = state.bound_unpack else {
                    return Err(ContextError::InvalidOperation(
                        "no pixel-unpack buffer bound".to_string(),
                    ));
                };
                let slot = state.buffer_mut(bound)?;
                if let Some(mapping) = &slot.mapping
                    && !mapping.access.persistent
                {
                    return Err(ContextError::InvalidOperation(
                        "unpack source is mapped".to_string(),
                    ));
                }
                if offset + len > slot.storage.len() {
                    return Err(ContextError::InvalidOperation(
                        "unpack range exceeds buffer".to_string(),
                    ));
                }
                (slot.storage[offset..offset + len].to_vec(), Some(bound))
            }
            PixelSource::Client(bytes) => {
                if state.bound_unpack.is_some() {
                    return Err(ContextError::InvalidOperation(
                        "client pointer used while an unpack buffer is bound"
                            .to_string(),
                    ));
                }
                (bytes.to_vec(), None)
            }
        };

        let texture = state.bound_texture;
        let record = RecordedUpload {
            texture,
            target: upload.target,
            region: upload.region,
            format: upload.format,
            ty: upload.ty,
            pixel_store: state.pixel_store,
            staged_from,
            bytes,
        };
        state.uploads.push(record);
        state.calls.push(ContextCall::SubImage {
            texture,
            staged: staged_from,
        });
        Ok(())
    }

    fn insert_fence(&mut self) -> Result<FenceHandle, ContextError> {
        let mut state = self.state.lock();
        if state.faults.fail_fences {
            return Err(ContextError::OutOfMemory("sync object".to_string()));
        }
        let handle = FenceHandle(state.next_fence);
        state.next_fence += 1;
        state.fences.insert(handle, false);
        state.calls.push(ContextCall::InsertFence(handle));
        Ok(handle)
    }

    fn poll_fence(&mut self, fence: FenceHandle) -> FenceStatus {
        match self.state.lock().fences.get(&fence) {
            Some(true) => FenceStatus::Signaled,
            Some(false) => FenceStatus::Unsignaled,
            None => FenceStatus::Failed,
        }
    }

    fn delete_fence(&mut self, fence: FenceHandle) {
        let mut state = self.state.lock();
        if state.fences.remove(&fence).is_some() {
            state.deleted_fences += 1;
        }
        state.calls.push(ContextCall::DeleteFence(fence));
    }

    fn flush(&mut self) {
        self.state.lock().calls.push(ContextCall::Flush);
    }

    fn finish(&mut self) {
        let mut state = self.state.lock();
        for signaled in state.fences.values_mut() {
            *signaled = true;
        }
        state.finish_count += 1;
        state.calls.push(ContextCall::Finish);
    }

    fn delete_object(&mut self, command: DeleteCommand) {
        self.state.lock().record_deletion(command);
    }
}

impl ImmediateDelete for SoftwareContext {
    fn delete_now(&self, command: DeleteCommand) {
        self.state.lock().record_deletion(command);
    }
}
