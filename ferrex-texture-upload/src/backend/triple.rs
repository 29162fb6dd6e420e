//! Round-robin triple buffering over three orphaned unpack buffers.
//!
//! Used when persistent mapping is unavailable. Each stage orphans a slot,
//! maps it write-invalidate, copies the payload and unmaps it; the slot is
//! then fenced at submit and only reused once that fence has signaled.

use super::StagingAllocation;
use crate::context::{BufferId, GraphicsContext, MapAccess};
use crate::error::{BackendError, ContextError};
use crate::fence::Fence;
use crate::resources::DeleteCommand;

pub const TRIPLE_BUFFER_SLOTS: usize = 3;

#[derive(Debug)]
struct Slot {
    buffer: BufferId,
    fence: Option<Fence>,
}

impl Slot {
    /// Release the slot if its fence has signaled. Unfenced slots are free.
    fn try_reclaim<C: GraphicsContext>(&mut self, ctx: &mut C) -> bool {
        match self.fence.as_mut() {
            None => true,
            Some(fence) => {
                if fence.try_consume_if_signaled(ctx) {
                    self.fence = None;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct TripleBufferBackend {
    slots: Vec<Slot>,
    slot_bytes: usize,
    last_used: usize,
}

impl TripleBufferBackend {
    pub fn create<C: GraphicsContext>(
        ctx: &mut C,
        slot_bytes: usize,
    ) -> Result<Self, BackendError> {
        if slot_bytes == 0 {
            return Err(BackendError::ZeroCapacity);
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(TRIPLE_BUFFER_SLOTS);
        for _ in 0..TRIPLE_BUFFER_SLOTS {
            let created = ctx.create_buffer().and_then(|buffer| {
                slots.push(Slot {
                    buffer,
                    fence: None,
                });
                ctx.orphan_buffer(buffer, slot_bytes)
            });
            if let Err(err) = created {
                for slot in slots {
                    ctx.delete_object(DeleteCommand::Buffer(slot.buffer.0));
                }
                return Err(err.into());
            }
        }

        log::debug!(
            "triple buffer ready: {} slots of {} bytes",
            TRIPLE_BUFFER_SLOTS,
            slot_bytes
        );
        Ok(Self {
            slots,
            slot_bytes,
            last_used: TRIPLE_BUFFER_SLOTS - 1,
        })
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    pub fn slot_buffer(&self, slot: usize) -> Option<BufferId> {
        self.slots.get(slot).map(|slot| slot.buffer)
    }

    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.fence.is_some()).count()
    }

    /// Copy `bytes` into the next free slot after the last one used.
    pub fn try_stage<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        bytes: &[u8],
    ) -> Option<StagingAllocation> {
        if bytes.is_empty() || bytes.len() > self.slot_bytes {
            return None;
        }

        let index = (1..=TRIPLE_BUFFER_SLOTS)
            .map(|step| (self.last_used + step) % TRIPLE_BUFFER_SLOTS)
            .find(|&index| self.slots[index].try_reclaim(ctx))?;
        let buffer = self.slots[index].buffer;

        if let Err(err) = Self::fill(ctx, buffer, self.slot_bytes, bytes) {
            log::warn!(
                "triple-buffer slot {} write of {} bytes failed: {}",
                index,
                bytes.len(),
                err
            );
            return None;
        }

        self.last_used = index;
        Some(StagingAllocation {
            buffer,
            offset: 0,
            size: bytes.len(),
            len: bytes.len(),
            slot: Some(index),
        })
    }

    fn fill<C: GraphicsContext>(
        ctx: &mut C,
        buffer: BufferId,
        slot_bytes: usize,
        bytes: &[u8],
    ) -> Result<(), ContextError> {
        ctx.orphan_buffer(buffer, slot_bytes)?;
        ctx.map_buffer_range(
            buffer,
            0,
            bytes.len(),
            MapAccess::write_invalidate(),
        )?;
        if let Err(err) = ctx.write_mapped(buffer, 0, bytes) {
            let _ = ctx.unmap_buffer(buffer);
            return Err(err);
        }
        if !ctx.unmap_buffer(buffer)? {
            return Err(ContextError::MapFailed(format!(
                "buffer {} contents lost during unmap",
                buffer.0
            )));
        }
        Ok(())
    }

    /// Fence the slot the allocation came from.
    pub fn submit<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        allocation: StagingAllocation,
    ) {
        let Some(slot) =
            allocation.slot.and_then(|index| self.slots.get_mut(index))
        else {
            return;
        };
        match Fence::insert(ctx) {
            Ok(fence) => slot.fence = Some(fence),
            Err(err) => {
                log::warn!(
                    "triple-buffer fence insertion failed ({err}); finishing"
                );
                ctx.finish();
            }
        }
    }

    /// Release every slot whose fence has signaled.
    pub fn retire<C: GraphicsContext>(&mut self, ctx: &mut C) -> usize {
        self.slots
            .iter_mut()
            .filter(|slot| slot.fence.is_some())
            .map(|slot| slot.try_reclaim(ctx))
            .filter(|released| *released)
            .count()
    }

    pub fn dispose<C: GraphicsContext>(mut self, ctx: &mut C) {
        for slot in &mut self.slots {
            if let Some(mut fence) = slot.fence.take() {
                fence.dispose(ctx);
            }
        }
        for slot in self.slots {
            ctx.delete_object(DeleteCommand::Buffer(slot.buffer.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SoftwareContext;

    fn stage_and_submit(
        backend: &mut TripleBufferBackend,
        ctx: &mut SoftwareContext,
        fill: u8,
    ) -> Option<usize> {
        let allocation = backend.try_stage(ctx, &[fill; 64])?;
        let slot = allocation.slot;
        backend.submit(ctx, allocation);
        slot
    }

    #[test]
    fn fourth_stage_waits_for_a_fence() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 256).unwrap();

        let slots: Vec<_> = (0..3)
            .map(|n| stage_and_submit(&mut backend, &mut ctx, n))
            .collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(backend.in_flight(), 3);
        assert!(backend.try_stage(&mut ctx, &[9; 64]).is_none());

        ctx.signal_oldest_fence();
        assert_eq!(stage_and_submit(&mut backend, &mut ctx, 9), Some(0));
        assert_eq!(backend.in_flight(), 3);
    }

    #[test]
    fn staged_bytes_are_visible_after_unmap() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 16).unwrap();
        let allocation = backend.try_stage(&mut ctx, &[5; 8]).unwrap();

        assert!(!ctx.is_mapped(allocation.buffer));
        assert_eq!(
            &ctx.buffer_contents(allocation.buffer).unwrap()[..8],
            &[5; 8]
        );
    }

    #[test]
    fn lost_contents_fail_the_stage() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 16).unwrap();
        ctx.corrupt_next_unmap();
        assert!(backend.try_stage(&mut ctx, &[1; 8]).is_none());
        // The slot is not consumed by a failed stage.
        assert_eq!(backend.try_stage(&mut ctx, &[1; 8]).unwrap().slot, Some(0));
    }

    #[test]
    fn oversized_payload_is_refused() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 16).unwrap();
        assert!(backend.try_stage(&mut ctx, &[0; 17]).is_none());
    }

    #[test]
    fn retire_releases_signaled_slots() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 64).unwrap();
        stage_and_submit(&mut backend, &mut ctx, 1);
        stage_and_submit(&mut backend, &mut ctx, 2);

        ctx.signal_all_fences();
        assert_eq!(backend.retire(&mut ctx), 2);
        assert_eq!(backend.in_flight(), 0);
        assert_eq!(ctx.live_fence_count(), 0);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut ctx = SoftwareContext::without_persistent_mapping();
        let mut backend = TripleBufferBackend::create(&mut ctx, 64).unwrap();
        stage_and_submit(&mut backend, &mut ctx, 1);
        backend.dispose(&mut ctx);
        assert_eq!(ctx.live_fence_count(), 0);
        assert_eq!(ctx.live_buffer_count(), 0);
    }
}
