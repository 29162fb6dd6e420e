//! Persistent-mapped ring backend.
//!
//! One buffer with immutable storage stays mapped for the backend's whole
//! life. Uploads are written straight into the mapping at the ring head; the
//! tail only moves when the fence guarding the oldest in-flight range has
//! signaled, so a byte range is never rewritten while the GPU may still read
//! it.

use std::collections::VecDeque;

use super::StagingAllocation;
use crate::context::{BufferId, GraphicsContext, MapAccess};
use crate::error::BackendError;
use crate::fence::Fence;
use crate::resources::DeleteCommand;

/// A reserved byte range inside the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRange {
    pub offset: usize,
    /// Alignment-rounded size.
    pub size: usize,
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

/// Wraparound byte-range allocator.
///
/// Ranges are released strictly in allocation order. While wrapped
/// (`head < tail`) allocations must end strictly before the tail, so
/// `head == tail` always means "nothing between them is live".
#[derive(Debug)]
pub struct RingAllocator {
    capacity: usize,
    alignment: usize,
    head: usize,
    tail: usize,
    live: usize,
    head_before_last: Option<usize>,
}

impl RingAllocator {
    /// `alignment` must be a non-zero power of two.
    pub fn new(capacity: usize, alignment: usize) -> Self {
        debug_assert!(alignment.is_power_of_two());
        Self {
            capacity,
            alignment: alignment.max(1),
            head: 0,
            tail: 0,
            live: 0,
            head_before_last: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Reserve `len` bytes, or `None` when no contiguous range is free.
    pub fn allocate(&mut self, len: usize) -> Option<RingRange> {
        if len == 0 {
            return None;
        }
        let size = align_up(len, self.alignment);
        if size > self.capacity {
            return None;
        }
        if self.live == 0 {
            self.head = 0;
            self.tail = 0;
        }

        let head = align_up(self.head, self.alignment);
        let offset = if self.head >= self.tail {
            if head + size <= self.capacity {
                head
            } else if size < self.tail {
                0
            } else {
                return None;
            }
        } else if head + size < self.tail {
            head
        } else {
            return None;
        };

        self.head_before_last = Some(self.head);
        self.head = offset + size;
        self.live += 1;
        Some(RingRange { offset, size })
    }

    /// Undo the most recent [`allocate`](Self::allocate) when its range was
    /// never handed to the GPU.
    pub fn cancel_last(&mut self) {
        if let Some(head) = self.head_before_last.take() {
            self.head = head;
            self.live -= 1;
        }
    }

    /// Retire the oldest live range.
    pub fn release(&mut self, range: RingRange) {
        debug_assert!(self.live > 0);
        self.head_before_last = None;
        self.tail = range.offset + range.size;
        self.live = self.live.saturating_sub(1);
        if self.live == 0 {
            self.head = 0;
            self.tail = 0;
        }
    }
}

#[derive(Debug)]
struct PendingRegion {
    range: RingRange,
    fence: Fence,
}

/// Staging through a single persistently mapped ring buffer.
#[derive(Debug)]
pub struct PersistentRingBackend {
    buffer: BufferId,
    coherent: bool,
    allocator: RingAllocator,
    in_flight: VecDeque<PendingRegion>,
}

impl PersistentRingBackend {
    pub fn create<C: GraphicsContext>(
        ctx: &mut C,
        capacity: usize,
        alignment: usize,
        coherent: bool,
    ) -> Result<Self, BackendError> {
        if capacity == 0 {
            return Err(BackendError::ZeroCapacity);
        }
        if !ctx.supports_persistent_mapping() {
            return Err(BackendError::PersistentMappingUnsupported);
        }

        let buffer = ctx.create_buffer()?;
        let access = MapAccess::persistent_write(coherent);
        let mapped = ctx
            .allocate_immutable_storage(buffer, capacity, access)
            .and_then(|()| ctx.map_buffer_range(buffer, 0, capacity, access));
        if let Err(err) = mapped {
            ctx.delete_object(DeleteCommand::Buffer(buffer.0));
            return Err(err.into());
        }

        log::debug!(
            "persistent ring ready: buffer {} ({} bytes, coherent={})",
            buffer.0,
            capacity,
            coherent
        );
        Ok(Self {
            buffer,
            coherent,
            allocator: RingAllocator::new(capacity, alignment),
            in_flight: VecDeque::new(),
        })
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn is_coherent(&self) -> bool {
        self.coherent
    }

    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn allocator(&self) -> &RingAllocator {
        &self.allocator
    }

    /// Reserve a range and copy `bytes` into the mapping.
    pub fn try_stage<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        bytes: &[u8],
    ) -> Option<StagingAllocation> {
        let range = self.allocator.allocate(bytes.len())?;

        let written = ctx
            .write_mapped(self.buffer, range.offset, bytes)
            .and_then(|()| {
                if self.coherent {
                    Ok(())
                } else {
                    ctx.flush_mapped_range(
                        self.buffer,
                        range.offset,
                        bytes.len(),
                    )
                }
            });
        if let Err(err) = written {
            log::warn!("ring write of {} bytes failed: {}", bytes.len(), err);
            self.allocator.cancel_last();
            return None;
        }

        Some(StagingAllocation {
            buffer: self.buffer,
            offset: range.offset,
            size: range.size,
            len: bytes.len(),
            slot: None,
        })
    }

    /// Fence the range so it retires once the GPU has consumed it.
    pub fn submit<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
        allocation: StagingAllocation,
    ) {
        let range = RingRange {
            offset: allocation.offset,
            size: allocation.size,
        };
        match Fence::insert(ctx) {
            Ok(fence) => {
                self.in_flight.push_back(PendingRegion { range, fence })
            }
            Err(err) => {
                // Without a fence the only safe point of reuse is a drained
                // pipeline.
                log::warn!("ring fence insertion failed ({err}); finishing");
                ctx.finish();
                self.retire(ctx);
                self.allocator.release(range);
            }
        }
    }

    /// Advance the tail past every leading range whose fence has signaled.
    pub fn retire<C: GraphicsContext>(&mut self, ctx: &mut C) -> usize {
        let mut retired = 0;
        while let Some(front) = self.in_flight.front_mut() {
            if !front.fence.try_consume_if_signaled(ctx) {
                break;
            }
            let range = front.range;
            self.in_flight.pop_front();
            self.allocator.release(range);
            retired += 1;
        }
        retired
    }

    /// Release every fence, then the buffer. Failures are logged and ignored.
    pub fn dispose<C: GraphicsContext>(mut self, ctx: &mut C) {
        for mut region in self.in_flight.drain(..) {
            region.fence.dispose(ctx);
        }
        if let Err(err) = ctx.unmap_buffer(self.buffer) {
            log::warn!(
                "unmapping ring buffer {} failed: {}",
                self.buffer.0,
                err
            );
        }
        ctx.delete_object(DeleteCommand::Buffer(self.buffer.0));
    }
}
