//! Poll-only wrapper over a GPU sync object.

use crate::context::{FenceHandle, FenceStatus, GraphicsContext};

/// A completion marker in the GPU command stream.
///
/// The wrapper never blocks: [`Fence::poll`] is a zero-timeout query and
/// [`Fence::try_consume_if_signaled`] only releases the sync object once it
/// has signaled. The handle is deleted exactly once.
#[derive(Debug)]
pub struct Fence {
    handle: Option<FenceHandle>,
    signaled: bool,
}

impl Fence {
    /// Insert a new fence after every command issued so far.
    pub fn insert<C: GraphicsContext>(
        ctx: &mut C,
    ) -> Result<Self, crate::error::ContextError> {
        let handle = ctx.insert_fence()?;
        Ok(Self::from_handle(handle))
    }

    pub fn from_handle(handle: FenceHandle) -> Self {
        Self {
            handle: Some(handle),
            signaled: false,
        }
    }

    pub fn handle(&self) -> Option<FenceHandle> {
        self.handle
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_none()
    }

    /// Zero-timeout check. A failed query counts as signaled so lost
    /// contexts cannot pin staging memory forever.
    pub fn poll<C: GraphicsContext>(&mut self, ctx: &mut C) -> bool {
        if self.signaled {
            return true;
        }
        let Some(handle) = self.handle else {
            return false;
        };
        self.signaled = match ctx.poll_fence(handle) {
            FenceStatus::Signaled => true,
            FenceStatus::Unsignaled => false,
            FenceStatus::Failed => {
                log::warn!(
                    "fence {:?} query failed; treating as signaled",
                    handle
                );
                true
            }
        };
        self.signaled
    }

    /// Dispose the fence and return `true` if it has signaled; otherwise
    /// return `false` and leave it untouched. Returns `true` at most once.
    pub fn try_consume_if_signaled<C: GraphicsContext>(
        &mut self,
        ctx: &mut C,
    ) -> bool {
        if self.handle.is_none() || !self.poll(ctx) {
            return false;
        }
        self.dispose(ctx);
        true
    }

    /// Delete the sync object regardless of its state.
    pub fn dispose<C: GraphicsContext>(&mut self, ctx: &mut C) {
        if let Some(handle) = self.handle.take() {
            ctx.delete_fence(handle);
        }
    }
}
