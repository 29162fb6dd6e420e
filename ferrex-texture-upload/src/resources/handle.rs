use std::sync::atomic::{AtomicBool, Ordering};

use super::{DeleteCommand, ResourceKind, ResourceManagerSystem};
use crate::context::{BufferId, TextureId};

/// What a dispose call did with the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    Deleted,
    Enqueued,
    AlreadyDisposed,
}

/// Owning handle to a GPU object that may be dropped on any thread.
///
/// Dropping (or calling [`dispose`](Self::dispose)) routes the deletion
/// through the [`ResourceManagerSystem`]; the object is released exactly
/// once.
#[derive(Debug)]
pub struct GpuResource {
    command: DeleteCommand,
    system: ResourceManagerSystem,
    disposed: AtomicBool,
}

impl GpuResource {
    pub fn new(
        system: &ResourceManagerSystem,
        kind: ResourceKind,
        id: u32,
    ) -> Self {
        Self {
            command: DeleteCommand::new(kind, id),
            system: system.clone(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn buffer(system: &ResourceManagerSystem, buffer: BufferId) -> Self {
        Self::new(system, ResourceKind::Buffer, buffer.0)
    }

    pub fn texture(system: &ResourceManagerSystem, texture: TextureId) -> Self {
        Self::new(system, ResourceKind::Texture, texture.0)
    }

    pub fn id(&self) -> u32 {
        self.command.id()
    }

    pub fn kind(&self) -> ResourceKind {
        self.command.kind()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) -> DisposeOutcome {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return DisposeOutcome::AlreadyDisposed;
        }
        self.system.route_delete(self.command)
    }
}

impl Drop for GpuResource {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SoftwareContext;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn dispose_happens_once() {
        let ctx = SoftwareContext::new();
        let system = ResourceManagerSystem::new(Arc::new(ctx.clone()));

        let texture = GpuResource::texture(&system, TextureId(3));
        assert_eq!(texture.dispose(), DisposeOutcome::Deleted);
        assert_eq!(texture.dispose(), DisposeOutcome::AlreadyDisposed);
        drop(texture);

        assert_eq!(ctx.deletions().len(), 1);
        assert_eq!(ctx.deletions()[0].command, DeleteCommand::Texture(3));
    }

    #[test]
    fn drop_on_worker_thread_is_deferred() {
        let mut ctx = SoftwareContext::new();
        let system = ResourceManagerSystem::new(Arc::new(ctx.clone()));
        system.initialize();
        system.mark_render_thread().unwrap();

        let buffer = GpuResource::buffer(&system, BufferId(11));
        thread::spawn(move || drop(buffer)).join().unwrap();
        assert!(ctx.deletions().is_empty());

        assert_eq!(system.process_pending(&mut ctx), 1);
        let deletions = ctx.deletions();
        assert_eq!(deletions[0].command, DeleteCommand::Buffer(11));
        assert_eq!(deletions[0].thread, thread::current().id());
    }
}
