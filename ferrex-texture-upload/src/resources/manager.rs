use std::fmt;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use super::{DeleteCommand, DisposeOutcome, ImmediateDelete};
use crate::context::GraphicsContext;
use crate::error::ResourceError;

/// Queue of deletions waiting for the render thread.
pub struct ResourceManager {
    delete_tx: Sender<DeleteCommand>,
    delete_rx: Receiver<DeleteCommand>,
}

impl ResourceManager {
    pub fn new() -> Self {
        let (delete_tx, delete_rx) = crossbeam_channel::unbounded();
        Self {
            delete_tx,
            delete_rx,
        }
    }

    pub fn enqueue(&self, command: DeleteCommand) {
        // The receiver lives as long as `self`, so an unbounded send cannot
        // fail here.
        let _ = self.delete_tx.send(command);
    }

    pub fn enqueue_delete_buffer(&self, id: u32) {
        self.enqueue(DeleteCommand::Buffer(id));
    }

    pub fn enqueue_delete_texture(&self, id: u32) {
        self.enqueue(DeleteCommand::Texture(id));
    }

    pub fn enqueue_delete_vertex_array(&self, id: u32) {
        self.enqueue(DeleteCommand::VertexArray(id));
    }

    pub fn enqueue_delete_sampler(&self, id: u32) {
        self.enqueue(DeleteCommand::Sampler(id));
    }

    pub fn enqueue_delete_framebuffer(&self, id: u32) {
        self.enqueue(DeleteCommand::Framebuffer(id));
    }

    pub fn enqueue_delete_renderbuffer(&self, id: u32) {
        self.enqueue(DeleteCommand::Renderbuffer(id));
    }

    pub fn enqueue_delete_program(&self, id: u32) {
        self.enqueue(DeleteCommand::Program(id));
    }

    pub fn enqueue_delete_shader(&self, id: u32) {
        self.enqueue(DeleteCommand::Shader(id));
    }

    pub fn enqueue_delete_query(&self, id: u32) {
        self.enqueue(DeleteCommand::Query(id));
    }

    pub fn pending(&self) -> usize {
        self.delete_rx.len()
    }

    /// Execute every queued deletion against `ctx`. Render thread only.
    pub fn process_pending<C: GraphicsContext>(&self, ctx: &mut C) -> usize {
        let mut executed = 0;
        for command in self.delete_rx.try_iter() {
            log::trace!("deleting {}", command);
            ctx.delete_object(command);
            executed += 1;
        }
        executed
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("pending", &self.pending())
            .finish()
    }
}

struct SystemInner {
    active: RwLock<Option<Arc<ResourceManager>>>,
    render_thread: OnceLock<ThreadId>,
    immediate: Arc<dyn ImmediateDelete>,
}

/// Cloneable handle to the deletion routing state.
///
/// Holds the swappable active manager, the render-thread marker and the sink
/// used for in-place deletes. Construct one per context and share clones.
#[derive(Clone)]
pub struct ResourceManagerSystem {
    inner: Arc<SystemInner>,
}

impl ResourceManagerSystem {
    pub fn new(immediate: Arc<dyn ImmediateDelete>) -> Self {
        Self {
            inner: Arc::new(SystemInner {
                active: RwLock::new(None),
                render_thread: OnceLock::new(),
                immediate,
            }),
        }
    }

    /// Install a manager if none is active and return the active one.
    pub fn initialize(&self) -> Arc<ResourceManager> {
        let mut active = self.inner.active.write();
        Arc::clone(active.get_or_insert_with(|| {
            log::debug!("resource manager installed");
            Arc::new(ResourceManager::new())
        }))
    }

    pub fn manager(&self) -> Option<Arc<ResourceManager>> {
        self.inner.active.read().clone()
    }

    /// Record the calling thread as the render thread. Marking the same
    /// thread again is a no-op.
    pub fn mark_render_thread(&self) -> Result<(), ResourceError> {
        let current = thread::current().id();
        let marked = *self.inner.render_thread.get_or_init(|| current);
        if marked == current {
            Ok(())
        } else {
            Err(ResourceError::RenderThreadAlreadyMarked {
                existing: format!("{marked:?}"),
            })
        }
    }

    pub fn render_thread(&self) -> Option<ThreadId> {
        self.inner.render_thread.get().copied()
    }

    pub fn is_render_thread(&self) -> bool {
        self.render_thread() == Some(thread::current().id())
    }

    /// Defer `command` when called off the render thread with a manager
    /// installed; otherwise delete it in place.
    pub fn route_delete(&self, command: DeleteCommand) -> DisposeOutcome {
        {
            // Held across the enqueue so `shutdown` cannot swap the manager
            // out between the check and the send.
            let active = self.inner.active.read();
            if let Some(manager) = active.as_ref()
                && let Some(render_thread) = self.render_thread()
                && render_thread != thread::current().id()
            {
                manager.enqueue(command);
                return DisposeOutcome::Enqueued;
            }
        }
        self.inner.immediate.delete_now(command);
        DisposeOutcome::Deleted
    }

    /// Drain queued deletions into `ctx`. Call once per frame on the render
    /// thread.
    pub fn process_pending<C: GraphicsContext>(&self, ctx: &mut C) -> usize {
        match self.manager() {
            Some(manager) => manager.process_pending(ctx),
            None => 0,
        }
    }

    /// Uninstall the manager and execute whatever it still holds.
    pub fn shutdown<C: GraphicsContext>(&self, ctx: &mut C) -> usize {
        let Some(manager) = self.inner.active.write().take() else {
            return 0;
        };
        let drained = manager.process_pending(ctx);
        log::debug!("resource manager shut down; drained {drained} deletions");
        drained
    }
}

impl fmt::Debug for ResourceManagerSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ResourceManagerSystem");
        debug.field("render_thread", &self.render_thread());
        match self.inner.active.try_read() {
            Some(active) => {
                debug.field("active", &active.as_deref());
            }
            None => {
                debug.field("active", &"<locked>");
            }
        }
        debug.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SoftwareContext;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Sink {}
        impl ImmediateDelete for Sink {
            fn delete_now(&self, command: DeleteCommand);
        }
    }

    fn system_with(sink: MockSink) -> ResourceManagerSystem {
        ResourceManagerSystem::new(Arc::new(sink))
    }

    #[test]
    fn without_manager_deletes_in_place() {
        let mut sink = MockSink::new();
        sink.expect_delete_now()
            .with(eq(DeleteCommand::Texture(4)))
            .times(1)
            .return_const(());
        let system = system_with(sink);
        system.mark_render_thread().unwrap();

        let outcome = thread::scope(|scope| {
            scope
                .spawn(|| system.route_delete(DeleteCommand::Texture(4)))
                .join()
                .unwrap()
        });
        assert_eq!(outcome, DisposeOutcome::Deleted);
    }

    #[test]
    fn unknown_render_thread_deletes_in_place() {
        let mut sink = MockSink::new();
        sink.expect_delete_now().times(1).return_const(());
        let system = system_with(sink);
        system.initialize();

        assert_eq!(
            system.route_delete(DeleteCommand::Buffer(1)),
            DisposeOutcome::Deleted
        );
        assert_eq!(system.manager().unwrap().pending(), 0);
    }

    #[test]
    fn render_thread_deletes_in_place() {
        let mut sink = MockSink::new();
        sink.expect_delete_now().times(1).return_const(());
        let system = system_with(sink);
        system.initialize();
        system.mark_render_thread().unwrap();

        assert_eq!(
            system.route_delete(DeleteCommand::Shader(2)),
            DisposeOutcome::Deleted
        );
    }

    #[test]
    fn other_threads_enqueue() {
        let mut sink = MockSink::new();
        sink.expect_delete_now().times(0);
        let system = system_with(sink);
        let manager = system.initialize();
        system.mark_render_thread().unwrap();

        thread::scope(|scope| {
            scope.spawn(|| {
                assert_eq!(
                    system.route_delete(DeleteCommand::Program(9)),
                    DisposeOutcome::Enqueued
                );
            });
        });
        assert_eq!(manager.pending(), 1);

        let mut ctx = SoftwareContext::new();
        assert_eq!(system.process_pending(&mut ctx), 1);
        assert_eq!(ctx.deletions()[0].command, DeleteCommand::Program(9));
        assert_eq!(ctx.deletions()[0].thread, thread::current().id());
    }

    #[test]
    fn remarking_another_thread_is_rejected() {
        let system = system_with(MockSink::new());
        system.mark_render_thread().unwrap();
        system.mark_render_thread().unwrap();

        let result = thread::scope(|scope| {
            scope.spawn(|| system.mark_render_thread()).join().unwrap()
        });
        assert!(matches!(
            result,
            Err(ResourceError::RenderThreadAlreadyMarked { .. })
        ));
        assert!(system.is_render_thread());
    }

    #[test]
    fn shutdown_drains_and_uninstalls() {
        let system = system_with(MockSink::new());
        let manager = system.initialize();
        manager.enqueue_delete_buffer(1);
        manager.enqueue_delete_query(2);

        let mut ctx = SoftwareContext::new();
        assert_eq!(system.shutdown(&mut ctx), 2);
        assert!(system.manager().is_none());
        assert_eq!(system.shutdown(&mut ctx), 0);
    }

    #[test]
    fn initialize_is_idempotent() {
        let system = system_with(MockSink::new());
        let first = system.initialize();
        let second = system.initialize();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
