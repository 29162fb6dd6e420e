//! Routing of GPU object deletion between worker threads and the render
//! thread.

use std::sync::{Arc, Barrier};
use std::thread;

use anyhow::Result;
use ferrex_texture_upload::{
    BufferId, DeleteCommand, DisposeOutcome, GpuResource, ResourceKind,
    ResourceManagerSystem, SoftwareContext, TextureId,
};

#[path = "support/mod.rs"]
mod support;

fn system_for(ctx: &SoftwareContext) -> ResourceManagerSystem {
    support::init_logging();
    ResourceManagerSystem::new(Arc::new(ctx.clone()))
}

#[test]
fn worker_drops_are_executed_on_the_render_thread() -> Result<()> {
    let mut ctx = SoftwareContext::new();
    let system = system_for(&ctx);
    system.initialize();
    system.mark_render_thread()?;

    let resources: Vec<GpuResource> = (1..=6)
        .map(|id| GpuResource::texture(&system, TextureId(id)))
        .collect();
    thread::spawn(move || drop(resources))
        .join()
        .expect("worker thread");
    assert!(ctx.deletions().is_empty());

    assert_eq!(system.process_pending(&mut ctx), 6);
    let render_thread = thread::current().id();
    let deletions = ctx.deletions();
    assert_eq!(deletions.len(), 6);
    assert!(deletions.iter().all(|record| record.thread == render_thread));
    assert!(
        deletions
            .iter()
            .all(|record| record.command.kind() == ResourceKind::Texture)
    );
    Ok(())
}

#[test]
fn typed_enqueue_covers_every_kind() -> Result<()> {
    let mut ctx = SoftwareContext::new();
    let system = system_for(&ctx);
    let manager = system.initialize();

    manager.enqueue_delete_buffer(1);
    manager.enqueue_delete_texture(2);
    manager.enqueue_delete_vertex_array(3);
    manager.enqueue_delete_sampler(4);
    manager.enqueue_delete_framebuffer(5);
    manager.enqueue_delete_renderbuffer(6);
    manager.enqueue_delete_program(7);
    manager.enqueue_delete_shader(8);
    manager.enqueue_delete_query(9);
    assert_eq!(manager.pending(), 9);

    assert_eq!(system.process_pending(&mut ctx), 9);
    let commands: Vec<DeleteCommand> =
        ctx.deletions().into_iter().map(|record| record.command).collect();
    assert_eq!(commands[0], DeleteCommand::Buffer(1));
    assert_eq!(commands[8], DeleteCommand::Query(9));
    assert_eq!(
        commands.iter().map(DeleteCommand::id).collect::<Vec<_>>(),
        (1..=9).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn render_thread_disposal_is_immediate() -> Result<()> {
    let ctx = SoftwareContext::new();
    let system = system_for(&ctx);
    system.initialize();
    system.mark_render_thread()?;

    let buffer = GpuResource::buffer(&system, BufferId(5));
    assert_eq!(buffer.dispose(), DisposeOutcome::Deleted);
    assert_eq!(buffer.dispose(), DisposeOutcome::AlreadyDisposed);
    assert_eq!(ctx.deletions().len(), 1);
    Ok(())
}

#[test]
fn shutdown_racing_with_disposal_loses_nothing() -> Result<()> {
    const WORKERS: usize = 4;
    const PER_WORKER: u32 = 200;

    let mut ctx = SoftwareContext::new();
    let system = system_for(&ctx);
    system.initialize();
    system.mark_render_thread()?;

    let barrier = Arc::new(Barrier::new(WORKERS + 1));
    let workers: Vec<_> = (0..WORKERS as u32)
        .map(|worker| {
            let resources: Vec<GpuResource> = (0..PER_WORKER)
                .map(|n| {
                    GpuResource::new(
                        &system,
                        ResourceKind::Buffer,
                        worker * PER_WORKER + n + 1,
                    )
                })
                .collect();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                resources
                    .iter()
                    .map(GpuResource::dispose)
                    .filter(|outcome| *outcome == DisposeOutcome::Enqueued)
                    .count()
            })
        })
        .collect();

    barrier.wait();
    let drained = system.shutdown(&mut ctx);
    let enqueued: usize = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker thread"))
        .sum();

    assert_eq!(drained, enqueued);
    assert!(system.manager().is_none());
    let total = WORKERS * PER_WORKER as usize;
    assert_eq!(ctx.deletions().len(), total);

    let mut ids: Vec<u32> =
        ctx.deletions().iter().map(|record| record.command.id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    Ok(())
}
