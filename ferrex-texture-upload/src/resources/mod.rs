//! GPU object deletion that is safe to trigger from any thread.
//!
//! GPU objects may only be deleted on the thread that owns the context.
//! Handles dropped elsewhere route a typed [`DeleteCommand`] through the
//! active [`ResourceManager`], which the render loop drains once per frame.

mod handle;
mod manager;

use std::fmt;

pub use handle::{DisposeOutcome, GpuResource};
pub use manager::{ResourceManager, ResourceManagerSystem};

/// Kinds of GPU objects the deletion queue understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    VertexArray,
    Sampler,
    Framebuffer,
    Renderbuffer,
    Program,
    Shader,
    Query,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::VertexArray => "vertex array",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Renderbuffer => "renderbuffer",
            ResourceKind::Program => "program",
            ResourceKind::Shader => "shader",
            ResourceKind::Query => "query",
        };
        f.write_str(name)
    }
}

/// Deletion of one GPU object, by kind and raw name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteCommand {
    Buffer(u32),
    Texture(u32),
    VertexArray(u32),
    Sampler(u32),
    Framebuffer(u32),
    Renderbuffer(u32),
    Program(u32),
    Shader(u32),
    Query(u32),
}

impl DeleteCommand {
    pub fn new(kind: ResourceKind, id: u32) -> Self {
        match kind {
            ResourceKind::Buffer => DeleteCommand::Buffer(id),
            ResourceKind::Texture => DeleteCommand::Texture(id),
            ResourceKind::VertexArray => DeleteCommand::VertexArray(id),
            ResourceKind::Sampler => DeleteCommand::Sampler(id),
            ResourceKind::Framebuffer => DeleteCommand::Framebuffer(id),
            ResourceKind::Renderbuffer => DeleteCommand::Renderbuffer(id),
            ResourceKind::Program => DeleteCommand::Program(id),
            ResourceKind::Shader => DeleteCommand::Shader(id),
            ResourceKind::Query => DeleteCommand::Query(id),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            DeleteCommand::Buffer(_) => ResourceKind::Buffer,
            DeleteCommand::Texture(_) => ResourceKind::Texture,
            DeleteCommand::VertexArray(_) => ResourceKind::VertexArray,
            DeleteCommand::Sampler(_) => ResourceKind::Sampler,
            DeleteCommand::Framebuffer(_) => ResourceKind::Framebuffer,
            DeleteCommand::Renderbuffer(_) => ResourceKind::Renderbuffer,
            DeleteCommand::Program(_) => ResourceKind::Program,
            DeleteCommand::Shader(_) => ResourceKind::Shader,
            DeleteCommand::Query(_) => ResourceKind::Query,
        }
    }

    pub fn id(&self) -> u32 {
        match *self {
            DeleteCommand::Buffer(id)
            | DeleteCommand::Texture(id)
            | DeleteCommand::VertexArray(id)
            | DeleteCommand::Sampler(id)
            | DeleteCommand::Framebuffer(id)
            | DeleteCommand::Renderbuffer(id)
            | DeleteCommand::Program(id)
            | DeleteCommand::Shader(id)
            | DeleteCommand::Query(id) => id,
        }
    }
}

impl fmt::Display for DeleteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// In-place deletion used when a dispose does not need to be deferred.
pub trait ImmediateDelete: Send + Sync {
    fn delete_now(&self, command: DeleteCommand);
}
