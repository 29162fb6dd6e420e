use anyhow::Result;
use ferrex_texture_upload::{
    SoftwareContext, StreamingConfig, StreamingManager, TextureId,
    UploadRequest,
};

/// Bytes in a tightly packed RGBA8 square of `side` pixels.
pub fn rgba_bytes(side: u32) -> usize {
    (side * side * 4) as usize
}

/// RGBA8 upload of a `side`x`side` square filled with `fill`.
pub fn rgba_square(texture: u32, side: u32, fill: u8) -> UploadRequest {
    let data = vec![fill; rgba_bytes(side)];
    UploadRequest::rgba8(TextureId(texture), side, side, data)
}

/// Small, deterministic settings: 256-byte alignment, KiB-sized backends.
pub fn small_config() -> StreamingConfig {
    StreamingConfig {
        max_uploads_per_frame: 16,
        max_bytes_per_frame: 1024 * 1024,
        max_staging_bytes: 64 * 1024,
        persistent_ring_bytes: 64 * 1024,
        triple_buffer_bytes: 16 * 1024,
        pbo_alignment: 256,
        ..StreamingConfig::default()
    }
}

/// A manager wired to a software context.
pub struct StreamingHarness {
    pub ctx: SoftwareContext,
    pub manager: StreamingManager,
}

impl StreamingHarness {
    pub fn new(config: StreamingConfig) -> Result<Self> {
        Self::with_context(SoftwareContext::new(), config)
    }

    pub fn with_context(
        ctx: SoftwareContext,
        config: StreamingConfig,
    ) -> Result<Self> {
        super::init_logging();
        Ok(Self {
            ctx,
            manager: StreamingManager::new(config)?,
        })
    }

    pub fn tick(&mut self) -> ferrex_texture_upload::TickReport {
        self.manager.tick(&mut self.ctx)
    }

    /// Texture ids in upload order.
    pub fn uploaded_textures(&self) -> Vec<u32> {
        self.ctx
            .uploads()
            .iter()
            .filter_map(|upload| upload.texture.map(|texture| texture.0))
            .collect()
    }
}
