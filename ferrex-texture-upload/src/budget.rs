//! Per-tick upload budget.
//!
//! Counts uploads and bytes issued during one tick and answers whether the
//! next upload still fits under both caps. Unlike a "force one upload"
//! budget, the caps are hard: an upload that would overshoot either one is
//! refused even if it would be the first of the tick.

use crate::config::StreamingConfig;

/// Caps applied to a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudgetConfig {
    pub max_uploads: u32,
    pub max_bytes: u64,
}

impl From<&StreamingConfig> for FrameBudgetConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            max_uploads: config.max_uploads_per_frame,
            max_bytes: config.max_bytes_per_frame,
        }
    }
}

/// Upload/byte accounting for the tick in progress.
#[derive(Debug)]
pub struct FrameBudget {
    config: FrameBudgetConfig,
    uploads_this_frame: u32,
    bytes_this_frame: u64,
}

impl FrameBudget {
    pub fn new(config: FrameBudgetConfig) -> Self {
        Self {
            config,
            uploads_this_frame: 0,
            bytes_this_frame: 0,
        }
    }

    /// Reset per-tick counters. Call at the start of each tick.
    pub fn begin_frame(&mut self, config: FrameBudgetConfig) {
        self.config = config;
        self.uploads_this_frame = 0;
        self.bytes_this_frame = 0;
    }

    /// Whether both counters are still under their caps.
    pub fn has_headroom(&self) -> bool {
        self.uploads_this_frame < self.config.max_uploads
            && self.bytes_this_frame < self.config.max_bytes
    }

    /// Whether an upload of `bytes` keeps both counters within the caps.
    pub fn admits(&self, bytes: u64) -> bool {
        self.uploads_this_frame < self.config.max_uploads
            && self
                .bytes_this_frame
                .checked_add(bytes)
                .is_some_and(|total| total <= self.config.max_bytes)
    }

    pub fn record_upload(&mut self, bytes: u64) {
        self.uploads_this_frame += 1;
        self.bytes_this_frame += bytes;
        debug_assert!(self.uploads_this_frame <= self.config.max_uploads);
        debug_assert!(self.bytes_this_frame <= self.config.max_bytes);
    }

    pub fn uploads_this_frame(&self) -> u32 {
        self.uploads_this_frame
    }

    pub fn bytes_this_frame(&self) -> u64 {
        self.bytes_this_frame
    }

    pub fn config(&self) -> FrameBudgetConfig {
        self.config
    }
}
