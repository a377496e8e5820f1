//! Mixer configuration
//!
//! Fixed at mixer creation: everything sized from these values is allocated
//! up front, so nothing on the render path ever has to grow.

use serde::{Deserialize, Serialize};

use crate::engine::log_queue::DEFAULT_LOG_CAPACITY;
use crate::error::{ConfigError, ConfigResult};

/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;

/// Default maximum frames per render call
pub const DEFAULT_MAX_FRAMES: usize = 512;

/// Default node ring capacity in frames
pub const DEFAULT_NODE_CAPACITY: usize = 4096;

/// Compensation delay limit, in render periods, when none is configured
const DEFAULT_DELAY_PERIODS: usize = 8;

/// Largest accepted render period or compensation limit, in frames
pub const MAX_FRAMES_LIMIT: usize = 1 << 20;

/// Mixer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Sample rate in Hz (positive and finite)
    pub sample_rate: f64,

    /// Maximum frames the host requests per render call.
    /// Also the capacity of the continuous staging ring.
    pub max_frames: usize,

    /// Render log lines held before new ones are dropped
    pub log_capacity: usize,

    /// Ring capacity used by callers that register nodes without
    /// picking their own (the global convenience API, the soak runner)
    pub default_node_capacity_frames: usize,

    /// Largest per-source compensation delay in frames.
    /// Default: 8 render periods
    pub max_delay_frames: Option<usize>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_frames: DEFAULT_MAX_FRAMES,
            log_capacity: DEFAULT_LOG_CAPACITY,
            default_node_capacity_frames: DEFAULT_NODE_CAPACITY,
            max_delay_frames: None,
        }
    }
}

impl MixerConfig {
    /// Config with the given rate and period, defaults elsewhere
    pub fn new(sample_rate: f64, max_frames: usize) -> Self {
        Self {
            sample_rate,
            max_frames,
            ..Self::default()
        }
    }

    pub fn with_log_capacity(mut self, lines: usize) -> Self {
        self.log_capacity = lines;
        self
    }

    pub fn with_default_node_capacity(mut self, frames: usize) -> Self {
        self.default_node_capacity_frames = frames;
        self
    }

    pub fn with_max_delay_frames(mut self, frames: usize) -> Self {
        self.max_delay_frames = Some(frames);
        self
    }

    /// Check every field
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_frames == 0 {
            return Err(ConfigError::ZeroMaxFrames);
        }
        if self.max_frames > MAX_FRAMES_LIMIT {
            return Err(ConfigError::FramesTooLarge {
                frames: self.max_frames,
                max: MAX_FRAMES_LIMIT,
            });
        }
        if let Some(frames) = self.max_delay_frames.filter(|&f| f > MAX_FRAMES_LIMIT) {
            return Err(ConfigError::FramesTooLarge {
                frames,
                max: MAX_FRAMES_LIMIT,
            });
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }
        if self.default_node_capacity_frames == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Resolved compensation delay limit in frames
    pub fn max_delay(&self) -> usize {
        self.max_delay_frames
            .unwrap_or_else(|| self.max_frames.saturating_mul(DEFAULT_DELAY_PERIODS))
    }

    /// Duration of one full render period in milliseconds
    pub fn period_ms(&self) -> f64 {
        self.max_frames as f64 / self.sample_rate * 1000.0
    }
}
