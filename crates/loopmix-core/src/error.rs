//! Mixer error types
//!
//! Control-plane failures ([`ConfigError`]) are returned synchronously to the
//! caller. Render failures ([`RenderError`]) come back from `process` and map
//! onto a host status code. Underruns and overruns are not errors at all.

use thiserror::Error;

use crate::types::MAX_SOURCES;

/// Host status for a successful render call
pub const STATUS_OK: i32 = 0;

/// Host status for any render failure (`'what'`, the unspecified hardware error)
pub const STATUS_HARDWARE_ERROR: i32 = 0x7768_6174;

/// Errors reported by mixer creation and control operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample rate must be positive and finite
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(f64),

    /// Max frames per render call must be non-zero
    #[error("Max frames per render call must be greater than zero")]
    ZeroMaxFrames,

    /// Frame count beyond what the mixer will preallocate
    #[error("{frames} frames exceeds the limit of {max}")]
    FramesTooLarge { frames: usize, max: usize },

    /// Log queue must hold at least one line
    #[error("Log queue capacity must be greater than zero")]
    ZeroLogCapacity,

    /// Ring capacity must be non-zero
    #[error("Ring capacity must be greater than zero frames")]
    ZeroCapacity,

    /// Slot index outside the fixed arena
    #[error("Source index {index} out of range (max {max})")]
    IndexOutOfRange { index: usize, max: usize },

    /// Index 0 belongs to the continuous source
    #[error("Source index {0} is reserved for the continuous source")]
    ReservedIndex(usize),

    /// Operation needs a registered node slot
    #[error("Source index {0} is not a registered node source")]
    NotANodeSource(usize),

    /// Slot has never been registered
    #[error("Source index {0} is not registered")]
    Unregistered(usize),

    /// Interleaved stereo data must hold an even number of samples
    #[error("Interleaved stereo data has odd sample count: {0}")]
    MisalignedFrames(usize),

    /// The handle was destroyed or never created
    #[error("Mixer handle is destroyed")]
    HandleDestroyed,
}

impl ConfigError {
    /// Range check shared by every per-index operation
    pub(crate) fn check_index(index: usize) -> ConfigResult<()> {
        if index >= MAX_SOURCES {
            Err(ConfigError::IndexOutOfRange {
                index,
                max: MAX_SOURCES,
            })
        } else {
            Ok(())
        }
    }
}

/// Result type for control operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned by the render entry point
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// No output buffer was supplied
    #[error("Render called without an output buffer")]
    MissingOutput,

    /// No render timestamp was supplied
    #[error("Render called without a timestamp")]
    MissingTimestamp,

    /// Caller asked for more frames than the mixer was created for
    #[error("Render of {requested} frames exceeds max of {max}")]
    FrameCountExceeded { requested: usize, max: usize },

    /// Output buffer cannot hold the requested frames
    #[error("Output holds {available} samples, {required} required")]
    OutputTooSmall { required: usize, available: usize },

    /// Output describes zero channels
    #[error("Output buffer has no channels")]
    UnsupportedChannels,

    /// Another thread is already inside `process`
    #[error("Render state is held by another render call")]
    RenderBusy,
}

/// Map a render result onto the host status code
pub fn status_code(result: &Result<(), RenderError>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(_) => STATUS_HARDWARE_ERROR,
    }
}
