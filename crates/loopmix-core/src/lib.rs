//! loopmix core - real-time multi-source audio mixer
//!
//! A [`Mixer`] blends up to [`MAX_SOURCES`] stereo sources into a host
//! output buffer from a hardware render callback, while control threads
//! register sources, feed them, adjust gain and read levels. Nothing the
//! render callback does can block, allocate or call into the `log` facade.

pub mod config;
pub mod engine;
pub mod error;
pub mod global;
pub mod handle;
pub mod probe;
pub mod types;

pub use config::MixerConfig;
pub use engine::{
    monotonic_timestamp_ns, LevelReading, LevelsSnapshot, LogLine, Mixer, MixerStatus,
    OutputBuffer, PushOutcome, SourceStatus,
};
pub use error::{status_code, ConfigError, ConfigResult, RenderError, STATUS_HARDWARE_ERROR, STATUS_OK};
pub use handle::MixerHandle;
pub use probe::{LatencyProbe, LatencyReport};
pub use types::*;
