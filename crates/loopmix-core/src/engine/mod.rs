//! Mixing engine
//!
//! - `ring`: timestamped drop-oldest stereo ring buffer
//! - `slot`: per-source controls and swappable data source
//! - `meter`: per-source level metering
//! - `log_queue`: bounded render diagnostics queue
//! - `delay`: per-source latency compensation
//! - `mixer`: the mixer itself, render entry point and control API
//! - `gc`: deferred deallocation of replaced buffers
//! - `clock`: monotonic timestamps

pub mod clock;
mod delay;
pub mod gc;
pub mod log_queue;
mod meter;
mod mixer;
mod ring;
mod slot;
mod status;

pub use clock::{frames_to_ns, monotonic_timestamp_ns, ns_per_frame};
pub use delay::DelayLine;
pub use log_queue::{LogLine, LogQueue, DEFAULT_LOG_CAPACITY, LOG_LINE_CAPACITY};
pub use meter::{BlockLevels, LevelMeter, LevelReading};
pub use mixer::{Mixer, OutputBuffer, RENDER_LOG_TARGET};
pub use ring::{AlignedRead, PushOutcome, SampleRing};
pub use slot::SourceSlot;
pub use status::{LevelsSnapshot, MixerStatus, SourceStatus};
