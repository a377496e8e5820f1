//! Mixer configuration
//!
//! - [`MixerConfig`]: sample rate, render period and buffer sizes
//! - YAML loading/saving
//! - Default config locations
//!
//! # Usage
//!
//! ```ignore
//! use loopmix_core::config::{default_config_path, load_mixer_config, CONFIG_FILE_NAME};
//! use loopmix_core::Mixer;
//!
//! let config = load_mixer_config(&default_config_path(CONFIG_FILE_NAME));
//! let mixer = Mixer::with_config(config)?;
//! ```

mod io;
mod mixer;
mod paths;

pub use io::{load_config, load_mixer_config, save_config};
pub use mixer::{
    MixerConfig, DEFAULT_MAX_FRAMES, DEFAULT_NODE_CAPACITY, DEFAULT_SAMPLE_RATE, MAX_FRAMES_LIMIT,
};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};
