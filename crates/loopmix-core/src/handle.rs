//! Nullable mixer handle
//!
//! Mirrors the create/destroy contract a plugin host expects: a handle may be
//! null, destroying it twice is harmless, and every call on a destroyed handle
//! fails cleanly instead of touching freed memory.
//!
//! Clones share one mixer. [`MixerHandle::destroy`] releases this handle's
//! reference; the mixer's buffers go away when the last reference does, so a
//! render still holding a clone can never see them freed underneath it.

use std::sync::Arc;

use crate::config::MixerConfig;
use crate::engine::{LevelsSnapshot, LogLine, Mixer, MixerStatus, OutputBuffer, PushOutcome};
use crate::error::{ConfigError, ConfigResult, RenderError};

#[derive(Clone, Default)]
pub struct MixerHandle {
    mixer: Option<Arc<Mixer>>,
}

impl MixerHandle {
    /// Create a mixer and return a handle to it
    pub fn create(sample_rate: f64, max_frames: usize) -> ConfigResult<Self> {
        Self::create_with_config(MixerConfig::new(sample_rate, max_frames))
    }

    pub fn create_with_config(config: MixerConfig) -> ConfigResult<Self> {
        Ok(Self::from_mixer(Arc::new(Mixer::with_config(config)?)))
    }

    pub fn from_mixer(mixer: Arc<Mixer>) -> Self {
        Self { mixer: Some(mixer) }
    }

    /// A handle that refers to nothing
    pub fn null() -> Self {
        Self::default()
    }

    pub fn is_null(&self) -> bool {
        self.mixer.is_none()
    }

    /// Shared mixer, if the handle is live
    pub fn mixer(&self) -> Option<&Arc<Mixer>> {
        self.mixer.as_ref()
    }

    /// Release this handle's mixer; a no-op on a null handle
    pub fn destroy(&mut self) {
        if let Some(mixer) = self.mixer.take() {
            log::debug!(
                "Mixer handle destroyed ({} references left)",
                Arc::strong_count(&mixer) - 1
            );
        }
    }

    fn live(&self) -> ConfigResult<&Mixer> {
        self.mixer.as_deref().ok_or(ConfigError::HandleDestroyed)
    }

    /// Render through the handle; a null handle reports a missing output
    pub fn process(
        &self,
        output: Option<OutputBuffer<'_>>,
        frame_count: usize,
        timestamp_ns: Option<u64>,
    ) -> Result<(), RenderError> {
        match &self.mixer {
            Some(mixer) => mixer.process(output, frame_count, timestamp_ns),
            None => Err(RenderError::MissingOutput),
        }
    }

    pub fn submit_input(&self, data: &[f32]) -> ConfigResult<usize> {
        self.live()?.submit_input(data)
    }

    pub fn set_gain(&self, gain: f32) -> ConfigResult<()> {
        self.live()?.set_gain(gain);
        Ok(())
    }

    pub fn set_mute(&self, muted: bool) -> ConfigResult<()> {
        self.live()?.set_mute(muted);
        Ok(())
    }

    pub fn register_node_source(&self, index: usize, capacity_frames: usize) -> ConfigResult<()> {
        self.live()?.register_node_source(index, capacity_frames)
    }

    pub fn push_node_frames(
        &self,
        index: usize,
        data: &[f32],
        timestamp_ns: u64,
    ) -> ConfigResult<PushOutcome> {
        self.live()?.push_node_frames(index, data, timestamp_ns)
    }

    pub fn set_node_gain(&self, index: usize, gain: f32) -> ConfigResult<()> {
        self.live()?.set_node_gain(index, gain)
    }

    pub fn set_node_mute(&self, index: usize, muted: bool) -> ConfigResult<()> {
        self.live()?.set_node_mute(index, muted)
    }

    pub fn set_source_enabled(&self, index: usize, enabled: bool) -> ConfigResult<()> {
        self.live()?.set_source_enabled(index, enabled)
    }

    /// False on a null handle
    pub fn source_is_enabled(&self, index: usize) -> bool {
        self.mixer
            .as_ref()
            .is_some_and(|mixer| mixer.source_is_enabled(index))
    }

    /// Zero on a null handle
    pub fn source_count(&self) -> usize {
        self.mixer.as_ref().map_or(0, |mixer| mixer.source_count())
    }

    /// Zero on a null handle
    pub fn sample_rate(&self) -> f64 {
        self.mixer.as_ref().map_or(0.0, |mixer| mixer.sample_rate())
    }

    /// Zero on a null handle
    pub fn buffer_frames(&self) -> usize {
        self.mixer.as_ref().map_or(0, |mixer| mixer.buffer_frames())
    }

    /// Zero on a null handle
    pub fn latency_ms(&self) -> f64 {
        self.mixer.as_ref().map_or(0.0, |mixer| mixer.latency_ms())
    }

    pub fn levels(&self) -> Option<LevelsSnapshot> {
        self.mixer.as_ref().map(|mixer| mixer.levels())
    }

    pub fn status(&self) -> Option<MixerStatus> {
        self.mixer.as_ref().map(|mixer| mixer.status())
    }

    pub fn pop_log(&self) -> Option<LogLine> {
        self.mixer.as_ref().and_then(|mixer| mixer.pop_log())
    }
}

impl std::fmt::Debug for MixerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.mixer {
            Some(mixer) => f.debug_tuple("MixerHandle").field(mixer).finish(),
            None => f.write_str("MixerHandle(null)"),
        }
    }
}
