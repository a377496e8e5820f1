//! Mixer core
//!
//! Owns the slot arena, the render log queue and the render-private state,
//! and exposes both sides of the engine:
//!
//! - [`Mixer::process`] is the real-time entry point, called once per
//!   hardware period. It never blocks, never allocates and never calls into
//!   the `log` facade; diagnostics go to the bounded [`LogQueue`].
//! - Everything else is the control plane, safe to call from any thread
//!   while a render is in flight.
//!
//! Slot 0 is the continuous source, fed by [`Mixer::submit_input`]. Slots
//! 1..[`MAX_SOURCES`] are node sources with their own timestamped rings.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, TryLockError};

use super::delay::DelayLine;
use super::gc::gc_handle;
use super::log_queue::{LogLine, LogQueue};
use super::meter::{BlockLevels, LevelReading};
use super::ring::{PushOutcome, SampleRing};
use super::slot::{SlotSource, SourceSlot};
use super::status::{LevelsSnapshot, MixerStatus, SourceStatus};
use crate::config::MixerConfig;
use crate::error::{ConfigError, ConfigResult, RenderError};
use crate::types::{
    as_frames, db_to_gain, gain_to_db, SourceKind, StereoSample, CHANNELS, CONTINUOUS_SLOT,
    MAX_SOURCES,
};

/// Log target used when forwarding render log lines
pub const RENDER_LOG_TARGET: &str = "loopmix::render";

/// Host-provided interleaved output buffer
pub struct OutputBuffer<'a> {
    data: &'a mut [f32],
    channels: usize,
}

impl<'a> OutputBuffer<'a> {
    /// Interleaved buffer with `channels` samples per frame
    pub fn interleaved(data: &'a mut [f32], channels: usize) -> Self {
        Self { data, channels }
    }

    /// Interleaved stereo buffer
    pub fn stereo(data: &'a mut [f32]) -> Self {
        Self::interleaved(data, CHANNELS)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames the buffer can hold
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }

    fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Write the mix bus in the host layout
    ///
    /// L/R go to channels 0/1 and extra channels are zeroed; a mono output
    /// gets the average of both sides.
    fn write_frames(&mut self, frames: &[StereoSample]) {
        if self.channels == 1 {
            for (out, frame) in self.data.iter_mut().zip(frames) {
                *out = (frame.left + frame.right) * 0.5;
            }
            return;
        }
        for (out, frame) in self.data.chunks_exact_mut(self.channels).zip(frames) {
            out[0] = frame.left;
            out[1] = frame.right;
            out[CHANNELS..].fill(0.0);
        }
    }
}

/// Render-side bookkeeping for one slot
#[derive(Debug, Default, Clone, Copy)]
struct LaneState {
    /// Slot generation this lane's delay line belongs to
    generation: u64,
    underrunning: bool,
    skipping_stale: bool,
    /// Compensation setting the lane last acted on
    applied_latency: i64,
    /// Frames still to discard for a negative compensation
    advance_deficit: usize,
}

impl LaneState {
    fn note_shortfall(&mut self, slot: &SourceSlot, log: &LogQueue, short: usize) {
        if short > 0 {
            slot.add_underrun(short);
            if !self.underrunning {
                self.underrunning = true;
                log.push_fmt(format_args!(
                    "source {}: underrun, {} frames short",
                    slot.index(),
                    short
                ));
            }
        } else if self.underrunning {
            self.underrunning = false;
            log.push_fmt(format_args!("source {}: underrun recovered", slot.index()));
        }
    }

    fn note_stale(&mut self, slot: &SourceSlot, log: &LogQueue, stale: usize) {
        if stale > 0 {
            slot.add_stale(stale);
            if !self.skipping_stale {
                log.push_fmt(format_args!(
                    "source {}: skipped {} stale frames",
                    slot.index(),
                    stale
                ));
            }
        }
        self.skipping_stale = stale > 0;
    }

    /// Pick up a changed compensation setting
    ///
    /// A negative setting arms a deficit that is discarded from the ring
    /// over the following passes, as buffered frames become available.
    fn update_latency(&mut self, latency: i64) {
        if latency != self.applied_latency {
            self.advance_deficit = if latency < 0 {
                latency.unsigned_abs() as usize
            } else {
                0
            };
            self.applied_latency = latency;
        }
    }

    fn advance(&mut self, ring: &SampleRing) {
        if self.advance_deficit > 0 {
            self.advance_deficit -= ring.discard(self.advance_deficit);
        }
    }
}

/// State only the render call touches
struct RenderState {
    /// Summed output of all slots
    bus: Vec<StereoSample>,
    /// One slot's pulled frames
    scratch: Vec<StereoSample>,
    delays: [DelayLine; MAX_SOURCES],
    lanes: [LaneState; MAX_SOURCES],
}

impl RenderState {
    fn new(max_frames: usize, max_delay: usize) -> Self {
        Self {
            bus: vec![StereoSample::silence(); max_frames],
            scratch: vec![StereoSample::silence(); max_frames],
            delays: std::array::from_fn(|_| DelayLine::new(max_delay)),
            lanes: [LaneState::default(); MAX_SOURCES],
        }
    }

    /// Mix every contributing slot into `bus[..frames]`, returning the bus peak
    fn mix(
        &mut self,
        slots: &[SourceSlot; MAX_SOURCES],
        log: &LogQueue,
        frames: usize,
        timestamp_ns: u64,
    ) -> f32 {
        let bus = &mut self.bus[..frames];
        bus.fill(StereoSample::silence());

        for ((slot, lane), delay) in slots
            .iter()
            .zip(self.lanes.iter_mut())
            .zip(self.delays.iter_mut())
        {
            // Re-registered: old delayed audio belongs to the old buffer
            let generation = slot.generation();
            if generation != lane.generation {
                *lane = LaneState {
                    generation,
                    ..LaneState::default()
                };
                delay.clear();
            }
            let latency = slot.latency_frames();
            lane.update_latency(latency);

            if !slot.is_enabled() || slot.is_muted() {
                slot.meter().reset();
                continue;
            }

            let source = slot.source();
            let scratch = &mut self.scratch[..frames];
            let pulled = match &*source {
                SlotSource::Inert => {
                    slot.meter().reset();
                    continue;
                }
                SlotSource::Continuous(ring) => {
                    lane.advance(ring);
                    ring.pop_into(scratch)
                }
                SlotSource::Node(ring) => {
                    lane.advance(ring);
                    let read = ring.read_aligned(scratch, timestamp_ns);
                    lane.note_stale(slot, log, read.stale);
                    read.frames
                }
            };
            scratch[pulled..].fill(StereoSample::silence());
            lane.note_shortfall(slot, log, frames - pulled);

            delay.set_delay(latency.max(0) as usize);
            delay.process(scratch);

            let gain = slot.gain();
            let mut levels = BlockLevels::default();
            for (mixed, &dry) in bus.iter_mut().zip(scratch.iter()) {
                let wet = dry * gain;
                *mixed += wet;
                levels.accumulate(dry, wet);
            }
            slot.meter().record(levels.finish());
        }

        bus.iter().fold(0.0f32, |peak, frame| peak.max(frame.peak()))
    }
}

/// Real-time multi-source mixer
pub struct Mixer {
    config: MixerConfig,
    slots: [SourceSlot; MAX_SOURCES],
    log: LogQueue,
    render: Mutex<RenderState>,
    /// Set after a rejected render call so repeated rejections log once
    render_rejected: AtomicBool,
    /// Peak of the last mixed pass as f32 bits
    mixed_peak: AtomicU32,
}

impl Mixer {
    /// Create a mixer with default buffer sizes
    pub fn new(sample_rate: f64, max_frames: usize) -> ConfigResult<Self> {
        Self::with_config(MixerConfig::new(sample_rate, max_frames))
    }

    /// Create a mixer from a full configuration
    ///
    /// Every buffer the render path uses is allocated here.
    pub fn with_config(config: MixerConfig) -> ConfigResult<Self> {
        config.validate()?;

        let gc = gc_handle();
        let slots: [SourceSlot; MAX_SOURCES] = std::array::from_fn(|i| SourceSlot::new(i, &gc));
        slots[CONTINUOUS_SLOT].install(
            SlotSource::Continuous(SampleRing::new(config.max_frames, config.sample_rate)),
            &gc,
        );

        log::info!(
            "Mixer created: {} Hz, {} frames per render ({:.2} ms), {} log lines, max delay {} frames",
            config.sample_rate,
            config.max_frames,
            config.period_ms(),
            config.log_capacity,
            config.max_delay()
        );

        Ok(Self {
            render: Mutex::new(RenderState::new(config.max_frames, config.max_delay())),
            log: LogQueue::new(config.log_capacity),
            slots,
            config,
            render_rejected: AtomicBool::new(false),
            mixed_peak: AtomicU32::new(0.0f32.to_bits()),
        })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────
    // Render
    // ─────────────────────────────────────────────────────────────────────

    /// Render `frame_count` frames into `output`
    ///
    /// Real-time safe. A missing output or timestamp fails without touching
    /// anything. An oversized request, a buffer that cannot hold it or a
    /// render already in progress fails with the output silenced. Underruns are not errors: missing frames
    /// render as silence.
    pub fn process(
        &self,
        output: Option<OutputBuffer<'_>>,
        frame_count: usize,
        timestamp_ns: Option<u64>,
    ) -> Result<(), RenderError> {
        let Some(mut output) = output else {
            return Err(RenderError::MissingOutput);
        };
        let Some(timestamp_ns) = timestamp_ns else {
            return Err(RenderError::MissingTimestamp);
        };

        if let Err(err) = self.check_render(&output, frame_count) {
            output.silence();
            if !self.render_rejected.swap(true, Ordering::Relaxed) {
                self.log.push_fmt(format_args!("render rejected: {}", err));
            }
            return Err(err);
        }
        if frame_count == 0 {
            return Ok(());
        }

        let mut state = match self.render.try_lock() {
            Ok(state) => state,
            // A panic mid-render leaves nothing inconsistent worth refusing over
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                output.silence();
                return Err(RenderError::RenderBusy);
            }
        };
        self.render_rejected.store(false, Ordering::Relaxed);

        let peak = state.mix(&self.slots, &self.log, frame_count, timestamp_ns);
        self.mixed_peak.store(peak.to_bits(), Ordering::Relaxed);
        output.write_frames(&state.bus[..frame_count]);
        Ok(())
    }

    fn check_render(&self, output: &OutputBuffer<'_>, frame_count: usize) -> Result<(), RenderError> {
        if output.channels == 0 {
            return Err(RenderError::UnsupportedChannels);
        }
        if frame_count > self.config.max_frames {
            return Err(RenderError::FrameCountExceeded {
                requested: frame_count,
                max: self.config.max_frames,
            });
        }
        let required = frame_count.saturating_mul(output.channels);
        if output.data.len() < required {
            return Err(RenderError::OutputTooSmall {
                required,
                available: output.data.len(),
            });
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Continuous source (slot 0)
    // ─────────────────────────────────────────────────────────────────────

    /// Stage interleaved stereo input for the next render
    ///
    /// Newest-wins: unconsumed frames from an earlier submission are thrown
    /// away, and a submission longer than `max_frames` keeps its newest
    /// frames. Returns the number of frames staged.
    pub fn submit_input(&self, data: &[f32]) -> ConfigResult<usize> {
        let frames = as_frames(data).ok_or(ConfigError::MisalignedFrames(data.len()))?;
        let source = self.slots[CONTINUOUS_SLOT].source();
        let staged = source
            .ring()
            .map_or(0, |ring| ring.replace(frames, None).written);
        Ok(staged)
    }

    /// Continuous source gain (linear)
    pub fn set_gain(&self, gain: f32) {
        self.slots[CONTINUOUS_SLOT].set_gain(gain);
    }

    /// Continuous source gain in dB
    pub fn set_gain_db(&self, db: f32) {
        self.set_gain(db_to_gain(db));
    }

    pub fn gain(&self) -> f32 {
        self.slots[CONTINUOUS_SLOT].gain()
    }

    pub fn set_mute(&self, muted: bool) {
        self.slots[CONTINUOUS_SLOT].set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.slots[CONTINUOUS_SLOT].is_muted()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Node sources
    // ─────────────────────────────────────────────────────────────────────

    /// Register (or re-register) a node source with a ring of
    /// `capacity_frames` frames
    ///
    /// Re-registration swaps in a fresh empty ring; gain, mute and delay carry
    /// over. Safe while rendering. Pushes racing a re-registration of the same
    /// index may land in the old ring and be lost.
    pub fn register_node_source(&self, index: usize, capacity_frames: usize) -> ConfigResult<()> {
        ConfigError::check_index(index)?;
        if index == CONTINUOUS_SLOT {
            return Err(ConfigError::ReservedIndex(index));
        }
        if capacity_frames == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let ring = SampleRing::new(capacity_frames, self.config.sample_rate);
        let previous = self.slots[index].install(SlotSource::Node(ring), &gc_handle());

        if previous.is_registered() {
            log::info!(
                "Re-registered node source {} with {} frames",
                index,
                capacity_frames
            );
        } else {
            log::info!(
                "Registered node source {} with {} frames",
                index,
                capacity_frames
            );
        }
        Ok(())
    }

    /// Register a node source with the configured default capacity
    pub fn register_default_node_source(&self, index: usize) -> ConfigResult<()> {
        self.register_node_source(index, self.config.default_node_capacity_frames)
    }

    /// Append interleaved stereo frames to a node's ring
    ///
    /// `timestamp_ns` is the capture time of the first frame on the same
    /// clock the host uses for render timestamps. Never blocks; when the ring
    /// is full the oldest frames are dropped.
    pub fn push_node_frames(
        &self,
        index: usize,
        data: &[f32],
        timestamp_ns: u64,
    ) -> ConfigResult<PushOutcome> {
        ConfigError::check_index(index)?;
        let slot = &self.slots[index];
        let source = slot.source();
        let SlotSource::Node(ring) = &*source else {
            return Err(ConfigError::NotANodeSource(index));
        };
        let frames = as_frames(data).ok_or(ConfigError::MisalignedFrames(data.len()))?;

        let outcome = ring.push(frames, Some(timestamp_ns));
        if slot.note_overrun(outcome.dropped) {
            self.log.push_fmt(format_args!(
                "source {}: overrun, dropped {} oldest frames",
                index, outcome.dropped
            ));
        }
        Ok(outcome)
    }

    pub fn set_node_gain(&self, index: usize, gain: f32) -> ConfigResult<()> {
        self.node_slot(index)?.set_gain(gain);
        Ok(())
    }

    pub fn set_node_mute(&self, index: usize, muted: bool) -> ConfigResult<()> {
        self.node_slot(index)?.set_muted(muted);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Any registered source
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_source_gain(&self, index: usize, gain: f32) -> ConfigResult<()> {
        self.registered_slot(index)?.set_gain(gain);
        Ok(())
    }

    /// Set gain in dB; -120 dB and below is silence
    pub fn set_source_gain_db(&self, index: usize, db: f32) -> ConfigResult<()> {
        self.set_source_gain(index, db_to_gain(db))
    }

    pub fn source_gain(&self, index: usize) -> ConfigResult<f32> {
        Ok(self.registered_slot(index)?.gain())
    }

    pub fn set_source_mute(&self, index: usize, muted: bool) -> ConfigResult<()> {
        self.registered_slot(index)?.set_muted(muted);
        Ok(())
    }

    pub fn source_is_muted(&self, index: usize) -> ConfigResult<bool> {
        Ok(self.registered_slot(index)?.is_muted())
    }

    /// Shift a source by `frames` to line it up with the others
    ///
    /// Positive values delay the source. Negative values advance it by
    /// discarding that many buffered frames once, spread over as many render
    /// passes as it takes for the frames to arrive. The magnitude is clamped
    /// to the configured maximum. Returns the applied value.
    pub fn set_source_latency(&self, index: usize, frames: i64) -> ConfigResult<i64> {
        let slot = self.registered_slot(index)?;
        let max = i64::try_from(self.config.max_delay()).unwrap_or(i64::MAX);
        let applied = frames.clamp(-max, max);
        if applied != frames {
            log::warn!(
                "Source {}: latency {} frames exceeds max {}, clamping",
                index,
                frames,
                max
            );
        }
        slot.set_latency_frames(applied);
        Ok(applied)
    }

    pub fn source_latency(&self, index: usize) -> ConfigResult<i64> {
        Ok(self.registered_slot(index)?.latency_frames())
    }

    /// Enable or disable any slot; only the range is checked
    pub fn set_source_enabled(&self, index: usize, enabled: bool) -> ConfigResult<()> {
        ConfigError::check_index(index)?;
        self.slots[index].set_enabled(enabled);
        Ok(())
    }

    /// Whether a slot is enabled (false for out-of-range indices)
    pub fn source_is_enabled(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(SourceSlot::is_enabled)
    }

    /// Kind of the slot at `index` (unregistered when out of range)
    pub fn source_kind(&self, index: usize) -> SourceKind {
        self.slots.get(index).map_or(SourceKind::Unregistered, SourceSlot::kind)
    }

    /// Registered slots, the continuous source included
    pub fn source_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.kind().is_registered())
            .count()
    }

    pub fn slot(&self, index: usize) -> Option<&SourceSlot> {
        self.slots.get(index)
    }

    fn registered_slot(&self, index: usize) -> ConfigResult<&SourceSlot> {
        ConfigError::check_index(index)?;
        let slot = &self.slots[index];
        if slot.kind().is_registered() {
            Ok(slot)
        } else {
            Err(ConfigError::Unregistered(index))
        }
    }

    fn node_slot(&self, index: usize) -> ConfigResult<&SourceSlot> {
        ConfigError::check_index(index)?;
        let slot = &self.slots[index];
        if slot.kind() == SourceKind::Node {
            Ok(slot)
        } else {
            Err(ConfigError::NotANodeSource(index))
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Telemetry
    // ─────────────────────────────────────────────────────────────────────

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    /// Maximum frames per render call
    pub fn buffer_frames(&self) -> usize {
        self.config.max_frames
    }

    /// Render period plus the largest compensation delay in use
    ///
    /// Advances do not shorten the figure.
    pub fn latency_ms(&self) -> f64 {
        let max_delay = self
            .slots
            .iter()
            .filter(|slot| slot.is_enabled() && slot.kind().is_registered())
            .map(SourceSlot::latency_frames)
            .max()
            .unwrap_or(0)
            .max(0);
        self.config.period_ms() + max_delay as f64 / self.config.sample_rate * 1000.0
    }

    /// Levels of one slot from the last render pass
    pub fn source_levels(&self, index: usize) -> Option<LevelReading> {
        self.slots.get(index).map(|slot| slot.meter().reading())
    }

    /// Post-gain peak and RMS of every slot, bounded by the mixed peak
    pub fn levels(&self) -> LevelsSnapshot {
        let mixed_peak = f32::from_bits(self.mixed_peak.load(Ordering::Relaxed));
        let mut snapshot = LevelsSnapshot::default();
        for slot in &self.slots {
            let reading = slot.meter().reading();
            snapshot.inputs[slot.index()] = reading.peak.min(mixed_peak);
            snapshot.outputs[slot.index()] = reading.rms.min(mixed_peak);
        }
        let count = self
            .slots
            .iter()
            .rposition(|slot| slot.kind().is_registered())
            .map_or(0, |last| last + 1);
        snapshot.input_count = count;
        snapshot.output_count = count;
        snapshot
    }

    /// Full diagnostic snapshot
    pub fn status(&self) -> MixerStatus {
        let sources: Vec<SourceStatus> = self
            .slots
            .iter()
            .filter(|slot| slot.kind().is_registered())
            .map(|slot| {
                let reading = slot.meter().reading();
                let gain = slot.gain();
                SourceStatus {
                    index: slot.index(),
                    kind: slot.kind(),
                    name: slot.name(),
                    gain,
                    gain_db: gain_to_db(gain),
                    muted: slot.is_muted(),
                    enabled: slot.is_enabled(),
                    latency_frames: slot.latency_frames(),
                    buffer_fill: slot.fill_ratio(),
                    peak: reading.peak,
                    rms: reading.rms,
                    input_rms: reading.input_rms,
                    underrun_frames: slot.underrun_frames(),
                    overrun_frames: slot.overrun_frames(),
                    stale_frames: slot.stale_frames(),
                }
            })
            .collect();

        let buffer_fill = if sources.is_empty() {
            0.0
        } else {
            sources.iter().map(|s| s.buffer_fill).sum::<f32>() / sources.len() as f32
        };

        MixerStatus {
            sample_rate: self.config.sample_rate,
            buffer_frames: self.config.max_frames,
            latency_ms: self.latency_ms(),
            buffer_fill,
            dropped_log_lines: self.log.dropped(),
            sources,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Render log
    // ─────────────────────────────────────────────────────────────────────

    /// Oldest pending render log line
    pub fn pop_log(&self) -> Option<LogLine> {
        self.log.pop()
    }

    /// Forward every pending render log line to the `log` facade
    ///
    /// Returns the number of lines forwarded.
    pub fn drain_logs(&self) -> usize {
        let mut forwarded = 0;
        while let Some(line) = self.log.pop() {
            log::info!(target: RENDER_LOG_TARGET, "{}", line);
            forwarded += 1;
        }
        forwarded
    }

    /// Render log lines lost to a full queue
    pub fn dropped_log_lines(&self) -> u64 {
        self.log.dropped()
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        log::debug!(
            "Mixer destroyed ({} sources, {} pending log lines)",
            self.source_count(),
            self.log.len()
        );
    }
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixer")
            .field("config", &self.config)
            .field("sources", &self.source_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::{frames_to_ns, monotonic_timestamp_ns};
    use crate::error::{status_code, STATUS_HARDWARE_ERROR, STATUS_OK};
    use std::sync::Arc;

    const RATE: f64 = 48_000.0;

    fn sine(frames: usize, freq: f32, amp: f32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let x = (i as f32 * freq * std::f32::consts::TAU / RATE as f32).sin() * amp;
                [x, -x * 0.5]
            })
            .collect()
    }

    fn ramp(start: usize, frames: usize) -> Vec<f32> {
        (start..start + frames)
            .flat_map(|i| [i as f32, i as f32 + 0.5])
            .collect()
    }

    fn render(mixer: &Mixer, frames: usize, timestamp_ns: u64) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * CHANNELS];
        mixer
            .process(Some(OutputBuffer::stereo(&mut out)), frames, Some(timestamp_ns))
            .unwrap();
        out
    }

    #[test]
    fn test_mixer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Mixer>();
    }

    #[test]
    fn test_create_validates_config() {
        assert!(Mixer::new(48_000.0, 512).is_ok());
        assert!(Mixer::new(44_100.0, 1).is_ok());
        assert_eq!(
            Mixer::new(0.0, 512).unwrap_err(),
            ConfigError::InvalidSampleRate(0.0)
        );
        assert!(Mixer::new(f64::INFINITY, 512).is_err());
        assert_eq!(Mixer::new(48_000.0, 0).unwrap_err(), ConfigError::ZeroMaxFrames);
        assert_eq!(
            Mixer::with_config(MixerConfig::new(48_000.0, 64).with_log_capacity(0)).unwrap_err(),
            ConfigError::ZeroLogCapacity
        );
    }

    #[test]
    fn test_new_mixer_has_continuous_slot() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        assert_eq!(mixer.source_count(), 1);
        assert_eq!(mixer.source_kind(0), SourceKind::Continuous);
        assert!(mixer.source_is_enabled(0));
        assert!(!mixer.source_is_enabled(1));
        assert!(!mixer.source_is_enabled(MAX_SOURCES));
        assert_eq!(mixer.gain(), 1.0);
        assert!(!mixer.is_muted());
    }

    #[test]
    fn test_every_frame_count_up_to_max_renders() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        for frames in 1..=128 {
            let mut out = vec![1.0f32; frames * CHANNELS];
            let result = mixer.process(Some(OutputBuffer::stereo(&mut out)), frames, Some(0));
            assert_eq!(status_code(&result), STATUS_OK);
            assert!(out.iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_zero_frames_touches_nothing() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.submit_input(&sine(64, 440.0, 0.5)).unwrap();

        let mut out = vec![7.0f32; 16];
        mixer
            .process(Some(OutputBuffer::stereo(&mut out)), 0, Some(0))
            .unwrap();
        assert!(out.iter().all(|&s| s == 7.0));

        // Staged input is still there
        let out = render(&mixer, 64, 0);
        assert_eq!(out, sine(64, 440.0, 0.5));
    }

    #[test]
    fn test_continuous_passthrough_is_bit_exact() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        let input = sine(256, 1000.0, 0.8);
        assert_eq!(mixer.submit_input(&input).unwrap(), 256);

        let out = render(&mixer, 256, 0);
        assert_eq!(out, input);
    }

    #[test]
    fn test_mute_silences_regardless_of_gain() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.set_gain(4.0);
        mixer.set_mute(true);
        mixer.submit_input(&sine(128, 440.0, 0.9)).unwrap();

        let out = render(&mixer, 128, 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(mixer.source_levels(0), Some(LevelReading::default()));
    }

    #[test]
    fn test_two_sources_mix_linearly() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        mixer.register_node_source(1, 1024).unwrap();

        let s1 = sine(256, 440.0, 0.5);
        let s2 = sine(256, 660.0, 0.3);
        let (g1, g2) = (0.7, -1.3);
        mixer.set_gain(g1);
        mixer.set_node_gain(1, g2).unwrap();

        mixer.submit_input(&s1).unwrap();
        mixer.push_node_frames(1, &s2, 1_000).unwrap();

        let out = render(&mixer, 256, 1_000);
        for ((o, a), b) in out.iter().zip(&s1).zip(&s2) {
            assert!((o - (g1 * a + g2 * b)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_node_drains_exactly_capacity() {
        let capacity = 256;
        let mixer = Mixer::new(RATE, capacity).unwrap();
        mixer.register_node_source(2, capacity).unwrap();

        let input = ramp(0, capacity);
        mixer.push_node_frames(2, &input, 0).unwrap();
        assert_eq!(render(&mixer, capacity, 0), input);
        assert_eq!(mixer.slot(2).unwrap().fill_ratio(), 0.0);

        let out = render(&mixer, capacity, 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(mixer.slot(2).unwrap().underrun_frames(), capacity as u64);
    }

    #[test]
    fn test_node_overflow_drops_oldest() {
        let capacity = 256;
        let mixer = Mixer::new(RATE, capacity).unwrap();
        mixer.register_node_source(1, capacity).unwrap();

        mixer.push_node_frames(1, &ramp(0, capacity), 0).unwrap();
        let outcome = mixer
            .push_node_frames(1, &ramp(capacity, 100), frames_to_ns(capacity, RATE))
            .unwrap();
        assert_eq!(outcome, PushOutcome { written: 100, dropped: 100 });
        assert_eq!(mixer.slot(1).unwrap().fill_ratio(), 1.0);
        assert_eq!(mixer.status().source(1).unwrap().overrun_frames, 100);

        let out = render(&mixer, capacity, 0);
        assert_eq!(out, ramp(100, capacity));
    }

    #[test]
    fn test_submit_input_is_newest_wins() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.submit_input(&ramp(0, 128)).unwrap();
        mixer.submit_input(&ramp(1000, 64)).unwrap();

        let out = render(&mixer, 64, 0);
        assert_eq!(out, ramp(1000, 64));

        // Longer than the staging ring: newest frames survive
        assert_eq!(mixer.submit_input(&ramp(0, 200)).unwrap(), 128);
        let out = render(&mixer, 128, 0);
        assert_eq!(out, ramp(72, 128));
    }

    #[test]
    fn test_misaligned_input_is_rejected() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.register_node_source(1, 128).unwrap();
        assert_eq!(
            mixer.submit_input(&[0.0; 3]),
            Err(ConfigError::MisalignedFrames(3))
        );
        assert_eq!(
            mixer.push_node_frames(1, &[0.0; 5], 0),
            Err(ConfigError::MisalignedFrames(5))
        );
    }

    #[test]
    fn test_missing_output_or_timestamp() {
        let mixer = Mixer::new(RATE, 128).unwrap();

        let result = mixer.process(None, 64, Some(0));
        assert_eq!(result, Err(RenderError::MissingOutput));
        assert_eq!(status_code(&result), STATUS_HARDWARE_ERROR);

        let mut out = vec![3.0f32; 128];
        let result = mixer.process(Some(OutputBuffer::stereo(&mut out)), 64, None);
        assert_eq!(result, Err(RenderError::MissingTimestamp));
        assert!(out.iter().all(|&s| s == 3.0));
    }

    #[test]
    fn test_defensive_failures_silence_output() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        mixer.submit_input(&sine(64, 440.0, 0.5)).unwrap();

        let mut out = vec![1.0f32; 256];
        let result = mixer.process(Some(OutputBuffer::stereo(&mut out)), 128, Some(0));
        assert_eq!(
            result,
            Err(RenderError::FrameCountExceeded { requested: 128, max: 64 })
        );
        assert!(out.iter().all(|&s| s == 0.0));

        let mut short = vec![1.0f32; 10];
        let result = mixer.process(Some(OutputBuffer::stereo(&mut short)), 64, Some(0));
        assert_eq!(
            result,
            Err(RenderError::OutputTooSmall { required: 128, available: 10 })
        );
        assert!(short.iter().all(|&s| s == 0.0));

        let mut none = vec![1.0f32; 4];
        let result = mixer.process(Some(OutputBuffer::interleaved(&mut none, 0)), 2, Some(0));
        assert_eq!(result, Err(RenderError::UnsupportedChannels));

        let mut wide = vec![1.0f32; 8];
        let result = mixer.process(Some(OutputBuffer::interleaved(&mut wide, usize::MAX)), 2, Some(0));
        assert_eq!(
            result,
            Err(RenderError::OutputTooSmall { required: usize::MAX, available: 8 })
        );
        assert!(wide.iter().all(|&s| s == 0.0));

        // Repeated rejections are logged once
        let lines: Vec<String> = std::iter::from_fn(|| mixer.pop_log())
            .map(|l| l.to_string())
            .collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("render rejected"));
    }

    #[test]
    fn test_concurrent_render_reports_busy() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        mixer.submit_input(&sine(64, 440.0, 0.5)).unwrap();
        let _held = mixer.render.lock().unwrap();

        let mut out = vec![1.0f32; 128];
        let result = mixer.process(Some(OutputBuffer::stereo(&mut out)), 64, Some(0));
        assert_eq!(result, Err(RenderError::RenderBusy));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mono_and_multichannel_layouts() {
        let mixer = Mixer::new(RATE, 4).unwrap();

        mixer.submit_input(&[1.0, 0.5, -1.0, 0.0]).unwrap();
        let mut mono = vec![9.0f32; 2];
        mixer
            .process(Some(OutputBuffer::interleaved(&mut mono, 1)), 2, Some(0))
            .unwrap();
        assert_eq!(mono, vec![0.75, -0.5]);

        mixer.submit_input(&[1.0, 0.5, -1.0, 0.0]).unwrap();
        let mut quad = vec![9.0f32; 8];
        mixer
            .process(Some(OutputBuffer::interleaved(&mut quad, 4)), 2, Some(0))
            .unwrap();
        assert_eq!(quad, vec![1.0, 0.5, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_levels_bounded_by_last_pass() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        mixer.set_gain(0.5);
        let input = sine(256, 440.0, 0.8);
        mixer.submit_input(&input).unwrap();

        let out = render(&mixer, 256, 0);
        let max_amp = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));

        let reading = mixer.source_levels(0).unwrap();
        assert!((reading.peak - max_amp).abs() < 1e-6);
        assert!(reading.rms > 0.0 && reading.rms <= max_amp);
        assert!(reading.input_rms > reading.rms);

        let levels = mixer.levels();
        assert_eq!(levels.output_count, 1);
        assert_eq!(levels.outputs[0], reading.rms);
        assert_eq!(levels.inputs[0], reading.peak);
    }

    #[test]
    fn test_level_snapshot_within_mixed_amplitude() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        mixer.set_gain(0.1);
        mixer.submit_input(&sine(256, 440.0, 0.8)).unwrap();

        let out = render(&mixer, 256, 0);
        let max_amp = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(max_amp > 0.0);

        let levels = mixer.levels();
        for level in levels.inputs.iter().chain(levels.outputs.iter()) {
            assert!((0.0..=max_amp).contains(level), "{} outside [0, {}]", level, max_amp);
        }
        assert!(levels.outputs[0] > 0.0);
    }

    #[test]
    fn test_level_snapshot_bounded_when_sources_cancel() {
        let mixer = Mixer::new(RATE, 256).unwrap();
        mixer.register_node_source(1, 1024).unwrap();
        mixer.set_node_gain(1, -0.9).unwrap();

        let input = sine(256, 440.0, 0.8);
        mixer.submit_input(&input).unwrap();
        mixer.push_node_frames(1, &input, 0).unwrap();

        let out = render(&mixer, 256, 0);
        let max_amp = out.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        // Each contribution on its own is far louder than the sum
        assert!(mixer.source_levels(1).unwrap().peak > max_amp * 5.0);

        let levels = mixer.levels();
        for level in levels.inputs.iter().chain(levels.outputs.iter()) {
            assert!((0.0..=max_amp).contains(level), "{} outside [0, {}]", level, max_amp);
        }
    }

    #[test]
    fn test_registration_errors() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        assert_eq!(
            mixer.register_node_source(0, 512),
            Err(ConfigError::ReservedIndex(0))
        );
        assert_eq!(
            mixer.register_node_source(MAX_SOURCES, 512),
            Err(ConfigError::IndexOutOfRange { index: MAX_SOURCES, max: MAX_SOURCES })
        );
        assert_eq!(mixer.register_node_source(3, 0), Err(ConfigError::ZeroCapacity));

        assert_eq!(
            mixer.push_node_frames(3, &[0.0; 4], 0),
            Err(ConfigError::NotANodeSource(3))
        );
        assert_eq!(
            mixer.push_node_frames(0, &[0.0; 4], 0),
            Err(ConfigError::NotANodeSource(0))
        );
        assert_eq!(mixer.set_node_gain(3, 0.5), Err(ConfigError::NotANodeSource(3)));
        assert_eq!(mixer.set_node_mute(0, true), Err(ConfigError::NotANodeSource(0)));
        assert_eq!(mixer.set_source_gain(5, 0.5), Err(ConfigError::Unregistered(5)));
        assert_eq!(mixer.source_count(), 1);
    }

    #[test]
    fn test_enable_disable_and_count() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.register_default_node_source(4).unwrap();
        mixer.register_node_source(7, 512).unwrap();
        assert_eq!(mixer.source_count(), 3);
        assert!(mixer.source_is_enabled(4));

        assert!(mixer.set_source_enabled(9, true).is_err());
        // Unregistered slots can be toggled but stay silent
        mixer.set_source_enabled(2, true).unwrap();
        assert!(mixer.source_is_enabled(2));
        assert_eq!(mixer.source_count(), 3);

        mixer.set_source_enabled(4, false).unwrap();
        mixer.push_node_frames(4, &sine(128, 440.0, 0.5), 0).unwrap();
        let out = render(&mixer, 128, 0);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(
            mixer.slot(4).unwrap().source().ring().map(SampleRing::capacity),
            Some(crate::config::DEFAULT_NODE_CAPACITY)
        );
    }

    #[test]
    fn test_reregistration_replaces_buffer_and_keeps_controls() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.register_node_source(1, 512).unwrap();
        mixer.set_node_gain(1, 0.25).unwrap();
        mixer.set_node_mute(1, true).unwrap();
        mixer.push_node_frames(1, &ramp(0, 128), 0).unwrap();

        mixer.register_node_source(1, 2048).unwrap();
        assert_eq!(mixer.source_gain(1), Ok(0.25));
        assert_eq!(mixer.source_is_muted(1), Ok(true));
        assert_eq!(mixer.slot(1).unwrap().fill_ratio(), 0.0);
        assert_eq!(mixer.source_count(), 2);

        mixer.set_node_mute(1, false).unwrap();
        let out = render(&mixer, 128, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stale_frames_are_skipped() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.register_node_source(1, 1024).unwrap();
        mixer.push_node_frames(1, &sine(256, 440.0, 0.5), 0).unwrap();

        let out = render(&mixer, 128, 1_000_000_000);
        assert!(out.iter().all(|&s| s == 0.0));

        let status = mixer.status();
        let node = status.source(1).unwrap();
        assert_eq!(node.stale_frames, 256);
        assert_eq!(node.buffer_fill, 0.0);

        let lines: Vec<String> = std::iter::from_fn(|| mixer.pop_log())
            .map(|l| l.to_string())
            .collect();
        assert!(lines.iter().any(|l| l.contains("stale")));
    }

    #[test]
    fn test_underrun_logs_once_until_recovered() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        for _ in 0..5 {
            render(&mixer, 64, 0);
        }
        mixer.submit_input(&sine(64, 440.0, 0.5)).unwrap();
        render(&mixer, 64, 0);

        let lines: Vec<String> = std::iter::from_fn(|| mixer.pop_log())
            .map(|l| l.to_string())
            .collect();
        assert_eq!(
            lines,
            vec!["source 0: underrun, 64 frames short", "source 0: underrun recovered"]
        );
        assert_eq!(mixer.slot(0).unwrap().underrun_frames(), 5 * 64);
    }

    #[test]
    fn test_source_latency_delays_output() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        assert_eq!(mixer.set_source_latency(0, 4), Ok(4));

        mixer.submit_input(&ramp(1, 64)).unwrap();
        let out = render(&mixer, 64, 0);
        assert!(out[..8].iter().all(|&s| s == 0.0));
        assert_eq!(&out[8..], &ramp(1, 60)[..]);

        let period = 64.0 / RATE * 1000.0;
        let delay = 4.0 / RATE * 1000.0;
        assert!((mixer.latency_ms() - (period + delay)).abs() < 1e-9);
    }

    #[test]
    fn test_source_latency_is_clamped() {
        let mixer = Mixer::with_config(MixerConfig::new(RATE, 64).with_max_delay_frames(100)).unwrap();
        assert_eq!(mixer.set_source_latency(0, 1000), Ok(100));
        assert_eq!(mixer.source_latency(0), Ok(100));
        assert_eq!(mixer.set_source_latency(0, -1000), Ok(-100));
        assert_eq!(mixer.source_latency(0), Ok(-100));
        assert_eq!(mixer.set_source_latency(6, 10), Err(ConfigError::Unregistered(6)));
    }

    #[test]
    fn test_negative_latency_advances_node() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        mixer.register_node_source(1, 1024).unwrap();
        mixer.register_node_source(2, 1024).unwrap();
        assert_eq!(mixer.set_source_latency(2, -16), Ok(-16));

        // Same ramp on both nodes, node 1 on the left, node 2 on the right
        let left: Vec<f32> = (0..256).flat_map(|i| [(i + 1) as f32, 0.0]).collect();
        let right: Vec<f32> = (0..256).flat_map(|i| [0.0, (i + 1) as f32]).collect();
        mixer.push_node_frames(1, &left, 0).unwrap();
        mixer.push_node_frames(2, &right, 0).unwrap();

        for pass in 0..2 {
            let out = render(&mixer, 64, 0);
            for (k, frame) in out.chunks_exact(CHANNELS).enumerate() {
                let expected = (pass * 64 + k + 1) as f32;
                assert_eq!(frame[0], expected);
                assert_eq!(frame[1], expected + 16.0);
            }
        }

        // An advance does not add to the reported latency
        let period = 64.0 / RATE * 1000.0;
        assert!((mixer.latency_ms() - period).abs() < 1e-9);
    }

    #[test]
    fn test_advance_waits_for_buffered_frames() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        mixer.register_node_source(3, 1024).unwrap();
        mixer.set_source_latency(3, -32).unwrap();

        assert!(render(&mixer, 64, 0).iter().all(|&s| s == 0.0));

        // Only half the advance can be taken from this push
        mixer.push_node_frames(3, &ramp(0, 16), 0).unwrap();
        assert!(render(&mixer, 64, 0).iter().all(|&s| s == 0.0));

        mixer
            .push_node_frames(3, &ramp(16, 64), frames_to_ns(16, RATE))
            .unwrap();
        let out = render(&mixer, 64, 0);
        assert_eq!(&out[..96], &ramp(32, 48)[..]);
        assert!(out[96..].iter().all(|&s| s == 0.0));

        // The deficit is spent; later pushes play in full
        mixer
            .push_node_frames(3, &ramp(80, 64), frames_to_ns(80, RATE))
            .unwrap();
        assert_eq!(render(&mixer, 64, 0), ramp(80, 64));
    }

    #[test]
    fn test_gain_db_and_non_finite_gain() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        mixer.set_gain_db(-120.0);
        assert_eq!(mixer.gain(), 0.0);
        mixer.set_gain_db(0.0);
        assert!((mixer.gain() - 1.0).abs() < 1e-6);

        mixer.set_gain(f32::NAN);
        assert_eq!(mixer.gain(), 0.0);

        mixer.register_node_source(2, 64).unwrap();
        mixer.set_source_gain_db(2, -6.0).unwrap();
        assert!((mixer.source_gain(2).unwrap() - 0.501).abs() < 0.01);
    }

    #[test]
    fn test_status_snapshot() {
        let mixer = Mixer::new(RATE, 128).unwrap();
        mixer.register_node_source(3, 256).unwrap();
        mixer.push_node_frames(3, &ramp(0, 64), 0).unwrap();
        mixer.set_node_mute(3, true).unwrap();

        let status = mixer.status();
        assert_eq!(status.sample_rate, RATE);
        assert_eq!(status.buffer_frames, 128);
        assert_eq!(status.sources.len(), 2);

        let node = status.source(3).unwrap();
        assert_eq!(node.name, "Node #3");
        assert_eq!(node.kind, SourceKind::Node);
        assert!(node.muted);
        assert_eq!(node.buffer_fill, 0.25);
        assert_eq!(status.source(0).unwrap().name, "Continuous");
        assert!((status.buffer_fill - 0.125).abs() < 1e-6);
        assert!(status.to_string().contains("Node #3"));
    }

    #[test]
    fn test_drain_logs_forwards_everything() {
        let mixer = Mixer::new(RATE, 64).unwrap();
        render(&mixer, 64, 0);
        assert_eq!(mixer.drain_logs(), 1);
        assert!(mixer.pop_log().is_none());
    }

    #[test]
    fn test_concurrent_producer_render_and_control() {
        let mixer = Arc::new(Mixer::new(RATE, 256).unwrap());
        mixer.register_node_source(1, 1024).unwrap();
        mixer.register_node_source(2, 512).unwrap();

        let producer = {
            let mixer = Arc::clone(&mixer);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let ts = monotonic_timestamp_ns();
                    mixer.push_node_frames(1, &sine(128, 440.0, 0.5), ts).unwrap();
                    mixer.push_node_frames(2, &sine(300, 220.0, 0.5), ts).unwrap();
                    mixer.submit_input(&sine(256, 110.0, 0.2)).unwrap();
                }
            })
        };

        let control = {
            let mixer = Arc::clone(&mixer);
            std::thread::spawn(move || {
                for i in 0..500 {
                    mixer.set_node_gain(1, (i % 10) as f32 * 0.1).unwrap();
                    mixer.set_node_mute(2, i % 2 == 0).unwrap();
                    if i % 100 == 0 {
                        mixer.register_node_source(2, 512).unwrap();
                    }
                    let _ = mixer.levels();
                    let _ = mixer.status();
                }
            })
        };

        let renderer = {
            let mixer = Arc::clone(&mixer);
            std::thread::spawn(move || {
                let mut out = vec![0.0f32; 256 * CHANNELS];
                for _ in 0..500 {
                    let ts = monotonic_timestamp_ns();
                    mixer
                        .process(Some(OutputBuffer::stereo(&mut out)), 256, Some(ts))
                        .unwrap();
                    assert!(out.iter().all(|s| s.is_finite()));
                }
            })
        };

        producer.join().unwrap();
        control.join().unwrap();
        renderer.join().unwrap();

        for index in 0..3 {
            let fill = mixer.slot(index).unwrap().fill_ratio();
            assert!((0.0..=1.0).contains(&fill));
        }
        mixer.drain_logs();
    }
}
