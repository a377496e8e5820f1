//! Latency probe
//!
//! Measures the delay of a loop (mixer path, device round trip) by playing a
//! known reference signal and locating it in the recording with normalized
//! cross-correlation. The reference is a linear sweep, which matches itself
//! at exactly one offset.
//!
//! [`LatencyProbe::emit_sine`] produces a plain test tone for level checks.

use std::f64::consts::TAU;

use crate::engine::clock::monotonic_timestamp_ns;
use crate::types::{Sample, StereoSample};

/// Sweep start frequency
const SWEEP_START_HZ: f64 = 200.0;

/// Sweep end frequency (clamped below Nyquist)
const SWEEP_END_HZ: f64 = 4_000.0;

/// Reference and tone amplitude
const PROBE_AMPLITUDE: f64 = 0.5;

/// Default tone frequency
pub const DEFAULT_TONE_HZ: f32 = 440.0;

/// Result of a latency measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyReport {
    /// Best-matching offset of the reference inside the recording
    pub offset_frames: usize,
    pub offset_seconds: f64,
    /// Normalized cross-correlation at that offset (-1.0 - 1.0)
    pub correlation: f32,
    /// Monotonic time the report was made
    pub measured_at_ns: u64,
}

/// Reference signal generator and latency estimator
pub struct LatencyProbe {
    sample_rate: f64,
    tone_hz: f32,
    reference: Vec<StereoSample>,
}

impl LatencyProbe {
    /// Probe with a reference sweep of `window_frames` frames
    pub fn new(sample_rate: f64, window_frames: usize) -> Self {
        Self {
            sample_rate,
            tone_hz: DEFAULT_TONE_HZ,
            reference: build_sweep(sample_rate, window_frames),
        }
    }

    /// Default frequency for [`emit_sine`](Self::emit_sine)
    pub fn with_tone(mut self, frequency_hz: f32) -> Self {
        self.tone_hz = frequency_hz;
        self
    }

    pub fn window_frames(&self) -> usize {
        self.reference.len()
    }

    pub fn reference(&self) -> &[StereoSample] {
        &self.reference
    }

    /// Reference as interleaved samples, ready to push into a mixer
    pub fn reference_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.reference)
    }

    /// Write a sine tone into interleaved stereo `out`
    ///
    /// `start_frame` sets the phase so consecutive blocks join seamlessly.
    /// A non-positive frequency uses the probe's default tone. Returns frames
    /// written.
    pub fn emit_sine(&self, frequency_hz: f32, start_frame: u64, out: &mut [Sample]) -> usize {
        let freq = if frequency_hz > 0.0 {
            frequency_hz as f64
        } else {
            self.tone_hz as f64
        };
        let step = freq / self.sample_rate;

        let mut frames = 0;
        for (i, frame) in out.chunks_exact_mut(2).enumerate() {
            let phase = ((start_frame + i as u64) as f64 * step).fract();
            let value = ((phase * TAU).sin() * PROBE_AMPLITUDE) as Sample;
            frame[0] = value;
            frame[1] = value;
            frames += 1;
        }
        frames
    }

    /// Locate the reference in an interleaved stereo recording
    ///
    /// Tries every offset where the whole reference fits. A recording shorter
    /// than the reference reports offset 0 with zero correlation.
    pub fn measure(&self, recorded: &[Sample]) -> LatencyReport {
        let whole = recorded.len() - recorded.len() % 2;
        let recorded: &[StereoSample] = bytemuck::cast_slice(&recorded[..whole]);
        let window = self.reference.len();

        let mut best = (0usize, 0.0f32);
        if window > 0 && recorded.len() >= window {
            let reference_norm = norm(&self.reference);
            for offset in 0..=recorded.len() - window {
                let corr = correlation(
                    &self.reference,
                    reference_norm,
                    &recorded[offset..offset + window],
                );
                if corr > best.1 {
                    best = (offset, corr);
                }
            }
        }

        LatencyReport {
            offset_frames: best.0,
            offset_seconds: best.0 as f64 / self.sample_rate,
            correlation: best.1,
            measured_at_ns: monotonic_timestamp_ns(),
        }
    }
}

fn build_sweep(sample_rate: f64, frames: usize) -> Vec<StereoSample> {
    let end_hz = SWEEP_END_HZ.min(sample_rate * 0.45);
    let duration = frames as f64 / sample_rate;
    let rate = (end_hz - SWEEP_START_HZ) / duration.max(f64::EPSILON);

    (0..frames)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let phase = SWEEP_START_HZ * t + 0.5 * rate * t * t;
            StereoSample::mono(((phase.fract() * TAU).sin() * PROBE_AMPLITUDE) as Sample)
        })
        .collect()
}

fn norm(frames: &[StereoSample]) -> f64 {
    frames
        .iter()
        .map(|f| f.energy() as f64)
        .sum::<f64>()
        .sqrt()
}

fn correlation(reference: &[StereoSample], reference_norm: f64, recorded: &[StereoSample]) -> f32 {
    let recorded_norm = norm(recorded);
    if reference_norm == 0.0 || recorded_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = reference
        .iter()
        .zip(recorded)
        .map(|(a, b)| (a.left * b.left + a.right * b.right) as f64)
        .sum();
    (dot / (reference_norm * recorded_norm)) as f32
}
