//! Per-slot level metering
//!
//! The render thread accumulates a [`BlockLevels`] for each slot it mixes and
//! stores the result in that slot's [`LevelMeter`] at the end of the pass.
//! Control threads read the meter at any time; values are published with
//! relaxed atomics and may lag by one pass.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{StereoSample, CHANNELS};

/// Levels of one slot for one render pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelReading {
    /// Max absolute post-gain sample
    pub peak: f32,
    /// RMS of the post-gain contribution over both channels
    pub rms: f32,
    /// RMS of the pre-gain input over both channels
    pub input_rms: f32,
}

/// Render-side accumulator for one pass
#[derive(Debug, Default)]
pub struct BlockLevels {
    peak: f32,
    sum_sq: f64,
    input_sum_sq: f64,
    frames: usize,
}

impl BlockLevels {
    #[inline]
    pub fn accumulate(&mut self, input: StereoSample, output: StereoSample) {
        self.peak = self.peak.max(output.peak());
        self.sum_sq += output.energy() as f64;
        self.input_sum_sq += input.energy() as f64;
        self.frames += 1;
    }

    /// Final reading; RMS never exceeds peak
    pub fn finish(&self) -> LevelReading {
        if self.frames == 0 {
            return LevelReading::default();
        }
        let samples = (self.frames * CHANNELS) as f64;
        LevelReading {
            peak: self.peak,
            rms: ((self.sum_sq / samples).sqrt() as f32).min(self.peak),
            input_rms: (self.input_sum_sq / samples).sqrt() as f32,
        }
    }
}

/// Atomically published levels for one slot
#[derive(Debug)]
pub struct LevelMeter {
    peak: AtomicU32,
    rms: AtomicU32,
    input_rms: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            peak: AtomicU32::new(0.0f32.to_bits()),
            rms: AtomicU32::new(0.0f32.to_bits()),
            input_rms: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Publish a pass's reading (render thread)
    #[inline]
    pub fn record(&self, reading: LevelReading) {
        self.peak.store(reading.peak.to_bits(), Ordering::Relaxed);
        self.rms.store(reading.rms.to_bits(), Ordering::Relaxed);
        self.input_rms
            .store(reading.input_rms.to_bits(), Ordering::Relaxed);
    }

    /// Zero all levels (slot did not contribute this pass)
    #[inline]
    pub fn reset(&self) {
        self.record(LevelReading::default());
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn rms(&self) -> f32 {
        f32::from_bits(self.rms.load(Ordering::Relaxed))
    }

    pub fn input_rms(&self) -> f32 {
        f32::from_bits(self.input_rms.load(Ordering::Relaxed))
    }

    pub fn reading(&self) -> LevelReading {
        LevelReading {
            peak: self.peak(),
            rms: self.rms(),
            input_rms: self.input_rms(),
        }
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}
