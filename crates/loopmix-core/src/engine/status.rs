//! Telemetry snapshots
//!
//! Plain-data copies of mixer state for control threads and UIs. Building a
//! snapshot only reads atomics; it never touches render-private state.

use crate::types::{SourceKind, MAX_SOURCES};

/// Per-slot levels of the last render pass
///
/// Every value lies within `[0, peak of the mixed output]` of that pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelsSnapshot {
    /// Post-gain peak of each slot's contribution, by slot index
    pub inputs: [f32; MAX_SOURCES],
    /// Post-gain RMS of each slot's contribution, by slot index
    pub outputs: [f32; MAX_SOURCES],
    /// Number of meaningful entries in `inputs`
    pub input_count: usize,
    /// Number of meaningful entries in `outputs`
    pub output_count: usize,
}

/// Diagnostics for one registered source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub index: usize,
    pub kind: SourceKind,
    /// "Continuous" or "Node #n"
    pub name: String,
    pub gain: f32,
    pub gain_db: f32,
    pub muted: bool,
    pub enabled: bool,
    /// Compensation in frames; negative is an advance
    pub latency_frames: i64,
    /// Buffered frames / ring capacity
    pub buffer_fill: f32,
    pub peak: f32,
    pub rms: f32,
    pub input_rms: f32,
    pub underrun_frames: u64,
    pub overrun_frames: u64,
    pub stale_frames: u64,
}

/// Whole-mixer diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct MixerStatus {
    pub sample_rate: f64,
    pub buffer_frames: usize,
    pub latency_ms: f64,
    /// Mean buffer fill across registered sources
    pub buffer_fill: f32,
    /// Render log lines lost to a full queue
    pub dropped_log_lines: u64,
    pub sources: Vec<SourceStatus>,
}

impl MixerStatus {
    /// Status of the source at `index`, if registered
    pub fn source(&self, index: usize) -> Option<&SourceStatus> {
        self.sources.iter().find(|s| s.index == index)
    }
}

impl std::fmt::Display for MixerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:.0} Hz, {} frames, latency {:.2} ms, fill {:.0}%",
            self.sample_rate,
            self.buffer_frames,
            self.latency_ms,
            self.buffer_fill * 100.0
        )?;
        for source in &self.sources {
            writeln!(
                f,
                "  [{}] {:<12} gain {:>7.2} dB{}{} delay {:>5} fill {:>3.0}% rms {:.3} peak {:.3} under {} over {}",
                source.index,
                source.name,
                source.gain_db,
                if source.muted { " muted" } else { "" },
                if source.enabled { "" } else { " disabled" },
                source.latency_frames,
                source.buffer_fill * 100.0,
                source.rms,
                source.peak,
                source.underrun_frames,
                source.overrun_frames
            )?;
        }
        Ok(())
    }
}
