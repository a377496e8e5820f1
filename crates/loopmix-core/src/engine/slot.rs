//! Source slots
//!
//! A mixer owns a fixed arena of [`MAX_SOURCES`](crate::types::MAX_SOURCES)
//! slots. Scalar controls (gain, mute, enabled, compensation delay) are plain
//! atomics written by control threads and read by the render thread with
//! `Ordering::Relaxed`; we only need visibility, not synchronization.
//!
//! The data source lives in a `basedrop::SharedCell`. Registration publishes a
//! new source with a single atomic swap, so kind and buffer always change
//! together and the render thread never sees a half-registered slot. The
//! replaced source is freed on the collector thread, never on the render
//! thread.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use basedrop::{Handle, Shared, SharedCell};

use super::meter::LevelMeter;
use super::ring::SampleRing;
use crate::types::SourceKind;

/// Data source held by a slot
pub(crate) enum SlotSource {
    /// Unregistered; contributes silence
    Inert,
    /// Staging ring fed by `submit_input` (newest-wins)
    Continuous(SampleRing),
    /// Timestamped node ring (drop-oldest)
    Node(SampleRing),
}

impl SlotSource {
    pub(crate) fn kind(&self) -> SourceKind {
        match self {
            SlotSource::Inert => SourceKind::Unregistered,
            SlotSource::Continuous(_) => SourceKind::Continuous,
            SlotSource::Node(_) => SourceKind::Node,
        }
    }

    pub(crate) fn ring(&self) -> Option<&SampleRing> {
        match self {
            SlotSource::Inert => None,
            SlotSource::Continuous(ring) | SlotSource::Node(ring) => Some(ring),
        }
    }
}

/// One mixer input
pub struct SourceSlot {
    index: usize,
    source: SharedCell<SlotSource>,
    /// Bumped on every (re-)registration so the render side can reset
    /// per-slot state that belonged to the old buffer
    generation: AtomicU64,
    /// Linear gain as f32 bits
    gain: AtomicU32,
    muted: AtomicBool,
    enabled: AtomicBool,
    /// Positive delays, negative advances
    latency_frames: AtomicI64,
    /// Set while pushes keep evicting frames, so overruns are logged once
    overrunning: AtomicBool,
    meter: LevelMeter,
    underrun_frames: AtomicU64,
    overrun_frames: AtomicU64,
    stale_frames: AtomicU64,
}

impl SourceSlot {
    /// Create an unregistered slot
    pub(crate) fn new(index: usize, handle: &Handle) -> Self {
        Self {
            index,
            source: SharedCell::new(Shared::new(handle, SlotSource::Inert)),
            generation: AtomicU64::new(0),
            gain: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            latency_frames: AtomicI64::new(0),
            overrunning: AtomicBool::new(false),
            meter: LevelMeter::new(),
            underrun_frames: AtomicU64::new(0),
            overrun_frames: AtomicU64::new(0),
            stale_frames: AtomicU64::new(0),
        }
    }

    /// Publish a new data source and enable the slot
    ///
    /// Gain, mute and compensation delay carry over. Returns the kind that
    /// was replaced.
    pub(crate) fn install(&self, source: SlotSource, handle: &Handle) -> SourceKind {
        let previous = self.source.replace(Shared::new(handle, source));
        self.generation.fetch_add(1, Ordering::Release);
        self.enabled.store(true, Ordering::Relaxed);
        previous.kind()
    }

    /// Current data source (wait-free)
    #[inline]
    pub(crate) fn source(&self) -> Shared<SlotSource> {
        self.source.get()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> SourceKind {
        self.source.get().kind()
    }

    /// Display name used in status output
    pub fn name(&self) -> String {
        match self.kind() {
            SourceKind::Continuous => "Continuous".to_string(),
            _ => format!("Node #{}", self.index),
        }
    }

    /// Registration generation
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set linear gain; non-finite values become 0.0. Returns the applied gain.
    pub fn set_gain(&self, gain: f32) -> f32 {
        let applied = if gain.is_finite() {
            gain
        } else {
            log::warn!(
                "Source {}: non-finite gain {} replaced with 0.0",
                self.index,
                gain
            );
            0.0
        };
        self.gain.store(applied.to_bits(), Ordering::Relaxed);
        applied
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Compensation in frames; negative values advance the source
    #[inline]
    pub fn latency_frames(&self) -> i64 {
        self.latency_frames.load(Ordering::Relaxed)
    }

    pub fn set_latency_frames(&self, frames: i64) {
        self.latency_frames.store(frames, Ordering::Relaxed);
    }

    pub fn meter(&self) -> &LevelMeter {
        &self.meter
    }

    /// Buffered frames as a fraction of ring capacity (0.0 when unregistered)
    pub fn fill_ratio(&self) -> f32 {
        self.source().ring().map_or(0.0, SampleRing::fill_ratio)
    }

    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn overrun_frames(&self) -> u64 {
        self.overrun_frames.load(Ordering::Relaxed)
    }

    pub fn stale_frames(&self) -> u64 {
        self.stale_frames.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn add_underrun(&self, frames: usize) {
        self.underrun_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    /// Record a push's overrun; true when this starts a new overrun episode
    pub(crate) fn note_overrun(&self, dropped: usize) -> bool {
        if dropped == 0 {
            self.overrunning.store(false, Ordering::Relaxed);
            return false;
        }
        self.overrun_frames
            .fetch_add(dropped as u64, Ordering::Relaxed);
        !self.overrunning.swap(true, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn add_stale(&self, frames: usize) {
        self.stale_frames.fetch_add(frames as u64, Ordering::Relaxed);
    }
}
