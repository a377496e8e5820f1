//! Common types for loopmix
//!
//! Fundamental sample types and fixed sizes shared by the ring buffers,
//! source slots and the render path.

/// Number of source slots in a mixer (continuous slot + node slots)
pub const MAX_SOURCES: usize = 8;

/// Index of the continuous (bulk-submitted) source slot
pub const CONTINUOUS_SLOT: usize = 0;

/// Channels per frame for every source and for the internal mix bus
pub const CHANNELS: usize = 2;

/// Audio sample type
pub type Sample = f32;

/// Data-source kind held by a source slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Inert slot, contributes silence
    #[default]
    Unregistered,
    /// Fed by `submit_input`, newest submission wins
    Continuous,
    /// Fed by a timestamped ring buffer
    Node,
}

impl SourceKind {
    /// Short display name
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Unregistered => "unregistered",
            SourceKind::Continuous => "continuous",
            SourceKind::Node => "node",
        }
    }

    /// Whether the slot holds a data source
    pub fn is_registered(&self) -> bool {
        !matches!(self, SourceKind::Unregistered)
    }
}

/// A single stereo frame
///
/// `#[repr(C)]` keeps the layout `[left, right]`, so `&[StereoSample]` and
/// interleaved `&[f32]` convert into each other for free through bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    /// Sum of squares of both channels
    #[inline]
    pub fn energy(&self) -> Sample {
        self.left * self.left + self.right * self.right
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// View interleaved stereo samples as frames
///
/// Returns `None` when the slice holds an odd number of samples.
pub fn as_frames(interleaved: &[Sample]) -> Option<&[StereoSample]> {
    bytemuck::try_cast_slice(interleaved).ok()
}

/// Convert a linear gain to decibels (`-inf` for zero or negative gains)
pub fn gain_to_db(gain: f32) -> f32 {
    if gain > 0.0 {
        20.0 * gain.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Convert decibels to a linear gain; anything at or below -120 dB is silence
pub fn db_to_gain(db: f32) -> f32 {
    if db <= -120.0 {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}
