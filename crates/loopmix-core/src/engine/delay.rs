//! Per-source latency compensation
//!
//! Each slot can be delayed by a whole number of frames so sources with
//! different capture paths line up in the mix. The line only delays; the
//! mixer advances a source by discarding frames from its ring instead.

use crate::types::StereoSample;

/// Fixed-size stereo delay line
///
/// Storage is allocated once; changing the delay never reallocates.
pub struct DelayLine {
    buffer: Vec<StereoSample>,
    write_pos: usize,
    delay_frames: usize,
}

impl DelayLine {
    /// Create a delay line able to delay up to `max_frames` frames
    pub fn new(max_frames: usize) -> Self {
        Self {
            buffer: vec![StereoSample::silence(); max_frames + 1],
            write_pos: 0,
            delay_frames: 0,
        }
    }

    /// Largest supported delay in frames
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 1
    }

    pub fn delay(&self) -> usize {
        self.delay_frames
    }

    /// Set the delay amount, clamped to the line's maximum
    ///
    /// A changed delay clears the line so old audio is not replayed at the
    /// new offset. Returns the delay actually applied.
    pub fn set_delay(&mut self, frames: usize) -> usize {
        let frames = frames.min(self.max_delay());
        if frames != self.delay_frames {
            self.delay_frames = frames;
            self.clear();
        }
        frames
    }

    /// Delay a single frame
    #[inline]
    pub fn process_frame(&mut self, input: StereoSample) -> StereoSample {
        let len = self.buffer.len();
        self.buffer[self.write_pos] = input;

        let read_pos = (self.write_pos + len - self.delay_frames) % len;
        let output = self.buffer[read_pos];

        self.write_pos = (self.write_pos + 1) % len;
        output
    }

    /// Delay a block in place; a zero delay leaves it untouched
    pub fn process(&mut self, block: &mut [StereoSample]) {
        if self.delay_frames == 0 {
            return;
        }
        for frame in block.iter_mut() {
            *frame = self.process_frame(*frame);
        }
    }

    /// Fill with silence
    pub fn clear(&mut self) {
        self.buffer.fill(StereoSample::silence());
        self.write_pos = 0;
    }
}
