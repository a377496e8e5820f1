//! Timestamped stereo ring buffer
//!
//! Bounded single-producer / single-consumer store of interleaved stereo
//! frames. The producer never waits on the consumer: when the ring is full the
//! oldest frames are evicted (drop-oldest) by moving the read index forward
//! with a compare-and-swap. The consumer copies frames out and then commits the
//! read with a compare-and-swap, retrying if a concurrent eviction moved the
//! read index underneath it.
//!
//! Read and write positions are absolute `u64` frame counters, so `write - read`
//! is always the number of buffered frames and never wraps in practice.
//! Samples are stored as `f32` bits in `AtomicU32`, which keeps a racing
//! eviction from ever being a data race.
//!
//! Every timestamped push refreshes an origin: the implied timestamp of
//! absolute frame 0. The timestamp of frame `i` is `origin + i * 1e9 / rate`,
//! which lets the render side skip frames that are older than its window.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::engine::clock::ns_per_frame;
use crate::types::{StereoSample, CHANNELS};

/// Commit attempts before a read gives up and reports an underrun
const MAX_READ_ATTEMPTS: usize = 3;

/// Origin value meaning "no timestamp pushed yet"
const NO_ORIGIN: i64 = i64::MIN;

/// Result of a push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Frames now stored in the ring
    pub written: usize,
    /// Frames lost to make room (evicted buffered frames plus input frames
    /// that did not fit at all)
    pub dropped: usize,
}

/// Result of a timestamp-aligned read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignedRead {
    /// Frames copied into the output
    pub frames: usize,
    /// Stale frames skipped before reading
    pub stale: usize,
}

/// Lock-free drop-oldest ring of stereo frames
pub struct SampleRing {
    /// Interleaved sample bits, `capacity * CHANNELS` entries
    samples: Box<[AtomicU32]>,
    /// Capacity in frames
    capacity: usize,
    /// Absolute index of the next frame to write (producer-owned)
    write: AtomicU64,
    /// Absolute index of the oldest buffered frame
    read: AtomicU64,
    /// Implied timestamp (ns) of absolute frame 0
    origin_ns: AtomicI64,
    /// Nanoseconds per frame at the ring's sample rate
    ns_per_frame: f64,
}

impl SampleRing {
    /// Create a ring holding `capacity` frames at `sample_rate`
    ///
    /// Capacity is validated by the caller; a zero capacity is bumped to one
    /// frame so indexing stays well defined.
    pub fn new(capacity: usize, sample_rate: f64) -> Self {
        let capacity = capacity.max(1);
        let samples = (0..capacity * CHANNELS)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            samples,
            capacity,
            write: AtomicU64::new(0),
            read: AtomicU64::new(0),
            origin_ns: AtomicI64::new(NO_ORIGIN),
            ns_per_frame: ns_per_frame(sample_rate),
        }
    }

    /// Capacity in frames
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently buffered
    #[inline]
    pub fn available(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        (write.saturating_sub(read) as usize).min(self.capacity)
    }

    /// Buffered frames as a fraction of capacity (0.0 - 1.0)
    pub fn fill_ratio(&self) -> f32 {
        self.available() as f32 / self.capacity as f32
    }

    /// Whether a timestamped push has happened yet
    pub fn has_timestamp(&self) -> bool {
        self.origin_ns.load(Ordering::Relaxed) != NO_ORIGIN
    }

    /// Append frames, evicting the oldest buffered frames when full
    ///
    /// Producer side. Never blocks. If `frames` is longer than the capacity,
    /// only its newest `capacity` frames are kept. `timestamp_ns` is the
    /// timestamp of `frames[0]`.
    pub fn push(&self, frames: &[StereoSample], timestamp_ns: Option<u64>) -> PushOutcome {
        if frames.is_empty() {
            return PushOutcome::default();
        }

        let skipped = frames.len().saturating_sub(self.capacity);
        let kept = &frames[skipped..];
        let count = kept.len() as u64;
        let write = self.write.load(Ordering::Relaxed);

        let evicted = self.make_room(write, count);

        for (offset, frame) in kept.iter().enumerate() {
            let base = self.slot_of(write + offset as u64);
            self.samples[base].store(frame.left.to_bits(), Ordering::Relaxed);
            self.samples[base + 1].store(frame.right.to_bits(), Ordering::Relaxed);
        }

        if let Some(ts) = timestamp_ns {
            // frames[skipped] lands at absolute index `write`
            let origin = ts as f64 + (skipped as f64 - write as f64) * self.ns_per_frame;
            self.origin_ns.store(origin as i64, Ordering::Relaxed);
        }

        self.write.store(write + count, Ordering::Release);

        PushOutcome {
            written: kept.len(),
            dropped: evicted + skipped,
        }
    }

    /// Discard everything buffered, then push (newest-wins)
    ///
    /// Returns the push outcome; `dropped` counts discarded unread frames.
    pub fn replace(&self, frames: &[StereoSample], timestamp_ns: Option<u64>) -> PushOutcome {
        let write = self.write.load(Ordering::Relaxed);
        let mut discarded = 0;
        loop {
            let read = self.read.load(Ordering::Acquire);
            if read >= write {
                break;
            }
            if self
                .read
                .compare_exchange_weak(read, write, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                discarded = (write - read) as usize;
                break;
            }
        }

        let mut outcome = self.push(frames, timestamp_ns);
        outcome.dropped += discarded;
        outcome
    }

    /// Copy up to `out.len()` of the oldest frames out and consume them
    ///
    /// Consumer side. Returns the number of frames copied; anything short of
    /// `out.len()` is an underrun and the contents of `out[n..]` are
    /// unspecified.
    pub fn pop_into(&self, out: &mut [StereoSample]) -> usize {
        for _ in 0..MAX_READ_ATTEMPTS {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            let buffered = (write.saturating_sub(read) as usize).min(self.capacity);
            let count = buffered.min(out.len());
            if count == 0 {
                return 0;
            }

            for (offset, frame) in out[..count].iter_mut().enumerate() {
                let base = self.slot_of(read + offset as u64);
                *frame = StereoSample::new(
                    f32::from_bits(self.samples[base].load(Ordering::Relaxed)),
                    f32::from_bits(self.samples[base + 1].load(Ordering::Relaxed)),
                );
            }

            // A failed commit means the producer evicted frames we just copied
            if self
                .read
                .compare_exchange(read, read + count as u64, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return count;
            }
        }
        0
    }

    /// Timestamp-aligned read for a render period
    ///
    /// Frames whose implied timestamp is more than one period older than
    /// `render_ts_ns` are skipped first, then the contiguous run starting at
    /// the oldest remaining frame is copied out. Without any timestamp this
    /// is a plain [`pop_into`](Self::pop_into).
    pub fn read_aligned(&self, out: &mut [StereoSample], render_ts_ns: u64) -> AlignedRead {
        let stale = self.stale_frames(render_ts_ns, out.len());
        let stale = if stale > 0 { self.discard(stale) } else { 0 };
        AlignedRead {
            frames: self.pop_into(out),
            stale,
        }
    }

    /// Consume up to `frames` of the oldest frames without copying them
    ///
    /// Returns the number of frames discarded.
    pub fn discard(&self, frames: usize) -> usize {
        loop {
            let read = self.read.load(Ordering::Acquire);
            let write = self.write.load(Ordering::Acquire);
            let count = (write.saturating_sub(read) as usize).min(frames);
            if count == 0 {
                return 0;
            }
            if self
                .read
                .compare_exchange_weak(read, read + count as u64, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return count;
            }
        }
    }

    /// Drop everything buffered
    pub fn clear(&self) -> usize {
        self.discard(usize::MAX)
    }

    /// Buffered frames older than one period before `render_ts_ns`
    fn stale_frames(&self, render_ts_ns: u64, period_frames: usize) -> usize {
        let origin = self.origin_ns.load(Ordering::Relaxed);
        if origin == NO_ORIGIN {
            return 0;
        }

        let read = self.read.load(Ordering::Acquire);
        let head_ts = origin as f64 + read as f64 * self.ns_per_frame;
        let threshold = render_ts_ns as f64 - period_frames as f64 * self.ns_per_frame;
        if head_ts >= threshold {
            return 0;
        }

        // Whole frames only, so rounding in the timestamps never eats a live frame
        ((threshold - head_ts) / self.ns_per_frame).floor() as usize
    }

    /// Free space so `incoming` frames fit, returning the frames evicted
    fn make_room(&self, write: u64, incoming: u64) -> usize {
        let capacity = self.capacity as u64;
        loop {
            let read = self.read.load(Ordering::Acquire);
            let buffered = write.saturating_sub(read);
            let overflow = (buffered + incoming).saturating_sub(capacity);
            if overflow == 0 {
                return 0;
            }
            if self
                .read
                .compare_exchange_weak(read, read + overflow, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return overflow as usize;
            }
        }
    }

    /// Index of the left sample of absolute frame `frame`
    #[inline]
    fn slot_of(&self, frame: u64) -> usize {
        (frame % self.capacity as u64) as usize * CHANNELS
    }
}

impl std::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRing")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}
