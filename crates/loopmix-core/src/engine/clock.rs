//! Monotonic nanosecond clock
//!
//! Producers stamp node frames with this clock and hosts without a hardware
//! timestamp can use it for render calls, so both sides share one timeline.

use std::sync::OnceLock;
use std::time::Instant;

static CLOCK_ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since the first call in this process
pub fn monotonic_timestamp_ns() -> u64 {
    let origin = CLOCK_ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_nanos() as u64
}

/// Duration of one frame in nanoseconds
#[inline]
pub fn ns_per_frame(sample_rate: f64) -> f64 {
    1_000_000_000.0 / sample_rate
}

/// Duration of `frames` frames in nanoseconds (truncated)
#[inline]
pub fn frames_to_ns(frames: usize, sample_rate: f64) -> u64 {
    (frames as f64 * ns_per_frame(sample_rate)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let a = monotonic_timestamp_ns();
        let b = monotonic_timestamp_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_frames_to_ns() {
        assert_eq!(frames_to_ns(48_000, 48_000.0), 1_000_000_000);
        assert_eq!(frames_to_ns(500, 50_000.0), 10_000_000);
        assert_eq!(frames_to_ns(0, 44_100.0), 0);
    }
}
