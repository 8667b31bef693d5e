//! Time utilities: unit constants and bar bucketing.
//!
//! All timestamps are microseconds since Unix epoch. Replays carry their own
//! recorded time, so nothing here reads the wall clock.

/// Microseconds per millisecond.
pub const US_PER_MS: u64 = 1_000;

/// Bucket index of `timestamp_us`: the timestamp rounded down to a multiple of
/// `time_frame_us`, or the raw timestamp when there is no (or a zero) frame.
#[inline]
pub fn bucket_index(timestamp_us: u64, time_frame_us: Option<u64>) -> u64 {
    match time_frame_us {
        Some(frame) if frame > 0 => timestamp_us - timestamp_us % frame,
        _ => timestamp_us,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_rounds_down() {
        assert_eq!(bucket_index(61_500_000, Some(60_000_000)), 60_000_000);
        assert_eq!(bucket_index(60_000_000, Some(60_000_000)), 60_000_000);
        assert_eq!(bucket_index(59_999_999, Some(60_000_000)), 0);
    }

    #[test]
    fn bucket_without_frame_is_raw() {
        assert_eq!(bucket_index(12_345, None), 12_345);
        assert_eq!(bucket_index(12_345, Some(0)), 12_345);
    }
}
