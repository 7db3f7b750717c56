use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::clock_format::TimestampFormat;

/// Source of monotonic instants used for latency measurement.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Generates a wall-clock timestamp with specified format.
///
/// Timestamps are always generated for UTC.
///
/// ```
/// use rtt_probe::clock_format::TimestampFormat;
/// use rtt_probe::time::generate_timestamp;
/// let timestamp = generate_timestamp(TimestampFormat::Unix);
/// println!("Timestamp is {}", timestamp);
/// ```
pub fn generate_timestamp(format: TimestampFormat) -> String {
    format_timestamp(Utc::now(), format)
}

fn format_timestamp(date: DateTime<Utc>, format: TimestampFormat) -> String {
    match format {
        TimestampFormat::Rfc3339 => date.to_rfc3339_opts(SecondsFormat::Millis, true),
        TimestampFormat::Unix => date.timestamp_millis().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_timestamp_rfc3339_test() {
        let sample = DateTime::<Utc>::from_timestamp(1_525_987, 151_000_000)
            .expect("Invalid timestamp");
        assert_eq!(
            format_timestamp(sample, TimestampFormat::Rfc3339),
            "1970-01-18T15:53:07.151Z"
        );
    }

    #[test]
    fn format_timestamp_unix_test() {
        const TEST_CASES: &[(i64, u32, &str)] = &[
            (0, 0, "0"),
            (1_525_987, 0, "1525987000"),
            (2_584_229, 151_000_000, "2584229151"),
        ];

        for &(secs, nanos, expected) in TEST_CASES {
            let sample = DateTime::<Utc>::from_timestamp(secs, nanos).expect("Invalid timestamp");
            assert_eq!(format_timestamp(sample, TimestampFormat::Unix), expected);
        }
    }

    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b.duration_since(a) >= Duration::ZERO);
    }
}
