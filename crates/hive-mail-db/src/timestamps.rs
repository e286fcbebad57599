//! Timestamp conversion utilities
//!
//! Timestamps are stored as `i64` microseconds since the Unix epoch (naive
//! UTC). [`now_micros`] keeps a high-water mark so stored timestamps never
//! regress when the wall clock jumps backward (NTP correction, VM
//! migration).

use chrono::{NaiveDateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Backward jump threshold: 1 second in microseconds.
const BACKWARD_JUMP_THRESHOLD_US: i64 = 1_000_000;

/// Last observed wall-clock value (microseconds since epoch).
static LAST_SYSTEM_TIME_US: AtomicI64 = AtomicI64::new(0);

/// Convert chrono `NaiveDateTime` to microseconds since Unix epoch.
#[inline]
#[must_use]
pub fn naive_to_micros(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_micros()
}

/// Convert microseconds since Unix epoch to chrono `NaiveDateTime`.
///
/// Values outside chrono's representable range saturate instead of
/// panicking.
#[inline]
#[must_use]
pub fn micros_to_naive(micros: i64) -> NaiveDateTime {
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let sub_micros = micros.rem_euclid(MICROS_PER_SECOND);
    let nsecs = u32::try_from(sub_micros * 1000).unwrap_or(0);
    Utc.timestamp_opt(secs, nsecs)
        .single()
        .unwrap_or(if micros < 0 {
            chrono::DateTime::<Utc>::MIN_UTC
        } else {
            chrono::DateTime::<Utc>::MAX_UTC
        })
        .naive_utc()
}

/// Current time as microseconds since Unix epoch, monotonic under backward
/// clock jumps.
///
/// A backward jump of more than 1 second returns the last observed value so
/// event and row timestamps never regress.
#[inline]
#[must_use]
pub fn now_micros() -> i64 {
    let current = Utc::now().timestamp_micros();
    let last = LAST_SYSTEM_TIME_US.load(Ordering::Relaxed);

    if last != 0 && current - last < -BACKWARD_JUMP_THRESHOLD_US {
        // Keep the high-water mark until the clock catches up.
        return last;
    }

    LAST_SYSTEM_TIME_US.store(current, Ordering::Relaxed);
    current
}

/// Convert microseconds to an ISO-8601 string for response payloads.
#[inline]
#[must_use]
pub fn micros_to_iso(micros: i64) -> String {
    micros_to_naive(micros)
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let now = Utc::now().naive_utc();
        let micros = naive_to_micros(now);
        let back = micros_to_naive(micros);
        let diff = (now.and_utc().timestamp_micros() - back.and_utc().timestamp_micros()).abs();
        assert!(diff <= 1, "round trip drift: {diff}");
    }

    #[test]
    fn now_is_within_wall_clock_bounds() {
        let before = Utc::now().timestamp_micros();
        let now = now_micros();
        let after = Utc::now().timestamp_micros();
        assert!(now >= before.min(LAST_SYSTEM_TIME_US.load(Ordering::Relaxed)));
        assert!(now <= after.max(LAST_SYSTEM_TIME_US.load(Ordering::Relaxed)));
    }

    #[test]
    fn successive_calls_never_regress() {
        let t1 = now_micros();
        let t2 = now_micros();
        let t3 = now_micros();
        assert!(t2 >= t1);
        assert!(t3 >= t2);
    }

    #[test]
    fn iso_formatting() {
        let micros = 1_704_067_200_000_000_i64; // 2024-01-01 00:00:00 UTC
        assert!(micros_to_iso(micros).starts_with("2024-01-01T00:00:00"));
    }

    #[test]
    fn extreme_values_saturate() {
        use chrono::Datelike;
        assert!(micros_to_naive(i64::MIN).year() < -200_000);
        assert!(micros_to_naive(i64::MAX).year() > 200_000);
    }

    #[test]
    fn negative_micros_round_trip() {
        let micros = -500_000_i64;
        let dt = micros_to_naive(micros);
        assert_eq!(naive_to_micros(dt), micros);
    }
}
