//! `grpc-timeout` header value grammar.
//!
//! The wire form is `<int><unit>` with the integer capped at eight decimal
//! digits and unit one of n, u, m, S, M, H. Values are promoted to coarser
//! units when they divide evenly or when the digit cap forces it, rounding
//! up so a timeout is never shortened.

use std::time::Duration;

/// Largest integer the grammar can carry.
const MAX_TIMEOUT_VALUE: u64 = 99_999_999;

/// Encode a remaining timeout. A zero (or sub-millisecond) remainder is
/// clamped to the smallest expressible timeout rather than omitted.
pub fn encode_timeout(timeout: Duration) -> String {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return "1n".to_string();
    }
    if millis % 1000 == 0 {
        return encode_seconds(millis / 1000);
    }
    if millis <= MAX_TIMEOUT_VALUE {
        return format!("{}m", millis);
    }
    encode_seconds(millis / 1000 + 1)
}

fn encode_seconds(seconds: u64) -> String {
    if seconds % 3600 == 0 {
        format!("{}H", (seconds / 3600).min(MAX_TIMEOUT_VALUE))
    } else if seconds % 60 == 0 {
        format!("{}M", (seconds / 60).min(MAX_TIMEOUT_VALUE))
    } else if seconds <= MAX_TIMEOUT_VALUE {
        format!("{}S", seconds)
    } else if seconds / 60 < MAX_TIMEOUT_VALUE {
        format!("{}M", seconds / 60 + 1)
    } else {
        format!("{}H", (seconds / 3600 + 1).min(MAX_TIMEOUT_VALUE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_deadline_floors_to_one_nano() {
        assert_eq!(encode_timeout(Duration::ZERO), "1n");
        assert_eq!(encode_timeout(Duration::from_micros(400)), "1n");
    }

    #[test]
    fn test_millis() {
        assert_eq!(encode_timeout(Duration::from_millis(1)), "1m");
        assert_eq!(encode_timeout(Duration::from_millis(250)), "250m");
        assert_eq!(encode_timeout(Duration::from_millis(1500)), "1500m");
    }

    #[test]
    fn test_unit_promotion_on_even_division() {
        assert_eq!(encode_timeout(Duration::from_secs(3)), "3S");
        assert_eq!(encode_timeout(Duration::from_secs(90)), "90S");
        assert_eq!(encode_timeout(Duration::from_secs(60)), "1M");
        assert_eq!(encode_timeout(Duration::from_secs(3600)), "1H");
        assert_eq!(encode_timeout(Duration::from_secs(7200)), "2H");
    }

    #[test]
    fn test_digit_cap_rounds_up() {
        // 99999999001 ms exceeds the cap in millis and in whole seconds;
        // it gets promoted to minutes, rounded up.
        let d = Duration::from_millis(99_999_999_001);
        assert_eq!(encode_timeout(d), "1666667M");
    }

    #[test]
    fn test_large_seconds_keep_eight_digits() {
        let d = Duration::from_millis(99_999_999_001);
        let s = encode_timeout(d);
        let digits = &s[..s.len() - 1];
        assert!(digits.len() <= 8, "got {}", s);
    }
}
