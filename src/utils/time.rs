//! Time and timestamp utilities

use chrono::Utc;

/// Current Unix timestamp in milliseconds
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_is_milliseconds() {
        // 2020-01-01T00:00:00Z in ms
        assert!(current_timestamp_ms() > 1_577_836_800_000);
    }
}
