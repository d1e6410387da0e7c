//! Cursor system for CDN cache collision prevention.
//!
//! The cursor system divides time into fixed intervals and returns cursor
//! values that change at interval boundaries. This prevents infinite cache
//! loops when multiple clients request the same data within the same time
//! period. The cursor is opaque to clients and is a cache key, not a secret,
//! so a non-cryptographic RNG supplies the jitter.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Options for cursor calculation.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Interval duration in seconds (default: 20)
    pub interval_seconds: u64,
    /// Epoch for interval calculation (default: Oct 9, 2024)
    pub epoch: DateTime<Utc>,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            interval_seconds: 20,
            epoch: DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }
}

/// Calculate the current cursor value based on time intervals.
///
/// The cursor is the number of intervals that have passed since the epoch.
pub fn calculate_cursor(options: &CursorOptions) -> u64 {
    let now = Utc::now();
    let elapsed = now
        .signed_duration_since(options.epoch)
        .num_seconds()
        .max(0) as u64;
    elapsed / options.interval_seconds.max(1)
}

/// Generate a response cursor that is guaranteed to be monotonically
/// increasing.
///
/// If the client presents a cursor at or ahead of the current interval, the
/// response cursor is `client + 1` plus random jitter (up to an hour's worth
/// of intervals) to force cache-key variation while keeping monotonicity.
pub fn generate_response_cursor(client_cursor: Option<u64>, options: &CursorOptions) -> u64 {
    let current_interval = calculate_cursor(options);

    match client_cursor {
        Some(cursor) if cursor >= current_interval => {
            let mut rng = rand::thread_rng();
            let jitter_seconds: u64 = rng.gen_range(0..3600);
            cursor + 1 + jitter_seconds / options.interval_seconds.max(1)
        }
        Some(cursor) => current_interval.max(cursor),
        None => current_interval,
    }
}

/// Parse a cursor string into a u64.
pub fn parse_cursor(cursor: &str) -> Option<u64> {
    cursor.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cursor() {
        let options = CursorOptions {
            interval_seconds: 20,
            epoch: Utc::now() - chrono::Duration::seconds(100),
        };

        let cursor = calculate_cursor(&options);
        // Should be around 5 (100 seconds / 20 second intervals)
        assert!((4..=6).contains(&cursor));
    }

    #[test]
    fn test_generate_response_cursor_no_client() {
        let options = CursorOptions {
            interval_seconds: 20,
            epoch: Utc::now() - chrono::Duration::seconds(1000),
        };
        let cursor = generate_response_cursor(None, &options);
        assert!(cursor > 0);
    }

    #[test]
    fn test_generate_response_cursor_client_behind() {
        let options = CursorOptions {
            interval_seconds: 20,
            epoch: Utc::now() - chrono::Duration::seconds(1000),
        };

        let current = calculate_cursor(&options);
        let result = generate_response_cursor(Some(current - 10), &options);

        assert_eq!(result, current);
    }

    #[test]
    fn test_generate_response_cursor_client_ahead() {
        let options = CursorOptions::default();
        let client_cursor = calculate_cursor(&options) + 100;

        let result = generate_response_cursor(Some(client_cursor), &options);

        // Strictly greater than the client cursor, even with zero jitter
        assert!(result > client_cursor);
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor("12345"), Some(12345));
        assert_eq!(parse_cursor("invalid"), None);
    }
}
