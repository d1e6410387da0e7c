//! Core types for the durable streams server.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Byte length of a well-formed offset string: 16 digits, `_`, 16 digits.
pub const OFFSET_LEN: usize = 33;

/// A message stored in a stream.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Raw message bytes. For JSON streams this is a comma-terminated
    /// fragment produced by [`crate::json::flatten_append`].
    pub data: Bytes,
    /// The stream's tail offset after this message was committed.
    pub offset: String,
    /// Timestamp when the message was appended (milliseconds since epoch)
    pub timestamp: i64,
}

/// Per-producer idempotency state for a stream.
#[derive(Debug, Clone)]
pub struct ProducerState {
    /// Generation number; only ever increases.
    pub epoch: u64,
    /// Highest sequence accepted within the current epoch.
    pub last_seq: u64,
    /// Timestamp of the last accepted append (milliseconds since epoch)
    pub last_updated: i64,
}

/// Identity of the request that sealed a stream, kept so a retried close
/// is recognized as a duplicate rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedBy {
    pub producer_id: String,
    pub epoch: u64,
    pub seq: u64,
}

/// The `Producer-Id` / `Producer-Epoch` / `Producer-Seq` header triplet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerTriplet {
    pub id: String,
    pub epoch: u64,
    pub seq: u64,
}

/// Configuration for creating a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    pub content_type: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub initial_data: Option<Bytes>,
    /// Create the stream already sealed.
    pub closed: bool,
}

/// Outcome of a create operation.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// True if the stream was newly created, false for an idempotent match.
    pub created: bool,
    pub next_offset: String,
    pub closed: bool,
}

/// An append (or close) request against an existing stream.
#[derive(Debug, Clone, Default)]
pub struct AppendRequest {
    pub data: Bytes,
    pub content_type: Option<String>,
    /// `Stream-Seq` header: must be lexicographically greater than the
    /// stream's last seen value.
    pub seq: Option<String>,
    pub producer: Option<ProducerTriplet>,
    /// Seal the stream after this append.
    pub close: bool,
}

/// Outcome of a successful (or idempotently replayed) append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub next_offset: String,
    /// Echoed producer epoch, when the request carried the triplet.
    pub producer_epoch: Option<u64>,
    /// Acknowledged sequence: the request's seq, or the recorded last_seq
    /// when the append was a duplicate.
    pub producer_seq: Option<u64>,
    /// True when the append was deduplicated and nothing was committed.
    pub duplicate: bool,
    /// True when the stream is sealed after this operation.
    pub closed: bool,
}

/// Metadata snapshot of a stream, for HEAD responses and adapters.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub path: String,
    pub content_type: Option<String>,
    pub current_offset: String,
    pub closed: bool,
}

/// Result of reading from a stream.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Messages read from the stream
    pub messages: Vec<StreamMessage>,
    /// Next offset to use for subsequent reads
    pub next_offset: String,
    /// Whether we've caught up to the tail
    pub up_to_date: bool,
    /// Whether the stream is sealed at the covered tail
    pub closed: bool,
    /// Whether the stream holds JSON fragments (drives body formatting)
    pub json: bool,
}

impl ReadResult {
    /// Format the response body.
    ///
    /// For JSON streams, wraps the concatenated fragments in array brackets;
    /// an empty read yields `[]`. Other streams are a raw concatenation.
    pub fn body(&self) -> Bytes {
        if self.json {
            return Bytes::from(crate::json::format_array_body(
                self.messages.iter().map(|m| m.data.as_ref()),
            ));
        }
        let total: usize = self.messages.iter().map(|m| m.data.len()).sum();
        let mut out = Vec::with_capacity(total);
        for m in &self.messages {
            out.extend_from_slice(&m.data);
        }
        Bytes::from(out)
    }

    /// Whether the read returned any messages.
    pub fn has_data(&self) -> bool {
        !self.messages.is_empty()
    }
}

/// Server configuration options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Port to listen on (0 for auto-assign)
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Long-poll timeout in milliseconds
    pub long_poll_timeout_ms: u64,
    /// Enable compression
    pub compression: bool,
    /// Cursor interval in seconds
    pub cursor_interval_seconds: u64,
    /// Cursor epoch for interval calculation
    pub cursor_epoch: DateTime<Utc>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
            long_poll_timeout_ms: 30_000,
            compression: true,
            cursor_interval_seconds: 20,
            // October 9, 2024 as default epoch
            cursor_epoch: DateTime::parse_from_rfc3339("2024-10-09T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }
}

/// Format an offset string from read sequence and byte offset.
/// Format: "readSeq_byteOffset" with 16-digit zero-padding each.
pub fn format_offset(read_seq: u64, byte_offset: u64) -> String {
    format!("{:016}_{:016}", read_seq, byte_offset)
}

/// Parse an offset string into (read_seq, byte_offset).
///
/// Strict: exactly 33 bytes, `_` at position 16, both halves digit-only.
/// Returns None if the format is invalid.
pub fn parse_offset(offset: &str) -> Option<(u64, u64)> {
    let bytes = offset.as_bytes();
    if bytes.len() != OFFSET_LEN || bytes[16] != b'_' {
        return None;
    }
    let (head, tail) = (&offset[..16], &offset[17..]);
    if !head.bytes().all(|b| b.is_ascii_digit()) || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let read_seq = head.parse().ok()?;
    let byte_offset = tail.parse().ok()?;
    Some((read_seq, byte_offset))
}

/// Check whether a request offset is acceptable: the sentinels `-1` and
/// `now`, or a well-formed concrete offset.
pub fn is_valid_request_offset(offset: &str) -> bool {
    offset == "-1" || offset == "now" || parse_offset(offset).is_some()
}

/// Normalize a content type: strip parameters at the first `;`, trim,
/// lowercase. Stream content types are compared in this form.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Check whether a content type denotes a JSON stream.
pub fn is_json_content_type(content_type: &str) -> bool {
    normalize_content_type(content_type) == "application/json"
}

/// Compare two offsets lexicographically.
/// Zero-padding makes this equal to numeric comparison of the pairs.
pub fn compare_offsets(a: &str, b: &str) -> std::cmp::Ordering {
    a.cmp(b)
}

/// Stream lifecycle event for hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamLifecycleEvent {
    Created {
        path: String,
        content_type: Option<String>,
        timestamp: i64,
    },
    Deleted {
        path: String,
        timestamp: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(0, 0), "0000000000000000_0000000000000000");
        assert_eq!(format_offset(0, 1024), "0000000000000000_0000000000001024");
        assert_eq!(format_offset(1, 0), "0000000000000001_0000000000000000");
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(
            parse_offset("0000000000000000_0000000000001024"),
            Some((0, 1024))
        );
        assert_eq!(parse_offset("invalid"), None);
        assert_eq!(parse_offset("abc_def"), None);
        // right shape, wrong width
        assert_eq!(parse_offset("0_0"), None);
        assert_eq!(parse_offset("000000000000000_00000000000010245"), None);
        // separator in the wrong place
        assert_eq!(parse_offset("00000000000000000000000000000000_"), None);
        // sign and whitespace are not digits
        assert_eq!(parse_offset("-000000000000000_0000000000001024"), None);
        assert_eq!(parse_offset(" 000000000000000_0000000000001024"), None);
    }

    #[test]
    fn test_offset_roundtrip() {
        let s = format_offset(0, 987_654_321);
        assert_eq!(s.len(), OFFSET_LEN);
        assert_eq!(parse_offset(&s), Some((0, 987_654_321)));
    }

    #[test]
    fn test_request_offset_validation() {
        assert!(is_valid_request_offset("-1"));
        assert!(is_valid_request_offset("now"));
        assert!(is_valid_request_offset(&format_offset(0, 5)));
        assert!(!is_valid_request_offset(""));
        assert!(!is_valid_request_offset("0"));
        assert!(!is_valid_request_offset("latest"));
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(
            normalize_content_type("application/json; charset=utf-8"),
            "application/json"
        );
        assert_eq!(normalize_content_type("text/plain"), "text/plain");
        assert_eq!(
            normalize_content_type("Application/JSON"),
            "application/json"
        );
        assert_eq!(normalize_content_type("  text/plain ; q=1"), "text/plain");
    }

    #[test]
    fn test_is_json_content_type() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(!is_json_content_type("application/octet-stream"));
    }

    #[test]
    fn test_compare_offsets() {
        use std::cmp::Ordering;
        let a = format_offset(0, 100);
        let b = format_offset(0, 200);
        let c = format_offset(1, 0);

        assert_eq!(compare_offsets(&a, &b), Ordering::Less);
        assert_eq!(compare_offsets(&b, &c), Ordering::Less);
        assert_eq!(compare_offsets(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_json_body_formatting() {
        let result = ReadResult {
            messages: vec![
                StreamMessage {
                    data: Bytes::from_static(b"{\"a\":1},"),
                    offset: format_offset(0, 8),
                    timestamp: 0,
                },
                StreamMessage {
                    data: Bytes::from_static(b"{\"b\":2},"),
                    offset: format_offset(0, 16),
                    timestamp: 0,
                },
            ],
            next_offset: format_offset(0, 16),
            up_to_date: true,
            closed: false,
            json: true,
        };
        assert_eq!(&result.body()[..], b"[{\"a\":1},{\"b\":2}]");
    }

    #[test]
    fn test_empty_json_body_is_empty_array() {
        let result = ReadResult {
            messages: Vec::new(),
            next_offset: format_offset(0, 0),
            up_to_date: true,
            closed: false,
            json: true,
        };
        assert_eq!(&result.body()[..], b"[]");
    }
}
