//! In-memory stream storage.
//!
//! Provides a thread-safe in-memory implementation of stream storage with
//! support for long-polling and SSE. The path map is behind a reader-writer
//! lock and holds reference-counted stream handles; per-stream state has its
//! own mutex. Lookups take the read lock only long enough to clone the
//! handle, so a concurrent DELETE removes the map entry while in-flight
//! readers and waiters keep a valid handle until they finish.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    json::{self, JsonAppendError},
    producer::{self, ProducerDecision},
    types::{
        format_offset, is_valid_request_offset, normalize_content_type, parse_offset,
        AppendOutcome, AppendRequest, ClosedBy, CreateOutcome, ProducerState, ReadResult,
        StreamConfig, StreamInfo, StreamLifecycleEvent, StreamMessage,
    },
};

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Stream not found: {0}")]
    NotFound(String),

    #[error("Stream already exists with different configuration")]
    ConfigMismatch,

    #[error("Content-type mismatch: expected {expected}, got {actual}")]
    ContentTypeMismatch { expected: String, actual: String },

    #[error("Sequence conflict: {0}")]
    SequenceConflict(String),

    #[error("Invalid offset format: {0}")]
    InvalidOffset(String),

    #[error("Empty body not allowed")]
    EmptyBody,

    #[error("Cannot specify both TTL and Expires-At")]
    TtlConflict,

    #[error("Invalid TTL value")]
    InvalidTtl,

    #[error("Invalid JSON payload")]
    InvalidJson,

    #[error("Empty arrays not allowed on append")]
    EmptyArray,

    #[error("Stream is closed")]
    StreamClosed { next_offset: String },

    #[error("Stale producer epoch: current epoch is {current_epoch}")]
    StaleEpoch { current_epoch: u64 },

    #[error("New producer epoch must start at sequence 0")]
    InvalidEpochSeq,

    #[error("Producer sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: u64, received: u64 },
}

/// Notification published when a stream changes.
#[derive(Debug, Clone)]
pub struct StreamNotification {
    pub path: String,
    pub next_offset: String,
    pub kind: NotificationKind,
}

/// What changed on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Appended,
    Closed,
    Deleted,
}

/// Immutable stream identity plus its mutable state.
///
/// The metadata fields never change after creation, so expiry checks and
/// content-type comparisons need no lock.
struct StreamShared {
    path: String,
    content_type: Option<String>,
    content_type_normalized: Option<String>,
    is_json: bool,
    ttl_seconds: Option<u64>,
    expires_at: Option<DateTime<Utc>>,
    created_at: i64,
    created_closed: bool,
    state: Mutex<StreamState>,
}

#[derive(Default)]
struct StreamState {
    messages: Vec<StreamMessage>,
    current_offset: String,
    last_seq: Option<String>,
    closed: bool,
    closed_by: Option<ClosedBy>,
    producers: HashMap<String, ProducerState>,
}

impl StreamShared {
    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            return Utc::now() >= expires_at;
        }
        if let Some(ttl_seconds) = self.ttl_seconds {
            let expiry = self.created_at + (ttl_seconds as i64 * 1000);
            return Utc::now().timestamp_millis() >= expiry;
        }
        false
    }
}

/// In-memory stream store with long-poll support.
pub struct StreamStore {
    /// Streams indexed by path
    streams: RwLock<HashMap<String, Arc<StreamShared>>>,
    /// Broadcast channel for append/close/delete notifications
    notify_tx: broadcast::Sender<StreamNotification>,
    /// Lifecycle event callback
    on_lifecycle: Option<Box<dyn Fn(StreamLifecycleEvent) + Send + Sync>>,
}

impl StreamStore {
    /// Create a new empty stream store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a new stream store with lifecycle callbacks.
    pub fn with_lifecycle<F>(on_lifecycle: F) -> Arc<Self>
    where
        F: Fn(StreamLifecycleEvent) + Send + Sync + 'static,
    {
        let (notify_tx, _) = broadcast::channel(1024);
        Arc::new(Self {
            streams: RwLock::new(HashMap::new()),
            notify_tx,
            on_lifecycle: Some(Box::new(on_lifecycle)),
        })
    }

    /// Subscribe to stream notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamNotification> {
        self.notify_tx.subscribe()
    }

    /// Check if a stream exists (and is not expired).
    pub fn has(&self, path: &str) -> bool {
        self.get_handle(path).is_some()
    }

    /// Metadata snapshot of a stream.
    pub fn info(&self, path: &str) -> Option<StreamInfo> {
        let shared = self.get_handle(path)?;
        let st = shared.state.lock();
        Some(StreamInfo {
            path: shared.path.clone(),
            content_type: shared.content_type.clone(),
            current_offset: st.current_offset.clone(),
            closed: st.closed,
        })
    }

    /// Create a new stream.
    ///
    /// Idempotent: a second create with matching configuration (normalized
    /// content type, TTL, expiry, initial closed flag) succeeds with
    /// `created: false`. A mismatch is `ConfigMismatch`.
    pub fn create(&self, path: &str, config: StreamConfig) -> Result<CreateOutcome, StoreError> {
        if config.ttl_seconds.is_some() && config.expires_at.is_some() {
            return Err(StoreError::TtlConflict);
        }

        let new_normalized = config.content_type.as_deref().map(normalize_content_type);
        let is_json = new_normalized.as_deref() == Some("application/json");

        let mut streams = self.streams.write();

        if let Some(existing) = streams.get(path) {
            if existing.is_expired() {
                // Remove expired stream and continue with creation
                streams.remove(path);
                self.emit_deleted(path);
            } else {
                if existing.content_type_normalized != new_normalized
                    || existing.ttl_seconds != config.ttl_seconds
                    || existing.expires_at != config.expires_at
                    || existing.created_closed != config.closed
                {
                    return Err(StoreError::ConfigMismatch);
                }

                // Already exists with same config - idempotent
                let st = existing.state.lock();
                return Ok(CreateOutcome {
                    created: false,
                    next_offset: st.current_offset.clone(),
                    closed: st.closed,
                });
            }
        }

        let now = Utc::now().timestamp_millis();
        let mut state = StreamState {
            current_offset: format_offset(0, 0),
            ..Default::default()
        };

        // Handle initial data
        if let Some(data) = config.initial_data.as_ref().filter(|d| !d.is_empty()) {
            let stored = if is_json {
                // An empty initial array creates the stream with no messages.
                match json::flatten_append(data, true) {
                    Ok(fragment) => fragment,
                    Err(_) => return Err(StoreError::InvalidJson),
                }
            } else {
                Some(data.to_vec())
            };

            if let Some(bytes) = stored {
                state.current_offset = format_offset(0, bytes.len() as u64);
                state.messages.push(StreamMessage {
                    data: Bytes::from(bytes),
                    offset: state.current_offset.clone(),
                    timestamp: now,
                });
            }
        }

        if config.closed {
            state.closed = true;
        }

        let outcome = CreateOutcome {
            created: true,
            next_offset: state.current_offset.clone(),
            closed: state.closed,
        };

        info!(path = %path, "Created stream");
        streams.insert(
            path.to_string(),
            Arc::new(StreamShared {
                path: path.to_string(),
                content_type: config.content_type.clone(),
                content_type_normalized: new_normalized,
                is_json,
                ttl_seconds: config.ttl_seconds,
                expires_at: config.expires_at,
                created_at: now,
                created_closed: config.closed,
                state: Mutex::new(state),
            }),
        );
        drop(streams);

        self.emit_lifecycle(StreamLifecycleEvent::Created {
            path: path.to_string(),
            content_type: config.content_type,
            timestamp: now,
        });

        Ok(outcome)
    }

    /// Delete a stream. Waiters are woken and will observe `NotFound`.
    pub fn delete(&self, path: &str) -> bool {
        let removed = self.streams.write().remove(path).is_some();

        if removed {
            info!(path = %path, "Deleted stream");
            self.emit_deleted(path);
        }

        removed
    }

    /// Append data to a stream, or seal it, per the request options.
    ///
    /// Checks run in a fixed order under the stream mutex: closed state,
    /// content type, producer triplet, `Stream-Seq`, JSON shape. Nothing is
    /// committed on a failing check; in particular a JSON validation failure
    /// never advances producer state.
    pub fn append(&self, path: &str, req: AppendRequest) -> Result<AppendOutcome, StoreError> {
        let shared = self
            .get_handle(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let outcome = {
            let mut st = shared.state.lock();

            if st.closed {
                if let (Some(p), Some(cb)) = (req.producer.as_ref(), st.closed_by.as_ref()) {
                    if p.id == cb.producer_id && p.epoch == cb.epoch && p.seq == cb.seq {
                        // Retry of the request that sealed the stream.
                        let last_seq =
                            st.producers.get(&p.id).map(|s| s.last_seq).unwrap_or(p.seq);
                        return Ok(AppendOutcome {
                            next_offset: st.current_offset.clone(),
                            producer_epoch: Some(p.epoch),
                            producer_seq: Some(last_seq),
                            duplicate: true,
                            closed: true,
                        });
                    }
                }
                return Err(StoreError::StreamClosed {
                    next_offset: st.current_offset.clone(),
                });
            }

            if let Some(ct) = req.content_type.as_deref() {
                if let Some(expected) = shared.content_type_normalized.as_deref() {
                    if normalize_content_type(ct) != expected {
                        return Err(StoreError::ContentTypeMismatch {
                            expected: shared.content_type.clone().unwrap_or_default(),
                            actual: ct.to_string(),
                        });
                    }
                }
            }

            if let Some(p) = req.producer.as_ref() {
                match producer::validate(st.producers.get(&p.id), p.epoch, p.seq) {
                    ProducerDecision::Accepted => {}
                    ProducerDecision::Duplicate { last_seq } => {
                        return Ok(AppendOutcome {
                            next_offset: st.current_offset.clone(),
                            producer_epoch: Some(p.epoch),
                            producer_seq: Some(last_seq),
                            duplicate: true,
                            closed: st.closed,
                        });
                    }
                    ProducerDecision::StaleEpoch { current_epoch } => {
                        return Err(StoreError::StaleEpoch { current_epoch });
                    }
                    ProducerDecision::InvalidEpochSeq => {
                        return Err(StoreError::InvalidEpochSeq);
                    }
                    ProducerDecision::SequenceGap { expected, received } => {
                        return Err(StoreError::SequenceGap { expected, received });
                    }
                }
            }

            // Validate sequence (must be strictly increasing)
            if let Some(seq) = req.seq.as_deref() {
                if let Some(last) = st.last_seq.as_deref() {
                    if seq <= last {
                        return Err(StoreError::SequenceConflict(format!(
                            "sequence {} <= last sequence {}",
                            seq, last
                        )));
                    }
                }
            }

            // Process the payload before any mutation.
            let stored: Option<Vec<u8>> = if req.data.is_empty() {
                if !req.close {
                    return Err(StoreError::EmptyBody);
                }
                // Close-only request.
                None
            } else if shared.is_json {
                match json::flatten_append(&req.data, false) {
                    Ok(fragment) => fragment,
                    Err(JsonAppendError::EmptyArray) => return Err(StoreError::EmptyArray),
                    Err(JsonAppendError::Invalid) => return Err(StoreError::InvalidJson),
                }
            } else {
                Some(req.data.to_vec())
            };

            // Commit.
            let now = Utc::now().timestamp_millis();
            if let Some(bytes) = stored {
                let (read_seq, byte_offset) = parse_offset(&st.current_offset).unwrap();
                st.current_offset = format_offset(read_seq, byte_offset + bytes.len() as u64);
                let message = StreamMessage {
                    data: Bytes::from(bytes),
                    offset: st.current_offset.clone(),
                    timestamp: now,
                };
                st.messages.push(message);
            }
            if let Some(p) = req.producer.as_ref() {
                st.producers.insert(
                    p.id.clone(),
                    ProducerState {
                        epoch: p.epoch,
                        last_seq: p.seq,
                        last_updated: now,
                    },
                );
            }
            if let Some(seq) = req.seq {
                st.last_seq = Some(seq);
            }
            if req.close {
                st.closed = true;
                st.closed_by = req.producer.as_ref().map(|p| ClosedBy {
                    producer_id: p.id.clone(),
                    epoch: p.epoch,
                    seq: p.seq,
                });
            }

            AppendOutcome {
                next_offset: st.current_offset.clone(),
                producer_epoch: req.producer.as_ref().map(|p| p.epoch),
                producer_seq: req.producer.as_ref().map(|p| p.seq),
                duplicate: false,
                closed: st.closed,
            }
        };

        debug!(path = %path, offset = %outcome.next_offset, closed = outcome.closed, "Appended to stream");

        let kind = if outcome.closed {
            NotificationKind::Closed
        } else {
            NotificationKind::Appended
        };
        self.notify(path, &outcome.next_offset, kind);

        Ok(outcome)
    }

    /// Read messages from a stream committed after the given offset.
    ///
    /// `-1` reads from the beginning, `now` from the current tail (empty).
    /// The read is a single snapshot: `next_offset` is the tail at the time
    /// of the call and `up_to_date` is always true.
    pub fn read(&self, path: &str, offset: &str) -> Result<ReadResult, StoreError> {
        let shared = self
            .get_handle(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if !is_valid_request_offset(offset) {
            return Err(StoreError::InvalidOffset(offset.to_string()));
        }

        let st = shared.state.lock();
        let start = match offset {
            "-1" => 0,
            "now" => st.messages.len(),
            // Offsets record the tail after each commit and are strictly
            // increasing, so the messages beyond an offset form a suffix.
            _ => st.messages.partition_point(|m| m.offset.as_str() <= offset),
        };
        let messages = st.messages[start..].to_vec();

        Ok(ReadResult {
            messages,
            next_offset: st.current_offset.clone(),
            up_to_date: true,
            closed: st.closed,
            json: shared.is_json,
        })
    }

    /// Read, waiting for new data if there is none yet.
    ///
    /// Returns immediately when messages beyond `offset` exist or the stream
    /// is closed. Otherwise sleeps on the notification channel until an
    /// append, a close, a delete, or the deadline; every wake-up re-evaluates
    /// the predicate. On timeout the result is empty with `up_to_date` set.
    pub async fn read_or_wait(
        &self,
        path: &str,
        offset: &str,
        timeout: Duration,
    ) -> Result<ReadResult, StoreError> {
        // Subscribe before the first check: notifications sent after this
        // point are buffered, so a commit between check and sleep is not lost.
        let mut rx = self.subscribe();

        // `now` is resolved once, against the tail at request time.
        let resolved;
        let offset = if offset == "now" {
            resolved = self
                .info(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?
                .current_offset;
            resolved.as_str()
        } else {
            offset
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let result = self.read(path, offset)?;
            if result.has_data() || result.closed {
                return Ok(result);
            }

            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Ok(notification)) if notification.path == path => break,
                    Ok(Ok(_)) => continue, // Different path
                    Ok(Err(broadcast::error::RecvError::Lagged(_))) => break,
                    Ok(Err(broadcast::error::RecvError::Closed)) => {
                        return self.read(path, offset);
                    }
                    Err(_) => return self.read(path, offset),
                }
            }
        }
    }

    /// List all non-expired streams.
    pub fn list(&self) -> Vec<String> {
        let streams = self.streams.read();
        streams
            .iter()
            .filter(|(_, s)| !s.is_expired())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Resolve a live handle, collecting the stream if it has expired.
    fn get_handle(&self, path: &str) -> Option<Arc<StreamShared>> {
        let shared = self.streams.read().get(path).cloned()?;
        if !shared.is_expired() {
            return Some(shared);
        }

        // Expired: upgrade to the write lock and remove, unless a concurrent
        // create already replaced the entry.
        let mut streams = self.streams.write();
        if let Some(current) = streams.get(path) {
            if Arc::ptr_eq(current, &shared) {
                streams.remove(path);
                drop(streams);
                self.emit_deleted(path);
            }
        }
        None
    }

    fn notify(&self, path: &str, next_offset: &str, kind: NotificationKind) {
        let _ = self.notify_tx.send(StreamNotification {
            path: path.to_string(),
            next_offset: next_offset.to_string(),
            kind,
        });
    }

    fn emit_deleted(&self, path: &str) {
        self.notify(path, "", NotificationKind::Deleted);
        self.emit_lifecycle(StreamLifecycleEvent::Deleted {
            path: path.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });
    }

    fn emit_lifecycle(&self, event: StreamLifecycleEvent) {
        if let Some(ref callback) = self.on_lifecycle {
            callback(event);
        }
    }
}

impl Default for StreamStore {
    fn default() -> Self {
        let (notify_tx, _) = broadcast::channel(1024);
        Self {
            streams: RwLock::new(HashMap::new()),
            notify_tx,
            on_lifecycle: None,
        }
    }
}
