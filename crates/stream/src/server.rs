//! HTTP server implementing the durable streams protocol.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::{delete, get, head, options, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::time::timeout;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{debug, info, warn};

use crate::{
    cursor::{generate_response_cursor, parse_cursor, CursorOptions},
    fault::{FaultInjector, FaultSpec},
    store::{NotificationKind, StoreError, StreamStore},
    types::{
        is_valid_request_offset, AppendRequest, ProducerTriplet, ReadResult, ServerOptions,
        StreamConfig,
    },
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StreamStore>,
    pub fault: Arc<FaultInjector>,
    pub options: ServerOptions,
}

/// Query parameters for GET requests.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<String>,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

/// Create the router with all stream endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        // Test-only fault injection, registered ahead of the wildcard
        .route(
            "/_test/inject-error",
            post(handle_inject_fault).delete(handle_clear_fault),
        )
        // Stream operations on wildcard paths
        .route("/{*path}", put(handle_create))
        .route("/{*path}", head(handle_head))
        .route("/{*path}", get(handle_read))
        .route("/{*path}", post(handle_append))
        .route("/{*path}", delete(handle_delete))
        .route("/{*path}", options(handle_options))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            fault_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Short-circuit requests while a fault is armed.
async fn fault_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some((status, message)) = state.fault.intercept(req.uri().path()) {
        let status =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, message).into_response();
    }
    next.run(req).await
}

/// POST /_test/inject-error - arm a fault
async fn handle_inject_fault(
    State(state): State<AppState>,
    Json(spec): Json<FaultSpec>,
) -> StatusCode {
    warn!(status = spec.status, path = ?spec.path, "Arming injected fault");
    state.fault.arm(spec);
    StatusCode::NO_CONTENT
}

/// DELETE /_test/inject-error - disarm the fault
async fn handle_clear_fault(State(state): State<AppState>) -> StatusCode {
    state.fault.disarm();
    StatusCode::NO_CONTENT
}

/// PUT - Create a new stream
async fn handle_create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{}", path);
    debug!(path = %path, "Creating stream");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let ttl_seconds = match parse_ttl_header(&headers) {
        Ok(ttl) => ttl,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    let expires_at = parse_expires_at_header(&headers);

    if ttl_seconds.is_some() && expires_at.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            "Cannot specify both Stream-TTL and Stream-Expires-At",
        )
            .into_response();
    }

    let closed = header_is_true(&headers, "Stream-Closed");

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Failed to read body").into_response();
        }
    };

    let initial_data = if body_bytes.is_empty() {
        None
    } else {
        Some(body_bytes)
    };

    let config = StreamConfig {
        content_type: content_type.clone(),
        ttl_seconds,
        expires_at,
        initial_data,
        closed,
    };

    match state.store.create(&path, config) {
        Ok(outcome) => {
            let mut response = Response::builder()
                .status(if outcome.created {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                })
                .header("Stream-Next-Offset", &outcome.next_offset)
                .header(header::LOCATION, &path);

            if outcome.closed {
                response = response.header("Stream-Closed", "true");
            }
            if let Some(ct) = content_type {
                response = response.header(header::CONTENT_TYPE, ct);
            }

            response.body(Body::empty()).unwrap()
        }
        Err(StoreError::ConfigMismatch) => (
            StatusCode::CONFLICT,
            "Stream already exists with different configuration",
        )
            .into_response(),
        Err(StoreError::TtlConflict) => (
            StatusCode::BAD_REQUEST,
            "Cannot specify both Stream-TTL and Stream-Expires-At",
        )
            .into_response(),
        Err(StoreError::InvalidJson) => {
            (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to create stream");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// HEAD - Get stream metadata
async fn handle_head(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let path = format!("/{}", path);

    let info = match state.store.info(&path) {
        Some(i) => i,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let start_offset = query.offset.as_deref().unwrap_or("-1");
    let etag = generate_etag(&path, start_offset, &info.current_offset, info.closed);
    let response_cursor = response_cursor(&state, query.cursor.as_deref());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("Stream-Next-Offset", &info.current_offset)
        .header("Stream-Cursor", response_cursor.to_string())
        .header(header::ETAG, etag);

    if info.closed {
        response = response.header("Stream-Closed", "true");
    }
    if let Some(ct) = &info.content_type {
        response = response.header(header::CONTENT_TYPE, ct.as_str());
    }

    response.body(Body::empty()).unwrap()
}

/// GET - Read from stream (catch-up, long-poll, or SSE)
async fn handle_read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/{}", path);

    let info = match state.store.info(&path) {
        Some(i) => i,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let start_offset = query.offset.as_deref().unwrap_or("-1");
    if !is_valid_request_offset(start_offset) {
        return (StatusCode::BAD_REQUEST, "Invalid offset parameter").into_response();
    }

    let live = match query.live.as_deref() {
        None => None,
        Some(mode @ ("long-poll" | "sse")) => {
            if query.offset.is_none() {
                return (
                    StatusCode::BAD_REQUEST,
                    "live reads require an offset parameter",
                )
                    .into_response();
            }
            Some(mode)
        }
        Some(_) => {
            return (StatusCode::BAD_REQUEST, "Invalid live parameter").into_response();
        }
    };

    let cursor = response_cursor(&state, query.cursor.as_deref());

    match live {
        Some("sse") => handle_sse(state, path, start_offset.to_string(), cursor).await,
        Some(_) => {
            handle_long_poll(
                state,
                path,
                start_offset.to_string(),
                cursor,
                query.timeout_ms,
                info.content_type,
            )
            .await
        }
        None => handle_catch_up(state, path, start_offset, cursor, info.content_type, &headers),
    }
}

/// Handle catch-up read (immediate snapshot)
fn handle_catch_up(
    state: AppState,
    path: String,
    offset: &str,
    cursor: u64,
    content_type: Option<String>,
    headers: &HeaderMap,
) -> Response {
    let result = match state.store.read(&path, offset) {
        Ok(r) => r,
        Err(e) => return read_error_response(e),
    };

    let etag = generate_etag(&path, offset, &result.next_offset, result.closed);

    // Conditional GET applies to catch-up reads only.
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header("Stream-Next-Offset", &result.next_offset)
            .header("Stream-Cursor", cursor.to_string())
            .header(header::ETAG, etag)
            .body(Body::empty())
            .unwrap();
    }

    data_response(&result, content_type.as_deref(), etag, cursor)
}

/// Handle long-poll read (wait for new data)
async fn handle_long_poll(
    state: AppState,
    path: String,
    offset: String,
    cursor: u64,
    timeout_ms: Option<u64>,
    content_type: Option<String>,
) -> Response {
    // The client may ask for a shorter wait; the server's timeout is the cap.
    let max_timeout = state.options.long_poll_timeout_ms;
    let wait = Duration::from_millis(timeout_ms.map_or(max_timeout, |t| t.min(max_timeout)));

    let result = match state.store.read_or_wait(&path, &offset, wait).await {
        Ok(r) => r,
        Err(e) => return read_error_response(e),
    };

    if result.has_data() {
        let etag = generate_etag(&path, &offset, &result.next_offset, result.closed);
        return data_response(&result, content_type.as_deref(), etag, cursor);
    }

    // Timed out, or the stream is closed with nothing new to deliver.
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Stream-Next-Offset", &result.next_offset)
        .header("Stream-Cursor", cursor.to_string())
        .header("Stream-Up-To-Date", "true");

    if result.closed {
        response = response.header("Stream-Closed", "true");
    }

    response.body(Body::empty()).unwrap()
}

/// Handle SSE streaming
async fn handle_sse(state: AppState, path: String, offset: String, cursor: u64) -> Response {
    let cursor_options = CursorOptions {
        interval_seconds: state.options.cursor_interval_seconds,
        epoch: state.options.cursor_epoch,
    };

    let stream = create_sse_stream(state, path, offset, cursor, cursor_options);

    Sse::new(stream)
        .keep_alive(
            axum::response::sse::KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

fn create_sse_stream(
    state: AppState,
    path: String,
    offset: String,
    cursor: u64,
    cursor_options: CursorOptions,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut rx = state.store.subscribe();
        let mut current_cursor = cursor;

        // Resolve "now" once, against the tail at connect time.
        let mut offset = if offset == "now" {
            match state.store.info(&path) {
                Some(info) => info.current_offset,
                None => return,
            }
        } else {
            offset
        };

        // First, send any existing data as replay
        match state.store.read(&path, &offset) {
            Ok(result) => {
                for msg in &result.messages {
                    yield Ok(Event::default().event("data").data(sse_payload(&msg.data, result.json)));
                }
                offset = result.next_offset.clone();

                current_cursor = generate_response_cursor(Some(current_cursor), &cursor_options);
                yield Ok(control_event(&result, current_cursor));

                if result.closed {
                    return;
                }
            }
            Err(_) => return,
        }

        // Then listen for new messages
        loop {
            let timeout_duration = Duration::from_millis(state.options.long_poll_timeout_ms);

            let wake = match timeout(timeout_duration, rx.recv()).await {
                Ok(Ok(notification)) if notification.path == path => {
                    if notification.kind == NotificationKind::Deleted {
                        break;
                    }
                    true
                }
                Ok(Ok(_)) => false, // Different path
                // Missed notifications: re-read to catch up.
                Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => true,
                Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => break,
                Err(_) => {
                    // Timeout - emit a control event with the current state
                    match state.store.read(&path, &offset) {
                        Ok(result) => {
                            current_cursor =
                                generate_response_cursor(Some(current_cursor), &cursor_options);
                            yield Ok(control_event(&result, current_cursor));
                            false
                        }
                        Err(_) => break,
                    }
                }
            };

            if !wake {
                continue;
            }

            match state.store.read(&path, &offset) {
                Ok(result) => {
                    for msg in &result.messages {
                        yield Ok(Event::default().event("data").data(sse_payload(&msg.data, result.json)));
                    }
                    offset = result.next_offset.clone();

                    current_cursor = generate_response_cursor(Some(current_cursor), &cursor_options);
                    yield Ok(control_event(&result, current_cursor));

                    if result.closed {
                        break;
                    }
                }
                Err(_) => break, // Stream deleted
            }
        }
    }
}

/// Format one message for an SSE data event. JSON fragments drop their
/// trailing comma so each event carries exactly one value.
fn sse_payload(data: &[u8], json: bool) -> String {
    let mut payload = data;
    if json {
        while payload.last() == Some(&b',') {
            payload = &payload[..payload.len() - 1];
        }
    }
    String::from_utf8_lossy(payload).into_owned()
}

fn control_event(result: &ReadResult, cursor: u64) -> Event {
    let control = serde_json::json!({
        "streamNextOffset": result.next_offset,
        "streamCursor": cursor.to_string(),
        "upToDate": result.up_to_date,
        "streamClosed": result.closed,
    });
    Event::default().event("control").data(control.to_string())
}

/// POST - Append data to stream, or seal it
async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{}", path);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let seq = headers
        .get("Stream-Seq")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let close = header_is_true(&headers, "Stream-Closed");

    let producer = match parse_producer_headers(&headers) {
        Ok(p) => p,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Failed to read body").into_response();
        }
    };

    if body_bytes.is_empty() && !close {
        return (StatusCode::BAD_REQUEST, "Empty body not allowed").into_response();
    }

    let had_data = !body_bytes.is_empty();
    let request = AppendRequest {
        data: body_bytes,
        content_type,
        seq,
        producer,
        close,
    };

    match state.store.append(&path, request) {
        Ok(outcome) => {
            // Producer-tagged data commits are 200; everything else that
            // succeeds (plain appends, close-only, duplicates) is 204.
            let status = if !outcome.duplicate && had_data && outcome.producer_epoch.is_some() {
                StatusCode::OK
            } else {
                StatusCode::NO_CONTENT
            };

            let mut response = Response::builder()
                .status(status)
                .header("Stream-Next-Offset", &outcome.next_offset);

            if let Some(epoch) = outcome.producer_epoch {
                response = response.header("Producer-Epoch", epoch.to_string());
            }
            if let Some(seq) = outcome.producer_seq {
                response = response.header("Producer-Seq", seq.to_string());
            }
            if outcome.closed {
                response = response.header("Stream-Closed", "true");
            }

            response.body(Body::empty()).unwrap()
        }
        Err(StoreError::NotFound(p)) => {
            (StatusCode::NOT_FOUND, format!("Stream not found: {}", p)).into_response()
        }
        Err(StoreError::StreamClosed { next_offset }) => Response::builder()
            .status(StatusCode::CONFLICT)
            .header("Stream-Closed", "true")
            .header("Stream-Next-Offset", &next_offset)
            .body(Body::from("Stream is closed"))
            .unwrap(),
        Err(StoreError::StaleEpoch { current_epoch }) => Response::builder()
            .status(StatusCode::FORBIDDEN)
            .header("Producer-Epoch", current_epoch.to_string())
            .body(Body::from(format!(
                "Stale producer epoch: current epoch is {}",
                current_epoch
            )))
            .unwrap(),
        Err(StoreError::InvalidEpochSeq) => (
            StatusCode::BAD_REQUEST,
            "New producer epoch must start at sequence 0",
        )
            .into_response(),
        Err(StoreError::SequenceGap { expected, received }) => Response::builder()
            .status(StatusCode::CONFLICT)
            .header("Producer-Expected-Seq", expected.to_string())
            .header("Producer-Received-Seq", received.to_string())
            .body(Body::from(format!(
                "Producer sequence gap: expected {}, received {}",
                expected, received
            )))
            .unwrap(),
        Err(StoreError::ContentTypeMismatch { expected, actual }) => (
            StatusCode::CONFLICT,
            format!(
                "Content-type mismatch: expected {}, got {}",
                expected, actual
            ),
        )
            .into_response(),
        Err(StoreError::SequenceConflict(msg)) => {
            (StatusCode::CONFLICT, format!("Sequence conflict: {}", msg)).into_response()
        }
        Err(StoreError::EmptyBody) => {
            (StatusCode::BAD_REQUEST, "Empty body not allowed").into_response()
        }
        Err(StoreError::EmptyArray) => {
            (StatusCode::BAD_REQUEST, "Empty arrays are not allowed").into_response()
        }
        Err(StoreError::InvalidJson) => {
            (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to append to stream");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// DELETE - Delete a stream
async fn handle_delete(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{}", path);

    if state.store.delete(&path) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// OPTIONS - answered with no content; the CORS layer adds the headers
async fn handle_options() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Build a 200 response carrying a read snapshot.
fn data_response(
    result: &ReadResult,
    content_type: Option<&str>,
    etag: String,
    cursor: u64,
) -> Response {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header("Stream-Next-Offset", &result.next_offset)
        .header("Stream-Cursor", cursor.to_string())
        .header(header::ETAG, etag);

    if result.up_to_date {
        response = response.header("Stream-Up-To-Date", "true");
    }
    if result.closed {
        response = response.header("Stream-Closed", "true");
    }
    if let Some(ct) = content_type {
        response = response.header(header::CONTENT_TYPE, ct);
    }

    response.body(Body::from(result.body())).unwrap()
}

fn read_error_response(error: StoreError) -> Response {
    match error {
        StoreError::NotFound(p) => {
            (StatusCode::NOT_FOUND, format!("Stream not found: {}", p)).into_response()
        }
        StoreError::InvalidOffset(o) => (
            StatusCode::BAD_REQUEST,
            format!("Invalid offset format: {}", o),
        )
            .into_response(),
        e => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Compute the response cursor for this request.
fn response_cursor(state: &AppState, client_cursor: Option<&str>) -> u64 {
    let cursor_options = CursorOptions {
        interval_seconds: state.options.cursor_interval_seconds,
        epoch: state.options.cursor_epoch,
    };
    let client_cursor = client_cursor.and_then(parse_cursor);
    generate_response_cursor(client_cursor, &cursor_options)
}

/// Generate an ETag for a read response. The `:c` suffix marks a response
/// that includes the stream's close.
fn generate_etag(path: &str, start_offset: &str, end_offset: &str, includes_close: bool) -> String {
    use base64::Engine;
    let path_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(path);
    if includes_close {
        format!("\"{}:{}:{}:c\"", path_b64, start_offset, end_offset)
    } else {
        format!("\"{}:{}:{}\"", path_b64, start_offset, end_offset)
    }
}

fn header_is_true(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Parse the idempotent-producer header triplet. All three headers must be
/// present together, `Producer-Id` must be non-empty, and epoch/seq must be
/// plain decimal integers.
fn parse_producer_headers(headers: &HeaderMap) -> Result<Option<ProducerTriplet>, &'static str> {
    let id = headers.get("Producer-Id").and_then(|v| v.to_str().ok());
    let epoch = headers.get("Producer-Epoch").and_then(|v| v.to_str().ok());
    let seq = headers.get("Producer-Seq").and_then(|v| v.to_str().ok());

    match (id, epoch, seq) {
        (None, None, None) => Ok(None),
        (Some(id), Some(epoch), Some(seq)) => {
            if id.is_empty() {
                return Err("Producer-Id must not be empty");
            }
            let epoch = parse_u64_strict(epoch)
                .ok_or("Producer-Epoch must be a non-negative integer")?;
            let seq =
                parse_u64_strict(seq).ok_or("Producer-Seq must be a non-negative integer")?;
            Ok(Some(ProducerTriplet {
                id: id.to_string(),
                epoch,
                seq,
            }))
        }
        _ => Err("Producer-Id, Producer-Epoch and Producer-Seq must be sent together"),
    }
}

fn parse_u64_strict(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Parse and validate the Stream-TTL header: digits only, no sign, no
/// leading zeros (except the literal "0").
fn parse_ttl_header(headers: &HeaderMap) -> Result<Option<u64>, &'static str> {
    let value = match headers.get("Stream-TTL") {
        None => return Ok(None),
        Some(v) => v.to_str().map_err(|_| "Invalid Stream-TTL value")?,
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err("Invalid Stream-TTL value");
    }
    if value != "0" && value.starts_with('0') {
        return Err("Invalid Stream-TTL value");
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| "Invalid Stream-TTL value")
}

/// Parse the Stream-Expires-At header. A malformed timestamp fails closed:
/// the stream is treated as already expired.
fn parse_expires_at_header(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get("Stream-Expires-At")?;
    match value
        .to_str()
        .ok()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
    {
        Some(dt) => Some(dt.with_timezone(&Utc)),
        None => Some(DateTime::<Utc>::UNIX_EPOCH),
    }
}

/// Start the server.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let store = StreamStore::new();
    let state = AppState {
        store,
        fault: Arc::new(FaultInjector::default()),
        options: options.clone(),
    };

    let router = create_router(state);
    let router = if options.compression {
        router.layer(CompressionLayer::new())
    } else {
        router
    };

    let addr = format!("{}:{}", options.host, options.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting durable streams server on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
