//! HTTP handlers for the durable streams protocol.
//!
//! All five methods are served on `/v1/stream/{*path}`:
//!
//! | Method | Operation |
//! |---|---|
//! | PUT    | create (idempotent; 409 on config mismatch) |
//! | HEAD   | metadata probe |
//! | POST   | append (honors `Stream-Seq`) |
//! | GET    | catch-up read, `live=long-poll`, `live=sse`, or `live=auto` |
//! | DELETE | delete |
//!
//! Catch-up responses are CDN-cacheable (`public` caching headers plus a
//! range ETag); live responses never are. Store errors map onto the
//! protocol's status codes in [`store_error_response`].

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use chrono::{DateTime, Utc};
use durastream_core::Offset;
use durastream_metadata::StreamDescriptor;
use durastream_storage::{json, CreateOptions, ReadResult, StoreError};
use futures::stream::Stream;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::AppState;

pub const HEADER_NEXT_OFFSET: &str = "Stream-Next-Offset";
pub const HEADER_UP_TO_DATE: &str = "Stream-Up-To-Date";
pub const HEADER_CURSOR: &str = "Stream-Cursor";
pub const HEADER_TTL: &str = "Stream-TTL";
pub const HEADER_EXPIRES_AT: &str = "Stream-Expires-At";
pub const HEADER_SEQ: &str = "Stream-Seq";

const CACHE_PUBLIC: &str = "public, max-age=60, stale-while-revalidate=300";
const CACHE_NO_STORE: &str = "no-store";
const CACHE_NO_CACHE: &str = "no-cache";

/// Query parameters accepted by GET. Unknown parameters are ignored.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
    pub cursor: Option<String>,
}

enum LiveMode {
    CatchUp,
    LongPoll,
    Sse,
}

/// PUT: create a stream.
pub async fn create_stream(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{path}");
    debug!(path = %path, "create stream");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let ttl_seconds = match parse_ttl_header(&headers) {
        Ok(ttl) => ttl,
        Err(response) => return response,
    };
    let expires_at = match parse_expires_at_header(&headers) {
        Ok(at) => at,
        Err(response) => return response,
    };
    if ttl_seconds.is_some() && expires_at.is_some() {
        return bad_request("Stream-TTL and Stream-Expires-At are mutually exclusive");
    }

    let options = CreateOptions {
        content_type: content_type.clone(),
        ttl_seconds,
        expires_at,
        initial_data: (!body.is_empty()).then(|| body.clone()),
    };

    match state.store.create(&path, options).await {
        Ok(created) => {
            let offset = created.descriptor.offset;
            let mut builder = Response::builder().header(HEADER_NEXT_OFFSET, offset.to_string());

            if created.newly_created {
                builder = builder
                    .status(StatusCode::CREATED)
                    .header(header::LOCATION, format!("/v1/stream{path}"));
            } else {
                builder = builder.status(StatusCode::OK);
            }
            if let Some(ct) = &created.descriptor.content_type {
                builder = builder.header(header::CONTENT_TYPE, ct.as_str());
            }

            builder.body(Body::empty()).unwrap()
        }
        Err(e) => store_error_response(e),
    }
}

/// HEAD: stream metadata. Never cacheable; never a body.
pub async fn head_stream(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{path}");

    let descriptor = match state.store.get(&path).await {
        Ok(descriptor) => descriptor,
        Err(e) => return store_error_response(e),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_NEXT_OFFSET, descriptor.offset.to_string())
        .header(header::CACHE_CONTROL, CACHE_NO_STORE);

    if let Some(ct) = &descriptor.content_type {
        builder = builder.header(header::CONTENT_TYPE, ct.as_str());
    }
    if let Some(ttl) = descriptor.ttl_seconds {
        builder = builder.header(HEADER_TTL, ttl.to_string());
    }
    if let Some(at) = descriptor.expires_at {
        builder = builder.header(HEADER_EXPIRES_AT, at.to_rfc3339());
    }

    builder.body(Body::empty()).unwrap()
}

/// POST: append to a stream.
pub async fn append_stream(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{path}");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let seq = headers.get(HEADER_SEQ).and_then(|v| v.to_str().ok());

    match state.store.append(&path, body, content_type, seq).await {
        Ok(offset) => Response::builder()
            .status(StatusCode::OK)
            .header(HEADER_NEXT_OFFSET, offset.to_string())
            .body(Body::empty())
            .unwrap(),
        Err(e) => store_error_response(e),
    }
}

/// DELETE: remove a stream.
pub async fn delete_stream(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{path}");

    match state.store.delete(&path).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(e) => store_error_response(e),
    }
}

/// GET: read via catch-up, long-poll, or SSE.
pub async fn read_stream(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/{path}");

    let descriptor = match state.store.get(&path).await {
        Ok(descriptor) => descriptor,
        Err(e) => return store_error_response(e),
    };

    let live = match query.live.as_deref() {
        None => LiveMode::CatchUp,
        Some("long-poll") => LiveMode::LongPoll,
        Some("sse") => LiveMode::Sse,
        Some("auto") => {
            if descriptor.is_textual() {
                LiveMode::Sse
            } else {
                LiveMode::LongPoll
            }
        }
        Some(other) => return bad_request(&format!("unsupported live mode {other:?}")),
    };

    let from = match &query.offset {
        Some(raw) => match raw.parse::<Offset>() {
            Ok(offset) => offset,
            Err(_) => return bad_request("malformed offset"),
        },
        None => match live {
            LiveMode::CatchUp => Offset::ZERO,
            _ => return bad_request("live reads require an offset"),
        },
    };

    let previous_cursor = query.cursor.as_deref().and_then(|c| c.parse::<u64>().ok());
    let cursor = state.cursor.response_cursor(previous_cursor);

    match live {
        LiveMode::CatchUp => catch_up(&state, &descriptor, from, cursor, &headers).await,
        LiveMode::LongPoll => long_poll(&state, &descriptor, from, cursor).await,
        LiveMode::Sse => sse_read(&state, descriptor, from, cursor),
    }
}

/// Catch-up read: cacheable, conditional, bounded by the committed tail.
async fn catch_up(
    state: &AppState,
    descriptor: &StreamDescriptor,
    from: Offset,
    cursor: u64,
    headers: &HeaderMap,
) -> Response {
    let result = match state.store.read(&descriptor.path, from).await {
        Ok(result) => result,
        Err(e) => return store_error_response(e),
    };

    // The directory name is unique per creation, so a delete-and-recreate
    // invalidates every previously issued tag for this path.
    let etag = format!(
        "\"{}:{}:{}\"",
        descriptor.dir_name, from, result.next_offset
    );

    if if_none_match(headers, &etag) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, etag.as_str())
            .header(header::CACHE_CONTROL, CACHE_PUBLIC)
            .body(Body::empty())
            .unwrap();
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_NEXT_OFFSET, result.next_offset.to_string())
        .header(HEADER_CURSOR, cursor.to_string())
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, CACHE_PUBLIC);

    if result.up_to_date {
        builder = builder.header(HEADER_UP_TO_DATE, "true");
    }
    if let Some(ct) = &descriptor.content_type {
        builder = builder.header(header::CONTENT_TYPE, ct.as_str());
    }

    builder
        .body(Body::from(response_body(descriptor, &result)))
        .unwrap()
}

/// Long-poll read: block until data or timeout. Never cacheable.
async fn long_poll(
    state: &AppState,
    descriptor: &StreamDescriptor,
    from: Offset,
    cursor: u64,
) -> Response {
    let result = match state
        .store
        .wait_for_messages(&descriptor.path, from, state.config.long_poll_timeout)
        .await
    {
        Ok(result) => result,
        Err(e) => return store_error_response(e),
    };

    if result.messages.is_empty() {
        // Timeout: the client's own offset comes back unchanged.
        return Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(HEADER_NEXT_OFFSET, from.to_string())
            .header(HEADER_CURSOR, cursor.to_string())
            .header(HEADER_UP_TO_DATE, "true")
            .header(header::CACHE_CONTROL, CACHE_NO_STORE)
            .body(Body::empty())
            .unwrap();
    }

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(HEADER_NEXT_OFFSET, result.next_offset.to_string())
        .header(HEADER_CURSOR, cursor.to_string())
        .header(header::CACHE_CONTROL, CACHE_NO_STORE);

    if result.up_to_date {
        builder = builder.header(HEADER_UP_TO_DATE, "true");
    }
    if let Some(ct) = &descriptor.content_type {
        builder = builder.header(header::CONTENT_TYPE, ct.as_str());
    }

    builder
        .body(Body::from(response_body(descriptor, &result)))
        .unwrap()
}

/// SSE read: catch-up burst, then live events until the reconnect deadline.
fn sse_read(
    state: &AppState,
    descriptor: StreamDescriptor,
    from: Offset,
    cursor: u64,
) -> Response {
    if !descriptor.is_textual() {
        return bad_request("SSE requires a textual or JSON stream");
    }

    let stream = sse_event_stream(state.clone(), descriptor, from, cursor);
    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_NO_CACHE));
    response
}

fn sse_event_stream(
    state: AppState,
    descriptor: StreamDescriptor,
    mut offset: Offset,
    mut cursor: u64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let deadline = tokio::time::Instant::now() + state.config.sse_reconnect_interval;
        let path = descriptor.path.clone();

        // Catch-up burst before going live.
        match state.store.read(&path, offset).await {
            Ok(result) => {
                for message in &result.messages {
                    yield Ok(data_event(&message.data));
                }
                offset = result.next_offset;
                yield Ok(control_event(offset, cursor));
            }
            Err(_) => return,
        }

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let wait = state.config.long_poll_timeout.min(deadline - now);

            match state.store.wait_for_messages(&path, offset, wait).await {
                Ok(result) => {
                    cursor = state.cursor.response_cursor(Some(cursor));
                    for message in &result.messages {
                        yield Ok(data_event(&message.data));
                    }
                    if !result.messages.is_empty() {
                        offset = result.next_offset;
                    }
                    // Empty result doubles as the periodic heartbeat.
                    yield Ok(control_event(offset, cursor));
                }
                // Stream deleted (or expired) under us; the client will
                // reconnect and receive 404.
                Err(_) => return,
            }
        }

        // Final control event so the client reconnects at the right offset.
        cursor = state.cursor.response_cursor(Some(cursor));
        yield Ok(control_event(offset, cursor));
    }
}

fn data_event(data: &[u8]) -> Event {
    Event::default()
        .event("data")
        .data(String::from_utf8_lossy(data))
}

fn control_event(offset: Offset, cursor: u64) -> Event {
    let payload = serde_json::json!({
        "streamNextOffset": offset.to_string(),
        "streamCursor": cursor.to_string(),
    });
    Event::default().event("control").data(payload.to_string())
}

/// Assemble a read body: a JSON array for JSON streams, concatenated raw
/// payload bytes otherwise.
fn response_body(descriptor: &StreamDescriptor, result: &ReadResult) -> Vec<u8> {
    if descriptor.is_json() {
        json::join_json_array(&result.messages)
    } else {
        let total: usize = result.messages.iter().map(|m| m.data.len()).sum();
        let mut body = Vec::with_capacity(total);
        for message in &result.messages {
            body.extend_from_slice(&message.data);
        }
        body
    }
}

fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|value| value.split(',').any(|candidate| candidate.trim() == etag))
        .unwrap_or(false)
}

/// Strict `Stream-TTL` grammar: decimal digits only, no sign, no leading
/// zero, no fraction, value > 0.
fn parse_ttl_header(headers: &HeaderMap) -> Result<Option<u64>, Response> {
    let Some(value) = headers.get(HEADER_TTL) else {
        return Ok(None);
    };
    let malformed = || bad_request("malformed Stream-TTL");

    let raw = value.to_str().map_err(|_| malformed())?;
    if raw.is_empty()
        || !raw.bytes().all(|b| b.is_ascii_digit())
        || (raw.len() > 1 && raw.starts_with('0'))
    {
        return Err(malformed());
    }
    match raw.parse::<u64>() {
        Ok(ttl) if ttl > 0 => Ok(Some(ttl)),
        _ => Err(malformed()),
    }
}

fn parse_expires_at_header(headers: &HeaderMap) -> Result<Option<DateTime<Utc>>, Response> {
    let Some(value) = headers.get(HEADER_EXPIRES_AT) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| Some(at.with_timezone(&Utc)))
        .ok_or_else(|| bad_request("malformed Stream-Expires-At"))
}

/// Map a store error to the protocol's status code and a short plain-text
/// body. Internal detail stays in the log.
fn store_error_response(err: StoreError) -> Response {
    match &err {
        StoreError::InvalidArgument(message) => {
            (StatusCode::BAD_REQUEST, message.clone()).into_response()
        }
        StoreError::NotFound(_) => not_found(),
        StoreError::ConfigMismatch(message) => {
            (StatusCode::CONFLICT, message.clone()).into_response()
        }
        StoreError::SeqConflict { .. } => (StatusCode::CONFLICT, err.to_string()).into_response(),
        StoreError::FrameTooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).into_response()
        }
        StoreError::Metadata(_) | StoreError::Io(_) => {
            warn!(error = %err, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()).into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "stream not found".to_string()).into_response()
}
