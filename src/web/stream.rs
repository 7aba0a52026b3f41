//! Live log streaming over Server-Sent Events.
//!
//! A stream moves through three phases. While opening, the request is
//! validated and a feed is opened from the resume point. While streaming,
//! events and keep-alive pings are written as they come. When the feed ends,
//! the client is told the container stopped; any other failure is only
//! logged, as the client has usually gone by then.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use log::{debug, error};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::error::ApiError;
use super::query::LogsQuery;
use super::AppState;
use crate::logs::{EventGenerator, FeedMode, GeneratorOptions, LogEvent};
use crate::memstats;
use crate::runtime::{LiveStart, RuntimeError};

pub const PING_FRAME: &str = ": ping \n\n";
pub const CONTAINER_STOPPED_FRAME: &str = "event: container-stopped\ndata: end of stream\n\n";

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mask = query.mask()?;
    let start = query.resume_point(&headers)?;

    let container = state
        .runtime
        .find_container(&id)
        .await
        .map_err(ApiError::lookup)?;

    let feed = match state.runtime.open_live_feed(&container.id, start, mask).await {
        Ok(feed) => feed,
        Err(e) if matches!(e, RuntimeError::EndOfStream) || e.is_not_found() => {
            debug!("Container {} already stopped", container.id);
            return Ok(event_stream(Body::from(CONTAINER_STOPPED_FRAME)));
        }
        Err(e) => return Err(e.into()),
    };

    let mut options =
        GeneratorOptions::new(FeedMode::for_tty(container.tty)).capacity(state.settings.event_buffer);
    if let LiveStart::After(position) = start {
        options = options.resume_after(position);
    }

    debug!("Streaming logs of {} from {:?}", container.id, start);
    let generator = EventGenerator::start(feed, options);
    let frames = live_frames(generator, container.id, state.settings.ping_interval);
    Ok(event_stream(Body::from_stream(frames)))
}

fn event_stream(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        body,
    )
        .into_response()
}

/// SSE frames for one live stream. Every frame is its own body chunk, so it
/// is written to the socket as soon as it is produced. The stream owns the
/// generator: when the client goes away the body is dropped and the
/// generator's feed with it.
fn live_frames(
    mut generator: EventGenerator,
    id: String,
    ping_interval: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Events take priority so a ping never overtakes one.
            let frame = tokio::select! {
                biased;
                event = generator.events.recv() => match event {
                    Some(event) => event_frame(&event, &id),
                    None => break,
                },
                _ = ping.tick() => Some(Bytes::from_static(PING_FRAME.as_bytes())),
            };
            if let Some(frame) = frame {
                yield Ok(frame);
            }
        }

        match generator.errors.try_recv() {
            Ok(reason) if reason.is_end_of_stream() => {
                debug!("Container stopped: {}", id);
                yield Ok(Bytes::from_static(CONTAINER_STOPPED_FRAME.as_bytes()));
            }
            Ok(reason) if reason.is_cancelled() => {}
            Ok(reason) => error!("Unknown error while streaming {}: {}", id, reason),
            Err(_) => {}
        }
        debug!("Stream closed for {}", id);
        memstats::log_allocator_stats();
    }
}

/// `id:` precedes `data:` so the browser records the position together with
/// the event. Events that fail to encode are logged and skipped.
fn event_frame(event: &LogEvent, id: &str) -> Option<Bytes> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!("JSON encoding error while streaming {}: {}", id, e);
            return None;
        }
    };
    let frame = match event.position {
        0 => format!("data: {json}\n\n"),
        position => format!("id: {position}\ndata: {json}\n\n"),
    };
    Some(Bytes::from(frame))
}
