use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use log::{debug, error};

use super::error::ApiError;
use super::query::LogsQuery;
use super::AppState;
use crate::logs::{EventGenerator, FeedMode, GeneratorOptions};

/// Logs between `from` and `to` as one JSON object per line.
pub async fn fetch_logs_between_dates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let mask = query.mask()?;

    let container = state
        .runtime
        .find_container(&id)
        .await
        .map_err(ApiError::lookup)?;

    let (since, until) = (query.since(), query.until());
    let feed = state
        .runtime
        .open_range_feed(&container.id, since, until, mask)
        .await?;

    let options = GeneratorOptions::new(FeedMode::for_tty(container.tty))
        .capacity(state.settings.event_buffer)
        .window(
            since.and_then(|t| t.timestamp_nanos_opt()),
            until.and_then(|t| t.timestamp_nanos_opt()),
        );
    let generator = EventGenerator::start(feed, options);

    Ok((
        [(header::CONTENT_TYPE, "application/ld+json; charset=UTF-8")],
        Body::from_stream(json_lines(generator, container.id)),
    )
        .into_response())
}

fn json_lines(
    mut generator: EventGenerator,
    id: String,
) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> {
    async_stream::stream! {
        while let Some(event) = generator.events.recv().await {
            match serde_json::to_vec(&event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    yield Ok(Bytes::from(line));
                }
                Err(e) => error!("JSON encoding error while reading {}: {}", id, e),
            }
        }

        // A bounded range always ends; only other failures are worth noting.
        match generator.errors.try_recv() {
            Ok(reason) if reason.is_end_of_stream() || reason.is_cancelled() => {}
            Ok(reason) => error!("Error while reading logs of {}: {}", id, reason),
            Err(_) => {}
        }
        debug!("Range read finished for {}", id);
    }
}
