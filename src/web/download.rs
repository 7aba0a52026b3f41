use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use futures::Stream;
use log::{debug, error};

use super::error::ApiError;
use super::AppState;
use crate::logs::{Demultiplexer, FeedMode};
use crate::runtime::StreamMask;

const GZIP_COMMENT: &str = "Logs generated by logcast";
/// Compressed bytes are handed to the body once this many have accumulated.
const CHUNK_SIZE: usize = 32 * 1024;

/// The container's whole retained log as a gzip attachment. Lines are written
/// exactly as the runtime produced them, timestamps included.
pub async fn download_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let container = state
        .runtime
        .find_container(&id)
        .await
        .map_err(ApiError::lookup_as_bad_request)?;

    let now = Utc::now();
    let feed = state
        .runtime
        .open_range_feed(&container.id, None, Some(now), StreamMask::ALL)
        .await
        .map_err(ApiError::lookup_as_bad_request)?;

    let entry_name = format!("{}-{}.log", container.name, now.format("%Y-%m-%dT%H-%M-%S"));
    let disposition = format!("attachment; filename=\"{entry_name}.gz\"");
    let encoder = GzBuilder::new()
        .filename(entry_name.as_bytes())
        .comment(GZIP_COMMENT)
        .mtime(u32::try_from(now.timestamp()).unwrap_or(0))
        .write(Vec::new(), Compression::default());

    debug!("Downloading logs of {} as {}", container.id, entry_name);
    let demux = Demultiplexer::new(feed, FeedMode::for_tty(container.tty));

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(gzip_chunks(demux, encoder, container.id)),
    )
        .into_response())
}

/// A failure halfway aborts the body, so the client sees a broken transfer
/// instead of a truncated archive that looks complete.
fn gzip_chunks(
    mut demux: Demultiplexer,
    mut encoder: GzEncoder<Vec<u8>>,
    id: String,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    async_stream::stream! {
        loop {
            match demux.next_line().await {
                Ok(Some((_, line))) => {
                    if let Err(e) = encoder.write_all(&line) {
                        yield Err(e);
                        return;
                    }
                    if encoder.get_ref().len() >= CHUNK_SIZE {
                        yield Ok(Bytes::from(std::mem::take(encoder.get_mut())));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error while downloading logs of {}: {}", id, e);
                    yield Err(std::io::Error::other(e));
                    return;
                }
            }
        }

        match encoder.finish() {
            Ok(rest) if rest.is_empty() => {}
            Ok(rest) => yield Ok(Bytes::from(rest)),
            Err(e) => yield Err(e),
        }
        debug!("Download finished for {}", id);
    }
}
