//! Docker runtime using bollard.
//!
//! bollard hands log output back already split per stream. The pipeline
//! expects Docker's wire format, so each chunk is framed again before it
//! leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::query_parameters::{InspectContainerOptionsBuilder, LogsOptions, LogsOptionsBuilder};
use bollard::Docker;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::debug;

use super::{
    empty_feed, prime_feed, ContainerInfo, ContainerRuntime, LiveStart, RawFeed, RuntimeError,
    StreamMask,
};
use crate::logs::{demux::encode_frame, Origin};

/// Seconds to wait on the Docker API when connecting over HTTP.
const HTTP_TIMEOUT_SECS: u64 = 120;
/// How long a followed feed may stay silent before it counts as opened.
const LIVE_OPEN_GRACE: Duration = Duration::from_millis(500);

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `host` over HTTP, or to the local daemon using the default
    /// connection method (Unix socket on Linux/macOS, named pipe on Windows).
    pub fn connect(host: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match host {
            Some(host) => {
                Docker::connect_with_http(host, HTTP_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker })
    }

    /// bollard sends the request on the first poll, so the feed is primed
    /// here to catch a refused connection or an unreadable logging driver.
    async fn logs_feed(
        &self,
        id: &str,
        options: LogsOptions,
        grace: Option<Duration>,
    ) -> Result<Option<RawFeed>, RuntimeError> {
        let feed = self
            .docker
            .logs(id, Some(options))
            .map(|output| output.map(reframe).map_err(RuntimeError::from))
            .boxed();
        prime_feed(id, feed, grace).await
    }
}

/// Encode a chunk back into the multiplexed wire format. Console output from
/// TTY containers has no framing and is passed through untouched.
fn reframe(output: LogOutput) -> Bytes {
    match output {
        LogOutput::StdIn { message } | LogOutput::StdOut { message } => {
            encode_frame(Origin::Stdout, &message)
        }
        LogOutput::StdErr { message } => encode_frame(Origin::Stderr, &message),
        LogOutput::Console { message } => message,
    }
}

/// Docker filters logs by whole seconds.
fn to_unix_seconds(nanos: i64) -> i32 {
    nanos
        .div_euclid(1_000_000_000)
        .clamp(0, i64::from(i32::MAX)) as i32
}

/// Like [`to_unix_seconds`], rounding up so an exclusive upper bound keeps the
/// lines of its last partial second.
fn to_unix_seconds_ceil(nanos: i64) -> i32 {
    to_unix_seconds(nanos.saturating_add(999_999_999))
}

fn logs_options(mask: StreamMask, follow: bool, since: i32, until: i32) -> LogsOptions {
    LogsOptionsBuilder::new()
        .follow(follow)
        .stdout(mask.stdout())
        .stderr(mask.stderr())
        .since(since)
        .until(until)
        .timestamps(true)
        .build()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn find_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        let options = InspectContainerOptionsBuilder::new().build();
        let info = match self.docker.inspect_container(id, Some(options)).await {
            Ok(info) => info,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(RuntimeError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };

        let name = info
            .name
            .as_deref()
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_else(|| id.to_string());

        Ok(ContainerInfo {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name,
            tty: info.config.and_then(|c| c.tty).unwrap_or(false),
            running: info.state.and_then(|s| s.running).unwrap_or(false),
        })
    }

    async fn open_live_feed(
        &self,
        id: &str,
        start: LiveStart,
        mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError> {
        let since = match start {
            LiveStart::Now => to_unix_seconds(Utc::now().timestamp_nanos_opt().unwrap_or(0)),
            LiveStart::After(position) => to_unix_seconds(position),
        };

        debug!("Following logs of {} since {}", id, since);
        // Following a stopped container ends right away once its history is
        // replayed; nothing at all means there is nothing left to follow.
        self.logs_feed(id, logs_options(mask, true, since, 0), Some(LIVE_OPEN_GRACE))
            .await?
            .ok_or(RuntimeError::EndOfStream)
    }

    async fn open_range_feed(
        &self,
        id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError> {
        let since = from
            .and_then(|t| t.timestamp_nanos_opt())
            .map(to_unix_seconds)
            .unwrap_or(0);
        let until = to
            .and_then(|t| t.timestamp_nanos_opt())
            .map(to_unix_seconds_ceil)
            .unwrap_or(0);

        debug!("Reading logs of {} between {} and {}", id, since, until);
        let feed = self
            .logs_feed(id, logs_options(mask, false, since, until), None)
            .await?;
        Ok(feed.unwrap_or_else(empty_feed))
    }
}
