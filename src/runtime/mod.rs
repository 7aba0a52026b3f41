//! Access to the container runtime.
//!
//! The log pipeline needs three things from the runtime: metadata about a
//! container, a feed that follows new output, and a feed bounded by a time
//! window. Feeds carry the runtime's raw multiplexed bytes; splitting them
//! into lines is the job of [`crate::logs::Demultiplexer`].

pub mod docker;
#[cfg(test)]
pub mod testing;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

pub use docker::DockerRuntime;

/// Ordered byte chunks of one container's output. Chunk boundaries carry no
/// meaning. Dropping the feed closes the underlying connection.
pub type RawFeed = BoxStream<'static, Result<Bytes, RuntimeError>>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No such container: {0}")]
    NotFound(String),
    /// The container stopped and there is nothing left to follow.
    #[error("End of stream")]
    EndOfStream,
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::DockerApi(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    ..
                })
        )
    }
}

/// Wait for the first item of a freshly opened feed, so that a failed open
/// is reported to the caller instead of surfacing once the feed is read.
///
/// Returns `Ok(None)` when the feed ends without yielding anything. With a
/// `grace` period, a feed that stays silent that long is taken as open; a
/// followed container may not write anything for a while.
pub async fn prime_feed(
    id: &str,
    feed: RawFeed,
    grace: Option<Duration>,
) -> Result<Option<RawFeed>, RuntimeError> {
    let mut feed = feed.peekable();
    let exhausted = async { Pin::new(&mut feed).peek().await.is_none() };
    let exhausted = match grace {
        Some(grace) => match tokio::time::timeout(grace, exhausted).await {
            Ok(exhausted) => exhausted,
            Err(_) => return Ok(Some(feed.boxed())),
        },
        None => exhausted.await,
    };
    if exhausted {
        return Ok(None);
    }

    if let Some(Err(_)) = Pin::new(&mut feed).peek().await {
        if let Some(Err(e)) = feed.next().await {
            return Err(if e.is_not_found() {
                RuntimeError::NotFound(id.to_string())
            } else {
                e
            });
        }
    }
    Ok(Some(feed.boxed()))
}

/// A feed with nothing in it.
pub fn empty_feed() -> RawFeed {
    stream::empty().boxed()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Containers started with a TTY produce a single unframed stream.
    pub tty: bool,
    pub running: bool,
}

/// Which of the container's output streams to read. Never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMask {
    stdout: bool,
    stderr: bool,
}

impl StreamMask {
    pub const ALL: StreamMask = StreamMask {
        stdout: true,
        stderr: true,
    };

    /// Returns `None` when neither stream is selected.
    pub fn new(stdout: bool, stderr: bool) -> Option<Self> {
        (stdout || stderr).then_some(Self { stdout, stderr })
    }

    pub fn stdout(&self) -> bool {
        self.stdout
    }

    pub fn stderr(&self) -> bool {
        self.stderr
    }
}

/// Where a live feed begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStart {
    Now,
    /// Resume after the given position (nanoseconds since the epoch).
    After(i64),
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn find_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError>;

    /// Follow the container's output from `start` on. Fails with
    /// [`RuntimeError::EndOfStream`] when the container is no longer running
    /// and there is nothing to replay. Failures to open the feed are returned
    /// here, never as the feed's first item.
    async fn open_live_feed(
        &self,
        id: &str,
        start: LiveStart,
        mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError>;

    /// Read the output between `from` and `to`. `None` leaves that end open.
    /// Open failures are returned here, as for [`Self::open_live_feed`].
    async fn open_range_feed(
        &self,
        id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mask_is_rejected() {
        assert_eq!(StreamMask::new(false, false), None);
    }

    #[test]
    fn test_mask_keeps_selection() {
        let mask = StreamMask::new(true, false).expect("stdout only is valid");
        assert!(mask.stdout());
        assert!(!mask.stderr());
        assert_eq!(StreamMask::new(true, true), Some(StreamMask::ALL));
    }

    fn lazy_failure(status_code: u16) -> RawFeed {
        stream::once(async move {
            Err(RuntimeError::DockerApi(
                bollard::errors::Error::DockerResponseServerError {
                    status_code,
                    message: "configured logging driver does not support reading".to_string(),
                },
            ))
        })
        .boxed()
    }

    async fn collect(feed: RawFeed) -> Vec<Bytes> {
        feed.map(|chunk| chunk.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_prime_surfaces_first_poll_failure() {
        let err = prime_feed("abc", lazy_failure(501), None).await.err().unwrap();
        assert!(matches!(err, RuntimeError::DockerApi(_)), "{err:?}");
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_prime_maps_docker_404() {
        let err = prime_feed("abc", lazy_failure(404), None).await.err().unwrap();
        assert!(matches!(err, RuntimeError::NotFound(ref id) if id == "abc"), "{err:?}");
    }

    #[tokio::test]
    async fn test_prime_keeps_first_chunk() {
        let chunks = vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")];
        let feed = stream::iter(chunks.clone().into_iter().map(Ok)).boxed();

        let feed = prime_feed("abc", feed, None).await.unwrap().expect("not exhausted");
        assert_eq!(collect(feed).await, chunks);
    }

    #[tokio::test]
    async fn test_prime_reports_exhausted_feed() {
        assert!(prime_feed("abc", empty_feed(), None).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prime_gives_up_waiting_on_silent_feed() {
        let feed = stream::pending().boxed();
        let primed = prime_feed("abc", feed, Some(Duration::from_millis(250)))
            .await
            .unwrap();
        assert!(primed.is_some());
    }

    #[test]
    fn test_docker_404_is_not_found() {
        let err = RuntimeError::DockerApi(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        });
        assert!(err.is_not_found());

        let err = RuntimeError::DockerApi(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        });
        assert!(!err.is_not_found());
        assert!(RuntimeError::NotFound("abc".to_string()).is_not_found());
        assert!(!RuntimeError::EndOfStream.is_not_found());
    }
}
