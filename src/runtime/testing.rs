//! In-memory runtime serving canned feeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use super::{
    empty_feed, prime_feed, ContainerInfo, ContainerRuntime, LiveStart, RawFeed, RuntimeError,
    StreamMask,
};

const LIVE_OPEN_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    NotFound,
    EndOfStream,
    Transport,
}

impl OpenFailure {
    fn into_error(self, id: &str) -> RuntimeError {
        match self {
            Self::NotFound => RuntimeError::NotFound(id.to_string()),
            Self::EndOfStream => RuntimeError::EndOfStream,
            Self::Transport => RuntimeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "daemon went away",
            )),
        }
    }
}

struct FakeContainer {
    info: ContainerInfo,
    chunks: Vec<Bytes>,
    /// Keep the feed open after the last chunk, like a running container.
    follow: bool,
    open_failure: Option<OpenFailure>,
    /// Fail on the feed's first poll rather than when it is opened.
    lazy_failure: Option<OpenFailure>,
}

#[derive(Default)]
pub struct FakeRuntime {
    containers: HashMap<String, FakeContainer>,
    open_calls: AtomicUsize,
    last_live_start: Mutex<Option<LiveStart>>,
}

pub fn container(id: &str, name: &str, tty: bool) -> ContainerInfo {
    ContainerInfo {
        id: id.to_string(),
        name: name.to_string(),
        tty,
        running: true,
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A container whose feed yields `chunks` and then ends.
    pub fn with_container(mut self, info: ContainerInfo, chunks: Vec<Bytes>) -> Self {
        self.containers.insert(
            info.id.clone(),
            FakeContainer {
                info,
                chunks,
                follow: false,
                open_failure: None,
                lazy_failure: None,
            },
        );
        self
    }

    /// A container whose feed yields `chunks` and then stays open.
    pub fn with_running_container(mut self, info: ContainerInfo, chunks: Vec<Bytes>) -> Self {
        self.containers.insert(
            info.id.clone(),
            FakeContainer {
                info,
                chunks,
                follow: true,
                open_failure: None,
                lazy_failure: None,
            },
        );
        self
    }

    pub fn failing_open(mut self, info: ContainerInfo, failure: OpenFailure) -> Self {
        self.containers.insert(
            info.id.clone(),
            FakeContainer {
                info,
                chunks: Vec::new(),
                follow: false,
                open_failure: Some(failure),
                lazy_failure: None,
            },
        );
        self
    }

    /// A container whose feed opens fine but fails as soon as it is read,
    /// the way an HTTP-backed runtime reports errors.
    pub fn failing_feed(mut self, info: ContainerInfo, failure: OpenFailure) -> Self {
        self.containers.insert(
            info.id.clone(),
            FakeContainer {
                info,
                chunks: Vec::new(),
                follow: false,
                open_failure: None,
                lazy_failure: Some(failure),
            },
        );
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn last_live_start(&self) -> Option<LiveStart> {
        *self.last_live_start.lock().expect("poisoned")
    }

    async fn open(&self, id: &str, live: bool) -> Result<RawFeed, RuntimeError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let container = self
            .containers
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        if let Some(failure) = container.open_failure {
            return Err(failure.into_error(id));
        }

        let feed: RawFeed = if let Some(failure) = container.lazy_failure {
            let id = id.to_string();
            stream::once(async move { Err(failure.into_error(&id)) }).boxed()
        } else {
            let chunks = stream::iter(container.chunks.clone().into_iter().map(Ok));
            if container.follow {
                chunks.chain(stream::pending()).boxed()
            } else {
                chunks.boxed()
            }
        };

        match prime_feed(id, feed, live.then_some(LIVE_OPEN_GRACE)).await? {
            Some(feed) => Ok(feed),
            None if live => Err(RuntimeError::EndOfStream),
            None => Ok(empty_feed()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn find_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        self.containers
            .get(id)
            .map(|c| c.info.clone())
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn open_live_feed(
        &self,
        id: &str,
        start: LiveStart,
        _mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError> {
        *self.last_live_start.lock().expect("poisoned") = Some(start);
        self.open(id, true).await
    }

    async fn open_range_feed(
        &self,
        id: &str,
        _from: Option<DateTime<Utc>>,
        _to: Option<DateTime<Utc>>,
        _mask: StreamMask,
    ) -> Result<RawFeed, RuntimeError> {
        self.open(id, false).await
    }
}
