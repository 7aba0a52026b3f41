use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Demultiplexer, EventParser, FeedMode, LogEvent, StreamError};
use crate::runtime::RawFeed;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct GeneratorOptions {
    pub mode: FeedMode,
    pub capacity: usize,
    /// Drop timestamped events at or before this position. Events without a
    /// timestamp are always kept, so a feed without timestamps replays in
    /// full; Docker feeds are always read with timestamps.
    pub resume_after: Option<i64>,
    /// Keep timestamped events in `[start, end)` only, in nanoseconds. The
    /// runtime filters by whole seconds, this trims the edges.
    pub window: (Option<i64>, Option<i64>),
}

impl GeneratorOptions {
    pub fn new(mode: FeedMode) -> Self {
        Self {
            mode,
            capacity: DEFAULT_CAPACITY,
            resume_after: None,
            window: (None, None),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn resume_after(mut self, position: i64) -> Self {
        self.resume_after = Some(position);
        self
    }

    pub fn window(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.window = (start, end);
        self
    }

    fn keeps(&self, event: &LogEvent) -> bool {
        let ts = event.timestamp;
        if ts == 0 {
            return true;
        }
        let (start, end) = self.window;
        !self.resume_after.is_some_and(|marker| ts <= marker)
            && !start.is_some_and(|start| ts < start)
            && !end.is_some_and(|end| ts >= end)
    }
}

/// Background task turning a raw feed into [`LogEvent`]s.
///
/// Events arrive on `events` in feed order. When the task stops on its own,
/// the reason is placed on `errors` *before* `events` closes, so once `recv`
/// returns `None` a `try_recv` on `errors` sees it. Dropping the generator
/// cancels the task and releases the feed.
pub struct EventGenerator {
    pub events: mpsc::Receiver<LogEvent>,
    pub errors: oneshot::Receiver<StreamError>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventGenerator {
    pub fn start(feed: RawFeed, options: GeneratorOptions) -> Self {
        let (events_tx, events) = mpsc::channel(options.capacity.max(1));
        let (errors_tx, errors) = oneshot::channel();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            Demultiplexer::new(feed, options.mode),
            options,
            events_tx,
            errors_tx,
            cancel.clone(),
        ));

        Self {
            events,
            errors,
            cancel,
            task,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for EventGenerator {
    fn drop(&mut self) {
        self.cancel();
        self.task.abort();
    }
}

async fn run(
    mut demux: Demultiplexer,
    options: GeneratorOptions,
    events_tx: mpsc::Sender<LogEvent>,
    errors_tx: oneshot::Sender<StreamError>,
    cancel: CancellationToken,
) {
    let mut parser = EventParser::new();

    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamError::Cancelled,
            next = demux.next_line() => next,
        };
        let (origin, line) = match next {
            Ok(Some(pair)) => pair,
            Ok(None) => break StreamError::EndOfStream,
            Err(e) => break e,
        };

        let event = parser.parse(origin, &line);
        if !options.keeps(&event) {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamError::Cancelled,
            sent = events_tx.send(event) => {
                if sent.is_err() {
                    break StreamError::Cancelled;
                }
            }
        }
    };

    debug!("Event generator stopped: {}", reason);
    // The receiver may be gone already.
    let _ = errors_tx.send(reason);
    drop(events_tx);
}
