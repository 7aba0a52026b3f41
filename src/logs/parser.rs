use chrono::DateTime;
use serde_json::{Map, Value};

use super::{LogEvent, Origin, Payload};

/// Turns demultiplexed lines into [`LogEvent`]s.
///
/// A parser keeps the last position it handed out, so one instance must only
/// ever see lines from a single feed.
#[derive(Debug, Default)]
pub struct EventParser {
    last_position: i64,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, origin: Origin, line: &[u8]) -> LogEvent {
        let text = String::from_utf8_lossy(strip_newline(line));
        let (timestamp, content) = split_timestamp(&text);
        let payload = decode_payload(content);
        let position = self.next_position(timestamp);

        LogEvent {
            timestamp,
            origin,
            payload,
            position,
        }
    }

    /// Timestamps are used as positions while they keep increasing. A line
    /// without one, or one that went backwards, gets the next position after
    /// the last one handed out.
    fn next_position(&mut self, timestamp: i64) -> i64 {
        let position = if timestamp > 0 && timestamp >= self.last_position {
            timestamp
        } else {
            self.last_position.saturating_add(1)
        };
        self.last_position = position;
        position
    }
}

fn strip_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Split a leading RFC3339 timestamp, as written by Docker with
/// `timestamps=true`, off the rest of the line.
fn split_timestamp(line: &str) -> (i64, &str) {
    let (token, rest) = line.split_once(' ').unwrap_or((line, ""));
    match DateTime::parse_from_rfc3339(token)
        .ok()
        .and_then(|ts| ts.timestamp_nanos_opt())
    {
        Some(nanos) => (nanos, rest),
        None => (0, line),
    }
}

fn decode_payload(content: &str) -> Payload {
    let trimmed = content.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(record) = serde_json::from_str::<Map<String, Value>>(trimmed) {
            return Payload::Structured(record);
        }
    }
    Payload::Text(content.to_string())
}
