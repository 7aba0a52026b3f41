use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::error::ApiError;
use crate::runtime::{LiveStart, StreamMask};

pub const LAST_EVENT_ID: &str = "last-event-id";

/// Query string shared by the log endpoints. `stdout` and `stderr` are
/// presence flags: `?stdout&stderr` selects both.
#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<String>,
}

impl LogsQuery {
    pub fn mask(&self) -> Result<StreamMask, ApiError> {
        StreamMask::new(self.stdout.is_some(), self.stderr.is_some())
            .ok_or_else(|| ApiError::Validation("stdout or stderr is required".to_string()))
    }

    /// Lower bound of a range request. Unparsable values leave it open.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.from.as_deref())
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(self.to.as_deref())
    }

    /// Where a live stream resumes: the `lastEventId` query parameter wins
    /// over the `Last-Event-ID` header, and without either the stream starts
    /// now.
    pub fn resume_point(&self, headers: &HeaderMap) -> Result<LiveStart, ApiError> {
        let marker = self
            .last_event_id
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| {
                headers
                    .get(LAST_EVENT_ID)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
            });

        match marker {
            None => Ok(LiveStart::Now),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(LiveStart::After)
                .map_err(|_| ApiError::Validation(format!("invalid last event id: {raw}"))),
        }
    }
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}
