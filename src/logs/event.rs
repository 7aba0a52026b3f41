use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Stdout,
    Stderr,
    /// Terminal-mode output, where stdout and stderr share one stream.
    Tty,
}

/// Decoded content of a line. Structured records are encoded as the object
/// itself, plain text as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Structured(Map<String, Value>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Timestamp in nanoseconds (UTC), 0 when the line carried none
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "stream")]
    pub origin: Origin,
    #[serde(rename = "m")]
    pub payload: Payload,
    /// Resume marker, non-decreasing within one generator
    #[serde(rename = "p")]
    pub position: i64,
}
