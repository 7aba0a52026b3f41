pub mod demux;
pub mod event;
pub mod generator;
pub mod parser;

use thiserror::Error;

use crate::runtime::RuntimeError;

pub use demux::{Demultiplexer, FeedMode};
pub use event::{LogEvent, Origin, Payload};
pub use generator::{EventGenerator, GeneratorOptions};
pub use parser::EventParser;

/// Why a log pipeline stopped.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The feed ran out: the container stopped or the range was consumed.
    #[error("end of stream")]
    EndOfStream,
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("stream cancelled")]
    Cancelled,
    #[error("feed error: {0}")]
    Feed(#[from] RuntimeError),
}

impl StreamError {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
