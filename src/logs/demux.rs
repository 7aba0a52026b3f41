//! Splitting a raw feed into lines tagged with their origin.
//!
//! Docker multiplexes stdout and stderr over one connection. Every chunk of
//! output is prefixed with an 8 byte header:
//!
//! ```text
//! [stream, 0, 0, 0, len (u32, big endian)]
//! ```
//!
//! where `stream` is 0 for stdin, 1 for stdout and 2 for stderr. Containers
//! running with a TTY skip the framing entirely.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::StreamExt;

use super::{Origin, StreamError};
use crate::runtime::RawFeed;

pub const FRAME_HEADER_LEN: usize = 8;
/// Larger frames are treated as a corrupt header.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
/// Unframed lines longer than this are emitted in pieces.
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Framed,
    Terminal,
}

impl FeedMode {
    pub fn for_tty(tty: bool) -> Self {
        if tty { Self::Terminal } else { Self::Framed }
    }
}

/// Encode `payload` as a single frame. `Origin::Tty` has no frame type of its
/// own and is written as stdout.
pub fn encode_frame(origin: Origin, payload: &[u8]) -> Bytes {
    let stream = match origin {
        Origin::Stderr => 2,
        Origin::Stdout | Origin::Tty => 1,
    };
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u8(stream);
    frame.put_bytes(0, 3);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

pub struct Demultiplexer {
    feed: RawFeed,
    mode: FeedMode,
    buf: BytesMut,
    /// Bytes of `buf` already searched for a newline.
    scanned: usize,
    eof: bool,
}

impl Demultiplexer {
    pub fn new(feed: RawFeed, mode: FeedMode) -> Self {
        Self {
            feed,
            mode,
            buf: BytesMut::new(),
            scanned: 0,
            eof: false,
        }
    }

    /// The next complete frame or line, or `None` once the feed is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<(Origin, Bytes)>, StreamError> {
        loop {
            let buffered = match self.mode {
                FeedMode::Framed => self.take_frame()?,
                FeedMode::Terminal => self.take_line(),
            };
            if buffered.is_some() {
                return Ok(buffered);
            }
            if self.eof {
                return self.take_remainder();
            }
            match self.feed.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => self.eof = true,
            }
        }
    }

    fn take_frame(&mut self) -> Result<Option<(Origin, Bytes)>, StreamError> {
        loop {
            if self.buf.len() < FRAME_HEADER_LEN {
                return Ok(None);
            }
            let origin = match self.buf[0] {
                0 | 1 => Origin::Stdout,
                2 => Origin::Stderr,
                other => {
                    return Err(StreamError::MalformedFrame(format!(
                        "unknown stream type {other}"
                    )));
                }
            };
            let len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]])
                as usize;
            if len > MAX_FRAME_SIZE {
                return Err(StreamError::MalformedFrame(format!(
                    "frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte limit"
                )));
            }
            if self.buf.len() < FRAME_HEADER_LEN + len {
                self.buf.reserve(FRAME_HEADER_LEN + len - self.buf.len());
                return Ok(None);
            }
            self.buf.advance(FRAME_HEADER_LEN);
            if len == 0 {
                continue;
            }
            return Ok(Some((origin, self.buf.split_to(len).freeze())));
        }
    }

    fn take_line(&mut self) -> Option<(Origin, Bytes)> {
        let end = match self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => (self.scanned + offset + 1).min(MAX_LINE_SIZE),
            None if self.buf.len() >= MAX_LINE_SIZE => MAX_LINE_SIZE,
            None => {
                self.scanned = self.buf.len();
                return None;
            }
        };
        self.scanned = 0;
        Some((Origin::Tty, self.buf.split_to(end).freeze()))
    }

    fn take_remainder(&mut self) -> Result<Option<(Origin, Bytes)>, StreamError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        self.scanned = 0;
        match self.mode {
            FeedMode::Terminal => Ok(Some((Origin::Tty, self.buf.split().freeze()))),
            FeedMode::Framed => {
                let pending = self.buf.len();
                self.buf.clear();
                Err(StreamError::MalformedFrame(format!(
                    "feed ended inside a frame with {pending} bytes pending"
                )))
            }
        }
    }
}
