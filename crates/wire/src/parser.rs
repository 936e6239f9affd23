// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental reassembly of response frames from arbitrary stdout chunks.
//!
//! Wire format of one frame:
//!
//! ```text
//! remotion_buffer:<nonce>:<length>:<status>:<payload bytes of exactly <length>>
//! ```
//!
//! `<status>` is `0` for success, `1` for error. The payload is arbitrary
//! binary. Bytes between frames that do not contain the marker are noise and
//! are discarded.

use bytes::{Buf, BytesMut};

use crate::frame::{Frame, FrameStatus, MARKER};

/// A stdout byte sequence that violates the framing protocol.
///
/// Terminal: the stream cannot be resynchronized once a header lies about
/// itself, so the supervisor treats any of these as fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid frame length field {0:?}")]
    InvalidLength(String),
    #[error("invalid frame status field {0:?}")]
    InvalidStatus(String),
    #[error("frame header is not valid UTF-8")]
    NonUtf8Header,
}

/// Incremental frame parser.
///
/// Feed stdout chunks in arrival order with [`FrameParser::push_chunk`]; each
/// call returns every frame the new bytes completed. State is one buffer of
/// undelivered bytes plus a count of payload bytes still outstanding for the
/// frame currently in progress.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
    /// Payload bytes still missing for the frame whose header has already
    /// been seen. While set, marker-free chunks skip the header rescan.
    missing: Option<usize>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one stdout chunk and return the frames it completed.
    ///
    /// Mid-payload chunks that do not contain the marker only decrement the
    /// missing-byte counter; the full header scan is deferred until enough
    /// bytes have arrived to finish the frame. Without this a multi-megabyte
    /// payload arriving in small pieces would rescan the whole buffer per
    /// chunk.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, ParseError> {
        let marker_in_chunk = find(chunk, MARKER).is_some();
        self.buf.extend_from_slice(chunk);

        if !marker_in_chunk {
            if let Some(missing) = self.missing.as_mut() {
                *missing = missing.saturating_sub(chunk.len());
                if *missing > 0 {
                    return Ok(Vec::new());
                }
            }
        }

        self.missing = None;
        self.drain()
    }

    /// Emit every complete frame currently in the buffer.
    fn drain(&mut self) -> Result<Vec<Frame>, ParseError> {
        let mut frames = Vec::new();
        loop {
            let Some(start) = find(&self.buf, MARKER) else {
                // No marker anywhere: everything except a possible partial
                // marker at the tail is inter-frame noise.
                let keep = partial_marker_len(&self.buf);
                let len = self.buf.len();
                self.buf.advance(len - keep);
                return Ok(frames);
            };
            if start > 0 {
                self.buf.advance(start);
            }

            let Some(header) = self.parse_header()? else {
                // Header fields incomplete; wait for more bytes.
                return Ok(frames);
            };
            let available = self.buf.len() - header.payload_start;
            if available < header.length {
                self.missing = Some(header.length - available);
                return Ok(frames);
            }

            self.buf.advance(header.payload_start);
            let payload = self.buf.split_to(header.length).freeze();
            self.missing = None;
            frames.push(Frame { nonce: header.nonce, status: header.status, payload });
        }
    }

    /// Parse the three colon-terminated fields following the marker at the
    /// buffer head. Returns `Ok(None)` while any field is still incomplete.
    fn parse_header(&self) -> Result<Option<ParsedHeader>, ParseError> {
        let mut cursor = MARKER.len();
        let mut fields: [&[u8]; 3] = [&[]; 3];
        for field in &mut fields {
            let Some(rel) = self.buf[cursor..].iter().position(|&b| b == b':') else {
                return Ok(None);
            };
            *field = &self.buf[cursor..cursor + rel];
            cursor += rel + 1;
        }

        let nonce = std::str::from_utf8(fields[0])
            .map_err(|_| ParseError::NonUtf8Header)?
            .to_owned();
        let length_text =
            std::str::from_utf8(fields[1]).map_err(|_| ParseError::NonUtf8Header)?;
        let length: usize = length_text
            .parse()
            .map_err(|_| ParseError::InvalidLength(length_text.to_owned()))?;
        let status = match fields[2] {
            b"0" => FrameStatus::Success,
            b"1" => FrameStatus::Error,
            other => {
                return Err(ParseError::InvalidStatus(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };

        Ok(Some(ParsedHeader { nonce, length, status, payload_start: cursor }))
    }
}

struct ParsedHeader {
    nonce: String,
    length: usize,
    status: FrameStatus,
    payload_start: usize,
}

/// First occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Length of the longest proper marker prefix ending the buffer.
///
/// Those bytes may be a frame marker straddling a chunk boundary, so noise
/// trimming must leave them in place.
fn partial_marker_len(buf: &[u8]) -> usize {
    let max = MARKER.len().saturating_sub(1).min(buf.len());
    (1..=max)
        .rev()
        .find(|&k| buf[buf.len() - k..] == MARKER[..k])
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
