// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stdio wire protocol for the compositor child process.
//!
//! Requests travel host → child as newline-delimited JSON lines; responses
//! travel child → host as length-prefixed binary frames introduced by the
//! `remotion_buffer:` marker. The parser here is a pure state machine — it
//! never touches a stream, so any chunking of stdout bytes can be replayed
//! against it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod parser;
mod request;

pub use frame::{Frame, FrameStatus, DIAGNOSTIC_NONCE, MARKER};
pub use parser::{FrameParser, ParseError};
pub use request::{encode_command, encode_request, EOF_LINE};
