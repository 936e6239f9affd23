// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by the supervisor.
//!
//! None of these are retried: every error is terminal for the affected
//! caller, and child-death errors are broadcast to all pending callers in
//! one atomic sweep.

use comphost_wire::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The compositor already exited cleanly; no further commands are
    /// accepted.
    #[error("compositor has already quit")]
    AlreadyQuit,

    /// The compositor already exited with a failure.
    #[error("compositor quit with an error: {stderr}")]
    QuitWithError { stderr: String },

    /// The compositor answered this request with an error frame.
    #[error("{message}")]
    Compositor { message: String },

    /// The compositor died while this request was in flight.
    #[error("compositor exited unexpectedly: {stderr}")]
    Crashed { stderr: String },

    /// The compositor's stdout violated the framing protocol.
    #[error("framing protocol violation: {0}")]
    Protocol(#[from] ParseError),

    /// Spawning the child or writing to its stdin failed.
    #[error("compositor i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A command could not be serialized.
    #[error("failed to serialize command: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another `wait_for_done` caller is already pending.
    #[error("a wait_for_done caller is already pending")]
    DoneAlreadyPending,
}
