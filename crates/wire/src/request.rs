// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request-side encoding: one JSON object per line on the child's stdin.

use serde::Serialize;
use serde_json::Value;

/// Literal line telling the compositor to finish outstanding work and exit
/// cleanly.
pub const EOF_LINE: &[u8] = b"EOF\n";

#[derive(Debug, Serialize)]
struct RequestLine<'a> {
    nonce: &'a str,
    payload: CommandPayload<'a>,
}

#[derive(Debug, Serialize)]
struct CommandPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    params: &'a Value,
}

/// Serialize one command request as a newline-terminated JSON line:
/// `{"nonce":"...","payload":{"type":"...","params":...}}\n`.
pub fn encode_request(nonce: &str, kind: &str, params: &Value) -> serde_json::Result<Vec<u8>> {
    let mut line =
        serde_json::to_vec(&RequestLine { nonce, payload: CommandPayload { kind, params } })?;
    line.push(b'\n');
    Ok(line)
}

/// Serialize a bare command object, e.g. the start command the child
/// receives as its single command-line argument.
pub fn encode_command(kind: &str, params: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&CommandPayload { kind, params })
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
