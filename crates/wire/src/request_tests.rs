// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_line_shape_matches_wire_contract() {
    let line = encode_request("abc", "render-frame", &json!({"frame": 42})).unwrap();

    assert_eq!(
        std::str::from_utf8(&line).unwrap(),
        "{\"nonce\":\"abc\",\"payload\":{\"type\":\"render-frame\",\"params\":{\"frame\":42}}}\n"
    );
}

#[test]
fn request_line_ends_with_single_newline() {
    let line = encode_request("n", "noop", &json!({})).unwrap();
    assert_eq!(line.last(), Some(&b'\n'));
    assert!(!line[..line.len() - 1].contains(&b'\n'));
}

#[test]
fn start_command_serializes_without_nonce() {
    let arg = encode_command("start-session", &json!({"width": 1920})).unwrap();
    assert_eq!(arg, "{\"type\":\"start-session\",\"params\":{\"width\":1920}}");
}

#[test]
fn eof_line_is_literal() {
    assert_eq!(EOF_LINE, b"EOF\n");
}
