// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end supervisor tests against fake compositor scripts that honor
//! the stdio wire contract.

#![cfg(unix)]

use comphost_supervisor::{Compositor, RunningStatus, SupervisorConfig, SupervisorError};
use serde_json::json;
use tempfile::TempDir;

/// Shell preamble shared by the fake compositors: field extraction from a
/// request line.
const PREAMBLE: &str = r#"
extract() { printf '%s' "$1" | sed -n "s/.*\"$2\":\"\([^\"]*\)\".*/\1/p"; }
"#;

async fn launch_fake(body: &str) -> (TempDir, Compositor) {
    let dir = TempDir::new().expect("create temp dir");
    let script = dir.path().join("fake-compositor.sh");
    std::fs::write(&script, format!("#!/usr/bin/env bash\n{PREAMBLE}\n{body}\n"))
        .expect("write fake compositor");
    // No chmod here: launch() is responsible for making the binary
    // executable.
    let compositor = Compositor::launch(
        SupervisorConfig::new(&script, "start-session").start_params(json!({"fps": 30})),
    )
    .await
    .expect("launch fake compositor");
    (dir, compositor)
}

/// Echoes each command's type tag back as the response payload.
const ECHO: &str = r#"
while IFS= read -r line; do
  if [ "$line" = "EOF" ]; then
    exit 0
  fi
  nonce=$(extract "$line" nonce)
  kind=$(extract "$line" type)
  printf 'remotion_buffer:%s:%s:0:%s' "$nonce" "${#kind}" "$kind"
done
"#;

#[tokio::test]
async fn single_request_response_round_trip() {
    let (_dir, compositor) = launch_fake(ECHO).await;
    assert!(compositor.pid().is_some());

    let payload = compositor.execute_command("ping", json!({})).await.expect("response");
    assert_eq!(payload.as_ref(), b"ping");

    compositor.shutdown().await.expect("clean shutdown");
    assert_eq!(compositor.status(), RunningStatus::QuitWithoutError);
}

#[tokio::test]
async fn responses_correlate_out_of_order() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r first
IFS= read -r second
k2=$(extract "$second" type)
k1=$(extract "$first" type)
printf 'remotion_buffer:%s:%s:0:%s' "$(extract "$second" nonce)" "${#k2}" "$k2"
printf 'remotion_buffer:%s:%s:0:%s' "$(extract "$first" nonce)" "${#k1}" "$k1"
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let (alpha, beta) = tokio::join!(
        compositor.execute_command("alpha", json!({})),
        compositor.execute_command("beta", json!({})),
    );
    assert_eq!(alpha.expect("alpha response").as_ref(), b"alpha");
    assert_eq!(beta.expect("beta response").as_ref(), b"beta");
}

#[tokio::test]
async fn binary_payload_survives_the_pipe() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r line
printf 'remotion_buffer:%s:4:0:a\000\nb' "$(extract "$line" nonce)"
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let payload = compositor.execute_command("grab-frame", json!({})).await.expect("response");
    assert_eq!(payload.as_ref(), &[0x61, 0x00, 0x0a, 0x62]);
}

#[tokio::test]
async fn frame_split_across_slow_chunks_still_resolves() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r line
nonce=$(extract "$line" nonce)
printf 'remotion_buf'
sleep 0.05
printf 'fer:%s:11:0:hello' "$nonce"
sleep 0.05
printf ' world'
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let payload = compositor.execute_command("render", json!({})).await.expect("response");
    assert_eq!(payload.as_ref(), b"hello world");
}

#[tokio::test]
async fn structured_error_frame_formats_message() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r line
payload='{"error":"bad","backtrace":"at foo"}'
printf 'remotion_buffer:%s:%s:1:%s' "$(extract "$line" nonce)" "${#payload}" "$payload"
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let err = compositor.execute_command("render", json!({})).await.unwrap_err();
    match err {
        SupervisorError::Compositor { message } => {
            assert_eq!(message, "Compositor error: bad\nat foo");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn raw_error_frame_passes_text_through() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r line
printf 'remotion_buffer:%s:13:1:plain failure' "$(extract "$line" nonce)"
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let err = compositor.execute_command("render", json!({})).await.unwrap_err();
    match err {
        SupervisorError::Compositor { message } => assert_eq!(message, "plain failure"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn diagnostic_frames_do_not_disturb_correlation() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r line
printf 'remotion_buffer:0:5:0:hello'
printf 'remotion_buffer:%s:2:0:ok' "$(extract "$line" nonce)"
IFS= read -r _eof
exit 0
"#,
    )
    .await;

    let payload = compositor.execute_command("render", json!({})).await.expect("response");
    assert_eq!(payload.as_ref(), b"ok");
}

#[tokio::test]
async fn crash_rejects_all_pending_callers() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r _a
IFS= read -r _b
echo "boom" >&2
exit 1
"#,
    )
    .await;

    let (first, second, done) = tokio::join!(
        compositor.execute_command("one", json!({})),
        compositor.execute_command("two", json!({})),
        compositor.wait_for_done(),
    );

    for outcome in [first.unwrap_err(), second.unwrap_err()] {
        match outcome {
            SupervisorError::Crashed { stderr } => assert!(stderr.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
    match done.unwrap_err() {
        SupervisorError::Crashed { stderr } => assert!(stderr.contains("boom")),
        other => panic!("unexpected error: {other:?}"),
    }

    // Lifecycle has settled: submissions now fail synchronously.
    match compositor.execute_command("late", json!({})).await.unwrap_err() {
        SupervisorError::QuitWithError { stderr } => assert!(stderr.contains("boom")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn wait_for_done_after_clean_exit_fails() {
    let (_dir, compositor) = launch_fake(ECHO).await;

    compositor.shutdown().await.expect("clean shutdown");

    match compositor.wait_for_done().await.unwrap_err() {
        SupervisorError::AlreadyQuit => {}
        other => panic!("unexpected error: {other:?}"),
    }
    match compositor.finish_commands().await.unwrap_err() {
        SupervisorError::AlreadyQuit => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn second_wait_for_done_fails_while_first_is_pending() {
    let (_dir, compositor) = launch_fake(ECHO).await;

    let (first, second, finish) = tokio::join!(
        compositor.wait_for_done(),
        async {
            tokio::task::yield_now().await;
            compositor.wait_for_done().await
        },
        async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            compositor.finish_commands().await
        },
    );

    assert!(first.is_ok());
    assert!(matches!(second.unwrap_err(), SupervisorError::DoneAlreadyPending));
    assert!(finish.is_ok());
}

#[tokio::test]
async fn framing_violation_is_fatal() {
    let (_dir, compositor) = launch_fake(
        r#"
IFS= read -r _line
printf 'remotion_buffer:zz:notanumber:0:'
sleep 0.2
exit 7
"#,
    )
    .await;

    let err = compositor.execute_command("render", json!({})).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Protocol(_)), "unexpected error: {err:?}");

    match compositor.execute_command("late", json!({})).await.unwrap_err() {
        SupervisorError::QuitWithError { stderr } => assert!(stderr.contains("notanumber")),
        other => panic!("unexpected error: {other:?}"),
    }
}
