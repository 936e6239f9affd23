// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The compositor gateway: command submission, response dispatch, and the
//! lifecycle controller that fails every pending caller when the child dies.
//!
//! All registry and lifecycle state lives behind one mutex that is never
//! held across an await; stdin writes serialize through their own async
//! mutex, respecting OS pipe backpressure without queueing further.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use comphost_wire::{encode_request, Frame, FrameParser, FrameStatus, ParseError, EOF_LINE};

use crate::error::SupervisorError;
use crate::nonce::make_nonce;
use crate::process::{spawn_compositor, SupervisorConfig};
use crate::registry::WaiterRegistry;
use crate::status::RunningStatus;

const STDOUT_CHUNK_SIZE: usize = 64 * 1024;
const STDERR_CHUNK_SIZE: usize = 8 * 1024;

/// One-shot completion handle for a `wait_for_done` caller.
type DoneWaiter = oneshot::Sender<Result<(), SupervisorError>>;

/// Handle to a running compositor child process.
///
/// Dropping the handle closes the child's stdin but does not kill the
/// process; orderly shutdown is [`Compositor::finish_commands`] followed by
/// [`Compositor::wait_for_done`], or [`Compositor::shutdown`] for both.
pub struct Compositor {
    pid: Option<u32>,
    stdin: AsyncMutex<ChildStdin>,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<SupervisorState>,
    stderr: Mutex<Vec<u8>>,
}

struct SupervisorState {
    status: RunningStatus,
    waiters: WaiterRegistry,
    done: Option<DoneWaiter>,
}

impl Compositor {
    /// Launch the compositor and wire up stdout parsing, stderr capture, and
    /// exit supervision.
    pub async fn launch(config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let mut child = spawn_compositor(&config)?;
        let stdin = take_stdio(child.stdin.take(), "stdin")?;
        let stdout = take_stdio(child.stdout.take(), "stdout")?;
        let stderr = take_stdio(child.stderr.take(), "stderr")?;
        let pid = child.id();

        let shared = Arc::new(Shared {
            state: Mutex::new(SupervisorState {
                status: RunningStatus::Running,
                waiters: WaiterRegistry::default(),
                done: None,
            }),
            stderr: Mutex::new(Vec::new()),
        });
        tokio::spawn(supervise(shared.clone(), child, stdout, stderr));

        Ok(Self { pid, stdin: AsyncMutex::new(stdin), shared })
    }

    /// The child's process identifier, or `None` if the host could not
    /// obtain one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current lifecycle state of the child.
    pub fn status(&self) -> RunningStatus {
        self.shared.state.lock().status.clone()
    }

    /// Submit one command and await its response payload.
    ///
    /// Fails immediately when the child has already exited. Responses
    /// arrive out of order with respect to submissions; correlation is by
    /// nonce only, and exactly one resolution is delivered unless the child
    /// dies first, in which case exactly one rejection is.
    pub async fn execute_command(
        &self,
        kind: &str,
        params: Value,
    ) -> Result<Bytes, SupervisorError> {
        let nonce = make_nonce();
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.state.lock();
            match &state.status {
                RunningStatus::Running => state.waiters.insert(nonce.clone(), tx),
                RunningStatus::QuitWithoutError => return Err(SupervisorError::AlreadyQuit),
                RunningStatus::QuitWithError { stderr } => {
                    return Err(SupervisorError::QuitWithError { stderr: stderr.clone() })
                }
            }
        }

        let line = match encode_request(&nonce, kind, &params) {
            Ok(line) => line,
            Err(err) => {
                let _ = self.shared.state.lock().waiters.take(&nonce);
                return Err(err.into());
            }
        };
        if let Err(err) = self.write_line(&line).await {
            // The child may have died between the precondition check and the
            // write; do not strand the waiter until exit propagation.
            let mut state = self.shared.state.lock();
            let _ = state.waiters.take(&nonce);
            return Err(match &state.status {
                RunningStatus::QuitWithError { stderr } => {
                    SupervisorError::Crashed { stderr: stderr.clone() }
                }
                _ => err,
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.lifecycle_error()),
        }
    }

    /// Tell the child to finish outstanding work and exit cleanly.
    ///
    /// Does not wait for the exit; install [`Compositor::wait_for_done`]
    /// first if the exit matters.
    pub async fn finish_commands(&self) -> Result<(), SupervisorError> {
        {
            let state = self.shared.state.lock();
            match &state.status {
                RunningStatus::Running => {}
                RunningStatus::QuitWithoutError => return Err(SupervisorError::AlreadyQuit),
                RunningStatus::QuitWithError { stderr } => {
                    return Err(SupervisorError::QuitWithError { stderr: stderr.clone() })
                }
            }
        }
        self.write_line(EOF_LINE).await
    }

    /// Await the child's exit: resolves on a clean exit, fails with the
    /// accumulated stderr on a crash.
    ///
    /// Must be installed before [`Compositor::finish_commands`] — a clean
    /// exit that already happened fails with the already-quit error. At most
    /// one caller may be pending at a time.
    pub async fn wait_for_done(&self) -> Result<(), SupervisorError> {
        let rx = self.install_done_waiter()?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.lifecycle_error()),
        }
    }

    /// Orderly shutdown: ask the child to finish, then wait for its exit.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        // Install the done-waiter before writing EOF so a fast exit cannot
        // slip between the two.
        let rx = self.install_done_waiter()?;
        if let Err(err) = self.write_line(EOF_LINE).await {
            // The handle is orphaned; don't leave it blocking later callers.
            self.shared.state.lock().done.take();
            return Err(err);
        }
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(self.lifecycle_error()),
        }
    }

    fn install_done_waiter(
        &self,
    ) -> Result<oneshot::Receiver<Result<(), SupervisorError>>, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.shared.state.lock();
        match &state.status {
            RunningStatus::Running => {
                if state.done.is_some() {
                    return Err(SupervisorError::DoneAlreadyPending);
                }
                state.done = Some(tx);
                Ok(rx)
            }
            RunningStatus::QuitWithoutError => Err(SupervisorError::AlreadyQuit),
            RunningStatus::QuitWithError { stderr } => {
                Err(SupervisorError::QuitWithError { stderr: stderr.clone() })
            }
        }
    }

    async fn write_line(&self, line: &[u8]) -> Result<(), SupervisorError> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Error describing the current lifecycle state, for completion handles
    /// that were torn down without an explicit resolution.
    fn lifecycle_error(&self) -> SupervisorError {
        let state = self.shared.state.lock();
        match &state.status {
            RunningStatus::Running => {
                SupervisorError::Crashed { stderr: self.shared.stderr_text() }
            }
            RunningStatus::QuitWithoutError => SupervisorError::AlreadyQuit,
            RunningStatus::QuitWithError { stderr } => {
                SupervisorError::QuitWithError { stderr: stderr.clone() }
            }
        }
    }
}

impl Shared {
    fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr.lock()).into_owned()
    }

    /// Move out of `Running`; at most one transition ever happens.
    ///
    /// Drains the registry and settles the done-waiter under the state lock
    /// so the broadcast is atomic: no new waiter can interleave with it.
    /// `cause` carries the parse error when the transition came from a
    /// framing violation rather than a child exit.
    fn transition(&self, next: RunningStatus, cause: Option<ParseError>) {
        let mut state = self.state.lock();
        if !state.status.is_running() {
            return;
        }
        state.status = next.clone();
        let waiters = state.waiters.drain();
        let done = state.done.take();

        match &next {
            RunningStatus::QuitWithoutError => {
                tracing::debug!("compositor exited cleanly");
                for waiter in waiters {
                    let _ = waiter.send(Err(SupervisorError::AlreadyQuit));
                }
                if let Some(done) = done {
                    let _ = done.send(Ok(()));
                }
            }
            RunningStatus::QuitWithError { stderr } => {
                let reject = || match &cause {
                    Some(parse) => SupervisorError::Protocol(parse.clone()),
                    None => SupervisorError::Crashed { stderr: stderr.clone() },
                };
                for waiter in waiters {
                    let _ = waiter.send(Err(reject()));
                }
                if let Some(done) = done {
                    let _ = done.send(Err(reject()));
                }
            }
            RunningStatus::Running => debug_assert!(false, "cannot transition back to running"),
        }
    }
}

/// Run the child to completion: pump stdout through the parser, capture
/// stderr, then convert the exit status into the lifecycle transition.
async fn supervise(shared: Arc<Shared>, mut child: Child, stdout: ChildStdout, stderr: ChildStderr) {
    let stderr_task = tokio::spawn(pump_stderr(shared.clone(), stderr));
    pump_stdout(&shared, stdout).await;

    let status = child.wait().await;
    // Stderr may still be in flight when wait() returns; drain it fully
    // before the transition snapshots it.
    let _ = stderr_task.await;

    let next = match status {
        Ok(status) if status.success() => RunningStatus::QuitWithoutError,
        Ok(status) => {
            let stderr = shared.stderr_text();
            tracing::warn!(exit_status = %status, stderr = %stderr, "compositor exited abnormally");
            RunningStatus::QuitWithError { stderr }
        }
        Err(err) => RunningStatus::QuitWithError {
            stderr: format!("failed to wait on compositor: {err}"),
        },
    };
    shared.transition(next, None);
}

async fn pump_stdout(shared: &Arc<Shared>, mut stdout: ChildStdout) {
    let mut parser = FrameParser::new();
    let mut chunk = vec![0u8; STDOUT_CHUNK_SIZE];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => match parser.push_chunk(&chunk[..n]) {
                Ok(frames) => {
                    for frame in frames {
                        dispatch_frame(shared, frame);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "compositor stdout violated the framing protocol");
                    let mut stderr = shared.stderr_text();
                    if stderr.is_empty() {
                        stderr = err.to_string();
                    }
                    shared.transition(RunningStatus::QuitWithError { stderr }, Some(err));
                    return;
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "failed to read compositor stdout");
                return;
            }
        }
    }
}

async fn pump_stderr(shared: Arc<Shared>, mut stderr: ChildStderr) {
    let mut chunk = vec![0u8; STDERR_CHUNK_SIZE];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => shared.stderr.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

/// Route one complete frame: diagnostic frames are logged, response frames
/// complete their waiter.
fn dispatch_frame(shared: &Shared, frame: Frame) {
    if frame.is_diagnostic() {
        let text = String::from_utf8_lossy(&frame.payload);
        tracing::debug!(target: "compositor", "{}", text);
        return;
    }

    let Some(waiter) = shared.state.lock().waiters.take(&frame.nonce) else {
        tracing::debug!(nonce = %frame.nonce, "frame for unknown nonce dropped");
        return;
    };
    let outcome = match frame.status {
        FrameStatus::Success => Ok(frame.payload),
        FrameStatus::Error => {
            Err(SupervisorError::Compositor { message: error_message(&frame.payload) })
        }
    };
    // The caller may have abandoned its future; a closed channel is fine.
    let _ = waiter.send(outcome);
}

/// Render an error frame's payload: structured `{error, backtrace}` JSON
/// when well-formed, raw text otherwise.
fn error_message(payload: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: String,
        backtrace: String,
    }

    match serde_json::from_slice::<ErrorPayload>(payload) {
        Ok(parsed) => format!("Compositor error: {}\n{}", parsed.error, parsed.backtrace),
        Err(_) => String::from_utf8_lossy(payload).into_owned(),
    }
}

fn take_stdio<T>(handle: Option<T>, name: &str) -> Result<T, SupervisorError> {
    handle.ok_or_else(|| {
        SupervisorError::Io(std::io::Error::other(format!("child {name} was not captured")))
    })
}

#[cfg(test)]
#[path = "compositor_tests.rs"]
mod tests;
