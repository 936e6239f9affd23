// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process creation for the compositor binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::{Child, Command};

use crate::error::SupervisorError;

/// Environment signal declaring the host filesystem read-only; when set, the
/// executable-permission fix-up is skipped.
const READ_ONLY_FS: &str = "READ_ONLY_FS";

/// Configuration for launching the compositor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the compositor executable.
    pub executable: PathBuf,
    /// Type tag of the start command passed as argv[1].
    pub start_kind: String,
    /// Parameters of the start command.
    pub start_params: Value,
    /// Environment additions for the child, e.g. dynamic-library lookup
    /// paths computed by the caller.
    pub extra_env: Vec<(String, String)>,
}

impl SupervisorConfig {
    pub fn new(executable: impl Into<PathBuf>, start_kind: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            start_kind: start_kind.into(),
            start_params: Value::Object(Default::default()),
            extra_env: Vec::new(),
        }
    }

    pub fn start_params(mut self, params: Value) -> Self {
        self.start_params = params;
        self
    }

    pub fn extra_env(mut self, env: Vec<(String, String)>) -> Self {
        self.extra_env = env;
        self
    }
}

/// Spawn the compositor with piped stdio and the start command serialized as
/// its single command-line argument.
pub(crate) fn spawn_compositor(config: &SupervisorConfig) -> Result<Child, SupervisorError> {
    ensure_executable(&config.executable)?;
    let start_command = comphost_wire::encode_command(&config.start_kind, &config.start_params)?;

    let mut command = Command::new(&config.executable);
    command
        .arg(start_command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &config.extra_env {
        command.env(key, value);
    }

    let child = command.spawn()?;
    tracing::debug!(
        executable = %config.executable.display(),
        pid = ?child.id(),
        "compositor spawned"
    );
    Ok(child)
}

/// Make sure the compositor binary is executable by the host user.
fn ensure_executable(path: &Path) -> Result<(), SupervisorError> {
    if std::env::var_os(READ_ONLY_FS).is_some() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(path, permissions)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
