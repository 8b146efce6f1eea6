//! Child process lifecycle for the language server.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::Error;
use crate::types::LaunchConfig;

/// How long `stop` waits for the child to exit before killing it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Owns the spawned server process. The byte channel (the child's stdin
/// and stdout) is handed to the session's writer and reader tasks at
/// start; an exited process surfaces there as end-of-stream, never as a
/// silent hang.
pub(crate) struct Transport {
    child: Child,
}

impl Transport {
    /// Spawn the server process with piped standard streams and the
    /// workspace root as its working directory.
    pub fn start(config: &LaunchConfig) -> Result<(Self, ChildStdin, ChildStdout), Error> {
        let resolved_cmd = which::which(&config.command)
            .map_err(|_| Error::ProcessLaunch(format!("{} not found in PATH", config.command)))?;

        let mut child = Command::new(&resolved_cmd)
            .args(&config.args)
            .current_dir(&config.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessLaunch(format!("spawning {}: {e}", config.command)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ProcessLaunch(String::from("no stdin from child")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ProcessLaunch(String::from("no stdout from child")))?;

        Ok((Self { child }, stdin, stdout))
    }

    /// Wait for the child to exit, killing it after the grace period.
    /// Always releases OS resources.
    pub async fn stop(mut self) {
        let waited = tokio::time::timeout(STOP_GRACE, self.child.wait()).await;
        if waited.is_err() {
            tracing::debug!("language server didn't exit in time, killing");
            let _ = self.child.kill().await;
        }
    }
}
