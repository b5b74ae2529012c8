//! Child process handle for the tunnel agent
//!
//! This module wraps one OS process instance of the agent binary: spawning
//! with piped output streams, termination, and reaping. The supervisor owns
//! at most one of these at a time.

use crate::error::{Error, Result};
use crate::options::BIN_NAME;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

/// One spawned instance of the agent binary
pub struct AgentProcess {
    child: Child,
}

impl AgentProcess {
    /// Spawn the agent binary from `dir` with the given arguments.
    ///
    /// Returns the handle together with the piped stdout and stderr streams.
    /// Stdin is closed; the process is marked kill-on-drop so an abandoned
    /// handle cannot leak a running agent.
    pub fn spawn(dir: &Path, args: &[String]) -> Result<(Self, ChildStdout, ChildStderr)> {
        let bin = dir.join(BIN_NAME);

        debug!("Spawning tunnel agent...");
        debug!("  Binary: {:?}", bin);
        debug!("  Working directory: {:?}", dir);
        debug!("  Args: {:?}", args);

        let mut child = Command::new(&bin)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(bin.clone(), Arc::new(e)))?;

        // Piped above, so both streams are always present
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("agent stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Process("agent stderr was not captured".to_string()))?;

        info!("Tunnel agent spawned (PID: {:?})", child.id());

        Ok((Self { child }, stdout, stderr))
    }

    /// OS process id, if the process has not yet been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to terminate and collect its exit status
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Request termination without waiting for the process to be reaped
    pub fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    /// Terminate the process and wait until it has been reaped
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let result = AgentProcess::spawn(Path::new("/nonexistent"), &["start".to_string()]);
        assert!(matches!(result, Err(Error::Spawn(_, _))));
    }
}
