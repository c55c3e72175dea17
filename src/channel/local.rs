use std::process::Stdio;

use tokio::process::Command;

use crate::error::{EngineError, EngineResult};

use super::{stream, CommandOutput, LineSink};

/// Runs commands on this machine through `bash -c`.
#[derive(Debug, Default)]
pub struct LocalChannel;

impl LocalChannel {
    pub fn connect(&self) -> EngineResult<()> {
        which::which("bash").map_err(|e| EngineError::Connection {
            target: "local".to_string(),
            reason: format!("bash not found: {}", e),
        })?;
        Ok(())
    }

    fn command(cmd: &str) -> Command {
        let mut command = Command::new("bash");
        command.arg("-c").arg(cmd).kill_on_drop(true);
        command
    }

    pub async fn execute(&self, cmd: &str) -> EngineResult<CommandOutput> {
        let output = Self::command(cmd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(spawn_error)?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    pub async fn execute_streaming(
        &self,
        cmd: &str,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<CommandOutput> {
        let mut child = Self::command(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => return Err(spawn_error(std::io::Error::other("output pipes unavailable"))),
        };

        let (stdout, stderr) = stream::pump(stdout, stderr, sink)
            .await
            .map_err(spawn_error)?;
        let status = child.wait().await.map_err(spawn_error)?;

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

fn spawn_error(err: std::io::Error) -> EngineError {
    EngineError::Connection {
        target: "local".to_string(),
        reason: err.to_string(),
    }
}
