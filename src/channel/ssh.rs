use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

use super::{stream, CommandOutput, LineSink, RemoteAuth, RemoteTarget};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    pub async fn connect(remote: &RemoteTarget) -> EngineResult<Self> {
        debug!("Connecting to {}@{}:{}", remote.user, remote.host, remote.port);

        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);
        builder.user(remote.user.clone());
        builder.port(remote.port);
        builder.connect_timeout(CONNECT_TIMEOUT);

        match &remote.auth {
            RemoteAuth::Agent => {}
            RemoteAuth::Key { path } => {
                builder.keyfile(path);
            }
            RemoteAuth::Password { .. } => {
                return Err(EngineError::Connection {
                    target: remote.pool_key(),
                    reason: "password authentication is not available over the multiplexed ssh \
                             transport; configure a key file or ssh-agent"
                        .to_string(),
                });
            }
        }

        let session = builder
            .connect(&remote.host)
            .await
            .map_err(|e| EngineError::Connection {
                target: remote.pool_key(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            session,
            host: remote.host.clone(),
        })
    }

    async fn output(&self, cmd: &str) -> Result<CommandOutput, openssh::Error> {
        let output = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .output()
            .await?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(&self, cmd: &str, sink: &mut LineSink<'_>) -> Result<CommandOutput, String> {
        let mut child = self
            .session
            .command("bash")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .await
            .map_err(|e| e.to_string())?;

        let (stdout, stderr) = match (child.stdout().take(), child.stderr().take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => return Err("output pipes unavailable".to_string()),
        };

        let (stdout, stderr) = stream::pump(stdout, stderr, sink)
            .await
            .map_err(|e| e.to_string())?;
        let status = child.wait().await.map_err(|e| e.to_string())?;

        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }

    pub async fn close(self) -> EngineResult<()> {
        self.session
            .close()
            .await
            .map_err(|e| EngineError::Connection {
                target: self.host.clone(),
                reason: format!("failed to close session: {}", e),
            })
    }
}

type Slot = Arc<Mutex<Option<Arc<SshSession>>>>;

/// One multiplexed SSH session per `user@host:port`, reused across calls.
/// Each key has its own lock, so a slow connect only blocks callers of
/// that host.
#[derive(Default)]
pub struct SshPool {
    slots: std::sync::Mutex<HashMap<String, Slot>>,
}

impl SshPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Return the pooled session for `remote`, reconnecting if it went stale.
    pub async fn session(&self, remote: &RemoteTarget) -> EngineResult<Arc<SshSession>> {
        let key = remote.pool_key();
        let slot = self.slot(&key);
        let mut current = slot.lock().await;

        if let Some(existing) = current.as_ref() {
            if existing.session.check().await.is_ok() {
                return Ok(existing.clone());
            }
            debug!("Dropping stale ssh session {}", key);
            *current = None;
        }

        let session = Arc::new(SshSession::connect(remote).await?);
        *current = Some(session.clone());
        Ok(session)
    }

    async fn evict(&self, remote: &RemoteTarget) {
        self.slot(&remote.pool_key()).lock().await.take();
    }

    pub async fn execute(&self, remote: &RemoteTarget, cmd: &str) -> EngineResult<CommandOutput> {
        let session = self.session(remote).await?;
        match session.output(cmd).await {
            Ok(output) => Ok(output),
            Err(e) => {
                self.evict(remote).await;
                Err(EngineError::Connection {
                    target: remote.pool_key(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn execute_streaming(
        &self,
        remote: &RemoteTarget,
        cmd: &str,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<CommandOutput> {
        let session = self.session(remote).await?;
        match session.stream(cmd, sink).await {
            Ok(output) => Ok(output),
            Err(reason) => {
                self.evict(remote).await;
                Err(EngineError::Connection {
                    target: remote.pool_key(),
                    reason,
                })
            }
        }
    }

    pub async fn disconnect(&self, remote: &RemoteTarget) -> EngineResult<()> {
        let Some(session) = self.slot(&remote.pool_key()).lock().await.take() else {
            return Ok(());
        };

        match Arc::try_unwrap(session) {
            Ok(session) => session.close().await,
            Err(_) => {
                warn!(
                    "ssh session {} still in use; it will close when released",
                    remote.pool_key()
                );
                Ok(())
            }
        }
    }
}
