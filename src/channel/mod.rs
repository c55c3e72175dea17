//! Command execution against the local machine or a remote host over SSH.

pub mod local;
pub mod ssh;
mod stream;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

use local::LocalChannel;
use ssh::SshPool;

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    Local,
    Remote(RemoteTarget),
}

impl Target {
    pub fn is_local(&self) -> bool {
        matches!(self, Target::Local)
    }

    /// Privileged commands need `sudo` when logged in as a non-root remote user.
    pub fn needs_sudo(&self) -> bool {
        match self {
            Target::Local => false,
            Target::Remote(remote) => remote.user != "root",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => write!(f, "local"),
            Target::Remote(remote) => write!(f, "{}", remote.pool_key()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub auth: RemoteAuth,
}

impl RemoteTarget {
    pub fn pool_key(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum RemoteAuth {
    /// ssh-agent or the user's default identities.
    #[default]
    Agent,
    Key { path: PathBuf },
    Password { password: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One line of output as it is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLine<'a> {
    Stdout(&'a str),
    Stderr(&'a str),
}

impl<'a> OutputLine<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            OutputLine::Stdout(line) | OutputLine::Stderr(line) => line,
        }
    }
}

pub type LineSink<'a> = dyn FnMut(OutputLine<'_>) + Send + 'a;

#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Establish (or reuse) the connection for `target`.
    async fn connect(&self, target: &Target) -> EngineResult<()>;

    async fn execute(&self, target: &Target, command: &str) -> EngineResult<CommandOutput>;

    /// Like `execute`, but hands every output line to `sink` as it arrives.
    async fn execute_streaming(
        &self,
        target: &Target,
        command: &str,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<CommandOutput>;

    async fn disconnect(&self, _target: &Target) -> EngineResult<()> {
        Ok(())
    }
}

/// Production channel: local processes plus a pool of SSH sessions.
#[derive(Default)]
pub struct HostChannel {
    local: LocalChannel,
    ssh: SshPool,
}

impl HostChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandChannel for HostChannel {
    async fn connect(&self, target: &Target) -> EngineResult<()> {
        match target {
            Target::Local => self.local.connect(),
            Target::Remote(remote) => self.ssh.session(remote).await.map(|_| ()),
        }
    }

    async fn execute(&self, target: &Target, command: &str) -> EngineResult<CommandOutput> {
        match target {
            Target::Local => self.local.execute(command).await,
            Target::Remote(remote) => self.ssh.execute(remote, command).await,
        }
    }

    async fn execute_streaming(
        &self,
        target: &Target,
        command: &str,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<CommandOutput> {
        match target {
            Target::Local => self.local.execute_streaming(command, sink).await,
            Target::Remote(remote) => self.ssh.execute_streaming(remote, command, sink).await,
        }
    }

    async fn disconnect(&self, target: &Target) -> EngineResult<()> {
        match target {
            Target::Local => Ok(()),
            Target::Remote(remote) => self.ssh.disconnect(remote).await,
        }
    }
}

/// Quote a value for safe interpolation into a POSIX shell command.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Command helpers bound to one target.
#[derive(Clone, Copy)]
pub struct Shell<'a> {
    channel: &'a dyn CommandChannel,
    target: &'a Target,
    secret: Option<&'a str>,
}

impl<'a> Shell<'a> {
    pub fn new(channel: &'a dyn CommandChannel, target: &'a Target) -> Self {
        Self {
            channel,
            target,
            secret: None,
        }
    }

    /// Keep `secret` out of traced commands and returned errors.
    pub fn masking(self, secret: Option<&'a str>) -> Self {
        Self { secret, ..self }
    }

    fn shown(&self, text: &str) -> String {
        match self.secret {
            Some(secret) if !secret.is_empty() => text.replace(secret, "***"),
            _ => text.to_string(),
        }
    }

    fn scrub(&self, err: EngineError) -> EngineError {
        match self.secret {
            Some(secret) => err.redact(secret),
            None => err,
        }
    }

    pub fn target(&self) -> &'a Target {
        self.target
    }

    /// Execute a command and return stdout
    pub async fn exec(&self, cmd: &str) -> EngineResult<String> {
        debug!("[{}] exec: {}", self.target, self.shown(cmd));

        let output = self
            .channel
            .execute(self.target, cmd)
            .await
            .map_err(|e| self.scrub(e))?;
        if !output.success() {
            return Err(self.scrub(EngineError::CommandExecution {
                target: self.target.to_string(),
                command: cmd.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }));
        }

        Ok(output.stdout)
    }

    /// Execute a command, returning Ok(true) if exit 0, Ok(false) otherwise
    pub async fn exec_ok(&self, cmd: &str) -> EngineResult<bool> {
        debug!("[{}] exec_ok: {}", self.target, self.shown(cmd));

        let output = self
            .channel
            .execute(self.target, cmd)
            .await
            .map_err(|e| self.scrub(e))?;
        Ok(output.success())
    }

    /// Execute a command and return its full output regardless of exit code
    pub async fn run(&self, cmd: &str) -> EngineResult<CommandOutput> {
        debug!("[{}] run: {}", self.target, self.shown(cmd));
        self.channel
            .execute(self.target, cmd)
            .await
            .map_err(|e| self.scrub(e))
    }

    pub async fn stream(&self, cmd: &str, sink: &mut LineSink<'_>) -> EngineResult<CommandOutput> {
        debug!("[{}] stream: {}", self.target, self.shown(cmd));
        self.channel
            .execute_streaming(self.target, cmd, sink)
            .await
            .map_err(|e| self.scrub(e))
    }

    pub async fn path_exists(&self, path: &str) -> EngineResult<bool> {
        self.exec_ok(&format!("test -e {}", quote(path))).await
    }

    /// Write content to a file on the target
    pub async fn write_file(&self, path: &str, content: &str) -> EngineResult<()> {
        self.exec(&format!(
            "cat > {} << 'DECKHAND_EOF'\n{}\nDECKHAND_EOF",
            quote(path),
            content.trim_end_matches('\n')
        ))
        .await?;
        Ok(())
    }

    /// Wrap a command so it runs with root privileges on the target.
    pub fn privileged(&self, cmd: &str) -> String {
        if self.target.needs_sudo() {
            format!("sudo -n bash -c {}", quote(cmd))
        } else {
            cmd.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(user: &str) -> Target {
        Target::Remote(RemoteTarget {
            host: "203.0.113.10".into(),
            port: 22,
            user: user.into(),
            auth: RemoteAuth::Agent,
        })
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("it's"), "'it'\\''s'");
        assert_eq!(quote("plain"), "'plain'");
    }

    #[test]
    fn remote_targets_are_keyed_by_user_host_and_port() {
        assert_eq!(remote("deploy").to_string(), "deploy@203.0.113.10:22");
        assert_eq!(Target::Local.to_string(), "local");
    }

    #[test]
    fn privileged_commands_use_sudo_only_for_non_root_users() {
        let channel = fake::FakeChannel::new();
        let deploy = remote("deploy");
        let root = remote("root");

        let shell = Shell::new(&channel, &deploy);
        assert_eq!(shell.privileged("mkdir -p /x"), "sudo -n bash -c 'mkdir -p /x'");

        let shell = Shell::new(&channel, &root);
        assert_eq!(shell.privileged("mkdir -p /x"), "mkdir -p /x");

        let shell = Shell::new(&channel, &Target::Local);
        assert_eq!(shell.privileged("mkdir -p /x"), "mkdir -p /x");
    }

    #[tokio::test]
    async fn exec_turns_nonzero_exit_into_command_error() {
        let channel = fake::FakeChannel::new();
        channel.fail("docker stop", "no such container");

        let shell = Shell::new(&channel, &Target::Local);
        let err = shell.exec("docker stop abc").await.unwrap_err();
        match err {
            EngineError::CommandExecution { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "no such container");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn masked_secret_stays_out_of_errors() {
        let channel = fake::FakeChannel::new();
        channel.fail("git fetch", "denied for s3cret");

        let shell = Shell::new(&channel, &Target::Local).masking(Some("s3cret"));
        let err = shell.exec("TOKEN='s3cret' git fetch").await.unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("s3cret"), "{text}");
        assert!(text.contains("TOKEN='***' git fetch"));
    }
}
