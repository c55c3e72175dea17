//! Host bootstrap: detect the OS, run the bootstrap script while streaming
//! its progress, then validate the result independently.

pub mod os;
pub mod script;
pub mod steps;
pub mod validate;

use std::sync::Arc;

use tracing::{info, warn};

use crate::channel::{CommandChannel, OutputLine, RemoteTarget, Shell, Target};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, Observer};
use crate::model::{Host, HostStatus};
use crate::proxy::ProxySettings;
use crate::store::Store;

use script::ScriptLine;

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub install_node: bool,
    pub firewall: bool,
    /// Extra directories to create besides the project checkout root.
    pub directories: Vec<String>,
    pub work_root: String,
    pub proxy: ProxySettings,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            install_node: false,
            firewall: true,
            directories: Vec::new(),
            work_root: "/opt/deckhand".to_string(),
            proxy: ProxySettings::default(),
        }
    }
}

impl ProvisionSettings {
    pub fn required_directories(&self) -> Vec<String> {
        let mut dirs = vec![format!("{}/projects", self.work_root.trim_end_matches('/'))];
        dirs.extend(self.directories.iter().cloned());
        dirs
    }
}

/// Outcome of one provisioning run.
#[derive(Debug)]
pub struct ProvisionReport {
    pub host: Host,
    pub error: Option<EngineError>,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> bool {
        self.host.status == HostStatus::Ready
    }
}

/// Records progress into the host record and forwards it to the observer.
struct HostFeed<'a> {
    store: &'a Store,
    observer: &'a dyn Observer,
    host: &'a str,
}

impl HostFeed<'_> {
    fn update(&self, f: impl FnOnce(&mut Host)) {
        if let Err(e) = self.store.update_host(self.host, f) {
            warn!("[{}] could not record progress: {}", self.host, e);
        }
    }

    fn status(&self, status: HostStatus) {
        self.update(|h| h.status = status);
        self.observer.notify(EngineEvent::ProvisionStatus {
            host: self.host.to_string(),
            status,
        });
    }

    fn progress(&self, percent: u8, message: &str) {
        info!("[{}] {}% {}", self.host, percent, message);
        self.update(|h| h.progress = percent);
        self.observer.notify(EngineEvent::ProvisionProgress {
            host: self.host.to_string(),
            percent,
            message: message.to_string(),
        });
    }

    fn log(&self, line: &str) {
        self.update(|h| h.logs.push(line.to_string()));
        self.observer.notify(EngineEvent::ProvisionLog {
            host: self.host.to_string(),
            line: line.to_string(),
        });
    }
}

pub struct Provisioner {
    channel: Arc<dyn CommandChannel>,
    store: Store,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(channel: Arc<dyn CommandChannel>, store: Store, settings: ProvisionSettings) -> Self {
        Self {
            channel,
            store,
            settings,
        }
    }

    /// Add a host in `pending`, or update the connection of a known one.
    pub async fn register(&self, name: &str, connection: RemoteTarget) -> EngineResult<Host> {
        let host = match self.store.host(name) {
            Ok(_) => self
                .store
                .update_host(name, |h| {
                    h.connection = connection;
                    h.clone()
                })?,
            Err(_) => {
                let host = Host::new(name, connection);
                self.store.upsert_host(host.clone());
                host
            }
        };
        self.store.save().await?;
        Ok(host)
    }

    /// Run a provisioning pass. Failures end in `error` status on the host
    /// and are returned in the report, not as `Err`.
    pub async fn provision(&self, name: &str, observer: &dyn Observer) -> EngineResult<ProvisionReport> {
        let host = self.store.host(name)?;
        let target = Target::Remote(host.connection.clone());
        let feed = HostFeed {
            store: &self.store,
            observer,
            host: name,
        };

        self.store.update_host(name, |h| {
            h.reset();
            h.os = None;
        })?;
        feed.status(HostStatus::Provisioning);
        self.store.save().await?;

        let shell = Shell::new(self.channel.as_ref(), &target);
        let error = match self.run(&shell, &host.connection, &feed).await {
            Ok(()) => {
                feed.progress(100, "Host ready");
                feed.status(HostStatus::Ready);
                // Group changes only apply to new logins.
                if let Err(e) = self.channel.disconnect(&target).await {
                    warn!("[{}] could not close session: {}", name, e);
                }
                None
            }
            Err(err) => {
                warn!("[{}] provisioning failed: {}", name, err);
                let message = format!("[{}] {}", err.code(), err);
                feed.log(&message);
                self.store.update_host(name, |h| h.last_error = Some(message))?;
                feed.status(HostStatus::Error);
                Some(err)
            }
        };
        self.store.save().await?;

        Ok(ProvisionReport {
            host: self.store.host(name)?,
            error,
        })
    }

    async fn run(&self, shell: &Shell<'_>, connection: &RemoteTarget, feed: &HostFeed<'_>) -> EngineResult<()> {
        self.channel.connect(shell.target()).await?;
        feed.progress(2, "Connected");

        let os = os::detect(shell).await?;
        feed.progress(5, &format!("Detected {} {} ({:?} family)", os.id, os.version, os.family));
        let family = os.family;
        self.store.update_host(feed.host, |h| h.os = Some(os))?;

        let steps = steps::plan(family, connection, &self.settings)?;
        let script = script::render(&steps);

        let mut done = false;
        let output = shell
            .stream(&shell.privileged(&script), &mut |line: OutputLine<'_>| match line {
                OutputLine::Stdout(text) => match script::parse_line(text) {
                    ScriptLine::Progress { percent, message } => feed.progress(percent, message),
                    ScriptLine::Done => done = true,
                    ScriptLine::Log(text) => feed.log(text),
                },
                OutputLine::Stderr(text) => feed.log(text),
            })
            .await?;

        if !output.success() || !done {
            let detail = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            let tail: Vec<&str> = detail.lines().rev().take(20).collect();
            let mut stderr: String = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
            if output.success() {
                stderr = format!("bootstrap script ended without {}\n{}", script::DONE, stderr);
            }
            return Err(EngineError::CommandExecution {
                target: shell.target().to_string(),
                command: "bootstrap script".to_string(),
                exit_code: output.exit_code,
                stderr,
            });
        }

        feed.progress(95, "Validating host");
        let checks = validate::checks(&self.settings);
        let results = validate::run(shell, &checks).await?;
        let missing = validate::missing(&results, &checks);
        self.store.update_host(feed.host, |h| h.installed = results)?;

        if !missing.is_empty() {
            return Err(EngineError::ValidationFailure(missing));
        }
        Ok(())
    }

    /// Back to `pending` so provisioning can be retried.
    pub async fn reset(&self, name: &str) -> EngineResult<Host> {
        let host = self.store.update_host(name, |h| {
            h.reset();
            h.clone()
        })?;
        self.store.save().await?;
        Ok(host)
    }

    /// Close any pooled session to the host, then forget it.
    pub async fn remove(&self, name: &str) -> EngineResult<Host> {
        let host = self.store.host(name)?;
        let target = Target::Remote(host.connection.clone());
        if let Err(e) = self.channel.disconnect(&target).await {
            warn!("[{}] could not close session: {}", name, e);
        }
        let removed = self.store.remove_host(name)?;
        self.store.save().await?;
        Ok(removed)
    }
}
