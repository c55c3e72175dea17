use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::{RemoteAuth, RemoteTarget};
use crate::deploy::lifecycle::ProjectSpec;
use crate::deploy::{DeploySettings, HealthSettings};
use crate::model::{BuildSpec, GitAuth, SourceSpec};
use crate::provision::ProvisionSettings;
use crate::proxy::ProxySettings;

mod validate;

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct DeckhandConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Where project and host records are kept. Defaults to the user's data dir.
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_work_root")]
    pub work_root: String,
    #[serde(default = "default_dns_suffix")]
    pub dns_suffix: String,
    #[serde(default = "default_local_address")]
    pub local_address: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            work_root: default_work_root(),
            dns_suffix: default_dns_suffix(),
            local_address: default_local_address(),
        }
    }
}

fn default_work_root() -> String {
    "/opt/deckhand".to_string()
}

fn default_dns_suffix() -> String {
    "sslip.io".to_string()
}

fn default_local_address() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_container")]
    pub container: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    #[serde(default = "default_proxy_image")]
    pub image: String,
    pub acme_email: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            container: default_proxy_container(),
            network: default_network(),
            entrypoint: default_entrypoint(),
            image: default_proxy_image(),
            acme_email: None,
        }
    }
}

fn default_proxy_container() -> String {
    "traefik".to_string()
}
fn default_network() -> String {
    "deckhand".to_string()
}
fn default_entrypoint() -> String {
    "web".to_string()
}
fn default_proxy_image() -> String {
    "traefik:v3.1".to_string()
}

/// Durations in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_timeout")]
    pub timeout: u64,
    #[serde(default = "default_health_interval")]
    pub interval: u64,
    #[serde(default = "default_health_settle")]
    pub settle: u64,
    #[serde(default = "default_true")]
    pub probe: bool,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: default_health_timeout(),
            interval: default_health_interval(),
            settle: default_health_settle(),
            probe: true,
            probe_attempts: default_probe_attempts(),
        }
    }
}

fn default_health_timeout() -> u64 {
    60
}
fn default_health_interval() -> u64 {
    2
}
fn default_health_settle() -> u64 {
    3
}
fn default_probe_attempts() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub install_node: bool,
    #[serde(default = "default_true")]
    pub firewall: bool,
    #[serde(default)]
    pub directories: Vec<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            install_node: false,
            firewall: true,
            directories: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HostConfig {
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// Private key file. Without it the ssh agent and default identities are used.
    pub key: Option<PathBuf>,
    pub password: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_user() -> String {
    "deploy".to_string()
}

impl HostConfig {
    pub fn remote_target(&self) -> RemoteTarget {
        let auth = match (&self.key, &self.password) {
            (Some(path), _) => RemoteAuth::Key { path: path.clone() },
            (None, Some(password)) => RemoteAuth::Password {
                password: password.clone(),
            },
            (None, None) => RemoteAuth::Agent,
        };
        RemoteTarget {
            host: self.address.clone(),
            port: self.port,
            user: self.user.clone(),
            auth,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProjectConfig {
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub auth: GitAuth,
    pub build_command: Option<String>,
    pub start_command: Option<String>,
    #[serde(default = "default_internal_port")]
    pub internal_port: u16,
    /// Preferred public port; the lowest free one is used when absent or taken.
    pub port: Option<u16>,
    /// Name of a `[hosts.*]` entry. Absent means the local machine.
    pub host: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_internal_port() -> u16 {
    3000
}

impl DeckhandConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        validate::validate(&config)?;
        Ok(config)
    }

    /// Missing config is not an error: everything has a default.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn state_path(&self) -> PathBuf {
        match &self.engine.state_file {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("deckhand")
                .join("state.json"),
        }
    }

    pub fn host(&self, name: &str) -> Result<&HostConfig> {
        self.hosts
            .get(name)
            .with_context(|| format!("Host '{}' not found in config", name))
    }

    pub fn project(&self, name: &str) -> Result<&ProjectConfig> {
        self.projects
            .get(name)
            .with_context(|| format!("Project '{}' not found in config", name))
    }

    pub fn project_spec(&self, name: &str) -> Result<ProjectSpec> {
        let project = self.project(name)?;
        Ok(ProjectSpec {
            name: name.to_string(),
            source: SourceSpec {
                repository: project.repository.clone(),
                branch: project.branch.clone(),
                auth: project.auth.clone(),
            },
            build: BuildSpec {
                build_command: project.build_command.clone(),
                start_command: project.start_command.clone(),
            },
            internal_port: project.internal_port,
            port: project.port,
            host: project.host.clone(),
            env: project.env.clone(),
        })
    }

    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            container: self.proxy.container.clone(),
            network: self.proxy.network.clone(),
            entrypoint: self.proxy.entrypoint.clone(),
            image: self.proxy.image.clone(),
            acme_email: self.proxy.acme_email.clone(),
        }
    }

    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            work_root: self.engine.work_root.clone(),
            proxy: self.proxy_settings(),
            health: HealthSettings {
                timeout: Duration::from_secs(self.health.timeout),
                interval: Duration::from_secs(self.health.interval),
                settle: Duration::from_secs(self.health.settle),
                probe: self.health.probe,
                probe_attempts: self.health.probe_attempts,
            },
            dns_suffix: self.engine.dns_suffix.clone(),
            local_address: self.engine.local_address.clone(),
        }
    }

    pub fn provision_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            install_node: self.provision.install_node,
            firewall: self.provision.firewall,
            directories: self.provision.directories.clone(),
            work_root: self.engine.work_root.clone(),
            proxy: self.proxy_settings(),
        }
    }
}
