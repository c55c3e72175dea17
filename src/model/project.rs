use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Inactive,
    Deploying,
    Active,
    Error,
}

impl ProjectStatus {
    /// Live projects hold their allocated port.
    pub fn is_live(&self) -> bool {
        matches!(self, ProjectStatus::Active | ProjectStatus::Deploying)
    }
}

/// Credential descriptor for fetching the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GitAuth {
    #[default]
    None,
    Token {
        #[serde(default)]
        username: Option<String>,
        token: String,
    },
    SshKey {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub auth: GitAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub start_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Deploying,
    Success,
    Failed,
}

/// One attempted deploy. Entries are appended, never reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub version: String,
    pub branch: String,
    pub commit: String,
    pub started_at: DateTime<Utc>,
    pub status: DeploymentStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    pub actor: String,
    /// Set once, when this deploy created its container.
    pub container_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Proxy service identifier and container/image name prefix.
    pub service_id: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub build: BuildSpec,
    pub port: u16,
    pub internal_port: u16,
    pub hostname: String,
    /// Registered host name; `None` deploys to the local machine.
    pub host: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub current_container: Option<String>,
    pub previous_container: Option<String>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    pub commit: Option<String>,
    #[serde(default)]
    pub update_available: bool,
}

impl Project {
    pub fn last_deployment(&self) -> Option<&Deployment> {
        self.deployments.last()
    }

    /// Find a historical deployment by full or abbreviated commit hash.
    pub fn deployment_for_commit(&self, commit: &str) -> Option<&Deployment> {
        if commit.is_empty() {
            return None;
        }
        self.deployments
            .iter()
            .rev()
            .find(|d| d.commit.starts_with(commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_and_deploying_are_live() {
        assert!(ProjectStatus::Active.is_live());
        assert!(ProjectStatus::Deploying.is_live());
        assert!(!ProjectStatus::Inactive.is_live());
        assert!(!ProjectStatus::Error.is_live());
    }

    #[test]
    fn git_auth_descriptor_parses_from_toml() {
        let auth: GitAuth = toml::from_str("type = \"token\"\ntoken = \"ghp_x\"").unwrap();
        assert_eq!(
            auth,
            GitAuth::Token {
                username: None,
                token: "ghp_x".into()
            }
        );
    }
}
