use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::RemoteTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Pending,
    Provisioning,
    Ready,
    Error,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostStatus::Pending => "pending",
            HostStatus::Provisioning => "provisioning",
            HostStatus::Ready => "ready",
            HostStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    Rhel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub family: OsFamily,
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub connection: RemoteTarget,
    pub status: HostStatus,
    /// Percent complete for the current provisioning run.
    pub progress: u8,
    #[serde(default)]
    pub logs: Vec<String>,
    pub os: Option<OsInfo>,
    /// Tool name to "present after provisioning".
    #[serde(default)]
    pub installed: BTreeMap<String, bool>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Host {
    pub fn new(name: &str, connection: RemoteTarget) -> Self {
        Self {
            name: name.to_string(),
            connection,
            status: HostStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            os: None,
            installed: BTreeMap::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Return to `pending` so provisioning can be retried.
    pub fn reset(&mut self) {
        self.status = HostStatus::Pending;
        self.progress = 0;
        self.logs.clear();
        self.installed.clear();
        self.last_error = None;
        self.updated_at = Utc::now();
    }
}
