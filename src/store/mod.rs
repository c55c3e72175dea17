//! Project and host records, held in memory and persisted as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::{Host, Project};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    #[serde(default)]
    pub hosts: BTreeMap<String, Host>,
}

struct Inner {
    state: Mutex<State>,
    path: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::with_state(State::default(), None)
    }

    fn with_state(state: State, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                path,
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Load state from `path`, starting empty if the file does not exist yet.
    pub async fn open(path: &Path) -> EngineResult<Self> {
        let state = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded state from {}", path.display());
        Ok(Self::with_state(state, Some(path.to_path_buf())))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state())
    }

    /// Apply `f` atomically to the whole state (in memory only; call `save`).
    pub fn mutate<T>(&self, f: impl FnOnce(&mut State) -> EngineResult<T>) -> EngineResult<T> {
        f(&mut self.state())
    }

    pub fn project(&self, name: &str) -> EngineResult<Project> {
        self.read(|s| s.projects.get(name).cloned())
            .ok_or_else(|| EngineError::project_not_found(name))
    }

    pub fn projects(&self) -> Vec<Project> {
        self.read(|s| s.projects.values().cloned().collect())
    }

    pub fn update_project<T>(&self, name: &str, f: impl FnOnce(&mut Project) -> T) -> EngineResult<T> {
        self.mutate(|s| {
            let project = s
                .projects
                .get_mut(name)
                .ok_or_else(|| EngineError::project_not_found(name))?;
            Ok(f(project))
        })
    }

    pub fn remove_project(&self, name: &str) -> EngineResult<Project> {
        self.mutate(|s| {
            s.projects
                .remove(name)
                .ok_or_else(|| EngineError::project_not_found(name))
        })
    }

    pub fn host(&self, name: &str) -> EngineResult<Host> {
        self.read(|s| s.hosts.get(name).cloned())
            .ok_or_else(|| EngineError::host_not_found(name))
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.read(|s| s.hosts.values().cloned().collect())
    }

    pub fn upsert_host(&self, host: Host) {
        self.state().hosts.insert(host.name.clone(), host);
    }

    pub fn update_host<T>(&self, name: &str, f: impl FnOnce(&mut Host) -> T) -> EngineResult<T> {
        self.mutate(|s| {
            let host = s
                .hosts
                .get_mut(name)
                .ok_or_else(|| EngineError::host_not_found(name))?;
            host.updated_at = chrono::Utc::now();
            Ok(f(host))
        })
    }

    pub fn remove_host(&self, name: &str) -> EngineResult<Host> {
        self.mutate(|s| {
            s.hosts
                .remove(name)
                .ok_or_else(|| EngineError::host_not_found(name))
        })
    }

    /// Persist a snapshot. Writes are serialized and atomic (temp file + rename).
    pub async fn save(&self) -> EngineResult<()> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };

        let _guard = self.inner.write_lock.lock().await;
        let content = serde_json::to_string_pretty(&*self.state())?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use crate::model::{BuildSpec, GitAuth, Project, ProjectStatus, SourceSpec};

    pub fn project(name: &str, port: u16, status: ProjectStatus) -> Project {
        Project {
            name: name.to_string(),
            service_id: name.to_string(),
            source: SourceSpec {
                repository: format!("https://git.example.com/acme/{}.git", name),
                branch: "main".to_string(),
                auth: GitAuth::None,
            },
            build: BuildSpec::default(),
            port,
            internal_port: 8080,
            hostname: format!("{}.127-0-0-1.sslip.io", name),
            host: None,
            env: BTreeMap::new(),
            current_container: None,
            previous_container: None,
            status,
            deployments: Vec::new(),
            commit: None,
            update_available: false,
        }
    }
}
