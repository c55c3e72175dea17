use chrono::Utc;
use tracing::{debug, info};

use crate::events::{EngineEvent, Observer};
use crate::model::Project;
use crate::naming;

use super::phase::DeployPhase;
use super::source;
use super::DeploySettings;

/// Mutable state of one deploy attempt.
pub struct DeployContext<'a> {
    /// Project as it was when the attempt started.
    pub project: Project,
    pub requested_ref: String,
    pub actor: String,
    pub is_local: bool,
    pub settings: &'a DeploySettings,
    pub stamp: String,

    pub phase: DeployPhase,
    pub branch: String,
    pub commit: Option<String>,
    pub version: Option<String>,
    pub image: Option<String>,
    pub network: Option<String>,
    pub new_container: Option<String>,
    pub stopped_previous: bool,

    observer: &'a dyn Observer,
    logs: Vec<String>,
}

impl<'a> DeployContext<'a> {
    pub fn new(
        project: Project,
        requested_ref: &str,
        actor: &str,
        is_local: bool,
        settings: &'a DeploySettings,
        observer: &'a dyn Observer,
    ) -> Self {
        let branch = project.source.branch.clone();
        Self {
            project,
            requested_ref: requested_ref.to_string(),
            actor: actor.to_string(),
            is_local,
            settings,
            stamp: Utc::now().format("%Y%m%d%H%M%S").to_string(),
            phase: DeployPhase::Idle,
            branch,
            commit: None,
            version: None,
            image: None,
            network: None,
            new_container: None,
            stopped_previous: false,
            observer,
            logs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn service_id(&self) -> &str {
        &self.project.service_id
    }

    pub fn source_dir(&self) -> String {
        format!(
            "{}/projects/{}/source",
            self.settings.work_root.trim_end_matches('/'),
            self.project.service_id
        )
    }

    pub fn short_commit(&self) -> &str {
        self.commit.as_deref().map(naming::short_commit).unwrap_or("unknown")
    }

    pub fn enter(&mut self, phase: DeployPhase) {
        debug_assert!(
            self.phase.can_transition_to(phase),
            "invalid deploy transition {:?} -> {:?}",
            self.phase,
            phase
        );
        self.phase = phase;
        self.observer.notify(EngineEvent::DeployPhase {
            project: self.project.name.clone(),
            phase,
        });
    }

    /// Progress line for the project's log stream.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = source::redact(&self.project.source.auth, &line.into());
        info!("[{}] {}", self.project.name, line);
        self.push(line);
    }

    /// Raw command output, kept in the record but only traced at debug level.
    pub fn log_output(&mut self, line: &str) {
        let line = source::redact(&self.project.source.auth, line);
        debug!("[{}] | {}", self.project.name, line);
        self.push(line);
    }

    fn push(&mut self, line: String) {
        self.observer.notify(EngineEvent::DeployLog {
            project: self.project.name.clone(),
            line: line.clone(),
        });
        self.logs.push(line);
    }

    pub fn take_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs)
    }
}
