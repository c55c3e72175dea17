//! Fast rollback (pointer swap between retained containers) and full
//! rollback (redeploy of a historical commit).

use tracing::{info, warn};

use crate::channel::{quote, Shell};
use crate::deploy::{DeployReport, DeployRequest, Deployer};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, Observer};
use crate::model::ProjectStatus;

fn short(id: &str) -> &str {
    &id[..12.min(id.len())]
}

/// Container pointers after a fast rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub current: String,
    pub previous: Option<String>,
}

/// Writes rollback progress to the project's log stream.
struct RollbackLog<'a> {
    project: &'a str,
    observer: &'a dyn Observer,
}

impl RollbackLog<'_> {
    fn line(&self, line: String) {
        info!("[{}] {}", self.project, line);
        self.observer.notify(EngineEvent::DeployLog {
            project: self.project.to_string(),
            line,
        });
    }
}

impl Deployer {
    /// Stop the current container, start the previous one and swap the two
    /// pointers. No image is rebuilt. Running it twice restores the original
    /// pair.
    pub async fn fast_rollback(
        &self,
        name: &str,
        observer: &dyn Observer,
    ) -> EngineResult<RollbackOutcome> {
        let _guard = self.locks.acquire(name).await;
        let log = RollbackLog {
            project: name,
            observer,
        };

        let result = self.swap_back(name, &log).await;
        if let Err(err) = &result {
            log.line(format!("Rollback failed [{}]: {}", err.code(), err));
        }
        result
    }

    async fn swap_back(&self, name: &str, log: &RollbackLog<'_>) -> EngineResult<RollbackOutcome> {
        let project = self.store.project(name)?;
        let previous = project
            .previous_container
            .clone()
            .ok_or_else(|| EngineError::NoRollbackTarget(name.to_string()))?;
        let target = self.target_for(&project)?;
        let shell = Shell::new(self.channel.as_ref(), &target);

        if let Some(current) = &project.current_container {
            log.line(format!("Stopping {}", short(current)));
            shell.exec(&format!("docker stop {}", quote(current))).await?;
        }

        log.line(format!("Starting {}", short(&previous)));
        if let Err(err) = shell.exec(&format!("docker start {}", quote(&previous))).await {
            if let Some(current) = &project.current_container {
                log.line(format!("Restarting {}", short(current)));
                if let Err(e) = shell.exec(&format!("docker start {}", quote(current))).await {
                    warn!("[{}] could not restart {}: {}", name, current, e);
                    log.line(format!("Could not restart {}: {}", short(current), e));
                    self.store
                        .update_project(name, |p| p.status = ProjectStatus::Error)?;
                    self.store.save().await?;
                }
            }
            return Err(err);
        }

        let outcome = self.store.update_project(name, |p| {
            p.previous_container = p.current_container.take();
            p.current_container = Some(previous.clone());
            p.status = ProjectStatus::Active;
            RollbackOutcome {
                current: previous,
                previous: p.previous_container.clone(),
            }
        })?;
        self.store.save().await?;

        log.line(format!("Rolled back to {}", short(&outcome.current)));
        Ok(outcome)
    }

    /// Redeploy the commit of a past deployment through the full pipeline.
    /// Accepts an abbreviated hash.
    pub async fn full_rollback(
        &self,
        name: &str,
        commit: &str,
        actor: &str,
        observer: &dyn Observer,
    ) -> EngineResult<DeployReport> {
        let _guard = self.locks.acquire(name).await;
        let project = self.store.project(name)?;
        let deployment = project
            .deployment_for_commit(commit)
            .filter(|d| !d.commit.is_empty())
            .ok_or_else(|| EngineError::NotFound {
                kind: "deployment",
                name: format!("{}@{}", name, commit),
            })?;

        info!(
            "[{}] redeploying {} ({})",
            name, deployment.version, deployment.commit
        );
        let request = DeployRequest::new(name, actor).at(deployment.commit.clone());
        self.deploy_locked(&request, observer).await
    }
}
