//! Project registration and the operations around deploys: stop, start,
//! remove, prune, logs and update checks.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::channel::{quote, LineSink, Shell};
use crate::error::{EngineError, EngineResult};
use crate::model::{BuildSpec, Deployment, Project, ProjectStatus, SourceSpec};
use crate::naming;
use crate::ports::PortAllocator;

use super::source;
use super::steps::PROJECT_LABEL;
use super::Deployer;

/// What a tenant declares when registering a project.
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    pub name: String,
    pub source: SourceSpec,
    pub build: BuildSpec,
    pub internal_port: u16,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl Deployer {
    /// Register `spec`, reserving a port. Registering an existing name
    /// refreshes its descriptor and keeps the port it already holds.
    pub async fn register(&self, spec: ProjectSpec) -> EngineResult<Project> {
        let address = match &spec.host {
            None => self.settings.local_address.clone(),
            Some(host) => self.store.host(host)?.connection.host,
        };
        let hostname = naming::public_hostname(&spec.name, &address, &self.settings.dns_suffix);

        let _guard = self.locks.acquire(&spec.name).await;
        let project = if self.store.project(&spec.name).is_ok() {
            self.store.update_project(&spec.name, |p| {
                p.source = spec.source;
                p.build = spec.build;
                p.internal_port = spec.internal_port;
                p.host = spec.host;
                p.env = spec.env;
                p.hostname = hostname;
                p.clone()
            })?
        } else {
            let project = Project {
                service_id: naming::sanitize(&spec.name),
                name: spec.name,
                source: spec.source,
                build: spec.build,
                port: 0,
                internal_port: spec.internal_port,
                hostname,
                host: spec.host,
                env: spec.env,
                current_container: None,
                previous_container: None,
                status: ProjectStatus::Inactive,
                deployments: Vec::new(),
                commit: None,
                update_available: false,
            };
            PortAllocator::new(self.store.clone()).reserve(project, spec.port)?
        };
        self.store.save().await?;

        info!(
            "Registered {} on port {} as {}",
            project.name, project.port, project.hostname
        );
        Ok(project)
    }

    pub async fn stop(&self, name: &str) -> EngineResult<()> {
        let _guard = self.locks.acquire(name).await;
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;

        if let Some(container) = &project.current_container {
            Shell::new(self.channel.as_ref(), &target)
                .exec(&format!("docker stop {}", quote(container)))
                .await?;
        }
        self.store
            .update_project(name, |p| p.status = ProjectStatus::Inactive)?;
        self.store.save().await
    }

    pub async fn start(&self, name: &str) -> EngineResult<()> {
        let _guard = self.locks.acquire(name).await;
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;
        let container = project
            .current_container
            .as_deref()
            .ok_or_else(|| EngineError::NotFound {
                kind: "container",
                name: format!("current container of {}", name),
            })?;

        Shell::new(self.channel.as_ref(), &target)
            .exec(&format!("docker start {}", quote(container)))
            .await?;
        self.store
            .update_project(name, |p| p.status = ProjectStatus::Active)?;
        self.store.save().await
    }

    /// Tear down every container and image of the project on its target,
    /// delete the checkout, then forget the record. Routing goes with the
    /// containers since it lives in their labels.
    pub async fn remove(&self, name: &str) -> EngineResult<Project> {
        let _guard = self.locks.acquire(name).await;
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;
        let shell = Shell::new(self.channel.as_ref(), &target);
        let svc = &project.service_id;

        shell
            .exec(&format!(
                "docker ps -aq --filter label={} | xargs -r docker rm -f",
                quote(&format!("{}={}", PROJECT_LABEL, svc))
            ))
            .await?;
        shell
            .exec(&format!(
                "docker images -q {} | sort -u | xargs -r docker rmi -f",
                quote(&naming::image_repository(svc))
            ))
            .await?;
        shell
            .exec(&format!(
                "rm -rf {}",
                quote(&format!(
                    "{}/projects/{}",
                    self.settings.work_root.trim_end_matches('/'),
                    svc
                ))
            ))
            .await?;

        let removed = self.store.remove_project(name)?;
        self.store.save().await?;
        info!("Removed {} and its containers from {}", name, target);
        Ok(removed)
    }

    /// Remove containers of the project that are neither current nor previous.
    pub async fn prune(&self, name: &str) -> EngineResult<Vec<String>> {
        let _guard = self.locks.acquire(name).await;
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;
        let shell = Shell::new(self.channel.as_ref(), &target);

        let listing = shell
            .exec(&format!(
                "docker ps -aq --no-trunc --filter label={}",
                quote(&format!("{}={}", PROJECT_LABEL, project.service_id))
            ))
            .await?;

        let keep = |id: &str| {
            [&project.current_container, &project.previous_container]
                .into_iter()
                .flatten()
                .any(|k| k.starts_with(id) || id.starts_with(k.as_str()))
        };

        let stale: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !keep(*id))
            .map(str::to_string)
            .collect();

        for id in &stale {
            if let Err(e) = shell.exec(&format!("docker rm -f {}", quote(id))).await {
                warn!("[{}] could not remove {}: {}", name, id, e);
            }
        }
        Ok(stale)
    }

    /// Stream the current container's output into `sink`.
    pub async fn logs(
        &self,
        name: &str,
        lines: usize,
        follow: bool,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<()> {
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;
        let container = project
            .current_container
            .as_deref()
            .ok_or_else(|| EngineError::NotFound {
                kind: "container",
                name: format!("current container of {}", name),
            })?;

        let cmd = format!(
            "docker logs --tail {}{} {}",
            lines,
            if follow { " -f" } else { "" },
            quote(container)
        );
        Shell::new(self.channel.as_ref(), &target)
            .stream(&cmd, sink)
            .await?;
        Ok(())
    }

    pub fn releases(&self, name: &str) -> EngineResult<Vec<Deployment>> {
        Ok(self.store.project(name)?.deployments)
    }

    /// Compare the branch head on the remote with the deployed commit and
    /// record the result in the project's `update_available` flag.
    pub async fn check_updates(&self, name: &str) -> EngineResult<bool> {
        let project = self.store.project(name)?;
        let target = self.target_for(&project)?;
        let auth = &project.source.auth;

        let out = Shell::new(self.channel.as_ref(), &target)
            .masking(source::secret(auth))
            .exec(&format!(
                "{} ls-remote {} {}",
                source::git_command(auth),
                quote(&project.source.repository),
                quote(&format!("refs/heads/{}", project.source.branch))
            ))
            .await?;
        let head = out.split_whitespace().next().unwrap_or_default();

        let available = match &project.commit {
            Some(commit) => !head.is_empty() && head != commit,
            None => !head.is_empty(),
        };
        self.store
            .update_project(name, |p| p.update_available = available)?;
        self.store.save().await?;
        Ok(available)
    }
}
