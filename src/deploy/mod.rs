//! Deployment pipeline: fetch, build, swap, verify, then commit or roll back.
//!
//! A deploy never returns `Err` for a failed phase. Phase failures become a
//! failed `Deployment` record and a `DeployReport` whose phase is
//! `RolledBack`; only precondition failures (unknown project, store I/O)
//! surface as errors.

pub mod context;
pub mod lifecycle;
pub mod phase;
pub mod recovery;
pub mod source;
pub mod steps;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::channel::{CommandChannel, Shell, Target};
use crate::error::{EngineError, EngineResult};
use crate::events::Observer;
use crate::model::{Deployment, DeploymentStatus, Project, ProjectStatus};
use crate::proxy::ProxySettings;
use crate::store::Store;

use context::DeployContext;
use phase::DeployPhase;
use recovery::RestorePrevious;

#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Upper bound on waiting for the new container to report `running`.
    pub timeout: Duration,
    pub interval: Duration,
    /// Extra wait before the container is re-checked during verification.
    pub settle: Duration,
    pub probe: bool,
    pub probe_attempts: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
            settle: Duration::from_secs(3),
            probe: true,
            probe_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Directory on every target under which project checkouts live.
    pub work_root: String,
    pub proxy: ProxySettings,
    pub health: HealthSettings,
    pub dns_suffix: String,
    /// Address used in hostnames of projects deployed to the local machine.
    pub local_address: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            work_root: "/opt/deckhand".to_string(),
            proxy: ProxySettings::default(),
            health: HealthSettings::default(),
            dns_suffix: "sslip.io".to_string(),
            local_address: "127.0.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub project: String,
    /// Tag, branch or commit. Defaults to the project's configured branch.
    pub git_ref: Option<String>,
    pub actor: String,
}

impl DeployRequest {
    pub fn new(project: &str, actor: &str) -> Self {
        Self {
            project: project.to_string(),
            git_ref: None,
            actor: actor.to_string(),
        }
    }

    pub fn at(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }
}

/// Outcome of one deploy attempt.
#[derive(Debug)]
pub struct DeployReport {
    pub project: String,
    pub phase: DeployPhase,
    pub deployment: Deployment,
    pub error: Option<EngineError>,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.phase == DeployPhase::Committed
    }
}

/// One async mutex per project name.
#[derive(Default)]
pub(crate) struct ProjectLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProjectLocks {
    pub(crate) async fn acquire(&self, project: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(project.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Deployer {
    pub(crate) channel: Arc<dyn CommandChannel>,
    pub(crate) store: Store,
    pub(crate) settings: DeploySettings,
    pub(crate) locks: ProjectLocks,
}

impl Deployer {
    pub fn new(channel: Arc<dyn CommandChannel>, store: Store, settings: DeploySettings) -> Self {
        Self {
            channel,
            store,
            settings,
            locks: ProjectLocks::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn settings(&self) -> &DeploySettings {
        &self.settings
    }

    /// Where `project` runs: its registered host, or the local machine.
    pub fn target_for(&self, project: &Project) -> EngineResult<Target> {
        match &project.host {
            None => Ok(Target::Local),
            Some(name) => Ok(Target::Remote(self.store.host(name)?.connection)),
        }
    }

    pub async fn deploy(
        &self,
        request: &DeployRequest,
        observer: &dyn Observer,
    ) -> EngineResult<DeployReport> {
        let _guard = self.locks.acquire(&request.project).await;
        self.deploy_locked(request, observer).await
    }

    /// Deploy with the project's lock already held by the caller.
    pub(crate) async fn deploy_locked(
        &self,
        request: &DeployRequest,
        observer: &dyn Observer,
    ) -> EngineResult<DeployReport> {
        let project = self.store.project(&request.project)?;
        let target = self.target_for(&project)?;
        let requested = request
            .git_ref
            .clone()
            .unwrap_or_else(|| project.source.branch.clone());

        info!(
            "Deploying {} ({}) to {} as {}",
            project.name, requested, target, request.actor
        );

        let record = Deployment {
            version: requested.clone(),
            branch: project.source.branch.clone(),
            commit: String::new(),
            started_at: Utc::now(),
            status: DeploymentStatus::Deploying,
            logs: Vec::new(),
            actor: request.actor.clone(),
            container_id: None,
        };
        let index = self.store.update_project(&project.name, |p| {
            p.status = ProjectStatus::Deploying;
            p.deployments.push(record);
            p.deployments.len() - 1
        })?;
        self.store.save().await?;

        let secret = source::secret(&project.source.auth).map(str::to_string);
        let shell = Shell::new(self.channel.as_ref(), &target).masking(secret.as_deref());
        let mut ctx = DeployContext::new(
            project,
            &requested,
            &request.actor,
            target.is_local(),
            &self.settings,
            observer,
        );

        let report = match self.pipeline(&shell, &mut ctx).await {
            Ok(()) => self.commit(&mut ctx, index)?,
            Err(err) => self.roll_back(&shell, &mut ctx, index, err).await?,
        };
        self.store.save().await?;
        Ok(report)
    }

    async fn pipeline(&self, shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
        ctx.enter(DeployPhase::Fetching);
        self.channel.connect(shell.target()).await?;
        steps::fetch(shell, ctx).await?;

        ctx.enter(DeployPhase::ConfiguringBuild);
        steps::configure_build(shell, ctx).await?;

        ctx.enter(DeployPhase::Building);
        steps::build_image(shell, ctx).await?;

        ctx.enter(DeployPhase::Swapping);
        steps::swap(shell, ctx).await?;

        ctx.enter(DeployPhase::Verifying);
        steps::verify(shell, ctx).await?;

        Ok(())
    }

    fn commit(&self, ctx: &mut DeployContext<'_>, index: usize) -> EngineResult<DeployReport> {
        ctx.enter(DeployPhase::Committed);
        let version = ctx.version.clone().unwrap_or_else(|| ctx.requested_ref.clone());
        ctx.log(format!("Deployed {} ({})", version, ctx.short_commit()));

        let old = ctx.project.current_container.clone();
        let new = ctx.new_container.clone();
        let commit = ctx.commit.clone().unwrap_or_default();
        let branch = ctx.branch.clone();
        let logs = ctx.take_logs();

        let deployment = self.store.update_project(ctx.name(), |p| {
            p.previous_container = old;
            p.current_container = new.clone();
            p.commit = Some(commit.clone());
            p.status = ProjectStatus::Active;
            p.update_available = false;

            let d = &mut p.deployments[index];
            d.version = version;
            d.branch = branch;
            d.commit = commit;
            d.status = DeploymentStatus::Success;
            d.logs = logs;
            d.container_id = new;
            d.clone()
        })?;

        Ok(DeployReport {
            project: ctx.name().to_string(),
            phase: DeployPhase::Committed,
            deployment,
            error: None,
        })
    }

    /// Record the failure, stop the half-deployed container and try to bring
    /// the previous one back. The current pointer is never moved here.
    async fn roll_back(
        &self,
        shell: &Shell<'_>,
        ctx: &mut DeployContext<'_>,
        index: usize,
        err: EngineError,
    ) -> EngineResult<DeployReport> {
        let err = source::redact_error(&ctx.project.source.auth, err);
        warn!("[{}] deploy failed in {:?}: {}", ctx.name(), ctx.phase, err);
        let failed_in = ctx.phase;
        ctx.enter(DeployPhase::RolledBack);
        ctx.log(format!(
            "Deploy failed while {} [{}]: {}",
            failed_in.label(),
            err.code(),
            err
        ));

        if let Some(id) = ctx.new_container.clone() {
            recovery::stop_quietly(shell, ctx, &id).await;
        }

        let restored = match ctx.project.current_container.clone() {
            Some(previous) => {
                RestorePrevious::for_target(shell.target())
                    .restore(shell, ctx, &previous)
                    .await
            }
            None => false,
        };

        let status = if restored {
            ProjectStatus::Active
        } else {
            ProjectStatus::Error
        };
        let version = ctx.version.clone().unwrap_or_else(|| ctx.requested_ref.clone());
        let commit = ctx.commit.clone().unwrap_or_default();
        let branch = ctx.branch.clone();
        let container = ctx.new_container.clone();
        let logs = ctx.take_logs();

        let deployment = self.store.update_project(ctx.name(), |p| {
            p.status = status;
            let d = &mut p.deployments[index];
            d.version = version;
            d.branch = branch;
            d.commit = commit;
            d.status = DeploymentStatus::Failed;
            d.logs = logs;
            d.container_id = container;
            d.clone()
        })?;

        Ok(DeployReport {
            project: ctx.name().to_string(),
            phase: DeployPhase::RolledBack,
            deployment,
            error: Some(err),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::channel::fake::FakeChannel;
    use crate::events::testing::RecordingObserver;
    use crate::events::testing::NullObserver;
    use crate::events::EngineEvent;
    use crate::model::GitAuth;
    use crate::store::testing::project;

    fn phases(observer: &RecordingObserver) -> Vec<DeployPhase> {
        observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::DeployPhase { phase, .. } => Some(phase),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn first_deploy_commits_without_previous_container() {
        let (deployer, fake) =
            deployer(healthy_channel(), vec![project("api", 3000, ProjectStatus::Inactive)]);
        let observer = RecordingObserver::default();

        let report = deployer
            .deploy(&DeployRequest::new("api", "alice"), &observer)
            .await
            .unwrap();

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(
            phases(&observer),
            vec![
                DeployPhase::Fetching,
                DeployPhase::ConfiguringBuild,
                DeployPhase::Building,
                DeployPhase::Swapping,
                DeployPhase::Verifying,
                DeployPhase::Committed,
            ]
        );

        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.current_container.as_deref(), Some(NEW_ID));
        assert_eq!(p.previous_container, None);
        assert_eq!(p.status, ProjectStatus::Active);
        assert_eq!(p.commit.as_deref(), Some(COMMIT));
        assert_eq!(p.deployments.len(), 1);
        assert_eq!(p.deployments[0].status, DeploymentStatus::Success);
        assert_eq!(p.deployments[0].version, "3f2c1b0");
        assert_eq!(p.deployments[0].actor, "alice");
        assert!(!p.deployments[0].logs.is_empty());

        assert!(fake.ran("docker build -t deckhand/api:3f2c1b0"));
        assert!(fake.ran("-p 3000:8080"));
        assert!(fake.ran("traefik.http.routers.api.rule=Host(`api.127-0-0-1.sslip.io`)"));
        assert!(fake.ran("deckhand.project=api"));
        assert!(!fake.ran("docker stop"));
    }

    const INTERIM_ID: &str = "1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a";

    #[tokio::test]
    async fn redeploy_keeps_old_container_stopped_as_previous() {
        let mut existing = project("api", 3000, ProjectStatus::Active);
        existing.current_container = Some("old-container".to_string());
        let fake = FakeChannel::new();
        fake.once("docker ps -q --filter publish=3000", "old-container\n")
            .once("docker run -d", &format!("{}\n", INTERIM_ID))
            .on("docker run -d", &format!("{}\n", NEW_ID))
            .on("git rev-parse HEAD", COMMIT)
            .on(".State.Status", "running\n");
        let (deployer, fake) = deployer(fake, vec![existing]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert!(report.succeeded(), "{:?}", report.error);
        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.current_container.as_deref(), Some(NEW_ID));
        assert_eq!(p.previous_container.as_deref(), Some("old-container"));

        let first_run = fake.position("docker run -d").unwrap();
        let stop = fake.position("docker stop 'old-container'").unwrap();
        assert!(first_run < stop, "old container stopped before the new one ran");
        assert!(!fake.calls()[first_run].contains("-p 3000:8080"));
        assert!(!fake.ran("docker rm -f 'old-container'"));
    }

    #[tokio::test]
    async fn port_is_rebound_once_the_old_container_stops() {
        let mut existing = project("api", 3000, ProjectStatus::Active);
        existing.current_container = Some("old-container".to_string());
        let fake = FakeChannel::new();
        fake.once("docker ps -q --filter publish=3000", "old-container\n")
            .once("docker run -d", &format!("{}\n", INTERIM_ID))
            .on("docker run -d", &format!("{}\n", NEW_ID))
            .on("git rev-parse HEAD", COMMIT)
            .on(".State.Status", "running\n");
        let (deployer, fake) = deployer(fake, vec![existing]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(fake.count("docker run -d"), 2);
        let stop = fake.position("docker stop 'old-container'").unwrap();
        let bound = fake.position("-p 3000:8080").unwrap();
        let removed = fake.position(&format!("docker rm -f '{}'", INTERIM_ID)).unwrap();
        assert!(stop < bound && bound < removed);
        assert!(fake.calls()[bound].contains("--name api-3f2c1b0-"));
        assert_eq!(
            deployer.store().project("api").unwrap().deployments[0].container_id.as_deref(),
            Some(NEW_ID)
        );
    }

    #[tokio::test]
    async fn port_held_by_a_foreign_container_stays_unbound() {
        let mut existing = project("api", 3000, ProjectStatus::Active);
        existing.current_container = Some("old-container".to_string());
        let fake = healthy_channel();
        fake.on("docker ps -q --filter publish=3000", "someone-else\n");
        let (deployer, fake) = deployer(fake, vec![existing]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(fake.count("docker run -d"), 1);
        assert!(!fake.ran("-p 3000:8080"));
        assert!(report
            .deployment
            .logs
            .iter()
            .any(|l| l.contains("serving through the proxy only")));
        assert_eq!(
            deployer.store().project("api").unwrap().current_container.as_deref(),
            Some(NEW_ID)
        );
    }

    #[tokio::test]
    async fn git_token_stays_out_of_errors_logs_and_remote_url() {
        let mut existing = project("api", 3000, ProjectStatus::Inactive);
        existing.source.auth = GitAuth::Token {
            username: None,
            token: "s3cretTOKEN".into(),
        };
        let fake = healthy_channel();
        fake.fail("fetch --quiet", "fatal: authentication failed for s3cretTOKEN");
        let (deployer, fake) = deployer(fake, vec![existing]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        let err = report.error.expect("fetch should fail");
        assert_eq!(err.code(), "CommandExecutionError");
        let text = err.to_string();
        assert!(!text.contains("s3cretTOKEN"), "{text}");
        assert!(text.contains("DECKHAND_GIT_TOKEN='***'"));

        let p = deployer.store().project("api").unwrap();
        assert!(p.deployments[0].logs.iter().all(|l| !l.contains("s3cretTOKEN")));
        assert!(fake.ran("git remote set-url origin 'https://git.example.com/acme/api.git'"));
        assert!(!fake.ran("s3cretTOKEN@"));
    }

    #[tokio::test]
    async fn failed_build_rolls_back_and_keeps_current_pointer() {
        let mut existing = project("api", 3000, ProjectStatus::Active);
        existing.current_container = Some("old-container".to_string());
        existing.previous_container = Some("older-container".to_string());
        let fake = FakeChannel::new();
        fake.exit("docker build", 1, "Step 1/4\n", "npm ERR! missing script: build\n");
        fake.on("git rev-parse HEAD", COMMIT);
        fake.on(".State.Status", "running");
        let (deployer, fake) = deployer(fake, vec![existing]);
        let observer = RecordingObserver::default();

        let report = deployer
            .deploy(&DeployRequest::new("api", "bob"), &observer)
            .await
            .unwrap();

        assert_eq!(report.phase, DeployPhase::RolledBack);
        assert!(matches!(
            report.error,
            Some(EngineError::BuildFailure { exit_code: 1, .. })
        ));
        assert_eq!(phases(&observer).last(), Some(&DeployPhase::RolledBack));

        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.current_container.as_deref(), Some("old-container"));
        assert_eq!(p.previous_container.as_deref(), Some("older-container"));
        assert_eq!(p.status, ProjectStatus::Active);
        assert_eq!(p.deployments.len(), 1);
        let d = &p.deployments[0];
        assert_eq!(d.status, DeploymentStatus::Failed);
        assert_eq!(d.container_id, None);
        assert!(d.logs.iter().any(|l| l.contains("BuildFailure")));
        assert!(!fake.ran("docker run"));
    }

    #[tokio::test]
    async fn container_that_exits_is_a_start_failure() {
        let fake = FakeChannel::new();
        fake.on("git rev-parse HEAD", COMMIT)
            .on("docker run -d", NEW_ID)
            .on(".State.Status", "exited\n")
            .on("docker logs", "Error: Cannot find module 'server.js'\n");
        let (deployer, fake) =
            deployer(fake, vec![project("api", 3000, ProjectStatus::Inactive)]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        match report.error {
            Some(EngineError::ContainerStartFailure(msg)) => {
                assert!(msg.contains("Cannot find module"))
            }
            other => panic!("unexpected {:?}", other),
        }
        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.current_container, None);
        assert_eq!(p.status, ProjectStatus::Error);
        assert_eq!(p.deployments[0].container_id.as_deref(), Some(NEW_ID));
        assert!(fake.ran(&format!("docker stop '{}'", NEW_ID)));
    }

    #[tokio::test]
    async fn container_stuck_starting_times_out() {
        let fake = FakeChannel::new();
        fake.on("git rev-parse HEAD", COMMIT)
            .on("docker run -d", NEW_ID)
            .on(".State.Status", "created\n");
        let (deployer, _fake) =
            deployer(fake, vec![project("api", 3000, ProjectStatus::Inactive)]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert!(matches!(
            report.error,
            Some(EngineError::HealthCheckTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_host_is_recorded_as_connection_failure() {
        let (deployer, _fake) = deployer(
            FakeChannel::unreachable(),
            vec![project("api", 3000, ProjectStatus::Inactive)],
        );

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert_eq!(report.phase, DeployPhase::RolledBack);
        assert_eq!(report.error.as_ref().map(|e| e.code()), Some("ConnectionError"));
        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.deployments[0].status, DeploymentStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_project_is_an_error_not_a_report() {
        let (deployer, _fake) = deployer(FakeChannel::new(), vec![]);
        let err = deployer
            .deploy(&DeployRequest::new("ghost", "ci"), &NullObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "project", .. }));
    }

    #[tokio::test]
    async fn missing_branch_falls_back_to_default() {
        let fake = healthy_channel();
        fake.exit("--exit-code --heads origin 'feature'", 2, "", "");
        fake.on(
            "--symref origin HEAD",
            "ref: refs/heads/trunk\tHEAD\n3f2c1b0a\tHEAD\n",
        );
        let (deployer, fake) =
            deployer(fake, vec![project("api", 3000, ProjectStatus::Inactive)]);
        let observer = RecordingObserver::default();

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci").at("feature"), &observer)
            .await
            .unwrap();

        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(report.deployment.branch, "trunk");
        assert!(fake.ran("checkout --quiet --force --detach 'origin/trunk'"));
        assert!(observer
            .deploy_lines()
            .iter()
            .any(|l| l.contains("falling back to default branch 'trunk'")));
    }

    #[tokio::test]
    async fn tag_deploys_are_versioned_by_tag() {
        let (deployer, fake) =
            deployer(healthy_channel(), vec![project("api", 3000, ProjectStatus::Inactive)]);

        let report = deployer
            .deploy(&DeployRequest::new("api", "ci").at("v1.4.0"), &NullObserver)
            .await
            .unwrap();

        assert_eq!(report.deployment.version, "v1.4.0");
        assert!(fake.ran("--detach 'tags/v1.4.0'"));
    }

    #[tokio::test]
    async fn existing_dockerfile_is_not_replaced() {
        let fake = healthy_channel();
        fake.on("test -e '/srv/deckhand/projects/api/source/Dockerfile'", "");
        let (deployer, fake) =
            deployer(fake, vec![project("api", 3000, ProjectStatus::Inactive)]);

        deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        assert!(!fake.ran("DECKHAND_EOF"));
    }

    #[tokio::test]
    async fn generated_recipe_is_written_when_dockerfile_missing() {
        let fake = healthy_channel();
        fake.exit("test -e '/srv/deckhand/projects/api/source/Dockerfile'", 1, "", "");
        let (deployer, fake) =
            deployer(fake, vec![project("api", 3000, ProjectStatus::Inactive)]);

        deployer
            .deploy(&DeployRequest::new("api", "ci"), &NullObserver)
            .await
            .unwrap();

        let calls = fake.calls();
        let write = calls.iter().find(|c| c.contains("DECKHAND_EOF")).unwrap();
        assert!(write.contains("FROM node"));
    }

    #[tokio::test]
    async fn concurrent_deploys_of_one_project_are_serialized() {
        let (deployer, _fake) =
            deployer(healthy_channel(), vec![project("api", 3000, ProjectStatus::Inactive)]);
        let deployer = Arc::new(deployer);

        let a = {
            let d = deployer.clone();
            tokio::spawn(async move { d.deploy(&DeployRequest::new("api", "a"), &NullObserver).await })
        };
        let b = {
            let d = deployer.clone();
            tokio::spawn(async move { d.deploy(&DeployRequest::new("api", "b"), &NullObserver).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let p = deployer.store().project("api").unwrap();
        assert_eq!(p.deployments.len(), 2);
        assert!(p
            .deployments
            .iter()
            .all(|d| d.status == DeploymentStatus::Success));
        // The second deploy saw the first one's container as current.
        assert_eq!(p.previous_container.as_deref(), Some(NEW_ID));
    }
}
