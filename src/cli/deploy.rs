use anyhow::{bail, Result};

use super::{actor, project, Engine};
use crate::deploy::{DeployReport, DeployRequest};
use crate::naming;
use crate::output;

pub async fn run(
    engine: &Engine,
    name: &str,
    git_ref: Option<String>,
    actor_name: Option<String>,
    verbose: bool,
) -> Result<()> {
    project::ensure_registered(engine, name).await?;

    let mut request = DeployRequest::new(name, &actor(actor_name));
    if let Some(r) = git_ref {
        request = request.at(r);
    }

    output::header(&format!(
        "Deploying {} ({})",
        name,
        request.git_ref.as_deref().unwrap_or("configured branch")
    ));

    let observer = output::observer(verbose);
    let report = engine.deployer.deploy(&request, observer.as_ref()).await?;
    summarize(engine, &report)
}

pub fn summarize(engine: &Engine, report: &DeployReport) -> Result<()> {
    let deployment = &report.deployment;
    if let Some(err) = &report.error {
        println!();
        for line in deployment.logs.iter().rev().take(15).rev() {
            println!("  {}", line);
        }
        output::error(&format!("[{}] {}", err.code(), err));
        if let Ok(project) = engine.store.project(&report.project) {
            if project.current_container.is_some() {
                output::warning("The previously running version was kept in place");
            }
        }
        bail!("Deploy of {} failed", report.project);
    }

    println!();
    let hostname = engine
        .store
        .project(&report.project)
        .map(|p| p.hostname)
        .unwrap_or_default();
    output::success(&format!(
        "Deploy complete! {} {} ({}) is live at http://{}",
        report.project,
        deployment.version,
        naming::short_commit(&deployment.commit),
        hostname
    ));
    Ok(())
}
