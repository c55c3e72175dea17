use anyhow::Result;
use console::style;

use super::Engine;
use crate::model::DeploymentStatus;
use crate::naming;
use crate::output;

pub fn run(engine: &Engine, name: &str) -> Result<()> {
    let project = engine.store.project(name)?;
    output::header(&format!("Releases for {}", name));

    if project.deployments.is_empty() {
        output::warning("No deployments yet");
        return Ok(());
    }

    for d in project.deployments.iter().rev() {
        let status = match d.status {
            DeploymentStatus::Success => style("success").green(),
            DeploymentStatus::Failed => style("failed").red(),
            DeploymentStatus::Deploying => style("deploying").yellow(),
        };
        let current = d.container_id.is_some() && d.container_id == project.current_container;
        let previous = d.container_id.is_some() && d.container_id == project.previous_container;
        let marker = if current {
            " ← current"
        } else if previous {
            " ← previous"
        } else {
            ""
        };
        println!(
            "  {}  {:<12} {:<8} {:<10} {:<12} {}{}",
            d.started_at.format("%Y-%m-%d %H:%M:%S"),
            d.version,
            naming::short_commit(&d.commit),
            status,
            d.branch,
            d.actor,
            marker
        );
    }
    Ok(())
}
