use anyhow::{Context, Result};
use dialoguer::Confirm;

use super::Engine;
use crate::naming;
use crate::output;

/// Register `name` unless it already is. Used by commands that accept
/// projects declared in the config but never added.
pub async fn ensure_registered(engine: &Engine, name: &str) -> Result<()> {
    if engine.store.project(name).is_ok() || !engine.config.projects.contains_key(name) {
        return Ok(());
    }
    output::info(&format!("Registering {} from config", name));
    add(engine, name).await
}

pub async fn add(engine: &Engine, name: &str) -> Result<()> {
    let spec = engine.config.project_spec(name)?;
    if let Some(host) = &spec.host {
        if engine.store.host(host).is_err() {
            let config = engine.config.host(host)?;
            engine
                .provisioner
                .register(host, config.remote_target())
                .await?;
            output::info(&format!(
                "Registered host {}; run `deckhand host provision {}` before deploying",
                host, host
            ));
        }
    }

    let project = engine
        .deployer
        .register(spec)
        .await
        .with_context(|| format!("Failed to register {}", name))?;

    output::success(&format!(
        "{} -> port {}, http://{}",
        project.name, project.port, project.hostname
    ));
    Ok(())
}

pub fn list(engine: &Engine) -> Result<()> {
    let projects = engine.store.projects();
    if projects.is_empty() {
        output::warning("No projects registered");
        return Ok(());
    }

    println!(
        "  {:<20} {:<10} {:<6} {:<14} {:<10} {:<9} {}",
        "NAME", "STATUS", "PORT", "HOST", "COMMIT", "LAST", "HOSTNAME"
    );
    for p in projects {
        let status = format!("{:?}", p.status).to_lowercase();
        let commit = p.commit.as_deref().map(naming::short_commit).unwrap_or("-");
        let last = p
            .last_deployment()
            .map(|d| format!("{:?}", d.status).to_lowercase())
            .unwrap_or_else(|| "-".to_string());
        let marker = if p.update_available { " (update available)" } else { "" };
        println!(
            "  {:<20} {:<10} {:<6} {:<14} {:<10} {:<9} {}{}",
            p.name,
            status,
            p.port,
            p.host.as_deref().unwrap_or("local"),
            commit,
            last,
            p.hostname,
            marker
        );
    }
    Ok(())
}

pub async fn remove(engine: &Engine, name: &str, yes: bool) -> Result<()> {
    let project = engine.store.project(name)?;
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Remove {} and all of its containers, images and source on {}?",
                name,
                project.host.as_deref().unwrap_or("this machine")
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            output::warning("Aborted");
            return Ok(());
        }
    }

    let spinner = output::create_spinner(&format!("Removing {}...", name));
    let result = engine.deployer.remove(name).await;
    spinner.finish_and_clear();
    result.with_context(|| format!("Failed to remove {}", name))?;

    output::success(&format!("Removed {} (port {} released)", name, project.port));
    Ok(())
}

pub async fn stop(engine: &Engine, name: &str) -> Result<()> {
    engine.deployer.stop(name).await?;
    output::success(&format!("Stopped {}", name));
    Ok(())
}

pub async fn start(engine: &Engine, name: &str) -> Result<()> {
    engine.deployer.start(name).await?;
    output::success(&format!("Started {}", name));
    Ok(())
}

pub async fn prune(engine: &Engine, name: &str) -> Result<()> {
    let removed = engine.deployer.prune(name).await?;
    if removed.is_empty() {
        output::info("Nothing to prune");
    } else {
        for id in &removed {
            println!("  {}", &id[..12.min(id.len())]);
        }
        output::success(&format!("Removed {} container(s)", removed.len()));
    }
    Ok(())
}

pub async fn check(engine: &Engine, name: &str) -> Result<()> {
    if engine.deployer.check_updates(name).await? {
        output::info(&format!("{} has new commits on its branch", name));
    } else {
        output::success(&format!("{} is up to date", name));
    }
    Ok(())
}
