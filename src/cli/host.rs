use anyhow::{bail, Result};
use futures::future::join_all;

use super::Engine;
use crate::model::HostStatus;
use crate::output;

pub async fn add(engine: &Engine, name: &str) -> Result<()> {
    let config = engine.config.host(name)?;
    let host = engine
        .provisioner
        .register(name, config.remote_target())
        .await?;
    output::success(&format!(
        "Registered {} ({}), status {}",
        host.name,
        host.connection.pool_key(),
        host.status
    ));
    Ok(())
}

pub fn list(engine: &Engine) -> Result<()> {
    let hosts = engine.store.hosts();
    if hosts.is_empty() {
        output::warning("No hosts registered");
        return Ok(());
    }
    for h in hosts {
        let os = h
            .os
            .as_ref()
            .map(|o| format!("{} {}", o.id, o.version))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<16} {:<28} {:<13} {:>3}% {}",
            h.name,
            h.connection.pool_key(),
            h.status.to_string(),
            h.progress,
            os
        );
        if let Some(err) = &h.last_error {
            println!("    {}", err);
        }
    }
    Ok(())
}

/// Provision the named hosts concurrently. With no names, every host that
/// is not ready yet.
pub async fn provision(engine: &Engine, names: &[String], verbose: bool) -> Result<()> {
    for name in names {
        if engine.store.host(name).is_err() {
            add(engine, name).await?;
        }
    }
    let names: Vec<String> = if names.is_empty() {
        engine
            .store
            .hosts()
            .into_iter()
            .filter(|h| h.status != HostStatus::Ready)
            .map(|h| h.name)
            .collect()
    } else {
        names.to_vec()
    };

    if names.is_empty() {
        output::info("All hosts are ready");
        return Ok(());
    }

    output::header(&format!("Provisioning {}", names.join(", ")));
    let observer = output::observer(verbose);
    let reports = join_all(
        names
            .iter()
            .map(|name| engine.provisioner.provision(name, observer.as_ref())),
    )
    .await;

    let mut failed = Vec::new();
    for (name, report) in names.iter().zip(reports) {
        match report {
            Ok(report) if report.succeeded() => output::success(&format!("{} is ready", name)),
            Ok(report) => {
                let reason = report
                    .error
                    .map(|e| format!("[{}] {}", e.code(), e))
                    .unwrap_or_default();
                output::error(&format!("{}: {}", name, reason));
                failed.push(name.clone());
            }
            Err(e) => {
                output::error(&format!("{}: {}", name, e));
                failed.push(name.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("Provisioning failed for {}", failed.join(", "));
    }
    Ok(())
}

pub async fn reset(engine: &Engine, name: &str) -> Result<()> {
    engine.provisioner.reset(name).await?;
    output::success(&format!("{} is pending again", name));
    Ok(())
}

pub async fn remove(engine: &Engine, name: &str) -> Result<()> {
    let users: Vec<String> = engine
        .store
        .projects()
        .into_iter()
        .filter(|p| p.host.as_deref() == Some(name))
        .map(|p| p.name)
        .collect();
    if !users.is_empty() {
        bail!(
            "Host {} still has projects: {} (remove them first)",
            name,
            users.join(", ")
        );
    }

    engine.provisioner.remove(name).await?;
    output::success(&format!("Removed {}", name));
    Ok(())
}
