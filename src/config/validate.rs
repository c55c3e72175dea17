use anyhow::{bail, Result};

use crate::ports;

use super::DeckhandConfig;

pub fn validate(config: &DeckhandConfig) -> Result<()> {
    if config.engine.work_root.is_empty() || !config.engine.work_root.starts_with('/') {
        bail!("engine.work_root must be an absolute path");
    }

    if config.engine.dns_suffix.trim_matches('.').is_empty() {
        bail!("engine.dns_suffix cannot be empty");
    }

    if config.proxy.network.is_empty() {
        bail!("proxy.network cannot be empty");
    }

    if let Some(email) = &config.proxy.acme_email {
        if !email.contains('@') {
            bail!("proxy.acme_email '{}' is not an email address", email);
        }
    }

    if config.health.interval == 0 {
        bail!("health.interval must be at least 1 second");
    }

    if config.health.timeout < config.health.interval {
        bail!(
            "health.timeout ({}s) is shorter than health.interval ({}s)",
            config.health.timeout,
            config.health.interval
        );
    }

    for (name, host) in &config.hosts {
        if host.address.is_empty() {
            bail!("Host '{}' has an empty address", name);
        }
        if host.user.is_empty() {
            bail!("Host '{}' has an empty user", name);
        }
        if host.key.is_some() && host.password.is_some() {
            bail!("Host '{}' sets both key and password; pick one", name);
        }
    }

    for (name, project) in &config.projects {
        if project.repository.is_empty() {
            bail!("Project '{}' has no repository", name);
        }

        if project.internal_port == 0 {
            bail!("Project '{}' has internal_port 0", name);
        }

        if let Some(port) = project.port {
            if let Err(e) = ports::validate(port) {
                bail!("Project '{}': {}", name, e);
            }
        }

        if let Some(host) = &project.host {
            if !config.hosts.contains_key(host) {
                bail!("Project '{}' targets unknown host '{}'", name, host);
            }
        }
    }

    Ok(())
}
