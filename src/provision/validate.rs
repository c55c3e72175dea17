//! Post-bootstrap checks, run independently of what the script reported.

use std::collections::BTreeMap;

use crate::channel::{quote, Shell};
use crate::error::EngineResult;

use super::ProvisionSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub command: String,
}

impl Check {
    fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

pub fn checks(settings: &ProvisionSettings) -> Vec<Check> {
    let proxy = &settings.proxy;
    let mut checks = vec![
        Check::new("docker", "command -v docker >/dev/null 2>&1"),
        Check::new("docker compose", "docker compose version >/dev/null 2>&1"),
        Check::new("git", "command -v git >/dev/null 2>&1"),
        Check::new(
            format!("proxy container {}", proxy.container),
            proxy.running_check(),
        ),
        Check::new(
            format!("network {}", proxy.network),
            format!("docker network inspect {} >/dev/null 2>&1", quote(&proxy.network)),
        ),
    ];
    if settings.install_node {
        checks.push(Check::new("node", "command -v node >/dev/null 2>&1"));
    }
    for dir in settings.required_directories() {
        checks.push(Check::new(
            format!("directory {}", dir),
            format!("test -d {}", quote(&dir)),
        ));
    }
    checks
}

/// Run every check, privileged, and report each result. Never stops early.
pub async fn run(shell: &Shell<'_>, checks: &[Check]) -> EngineResult<BTreeMap<String, bool>> {
    let mut results = BTreeMap::new();
    for check in checks {
        let ok = shell.exec_ok(&shell.privileged(&check.command)).await?;
        results.insert(check.name.clone(), ok);
    }
    Ok(results)
}

pub fn missing(results: &BTreeMap<String, bool>, checks: &[Check]) -> Vec<String> {
    checks
        .iter()
        .filter(|c| !results.get(&c.name).copied().unwrap_or(false))
        .map(|c| c.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::fake::FakeChannel;
    use crate::channel::Target;

    #[tokio::test]
    async fn every_missing_item_is_collected() {
        let fake = FakeChannel::new();
        fake.fail("command -v git", "")
            .fail("docker network inspect", "")
            .fail("test -d '/opt/deckhand/projects'", "");
        let settings = ProvisionSettings::default();
        let checks = checks(&settings);

        let results = run(&Shell::new(&fake, &Target::Local), &checks).await.unwrap();

        assert_eq!(results.len(), checks.len());
        assert_eq!(
            missing(&results, &checks),
            vec![
                "git".to_string(),
                "network deckhand".to_string(),
                "directory /opt/deckhand/projects".to_string(),
            ]
        );
        assert_eq!(fake.calls().len(), checks.len());
    }

    #[tokio::test]
    async fn healthy_host_has_nothing_missing() {
        let fake = FakeChannel::new();
        let settings = ProvisionSettings::default();
        let checks = checks(&settings);

        let results = run(&Shell::new(&fake, &Target::Local), &checks).await.unwrap();

        assert!(missing(&results, &checks).is_empty());
        assert!(results.values().all(|ok| *ok));
    }
}
