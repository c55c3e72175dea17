//! Ordered, idempotent bootstrap steps. Every step checks whether its work
//! is already done, so re-running a plan against a provisioned host is safe.

use crate::channel::{quote, RemoteTarget};
use crate::error::EngineResult;
use crate::model::OsFamily;

use super::ProvisionSettings;

pub const PROXY_CONFIG_DIR: &str = "/etc/traefik";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Runtime,
    Compose,
    Git,
    RuntimeAccess,
    Network,
    Proxy,
    LanguageRuntime,
    Directories,
    Firewall,
}

impl StepKind {
    pub fn describe(&self) -> &'static str {
        match self {
            StepKind::Runtime => "Installing container runtime",
            StepKind::Compose => "Installing compose plugin",
            StepKind::Git => "Installing git",
            StepKind::RuntimeAccess => "Granting container runtime access",
            StepKind::Network => "Creating shared network",
            StepKind::Proxy => "Starting reverse proxy",
            StepKind::LanguageRuntime => "Installing Node.js",
            StepKind::Directories => "Creating directories",
            StepKind::Firewall => "Configuring firewall",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub kind: StepKind,
    pub script: String,
}

/// Steps for one host, in execution order.
pub fn plan(
    family: OsFamily,
    connection: &RemoteTarget,
    settings: &ProvisionSettings,
) -> EngineResult<Vec<Step>> {
    let proxy = &settings.proxy;
    let network = quote(&proxy.network);
    let mut steps = Vec::new();
    let mut add = |kind, script: String| steps.push(Step { kind, script });

    add(StepKind::Runtime, format!(
        "{} && systemctl enable --now docker",
        family.install_runtime()
    ));
    add(StepKind::Compose, format!(
        "if ! docker compose version >/dev/null 2>&1; then {}; fi",
        family.install_packages(&[family.compose_package()])
    ));
    add(StepKind::Git, family.install("git", &["git"]));

    if connection.user != "root" {
        add(StepKind::RuntimeAccess, format!(
            "if ! id -nG {u} | grep -qw docker; then usermod -aG docker {u}; fi",
            u = quote(&connection.user)
        ));
    }

    add(StepKind::Network, format!(
        "docker network inspect {n} >/dev/null 2>&1 || docker network create {n} >/dev/null",
        n = network
    ));

    let config = proxy.render_static_config(&proxy.network)?;
    add(StepKind::Proxy, format!(
        "mkdir -p {dir} && touch {dir}/acme.json && chmod 600 {dir}/acme.json\n\
         cat > {dir}/traefik.toml << 'DECKHAND_PROXY_EOF'\n{config}\nDECKHAND_PROXY_EOF\n\
         if ! {running}; then docker rm -f {name} >/dev/null 2>&1 || true; {run} >/dev/null; fi",
        dir = PROXY_CONFIG_DIR,
        config = config.trim_end(),
        running = proxy.running_check(),
        name = proxy.container,
        run = proxy.run_command(&network),
    ));

    if settings.install_node {
        add(StepKind::LanguageRuntime, family.install_node());
    }

    let dirs: Vec<String> = settings.required_directories();
    add(StepKind::Directories, format!(
        "mkdir -p {d} && chown {u}: {d}",
        d = dirs.iter().map(|d| quote(d)).collect::<Vec<_>>().join(" "),
        u = quote(&connection.user)
    ));

    if settings.firewall {
        add(StepKind::Firewall, family.configure_firewall(connection.port));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RemoteAuth;

    fn connection(user: &str) -> RemoteTarget {
        RemoteTarget {
            host: "203.0.113.10".into(),
            port: 2222,
            user: user.into(),
            auth: RemoteAuth::Agent,
        }
    }

    fn kinds(steps: &[Step]) -> Vec<StepKind> {
        steps.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn default_plan_order() {
        let steps = plan(OsFamily::Debian, &connection("deploy"), &ProvisionSettings::default()).unwrap();
        assert_eq!(
            kinds(&steps),
            vec![
                StepKind::Runtime,
                StepKind::Compose,
                StepKind::Git,
                StepKind::RuntimeAccess,
                StepKind::Network,
                StepKind::Proxy,
                StepKind::Directories,
                StepKind::Firewall,
            ]
        );
    }

    #[test]
    fn root_needs_no_group_and_node_is_opt_in() {
        let settings = ProvisionSettings {
            install_node: true,
            firewall: false,
            ..ProvisionSettings::default()
        };
        let steps = plan(OsFamily::Rhel, &connection("root"), &settings).unwrap();
        let kinds = kinds(&steps);
        assert!(!kinds.contains(&StepKind::RuntimeAccess));
        assert!(!kinds.contains(&StepKind::Firewall));
        assert!(kinds.contains(&StepKind::LanguageRuntime));
    }

    #[test]
    fn firewall_keeps_the_ssh_port_open() {
        let steps = plan(OsFamily::Debian, &connection("deploy"), &ProvisionSettings::default()).unwrap();
        let firewall = steps.iter().find(|s| s.kind == StepKind::Firewall).unwrap();
        assert!(firewall.script.contains("ufw allow 2222/tcp"));

        let steps = plan(OsFamily::Rhel, &connection("deploy"), &ProvisionSettings::default()).unwrap();
        let firewall = steps.iter().find(|s| s.kind == StepKind::Firewall).unwrap();
        assert!(firewall.script.contains("--add-port=2222/tcp"));
    }

    #[test]
    fn proxy_step_writes_config_then_starts_only_when_down() {
        let steps = plan(OsFamily::Debian, &connection("deploy"), &ProvisionSettings::default()).unwrap();
        let proxy = steps.iter().find(|s| s.kind == StepKind::Proxy).unwrap();
        assert!(proxy.script.contains("/etc/traefik/traefik.toml"));
        assert!(proxy.script.contains("network = \"deckhand\""));
        assert!(proxy.script.contains("if ! [ -n \"$(docker ps -q --filter name=^traefik$"));
    }
}
