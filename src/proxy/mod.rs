//! Reverse proxy routing: Traefik picks up container labels on a shared network.

use std::collections::BTreeMap;

use minijinja::Environment;
use tracing::debug;

use crate::channel::{quote, Shell};
use crate::error::EngineResult;

const TRAEFIK_TOML_TEMPLATE: &str = include_str!("../../templates/traefik.toml.j2");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    /// Name of the proxy container on every host.
    pub container: String,
    /// Network used when the proxy's own attachment cannot be inspected.
    pub network: String,
    pub entrypoint: String,
    pub image: String,
    pub acme_email: Option<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            container: "traefik".to_string(),
            network: "deckhand".to_string(),
            entrypoint: "web".to_string(),
            image: "traefik:v3.1".to_string(),
            acme_email: None,
        }
    }
}

pub type RoutingLabels = BTreeMap<String, String>;

impl ProxySettings {
    /// Labels routing `hostname` to `port` inside the container. Ordered, so
    /// identical inputs render identically.
    pub fn routing_labels(&self, hostname: &str, port: u16, service_id: &str) -> RoutingLabels {
        let mut labels = BTreeMap::new();
        labels.insert("traefik.enable".to_string(), "true".to_string());
        labels.insert(
            format!("traefik.http.routers.{}.rule", service_id),
            format!("Host(`{}`)", hostname),
        );
        labels.insert(
            format!("traefik.http.routers.{}.entrypoints", service_id),
            self.entrypoint.clone(),
        );
        labels.insert(
            format!("traefik.http.services.{}.loadbalancer.server.port", service_id),
            port.to_string(),
        );
        labels
    }

    pub fn render_static_config(&self, network: &str) -> EngineResult<String> {
        let mut env = Environment::new();
        env.add_template("traefik.toml", TRAEFIK_TOML_TEMPLATE)?;
        let tmpl = env.get_template("traefik.toml")?;
        let rendered = tmpl.render(minijinja::context! {
            entrypoint => &self.entrypoint,
            network => network,
            acme_email => &self.acme_email,
        })?;
        Ok(rendered)
    }

    /// `docker run` for the proxy container itself.
    pub fn run_command(&self, network: &str) -> String {
        let mut cmd = format!(
            "docker run -d --name {} --restart unless-stopped --network {} -p 80:80",
            self.container, network
        );
        if self.acme_email.is_some() {
            cmd.push_str(" -p 443:443");
        }
        cmd.push_str(" -v /var/run/docker.sock:/var/run/docker.sock:ro");
        cmd.push_str(" -v /etc/traefik:/etc/traefik");
        cmd.push(' ');
        cmd.push_str(&self.image);
        cmd
    }

    fn running_filter(&self) -> String {
        format!(
            "docker ps -q --filter name=^{}$ --filter status=running",
            self.container
        )
    }

    /// Shell condition that succeeds when the proxy container is running.
    pub fn running_check(&self) -> String {
        format!("[ -n \"$({})\" ]", self.running_filter())
    }
}

/// Render labels as `--label` arguments.
pub fn label_args(labels: &RoutingLabels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!(" --label {}", quote(&format!("{}={}", k, v))))
        .collect()
}

pub async fn is_running(shell: &Shell<'_>, settings: &ProxySettings) -> EngineResult<bool> {
    let out = shell.run(&settings.running_filter()).await?;
    Ok(out.success() && !out.stdout.trim().is_empty())
}

/// Network the proxy container is attached to. With several attachments the
/// first one reported wins.
pub async fn detect_network(
    shell: &Shell<'_>,
    settings: &ProxySettings,
) -> EngineResult<Option<String>> {
    let out = shell
        .run(&format!(
            "docker inspect -f '{{{{range $k, $v := .NetworkSettings.Networks}}}}{{{{$k}}}} {{{{end}}}}' {}",
            settings.container
        ))
        .await?;

    if !out.success() {
        return Ok(None);
    }
    Ok(out.stdout.split_whitespace().next().map(str::to_string))
}

/// Create `network` unless it exists. Safe to race: a losing `create` is
/// followed by a re-inspect.
pub async fn ensure_network(shell: &Shell<'_>, network: &str) -> EngineResult<()> {
    shell
        .exec(&format!(
            "docker network inspect {n} >/dev/null 2>&1 || docker network create {n} >/dev/null 2>&1 || docker network inspect {n} >/dev/null",
            n = quote(network)
        ))
        .await?;
    Ok(())
}

/// The detected proxy network (or the configured fallback), created if absent.
pub async fn resolve_network(shell: &Shell<'_>, settings: &ProxySettings) -> EngineResult<String> {
    let network = match detect_network(shell, settings).await? {
        Some(network) => network,
        None => {
            debug!(
                "proxy {} not inspectable, using network {}",
                settings.container, settings.network
            );
            settings.network.clone()
        }
    };
    ensure_network(shell, &network).await?;
    Ok(network)
}

/// Attach `container` to `network` unless already attached. Returns whether
/// an attachment was made.
pub async fn ensure_attached(shell: &Shell<'_>, container: &str, network: &str) -> EngineResult<bool> {
    let inspect = format!(
        "docker inspect -f '{{{{json .NetworkSettings.Networks}}}}' {}",
        quote(container)
    );
    let attached = |out: &str| out.contains(&format!("\"{}\"", network));

    if attached(&shell.exec(&inspect).await?) {
        return Ok(false);
    }

    let connected = shell
        .exec_ok(&format!(
            "docker network connect {} {}",
            quote(network),
            quote(container)
        ))
        .await?;
    if !connected && !attached(&shell.exec(&inspect).await?) {
        shell
            .exec(&format!(
                "docker network connect {} {}",
                quote(network),
                quote(container)
            ))
            .await?;
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx or 3xx through the proxy.
    Routed(u16),
    /// 5xx: the proxy has the route but the backend is not answering yet.
    BackendStarting(u16),
    NotRouted(u16),
}

impl ProbeOutcome {
    pub fn from_status(code: u16) -> Self {
        match code {
            200..=399 => ProbeOutcome::Routed(code),
            500..=599 => ProbeOutcome::BackendStarting(code),
            _ => ProbeOutcome::NotRouted(code),
        }
    }

    pub fn proxy_configured(&self) -> bool {
        !matches!(self, ProbeOutcome::NotRouted(_))
    }
}

/// Request `/` through the proxy on the target with the given Host header.
pub async fn probe(shell: &Shell<'_>, hostname: &str) -> EngineResult<ProbeOutcome> {
    let out = shell
        .run(&format!(
            "curl -s -o /dev/null --max-time 5 -w '%{{http_code}}' -H {} http://127.0.0.1/",
            quote(&format!("Host: {}", hostname))
        ))
        .await?;
    let code = out.stdout.trim().parse::<u16>().unwrap_or(0);
    Ok(ProbeOutcome::from_status(code))
}
