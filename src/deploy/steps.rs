use std::time::Instant;

use tracing::{debug, warn};

use crate::channel::{quote, OutputLine, Shell};
use crate::error::{EngineError, EngineResult};
use crate::naming;
use crate::proxy;
use crate::recipes::RecipeKind;

use super::context::DeployContext;
use super::source::{self, GitRef};

/// Label tying containers to their project, used by prune and remove.
pub const PROJECT_LABEL: &str = "deckhand.project";

fn short_id(id: &str) -> &str {
    &id[..12.min(id.len())]
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

pub async fn fetch(shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
    let dir = ctx.source_dir();
    let d = quote(&dir);
    let auth = ctx.project.source.auth.clone();
    let url = quote(&ctx.project.source.repository);
    let git = source::git_command(&auth);

    if shell.path_exists(&format!("{}/.git", dir)).await? {
        ctx.log("Updating existing checkout");
        shell
            .exec(&format!(
                "cd {d} && git remote set-url origin {url} && {git} fetch --quiet --prune --tags --force origin"
            ))
            .await?;
    } else {
        ctx.log(format!("Cloning {}", ctx.project.source.repository));
        let parent = dir.rsplit_once('/').map(|(p, _)| p).unwrap_or(".");
        shell
            .exec(&format!(
                "mkdir -p {} && {git} clone --quiet {url} {d}",
                quote(parent)
            ))
            .await?;
    }

    let reference = GitRef::parse(&ctx.requested_ref);
    let checkout = match &reference {
        GitRef::Tag(tag) => format!("tags/{}", tag),
        GitRef::Commit(commit) => commit.clone(),
        GitRef::Branch(branch) => {
            let exists = shell
                .exec_ok(&format!(
                    "cd {d} && {git} ls-remote --exit-code --heads origin {}",
                    quote(branch)
                ))
                .await?;
            if exists {
                ctx.branch = branch.clone();
            } else {
                let fallback = default_branch(shell, &d, &git).await?;
                warn!(
                    "[{}] branch '{}' missing, using default '{}'",
                    ctx.name(),
                    branch,
                    fallback
                );
                ctx.log(format!(
                    "Branch '{}' not found on origin, falling back to default branch '{}'",
                    branch, fallback
                ));
                ctx.branch = fallback;
            }
            format!("origin/{}", ctx.branch)
        }
    };

    shell
        .exec(&format!(
            "cd {d} && git checkout --quiet --force --detach {} && git clean -fdq",
            quote(&checkout)
        ))
        .await?;

    let commit = shell
        .exec(&format!("cd {d} && git rev-parse HEAD"))
        .await?
        .trim()
        .to_string();

    ctx.version = Some(match reference {
        GitRef::Tag(tag) => tag,
        _ => naming::short_commit(&commit).to_string(),
    });
    ctx.commit = Some(commit);
    let line = format!("Checked out {} at {}", checkout, ctx.short_commit());
    ctx.log(line);
    Ok(())
}

async fn default_branch(shell: &Shell<'_>, dir: &str, git: &str) -> EngineResult<String> {
    let cmd = format!("cd {dir} && {git} ls-remote --symref origin HEAD");
    let out = shell.exec(&cmd).await?;
    source::parse_default_branch(&out).ok_or_else(|| EngineError::CommandExecution {
        target: shell.target().to_string(),
        command: cmd,
        exit_code: 0,
        stderr: "could not determine the remote default branch".to_string(),
    })
}

pub async fn configure_build(shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
    let dir = ctx.source_dir();
    let dockerfile = format!("{}/Dockerfile", dir);

    if shell.path_exists(&dockerfile).await? {
        ctx.log("Using the repository's Dockerfile");
        return Ok(());
    }

    let listing = shell.exec(&format!("ls -1A {}", quote(&dir))).await?;
    let kind = RecipeKind::detect(listing.lines());
    ctx.log(format!("No Dockerfile found, generating the {} recipe", kind.name()));

    let content = kind.render(&ctx.project.build, ctx.project.internal_port)?;
    shell.write_file(&dockerfile, &content).await?;
    Ok(())
}

pub async fn build_image(shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
    let image = naming::image_ref(ctx.service_id(), ctx.short_commit());
    let cmd = format!("docker build -t {} {}", image, quote(&ctx.source_dir()));
    ctx.log(format!("Building image {}", image));

    let output = shell
        .stream(&cmd, &mut |line: OutputLine<'_>| ctx.log_output(line.text()))
        .await?;

    if !output.success() {
        return Err(EngineError::BuildFailure {
            image,
            exit_code: output.exit_code,
            stderr: tail(&output.stderr, 20),
        });
    }

    ctx.log(format!("Built {}", image));
    ctx.image = Some(image);
    Ok(())
}

/// Start the new container, wait for it to run, then stop (not remove) the old one.
///
/// When the old container still publishes the project's port, the new one
/// starts unpublished and is replaced by a published twin once the old one
/// has stopped.
pub async fn swap(shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
    let image = ctx
        .image
        .clone()
        .ok_or_else(|| EngineError::ContainerStartFailure("no image was built".to_string()))?;

    let network = proxy::resolve_network(shell, &ctx.settings.proxy).await?;
    ctx.network = Some(network.clone());

    let port = ctx.project.port;
    let publish = !port_published(shell, port).await?;
    if !publish {
        ctx.log(format!(
            "Port {} is held by the running container; it is bound after the switch",
            port
        ));
    }

    let name = naming::container_name(ctx.service_id(), ctx.short_commit(), &ctx.stamp);
    let id = start_container(shell, ctx, &name, &network, &image, publish).await?;
    ctx.new_container = Some(id.clone());

    wait_running(shell, ctx, &id).await?;
    ctx.log(format!("Container {} is running", short_id(&id)));

    if let Some(old) = ctx.project.current_container.clone() {
        match shell.exec(&format!("docker stop {}", quote(&old))).await {
            Ok(_) => {
                ctx.stopped_previous = true;
                ctx.log(format!("Stopped previous container {}", short_id(&old)));
            }
            Err(e) => ctx.log(format!(
                "Could not stop previous container {}: {}",
                short_id(&old),
                e
            )),
        }
    }

    if !publish {
        rebind(shell, ctx, &name, &network, &image, &id).await?;
    }

    Ok(())
}

fn run_command(ctx: &DeployContext<'_>, name: &str, network: &str, image: &str, publish: bool) -> String {
    let internal = ctx.project.internal_port;
    let mut cmd = format!(
        "docker run -d --name {} --network {} --restart unless-stopped",
        name,
        quote(network)
    );
    if publish {
        cmd.push_str(&format!(" -p {}:{}", ctx.project.port, internal));
    }
    for (key, value) in &ctx.project.env {
        cmd.push_str(&format!(" -e {}", quote(&format!("{}={}", key, value))));
    }
    if !ctx.project.env.contains_key("PORT") {
        cmd.push_str(&format!(" -e PORT={}", internal));
    }
    let labels = ctx
        .settings
        .proxy
        .routing_labels(&ctx.project.hostname, internal, ctx.service_id());
    cmd.push_str(&proxy::label_args(&labels));
    cmd.push_str(&format!(
        " --label {}",
        quote(&format!("{}={}", PROJECT_LABEL, ctx.service_id()))
    ));
    cmd.push(' ');
    cmd.push_str(image);
    cmd
}

async fn start_container(
    shell: &Shell<'_>,
    ctx: &mut DeployContext<'_>,
    name: &str,
    network: &str,
    image: &str,
    publish: bool,
) -> EngineResult<String> {
    let cmd = run_command(ctx, name, network, image, publish);
    ctx.log(format!("Starting container {}", name));
    let id = shell
        .exec(&cmd)
        .await
        .map_err(|e| EngineError::ContainerStartFailure(e.to_string()))?
        .trim()
        .to_string();
    if id.is_empty() {
        return Err(EngineError::ContainerStartFailure(format!(
            "docker run returned no container id for {}",
            name
        )));
    }
    Ok(id)
}

/// Replace the unpublished container `interim` with one bound to the
/// project's port. Keeps `interim` when the port is still taken or the
/// replacement does not come up.
async fn rebind(
    shell: &Shell<'_>,
    ctx: &mut DeployContext<'_>,
    name: &str,
    network: &str,
    image: &str,
    interim: &str,
) -> EngineResult<()> {
    let port = ctx.project.port;
    if port_published(shell, port).await? {
        ctx.log(format!(
            "Port {} is still in use by another container; serving through the proxy only",
            port
        ));
        return Ok(());
    }

    let bound_name = format!("{}-p{}", name, port);
    let bound = match start_container(shell, ctx, &bound_name, network, image, true).await {
        Ok(id) => id,
        Err(e) => {
            ctx.log(format!("Could not bind port {}: {}", port, e));
            return Ok(());
        }
    };
    if let Err(e) = wait_running(shell, ctx, &bound).await {
        ctx.log(format!("Could not bind port {}: {}", port, e));
        let _ = shell.run(&format!("docker rm -f {}", quote(&bound))).await;
        return Ok(());
    }

    ctx.new_container = Some(bound.clone());
    if let Err(e) = shell.exec(&format!("docker rm -f {}", quote(interim))).await {
        ctx.log(format!("Could not remove interim container {}: {}", short_id(interim), e));
    }
    ctx.log(format!("Container {} bound to port {}", short_id(&bound), port));
    Ok(())
}

async fn port_published(shell: &Shell<'_>, port: u16) -> EngineResult<bool> {
    let out = shell
        .run(&format!("docker ps -q --filter publish={}", port))
        .await?;
    Ok(out.success() && !out.stdout.trim().is_empty())
}

async fn container_status(shell: &Shell<'_>, id: &str) -> EngineResult<String> {
    Ok(shell
        .exec(&format!("docker inspect -f '{{{{.State.Status}}}}' {}", quote(id)))
        .await?
        .trim()
        .to_string())
}

async fn exit_details(shell: &Shell<'_>, id: &str, status: &str) -> String {
    let logs = shell
        .run(&format!("docker logs --tail 20 {} 2>&1", quote(id)))
        .await
        .map(|o| o.stdout)
        .unwrap_or_default();
    format!("container {} is {}\n{}", short_id(id), status, logs.trim_end())
}

/// Poll until `id` reports running, it exits, or the timeout elapses.
async fn wait_running(shell: &Shell<'_>, ctx: &mut DeployContext<'_>, id: &str) -> EngineResult<()> {
    let health = &ctx.settings.health;
    let deadline = Instant::now() + health.timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let status = container_status(shell, id).await?;
        debug!("[{}] container status: {} (attempt {})", ctx.name(), status, attempt);

        match status.as_str() {
            "running" => return Ok(()),
            "exited" | "dead" => {
                return Err(EngineError::ContainerStartFailure(
                    exit_details(shell, id, &status).await,
                ))
            }
            _ => {}
        }

        if Instant::now() >= deadline {
            return Err(EngineError::HealthCheckTimeout {
                container: short_id(id).to_string(),
                timeout: health.timeout,
            });
        }
        tokio::time::sleep(health.interval).await;
    }
}

/// Confirm the new container stays up, then optionally probe through the proxy.
pub async fn verify(shell: &Shell<'_>, ctx: &mut DeployContext<'_>) -> EngineResult<()> {
    let settings = ctx.settings;
    let id = ctx
        .new_container
        .clone()
        .ok_or_else(|| EngineError::ContainerStartFailure("no container to verify".to_string()))?;

    if !settings.health.settle.is_zero() {
        tokio::time::sleep(settings.health.settle).await;
    }
    let status = container_status(shell, &id).await?;
    if status != "running" {
        return Err(EngineError::ContainerStartFailure(
            exit_details(shell, &id, &status).await,
        ));
    }
    ctx.log("Container stayed up");

    if !settings.health.probe {
        return Ok(());
    }

    if !proxy::is_running(shell, &settings.proxy).await? {
        ctx.log(format!(
            "Proxy {} is not running, skipping the routing probe",
            settings.proxy.container
        ));
        return Ok(());
    }

    if let Some(network) = ctx.network.clone() {
        if proxy::ensure_attached(shell, &id, &network).await? {
            ctx.log(format!("Attached container to network {}", network));
        }
    }

    let hostname = ctx.project.hostname.clone();
    for attempt in 1..=settings.health.probe_attempts.max(1) {
        let outcome = proxy::probe(shell, &hostname).await?;
        if outcome.proxy_configured() {
            ctx.log(format!("Proxy routes {} ({:?})", hostname, outcome));
            return Ok(());
        }
        debug!("[{}] probe attempt {}: {:?}", ctx.name(), attempt, outcome);
        tokio::time::sleep(settings.health.interval).await;
    }

    ctx.log(format!(
        "Proxy is not routing {} yet; it may still be picking up the container",
        hostname
    ));
    Ok(())
}
