//! Best-effort restoration of the last-known-good container after a failed deploy.
//!
//! Nothing here returns an error: each problem becomes a log line on the
//! deploy, and the caller only learns whether the previous container was
//! confirmed running afterwards.

use crate::channel::{quote, Shell, Target};

use super::context::DeployContext;

/// How a failed deploy tries to bring the previous container back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePrevious {
    /// Restart the previous container unconditionally.
    Local,
    /// Restart the previous container only if it still exists. Cleanup on a
    /// remote host may already have removed it, in which case this is a no-op
    /// and the project is left without a running container.
    Remote,
}

impl RestorePrevious {
    pub fn for_target(target: &Target) -> Self {
        if target.is_local() {
            RestorePrevious::Local
        } else {
            RestorePrevious::Remote
        }
    }

    /// Returns whether `container` is running once the attempt is over.
    pub async fn restore(
        &self,
        shell: &Shell<'_>,
        ctx: &mut DeployContext<'_>,
        container: &str,
    ) -> bool {
        if *self == RestorePrevious::Remote && !exists(shell, container).await {
            ctx.log(format!(
                "Previous container {} no longer exists on the host, nothing to restore",
                container
            ));
            return false;
        }

        ctx.log(format!("Restarting previous container {}", container));
        match shell.run(&format!("docker start {}", quote(container))).await {
            Ok(out) if out.success() => {}
            Ok(out) => {
                ctx.log(format!(
                    "Could not restart {}: {}",
                    container,
                    out.stderr.trim()
                ));
                return false;
            }
            Err(e) => {
                ctx.log(format!("Could not restart {}: {}", container, e));
                return false;
            }
        }

        let running = is_running(shell, container).await;
        if running {
            ctx.log(format!("Previous container {} is running again", container));
        } else {
            ctx.log(format!("Previous container {} did not come back up", container));
        }
        running
    }
}

async fn exists(shell: &Shell<'_>, container: &str) -> bool {
    shell
        .exec_ok(&format!("docker inspect {} >/dev/null 2>&1", quote(container)))
        .await
        .unwrap_or(false)
}

async fn is_running(shell: &Shell<'_>, container: &str) -> bool {
    shell
        .exec(&format!(
            "docker inspect -f '{{{{.State.Status}}}}' {}",
            quote(container)
        ))
        .await
        .map(|status| status.trim() == "running")
        .unwrap_or(false)
}

/// Stop a container left behind by a failed attempt.
pub async fn stop_quietly(shell: &Shell<'_>, ctx: &mut DeployContext<'_>, container: &str) {
    if let Err(e) = shell.exec(&format!("docker stop {}", quote(container))).await {
        ctx.log(format!("Could not stop failed container {}: {}", container, e));
    }
}
