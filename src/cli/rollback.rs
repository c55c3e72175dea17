use anyhow::{Context, Result};

use super::{actor, deploy, Engine};
use crate::output;

pub async fn run(
    engine: &Engine,
    name: &str,
    commit: Option<&str>,
    actor_name: Option<String>,
    verbose: bool,
) -> Result<()> {
    match commit {
        Some(commit) => {
            output::header(&format!("Redeploying {} at {}", name, commit));
            let observer = output::observer(verbose);
            let report = engine
                .deployer
                .full_rollback(name, commit, &actor(actor_name), observer.as_ref())
                .await?;
            deploy::summarize(engine, &report)
        }
        None => {
            output::header(&format!("Rolling back {}", name));
            let observer = output::observer(verbose);
            let spinner = output::create_spinner("Swapping containers...");
            let result = engine.deployer.fast_rollback(name, observer.as_ref()).await;
            spinner.finish_and_clear();
            let outcome = result.context("Rollback failed")?;

            output::success(&format!(
                "{} is running {} again",
                name,
                &outcome.current[..12.min(outcome.current.len())]
            ));
            if let Some(previous) = &outcome.previous {
                output::info(&format!(
                    "Run rollback again to return to {}",
                    &previous[..12.min(previous.len())]
                ));
            }
            Ok(())
        }
    }
}
