mod channel;
mod cli;
mod config;
mod deploy;
mod error;
mod events;
mod model;
mod naming;
mod output;
mod ports;
mod provision;
mod proxy;
mod recipes;
mod rollback;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, Engine, HostAction, PortsAction, ProjectAction};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .without_time()
        .init();

    let verbose = cli.verbose > 0;

    if let Command::Init = cli.command {
        return cli::init::run(&cli.config);
    }

    let engine = Engine::open(&cli.config).await?;

    match cli.command {
        Command::Init => {}

        Command::Project { action } => match action {
            ProjectAction::Add { name } => cli::project::add(&engine, &name).await?,
            ProjectAction::List => cli::project::list(&engine)?,
            ProjectAction::Remove { name, yes } => cli::project::remove(&engine, &name, yes).await?,
            ProjectAction::Stop { name } => cli::project::stop(&engine, &name).await?,
            ProjectAction::Start { name } => cli::project::start(&engine, &name).await?,
            ProjectAction::Prune { name } => cli::project::prune(&engine, &name).await?,
            ProjectAction::Check { name } => cli::project::check(&engine, &name).await?,
        },

        Command::Deploy {
            project,
            git_ref,
            actor,
        } => {
            cli::deploy::run(&engine, &project, git_ref, actor, verbose).await?;
        }

        Command::Rollback {
            project,
            commit,
            actor,
        } => {
            cli::rollback::run(&engine, &project, commit.as_deref(), actor, verbose).await?;
        }

        Command::Releases { project } => {
            cli::releases::run(&engine, &project)?;
        }

        Command::Logs {
            project,
            lines,
            follow,
        } => {
            cli::logs::run(&engine, &project, lines, follow).await?;
        }

        Command::Host { action } => match action {
            HostAction::Add { name } => cli::host::add(&engine, &name).await?,
            HostAction::List => cli::host::list(&engine)?,
            HostAction::Provision { names } => cli::host::provision(&engine, &names, verbose).await?,
            HostAction::Reset { name } => cli::host::reset(&engine, &name).await?,
            HostAction::Remove { name } => cli::host::remove(&engine, &name).await?,
        },

        Command::Ports { action } => match action {
            PortsAction::List => cli::ports::list(&engine)?,
            PortsAction::Suggest { count } => cli::ports::suggest(&engine, count)?,
            PortsAction::Check { port } => cli::ports::check(&engine, port)?,
        },
    }

    Ok(())
}
