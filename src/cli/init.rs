use anyhow::{bail, Context, Result};
use dialoguer::{Input, Select};
use minijinja::Environment;
use std::path::Path;

use crate::naming;

const TEMPLATE: &str = include_str!("../../templates/deckhand.toml.j2");

pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    // Detect defaults from git
    let default_name = std::env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| naming::sanitize(&n.to_string_lossy())))
        .unwrap_or_else(|| "app".to_string());

    let default_repo = detect_git_remote().unwrap_or_default();

    let project_name: String = Input::new()
        .with_prompt("Project name")
        .default(default_name)
        .interact_text()?;

    let repository: String = Input::new()
        .with_prompt("Git repository URL")
        .default(default_repo)
        .interact_text()?;

    let branches = ["main", "master"];
    let branch_idx = Select::new()
        .with_prompt("Default branch")
        .items(&branches)
        .default(0)
        .interact()?;
    let branch = branches[branch_idx].to_string();

    let internal_port: u16 = Input::new()
        .with_prompt("Port the app listens on inside the container")
        .default(3000)
        .interact_text()?;

    let content = render(&project_name, &repository, &branch, internal_port)?;
    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    crate::output::success(&format!("Created {}", config_path.display()));
    crate::output::info("Then run: deckhand project add <name> && deckhand deploy <name>");

    Ok(())
}

fn render(project_name: &str, repository: &str, branch: &str, internal_port: u16) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("deckhand.toml", TEMPLATE)?;
    let tmpl = env.get_template("deckhand.toml")?;
    let content = tmpl.render(minijinja::context! {
        project_name => naming::sanitize(project_name),
        repository => repository,
        branch => branch,
        internal_port => internal_port,
        local_address => "127.0.0.1",
    })?;
    Ok(content)
}

fn detect_git_remote() -> Option<String> {
    let output = std::process::Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
