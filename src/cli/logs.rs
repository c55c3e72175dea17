use anyhow::{Context, Result};

use super::Engine;
use crate::channel::OutputLine;

pub async fn run(engine: &Engine, name: &str, lines: usize, follow: bool) -> Result<()> {
    engine
        .deployer
        .logs(name, lines, follow, &mut |line: OutputLine<'_>| match line {
            OutputLine::Stdout(text) => println!("{}", text),
            OutputLine::Stderr(text) => eprintln!("{}", text),
        })
        .await
        .context("Failed to get logs")?;
    Ok(())
}
