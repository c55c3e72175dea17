//! Scripted command channel for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

use super::{CommandChannel, CommandOutput, LineSink, OutputLine, Target};

struct Rule {
    needle: String,
    output: CommandOutput,
    remaining: Option<usize>,
}

/// Answers commands by substring match, first matching rule wins.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeChannel {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    unreachable: bool,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection attempt fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn push(&self, needle: &str, output: CommandOutput, remaining: Option<usize>) -> &Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.to_string(),
            output,
            remaining,
        });
        self
    }

    pub fn on(&self, needle: &str, stdout: &str) -> &Self {
        self.push(
            needle,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            None,
        )
    }

    pub fn once(&self, needle: &str, stdout: &str) -> &Self {
        self.push(
            needle,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            Some(1),
        )
    }

    pub fn fail(&self, needle: &str, stderr: &str) -> &Self {
        self.exit(needle, 1, "", stderr)
    }

    pub fn exit(&self, needle: &str, exit_code: i32, stdout: &str, stderr: &str) -> &Self {
        self.push(
            needle,
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
            None,
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.count(needle) > 0
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }

    /// Index of the first recorded command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .position(|c| c.contains(needle))
    }

    fn respond(&self, target: &Target, command: &str) -> EngineResult<CommandOutput> {
        if self.unreachable {
            return Err(EngineError::Connection {
                target: target.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        self.calls.lock().unwrap().push(command.to_string());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rule.remaining == Some(0) || !command.contains(&rule.needle) {
                continue;
            }
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return Ok(rule.output.clone());
        }

        Ok(CommandOutput::default())
    }
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn connect(&self, target: &Target) -> EngineResult<()> {
        if self.unreachable {
            return Err(EngineError::Connection {
                target: target.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, target: &Target, command: &str) -> EngineResult<CommandOutput> {
        self.respond(target, command)
    }

    async fn execute_streaming(
        &self,
        target: &Target,
        command: &str,
        sink: &mut LineSink<'_>,
    ) -> EngineResult<CommandOutput> {
        let output = self.respond(target, command)?;
        for line in output.stdout.lines() {
            sink(OutputLine::Stdout(line));
        }
        for line in output.stderr.lines() {
            sink(OutputLine::Stderr(line));
        }
        Ok(output)
    }
}
