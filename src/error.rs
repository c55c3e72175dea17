use std::time::Duration;

use thiserror::Error;

use crate::ports::{PORT_MAX, PORT_MIN};

/// Failures raised by the deploy and provisioning engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot reach {target}: {reason}")]
    Connection { target: String, reason: String },

    #[error("command failed on {target} (exit {exit_code}): {command}\n{stderr}")]
    CommandExecution {
        target: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("image build failed for {image} (exit {exit_code})\n{stderr}")]
    BuildFailure {
        image: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("container failed to start: {0}")]
    ContainerStartFailure(String),

    #[error("container {container} was not running after {timeout:?}")]
    HealthCheckTimeout { container: String, timeout: Duration },

    #[error("no free port between {} and {}", PORT_MIN, PORT_MAX)]
    PortExhaustion,

    #[error("port {0} is outside the allocatable range {min}-{max}", min = PORT_MIN, max = PORT_MAX)]
    InvalidPort(u16),

    #[error("project '{0}' has no previous container to roll back to")]
    NoRollbackTarget(String),

    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("host validation failed, missing: {}", .0.join(", "))]
    ValidationFailure(Vec<String>),

    #[error("project '{name}' maps to service '{service_id}', already used by '{existing}'")]
    NameConflict {
        name: String,
        service_id: String,
        existing: String,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("state store error: {0}")]
    Store(String),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl EngineError {
    /// Short stable identifier recorded in failure summaries.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Connection { .. } => "ConnectionError",
            EngineError::CommandExecution { .. } => "CommandExecutionError",
            EngineError::BuildFailure { .. } => "BuildFailure",
            EngineError::ContainerStartFailure(_) => "ContainerStartFailure",
            EngineError::HealthCheckTimeout { .. } => "HealthCheckTimeout",
            EngineError::PortExhaustion => "PortExhaustion",
            EngineError::InvalidPort(_) => "InvalidPort",
            EngineError::NoRollbackTarget(_) => "NoRollbackTarget",
            EngineError::UnsupportedOs(_) => "UnsupportedOS",
            EngineError::ValidationFailure(_) => "ValidationFailure",
            EngineError::NameConflict { .. } => "NameConflict",
            EngineError::NotFound { .. } => "NotFound",
            EngineError::Store(_) => "StoreError",
            EngineError::Template(_) => "TemplateError",
        }
    }

    /// The same error with every occurrence of `secret` masked.
    pub fn redact(self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let mask = |text: String| text.replace(secret, "***");
        match self {
            EngineError::Connection { target, reason } => EngineError::Connection {
                target,
                reason: mask(reason),
            },
            EngineError::CommandExecution {
                target,
                command,
                exit_code,
                stderr,
            } => EngineError::CommandExecution {
                target,
                command: mask(command),
                exit_code,
                stderr: mask(stderr),
            },
            EngineError::BuildFailure {
                image,
                exit_code,
                stderr,
            } => EngineError::BuildFailure {
                image,
                exit_code,
                stderr: mask(stderr),
            },
            EngineError::ContainerStartFailure(message) => {
                EngineError::ContainerStartFailure(mask(message))
            }
            other => other,
        }
    }

    pub fn project_not_found(name: &str) -> Self {
        EngineError::NotFound {
            kind: "project",
            name: name.to_string(),
        }
    }

    pub fn host_not_found(name: &str) -> Self {
        EngineError::NotFound {
            kind: "host",
            name: name.to_string(),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failure_lists_every_missing_item() {
        let err = EngineError::ValidationFailure(vec!["git".into(), "network deckhand".into()]);
        assert_eq!(
            err.to_string(),
            "host validation failed, missing: git, network deckhand"
        );
        assert_eq!(err.code(), "ValidationFailure");
    }

    #[test]
    fn redact_masks_commands_and_output() {
        let err = EngineError::CommandExecution {
            target: "local".into(),
            command: "TOKEN='hunter2' git fetch".into(),
            exit_code: 128,
            stderr: "auth failed for hunter2".into(),
        }
        .redact("hunter2");
        let text = err.to_string();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("TOKEN='***' git fetch"));
    }

    #[test]
    fn invalid_port_names_the_range() {
        let err = EngineError::InvalidPort(80);
        assert_eq!(
            err.to_string(),
            "port 80 is outside the allocatable range 3000-9000"
        );
    }
}
