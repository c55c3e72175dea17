//! Engine events and the observers that receive them.
//!
//! Observers are passed to each deploy/provision call; the engine holds no
//! global broadcaster.

use tracing::info;

use crate::deploy::phase::DeployPhase;
use crate::model::HostStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    DeployPhase { project: String, phase: DeployPhase },
    DeployLog { project: String, line: String },
    ProvisionStatus { host: String, status: HostStatus },
    ProvisionProgress { host: String, percent: u8, message: String },
    ProvisionLog { host: String, line: String },
}

pub trait Observer: Send + Sync {
    fn notify(&self, event: EngineEvent);
}

/// Writes events to the tracing subscriber.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn notify(&self, event: EngineEvent) {
        match event {
            EngineEvent::DeployPhase { project, phase } => info!("[{}] phase {:?}", project, phase),
            EngineEvent::DeployLog { project, line } => info!("[{}] {}", project, line),
            EngineEvent::ProvisionStatus { host, status } => info!("[{}] status {}", host, status),
            EngineEvent::ProvisionProgress {
                host,
                percent,
                message,
            } => info!("[{}] {}% {}", host, percent, message),
            EngineEvent::ProvisionLog { host, line } => info!("[{}] {}", host, line),
        }
    }
}
