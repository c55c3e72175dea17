use serde::{Deserialize, Serialize};

/// Stages of one deploy attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployPhase {
    Idle,
    Fetching,
    ConfiguringBuild,
    Building,
    Swapping,
    Verifying,
    Committed,
    RolledBack,
}

impl DeployPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployPhase::Committed | DeployPhase::RolledBack)
    }

    /// Successor on the success path.
    pub fn next(&self) -> Option<DeployPhase> {
        match self {
            DeployPhase::Idle => Some(DeployPhase::Fetching),
            DeployPhase::Fetching => Some(DeployPhase::ConfiguringBuild),
            DeployPhase::ConfiguringBuild => Some(DeployPhase::Building),
            DeployPhase::Building => Some(DeployPhase::Swapping),
            DeployPhase::Swapping => Some(DeployPhase::Verifying),
            DeployPhase::Verifying => Some(DeployPhase::Committed),
            DeployPhase::Committed | DeployPhase::RolledBack => None,
        }
    }

    pub fn can_transition_to(&self, next: DeployPhase) -> bool {
        if self.next() == Some(next) {
            return true;
        }
        next == DeployPhase::RolledBack && !self.is_terminal() && *self != DeployPhase::Idle
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeployPhase::Idle => "idle",
            DeployPhase::Fetching => "fetching source",
            DeployPhase::ConfiguringBuild => "configuring build",
            DeployPhase::Building => "building image",
            DeployPhase::Swapping => "swapping containers",
            DeployPhase::Verifying => "verifying",
            DeployPhase::Committed => "committed",
            DeployPhase::RolledBack => "rolled back",
        }
    }
}
