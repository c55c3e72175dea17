pub mod host;
pub mod project;

pub use host::{Host, HostStatus, OsFamily, OsInfo};
pub use project::{
    BuildSpec, Deployment, DeploymentStatus, GitAuth, Project, ProjectStatus, SourceSpec,
};
