//! Core domain logic for jobgraph.
//! Projects, their cascading build-step configuration and the dependency
//! graph derived from it live here; this crate owns every invariant.

pub mod db;
pub mod extension;
pub mod graph;
pub mod logging;
pub mod migration;
pub mod model;
pub mod property;
pub mod repo;
pub mod service;

pub use extension::descriptor::{BuildStep, ConfigurationError, StepDescriptor, StepKind};
pub use extension::list::{ExtensionList, StepEntry};
pub use extension::registry::{ExtensionRegistry, RegistryError};
pub use graph::{BuildOrder, Dependency, DependencyGraph, DependencyGraphBuilder, GraphConsistencyError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use migration::{LegacyFieldMigrator, MigrationReport, MigrationWarning};
pub use model::document::ConfigDocument;
pub use model::project::{Project, ProjectName, ProjectNameError, SubmissionReport};
pub use model::record::ProjectRecord;
pub use property::value::PropertyValue;
pub use repo::project_repo::{ProjectRepository, RepoError, RepoResult, SqliteProjectRepository};
pub use service::project_service::{LoadedProjects, ProjectService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ExtensionRegistry};

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn builtin_registry_is_populated() {
        assert!(!ExtensionRegistry::with_builtin_steps().is_empty());
    }
}
