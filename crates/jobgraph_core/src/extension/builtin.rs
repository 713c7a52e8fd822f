//! Built-in build steps shipped with the core.

use crate::extension::descriptor::{BuildStep, FieldError, StepDescriptor, StepKind};
use crate::graph::DependencyGraph;
use crate::model::document::ConfigDocument;
use crate::model::project::ProjectName;
use std::sync::Arc;

pub const SHELL_BUILDER_ID: &str = "builtin.builder.shell";
pub const COPY_ARTIFACT_BUILDER_ID: &str = "builtin.builder.copy_artifact";
pub const ARTIFACT_ARCHIVER_ID: &str = "builtin.publisher.archive";
pub const BUILD_TRIGGER_ID: &str = "builtin.publisher.trigger";
pub const TIMEOUT_WRAPPER_ID: &str = "builtin.wrapper.timeout";
pub const WORKSPACE_CLEANUP_WRAPPER_ID: &str = "builtin.wrapper.workspace_cleanup";

const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

/// Returns the built-in descriptors in registration order.
pub fn builtin_descriptors() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new(SHELL_BUILDER_ID, StepKind::Builder, "Execute shell", |config| {
            ShellBuilder::from_config(config).map(into_step)
        }),
        StepDescriptor::new(
            COPY_ARTIFACT_BUILDER_ID,
            StepKind::Builder,
            "Copy artifacts from another project",
            |config| CopyArtifactBuilder::from_config(config).map(into_step),
        ),
        StepDescriptor::new(
            ARTIFACT_ARCHIVER_ID,
            StepKind::Publisher,
            "Archive the artifacts",
            |config| ArtifactArchiver::from_config(config).map(into_step),
        ),
        StepDescriptor::new(
            BUILD_TRIGGER_ID,
            StepKind::Publisher,
            "Build other projects",
            |config| BuildTrigger::from_config(config).map(into_step),
        ),
        StepDescriptor::new(
            TIMEOUT_WRAPPER_ID,
            StepKind::BuildWrapper,
            "Abort the build if it's stuck",
            |config| TimeoutWrapper::from_config(config).map(into_step),
        ),
        StepDescriptor::new(
            WORKSPACE_CLEANUP_WRAPPER_ID,
            StepKind::BuildWrapper,
            "Delete workspace before build starts",
            |_| Ok(into_step(WorkspaceCleanupWrapper)),
        ),
    ]
}

fn into_step<S: BuildStep + 'static>(step: S) -> Arc<dyn BuildStep> {
    Arc::new(step)
}

fn project_field(config: &ConfigDocument, field: &'static str) -> Result<ProjectName, FieldError> {
    let raw = config.str(field).ok_or(FieldError::Missing(field))?;
    ProjectName::parse(raw).map_err(|err| FieldError::invalid(field, err.to_string()))
}

/// Runs one shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellBuilder {
    pub command: String,
}

impl ShellBuilder {
    fn from_config(config: &ConfigDocument) -> Result<Self, FieldError> {
        let command = config.str("command").ok_or(FieldError::Missing("command"))?;
        Ok(Self {
            command: command.to_string(),
        })
    }
}

impl BuildStep for ShellBuilder {}

/// Copies artifacts of another project into the workspace.
///
/// The source project must have been built first, so it is recorded as an
/// upstream dependency of the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyArtifactBuilder {
    pub project: ProjectName,
    pub filter: Option<String>,
}

impl CopyArtifactBuilder {
    fn from_config(config: &ConfigDocument) -> Result<Self, FieldError> {
        Ok(Self {
            project: project_field(config, "project")?,
            filter: config.str("filter").map(str::to_string),
        })
    }
}

impl BuildStep for CopyArtifactBuilder {
    fn build_dependency_graph(&self, owner: &ProjectName, graph: &mut DependencyGraph) {
        graph.add_dependency(&self.project, owner);
    }
}

/// Archives files matching a pattern after the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactArchiver {
    pub artifacts: String,
    pub latest_only: bool,
}

impl ArtifactArchiver {
    fn from_config(config: &ConfigDocument) -> Result<Self, FieldError> {
        let artifacts = config
            .str("artifacts")
            .ok_or(FieldError::Missing("artifacts"))?;
        Ok(Self {
            artifacts: artifacts.to_string(),
            latest_only: config.bool("latest_only").unwrap_or(false),
        })
    }
}

impl BuildStep for ArtifactArchiver {}

/// Worst result of the upstream build that still triggers downstream builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultThreshold {
    Success,
    Unstable,
    Failure,
}

impl ResultThreshold {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "unstable" => Some(Self::Unstable),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Schedules downstream projects after a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTrigger {
    pub child_projects: Vec<ProjectName>,
    pub threshold: ResultThreshold,
}

impl BuildTrigger {
    fn from_config(config: &ConfigDocument) -> Result<Self, FieldError> {
        let names = config.string_list("child_projects");
        if names.is_empty() {
            return Err(FieldError::Missing("child_projects"));
        }
        let mut child_projects = Vec::with_capacity(names.len());
        for name in names {
            let project = ProjectName::parse(&name)
                .map_err(|err| FieldError::invalid("child_projects", err.to_string()))?;
            if !child_projects.contains(&project) {
                child_projects.push(project);
            }
        }

        let threshold = match config.str("threshold") {
            Some(raw) => ResultThreshold::parse(raw).ok_or_else(|| {
                FieldError::invalid("threshold", format!("expected success|unstable|failure, got `{raw}`"))
            })?,
            None => ResultThreshold::Success,
        };

        Ok(Self {
            child_projects,
            threshold,
        })
    }
}

impl BuildStep for BuildTrigger {
    fn build_dependency_graph(&self, owner: &ProjectName, graph: &mut DependencyGraph) {
        for child in &self.child_projects {
            graph.add_dependency(owner, child);
        }
    }
}

/// Aborts builds running longer than a fixed number of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutWrapper {
    pub minutes: u64,
}

impl TimeoutWrapper {
    fn from_config(config: &ConfigDocument) -> Result<Self, FieldError> {
        let minutes = config.u64("minutes").ok_or(FieldError::Missing("minutes"))?;
        if minutes == 0 || minutes > MAX_TIMEOUT_MINUTES {
            return Err(FieldError::invalid(
                "minutes",
                format!("must be between 1 and {MAX_TIMEOUT_MINUTES}"),
            ));
        }
        Ok(Self { minutes })
    }
}

impl BuildStep for TimeoutWrapper {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceCleanupWrapper;

impl BuildStep for WorkspaceCleanupWrapper {}
