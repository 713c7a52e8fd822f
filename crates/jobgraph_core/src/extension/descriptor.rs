//! Build-step contracts and descriptor declarations.
//!
//! # Responsibility
//! - Define the `BuildStep` capability implemented by every pluggable step.
//! - Define `StepDescriptor`, the table entry mapping a stable id to a
//!   construction function.
//! - Define instantiation errors reported back to submitters.
//!
//! # Invariants
//! - Descriptor ids are lowercase dotted identifiers; the safe key is the id
//!   with `.` replaced by `-` and is what submissions use as field name.
//! - A descriptor only ever produces steps of its own `StepKind`.

use crate::graph::DependencyGraph;
use crate::model::document::ConfigDocument;
use crate::model::project::ProjectName;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Capability kind a descriptor contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Builder,
    Publisher,
    BuildWrapper,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builder => "builder",
            Self::Publisher => "publisher",
            Self::BuildWrapper => "build_wrapper",
        }
    }

    /// Whether at most one instance per descriptor may be configured.
    pub fn is_single_slot(self) -> bool {
        !matches!(self, Self::Builder)
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured build step instance.
///
/// Implementations hold their parsed parameters; execution is not part of
/// this contract.
pub trait BuildStep: Debug + Send + Sync {
    /// Contributes edges for `owner` into `graph`.
    ///
    /// Called once per graph rebuild for every project whose resolved lists
    /// contain this step. Steps that declare no relationships keep the
    /// default.
    fn build_dependency_graph(&self, owner: &ProjectName, graph: &mut DependencyGraph) {
        let _ = (owner, graph);
    }
}

/// Parameter-level failure raised by a step factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    Missing(&'static str),
    Invalid { field: &'static str, reason: String },
}

impl FieldError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

pub type StepFactory =
    Arc<dyn Fn(&ConfigDocument) -> Result<Arc<dyn BuildStep>, FieldError> + Send + Sync>;
pub type Applicability = Arc<dyn Fn(&ProjectName) -> bool + Send + Sync>;

/// Registry-side type descriptor for one kind of build step.
#[derive(Clone)]
pub struct StepDescriptor {
    id: String,
    kind: StepKind,
    display_name: String,
    factory: StepFactory,
    applicability: Option<Applicability>,
}

impl StepDescriptor {
    pub fn new<F>(id: impl Into<String>, kind: StepKind, display_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConfigDocument) -> Result<Arc<dyn BuildStep>, FieldError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            factory: Arc::new(factory),
            applicability: None,
        }
    }

    /// Restricts the descriptor to projects accepted by `predicate`.
    pub fn applicable_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ProjectName) -> bool + Send + Sync + 'static,
    {
        self.applicability = Some(Arc::new(predicate));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Field name used for this descriptor in submissions and for its
    /// per-descriptor property key.
    pub fn safe_key(&self) -> String {
        safe_key(&self.id)
    }

    pub fn is_applicable(&self, project: &ProjectName) -> bool {
        self.applicability
            .as_ref()
            .map_or(true, |predicate| predicate(project))
    }

    /// Instantiates one step from its configuration fragment.
    pub fn instantiate(&self, config: &ConfigDocument) -> Result<Arc<dyn BuildStep>, ConfigurationError> {
        (self.factory)(config).map_err(|err| match err {
            FieldError::Missing(field) => ConfigurationError::MissingField {
                descriptor: self.id.clone(),
                field,
            },
            FieldError::Invalid { field, reason } => ConfigurationError::InvalidField {
                descriptor: self.id.clone(),
                field,
                reason,
            },
        })
    }
}

impl Debug for StepDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Converts a descriptor id into its submission-safe key.
pub fn safe_key(descriptor_id: &str) -> String {
    descriptor_id.replace('.', "-")
}

/// Submitted fragment could not be turned into a step.
///
/// Aborts only the update of the descriptor it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    UnknownDescriptor(String),
    KindMismatch {
        descriptor: String,
        expected: StepKind,
        found: StepKind,
    },
    MalformedFragment(String),
    MissingField {
        descriptor: String,
        field: &'static str,
    },
    InvalidField {
        descriptor: String,
        field: &'static str,
        reason: String,
    },
}

impl ConfigurationError {
    /// Descriptor id or submitted key the error refers to.
    pub fn subject(&self) -> &str {
        match self {
            Self::UnknownDescriptor(key) | Self::MalformedFragment(key) => key,
            Self::KindMismatch { descriptor, .. }
            | Self::MissingField { descriptor, .. }
            | Self::InvalidField { descriptor, .. } => descriptor,
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDescriptor(key) => write!(f, "no build step descriptor for `{key}`"),
            Self::KindMismatch {
                descriptor,
                expected,
                found,
            } => write!(
                f,
                "descriptor `{descriptor}` is a {found}, expected a {expected}"
            ),
            Self::MalformedFragment(key) => {
                write!(f, "configuration fragment `{key}` is not an object")
            }
            Self::MissingField { descriptor, field } => {
                write!(f, "`{descriptor}` requires field `{field}`")
            }
            Self::InvalidField {
                descriptor,
                field,
                reason,
            } => write!(f, "`{descriptor}` field `{field}` is invalid: {reason}"),
        }
    }
}

impl Error for ConfigurationError {}
