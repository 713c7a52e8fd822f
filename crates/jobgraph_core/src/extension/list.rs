//! Ordered, owner-bound collections of configured build steps.
//!
//! # Responsibility
//! - Keep configured step entries in insertion order with their descriptor
//!   id and submitted configuration.
//! - Bind entries to an owning project after construction.
//! - Rebuild lists from submissions with full-replace semantics.
//! - Forward dependency-graph contributions in insertion order.
//!
//! # Invariants
//! - A list is constructed unbound; `bind` must run before the list is used
//!   for graph building.
//! - `to_map` is only meaningful for single-slot kinds and reports duplicate
//!   descriptors instead of silently dropping entries.
//! - Entries whose descriptor could not be resolved keep their configuration
//!   so they survive a save round-trip.

use crate::extension::descriptor::{BuildStep, ConfigurationError, StepDescriptor, StepKind};
use crate::extension::registry::ExtensionRegistry;
use crate::graph::{DependencyGraph, GraphConsistencyError};
use crate::model::document::ConfigDocument;
use crate::model::project::ProjectName;
use crate::model::record::StepRecord;
use log::warn;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Field carrying the descriptor safe key inside each builder fragment.
pub const STEP_KIND_FIELD: &str = "kind";

/// One configured step: descriptor id, configuration and instance.
#[derive(Clone)]
pub struct StepEntry {
    descriptor: String,
    config: ConfigDocument,
    instance: Option<Arc<dyn BuildStep>>,
    owner: Option<ProjectName>,
}

impl StepEntry {
    /// Instantiates a fresh, unbound entry through `descriptor`.
    pub fn instantiate(
        descriptor: &StepDescriptor,
        config: ConfigDocument,
    ) -> Result<Self, ConfigurationError> {
        let instance = descriptor.instantiate(&config)?;
        Ok(Self {
            descriptor: descriptor.id().to_string(),
            config,
            instance: Some(instance),
            owner: None,
        })
    }

    /// Creates an entry whose descriptor is not available.
    pub fn unresolved(descriptor_id: impl Into<String>, config: ConfigDocument) -> Self {
        Self {
            descriptor: descriptor_id.into(),
            config,
            instance: None,
            owner: None,
        }
    }

    /// Restores an entry from persisted state.
    ///
    /// Unknown descriptors or configurations that no longer instantiate are
    /// kept as unresolved entries.
    pub fn from_record(record: StepRecord, registry: &ExtensionRegistry) -> Self {
        let Some(descriptor) = registry.get(&record.descriptor) else {
            warn!(
                "event=step_restore module=extension status=unresolved descriptor={} reason=unknown_descriptor",
                record.descriptor
            );
            return Self::unresolved(record.descriptor, record.config);
        };

        match Self::instantiate(descriptor, record.config.clone()) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    "event=step_restore module=extension status=unresolved descriptor={} reason=invalid_config error={}",
                    record.descriptor, err
                );
                Self::unresolved(record.descriptor, record.config)
            }
        }
    }

    pub fn to_record(&self) -> StepRecord {
        StepRecord {
            descriptor: self.descriptor.clone(),
            config: self.config.clone(),
        }
    }

    pub fn descriptor_id(&self) -> &str {
        &self.descriptor
    }

    pub fn config(&self) -> &ConfigDocument {
        &self.config
    }

    pub fn instance(&self) -> Option<&Arc<dyn BuildStep>> {
        self.instance.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.instance.is_some()
    }

    pub fn owner(&self) -> Option<&ProjectName> {
        self.owner.as_ref()
    }

    pub(crate) fn bind(&mut self, owner: &ProjectName) {
        self.owner = Some(owner.clone());
    }
}

impl PartialEq for StepEntry {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.config == other.config
    }
}

impl Debug for StepEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEntry")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .field("resolved", &self.is_resolved())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Ordered collection of steps of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionList {
    kind: StepKind,
    owner: Option<ProjectName>,
    entries: Vec<StepEntry>,
}

/// Result of rebuilding a list from a submission.
#[derive(Debug, Clone)]
pub struct ListSubmission {
    pub list: ExtensionList,
    pub errors: Vec<ConfigurationError>,
}

impl ExtensionList {
    /// Creates an unbound list from entries.
    pub fn unbound(kind: StepKind, entries: Vec<StepEntry>) -> Self {
        Self {
            kind,
            owner: None,
            entries,
        }
    }

    pub fn empty(kind: StepKind) -> Self {
        Self::unbound(kind, vec![])
    }

    /// Rebinds the list and every contained entry to `owner`.
    pub fn bind(&mut self, owner: &ProjectName) {
        self.owner = Some(owner.clone());
        for entry in &mut self.entries {
            entry.bind(owner);
        }
    }

    /// Consuming form of [`ExtensionList::bind`].
    pub fn bound_to(mut self, owner: &ProjectName) -> Self {
        self.bind(owner);
        self
    }

    pub fn owner(&self) -> Option<&ProjectName> {
        self.owner.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.owner.is_some()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepEntry> {
        self.entries.iter()
    }

    pub fn push(&mut self, mut entry: StepEntry) {
        if let Some(owner) = &self.owner {
            entry.bind(owner);
        }
        self.entries.push(entry);
    }

    /// First entry produced by `descriptor_id`.
    pub fn get(&self, descriptor_id: &str) -> Option<&StepEntry> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor_id() == descriptor_id)
    }

    pub fn to_list(&self) -> Vec<StepEntry> {
        self.entries.clone()
    }

    /// Keys entries by descriptor id.
    pub fn to_map(&self) -> Result<BTreeMap<String, StepEntry>, ExtensionListError> {
        let mut map = BTreeMap::new();
        for entry in &self.entries {
            if map
                .insert(entry.descriptor_id().to_string(), entry.clone())
                .is_some()
            {
                return Err(ExtensionListError::DuplicateDescriptor {
                    kind: self.kind,
                    descriptor: entry.descriptor_id().to_string(),
                });
            }
        }
        Ok(map)
    }

    pub fn to_records(&self) -> Vec<StepRecord> {
        self.entries.iter().map(StepEntry::to_record).collect()
    }

    /// Restores an unbound list from persisted records.
    pub fn from_records(
        kind: StepKind,
        records: Vec<StepRecord>,
        registry: &ExtensionRegistry,
    ) -> Self {
        let entries = records
            .into_iter()
            .map(|record| StepEntry::from_record(record, registry))
            .collect();
        Self::unbound(kind, entries)
    }

    /// Rebuilds a single-slot list from per-descriptor fragments.
    ///
    /// Each descriptor in `descriptors` is looked up under its safe key; a
    /// missing fragment removes that step. A fragment that fails to
    /// instantiate keeps the `previous` entry of that descriptor, if any, and
    /// reports the error.
    pub fn from_descriptor_fragments(
        kind: StepKind,
        config: &ConfigDocument,
        descriptors: &[&StepDescriptor],
        previous: &ExtensionList,
    ) -> ListSubmission {
        let mut entries = Vec::new();
        let mut errors = Vec::new();

        for descriptor in descriptors {
            let key = descriptor.safe_key();
            if !config.has(&key) {
                continue;
            }
            let outcome = match config.get(&key) {
                Some(fragment) => StepEntry::instantiate(descriptor, fragment),
                None => Err(ConfigurationError::MalformedFragment(key)),
            };
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    if let Some(kept) = previous.get(descriptor.id()) {
                        entries.push(kept.clone());
                    }
                    errors.push(err);
                }
            }
        }

        ListSubmission {
            list: Self::unbound(kind, entries),
            errors,
        }
    }

    /// Rebuilds a multi-instance list from an ordered fragment array.
    ///
    /// Every fragment names its descriptor through [`STEP_KIND_FIELD`]. Bad
    /// fragments are dropped and reported; the others keep submission order.
    pub fn from_fragment_array(
        kind: StepKind,
        fragments: Vec<ConfigDocument>,
        registry: &ExtensionRegistry,
        project: &ProjectName,
    ) -> ListSubmission {
        let mut entries = Vec::new();
        let mut errors = Vec::new();

        for (index, fragment) in fragments.into_iter().enumerate() {
            let Some(key) = fragment.str(STEP_KIND_FIELD).map(str::to_string) else {
                errors.push(ConfigurationError::MalformedFragment(format!(
                    "{}[{index}]",
                    kind.as_str()
                )));
                continue;
            };
            let Some(descriptor) = registry
                .get_by_safe_key(&key)
                .filter(|descriptor| descriptor.is_applicable(project))
            else {
                errors.push(ConfigurationError::UnknownDescriptor(key));
                continue;
            };
            if descriptor.kind() != kind {
                errors.push(ConfigurationError::KindMismatch {
                    descriptor: descriptor.id().to_string(),
                    expected: kind,
                    found: descriptor.kind(),
                });
                continue;
            }
            match StepEntry::instantiate(descriptor, fragment) {
                Ok(entry) => entries.push(entry),
                Err(err) => errors.push(err),
            }
        }

        ListSubmission {
            list: Self::unbound(kind, entries),
            errors,
        }
    }

    /// Asks every entry, in insertion order, to contribute edges for
    /// `project`.
    ///
    /// Entries whose descriptor is no longer registered, or that never
    /// resolved, are skipped and recorded on the graph.
    pub fn build_dependency_graph(
        &self,
        registry: &ExtensionRegistry,
        project: &ProjectName,
        graph: &mut DependencyGraph,
    ) {
        if !self.is_bound() {
            graph.record_skipped(GraphConsistencyError::UnboundList {
                project: project.clone(),
                kind: self.kind,
            });
            return;
        }

        for entry in &self.entries {
            let instance = match (registry.get(entry.descriptor_id()), entry.instance()) {
                (Some(_), Some(instance)) => instance,
                _ => {
                    graph.record_skipped(GraphConsistencyError::UnresolvableDescriptor {
                        project: project.clone(),
                        kind: self.kind,
                        descriptor: entry.descriptor_id().to_string(),
                    });
                    continue;
                }
            };
            instance.build_dependency_graph(project, graph);
        }
    }
}

/// Contract violations on list views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionListError {
    DuplicateDescriptor { kind: StepKind, descriptor: String },
}

impl Display for ExtensionListError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateDescriptor { kind, descriptor } => write!(
                f,
                "{kind} list holds more than one `{descriptor}` step; map view is undefined"
            ),
        }
    }
}

impl Error for ExtensionListError {}
