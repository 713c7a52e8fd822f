//! Buildable project and its configuration surface.
//!
//! # Responsibility
//! - Own one project's `PropertyStore` and legacy fields behind a
//!   per-project reader/writer lock.
//! - Resolve properties through the template chain.
//! - Expose builders, publishers and build wrappers as owner-bound lists.
//! - Apply configuration submissions as one atomic update.
//! - Run legacy migration and owner binding on load.
//!
//! # Invariants
//! - Template links are weak and never form a cycle when set through
//!   `set_template`.
//! - The declared template name survives a missing, rejected or dropped
//!   template and is what gets persisted.
//! - No method holds more than one project's lock at a time.
//! - Submissions replace the project's step configuration wholesale: a
//!   descriptor missing from the submission is cleared.

use crate::extension::descriptor::{safe_key, ConfigurationError, StepKind};
use crate::extension::list::{ExtensionList, StepEntry};
use crate::extension::registry::ExtensionRegistry;
use crate::graph::GraphConsistencyError;
use crate::migration::{LegacyFieldMigrator, LegacyFields, LegacySlot, MigrationReport};
use crate::model::document::ConfigDocument;
use crate::model::record::{CellRecord, ProjectRecord};
use crate::property::cascade::{resolve_keys, CascadeLevel};
use crate::property::cell::{CellState, LocalLookup, PropertyCell};
use crate::property::store::PropertyStore;
use crate::property::value::PropertyValue;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Instant;

/// Property key holding the aggregate builder list.
pub const BUILDERS_PROPERTY: &str = "builders";
/// Property key holding the aggregate build-wrapper list.
pub const BUILD_WRAPPERS_PROPERTY: &str = "buildWrappers";

static PROJECT_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid project name regex")
});

/// Validated project name, unique within its parent scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn parse(raw: &str) -> Result<Self, ProjectNameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ProjectNameError::Empty);
        }
        if !PROJECT_NAME_RE.is_match(trimmed) {
            return Err(ProjectNameError::Invalid(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProjectName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectNameError {
    Empty,
    Invalid(String),
}

impl Display for ProjectNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "project name must not be empty"),
            Self::Invalid(value) => write!(f, "project name is invalid: {value}"),
        }
    }
}

impl Error for ProjectNameError {}

/// Step lists of one project resolved from a single consistent view.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStepLists {
    pub publishers: ExtensionList,
    pub builders: ExtensionList,
    pub build_wrappers: ExtensionList,
}

/// Outcome of one configuration submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionReport {
    pub publishers: usize,
    /// Builders configured on the project itself after the submission.
    pub builders: usize,
    pub build_wrappers: usize,
    /// Per-descriptor failures; the rest of the submission was applied.
    pub errors: Vec<ConfigurationError>,
}

impl SubmissionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Declared template plus the live link to it, if any.
#[derive(Debug, Default)]
struct TemplateLink {
    declared: Option<ProjectName>,
    link: Option<Weak<Project>>,
}

#[derive(Debug)]
struct ProjectState {
    properties: PropertyStore,
    legacy: LegacyFields,
}

/// A configured buildable job.
#[derive(Debug)]
pub struct Project {
    name: ProjectName,
    template: RwLock<TemplateLink>,
    state: RwLock<ProjectState>,
}

impl Project {
    pub fn new(name: ProjectName) -> Self {
        Self::from_parts(name, None, LegacyFields::default(), None)
    }

    fn from_parts(
        name: ProjectName,
        declared_template: Option<ProjectName>,
        legacy: LegacyFields,
        store: Option<PropertyStore>,
    ) -> Self {
        let properties = store.unwrap_or_else(|| PropertyStore::new(name.clone()));
        Self {
            name,
            template: RwLock::new(TemplateLink {
                declared: declared_template,
                link: None,
            }),
            state: RwLock::new(ProjectState { properties, legacy }),
        }
    }

    pub fn name(&self) -> &ProjectName {
        &self.name
    }

    /// Template project, if linked and still alive.
    pub fn template(&self) -> Option<Arc<Project>> {
        let guard = self.template.read().unwrap_or_else(PoisonError::into_inner);
        let weak = guard.link.as_ref()?;
        let template = weak.upgrade();
        if template.is_none() {
            debug!(
                "event=template_link module=project status=dangling project={}",
                self.name
            );
        }
        template
    }

    pub fn template_name(&self) -> Option<ProjectName> {
        self.template().map(|template| template.name.clone())
    }

    /// Template this project was configured with, linked or not.
    pub fn declared_template(&self) -> Option<ProjectName> {
        self.template
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .declared
            .clone()
    }

    /// Links `template` as fallback source, or unlinks with `None`.
    ///
    /// # Errors
    /// - `TemplateCycle` when the link would make the chain loop back to
    ///   this project (or the template's own chain already loops).
    pub fn set_template(&self, template: Option<&Arc<Project>>) -> Result<(), GraphConsistencyError> {
        let Some(template) = template else {
            let mut guard = self.template.write().unwrap_or_else(PoisonError::into_inner);
            *guard = TemplateLink::default();
            return Ok(());
        };

        let mut chain = vec![self.name.clone()];
        let mut visited = BTreeSet::from([self.name.clone()]);
        let mut current = Some(Arc::clone(template));
        while let Some(level) = current {
            chain.push(level.name.clone());
            if !visited.insert(level.name.clone()) {
                warn!(
                    "event=template_link module=project status=error project={} template={} error_code=template_cycle",
                    self.name, template.name
                );
                return Err(GraphConsistencyError::TemplateCycle { chain });
            }
            current = level.template();
        }

        {
            let mut guard = self.template.write().unwrap_or_else(PoisonError::into_inner);
            *guard = TemplateLink {
                declared: Some(template.name.clone()),
                link: Some(Arc::downgrade(template)),
            };
        }
        info!(
            "event=template_link module=project status=ok project={} template={}",
            self.name, template.name
        );
        Ok(())
    }

    /// Replaces the live link without validation or touching the declared
    /// name.
    #[cfg(test)]
    pub(crate) fn link_template(&self, template: Option<Weak<Project>>) {
        let mut guard = self.template.write().unwrap_or_else(PoisonError::into_inner);
        guard.link = template;
    }

    /// Resolves one property through the template chain.
    ///
    /// `Ok(None)` means no level holds a value.
    pub fn resolve(&self, key: &str) -> Result<Option<PropertyValue>, GraphConsistencyError> {
        let mut values = self.resolve_many(&[key])?;
        Ok(values.pop().flatten())
    }

    /// Resolves several keys; each project on the chain is read once.
    pub fn resolve_many(&self, keys: &[&str]) -> Result<Vec<Option<PropertyValue>>, GraphConsistencyError> {
        resolve_keys(ChainLevel::Root(self), keys)
    }

    pub fn set_property(&self, key: &str, value: PropertyValue) {
        self.write_state().properties.set(key, value);
    }

    /// Sets an explicit "no value" that shadows the template.
    pub fn clear_property(&self, key: &str) {
        self.write_state().properties.clear(key);
    }

    /// Drops the local override so the key inherits again.
    pub fn reset_property(&self, key: &str) -> bool {
        self.write_state().properties.reset(key)
    }

    /// Whether this project sets `key` itself.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.read_state()
            .properties
            .get(key)
            .is_some_and(PropertyCell::is_explicit)
    }

    /// Snapshot of the legacy step fields.
    pub fn legacy_fields(&self) -> LegacyFields {
        self.read_state().legacy.clone()
    }

    pub fn builders_list(&self) -> Result<ExtensionList, GraphConsistencyError> {
        let value = self.resolve(BUILDERS_PROPERTY)?;
        Ok(self.steps_or_empty(value, StepKind::Builder, BUILDERS_PROPERTY))
    }

    pub fn build_wrappers_list(&self) -> Result<ExtensionList, GraphConsistencyError> {
        let value = self.resolve(BUILD_WRAPPERS_PROPERTY)?;
        Ok(self.steps_or_empty(value, StepKind::BuildWrapper, BUILD_WRAPPERS_PROPERTY))
    }

    /// Publishers configured for every applicable publisher descriptor, in
    /// registry order, followed by configured publishers whose descriptor is
    /// no longer registered.
    pub fn publishers_list(&self, registry: &ExtensionRegistry) -> Result<ExtensionList, GraphConsistencyError> {
        Ok(self.resolved_step_lists(registry)?.publishers)
    }

    /// Resolved publisher of one descriptor.
    pub fn publisher(&self, descriptor_id: &str) -> Result<Option<StepEntry>, GraphConsistencyError> {
        let value = self.resolve(&safe_key(descriptor_id))?;
        Ok(value.and_then(|value| match value {
            PropertyValue::Step(mut entry) => {
                entry.bind(&self.name);
                Some(entry)
            }
            _ => None,
        }))
    }

    /// Resolves all three step lists from one read of each chain level.
    pub fn resolved_step_lists(
        &self,
        registry: &ExtensionRegistry,
    ) -> Result<ResolvedStepLists, GraphConsistencyError> {
        let publisher_keys: Vec<String> = registry
            .list_descriptors(StepKind::Publisher, &self.name)
            .iter()
            .map(|descriptor| descriptor.safe_key())
            .collect();
        let orphan_keys = self.orphan_publisher_keys(registry, &publisher_keys);
        let mut keys = vec![BUILDERS_PROPERTY, BUILD_WRAPPERS_PROPERTY];
        keys.extend(publisher_keys.iter().map(String::as_str));
        keys.extend(orphan_keys.iter().map(String::as_str));

        let mut values = self.resolve_many(&keys)?.into_iter();
        let builders = self.steps_or_empty(values.next().flatten(), StepKind::Builder, BUILDERS_PROPERTY);
        let build_wrappers = self.steps_or_empty(
            values.next().flatten(),
            StepKind::BuildWrapper,
            BUILD_WRAPPERS_PROPERTY,
        );
        let publishers = values
            .flatten()
            .filter_map(|value| match value {
                PropertyValue::Step(entry) => Some(entry),
                _ => None,
            })
            .collect();

        Ok(ResolvedStepLists {
            publishers: ExtensionList::unbound(StepKind::Publisher, publishers).bound_to(&self.name),
            builders,
            build_wrappers,
        })
    }

    /// Applies a configuration submission.
    ///
    /// Publishers and build wrappers are read per descriptor safe key;
    /// builders from the ordered `builders` fragment array, which is applied
    /// only if every fragment in it instantiates. Everything is
    /// computed and written under one write lock, so readers see either the
    /// previous or the new configuration.
    pub fn submit(&self, registry: &ExtensionRegistry, config: &ConfigDocument) -> SubmissionReport {
        let started_at = Instant::now();
        let mut report = SubmissionReport::default();
        let mut state = self.write_state();

        let publishers = registry.list_descriptors(StepKind::Publisher, &self.name);
        let mut publisher_updates = Vec::with_capacity(publishers.len());
        for descriptor in &publishers {
            let key = descriptor.safe_key();
            if !config.has(&key) {
                publisher_updates.push((key, None));
                continue;
            }
            let outcome = match config.get(&key) {
                Some(fragment) => StepEntry::instantiate(descriptor, fragment),
                None => Err(ConfigurationError::MalformedFragment(key.clone())),
            };
            match outcome {
                Ok(entry) => publisher_updates.push((key, Some(entry))),
                Err(err) => report.errors.push(err),
            }
        }

        let builders = ExtensionList::from_fragment_array(
            StepKind::Builder,
            config.get_array(BUILDERS_PROPERTY),
            registry,
            &self.name,
        );
        let builders_rejected = !builders.errors.is_empty();
        report.errors.extend(builders.errors);

        let previous_wrappers = match state.properties.lookup(BUILD_WRAPPERS_PROPERTY) {
            LocalLookup::Value(PropertyValue::Steps(list)) => list,
            _ => ExtensionList::empty(StepKind::BuildWrapper),
        };
        let wrappers = ExtensionList::from_descriptor_fragments(
            StepKind::BuildWrapper,
            config,
            &registry.list_descriptors(StepKind::BuildWrapper, &self.name),
            &previous_wrappers,
        );
        report.errors.extend(wrappers.errors);

        for (key, entry) in publisher_updates {
            match entry {
                Some(entry) => {
                    report.publishers += 1;
                    state.properties.set(&key, PropertyValue::Step(entry));
                }
                None => state.properties.clear(&key),
            }
        }
        if builders_rejected {
            report.builders = match state.properties.lookup(BUILDERS_PROPERTY) {
                LocalLookup::Value(PropertyValue::Steps(list)) => list.len(),
                _ => 0,
            };
        } else {
            report.builders = builders.list.len();
            state
                .properties
                .set(BUILDERS_PROPERTY, PropertyValue::Steps(builders.list));
        }
        report.build_wrappers = wrappers.list.len();
        state
            .properties
            .set(BUILD_WRAPPERS_PROPERTY, PropertyValue::Steps(wrappers.list));
        drop(state);

        for err in &report.errors {
            warn!(
                "event=config_submit module=project status=rejected project={} descriptor={} error={}",
                self.name,
                err.subject(),
                err
            );
        }
        info!(
            "event=config_submit module=project status=ok project={} publishers={} builders={} build_wrappers={} errors={} duration_ms={}",
            self.name,
            report.publishers,
            report.builders,
            report.build_wrappers,
            report.errors.len(),
            started_at.elapsed().as_millis()
        );
        report
    }

    /// Load hook for the persistence layer: migrates legacy fields, then
    /// binds every stored list to this project.
    ///
    /// Safe to call on every load.
    pub fn on_load(&self, registry: &ExtensionRegistry) -> MigrationReport {
        let mut state = self.write_state();
        let ProjectState { properties, legacy } = &mut *state;
        let report = LegacyFieldMigrator::new(registry).migrate(properties, legacy);
        properties.bind_values();
        let cells = properties.len();
        drop(state);

        info!(
            "event=project_load module=project status=ok project={} cells={} migrated={} warnings={}",
            self.name,
            cells,
            report.migrated.len(),
            report.warnings.len()
        );
        report
    }

    /// Restores an unlinked, unbound project from its persisted form.
    ///
    /// The template is linked by the caller; `on_load` must run before use.
    pub fn from_record(record: ProjectRecord, registry: &ExtensionRegistry) -> Result<Self, ProjectNameError> {
        let name = ProjectName::parse(&record.name)?;
        let declared_template = record
            .template
            .as_deref()
            .map(ProjectName::parse)
            .transpose()?;
        let mut store = PropertyStore::new(name.clone());
        for (key, cell) in record.properties {
            let state = match cell {
                CellRecord::Inherited => CellState::Inherited,
                CellRecord::Explicit { value } => {
                    CellState::Explicit(value.map(|value| PropertyValue::from_record(value, registry)))
                }
            };
            store.restore_cell(PropertyCell::with_state(key, name.clone(), state));
        }

        let legacy = LegacyFields {
            builders: LegacySlot::from_option(record.builders),
            publishers: LegacySlot::from_option(record.publishers),
            build_wrappers: LegacySlot::from_option(record.build_wrappers),
        };
        Ok(Self::from_parts(name, declared_template, legacy, Some(store)))
    }

    /// Persisted form of the current state.
    pub fn to_record(&self) -> ProjectRecord {
        let template = self.declared_template().map(|name| name.to_string());
        let state = self.read_state();
        let mut record = ProjectRecord::new(self.name.to_string());
        record.template = template;
        for cell in state.properties.iter() {
            let cell_record = match cell.state() {
                CellState::Inherited => CellRecord::Inherited,
                CellState::Explicit(value) => CellRecord::Explicit {
                    value: value.as_ref().map(PropertyValue::to_record),
                },
            };
            record.properties.insert(cell.key().to_string(), cell_record);
        }
        record.builders = state.legacy.builders.pending().cloned();
        record.publishers = state.legacy.publishers.pending().cloned();
        record.build_wrappers = state.legacy.build_wrappers.pending().cloned();
        record
    }

    /// Keys of explicit publisher cells on the template chain whose
    /// descriptor is not in `registry`.
    ///
    /// A cyclic chain stops the walk; the resolution that follows reports it.
    fn orphan_publisher_keys(&self, registry: &ExtensionRegistry, known: &[String]) -> Vec<String> {
        let mut keys = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut current = Some(ChainLevel::Root(self));
        while let Some(level) = current {
            let project = level.project();
            if !visited.insert(project.name.clone()) {
                break;
            }
            {
                let state = project.read_state();
                for cell in state.properties.iter() {
                    let CellState::Explicit(Some(PropertyValue::Step(entry))) = cell.state() else {
                        continue;
                    };
                    if registry.get(entry.descriptor_id()).is_none()
                        && !known.iter().any(|key| key == cell.key())
                    {
                        keys.insert(cell.key().to_string());
                    }
                }
            }
            current = project.template().map(ChainLevel::Template);
        }
        keys.into_iter().collect()
    }

    fn steps_or_empty(&self, value: Option<PropertyValue>, kind: StepKind, key: &str) -> ExtensionList {
        let list = match value {
            Some(PropertyValue::Steps(list)) if list.kind() == kind => list,
            Some(_) => {
                warn!(
                    "event=property_resolve module=project status=type_mismatch project={} key={}",
                    self.name, key
                );
                ExtensionList::empty(kind)
            }
            None => ExtensionList::empty(kind),
        };
        list.bound_to(&self.name)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Template chain level: the project resolution started at, or a template
/// reached through a weak link.
enum ChainLevel<'a> {
    Root(&'a Project),
    Template(Arc<Project>),
}

impl ChainLevel<'_> {
    fn project(&self) -> &Project {
        match self {
            Self::Root(project) => *project,
            Self::Template(project) => project.as_ref(),
        }
    }
}

impl CascadeLevel for ChainLevel<'_> {
    fn level_name(&self) -> ProjectName {
        self.project().name.clone()
    }

    fn lookup_level(&self, keys: &[&str]) -> (Vec<LocalLookup>, Option<Self>) {
        let project = self.project();
        let answers = {
            let state = project.read_state();
            keys.iter().map(|key| state.properties.lookup(key)).collect()
        };
        (answers, project.template().map(ChainLevel::Template))
    }
}

#[cfg(test)]
mod tests {
    use super::{Project, ProjectName, ProjectNameError};
    use crate::extension::registry::ExtensionRegistry;
    use crate::graph::GraphConsistencyError;
    use crate::model::record::ProjectRecord;
    use crate::property::value::PropertyValue;
    use std::sync::Arc;

    fn project(name: &str) -> Arc<Project> {
        Arc::new(Project::new(ProjectName::parse(name).unwrap()))
    }

    #[test]
    fn validates_project_names() {
        assert_eq!(ProjectName::parse("  ").unwrap_err(), ProjectNameError::Empty);
        assert!(matches!(
            ProjectName::parse("has space").unwrap_err(),
            ProjectNameError::Invalid(_)
        ));
        assert_eq!(ProjectName::parse(" core-lib_2.x ").unwrap().as_str(), "core-lib_2.x");
    }

    #[test]
    fn resolve_reports_cycles_linked_behind_the_validation() {
        let p = project("p");
        let q = project("q");
        p.link_template(Some(Arc::downgrade(&q)));
        q.link_template(Some(Arc::downgrade(&p)));

        let err = p.resolve("description").unwrap_err();
        assert!(matches!(err, GraphConsistencyError::TemplateCycle { .. }));
        assert!(p.builders_list().is_err());
    }

    #[test]
    fn set_template_rejects_cycles() {
        let p = project("p");
        let q = project("q");
        p.set_template(Some(&q)).unwrap();

        let err = q.set_template(Some(&p)).unwrap_err();
        match err {
            GraphConsistencyError::TemplateCycle { chain } => {
                let names: Vec<&str> = chain.iter().map(ProjectName::as_str).collect();
                assert_eq!(names, vec!["q", "p", "q"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(q.template().is_none());

        let err = p.set_template(Some(&p)).unwrap_err();
        assert!(matches!(err, GraphConsistencyError::TemplateCycle { .. }));
    }

    #[test]
    fn declared_template_outlives_the_link_and_is_persisted() {
        let registry = ExtensionRegistry::with_builtin_steps();
        let child = project("child");
        {
            let template = project("template");
            child.set_template(Some(&template)).unwrap();
        }
        assert!(child.template().is_none());
        assert_eq!(child.declared_template().unwrap().as_str(), "template");
        assert_eq!(child.to_record().template.as_deref(), Some("template"));

        let mut record = ProjectRecord::new("orphan");
        record.template = Some("not-yet-created".to_string());
        let orphan = Project::from_record(record, &registry).unwrap();
        assert!(orphan.template().is_none());
        assert_eq!(orphan.to_record().template.as_deref(), Some("not-yet-created"));

        child.set_template(None).unwrap();
        assert!(child.to_record().template.is_none());
    }

    #[test]
    fn dropped_template_ends_the_chain() {
        let child = project("child");
        {
            let template = project("template");
            template.set_property("description", PropertyValue::Text("t".to_string()));
            child.set_template(Some(&template)).unwrap();
            assert!(child.resolve("description").unwrap().is_some());
        }
        assert!(child.template().is_none());
        assert_eq!(child.resolve("description").unwrap(), None);
    }
}
