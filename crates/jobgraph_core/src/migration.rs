//! One-shot migration of legacy step fields into project properties.
//!
//! # Responsibility
//! - Move `builders`, `buildWrappers` and `publishers` values found in
//!   older records into the project's `PropertyStore`.
//! - Mark each legacy field consumed so it is never consulted again.
//!
//! # Invariants
//! - `migrate` is idempotent: a second run leaves the store unchanged.
//! - Builders and build wrappers are only migrated while the store has no
//!   cell for their key; an existing cell means the project was already
//!   migrated or configured afterwards.
//! - Publishers are always merged without overwrite and their legacy field
//!   is consumed unconditionally, because they live in per-descriptor cells
//!   and no single key can tell whether migration happened.
//! - Legacy entries naming unknown descriptors are dropped with a warning;
//!   migration itself never fails.

use crate::extension::descriptor::{safe_key, ConfigurationError, StepKind};
use crate::extension::list::{ExtensionList, StepEntry};
use crate::extension::registry::ExtensionRegistry;
use crate::model::project::{BUILDERS_PROPERTY, BUILD_WRAPPERS_PROPERTY};
use crate::model::record::StepRecord;
use crate::property::store::PropertyStore;
use crate::property::value::PropertyValue;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const LEGACY_BUILDERS_FIELD: &str = "builders";
pub const LEGACY_PUBLISHERS_FIELD: &str = "publishers";
pub const LEGACY_BUILD_WRAPPERS_FIELD: &str = "buildWrappers";

/// Deprecated direct field, consumed at most once.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacySlot<T> {
    /// The record never carried this field.
    Absent,
    /// Value read from an older record, not yet migrated.
    Pending(T),
    /// Migrated or discarded; never read again.
    Consumed,
}

impl<T> LegacySlot<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Pending(value),
            None => Self::Absent,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn pending(&self) -> Option<&T> {
        match self {
            Self::Pending(value) => Some(value),
            _ => None,
        }
    }

    /// Takes a pending value and marks the slot consumed.
    pub fn take(&mut self) -> Option<T> {
        if !self.is_pending() {
            return None;
        }
        match std::mem::replace(self, Self::Consumed) {
            Self::Pending(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> Default for LegacySlot<T> {
    fn default() -> Self {
        Self::Absent
    }
}

/// Legacy step fields of one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyFields {
    pub builders: LegacySlot<Vec<StepRecord>>,
    pub publishers: LegacySlot<Vec<StepRecord>>,
    pub build_wrappers: LegacySlot<Vec<StepRecord>>,
}

impl LegacyFields {
    pub fn has_pending(&self) -> bool {
        self.builders.is_pending() || self.publishers.is_pending() || self.build_wrappers.is_pending()
    }
}

/// Legacy entry dropped during migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationWarning {
    UnknownDescriptor {
        field: &'static str,
        descriptor: String,
    },
    KindMismatch {
        field: &'static str,
        descriptor: String,
        found: StepKind,
    },
    InvalidConfig {
        field: &'static str,
        error: ConfigurationError,
    },
    DuplicateDescriptor {
        field: &'static str,
        descriptor: String,
    },
}

impl MigrationWarning {
    pub fn field(&self) -> &'static str {
        match self {
            Self::UnknownDescriptor { field, .. }
            | Self::KindMismatch { field, .. }
            | Self::InvalidConfig { field, .. }
            | Self::DuplicateDescriptor { field, .. } => field,
        }
    }
}

impl Display for MigrationWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDescriptor { field, descriptor } => write!(
                f,
                "legacy `{field}` entry `{descriptor}` has no registered descriptor; dropped"
            ),
            Self::KindMismatch {
                field,
                descriptor,
                found,
            } => write!(
                f,
                "legacy `{field}` entry `{descriptor}` is a {found}; dropped"
            ),
            Self::InvalidConfig { field, error } => {
                write!(f, "legacy `{field}` entry dropped: {error}")
            }
            Self::DuplicateDescriptor { field, descriptor } => write!(
                f,
                "legacy `{field}` holds `{descriptor}` more than once; kept the first"
            ),
        }
    }
}

impl Error for MigrationWarning {}

/// What one `migrate` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy fields whose value was written into the store.
    pub migrated: Vec<&'static str>,
    /// Legacy fields dropped because the store already had the key.
    pub discarded: Vec<&'static str>,
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.migrated.is_empty() && self.discarded.is_empty() && self.warnings.is_empty()
    }
}

/// Converts legacy fields into property cells.
pub struct LegacyFieldMigrator<'reg> {
    registry: &'reg ExtensionRegistry,
}

impl<'reg> LegacyFieldMigrator<'reg> {
    pub fn new(registry: &'reg ExtensionRegistry) -> Self {
        Self { registry }
    }

    /// Migrates every pending legacy field of one project.
    pub fn migrate(&self, store: &mut PropertyStore, legacy: &mut LegacyFields) -> MigrationReport {
        let mut report = MigrationReport::default();
        self.migrate_list(
            store,
            &mut legacy.builders,
            LEGACY_BUILDERS_FIELD,
            BUILDERS_PROPERTY,
            StepKind::Builder,
            &mut report,
        );
        self.migrate_list(
            store,
            &mut legacy.build_wrappers,
            LEGACY_BUILD_WRAPPERS_FIELD,
            BUILD_WRAPPERS_PROPERTY,
            StepKind::BuildWrapper,
            &mut report,
        );
        self.migrate_publishers(store, &mut legacy.publishers, &mut report);

        for warning in &report.warnings {
            warn!(
                "event=legacy_migrate module=migration status=dropped project={} field={} warning={}",
                store.owner(),
                warning.field(),
                warning
            );
        }
        report
    }

    fn migrate_list(
        &self,
        store: &mut PropertyStore,
        slot: &mut LegacySlot<Vec<StepRecord>>,
        field: &'static str,
        key: &str,
        kind: StepKind,
        report: &mut MigrationReport,
    ) {
        if store.contains(key) {
            if slot.take().is_some() {
                debug!(
                    "event=legacy_migrate module=migration status=discarded project={} field={}",
                    store.owner(),
                    field
                );
                report.discarded.push(field);
            }
            return;
        }

        let Some(records) = slot.take() else {
            return;
        };
        let entries = self.instantiate_all(records, field, kind, report);
        let count = entries.len();
        store.set(key, PropertyValue::Steps(ExtensionList::unbound(kind, entries)));
        report.migrated.push(field);
        info!(
            "event=legacy_migrate module=migration status=ok project={} field={} steps={}",
            store.owner(),
            field,
            count
        );
    }

    fn migrate_publishers(
        &self,
        store: &mut PropertyStore,
        slot: &mut LegacySlot<Vec<StepRecord>>,
        report: &mut MigrationReport,
    ) {
        let Some(records) = slot.take() else {
            return;
        };
        let field = LEGACY_PUBLISHERS_FIELD;
        let entries = self.instantiate_all(records, field, StepKind::Publisher, report);

        let mut converted = PropertyStore::new(store.owner().clone());
        for entry in entries {
            converted.set(&safe_key(entry.descriptor_id()), PropertyValue::Step(entry));
        }
        let written = store.merge(&converted, false);
        report.migrated.push(field);
        info!(
            "event=legacy_migrate module=migration status=ok project={} field={} steps={} written={}",
            store.owner(),
            field,
            converted.len(),
            written
        );
    }

    fn instantiate_all(
        &self,
        records: Vec<StepRecord>,
        field: &'static str,
        kind: StepKind,
        report: &mut MigrationReport,
    ) -> Vec<StepEntry> {
        let mut entries = Vec::with_capacity(records.len());
        let mut seen = BTreeSet::new();

        for record in records {
            let Some(descriptor) = self.registry.get(&record.descriptor) else {
                report.warnings.push(MigrationWarning::UnknownDescriptor {
                    field,
                    descriptor: record.descriptor,
                });
                continue;
            };
            if descriptor.kind() != kind {
                report.warnings.push(MigrationWarning::KindMismatch {
                    field,
                    descriptor: record.descriptor,
                    found: descriptor.kind(),
                });
                continue;
            }
            if kind.is_single_slot() && !seen.insert(record.descriptor.clone()) {
                report.warnings.push(MigrationWarning::DuplicateDescriptor {
                    field,
                    descriptor: record.descriptor,
                });
                continue;
            }
            match StepEntry::instantiate(descriptor, record.config) {
                Ok(entry) => entries.push(entry),
                Err(error) => report
                    .warnings
                    .push(MigrationWarning::InvalidConfig { field, error }),
            }
        }
        entries
    }
}
