//! Property values carried by cells.

use crate::extension::descriptor::StepKind;
use crate::extension::list::{ExtensionList, StepEntry};
use crate::extension::registry::ExtensionRegistry;
use crate::model::project::ProjectName;
use crate::model::record::ValueRecord;

/// Value of one project property.
///
/// Step-bearing variants are bound to the project that owns the cell.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Aggregate list (builders, build wrappers).
    Steps(ExtensionList),
    /// One per-descriptor step slot (publishers).
    Step(StepEntry),
    Text(String),
    Flag(bool),
    Number(i64),
}

impl PropertyValue {
    /// Rebinds contained steps to `owner`; scalars are untouched.
    pub fn bind(&mut self, owner: &ProjectName) {
        match self {
            Self::Steps(list) => list.bind(owner),
            Self::Step(entry) => entry.bind(owner),
            Self::Text(_) | Self::Flag(_) | Self::Number(_) => {}
        }
    }

    pub fn as_steps(&self) -> Option<&ExtensionList> {
        match self {
            Self::Steps(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_step(&self) -> Option<&StepEntry> {
        match self {
            Self::Step(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn to_record(&self) -> ValueRecord {
        match self {
            Self::Steps(list) => ValueRecord::Steps {
                kind: list.kind(),
                steps: list.to_records(),
            },
            Self::Step(entry) => ValueRecord::Step(entry.to_record()),
            Self::Text(value) => ValueRecord::Text(value.clone()),
            Self::Flag(value) => ValueRecord::Flag(*value),
            Self::Number(value) => ValueRecord::Number(*value),
        }
    }

    /// Restores an unbound value from its persisted form.
    pub fn from_record(record: ValueRecord, registry: &ExtensionRegistry) -> Self {
        match record {
            ValueRecord::Steps { kind, steps } => {
                Self::Steps(ExtensionList::from_records(kind, steps, registry))
            }
            ValueRecord::Step(step) => Self::Step(StepEntry::from_record(step, registry)),
            ValueRecord::Text(value) => Self::Text(value),
            ValueRecord::Flag(value) => Self::Flag(value),
            ValueRecord::Number(value) => Self::Number(value),
        }
    }

    pub(crate) fn empty_steps(kind: StepKind) -> Self {
        Self::Steps(ExtensionList::empty(kind))
    }
}
