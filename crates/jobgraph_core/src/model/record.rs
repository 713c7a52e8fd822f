//! Persisted project shape.
//!
//! # Responsibility
//! - Define the serde form of a project exchanged with the persistence
//!   layer.
//! - Accept records written before step lists moved into properties: the
//!   top-level `builders`, `publishers` and `buildWrappers` fields.
//!
//! # Invariants
//! - Build steps persist as `{descriptor, config}` only; instances are
//!   rebuilt through the registry on load.
//! - Legacy fields are omitted on write once consumed.

use crate::extension::descriptor::StepKind;
use crate::model::document::ConfigDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub descriptor: String,
    #[serde(default)]
    pub config: ConfigDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueRecord {
    Steps { kind: StepKind, steps: Vec<StepRecord> },
    Step(StepRecord),
    Text(String),
    Flag(bool),
    Number(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CellRecord {
    Inherited,
    Explicit {
        #[serde(default)]
        value: Option<ValueRecord>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, CellRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builders: Option<Vec<StepRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishers: Option<Vec<StepRecord>>,
    #[serde(
        default,
        rename = "buildWrappers",
        skip_serializing_if = "Option::is_none"
    )]
    pub build_wrappers: Option<Vec<StepRecord>>,
}

impl ProjectRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: None,
            properties: BTreeMap::new(),
            builders: None,
            publishers: None,
            build_wrappers: None,
        }
    }
}
