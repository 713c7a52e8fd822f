//! In-process build-step descriptor registry.
//!
//! # Responsibility
//! - Hold every known `StepDescriptor`, indexed by id, safe key and kind.
//! - Answer `list_descriptors(kind, project)` in registration order.
//!
//! # Invariants
//! - Descriptor ids are unique across all kinds.
//! - Per-kind listing order is registration order and never changes while
//!   the registry is not mutated.

use crate::extension::descriptor::{safe_key, StepDescriptor, StepKind};
use crate::model::project::ProjectName;
use log::{debug, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Descriptor table used to instantiate build steps.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<String, StepDescriptor>,
    safe_key_index: BTreeMap<String, String>,
    kind_index: BTreeMap<StepKind, Vec<String>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the built-in steps.
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        for descriptor in crate::extension::builtin::builtin_descriptors() {
            // Built-in ids are static and distinct.
            if let Err(err) = registry.register(descriptor) {
                log::error!(
                    "event=registry_register module=extension status=error error={}",
                    err
                );
            }
        }
        registry
    }

    /// Registers one descriptor after id validation.
    pub fn register(&mut self, descriptor: StepDescriptor) -> Result<(), RegistryError> {
        let id = descriptor.id().to_string();
        if !is_valid_descriptor_id(&id) {
            return Err(RegistryError::InvalidDescriptorId(id));
        }
        if self.entries.contains_key(id.as_str()) {
            return Err(RegistryError::DuplicateDescriptorId(id));
        }

        self.safe_key_index.insert(safe_key(&id), id.clone());
        self.kind_index
            .entry(descriptor.kind())
            .or_default()
            .push(id.clone());
        debug!(
            "event=registry_register module=extension status=ok kind={} descriptor={}",
            descriptor.kind(),
            id
        );
        self.entries.insert(id, descriptor);
        Ok(())
    }

    /// Removes a descriptor, e.g. when its providing extension is uninstalled.
    ///
    /// Configured steps referencing it stay in project state and are skipped
    /// by graph builds.
    pub fn unregister(&mut self, descriptor_id: &str) -> Option<StepDescriptor> {
        let descriptor = self.entries.remove(descriptor_id)?;
        self.safe_key_index.remove(&descriptor.safe_key());
        if let Some(ids) = self.kind_index.get_mut(&descriptor.kind()) {
            ids.retain(|id| id != descriptor_id);
        }
        info!(
            "event=registry_unregister module=extension status=ok kind={} descriptor={}",
            descriptor.kind(),
            descriptor_id
        );
        Some(descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, descriptor_id: &str) -> Option<&StepDescriptor> {
        self.entries.get(descriptor_id)
    }

    /// Looks up a descriptor by the key used in submissions.
    pub fn get_by_safe_key(&self, key: &str) -> Option<&StepDescriptor> {
        let id = self.safe_key_index.get(key)?;
        self.entries.get(id)
    }

    /// Returns every descriptor of `kind` applicable to `project`, in
    /// registration order.
    pub fn list_descriptors(&self, kind: StepKind, project: &ProjectName) -> Vec<&StepDescriptor> {
        self.all_of_kind(kind)
            .into_iter()
            .filter(|descriptor| descriptor.is_applicable(project))
            .collect()
    }

    /// Returns every descriptor of `kind` regardless of applicability.
    pub fn all_of_kind(&self, kind: StepKind) -> Vec<&StepDescriptor> {
        let Some(ids) = self.kind_index.get(&kind) else {
            return vec![];
        };
        ids.iter().filter_map(|id| self.entries.get(id)).collect()
    }
}

/// Descriptor registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidDescriptorId(String),
    DuplicateDescriptorId(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDescriptorId(value) => write!(f, "descriptor id is invalid: {value}"),
            Self::DuplicateDescriptorId(value) => {
                write!(f, "descriptor id already registered: {value}")
            }
        }
    }
}

impl Error for RegistryError {}

fn is_valid_descriptor_id(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_lowercase() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            prev_separator = false;
            continue;
        }
        if c == '.' {
            if prev_separator {
                return false;
            }
            prev_separator = true;
            continue;
        }
        return false;
    }
    !prev_separator
}
