//! Template-chain resolution.
//!
//! # Responsibility
//! - Resolve property keys by walking an explicit parent chain: the first
//!   level with an explicit cell wins, otherwise the key has no value.
//!
//! # Invariants
//! - Each level is asked once per resolution and answers every pending key
//!   from one consistent view.
//! - A level that appears twice in one walk is a template cycle and fails
//!   the resolution instead of looping.

use crate::graph::GraphConsistencyError;
use crate::model::project::ProjectName;
use crate::property::cell::LocalLookup;
use crate::property::value::PropertyValue;
use std::collections::BTreeSet;

/// One level of a template chain.
pub trait CascadeLevel: Sized {
    fn level_name(&self) -> ProjectName;

    /// Answers `keys` from this level only and returns the next level.
    fn lookup_level(&self, keys: &[&str]) -> (Vec<LocalLookup>, Option<Self>);
}

/// Resolves `keys` starting at `start`, in the order given.
pub fn resolve_keys<L: CascadeLevel>(
    start: L,
    keys: &[&str],
) -> Result<Vec<Option<PropertyValue>>, GraphConsistencyError> {
    let mut resolved: Vec<Option<Option<PropertyValue>>> = vec![None; keys.len()];
    let mut visited = BTreeSet::new();
    let mut chain = Vec::new();
    let mut current = Some(start);

    while let Some(level) = current {
        let name = level.level_name();
        chain.push(name.clone());
        if !visited.insert(name) {
            return Err(GraphConsistencyError::TemplateCycle { chain });
        }

        let pending: Vec<usize> = (0..keys.len()).filter(|&i| resolved[i].is_none()).collect();
        let pending_keys: Vec<&str> = pending.iter().map(|&i| keys[i]).collect();
        let (answers, parent) = level.lookup_level(&pending_keys);

        for (slot, answer) in pending.into_iter().zip(answers) {
            match answer {
                LocalLookup::Value(value) => resolved[slot] = Some(Some(value)),
                LocalLookup::NoValue => resolved[slot] = Some(None),
                LocalLookup::Inherit => {}
            }
        }

        if resolved.iter().all(Option::is_some) {
            break;
        }
        current = parent;
    }

    Ok(resolved.into_iter().map(Option::flatten).collect())
}
