//! Single property slot owned by one project.

use crate::model::project::ProjectName;
use crate::property::value::PropertyValue;

/// Local state of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellState {
    /// Nothing set locally; reads fall through to the template.
    Inherited,
    /// Set by this project. `None` is an explicit "no value" that shadows
    /// the template.
    Explicit(Option<PropertyValue>),
}

/// What a cell answers without consulting the template chain.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalLookup {
    Value(PropertyValue),
    NoValue,
    Inherit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyCell {
    key: String,
    owner: ProjectName,
    state: CellState,
}

impl PropertyCell {
    pub fn new(key: impl Into<String>, owner: ProjectName) -> Self {
        Self {
            key: key.into(),
            owner,
            state: CellState::Inherited,
        }
    }

    /// Cell restored as-is; values stay unbound until `rebind`.
    pub fn with_state(key: impl Into<String>, owner: ProjectName, state: CellState) -> Self {
        let mut cell = Self::new(key, owner);
        cell.state = state;
        cell
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &ProjectName {
        &self.owner
    }

    pub fn state(&self) -> &CellState {
        &self.state
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self.state, CellState::Explicit(_))
    }

    /// Stores `value` and marks the cell explicit, replacing any previous
    /// value.
    pub fn set(&mut self, value: PropertyValue) {
        self.state = CellState::Explicit(Some(value));
        self.bind_value();
    }

    /// Marks the cell explicit with no value.
    pub fn clear(&mut self) {
        self.state = CellState::Explicit(None);
    }

    /// Drops the local override so reads inherit again.
    pub fn reset(&mut self) {
        self.state = CellState::Inherited;
    }

    pub fn lookup(&self) -> LocalLookup {
        match &self.state {
            CellState::Inherited => LocalLookup::Inherit,
            CellState::Explicit(Some(value)) => LocalLookup::Value(value.clone()),
            CellState::Explicit(None) => LocalLookup::NoValue,
        }
    }

    /// Moves the cell to a new owner and rebinds its value.
    pub(crate) fn rebind(&mut self, owner: &ProjectName) {
        self.owner = owner.clone();
        self.bind_value();
    }

    fn bind_value(&mut self) {
        if let CellState::Explicit(Some(value)) = &mut self.state {
            value.bind(&self.owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CellState, LocalLookup, PropertyCell};
    use crate::model::project::ProjectName;
    use crate::property::value::PropertyValue;

    #[test]
    fn transitions_between_inherited_explicit_and_cleared() {
        let owner = ProjectName::parse("app").unwrap();
        let mut cell = PropertyCell::new("description", owner);
        assert_eq!(cell.lookup(), LocalLookup::Inherit);

        cell.set(PropertyValue::Text("first".to_string()));
        cell.set(PropertyValue::Text("second".to_string()));
        assert_eq!(cell.lookup(), LocalLookup::Value(PropertyValue::Text("second".to_string())));

        cell.clear();
        assert!(cell.is_explicit());
        assert_eq!(cell.lookup(), LocalLookup::NoValue);

        cell.reset();
        assert_eq!(cell.state(), &CellState::Inherited);
    }
}
