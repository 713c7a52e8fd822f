//! Cascading project properties.
//!
//! # Responsibility
//! - Hold each project's own configuration values in keyed cells.
//! - Resolve unset values through the template chain.
//!
//! # Invariants
//! - A cell is either inherited or explicit; an explicit cell may hold "no
//!   value", which still shadows the template.
//! - Stores are never shared between projects.

pub mod cascade;
pub mod cell;
pub mod store;
pub mod value;
