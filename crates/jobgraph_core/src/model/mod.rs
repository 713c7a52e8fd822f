//! Project model and its persisted form.
//!
//! # Responsibility
//! - Define projects, their names and the configuration documents they
//!   accept.
//! - Define the serde records exchanged with the persistence layer.
//!
//! # Invariants
//! - Every project is identified by a validated `ProjectName`.
//! - Records never carry live step instances.
//!
//! # See also
//! - crate::property for the cascading store behind each project

pub mod document;
pub mod project;
pub mod record;
