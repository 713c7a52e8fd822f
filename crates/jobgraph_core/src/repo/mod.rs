//! Repository layer for persisted projects.
//!
//! # Responsibility
//! - Define the project storage contract used by services.
//! - Isolate SQLite query details from orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Validation`) in
//!   addition to storage errors.

pub mod project_repo;
