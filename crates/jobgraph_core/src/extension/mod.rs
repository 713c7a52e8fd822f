//! Build-step extension points.
//!
//! This module defines the step/descriptor contracts, the in-process
//! descriptor registry, owner-bound step lists and the built-in steps.

pub mod builtin;
pub mod descriptor;
pub mod list;
pub mod registry;
