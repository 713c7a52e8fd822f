//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls, project loading and graph rebuilds into
//!   use-case level APIs.
//! - Keep the CLI decoupled from storage details.

pub mod project_service;
