//! Whole-graph rebuild over a project set.
//!
//! # Invariants
//! - Per project, lists contribute in the order publishers, builders,
//!   build wrappers.
//! - Projects contribute in the order they are passed in.
//! - A broken project or step is skipped and recorded; the pass always
//!   completes.

use crate::extension::registry::ExtensionRegistry;
use crate::graph::DependencyGraph;
use crate::model::project::Project;
use log::info;
use std::sync::Arc;
use std::time::Instant;

/// Builds dependency graphs from the current project configuration.
pub struct DependencyGraphBuilder<'reg> {
    registry: &'reg ExtensionRegistry,
}

impl<'reg> DependencyGraphBuilder<'reg> {
    pub fn new(registry: &'reg ExtensionRegistry) -> Self {
        Self { registry }
    }

    /// Builds a fresh graph from `projects`.
    ///
    /// Each project is snapshotted under its own read lock, one project at a
    /// time, so a concurrent submission is observed either fully or not at
    /// all.
    pub fn build(&self, projects: &[Arc<Project>]) -> DependencyGraph {
        let started_at = Instant::now();
        let mut graph = DependencyGraph::with_nodes(projects.iter().map(|p| p.name().clone()));

        for project in projects {
            let lists = match project.resolved_step_lists(self.registry) {
                Ok(lists) => lists,
                Err(err) => {
                    graph.record_skipped(err);
                    continue;
                }
            };

            let name = project.name();
            lists
                .publishers
                .build_dependency_graph(self.registry, name, &mut graph);
            lists
                .builders
                .build_dependency_graph(self.registry, name, &mut graph);
            lists
                .build_wrappers
                .build_dependency_graph(self.registry, name, &mut graph);
        }

        info!(
            "event=graph_build module=graph status=ok projects={} edges={} skipped={} duration_ms={}",
            projects.len(),
            graph.edge_count(),
            graph.skipped().len(),
            started_at.elapsed().as_millis()
        );
        graph
    }
}
