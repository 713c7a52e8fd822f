//! Project dependency graph.
//!
//! # Responsibility
//! - Hold "upstream triggers downstream" edges between known projects.
//! - Record contribution order and skipped contributions of one build pass.
//! - Answer scheduler queries (direct/transitive neighbours, build order).
//!
//! # Invariants
//! - Graphs are derived state: built from scratch, never persisted, never
//!   patched incrementally.
//! - Edges only connect nodes registered before contributions start.
//! - Every query returns names in a deterministic order.

pub mod builder;

use crate::extension::descriptor::StepKind;
use crate::model::project::ProjectName;
use log::warn;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use builder::DependencyGraphBuilder;

/// One directed edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dependency {
    pub upstream: ProjectName,
    pub downstream: ProjectName,
}

/// Result of a topological sort over the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOrder {
    pub order: Vec<ProjectName>,
    pub has_cycle: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeSet<ProjectName>,
    edges: BTreeSet<Dependency>,
    contributions: Vec<Dependency>,
    downstream: BTreeMap<ProjectName, BTreeSet<ProjectName>>,
    upstream: BTreeMap<ProjectName, BTreeSet<ProjectName>>,
    skipped: Vec<GraphConsistencyError>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: impl IntoIterator<Item = ProjectName>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        graph
    }

    pub fn add_node(&mut self, node: ProjectName) {
        self.nodes.insert(node);
    }

    /// Records that a build of `upstream` triggers `downstream`.
    ///
    /// Every call is kept in contribution order, duplicates included; the
    /// edge set is deduplicated. Returns `false` and records a skip when
    /// either side is not a node of this graph.
    pub fn add_dependency(&mut self, upstream: &ProjectName, downstream: &ProjectName) -> bool {
        for name in [upstream, downstream] {
            if !self.nodes.contains(name) {
                self.record_skipped(GraphConsistencyError::UnknownProject {
                    upstream: upstream.clone(),
                    downstream: downstream.clone(),
                    missing: name.clone(),
                });
                return false;
            }
        }

        let dependency = Dependency {
            upstream: upstream.clone(),
            downstream: downstream.clone(),
        };
        self.contributions.push(dependency.clone());
        if self.edges.insert(dependency) {
            self.downstream
                .entry(upstream.clone())
                .or_default()
                .insert(downstream.clone());
            self.upstream
                .entry(downstream.clone())
                .or_default()
                .insert(upstream.clone());
        }
        true
    }

    /// Records a contribution that was skipped during the build pass.
    pub fn record_skipped(&mut self, error: GraphConsistencyError) {
        warn!(
            "event=graph_contribution_skipped module=graph status=skipped error_code={} error={}",
            error.code(),
            error
        );
        self.skipped.push(error);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProjectName> {
        self.nodes.iter()
    }

    pub fn contains(&self, name: &ProjectName) -> bool {
        self.nodes.contains(name)
    }

    /// Deduplicated edges in sorted order.
    pub fn edges(&self) -> impl Iterator<Item = &Dependency> {
        self.edges.iter()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Every accepted `add_dependency` call in the order it happened.
    pub fn contributions(&self) -> &[Dependency] {
        &self.contributions
    }

    pub fn skipped(&self) -> &[GraphConsistencyError] {
        &self.skipped
    }

    /// Projects directly triggered by `name`.
    pub fn downstream(&self, name: &ProjectName) -> Vec<ProjectName> {
        neighbours(&self.downstream, name)
    }

    /// Projects that directly trigger `name`.
    pub fn upstream(&self, name: &ProjectName) -> Vec<ProjectName> {
        neighbours(&self.upstream, name)
    }

    /// Every project reachable from `name`, excluding `name` itself.
    pub fn transitive_downstream(&self, name: &ProjectName) -> Vec<ProjectName> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&ProjectName> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            let Some(next) = self.downstream.get(current) else {
                continue;
            };
            for child in next {
                if child != name && seen.insert(child.clone()) {
                    queue.push_back(child);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Kahn topological order; ties break by name. Nodes on a cycle are
    /// left out and flagged through `has_cycle`.
    pub fn build_order(&self) -> BuildOrder {
        let mut in_degree: BTreeMap<&ProjectName, usize> =
            self.nodes.iter().map(|node| (node, 0)).collect();
        for edge in &self.edges {
            if let Some(degree) = in_degree.get_mut(&edge.downstream) {
                *degree += 1;
            }
        }

        let mut ready: BTreeSet<&ProjectName> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            if let Some(children) = self.downstream.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(child);
                        }
                    }
                }
            }
        }

        BuildOrder {
            has_cycle: order.len() != self.nodes.len(),
            order,
        }
    }
}

fn neighbours(
    index: &BTreeMap<ProjectName, BTreeSet<ProjectName>>,
    name: &ProjectName,
) -> Vec<ProjectName> {
    index
        .get(name)
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default()
}

/// Internal consistency failures found while resolving or graph building.
///
/// Never fatal to the surrounding pass; the affected contribution or lookup
/// is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphConsistencyError {
    /// Template chain loops back; `chain` lists the walk up to the repeat.
    TemplateCycle { chain: Vec<ProjectName> },
    UnresolvableDescriptor {
        project: ProjectName,
        kind: StepKind,
        descriptor: String,
    },
    UnknownProject {
        upstream: ProjectName,
        downstream: ProjectName,
        missing: ProjectName,
    },
    UnboundList { project: ProjectName, kind: StepKind },
}

impl GraphConsistencyError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TemplateCycle { .. } => "template_cycle",
            Self::UnresolvableDescriptor { .. } => "unresolvable_descriptor",
            Self::UnknownProject { .. } => "unknown_project",
            Self::UnboundList { .. } => "unbound_list",
        }
    }
}

impl Display for GraphConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TemplateCycle { chain } => {
                let names: Vec<&str> = chain.iter().map(ProjectName::as_str).collect();
                write!(f, "template chain forms a cycle: {}", names.join(" -> "))
            }
            Self::UnresolvableDescriptor {
                project,
                kind,
                descriptor,
            } => write!(
                f,
                "project `{project}` has a {kind} step `{descriptor}` with no registered descriptor"
            ),
            Self::UnknownProject {
                upstream,
                downstream,
                missing,
            } => write!(
                f,
                "dependency {upstream} -> {downstream} references unknown project `{missing}`"
            ),
            Self::UnboundList { project, kind } => {
                write!(f, "{kind} list of project `{project}` was used before binding")
            }
        }
    }
}

impl Error for GraphConsistencyError {}
