use jobgraph_core::extension::builtin::BUILD_TRIGGER_ID;
use jobgraph_core::{
    BuildStep, ConfigDocument, Dependency, DependencyGraph, DependencyGraphBuilder,
    ExtensionRegistry, GraphConsistencyError, Project, ProjectName, StepDescriptor, StepKind,
};
use serde_json::json;
use std::sync::Arc;

fn name(raw: &str) -> ProjectName {
    ProjectName::parse(raw).unwrap()
}

fn project(raw: &str) -> Arc<Project> {
    Arc::new(Project::new(name(raw)))
}

fn doc(value: serde_json::Value) -> ConfigDocument {
    ConfigDocument::from_value(value).unwrap()
}

fn edge(upstream: &str, downstream: &str) -> Dependency {
    Dependency {
        upstream: name(upstream),
        downstream: name(downstream),
    }
}

fn pipeline(registry: &ExtensionRegistry) -> Vec<Arc<Project>> {
    let lib = project("lib");
    let app = project("app");
    let deploy = project("deploy");
    let docs = project("docs");

    lib.submit(
        registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "app, docs"}})),
    );
    app.submit(
        registry,
        &doc(json!({
            "builders": [{"kind": "builtin-builder-copy_artifact", "project": "lib"}],
            "builtin-publisher-trigger": {"child_projects": "deploy"}
        })),
    );
    vec![lib, app, deploy, docs]
}

#[test]
fn edges_follow_publishers_then_builders_per_project() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let projects = pipeline(&registry);

    let graph = DependencyGraphBuilder::new(&registry).build(&projects);

    assert_eq!(
        graph.contributions(),
        &[
            edge("lib", "app"),
            edge("lib", "docs"),
            edge("app", "deploy"),
            edge("lib", "app"),
        ]
    );
    assert_eq!(graph.edge_count(), 3);
    assert!(graph.skipped().is_empty());
    assert_eq!(graph.downstream(&name("lib")), vec![name("app"), name("docs")]);
    assert_eq!(graph.upstream(&name("deploy")), vec![name("app")]);
    assert_eq!(
        graph.transitive_downstream(&name("lib")),
        vec![name("app"), name("deploy"), name("docs")]
    );
}

#[test]
fn rebuilds_are_deterministic() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let projects = pipeline(&registry);
    let builder = DependencyGraphBuilder::new(&registry);

    let first = builder.build(&projects);
    let second = builder.build(&projects);
    assert_eq!(first, second);
}

#[test]
fn build_order_is_topological_with_name_tiebreak() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let graph = DependencyGraphBuilder::new(&registry).build(&pipeline(&registry));

    let order = graph.build_order();
    assert!(!order.has_cycle);
    assert_eq!(
        order.order,
        vec![name("lib"), name("app"), name("deploy"), name("docs")]
    );
}

#[test]
fn inherited_triggers_contribute_edges_for_the_child() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let template = project("template");
    let child = project("child");
    let target = project("target");
    child.set_template(Some(&template)).unwrap();
    template.submit(
        &registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "target"}})),
    );

    let graph = DependencyGraphBuilder::new(&registry).build(&[
        Arc::clone(&template),
        Arc::clone(&child),
        target,
    ]);
    assert_eq!(
        graph.contributions(),
        &[edge("template", "target"), edge("child", "target")]
    );
}

#[test]
fn unknown_projects_and_unregistered_descriptors_are_skipped() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");
    job.submit(
        &registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "ghost"}})),
    );

    let graph = DependencyGraphBuilder::new(&registry).build(&[Arc::clone(&job)]);
    assert_eq!(graph.edge_count(), 0);
    assert!(matches!(
        &graph.skipped()[..],
        [GraphConsistencyError::UnknownProject { missing, .. }] if missing.as_str() == "ghost"
    ));

    let trimmed = ExtensionRegistry::new();
    let graph = DependencyGraphBuilder::new(&trimmed).build(&[Arc::clone(&job)]);
    assert!(matches!(
        &graph.skipped()[..],
        [GraphConsistencyError::UnresolvableDescriptor { kind: StepKind::Publisher, descriptor, .. }]
            if descriptor == BUILD_TRIGGER_ID
    ));
    assert_eq!(job.publishers_list(&trimmed).unwrap().len(), 1);

    let job = project("job");
    job.submit(
        &registry,
        &doc(json!({"builders": [{"kind": "builtin-builder-shell", "command": "make"}]})),
    );
    let graph = DependencyGraphBuilder::new(&trimmed).build(&[job]);
    assert!(matches!(
        &graph.skipped()[..],
        [GraphConsistencyError::UnresolvableDescriptor { kind: StepKind::Builder, .. }]
    ));
}

#[test]
fn refused_template_cycles_leave_graph_passes_clean() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let mut projects = pipeline(&registry);
    let first = project("first");
    let second = project("second");
    first.set_template(Some(&second)).unwrap();
    assert!(matches!(
        second.set_template(Some(&first)),
        Err(GraphConsistencyError::TemplateCycle { .. })
    ));
    projects.push(first);
    projects.push(second);

    let graph = DependencyGraphBuilder::new(&registry).build(&projects);
    assert_eq!(graph.edge_count(), 3);
    assert!(graph.skipped().is_empty());
    assert_eq!(graph.nodes().count(), 6);
}

#[derive(Debug)]
struct FanIn {
    sources: Vec<ProjectName>,
}

impl BuildStep for FanIn {
    fn build_dependency_graph(&self, owner: &ProjectName, graph: &mut DependencyGraph) {
        for source in &self.sources {
            graph.add_dependency(source, owner);
        }
    }
}

#[test]
fn registered_descriptors_contribute_like_builtin_ones() {
    let mut registry = ExtensionRegistry::with_builtin_steps();
    registry
        .register(StepDescriptor::new(
            "acme.publisher.fan_in",
            StepKind::Publisher,
            "Fan in",
            |config| {
                let sources = config
                    .string_list("sources")
                    .iter()
                    .filter_map(|raw| ProjectName::parse(raw).ok())
                    .collect();
                Ok(Arc::new(FanIn { sources }) as Arc<dyn BuildStep>)
            },
        ))
        .unwrap();

    let a = project("a");
    let b = project("b");
    let sink = project("sink");
    let report = sink.submit(
        &registry,
        &doc(json!({
            "acme-publisher-fan_in": {"sources": ["a", "b"]},
            "builtin-publisher-trigger": {"child_projects": "a"}
        })),
    );
    assert!(report.is_clean());

    let graph = DependencyGraphBuilder::new(&registry).build(&[a, b, sink]);
    assert_eq!(
        graph.contributions(),
        &[edge("sink", "a"), edge("a", "sink"), edge("b", "sink")]
    );
    assert!(graph.build_order().has_cycle);
}

#[test]
fn graph_snapshots_never_mix_two_submissions() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let upstream = project("upstream");
    let left = project("left");
    let right = project("right");
    let projects = vec![Arc::clone(&upstream), left, right];

    let to_left = doc(json!({
        "builders": [{"kind": "builtin-builder-shell", "command": "make"}],
        "builtin-publisher-trigger": {"child_projects": "left"}
    }));
    let to_right = doc(json!({
        "builders": [{"kind": "builtin-builder-copy_artifact", "project": "right"}],
        "builtin-publisher-trigger": {"child_projects": "right"}
    }));
    upstream.submit(&registry, &to_left);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..200 {
                let config = if round % 2 == 0 { &to_right } else { &to_left };
                upstream.submit(&registry, config);
            }
        });

        let builder = DependencyGraphBuilder::new(&registry);
        for _ in 0..200 {
            let graph = builder.build(&projects);
            let contributions = graph.contributions().to_vec();
            let left_only = vec![edge("upstream", "left")];
            let right_only = vec![edge("upstream", "right"), edge("right", "upstream")];
            assert!(
                contributions == left_only || contributions == right_only,
                "mixed snapshot: {contributions:?}"
            );
        }
    });
}
