use jobgraph_core::db::open_db_in_memory;
use jobgraph_core::extension::builtin::{
    ARTIFACT_ARCHIVER_ID, BUILD_TRIGGER_ID, COPY_ARTIFACT_BUILDER_ID, SHELL_BUILDER_ID,
    TIMEOUT_WRAPPER_ID, WORKSPACE_CLEANUP_WRAPPER_ID,
};
use jobgraph_core::{
    ConfigDocument, ConfigurationError, ExtensionRegistry, Project, ProjectName, ProjectService,
    SqliteProjectRepository,
};
use serde_json::json;
use std::sync::Arc;

fn project(raw: &str) -> Arc<Project> {
    Arc::new(Project::new(ProjectName::parse(raw).unwrap()))
}

fn doc(value: serde_json::Value) -> ConfigDocument {
    ConfigDocument::from_value(value).unwrap()
}

fn descriptor_ids(list: &jobgraph_core::ExtensionList) -> Vec<String> {
    list.iter()
        .map(|entry| entry.descriptor_id().to_string())
        .collect()
}

#[test]
fn resubmission_removes_omitted_publishers() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");

    job.submit(
        &registry,
        &doc(json!({
            "builtin-publisher-archive": {"artifacts": "*.jar"},
            "builtin-publisher-trigger": {"child_projects": "downstream"}
        })),
    );
    assert_eq!(job.publishers_list(&registry).unwrap().len(), 2);

    let report = job.submit(
        &registry,
        &doc(json!({"builtin-publisher-archive": {"artifacts": "*.war"}})),
    );
    assert!(report.is_clean());
    assert_eq!(report.publishers, 1);

    let publishers = job.publishers_list(&registry).unwrap();
    let by_descriptor = publishers.to_map().unwrap();
    assert_eq!(
        by_descriptor.keys().collect::<Vec<_>>(),
        vec![ARTIFACT_ARCHIVER_ID]
    );
    assert!(job.publisher(BUILD_TRIGGER_ID).unwrap().is_none());
}

#[test]
fn omitted_publisher_shadows_the_template_value() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();

    template.submit(
        &registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "deploy"}})),
    );
    assert!(child.publisher(BUILD_TRIGGER_ID).unwrap().is_some());

    child.submit(&registry, &doc(json!({})));
    assert!(child.publisher(BUILD_TRIGGER_ID).unwrap().is_none());
    assert!(child.is_overridden("builtin-publisher-trigger"));

    child.reset_property("builtin-publisher-trigger");
    assert!(child.publisher(BUILD_TRIGGER_ID).unwrap().is_some());
}

#[test]
fn builders_keep_submission_order_and_allow_repeats() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");

    let report = job.submit(
        &registry,
        &doc(json!({
            "builders": [
                {"kind": "builtin-builder-shell", "command": "./configure"},
                {"kind": "builtin-builder-copy_artifact", "project": "upstream"},
                {"kind": "builtin-builder-shell", "command": "make"}
            ]
        })),
    );
    assert!(report.is_clean());
    assert_eq!(report.builders, 3);

    let builders = job.builders_list().unwrap();
    assert_eq!(
        descriptor_ids(&builders),
        vec![
            SHELL_BUILDER_ID.to_string(),
            COPY_ARTIFACT_BUILDER_ID.to_string(),
            SHELL_BUILDER_ID.to_string()
        ]
    );
    assert!(builders.to_map().is_err());
    let commands: Vec<&str> = builders
        .iter()
        .filter_map(|entry| entry.config().str("command"))
        .collect();
    assert_eq!(commands, vec!["./configure", "make"]);
}

#[test]
fn bad_fragments_are_reported_and_the_rest_applies() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");

    let report = job.submit(
        &registry,
        &doc(json!({
            "builders": [
                {"kind": "builtin-builder-shell", "command": "make"},
                {"kind": "no-such-step"},
                {"kind": "builtin-publisher-archive", "artifacts": "*.jar"},
                {"kind": "builtin-builder-shell"}
            ],
            "builtin-publisher-archive": {"artifacts": "*.jar"},
            "builtin-publisher-trigger": {"child_projects": "deploy", "threshold": "sometimes"}
        })),
    );

    assert_eq!(report.errors.len(), 4);
    assert!(report
        .errors
        .iter()
        .any(|err| matches!(err, ConfigurationError::UnknownDescriptor(key) if key == "no-such-step")));
    assert!(report
        .errors
        .iter()
        .any(|err| matches!(err, ConfigurationError::KindMismatch { .. })));
    assert!(report.errors.iter().any(|err| matches!(
        err,
        ConfigurationError::MissingField { field: "command", .. }
    )));
    assert!(report.errors.iter().any(|err| matches!(
        err,
        ConfigurationError::InvalidField { field: "threshold", .. }
    )));

    assert!(job.builders_list().unwrap().is_empty());
    assert!(!job.is_overridden("builders"));
    assert!(job.publisher(ARTIFACT_ARCHIVER_ID).unwrap().is_some());
    assert!(job.publisher(BUILD_TRIGGER_ID).unwrap().is_none());
}

#[test]
fn failed_builder_fragment_keeps_previous_builders() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");
    job.submit(
        &registry,
        &doc(json!({"builders": [
            {"kind": "builtin-builder-shell", "command": "./configure"},
            {"kind": "builtin-builder-shell", "command": "make"}
        ]})),
    );

    let report = job.submit(
        &registry,
        &doc(json!({"builders": [
            {"kind": "builtin-builder-shell", "command": "./configure"},
            {"kind": "builtin-builder-shel", "command": "make"}
        ]})),
    );

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.builders, 2);
    let commands: Vec<String> = job
        .builders_list()
        .unwrap()
        .iter()
        .filter_map(|entry| entry.config().str("command").map(str::to_string))
        .collect();
    assert_eq!(commands, vec!["./configure", "make"]);

    let report = job.submit(&registry, &doc(json!({"builders": []})));
    assert!(report.is_clean());
    assert!(job.builders_list().unwrap().is_empty());
}

#[test]
fn failed_publisher_fragment_keeps_previous_value() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");
    job.submit(
        &registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "deploy"}})),
    );

    let report = job.submit(
        &registry,
        &doc(json!({"builtin-publisher-trigger": {"child_projects": "not valid!"}})),
    );
    assert_eq!(report.errors.len(), 1);
    let trigger = job.publisher(BUILD_TRIGGER_ID).unwrap().unwrap();
    assert_eq!(trigger.config().str("child_projects"), Some("deploy"));
}

#[test]
fn wrappers_replace_wholesale_and_keep_previous_on_failure() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let job = project("job");

    job.submit(
        &registry,
        &doc(json!({
            "builtin-wrapper-timeout": {"minutes": 30},
            "builtin-wrapper-workspace_cleanup": {}
        })),
    );
    assert_eq!(
        descriptor_ids(&job.build_wrappers_list().unwrap()),
        vec![
            TIMEOUT_WRAPPER_ID.to_string(),
            WORKSPACE_CLEANUP_WRAPPER_ID.to_string()
        ]
    );

    let report = job.submit(&registry, &doc(json!({"builtin-wrapper-timeout": {"minutes": 0}})));
    assert_eq!(report.errors.len(), 1);
    let wrappers = job.build_wrappers_list().unwrap();
    assert_eq!(descriptor_ids(&wrappers), vec![TIMEOUT_WRAPPER_ID.to_string()]);
    assert_eq!(
        wrappers.get(TIMEOUT_WRAPPER_ID).unwrap().config().u64("minutes"),
        Some(30)
    );
}

#[test]
fn child_without_wrapper_override_inherits_template_wrappers() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();
    template.submit(&registry, &doc(json!({"builtin-wrapper-timeout": {"minutes": 15}})));

    assert_eq!(
        descriptor_ids(&child.build_wrappers_list().unwrap()),
        vec![TIMEOUT_WRAPPER_ID.to_string()]
    );

    child.submit(&registry, &doc(json!({})));
    assert!(child.build_wrappers_list().unwrap().is_empty());
}

#[test]
fn submitted_configuration_survives_a_reload() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let conn = open_db_in_memory().unwrap();
    let service = ProjectService::new(SqliteProjectRepository::new(&conn), &registry);

    let job = service.create("job").unwrap();
    let report = service
        .submit(
            &job,
            &doc(json!({
                "builders": [{"kind": "builtin-builder-shell", "command": "make"}],
                "builtin-publisher-trigger": {"child_projects": ["a", "b"], "threshold": "unstable"},
                "builtin-wrapper-timeout": {"minutes": "45"}
            })),
        )
        .unwrap();
    assert!(report.is_clean(), "{:?}", report.errors);

    let loaded = service.load_all().unwrap();
    let reloaded = loaded.get("job").unwrap();
    assert_eq!(reloaded.builders_list().unwrap(), job.builders_list().unwrap());
    assert_eq!(
        reloaded.build_wrappers_list().unwrap(),
        job.build_wrappers_list().unwrap()
    );
    assert_eq!(
        reloaded.publishers_list(&registry).unwrap(),
        job.publishers_list(&registry).unwrap()
    );
    assert!(reloaded
        .builders_list()
        .unwrap()
        .iter()
        .all(|entry| entry.is_resolved()));
}
