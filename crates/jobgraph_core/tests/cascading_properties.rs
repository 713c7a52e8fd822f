use jobgraph_core::extension::builtin::{
    ARTIFACT_ARCHIVER_ID, BUILD_TRIGGER_ID, SHELL_BUILDER_ID, TIMEOUT_WRAPPER_ID,
};
use jobgraph_core::{ConfigDocument, ExtensionRegistry, Project, ProjectName, PropertyValue};
use serde_json::json;
use std::sync::Arc;

fn project(raw: &str) -> Arc<Project> {
    Arc::new(Project::new(ProjectName::parse(raw).unwrap()))
}

fn doc(value: serde_json::Value) -> ConfigDocument {
    ConfigDocument::from_value(value).unwrap()
}

fn text(value: &str) -> PropertyValue {
    PropertyValue::Text(value.to_string())
}

#[test]
fn scalar_properties_resolve_through_three_levels() {
    let root = project("root");
    let middle = project("middle");
    let leaf = project("leaf");
    middle.set_template(Some(&root)).unwrap();
    leaf.set_template(Some(&middle)).unwrap();

    root.set_property("description", text("from root"));
    root.set_property("quietPeriod", PropertyValue::Number(5));
    middle.set_property("quietPeriod", PropertyValue::Number(10));

    assert_eq!(leaf.resolve("description").unwrap(), Some(text("from root")));
    assert_eq!(leaf.resolve("quietPeriod").unwrap(), Some(PropertyValue::Number(10)));
    assert_eq!(leaf.resolve("missing").unwrap(), None);
    assert!(!leaf.is_overridden("quietPeriod"));
    assert!(middle.is_overridden("quietPeriod"));
}

#[test]
fn clear_shadows_template_and_reset_restores_inheritance() {
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();
    template.set_property("description", text("shared"));

    child.clear_property("description");
    assert_eq!(child.resolve("description").unwrap(), None);
    assert!(child.is_overridden("description"));

    assert!(child.reset_property("description"));
    assert_eq!(child.resolve("description").unwrap(), Some(text("shared")));
    assert!(!child.reset_property("never-set"));
}

#[test]
fn template_changes_are_visible_without_relinking() {
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();

    template.set_property("description", text("v1"));
    assert_eq!(child.resolve("description").unwrap(), Some(text("v1")));
    template.set_property("description", text("v2"));
    assert_eq!(child.resolve("description").unwrap(), Some(text("v2")));

    child.set_template(None).unwrap();
    assert_eq!(child.resolve("description").unwrap(), None);
}

#[test]
fn inherited_step_lists_are_bound_to_the_reading_project() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();

    let report = template.submit(
        &registry,
        &doc(json!({
            "builders": [{"kind": "builtin-builder-shell", "command": "make"}],
            "builtin-wrapper-timeout": {"minutes": 30},
            "builtin-publisher-archive": {"artifacts": "target/*.tar.gz"}
        })),
    );
    assert!(report.is_clean(), "{:?}", report.errors);

    let builders = child.builders_list().unwrap();
    assert_eq!(builders.len(), 1);
    assert_eq!(builders.owner().map(ProjectName::as_str), Some("child"));
    assert!(builders
        .iter()
        .all(|entry| entry.owner().map(ProjectName::as_str) == Some("child")));
    assert_eq!(builders.get(SHELL_BUILDER_ID).unwrap().config().str("command"), Some("make"));

    let wrappers = child.build_wrappers_list().unwrap();
    assert!(wrappers.get(TIMEOUT_WRAPPER_ID).is_some());
    assert_eq!(wrappers.owner().map(ProjectName::as_str), Some("child"));

    let publishers = child.publishers_list(&registry).unwrap();
    assert_eq!(publishers.len(), 1);
    let archiver = child.publisher(ARTIFACT_ARCHIVER_ID).unwrap().unwrap();
    assert_eq!(archiver.owner().map(ProjectName::as_str), Some("child"));

    let template_builders = template.builders_list().unwrap();
    assert_eq!(template_builders.owner().map(ProjectName::as_str), Some("template"));
}

#[test]
fn child_override_of_one_list_leaves_the_others_inherited() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let template = project("template");
    let child = project("child");
    child.set_template(Some(&template)).unwrap();

    template.submit(
        &registry,
        &doc(json!({
            "builders": [{"kind": "builtin-builder-shell", "command": "make"}],
            "builtin-publisher-trigger": {"child_projects": "deploy"}
        })),
    );
    child.set_property(
        "builders",
        PropertyValue::Steps(jobgraph_core::ExtensionList::empty(jobgraph_core::StepKind::Builder)),
    );

    assert!(child.builders_list().unwrap().is_empty());
    assert!(child.publisher(BUILD_TRIGGER_ID).unwrap().is_some());
}

#[test]
fn unset_step_lists_default_to_empty() {
    let registry = ExtensionRegistry::with_builtin_steps();
    let lone = project("lone");

    assert!(lone.builders_list().unwrap().is_empty());
    assert!(lone.build_wrappers_list().unwrap().is_empty());
    assert!(lone.publishers_list(&registry).unwrap().is_empty());
    assert!(lone.builders_list().unwrap().is_bound());
}
