//! Project use-case service.
//!
//! # Responsibility
//! - Load every persisted project, link templates and run the load hook.
//! - Persist projects after submissions and migrations.
//! - Rebuild the dependency graph over a loaded project set.
//!
//! # Invariants
//! - Templates are linked only after every project of the set exists, so
//!   load order does not matter.
//! - A missing or cyclic template link is logged and left unlinked; the
//!   project itself still loads and keeps its declared template name.
//! - A row that cannot be decoded or restored is logged and skipped; the
//!   rest of the set still loads.
//! - Service APIs never bypass repository validation.

use crate::extension::registry::ExtensionRegistry;
use crate::graph::{DependencyGraph, DependencyGraphBuilder};
use crate::migration::MigrationReport;
use crate::model::document::ConfigDocument;
use crate::model::project::{Project, ProjectName, SubmissionReport};
use crate::repo::project_repo::{ProjectRepository, RepoResult};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Projects restored by [`ProjectService::load_all`], in name order.
#[derive(Debug, Default)]
pub struct LoadedProjects {
    pub projects: Vec<Arc<Project>>,
    /// Projects whose legacy fields changed the store during this load.
    pub migrations: Vec<(ProjectName, MigrationReport)>,
    /// Stored rows that could not be restored.
    pub skipped: usize,
}

impl LoadedProjects {
    pub fn get(&self, name: &str) -> Option<&Arc<Project>> {
        self.projects
            .iter()
            .find(|project| project.name().as_str() == name)
    }
}

/// Use-case service over one repository and one extension registry.
pub struct ProjectService<'reg, R: ProjectRepository> {
    repo: R,
    registry: &'reg ExtensionRegistry,
}

impl<'reg, R: ProjectRepository> ProjectService<'reg, R> {
    pub fn new(repo: R, registry: &'reg ExtensionRegistry) -> Self {
        Self { repo, registry }
    }

    pub fn registry(&self) -> &'reg ExtensionRegistry {
        self.registry
    }

    /// Persists a fresh project with no configuration.
    pub fn create(&self, name: &str) -> RepoResult<Arc<Project>> {
        let project = Arc::new(Project::new(ProjectName::parse(name)?));
        self.save(&project)?;
        Ok(project)
    }

    /// Loads every stored project.
    ///
    /// Projects that migrated legacy fields are written back so the legacy
    /// data is gone from storage afterwards. Rows that fail to decode are
    /// counted in `skipped` and left untouched in storage.
    ///
    /// # Errors
    /// - Storage failures only; a single broken row never fails the load.
    pub fn load_all(&self) -> RepoResult<LoadedProjects> {
        let started_at = Instant::now();
        let rows = self.repo.scan_projects()?;

        let mut projects = Vec::with_capacity(rows.len());
        let mut templates = Vec::new();
        let mut skipped = 0usize;
        for row in rows {
            let record = match row {
                Ok(record) => record,
                Err(err) => {
                    skipped += 1;
                    warn!(
                        "event=project_load module=service status=row_skipped error={}",
                        err
                    );
                    continue;
                }
            };
            let template = record.template.clone();
            let raw_name = record.name.clone();
            let project = match Project::from_record(record, self.registry) {
                Ok(project) => Arc::new(project),
                Err(err) => {
                    skipped += 1;
                    warn!(
                        "event=project_load module=service status=row_skipped project={} error={}",
                        raw_name, err
                    );
                    continue;
                }
            };
            if let Some(template) = template {
                templates.push((Arc::clone(&project), template));
            }
            projects.push(project);
        }

        let by_name: BTreeMap<&str, &Arc<Project>> = projects
            .iter()
            .map(|project| (project.name().as_str(), project))
            .collect();
        for (project, template_name) in &templates {
            let Some(template) = by_name.get(template_name.as_str()) else {
                warn!(
                    "event=project_load module=service status=template_missing project={} template={}",
                    project.name(),
                    template_name
                );
                continue;
            };
            if let Err(err) = project.set_template(Some(*template)) {
                warn!(
                    "event=project_load module=service status=template_rejected project={} template={} error_code={}",
                    project.name(),
                    template_name,
                    err.code()
                );
            }
        }

        let mut migrations = Vec::new();
        for project in &projects {
            let report = project.on_load(self.registry);
            if !report.is_noop() {
                self.save(project)?;
                migrations.push((project.name().clone(), report));
            }
        }

        info!(
            "event=project_load_all module=service status=ok projects={} migrated={} skipped={} duration_ms={}",
            projects.len(),
            migrations.len(),
            skipped,
            started_at.elapsed().as_millis()
        );
        Ok(LoadedProjects {
            projects,
            migrations,
            skipped,
        })
    }

    pub fn save(&self, project: &Project) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.repo.save_project(&project.to_record());
        match &result {
            Ok(()) => info!(
                "event=project_save module=service status=ok project={} duration_ms={}",
                project.name(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=project_save module=service status=error project={} error={}",
                project.name(),
                err
            ),
        }
        result
    }

    /// Applies a configuration submission and persists the result.
    pub fn submit(&self, project: &Project, config: &ConfigDocument) -> RepoResult<SubmissionReport> {
        let report = project.submit(self.registry, config);
        self.save(project)?;
        Ok(report)
    }

    pub fn delete(&self, name: &ProjectName) -> RepoResult<()> {
        self.repo.delete_project(name)
    }

    /// Rebuilds the dependency graph over `projects`.
    pub fn rebuild_graph(&self, projects: &[Arc<Project>]) -> DependencyGraph {
        DependencyGraphBuilder::new(self.registry).build(projects)
    }
}
