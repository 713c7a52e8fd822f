//! Project record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store and load `ProjectRecord`s keyed by project name.
//! - Keep SQL and JSON encoding details inside the persistence boundary.
//!
//! # Invariants
//! - Writes validate the project name before any SQL mutation and store
//!   the normalized name both as row key and inside `record_json`.
//! - Reads reject rows whose stored JSON disagrees with the row key instead
//!   of masking them.

use crate::db::DbError;
use crate::model::project::{ProjectName, ProjectNameError};
use crate::model::record::ProjectRecord;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PROJECT_SELECT_SQL: &str = "SELECT name, record_json FROM projects";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for project persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ProjectNameError),
    Db(DbError),
    Serialization(serde_json::Error),
    NotFound(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "project record encoding failed: {err}"),
            Self::NotFound(name) => write!(f, "project not found: {name}"),
            Self::InvalidData(message) => write!(f, "invalid persisted project data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ProjectNameError> for RepoError {
    fn from(value: ProjectNameError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Repository interface for persisted project records.
pub trait ProjectRepository {
    /// Inserts or replaces the record stored under `record.name`.
    fn save_project(&self, record: &ProjectRecord) -> RepoResult<()>;
    fn get_project(&self, name: &ProjectName) -> RepoResult<Option<ProjectRecord>>;
    /// Every stored row ordered by name, each decoded on its own.
    ///
    /// The outer error is a storage failure; an inner error belongs to that
    /// one row only.
    fn scan_projects(&self) -> RepoResult<Vec<RepoResult<ProjectRecord>>>;

    /// All records ordered by name; fails on the first undecodable row.
    fn list_projects(&self) -> RepoResult<Vec<ProjectRecord>> {
        self.scan_projects()?.into_iter().collect()
    }
    fn delete_project(&self, name: &ProjectName) -> RepoResult<()>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn save_project(&self, record: &ProjectRecord) -> RepoResult<()> {
        let name = ProjectName::parse(&record.name)?;
        let template = record
            .template
            .as_deref()
            .map(ProjectName::parse)
            .transpose()?;
        let mut normalized = record.clone();
        normalized.name = name.to_string();
        normalized.template = template.as_ref().map(ProjectName::to_string);
        let record_json = serde_json::to_string(&normalized)?;

        self.conn.execute(
            "INSERT INTO projects (
                name,
                template_name,
                record_json,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, (strftime('%s', 'now') * 1000), (strftime('%s', 'now') * 1000))
            ON CONFLICT(name) DO UPDATE SET
                template_name = excluded.template_name,
                record_json = excluded.record_json,
                updated_at = excluded.updated_at;",
            params![
                name.as_str(),
                template.as_ref().map(ProjectName::as_str),
                record_json
            ],
        )?;

        Ok(())
    }

    fn get_project(&self, name: &ProjectName) -> RepoResult<Option<ProjectRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }

        Ok(None)
    }

    fn scan_projects(&self) -> RepoResult<Vec<RepoResult<ProjectRecord>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} ORDER BY name ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_project_row(row));
        }

        Ok(records)
    }

    fn delete_project(&self, name: &ProjectName) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE name = ?1;", [name.as_str()])?;

        if changed == 0 {
            return Err(RepoError::NotFound(name.to_string()));
        }

        Ok(())
    }
}

fn parse_project_row(row: &Row<'_>) -> RepoResult<ProjectRecord> {
    let name: String = row.get("name")?;
    let record_json: String = row.get("record_json")?;
    let record: ProjectRecord = serde_json::from_str(&record_json).map_err(|err| {
        RepoError::InvalidData(format!("invalid record_json for project `{name}`: {err}"))
    })?;

    if record.name != name {
        return Err(RepoError::InvalidData(format!(
            "record_json names `{}` but is stored under `{name}`",
            record.name
        )));
    }

    Ok(record)
}
