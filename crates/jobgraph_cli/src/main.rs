//! Command-line inspector for a jobgraph project store.
//!
//! # Responsibility
//! - Load every project from a store and print the derived dependency
//!   graph, build order or project list.
//! - Read logging settings from `JOBGRAPH_LOG_LEVEL` / `JOBGRAPH_LOG_DIR`.
//!
//! Output is line oriented and deterministic for scripting.

use jobgraph_core::db::{open_db, open_db_in_memory, DbResult};
use jobgraph_core::{
    ExtensionRegistry, LoadedProjects, LoggingConfig, ProjectService, SqliteProjectRepository,
};
use log::error;
use rusqlite::Connection;
use std::process::ExitCode;

const USAGE: &str = "usage: jobgraph_cli <db-path|:memory:> [edges|order|projects]";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(db_path) = args.first() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let command = args.get(1).map_or("edges", String::as_str);

    match LoggingConfig::from_env() {
        Ok(Some(config)) => {
            if let Err(err) = jobgraph_core::logging::init_logging_with(&config) {
                eprintln!("logging disabled: {err}");
            }
        }
        Ok(None) => {}
        Err(err) => eprintln!("logging disabled: {err}"),
    }

    match run(db_path, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_run module=cli status=error command={command} error={message}");
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: &str, command: &str) -> Result<(), String> {
    let conn = open_store(db_path).map_err(|err| err.to_string())?;
    let registry = ExtensionRegistry::with_builtin_steps();
    let service = ProjectService::new(SqliteProjectRepository::new(&conn), &registry);
    let loaded = service.load_all().map_err(|err| err.to_string())?;

    match command {
        "edges" => print_edges(&service, &loaded),
        "order" => {
            let order = service.rebuild_graph(&loaded.projects).build_order();
            for name in &order.order {
                println!("{name}");
            }
            if order.has_cycle {
                println!("# cycle detected; remaining projects omitted");
            }
        }
        "projects" => {
            for project in &loaded.projects {
                match project.declared_template() {
                    Some(template) => println!("{} template={template}", project.name()),
                    None => println!("{}", project.name()),
                }
            }
        }
        other => return Err(format!("unknown command `{other}`\n{USAGE}")),
    }
    Ok(())
}

fn open_store(db_path: &str) -> DbResult<Connection> {
    if db_path == ":memory:" {
        open_db_in_memory()
    } else {
        open_db(db_path)
    }
}

fn print_edges(service: &ProjectService<'_, SqliteProjectRepository<'_>>, loaded: &LoadedProjects) {
    let graph = service.rebuild_graph(&loaded.projects);
    for edge in graph.edges() {
        println!("{} -> {}", edge.upstream, edge.downstream);
    }
    for skipped in graph.skipped() {
        println!("# skipped {}: {skipped}", skipped.code());
    }
}
