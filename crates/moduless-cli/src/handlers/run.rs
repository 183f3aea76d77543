//! Run command handler
//!
//! Plays the host's part of a run: starts a tunnel, asks for one cover (or
//! all of them), prints each report as it arrives and fails when any cover
//! did not pass.

use std::sync::Arc;
use std::time::Duration;

use moduless::{
    EndCoverMessage, MessageBus, ModulessError, Project, ProjectGraph, SelectCoverMessage,
    StartCompleteCoverageMessage, StartCoverMessage, Summary, Tunnel,
};
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::Instant;

use super::{
    find_project, load_graph, owner_of, render_end_cover, require_launcher, runtime,
    shared_preferences, tunnel_config,
};
use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// What a run asks the page to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPlan {
    /// One named cover
    Single(String),
    /// Every registered cover, this many expected
    All(usize),
}

impl RunPlan {
    /// Number of reports the run waits for
    #[must_use]
    pub const fn expected(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::All(count) => *count,
        }
    }
}

/// Projects whose bundles the project's page loads
#[must_use]
pub fn page_projects(graph: &ProjectGraph, project: &Project) -> Vec<Arc<Project>> {
    graph
        .recurse(project.id())
        .into_iter()
        .map(|id| graph.get(id).clone())
        .collect()
}

/// Decide what to start, rejecting names no page project declares
pub fn plan(args: &RunArgs, projects: &[Arc<Project>]) -> CliResult<RunPlan> {
    if args.all {
        let count = projects.iter().map(|p| p.cover_names().len()).sum();
        return Ok(RunPlan::All(count));
    }
    let name = args
        .cover
        .clone()
        .ok_or_else(|| CliError::invalid_argument("name a cover or pass --all"))?;
    if owner_of(projects, &name).is_none() {
        return Err(CliError::invalid_argument(format!(
            "no cover named {name} in {}",
            args.path.display()
        )));
    }
    Ok(RunPlan::Single(name))
}

/// Run covers and report them
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let graph = Arc::new(load_graph(&args.path)?);
    let project = find_project(&graph, &args.path)?;
    let projects = page_projects(&graph, &project);
    let plan = plan(args, &projects)?;
    if plan.expected() == 0 {
        if !config.verbosity.is_quiet() {
            println!("No covers in {}", project.name());
        }
        return Ok(());
    }

    let launcher = require_launcher()?;
    let preferences = shared_preferences(config.storage_dir())?;
    let tunnel = tunnel_config(&args.tunnel);
    let containing_file = project.config_path().to_string_lossy().into_owned();
    let timeout = Duration::from_secs(args.timeout);

    let rt = runtime()?;
    let summary = rt.block_on(async {
        let bus = MessageBus::new();
        let (tx, mut ends) = unbounded_channel();
        bus.listen::<EndCoverMessage, _>(move |m| {
            let _ = tx.send(m.clone());
        });

        let mut handle = Tunnel::start(graph.clone(), bus.clone(), preferences, Some(launcher), tunnel).await?;
        tracing::debug!(url = %handle.document_url(&project), "Starting run");

        match &plan {
            RunPlan::Single(name) => {
                bus.emit(SelectCoverMessage::new(containing_file.clone(), name.clone()));
                bus.emit(StartCoverMessage::new(containing_file, name.clone()));
            }
            RunPlan::All(_) => bus.emit(StartCompleteCoverageMessage::new(containing_file)),
        }

        let deadline = Instant::now() + timeout;
        let mut summary = Summary::default();
        while summary.total() < plan.expected() {
            let Ok(Some(end)) = tokio::time::timeout_at(deadline, ends.recv()).await else {
                break;
            };
            summary.record(&end);
            if !config.verbosity.is_quiet() || !end.passed() {
                print!("{}", render_end_cover(&end, owner_of(&projects, &end.cover_name)));
            }
        }
        handle.stop().await;
        Ok::<_, CliError>(summary)
    })?;

    if summary.total() < plan.expected() {
        return Err(ModulessError::Timeout {
            ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
        .into());
    }
    if !config.verbosity.is_quiet() {
        println!("\n{summary}");
    }
    if summary.all_passed() {
        Ok(())
    } else {
        Err(CliError::cover_failed(summary.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    /// `app` references `lib`; each declares covers
    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(
            root.join("lib/tsconfig.json"),
            r#"{ "compilerOptions": { "outFile": "lib.js" } }"#,
        )
        .unwrap();
        fs::write(
            root.join("lib/lib.js"),
            "function coverLib() { return () => true; }\n",
        )
        .unwrap();
        fs::write(
            root.join("tsconfig.json"),
            r#"{
                "compilerOptions": { "outFile": "app.js" },
                "references": [{ "path": "./lib" }]
            }"#,
        )
        .unwrap();
        fs::write(
            root.join("app.js"),
            "function coverOne() { return () => true; }\n\
             function coverTwo() { return () => true; }\n",
        )
        .unwrap();
        dir
    }

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["moduless", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_page_projects_include_references() {
        let dir = workspace();
        let graph = load_graph(dir.path()).unwrap();
        let project = find_project(&graph, dir.path()).unwrap();
        let names: Vec<_> = page_projects(&graph, &project)
            .iter()
            .flat_map(|p| p.cover_names())
            .collect();
        assert_eq!(names, vec!["coverLib", "coverOne", "coverTwo"]);
    }

    #[test]
    fn test_plan_all_counts_referenced_covers() {
        let dir = workspace();
        let graph = load_graph(dir.path()).unwrap();
        let project = find_project(&graph, dir.path()).unwrap();
        let projects = page_projects(&graph, &project);
        let path = dir.path().to_string_lossy().into_owned();
        let plan = plan(&run_args(&[&path, "--all"]), &projects).unwrap();
        assert_eq!(plan, RunPlan::All(3));
        assert_eq!(plan.expected(), 3);
    }

    #[test]
    fn test_plan_single_accepts_referenced_cover() {
        let dir = workspace();
        let graph = load_graph(dir.path()).unwrap();
        let project = find_project(&graph, dir.path()).unwrap();
        let projects = page_projects(&graph, &project);
        let path = dir.path().to_string_lossy().into_owned();
        let plan = plan(&run_args(&[&path, "coverLib"]), &projects).unwrap();
        assert_eq!(plan, RunPlan::Single("coverLib".to_string()));
    }

    #[test]
    fn test_plan_rejects_unknown_cover() {
        let dir = workspace();
        let graph = load_graph(dir.path()).unwrap();
        let project = find_project(&graph, dir.path()).unwrap();
        let projects = page_projects(&graph, &project);
        let path = dir.path().to_string_lossy().into_owned();
        let err = plan(&run_args(&[&path, "coverNope"]), &projects).unwrap_err();
        assert!(err.to_string().contains("coverNope"));
    }
}
