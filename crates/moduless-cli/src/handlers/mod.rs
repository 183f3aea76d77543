//! Command handlers
//!
//! Each handler module contains:
//! - The execution logic for a CLI command
//! - Pure helper functions
//! - Tests

pub mod instrument;
pub mod list;
pub mod prefs;
pub mod run;
pub mod serve;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::style;
use moduless::{
    BrowserLauncher, EndCoverMessage, Outcome, Preferences, Project, ProjectGraph,
    SharedPreferences, TunnelConfig,
};

use crate::commands::TunnelArgs;
use crate::error::{CliError, CliResult};

pub use instrument::execute_instrument;
pub use list::execute_list;
pub use prefs::execute_prefs;
pub use run::execute_run;
pub use serve::execute_serve;

/// Build the project graph for a workspace directory, a config file or any
/// file below a directory holding config files
pub fn load_graph(path: &Path) -> CliResult<ProjectGraph> {
    if !path.exists() {
        return Err(CliError::no_project(path.display().to_string()));
    }
    if is_config_file(path) {
        return Ok(ProjectGraph::load(&[path.to_path_buf()]));
    }
    let root = workspace_root(path).ok_or_else(|| CliError::no_project(path.display().to_string()))?;
    Ok(ProjectGraph::discover(&root)?)
}

/// Whether a path names a `tsconfig*.json` file
#[must_use]
pub fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("tsconfig") && name.ends_with(".json"))
}

/// Nearest directory at or above `path` that holds a config file
#[must_use]
pub fn workspace_root(path: &Path) -> Option<PathBuf> {
    let start = if path.is_dir() { path } else { path.parent()? };
    let start = moduless::config::absolute(start);
    start
        .ancestors()
        .find(|dir| has_config(dir))
        .map(Path::to_path_buf)
}

fn has_config(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|entries| {
        entries
            .filter_map(Result::ok)
            .any(|entry| is_config_file(&entry.path()))
    })
}

/// The project a path points at
pub fn find_project(graph: &ProjectGraph, path: &Path) -> CliResult<Arc<Project>> {
    graph
        .find(path)
        .cloned()
        .ok_or_else(|| CliError::no_project(path.display().to_string()))
}

/// The project declaring a cover, searched among `candidates`
#[must_use]
pub fn owner_of<'a>(candidates: &'a [Arc<Project>], cover: &str) -> Option<&'a Project> {
    candidates
        .iter()
        .find(|p| p.cover_names().iter().any(|name| name == cover))
        .map(AsRef::as_ref)
}

/// Tunnel settings from command-line options and stored preferences
#[must_use]
pub fn tunnel_config(args: &TunnelArgs) -> TunnelConfig {
    let mut builder = TunnelConfig::builder()
        .http_port(args.http_port)
        .ws_port(args.ws_port)
        .connect_timeout(Duration::from_secs(args.connect_timeout))
        .sandbox(!args.no_sandbox);
    if args.show {
        builder = builder.show_browser(true);
    }
    if args.devtools {
        builder = builder.show_devtools(true);
    }
    if let Some(path) = &args.browser {
        builder = builder.browser_executable(path);
    }
    if let Some(dir) = &args.captures {
        builder = builder.captures_dir(dir);
    }
    builder.build()
}

/// Load the preference store for sharing with a tunnel
pub fn shared_preferences(dir: PathBuf) -> CliResult<SharedPreferences> {
    Ok(Arc::new(Mutex::new(Preferences::load(dir)?)))
}

/// The browser launcher compiled into this build
pub fn require_launcher() -> CliResult<Arc<dyn BrowserLauncher>> {
    moduless::default_launcher().ok_or(CliError::BrowserDisabled)
}

/// Create the async runtime a command runs on
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::config(format!("Failed to create async runtime: {e}")))
}

/// Format a finished run with a colored heading
#[must_use]
pub fn render_end_cover(message: &EndCoverMessage, project: Option<&Project>) -> String {
    let text = moduless::format_end_cover(message, project);
    let outcome = Outcome::of(message);
    let label = outcome.label();
    let painted = match outcome {
        Outcome::Pass => style(label).green().bold(),
        Outcome::Fail => style(label).red().bold(),
        Outcome::Error => style(label).yellow().bold(),
    };
    text.strip_prefix(label)
        .map_or_else(|| text.clone(), |rest| format!("{painted}{rest}"))
}
