//! Output file watching.
//!
//! Every project with an output file gets one worker task. The file watcher
//! only routes change events to the owning worker; the worker coalesces a
//! burst, then runs the refresh on the blocking pool and waits for it, so a
//! project never has two instrumentation passes in flight.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::bus::MessageBus;
use crate::graph::ProjectGraph;
use crate::project::{Project, ProjectPhase};
use crate::result::ModulessResult;

/// Watcher tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    /// Quiet period after the first change event before refreshing
    pub debounce_ms: u64,
    /// Poll interval for backends that poll
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            poll_interval_ms: 250,
        }
    }
}

impl WatchConfig {
    /// Default tuning
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce period
    #[must_use]
    pub const fn with_debounce(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }
}

/// Watches every project's output file and refreshes the project on change.
/// Dropping it stops watching and cancels the workers.
pub struct ProjectWatcher {
    watcher: Option<RecommendedWatcher>,
    workers: Vec<JoinHandle<()>>,
    watched: Vec<PathBuf>,
}

impl std::fmt::Debug for ProjectWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectWatcher")
            .field("is_running", &self.is_running())
            .field("watched", &self.watched)
            .finish()
    }
}

impl ProjectWatcher {
    /// Start watching. Must be called from within a tokio runtime.
    pub fn start(graph: &ProjectGraph, bus: &MessageBus, config: WatchConfig) -> ModulessResult<Self> {
        let mut routes: HashMap<PathBuf, UnboundedSender<()>> = HashMap::new();
        let mut workers = Vec::new();
        let mut watched = Vec::new();
        let mut dirs = HashSet::new();

        for project in graph.iter() {
            let Some(out_file) = project.out_file() else {
                continue;
            };
            let (tx, rx) = unbounded_channel();
            workers.push(tokio::spawn(worker(
                project.clone(),
                bus.clone(),
                rx,
                Duration::from_millis(config.debounce_ms),
            )));

            // Event paths may come back canonicalized
            if let Ok(canonical) = out_file.canonicalize() {
                routes.insert(canonical, tx.clone());
            }
            routes.insert(out_file.to_path_buf(), tx);
            watched.push(out_file.to_path_buf());

            // Compilers often replace the file, so watch its directory
            if let Some(dir) = out_file.parent() {
                dirs.insert(dir.to_path_buf());
            }
        }

        let watcher_config =
            Config::default().with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => route(&routes, &event),
                Err(err) => tracing::warn!("Watch error: {err}"),
            },
            watcher_config,
        )?;

        for dir in &dirs {
            if dir.exists() {
                watcher.watch(dir, RecursiveMode::NonRecursive)?;
            } else {
                tracing::warn!("Output directory does not exist yet: {}", dir.display());
            }
        }

        for project in graph.iter().filter(|p| p.out_file().is_some()) {
            project.set_phase(ProjectPhase::Watching);
        }
        tracing::debug!(files = watched.len(), "Watching output files");

        Ok(Self {
            watcher: Some(watcher),
            workers,
            watched,
        })
    }

    /// Output files being watched
    #[must_use]
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Whether the watcher is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching and cancel the workers
    pub fn stop(&mut self) {
        self.watcher = None;
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn route(routes: &HashMap<PathBuf, UnboundedSender<()>>, event: &Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) {
        return;
    }
    for path in &event.paths {
        if let Some(tx) = routes.get(path) {
            // A closed channel means the watcher is shutting down
            let _ = tx.send(());
        }
    }
}

async fn worker(
    project: Arc<Project>,
    bus: MessageBus,
    mut changes: UnboundedReceiver<()>,
    debounce: Duration,
) {
    while changes.recv().await.is_some() {
        tokio::time::sleep(debounce).await;
        while changes.try_recv().is_ok() {}

        tracing::debug!(project = project.name(), "Output changed");
        let refreshing = project.clone();
        let bus = bus.clone();
        match tokio::task::spawn_blocking(move || refreshing.refresh(&bus)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::warn!(project = project.name(), "{err}"),
            Err(err) => tracing::error!(project = project.name(), "Refresh task failed: {err}"),
        }
    }
}
