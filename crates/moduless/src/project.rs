//! One compilation unit and its instrumented output.
//!
//! A [`Project`] is immutable apart from its [`ProjectState`], which only the
//! project's refresh pipeline writes: once when the graph is built and then
//! after every change to the output file.

use std::path::Path;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use regex::Regex;
use sourcemap::SourceMap;

use crate::bus::MessageBus;
use crate::config::{to_url_path, ProjectConfig, ScriptReference};
use crate::instrument::{self, source_map, CoverFunctionRecord, SourcePosition};
use crate::migration::{reconcile, MigrationSteps};
use crate::protocol::{AddCoverMessage, ReloadMessage, RemoveCoverMessage};
use crate::result::{ModulessError, ModulessResult};

/// Index of a project in its [`ProjectGraph`](crate::graph::ProjectGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub(crate) usize);

/// Watch lifecycle of a project's output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectPhase {
    /// Output file not registered with a watcher
    #[default]
    Unwatched,
    /// Output file changes trigger a refresh
    Watching,
}

/// Mutable part of a project
#[derive(Debug, Default)]
pub struct ProjectState {
    /// Watch lifecycle
    pub phase: ProjectPhase,
    /// Bundle text to serve
    pub instrumented_code: String,
    /// Cover functions in declaration order
    pub covers: Vec<CoverFunctionRecord>,
    /// Map from `instrumented_code` to original sources
    pub source_map: Option<SourceMap>,
    /// Whether an instrumentation pass ever succeeded
    pub instrumented: bool,
}

impl ProjectState {
    /// Cover names in declaration order
    #[must_use]
    pub fn cover_names(&self) -> Vec<String> {
        self.covers.iter().map(|c| c.name.clone()).collect()
    }
}

/// A compilation unit
#[derive(Debug)]
pub struct Project {
    id: ProjectId,
    config: ProjectConfig,
    references: Vec<ProjectId>,
    state: RwLock<ProjectState>,
}

impl Project {
    pub(crate) fn new(id: ProjectId, config: ProjectConfig, references: Vec<ProjectId>) -> Self {
        Self {
            id,
            config,
            references,
            state: RwLock::new(ProjectState::default()),
        }
    }

    /// Position in the graph
    #[must_use]
    pub const fn id(&self) -> ProjectId {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Parsed configuration
    #[must_use]
    pub const fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Absolute config file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config.config_path
    }

    /// Config path as used in cover events
    #[must_use]
    pub fn key(&self) -> String {
        self.config.config_path.display().to_string()
    }

    /// Directory holding the config file
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Absolute output file path, if any
    #[must_use]
    pub fn out_file(&self) -> Option<&Path> {
        self.config.out_file.as_deref()
    }

    /// Scripts this project itself contributes
    #[must_use]
    pub fn scripts(&self) -> &[ScriptReference] {
        &self.config.scripts
    }

    /// Directly referenced projects
    #[must_use]
    pub fn references(&self) -> &[ProjectId] {
        &self.references
    }

    /// Read access to the mutable state
    pub fn state(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Watch lifecycle
    #[must_use]
    pub fn phase(&self) -> ProjectPhase {
        self.state().phase
    }

    pub(crate) fn set_phase(&self, phase: ProjectPhase) {
        self.state_mut().phase = phase;
    }

    /// Bundle text to serve
    #[must_use]
    pub fn instrumented_code(&self) -> String {
        self.state().instrumented_code.clone()
    }

    /// Cover names in declaration order
    #[must_use]
    pub fn cover_names(&self) -> Vec<String> {
        self.state().cover_names()
    }

    /// Where a cover function is declared
    #[must_use]
    pub fn cover_position(&self, name: &str) -> Option<SourcePosition> {
        self.state()
            .covers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.position.clone())
    }

    /// Served source map, as JSON
    #[must_use]
    pub fn source_map_json(&self) -> Option<String> {
        let state = self.state();
        let map = state.source_map.as_ref()?;
        match source_map::to_json(map) {
            Ok(json) => Some(json),
            Err(err) => {
                tracing::warn!(project = self.name(), "Cannot encode source map: {err}");
                None
            }
        }
    }

    /// Instrument the output file without announcing anything
    pub(crate) fn initialize(&self) {
        if let Err(err) = self.reinstrument() {
            tracing::warn!(project = self.name(), "{err}");
        }
    }

    /// Re-read and re-instrument the output file, then announce the changes:
    /// one removal per vanished cover (old index), one addition per new cover
    /// (new index), then a reload.
    pub fn refresh(&self, bus: &MessageBus) -> ModulessResult<MigrationSteps<String>> {
        let (old, new) = self.reinstrument()?;
        let steps = reconcile(&old, &new);
        let key = self.key();

        for &index in &steps.indexes_to_delete {
            bus.emit(RemoveCoverMessage::new(key.clone(), old[index].clone(), index));
        }
        for insertion in &steps.items_to_add {
            bus.emit(AddCoverMessage::new(
                key.clone(),
                insertion.item.clone(),
                insertion.index,
            ));
        }
        bus.emit(ReloadMessage);

        tracing::info!(
            project = self.name(),
            removed = steps.indexes_to_delete.len(),
            added = steps.items_to_add.len(),
            "Reinstrumented"
        );
        Ok(steps)
    }

    /// Returns the cover names before and after
    fn reinstrument(&self) -> ModulessResult<(Vec<String>, Vec<String>)> {
        let out_file = self.out_file().ok_or_else(|| ModulessError::NoProjectFor {
            path: self.key(),
        })?;
        let code = std::fs::read_to_string(out_file)?;

        match instrument::instrument(&code, out_file) {
            Ok(result) => {
                let mut state = self.state_mut();
                let old = state.cover_names();
                state.instrumented_code = result.code;
                state.covers = result.covers;
                state.source_map = result.source_map;
                state.instrumented = true;
                Ok((old, state.cover_names()))
            }
            Err(err) => {
                let mut state = self.state_mut();
                if !state.instrumented {
                    state.instrumented_code = code;
                }
                Err(err)
            }
        }
    }

    /// Map a runner stack frame that points into this project's bundle back
    /// to the original source
    #[must_use]
    pub fn resolve_frame(&self, frame: &str) -> Option<SourcePosition> {
        let (url, line, column) = parse_frame(frame)?;
        let out_file = self.out_file()?;
        if url_path(&url) != to_url_path(out_file) {
            return None;
        }
        let state = self.state();
        let map = state.source_map.as_ref()?;
        source_map::lookup(map, line.checked_sub(1)?, column.saturating_sub(1))
    }
}

fn frame_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*at\s.*?\(?(\S+?):(\d+)(?::(\d+))?\)?$").ok())
        .as_ref()
}

/// Split `at fn (url:line:col)` into its location parts
#[must_use]
pub fn parse_frame(frame: &str) -> Option<(String, u32, u32)> {
    let caps = frame_pattern()?.captures(frame.trim_end())?;
    let line = caps.get(2)?.as_str().parse().ok()?;
    let column = caps
        .get(3)
        .and_then(|c| c.as_str().parse().ok())
        .unwrap_or(1);
    Some((caps.get(1)?.as_str().to_string(), line, column))
}

/// Path part of a URL, percent-decoded
fn url_path(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("/", |i| &without_scheme[i..]);
    let path = path.split(['?', '#']).next().unwrap_or(path);
    percent_encoding::percent_decode_str(path)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, MessageKind};
    use std::sync::{Arc, Mutex};

    fn project_in(dir: &Path, code: &str) -> Project {
        std::fs::write(dir.join("out.js"), code).unwrap();
        let config = ProjectConfig::parse(
            &dir.join("tsconfig.json"),
            r#"{ "compilerOptions": { "outFile": "out.js" } }"#,
        )
        .unwrap();
        let project = Project::new(ProjectId(0), config, Vec::new());
        project.initialize();
        project
    }

    fn recorded(bus: &MessageBus) -> Arc<Mutex<Vec<Message>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.listen_all(move |m| sink.lock().unwrap().push(m.clone()));
        seen
    }

    #[test]
    fn test_initialize_instruments() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), "function coverA() { return () => true; }\n");
        assert_eq!(project.cover_names(), vec!["coverA"]);
        assert!(project.instrumented_code().contains("Moduless.addCover(coverA)"));
        assert_eq!(project.name(), "out");
        assert_eq!(project.cover_position("coverA").unwrap().line, 1);
    }

    #[test]
    fn test_refresh_emits_removals_additions_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(
            dir.path(),
            "function coverA() {}\nfunction coverB() {}\nfunction coverC() {}\n",
        );
        let bus = MessageBus::new();
        let seen = recorded(&bus);

        std::fs::write(
            dir.path().join("out.js"),
            "function coverA() {}\nfunction coverC() {}\nfunction coverD() {}\n",
        )
        .unwrap();
        project.refresh(&bus).unwrap();

        let seen = seen.lock().unwrap();
        let kinds: Vec<_> = seen.iter().map(Message::kind).collect();
        assert_eq!(
            kinds,
            vec![MessageKind::RemoveCover, MessageKind::AddCover, MessageKind::Reload]
        );
        assert_eq!(
            seen[0],
            RemoveCoverMessage::new(project.key(), "coverB", 1).into()
        );
        assert_eq!(seen[1], AddCoverMessage::new(project.key(), "coverD", 2).into());
    }

    #[test]
    fn test_failed_refresh_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), "function coverA() {}\n");
        let good = project.instrumented_code();

        std::fs::write(dir.path().join("out.js"), "function coverA( {").unwrap();
        let bus = MessageBus::new();
        assert!(project.refresh(&bus).is_err());
        assert_eq!(project.instrumented_code(), good);
        assert_eq!(project.cover_names(), vec!["coverA"]);
    }

    #[test]
    fn test_first_failure_serves_raw_text() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), "function coverA( {");
        assert_eq!(project.instrumented_code(), "function coverA( {");
        assert!(project.cover_names().is_empty());
    }

    #[test]
    fn test_parse_frame() {
        let (url, line, column) =
            parse_frame("    at coverA (http://localhost:10001/p/out.js:12:5)").unwrap();
        assert_eq!(url, "http://localhost:10001/p/out.js");
        assert_eq!((line, column), (12, 5));
        assert!(parse_frame("Error: boom").is_none());
    }

    #[test]
    fn test_resolve_frame_through_own_map() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_in(dir.path(), "function coverA() {\n  throw new Error('x');\n}\n");
        let out = to_url_path(&dir.path().join("out.js"));
        let frame = format!("    at coverA (http://localhost:1{out}:2:3)");
        let position = project.resolve_frame(&frame).unwrap();
        assert_eq!(position.line, 2);
        assert!(project.resolve_frame("    at x (http://localhost:1/other.js:2:3)").is_none());
    }
}
