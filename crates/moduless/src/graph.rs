//! The graph of projects reachable from a workspace's config files.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::bus::MessageBus;
use crate::config::{absolute, resolve_reference, ProjectConfig, ScriptReference};
use crate::project::{Project, ProjectId};
use crate::protocol::AddCoverMessage;
use crate::result::{ModulessError, ModulessResult};

/// File extensions that `find` resolves through a project's directory
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Every project reachable from a set of config files, keyed by config path
#[derive(Debug, Default)]
pub struct ProjectGraph {
    projects: Vec<Arc<Project>>,
    by_config: HashMap<PathBuf, ProjectId>,
}

impl ProjectGraph {
    /// Load every `tsconfig*.json` directly inside `root`
    pub fn discover(root: &Path) -> ModulessResult<Self> {
        let pattern = root.join("tsconfig*.json");
        let pattern = pattern.to_string_lossy();
        let mut configs: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|err| ModulessError::Config {
                path: pattern.to_string(),
                message: err.to_string(),
            })?
            .filter_map(Result::ok)
            .collect();
        configs.sort();
        Ok(Self::load(&configs))
    }

    /// Load the given config files and everything they reference
    #[must_use]
    pub fn load(config_paths: &[PathBuf]) -> Self {
        let mut graph = Self::default();
        let mut in_progress = HashSet::new();
        for path in config_paths {
            graph.create_recursive(&absolute(path), &mut in_progress);
        }
        for project in &graph.projects {
            tracing::info!(
                config = %project.config_path().display(),
                covers = project.cover_names().len(),
                "Adding project to graph"
            );
        }
        graph
    }

    fn create_recursive(
        &mut self,
        config_path: &Path,
        in_progress: &mut HashSet<PathBuf>,
    ) -> Option<ProjectId> {
        if let Some(id) = self.by_config.get(config_path) {
            return Some(*id);
        }
        if in_progress.contains(config_path) {
            tracing::warn!(
                "Circular project reference including: {}",
                config_path.display()
            );
            return None;
        }
        if !config_path.exists() {
            tracing::warn!("File does not exist: {}", config_path.display());
            return None;
        }

        let config = match ProjectConfig::load(config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("{err}");
                return None;
            }
        };

        in_progress.insert(config_path.to_path_buf());
        let mut references = Vec::new();
        for reference in &config.references {
            if reference.prepend {
                tracing::warn!(
                    "(Found {}, but skipping because \"prepend\" is true.)",
                    reference.path
                );
                continue;
            }
            let target = resolve_reference(&config.dir, &reference.path);
            if let Some(id) = self.create_recursive(&target, in_progress) {
                if !references.contains(&id) {
                    references.push(id);
                }
            }
        }
        in_progress.remove(config_path);

        let id = ProjectId(self.projects.len());
        let project = Project::new(id, config, references);
        if project.out_file().is_some() {
            project.initialize();
        }
        self.by_config.insert(config_path.to_path_buf(), id);
        self.projects.push(Arc::new(project));
        Some(id)
    }

    /// Number of projects
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether no project was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Borrow a project
    #[must_use]
    pub fn get(&self, id: ProjectId) -> &Arc<Project> {
        &self.projects[id.0]
    }

    /// Projects in load order (referenced projects before their referrers)
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Project>> {
        self.projects.iter()
    }

    /// Find the project a path relates to: its config file (or the directory
    /// holding `tsconfig.json`), its output file, or a script file somewhere
    /// under its directory (deepest project wins)
    #[must_use]
    pub fn find(&self, path: &Path) -> Option<&Arc<Project>> {
        let path = absolute(path);

        let as_config = resolve_reference(Path::new(""), &path.to_string_lossy());
        if let Some(id) = self.by_config.get(&as_config) {
            return Some(self.get(*id));
        }

        if let Some(project) = self.projects.iter().find(|p| p.out_file() == Some(path.as_path())) {
            return Some(project);
        }

        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
        if !is_source {
            return None;
        }
        self.projects
            .iter()
            .filter(|p| path.starts_with(p.dir()))
            .max_by_key(|p| p.dir().components().count())
    }

    /// The project and everything it references, depth-first, referenced
    /// projects first, each once
    #[must_use]
    pub fn recurse(&self, id: ProjectId) -> Vec<ProjectId> {
        fn visit(graph: &ProjectGraph, id: ProjectId, seen: &mut HashSet<ProjectId>, out: &mut Vec<ProjectId>) {
            if !seen.insert(id) {
                return;
            }
            for reference in graph.get(id).references() {
                visit(graph, *reference, seen, out);
            }
            out.push(id);
        }

        let mut out = Vec::new();
        visit(self, id, &mut HashSet::new(), &mut out);
        out
    }

    /// Every script the project's page needs, in dependency order, each URI
    /// once
    #[must_use]
    pub fn each_script(&self, id: ProjectId) -> Vec<ScriptReference> {
        let mut seen = HashSet::new();
        self.recurse(id)
            .into_iter()
            .flat_map(|project| self.get(project).scripts().iter())
            .filter(|script| seen.insert(script.uri.clone()))
            .cloned()
            .collect()
    }

    /// Emit an addition event for every known cover function
    pub fn announce(&self, bus: &MessageBus) {
        for project in &self.projects {
            let key = project.key();
            for (index, name) in project.cover_names().into_iter().enumerate() {
                bus.emit(AddCoverMessage::new(key.clone(), name, index));
            }
        }
    }
}
