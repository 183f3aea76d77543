//! Project configuration files (`tsconfig*.json`).
//!
//! Only the handful of keys Moduless cares about are read: `name`,
//! `compilerOptions.outFile`, `references` and `moduless.scripts`. Like the
//! TypeScript compiler, comments and trailing commas are tolerated.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::result::{ModulessError, ModulessResult};

/// Where a script tag of the generated page points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// `http://` or `https://` URL, used verbatim
    External,
    /// File on disk listed under `moduless.scripts`
    Local,
    /// The project's own compiled output
    OutFile,
}

/// One script contributed by a project
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptReference {
    /// What the URI points at
    pub kind: ScriptKind,
    /// URL for external scripts, absolute path otherwise
    pub uri: String,
}

impl ScriptReference {
    /// Create a script reference
    #[must_use]
    pub fn new(kind: ScriptKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: uri.into(),
        }
    }

    /// The `src` attribute to use in the generated page
    #[must_use]
    pub fn src(&self) -> String {
        match self.kind {
            ScriptKind::External => self.uri.clone(),
            ScriptKind::Local | ScriptKind::OutFile => to_url_path(Path::new(&self.uri)),
        }
    }
}

/// Entry of a config's `references` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigReference {
    /// Path as written, relative to the referencing config
    pub path: String,
    /// Output of the referenced project is already concatenated into ours
    pub prepend: bool,
}

/// A parsed project configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Display name; defaults to the output file name without extension
    pub name: String,
    /// Absolute path of the config file
    pub config_path: PathBuf,
    /// Directory holding the config file
    pub dir: PathBuf,
    /// Absolute path of the compiled output, when the project has one
    pub out_file: Option<PathBuf>,
    /// Project references in declaration order
    pub references: Vec<ConfigReference>,
    /// Scripts in page order; the output file comes last
    pub scripts: Vec<ScriptReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    name: Option<String>,
    compiler_options: RawCompilerOptions,
    references: Vec<RawReference>,
    moduless: RawModuless,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCompilerOptions {
    out_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReference {
    path: serde_json::Value,
    prepend: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawModuless {
    scripts: RawScripts,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScripts {
    One(String),
    Many(Vec<serde_json::Value>),
}

impl Default for RawScripts {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl ProjectConfig {
    /// Read and parse a config file
    pub fn load(config_path: &Path) -> ModulessResult<Self> {
        let text = std::fs::read_to_string(config_path)?;
        Self::parse(config_path, &text)
    }

    /// Parse config text that lives at `config_path`
    pub fn parse(config_path: &Path, text: &str) -> ModulessResult<Self> {
        let config_path = absolute(config_path);
        let raw: RawConfig = serde_json::from_str(&strip_jsonc(text)).map_err(|err| {
            ModulessError::Config {
                path: config_path.display().to_string(),
                message: err.to_string(),
            }
        })?;

        let dir = config_path
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);

        let out_file = raw
            .compiler_options
            .out_file
            .filter(|out| !out.is_empty())
            .map(|out| normalize_path(&dir.join(out)));

        let references = raw
            .references
            .into_iter()
            .filter_map(|reference| match reference.path {
                serde_json::Value::String(path) => Some(ConfigReference {
                    path,
                    prepend: reference.prepend,
                }),
                _ => None,
            })
            .collect();

        let entries = match raw.moduless.scripts {
            RawScripts::One(script) => vec![serde_json::Value::String(script)],
            RawScripts::Many(scripts) => scripts,
        };
        let mut scripts = Vec::with_capacity(entries.len() + 1);
        for entry in entries {
            match classify_script(&dir, &entry) {
                Some(script) => scripts.push(script),
                None => tracing::error!(
                    config = %config_path.display(),
                    "Invalid script URL: {entry}"
                ),
            }
        }
        if let Some(out) = &out_file {
            scripts.push(ScriptReference::new(
                ScriptKind::OutFile,
                out.to_string_lossy(),
            ));
        }

        let name = raw
            .name
            .filter(|name| !name.is_empty())
            .or_else(|| {
                out_file
                    .as_deref()
                    .and_then(Path::file_stem)
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| {
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        Ok(Self {
            name,
            config_path,
            dir,
            out_file,
            references,
            scripts,
        })
    }
}

fn classify_script(dir: &Path, entry: &serde_json::Value) -> Option<ScriptReference> {
    let script = entry.as_str()?;
    if script.starts_with("http://") || script.starts_with("https://") {
        return Some(ScriptReference::new(ScriptKind::External, script));
    }
    if script.is_empty() || script.contains("://") {
        return None;
    }
    let path = normalize_path(&dir.join(script));
    Some(ScriptReference::new(ScriptKind::Local, path.to_string_lossy()))
}

/// Config file named by a `references` entry: a `.json` path names the file
/// itself, anything else names a directory holding `tsconfig.json`.
#[must_use]
pub fn resolve_reference(base_dir: &Path, reference: &str) -> PathBuf {
    let target = base_dir.join(reference);
    let target = if is_json(&target) {
        target
    } else {
        target.join("tsconfig.json")
    };
    normalize_path(&target)
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Make a path absolute against the working directory, then normalize it
#[must_use]
pub fn absolute(path: &Path) -> PathBuf {
    let joined = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    normalize_path(&joined)
}

/// Collapse `.` and `..` components without touching the file system
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Render a file path as an absolute URL path (`/` separated, leading `/`)
#[must_use]
pub fn to_url_path(path: &Path) -> String {
    let mut url = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            url.push('/');
            url.push_str(&part.to_string_lossy());
        }
    }
    if url.is_empty() {
        url.push('/');
    }
    url
}

/// Remove `//` and `/* */` comments and trailing commas from JSON text
#[must_use]
pub fn strip_jsonc(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut last = '\0';
                for skipped in chars.by_ref() {
                    if last == '*' && skipped == '/' {
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    last = skipped;
                }
            }
            _ => out.push(c),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
