//! Persisted user preferences.
//!
//! One file per key inside a tool-owned storage directory. Message-valued keys
//! hold the serialized message, flags hold `true` or `false`. The store is an
//! explicit object: load it once, mutate it, `flush` it.

use std::path::{Path, PathBuf};

use crate::protocol::{self, Message, SelectCoverMessage, WindowMetricsMessage};
use crate::result::ModulessResult;

/// Keys of the preference store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    /// Last selected cover, a serialized `SelectCoverMessage`
    SelectedCover,
    /// Launch the browser windowed
    IsBrowserShown,
    /// Open the inspector panel on launch
    IsDevtoolsShown,
    /// Last window geometry, a serialized `WindowMetricsMessage`
    WindowMetrics,
}

impl PreferenceKey {
    /// Every key
    pub const ALL: [Self; 4] = [
        Self::SelectedCover,
        Self::IsBrowserShown,
        Self::IsDevtoolsShown,
        Self::WindowMetrics,
    ];

    /// File name inside the storage directory
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::SelectedCover => "selectedCover",
            Self::IsBrowserShown => "isBrowserShown",
            Self::IsDevtoolsShown => "isDevtoolsShown",
            Self::WindowMetrics => "windowMetrics",
        }
    }
}

/// The preference store
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    dir: PathBuf,
    /// Last selected cover
    pub selected_cover: Option<SelectCoverMessage>,
    /// Launch the browser windowed
    pub browser_shown: bool,
    /// Open the inspector panel on launch
    pub devtools_shown: bool,
    /// Last window geometry
    pub window_metrics: Option<WindowMetricsMessage>,
}

impl Preferences {
    /// Empty store backed by `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            selected_cover: None,
            browser_shown: false,
            devtools_shown: false,
            window_metrics: None,
        }
    }

    /// Platform data directory, e.g. `~/.local/share/moduless`
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::data_dir().map_or_else(|| PathBuf::from(".moduless"), |dir| dir.join("moduless"))
    }

    /// Storage directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read whatever keys exist under `dir`; unreadable values fall back to defaults
    pub fn load(dir: impl Into<PathBuf>) -> ModulessResult<Self> {
        let mut prefs = Self::new(dir);
        for key in PreferenceKey::ALL {
            let path = prefs.dir.join(key.file_name());
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            prefs.apply(key, text.trim());
        }
        Ok(prefs)
    }

    fn apply(&mut self, key: PreferenceKey, text: &str) {
        match key {
            PreferenceKey::IsBrowserShown => self.browser_shown = text == "true",
            PreferenceKey::IsDevtoolsShown => self.devtools_shown = text == "true",
            PreferenceKey::SelectedCover => {
                self.selected_cover = decode(key, text, |m| match m {
                    Message::SelectCover(m) => Some(m),
                    _ => None,
                });
            }
            PreferenceKey::WindowMetrics => {
                self.window_metrics = decode(key, text, |m| match m {
                    Message::WindowMetrics(m) => Some(m),
                    _ => None,
                });
            }
        }
    }

    /// Stored text of a key, `None` when the key has no value
    #[must_use]
    pub fn encode(&self, key: PreferenceKey) -> Option<String> {
        match key {
            PreferenceKey::IsBrowserShown => Some(self.browser_shown.to_string()),
            PreferenceKey::IsDevtoolsShown => Some(self.devtools_shown.to_string()),
            PreferenceKey::SelectedCover => self
                .selected_cover
                .clone()
                .map(|m| protocol::serialize(&m.into())),
            PreferenceKey::WindowMetrics => self.window_metrics.map(|m| protocol::serialize(&m.into())),
        }
    }

    /// Write every key that has a value, creating the directory if needed
    pub fn flush(&self) -> ModulessResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        for key in PreferenceKey::ALL {
            if let Some(text) = self.encode(key) {
                std::fs::write(self.dir.join(key.file_name()), text)?;
            }
        }
        tracing::debug!(dir = %self.dir.display(), "Preferences flushed");
        Ok(())
    }
}

fn decode<T>(key: PreferenceKey, text: &str, pick: impl FnOnce(Message) -> Option<T>) -> Option<T> {
    if text.is_empty() {
        return None;
    }
    match protocol::parse(text) {
        Ok(message) => pick(message),
        Err(err) => {
            tracing::warn!(key = key.file_name(), "Ignoring stored preference: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(dir.path().join("absent")).unwrap();
        assert_eq!(prefs, Preferences::new(dir.path().join("absent")));
    }

    #[test]
    fn test_flush_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage");
        let mut prefs = Preferences::new(&storage);
        prefs.browser_shown = true;
        prefs.selected_cover = Some(SelectCoverMessage::new("/p/out.js", "coverA"));
        prefs.window_metrics = Some(WindowMetricsMessage {
            screen_x: 10.0,
            screen_y: 20.0,
            width: 800.0,
            height: 600.0,
        });
        prefs.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(storage.join("isBrowserShown")).unwrap(),
            "true"
        );
        assert_eq!(
            std::fs::read_to_string(storage.join("selectedCover")).unwrap(),
            r#"["SelectCoverMessage","/p/out.js","coverA"]"#
        );
        assert_eq!(Preferences::load(&storage).unwrap(), prefs);
    }

    #[test]
    fn test_corrupt_value_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("windowMetrics"), "garbage").unwrap();
        std::fs::write(dir.path().join("isDevtoolsShown"), "yes").unwrap();
        let prefs = Preferences::load(dir.path()).unwrap();
        assert!(prefs.window_metrics.is_none());
        assert!(!prefs.devtools_shown);
    }

    #[test]
    fn test_wrong_message_type_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("selectedCover"), r#"["ReloadMessage"]"#).unwrap();
        assert!(Preferences::load(dir.path()).unwrap().selected_cover.is_none());
    }
}
