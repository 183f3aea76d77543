//! Prefs command handler

use std::fmt::Write as _;
use std::path::Path;

use moduless::{PreferenceKey, Preferences};

use crate::commands::{FlagKey, PrefsAction, PrefsArgs};
use crate::config::CliConfig;
use crate::error::CliResult;

/// Show, set or clear stored preferences
pub fn execute_prefs(config: &CliConfig, args: &PrefsArgs) -> CliResult<()> {
    let dir = config.storage_dir();
    match args.action.as_ref().unwrap_or(&PrefsAction::Show) {
        PrefsAction::Show => {
            let prefs = Preferences::load(&dir)?;
            print!("{}", render_preferences(&prefs));
        }
        PrefsAction::Set { key, value } => {
            let mut prefs = Preferences::load(&dir)?;
            set_flag(&mut prefs, *key, *value);
            prefs.flush()?;
            if !config.verbosity.is_quiet() {
                println!("{} = {value}", flag_key(*key).file_name());
            }
        }
        PrefsAction::Clear => {
            let removed = clear(&dir)?;
            if !config.verbosity.is_quiet() {
                println!("Removed {removed} preference(s) from {}", dir.display());
            }
        }
    }
    Ok(())
}

/// Store key of a settable flag
#[must_use]
pub const fn flag_key(key: FlagKey) -> PreferenceKey {
    match key {
        FlagKey::BrowserShown => PreferenceKey::IsBrowserShown,
        FlagKey::DevtoolsShown => PreferenceKey::IsDevtoolsShown,
    }
}

/// Change one flag in memory
pub fn set_flag(prefs: &mut Preferences, key: FlagKey, value: bool) {
    match key {
        FlagKey::BrowserShown => prefs.browser_shown = value,
        FlagKey::DevtoolsShown => prefs.devtools_shown = value,
    }
}

/// One `key: value` line per preference
#[must_use]
pub fn render_preferences(prefs: &Preferences) -> String {
    let mut out = format!("storage: {}\n", prefs.dir().display());
    for key in PreferenceKey::ALL {
        let value = prefs.encode(key).unwrap_or_else(|| "(unset)".to_string());
        let _ = writeln!(out, "{}: {value}", key.file_name());
    }
    out
}

/// Delete every stored key, returning how many existed
pub fn clear(dir: &Path) -> CliResult<usize> {
    let mut removed = 0;
    for key in PreferenceKey::ALL {
        match std::fs::remove_file(dir.join(key.file_name())) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(removed)
}
