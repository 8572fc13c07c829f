use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

const UI_PREFS_FILE: &str = "ui-prefs.json";

pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["zh-CN", "en-US"];

/// Window-local preferences. Never sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPrefs {
    pub sidebar_collapsed: bool,
    pub language: String,
}

impl Default for UiPrefs {
    fn default() -> Self {
        Self {
            sidebar_collapsed: false,
            language: DEFAULT_LANGUAGE.into(),
        }
    }
}

impl UiPrefs {
    pub fn load() -> Self {
        Self::load_from(&ui_prefs_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let mut prefs = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<UiPrefs>(&data) {
                Ok(prefs) => prefs,
                Err(err) => {
                    tracing::warn!("Failed to parse {}: {err}", path.display());
                    UiPrefs::default()
                }
            },
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read {}: {err}", path.display());
                }
                UiPrefs::default()
            }
        };
        if !is_supported(&prefs.language) {
            prefs.language = DEFAULT_LANGUAGE.into();
        }
        prefs
    }

    pub fn save(&self) -> io::Result<()> {
        self.save_to(&ui_prefs_path())
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        deskshell_util::write_json_atomic(path, self)
    }

    /// Returns false and leaves the language alone if `language` is unsupported.
    pub fn set_language(&mut self, language: &str) -> bool {
        if !is_supported(language) {
            return false;
        }
        self.language = language.to_string();
        true
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_collapsed = !self.sidebar_collapsed;
        self.sidebar_collapsed
    }
}

fn is_supported(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

pub fn ui_prefs_path() -> PathBuf {
    deskshell_util::state_file_path(UI_PREFS_FILE)
}
