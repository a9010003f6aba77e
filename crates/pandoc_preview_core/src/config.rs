//! Persisted application state.
//!
//! Only convenience data lives here: the recently opened documents shown on
//! the start screen. Persistence failures are never errors, just warnings;
//! the tool works fine with an empty config.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Maximum number of recent files to keep.
const MAX_RECENT_FILES: usize = 20;

/// Config file name.
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedConfig {
    recent_files: Vec<String>,
}

/// Application configuration with JSON persistence.
#[derive(Debug, Default)]
pub struct AppConfig {
    recent_files: VecDeque<PathBuf>,
    config_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the user's config directory.
    pub fn load_default() -> Self {
        Self::load(dirs::config_dir().map(|dir| dir.join("pandoc-preview")))
    }

    /// Load from an explicit config directory, or run in-memory with `None`.
    pub fn load(config_dir: Option<PathBuf>) -> Self {
        let mut config = Self {
            recent_files: VecDeque::new(),
            config_dir,
        };
        config.load_from_disk();
        config
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|dir| dir.join(CONFIG_FILE))
    }

    fn load_from_disk(&mut self) {
        let Some(path) = self.config_path() else {
            return;
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file found");
            return;
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<PersistedConfig>(&content) {
                Ok(persisted) => {
                    self.recent_files = persisted
                        .recent_files
                        .into_iter()
                        .map(PathBuf::from)
                        .filter(|p| p.exists())
                        .collect();
                    tracing::info!(count = self.recent_files.len(), "loaded recent files");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse config file");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to read config file");
            }
        }
    }

    fn save(&self) {
        let Some(path) = self.config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create config directory");
                return;
            }
        }

        let persisted = PersistedConfig {
            recent_files: self
                .recent_files
                .iter()
                .filter_map(|p| p.to_str().map(String::from))
                .collect(),
        };

        match serde_json::to_string_pretty(&persisted) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&path, content) {
                    tracing::warn!(error = %e, "failed to write config file");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize config");
            }
        }
    }

    /// Record a freshly opened document.
    pub fn add_recent(&mut self, path: &Path) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.push_front(path.to_path_buf());
        while self.recent_files.len() > MAX_RECENT_FILES {
            self.recent_files.pop_back();
        }
        self.save();
    }

    /// Recent documents, most recent first.
    pub fn recent(&self) -> Vec<String> {
        self.recent_files
            .iter()
            .filter_map(|p| p.to_str().map(String::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("a.md");
        std::fs::write(&doc, "x").unwrap();

        let mut config = AppConfig::load(Some(dir.path().to_path_buf()));
        config.add_recent(&doc);

        let reloaded = AppConfig::load(Some(dir.path().to_path_buf()));
        assert_eq!(reloaded.recent(), vec![doc.to_str().unwrap().to_string()]);
    }

    #[test]
    fn test_missing_entries_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("a.md");
        std::fs::write(&doc, "x").unwrap();

        let mut config = AppConfig::load(Some(dir.path().to_path_buf()));
        config.add_recent(&doc);
        std::fs::remove_file(&doc).unwrap();

        let reloaded = AppConfig::load(Some(dir.path().to_path_buf()));
        assert!(reloaded.recent().is_empty());
    }

    #[test]
    fn test_reopen_moves_to_front_without_duplicate() {
        let mut config = AppConfig::load(None);
        config.add_recent(Path::new("/tmp/a.md"));
        config.add_recent(Path::new("/tmp/b.md"));
        config.add_recent(Path::new("/tmp/a.md"));
        assert_eq!(config.recent(), vec!["/tmp/a.md", "/tmp/b.md"]);
    }

    #[test]
    fn test_recent_list_is_bounded() {
        let mut config = AppConfig::load(None);
        for i in 0..30 {
            config.add_recent(Path::new(&format!("/tmp/{i}.md")));
        }
        assert_eq!(config.recent().len(), MAX_RECENT_FILES);
        assert_eq!(config.recent()[0], "/tmp/29.md");
    }
}
