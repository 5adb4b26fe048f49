//! Persisted user preferences.
//!
//! The browser front end kept two values across visits: the dark-mode flag
//! and the selected model. [`Preferences`] carries the same pair, persisted
//! as JSON through a [`PreferenceStore`]. A missing or unreadable store
//! yields defaults rather than an error; losing a theme toggle is not worth
//! failing startup over.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Model identifier used when the user has not picked one.
pub const DEFAULT_MODEL: &str = "openai-gpt3.5";

/// User preferences that survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            dark_mode: false,
            model: default_model(),
        }
    }
}

/// Backing storage for [`Preferences`].
pub trait PreferenceStore {
    /// Load preferences, falling back to defaults when nothing is stored or
    /// the stored payload cannot be decoded.
    fn load(&self) -> Preferences;

    /// Persist preferences.
    fn save(&mut self, prefs: &Preferences) -> Result<()>;
}

/// JSON-file-backed store, one file per profile.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl PreferenceStore for FileStore {
    fn load(&self) -> Preferences {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Preferences::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read preferences: {e}");
                return Preferences::default();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to decode preferences: {e}");
                Preferences::default()
            }
        }
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store for tests and embedders with their own persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    prefs: Option<Preferences>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Preferences {
        self.prefs.clone().unwrap_or_default()
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        self.prefs = Some(prefs.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_the_stock_model() {
        let prefs = Preferences::default();
        assert!(!prefs.dark_mode);
        assert_eq!(prefs.model, DEFAULT_MODEL);
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load(), Preferences::default());

        let prefs = Preferences {
            dark_mode: true,
            model: "anthropic-claude".into(),
        };
        store.save(&prefs).unwrap();
        assert_eq!(store.load(), prefs);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("story-arcade-test-{}", uuid::Uuid::new_v4()));
        let mut store = FileStore::new(dir.join("prefs.json"));

        // Nothing on disk yet.
        assert_eq!(store.load(), Preferences::default());

        let prefs = Preferences {
            dark_mode: true,
            model: "local-llama".into(),
        };
        store.save(&prefs).unwrap();
        assert_eq!(store.load(), prefs);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("story-arcade-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.load(), Preferences::default());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_fields_default_on_decode() {
        let prefs: Preferences = serde_json::from_str("{}").unwrap();
        assert_eq!(prefs, Preferences::default());

        let prefs: Preferences = serde_json::from_str(r#"{"dark_mode": true}"#).unwrap();
        assert!(prefs.dark_mode);
        assert_eq!(prefs.model, DEFAULT_MODEL);
    }
}
