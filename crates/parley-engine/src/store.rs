//! On-disk session state: `settings.toml` and `history.json` in the state directory.

use parley_core::{write_atomic, ConversationTurn, CoreResult, Settings};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.toml";
const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn load_settings(&self) -> CoreResult<Settings> {
        Settings::load_from_path(&self.settings_path())
    }

    pub fn save_settings(&self, settings: &Settings) -> CoreResult<()> {
        settings.save_to_path(&self.settings_path())
    }

    /// Persisted turns, or an empty history when none were saved.
    pub fn load_history(&self) -> CoreResult<Vec<ConversationTurn>> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_history(&self, turns: &[ConversationTurn]) -> CoreResult<()> {
        let content = serde_json::to_string_pretty(turns)?;
        write_atomic(&self.history_path(), &content)?;
        Ok(())
    }

    pub fn clear_history(&self) -> CoreResult<()> {
        let path = self.history_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
