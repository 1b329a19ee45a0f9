// Command history - some accessors are test-facing
#![allow(dead_code)]

//! Command history persistence, per input mode.
//!
//! One JSON document holds three circular buffers (`python`, `ai`,
//! `shell`). Written with 0600 permissions since prompts and commands
//! are private.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_ENTRIES: usize = 1000;

/// What the input line currently feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Ai,
    Python,
    Shell,
}

impl InputMode {
    pub const ALL: [InputMode; 3] = [InputMode::Ai, InputMode::Python, InputMode::Shell];

    fn key(self) -> &'static str {
        match self {
            InputMode::Ai => "ai",
            InputMode::Python => "python",
            InputMode::Shell => "shell",
        }
    }

    /// Cycle Ai -> Python -> Shell -> Ai.
    pub fn next(self) -> InputMode {
        match self {
            InputMode::Ai => InputMode::Python,
            InputMode::Python => InputMode::Shell,
            InputMode::Shell => InputMode::Ai,
        }
    }
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

struct ModeState {
    entries: Vec<String>,
    /// None = not navigating; Some(i) = showing entries[i].
    index: Option<usize>,
    stashed_input: String,
}

/// Per-mode command history with file persistence.
pub struct History {
    modes: HashMap<InputMode, ModeState>,
    file: PathBuf,
    max_entries: usize,
}

impl History {
    pub fn new(file: Option<PathBuf>) -> Self {
        let file = file.unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".artifice_history.json")
        });
        let mut history = Self {
            modes: InputMode::ALL
                .into_iter()
                .map(|mode| {
                    (
                        mode,
                        ModeState {
                            entries: Vec::new(),
                            index: None,
                            stashed_input: String::new(),
                        },
                    )
                })
                .collect(),
            file,
            max_entries: DEFAULT_MAX_ENTRIES,
        };
        history.load();
        history
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn entries(&self, mode: InputMode) -> &[String] {
        &self.modes[&mode].entries
    }

    /// Record an entry and reset navigation.
    pub fn add(&mut self, entry: &str, mode: InputMode) {
        if entry.is_empty() {
            return;
        }
        let state = self.modes.get_mut(&mode).expect("all modes present");
        state.entries.push(entry.to_string());
        if state.entries.len() > self.max_entries {
            let overflow = state.entries.len() - self.max_entries;
            state.entries.drain(..overflow);
        }
        state.index = None;
        state.stashed_input.clear();
    }

    /// Step to the previous entry, stashing the in-progress input on the
    /// first step. None at the oldest entry.
    pub fn navigate_back(&mut self, mode: InputMode, current_input: &str) -> Option<String> {
        let state = self.modes.get_mut(&mode).expect("all modes present");
        if state.entries.is_empty() {
            return None;
        }
        let next_index = match state.index {
            None => {
                state.stashed_input = current_input.to_string();
                state.entries.len() - 1
            }
            Some(0) => return None,
            Some(i) => i - 1,
        };
        state.index = Some(next_index);
        Some(state.entries[next_index].clone())
    }

    /// Step to the next entry; at the newest, restore the stashed input.
    pub fn navigate_forward(&mut self, mode: InputMode) -> Option<String> {
        let state = self.modes.get_mut(&mode).expect("all modes present");
        let index = state.index?;
        if index + 1 < state.entries.len() {
            state.index = Some(index + 1);
            Some(state.entries[index + 1].clone())
        } else {
            state.index = None;
            Some(std::mem::take(&mut state.stashed_input))
        }
    }

    fn load(&mut self) {
        let Ok(text) = std::fs::read_to_string(&self.file) else {
            return;
        };
        let Ok(doc) = serde_json::from_str::<HashMap<String, Vec<String>>>(&text) else {
            tracing::warn!("malformed history file: {}", self.file.display());
            return;
        };
        for mode in InputMode::ALL {
            if let Some(entries) = doc.get(mode.key()) {
                let state = self.modes.get_mut(&mode).expect("all modes present");
                state.entries = entries.clone();
            }
        }
    }

    /// Persist all modes. The file is chmod 0600.
    pub fn save(&self) -> std::io::Result<()> {
        let doc: HashMap<&str, &[String]> = InputMode::ALL
            .iter()
            .map(|mode| (mode.key(), self.modes[mode].entries.as_slice()))
            .collect();
        let text = serde_json::to_string(&doc).expect("history serialises");
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file, text)?;
        restrict_permissions(&self.file)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_history(dir: &TempDir) -> History {
        History::new(Some(dir.path().join("history.json")))
    }

    #[test]
    fn test_navigation_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut history = temp_history(&dir);
        history.add("first", InputMode::Ai);
        history.add("second", InputMode::Ai);

        assert_eq!(
            history.navigate_back(InputMode::Ai, "typing...").as_deref(),
            Some("second")
        );
        assert_eq!(
            history.navigate_back(InputMode::Ai, "").as_deref(),
            Some("first")
        );
        // At the oldest entry.
        assert_eq!(history.navigate_back(InputMode::Ai, ""), None);

        assert_eq!(
            history.navigate_forward(InputMode::Ai).as_deref(),
            Some("second")
        );
        // Forward past the newest restores the stashed input.
        assert_eq!(
            history.navigate_forward(InputMode::Ai).as_deref(),
            Some("typing...")
        );
    }

    #[test]
    fn test_modes_are_independent(){
        let dir = TempDir::new().unwrap();
        let mut history = temp_history(&dir);
        history.add("print(1)", InputMode::Python);
        history.add("ls", InputMode::Shell);

        assert_eq!(history.entries(InputMode::Python), ["print(1)"]);
        assert_eq!(history.entries(InputMode::Shell), ["ls"]);
        assert!(history.entries(InputMode::Ai).is_empty());
    }

    #[test]
    fn test_circular_buffer_caps() {
        let dir = TempDir::new().unwrap();
        let mut history = temp_history(&dir).with_max_entries(3);
        for i in 0..5 {
            history.add(&format!("cmd{i}"), InputMode::Shell);
        }
        assert_eq!(history.entries(InputMode::Shell), ["cmd2", "cmd3", "cmd4"]);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut history = History::new(Some(path.clone()));
        history.add("remembered", InputMode::Ai);
        history.save().unwrap();

        let reloaded = History::new(Some(path.clone()));
        assert_eq!(reloaded.entries(InputMode::Ai), ["remembered"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_mode_cycle() {
        assert_eq!(InputMode::Ai.next(), InputMode::Python);
        assert_eq!(InputMode::Python.next(), InputMode::Shell);
        assert_eq!(InputMode::Shell.next(), InputMode::Ai);
    }
}
