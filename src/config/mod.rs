// Config module - rendering options are consumed by the UI layer as needed
#![allow(dead_code)]

//! Configuration loaded from `~/.config/artifice/config.toml`.
//!
//! Every setting has a sensible default; unknown keys are preserved in a
//! side-table so user extensions pass through untouched.

mod history;
mod session;

pub use history::{History, InputMode};
pub use session::SessionWriter;

use std::collections::BTreeMap;
use std::path::PathBuf;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{ArtificeError, Result};

const CONFIG_DIR: &str = "artifice";
const CONFIG_FILE: &str = "config.toml";

/// A configured agent: which backend and model to talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub provider: String,
    pub model: String,
    pub context_window: Option<u32>,
    pub use_tools: bool,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: String::new(),
            context_window: None,
            use_tools: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtificeConfig {
    /// Name of the active agent in `agents`.
    pub agent: Option<String>,
    pub agents: BTreeMap<String, AgentProfile>,

    pub system_prompt: Option<String>,
    pub prompt_prefix: Option<String>,
    pub thinking_budget: Option<u32>,

    /// Auto-send mode default: execution results flow back to the agent.
    pub send_user_commands_to_agent: bool,

    // Markdown rendering of captured output, per source.
    pub python_markdown: bool,
    pub shell_markdown: bool,
    pub agent_markdown: bool,

    // Wrap captured output in a code-block widget, per source.
    pub python_output_code_block: bool,
    pub shell_output_code_block: bool,
    pub tmux_output_code_block: bool,

    pub shell_init_script: Option<String>,

    pub tmux_target: Option<String>,
    pub tmux_prompt_pattern: Option<String>,
    pub tmux_echo_exit_code: bool,

    pub streaming_fps: u32,

    pub save_sessions: bool,
    pub sessions_dir: Option<PathBuf>,

    pub show_tool_output: bool,

    /// Unrecognised keys, kept for pass-through.
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl Default for ArtificeConfig {
    fn default() -> Self {
        Self {
            agent: None,
            agents: BTreeMap::new(),
            system_prompt: None,
            prompt_prefix: None,
            thinking_budget: None,
            send_user_commands_to_agent: true,
            python_markdown: false,
            shell_markdown: false,
            agent_markdown: true,
            python_output_code_block: true,
            shell_output_code_block: true,
            tmux_output_code_block: true,
            shell_init_script: None,
            tmux_target: None,
            tmux_prompt_pattern: None,
            tmux_echo_exit_code: false,
            streaming_fps: 30,
            save_sessions: true,
            sessions_dir: None,
            show_tool_output: true,
            extra: BTreeMap::new(),
        }
    }
}

impl ArtificeConfig {
    /// The active agent profile, if configured.
    pub fn active_agent(&self) -> Option<(&str, &AgentProfile)> {
        let name = self.agent.as_deref()?;
        self.agents.get(name).map(|profile| (name, profile))
    }

    /// Where session transcripts go.
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".artifice")
                .join("sessions")
        })
    }
}

/// Path of the user config file.
pub fn config_path() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| {
        ArtificeError::Config("could not determine home directory".to_string())
    })?;
    Ok(base.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load configuration, falling back to defaults when the file is absent.
pub fn load_config(path: Option<PathBuf>) -> Result<ArtificeConfig> {
    let path = match path {
        Some(path) => path,
        None => config_path()?,
    };
    if !path.exists() {
        return Ok(ArtificeConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| ArtificeError::Config(format!("{}: {e}", path.display())))?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<ArtificeConfig> {
    toml::from_str(text).map_err(|e| ArtificeError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ArtificeConfig::default();
        assert!(config.send_user_commands_to_agent);
        assert_eq!(config.streaming_fps, 30);
        assert!(config.save_sessions);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_parse_full_document() {
        let config = parse_config(
            r#"
agent = "main"
system_prompt = "be brief"
prompt_prefix = "[user] "
send_user_commands_to_agent = false
streaming_fps = 60
tmux_target = "dev:0.1"
tmux_prompt_pattern = "^\\$ "
tmux_echo_exit_code = true

[agents.main]
provider = "openai"
model = "gpt-4o"
use_tools = true
context_window = 128000
"#,
        )
        .unwrap();

        assert_eq!(config.agent.as_deref(), Some("main"));
        let (name, profile) = config.active_agent().unwrap();
        assert_eq!(name, "main");
        assert_eq!(profile.model, "gpt-4o");
        assert!(profile.use_tools);
        assert_eq!(profile.context_window, Some(128_000));
        assert!(!config.send_user_commands_to_agent);
        assert_eq!(config.streaming_fps, 60);
        assert_eq!(config.tmux_target.as_deref(), Some("dev:0.1"));
        assert!(config.tmux_echo_exit_code);
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let config = parse_config("my_custom_flag = true\nstreaming_fps = 15\n").unwrap();
        assert_eq!(config.streaming_fps, 15);
        assert_eq!(
            config.extra.get("my_custom_flag"),
            Some(&toml::Value::Boolean(true))
        );
    }

    #[test]
    fn test_empty_document_is_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.streaming_fps, ArtificeConfig::default().streaming_fps);
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let config = load_config(Some(PathBuf::from("/no/such/config.toml"))).unwrap();
        assert!(config.agent.is_none());
    }
}
