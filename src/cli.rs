use clap::Parser;
use std::path::PathBuf;

/// Artifice: interactive terminal for an LLM assistant with executable
/// code blocks
#[derive(Parser, Debug, Clone)]
#[command(name = "artifice")]
#[command(version)]
#[command(about = "Interactive LLM terminal with executable code blocks", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (default: ~/.config/artifice/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API key for the configured provider. Overrides config.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL override for OpenAI-compatible endpoints
    #[arg(long, env = "ARTIFICE_BASE_URL")]
    pub base_url: Option<String>,

    /// Model override (takes precedence over the agent profile)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Use the simulated provider instead of a real backend
    #[arg(long, default_value_t = false)]
    pub simulated: bool,

    /// Pause streaming at each code block for confirmation
    #[arg(long, default_value_t = false)]
    pub pause_on_code: bool,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
