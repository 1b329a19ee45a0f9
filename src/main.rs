mod agent;
mod app;
mod blocks;
mod cli;
mod config;
mod error;
mod event;
mod exec;
mod stream;
mod tools;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use color_eyre::eyre::Result;
use crossterm::{
    event::DisableMouseCapture,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agent::{
    AgentCoordinator, AgentSettings, OpenAiConfig, OpenAiProvider, Provider, SimulatedProvider,
    SimulatedTurn,
};
use app::App;
use blocks::BlockStore;
use cli::Cli;
use config::{ArtificeConfig, SessionWriter};
use exec::{CoordinatorConfig, ExecutionCoordinator};

/// Log directory (~/.local/share/artifice/logs/).
fn log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "artifice")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("/tmp/artifice/logs"))
}

/// Log to a daily-rotated file; the terminal itself stays clean.
fn init_logging(log_level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = log_dir();
    std::fs::create_dir_all(&log_path)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_path, "artifice.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    Ok(guard)
}

fn build_provider(cli: &Cli, config: &ArtificeConfig) -> (Arc<dyn Provider>, String, bool) {
    if cli.simulated {
        let provider = Arc::new(SimulatedProvider::new(vec![SimulatedTurn::text(
            "Simulated mode. Here's a block to try:\n\n```bash\necho hello from artifice\n```\nExecute it with ctrl-r.",
        )]));
        return (provider, "simulated".to_string(), false);
    }

    let (name, profile) = match config.active_agent() {
        Some((name, profile)) => (name.to_string(), profile.clone()),
        None => ("default".to_string(), config::AgentProfile::default()),
    };
    let model = cli
        .model
        .clone()
        .unwrap_or_else(|| profile.model.clone());
    let xml_tool_calls = agent::is_minimax_model(&model);

    let mut openai = OpenAiConfig {
        api_key: cli.api_key.clone(),
        model: model.clone(),
        xml_tool_calls,
        ..OpenAiConfig::default()
    };
    if let Some(base_url) = &cli.base_url {
        openai.base_url = base_url.clone();
    }

    let label = format!("{name}:{model}");
    (
        Arc::new(OpenAiProvider::new(openai)),
        label,
        profile.use_tools,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.log_level)?;

    let config = config::load_config(cli.config.clone())?;
    tracing::info!("configuration loaded");

    let store = Arc::new(Mutex::new(BlockStore::new()));
    let exec = Arc::new(ExecutionCoordinator::new(
        Arc::clone(&store),
        CoordinatorConfig {
            shell_init_script: config.shell_init_script.clone(),
            tmux_target: config.tmux_target.clone(),
            tmux_prompt_pattern: config.tmux_prompt_pattern.clone(),
            tmux_echo_exit_code: config.tmux_echo_exit_code,
            echo_result_value: true,
        },
    ));

    let (provider, agent_label, use_tools) = build_provider(&cli, &config);
    let provider_name = provider.name().to_string();

    let settings = AgentSettings {
        system_prompt: config.system_prompt.clone(),
        prompt_prefix: config.prompt_prefix.clone(),
        use_tools,
        tool_patterns: vec!["*".to_string()],
        pause_on_code: cli.pause_on_code,
        auto_send: config.send_user_commands_to_agent,
        show_tool_output: config.show_tool_output,
    };
    let agent = Arc::new(tokio::sync::Mutex::new(AgentCoordinator::new(
        provider,
        Arc::clone(&store),
        Arc::clone(&exec),
        settings,
        config.streaming_fps,
    )));

    let session = if config.save_sessions {
        match SessionWriter::create(
            &config.sessions_dir(),
            &agent_label,
            &provider_name,
            config.system_prompt.as_deref(),
        ) {
            Ok(writer) => {
                tracing::info!("session transcript: {}", writer.path().display());
                Some(writer)
            }
            Err(e) => {
                tracing::warn!("could not create session transcript: {e}");
                None
            }
        }
    } else {
        None
    };

    // Terminal setup with a restore guard: never leave raw mode behind.
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(config, store, exec, agent, session, agent_label);
    let run_result = app.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    run_result?;
    Ok(())
}
