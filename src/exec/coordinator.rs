//! Execution coordinator — routes code to executors and output to blocks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{
    ExecutionResult, Executor, OutputEvent, PythonExecutor, ShellExecutor, TmuxShellExecutor,
};
use crate::blocks::{BlockId, BlockKind, BlockStatus, BlockStore, Language};

/// Execution-related settings, extracted from the application config.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub shell_init_script: Option<String>,
    pub tmux_target: Option<String>,
    pub tmux_prompt_pattern: Option<String>,
    pub tmux_echo_exit_code: bool,
    /// Echo a Python expression's value into the output block.
    pub echo_result_value: bool,
}

/// Owns the executors and wires streamed output into the block store.
///
/// Given code and a language it creates the code-input block (unless the
/// caller already has one, e.g. re-execution or a tool-call block), picks
/// the executor, lazily creates a code-output block on first output so
/// silent commands stay compact, and stamps the final status back onto the
/// input block.
pub struct ExecutionCoordinator {
    store: Arc<Mutex<BlockStore>>,
    python: Arc<PythonExecutor>,
    shell: Arc<dyn Executor>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<Mutex<BlockStore>>, config: CoordinatorConfig) -> Self {
        let shell: Arc<dyn Executor> = match &config.tmux_target {
            Some(target) => {
                let pattern = config.tmux_prompt_pattern.as_deref().unwrap_or(r"^\$ ");
                match TmuxShellExecutor::new(target.clone(), pattern, config.tmux_echo_exit_code) {
                    Ok(tmux) => Arc::new(tmux),
                    Err(e) => {
                        tracing::warn!("invalid tmux prompt pattern, using plain shell: {e}");
                        Arc::new(ShellExecutor::with_init_script(
                            config.shell_init_script.clone(),
                        ))
                    }
                }
            }
            None => Arc::new(ShellExecutor::with_init_script(
                config.shell_init_script.clone(),
            )),
        };
        Self {
            store,
            python: Arc::new(PythonExecutor::new()),
            shell,
            config,
        }
    }

    /// Reset the Python interpreter session (fresh globals).
    pub async fn reset_python(&self) {
        self.python.reset().await;
    }

    /// Execute code, creating the input block unless one was passed in.
    ///
    /// Returns the execution result together with the input block id.
    pub async fn execute(
        &self,
        code: &str,
        language: Language,
        code_block: Option<BlockId>,
        in_context: bool,
        timeout: Option<Duration>,
    ) -> (ExecutionResult, BlockId) {
        let block_id = match code_block {
            Some(id) => id,
            None => self.store.lock().expect("block store poisoned").push(
                BlockKind::CodeInput {
                    code: code.to_string(),
                    language,
                    status: BlockStatus::Pending,
                },
                in_context,
            ),
        };
        self.set_block_status(block_id, BlockStatus::Running);

        let (sink, mut rx) = mpsc::unbounded_channel::<OutputEvent>();

        let executor: Arc<dyn Executor> = match language {
            Language::Python => self.python.clone(),
            Language::Bash => self.shell.clone(),
        };

        let exec_fut = executor.execute(code, sink, timeout);

        // Consume streamed output concurrently, creating the output block
        // on the first event.
        let store = Arc::clone(&self.store);
        let consume_fut = async move {
            let mut output_block: Option<BlockId> = None;
            while let Some(event) = rx.recv().await {
                let (text, is_error) = match event {
                    OutputEvent::Stdout(text) => (text, false),
                    OutputEvent::Stderr(text) => (text, true),
                };
                let mut store = store.lock().expect("block store poisoned");
                let id = *output_block.get_or_insert_with(|| {
                    store.push(
                        BlockKind::CodeOutput {
                            text: String::new(),
                            is_error,
                        },
                        in_context,
                    )
                });
                if let Err(e) = store.append_text(id, &text) {
                    tracing::warn!("output append failed: {e}");
                }
            }
            output_block
        };

        let (result, output_block) = tokio::join!(exec_fut, consume_fut);
        tracing::debug!(
            code_len = result.code.len(),
            status = ?result.status,
            "execution finished"
        );

        // REPL echo: show an expression's value even when nothing printed.
        if self.config.echo_result_value {
            if let Some(value) = &result.result_value {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let mut store = self.store.lock().expect("block store poisoned");
                match output_block {
                    Some(id) => {
                        let _ = store.append_text(id, &format!("{rendered}\n"));
                    }
                    None => {
                        store.push(
                            BlockKind::CodeOutput {
                                text: format!("{rendered}\n"),
                                is_error: false,
                            },
                            in_context,
                        );
                    }
                }
            }
        }

        self.set_block_status(block_id, result.status.into());
        (result, block_id)
    }

    fn set_block_status(&self, id: BlockId, status: BlockStatus) {
        let mut store = self.store.lock().expect("block store poisoned");
        if let Err(e) = store.set_status(id, status) {
            tracing::warn!("status update failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockStatus;

    fn coordinator() -> (ExecutionCoordinator, Arc<Mutex<BlockStore>>) {
        let store = Arc::new(Mutex::new(BlockStore::new()));
        let coord = ExecutionCoordinator::new(
            Arc::clone(&store),
            CoordinatorConfig {
                echo_result_value: true,
                ..CoordinatorConfig::default()
            },
        );
        (coord, store)
    }

    #[tokio::test]
    async fn test_shell_success_updates_block() {
        let (coord, store) = coordinator();
        let (result, block_id) = coord
            .execute("echo out", Language::Bash, None, true, None)
            .await;

        assert!(result.is_success());
        let store = store.lock().unwrap();
        assert_eq!(
            store.get(block_id).unwrap().status(),
            Some(BlockStatus::Success)
        );
        // One input block, one output block.
        assert_eq!(store.len(), 2);
        let output = store.last().unwrap();
        assert!(matches!(output.kind, BlockKind::CodeOutput { .. }));
        assert_eq!(output.text(), "out\n");
    }

    #[tokio::test]
    async fn test_silent_command_creates_no_output_block() {
        let (coord, store) = coordinator();
        let (result, _) = coord.execute("true", Language::Bash, None, true, None).await;

        assert!(result.is_success());
        assert_eq!(store.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_marks_block_error() {
        let (coord, store) = coordinator();
        let (result, block_id) = coord
            .execute("false", Language::Bash, None, true, None)
            .await;

        assert_eq!(result.status, super::super::ExecutionStatus::Error);
        assert_eq!(
            store.lock().unwrap().get(block_id).unwrap().status(),
            Some(BlockStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_existing_block_is_reused() {
        let (coord, store) = coordinator();
        let block_id = store.lock().unwrap().push(
            BlockKind::CodeInput {
                code: "echo hi".into(),
                language: Language::Bash,
                status: BlockStatus::Pending,
            },
            true,
        );
        let (_, returned) = coord
            .execute("echo hi", Language::Bash, Some(block_id), true, None)
            .await;
        assert_eq!(returned, block_id);
    }

    #[tokio::test]
    async fn test_python_expression_echoed() {
        let (coord, store) = coordinator();
        let (result, _) = coord
            .execute("40 + 2", Language::Python, None, true, None)
            .await;

        assert_eq!(result.result_value, Some(serde_json::json!(42)));
        let store = store.lock().unwrap();
        assert_eq!(store.last().unwrap().text(), "42\n");
    }
}
