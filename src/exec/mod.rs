//! Code execution: Python REPL, shell subprocesses, tmux panes.

mod coordinator;
mod python;
mod shell;
mod tmux;

pub use coordinator::{CoordinatorConfig, ExecutionCoordinator};
pub use python::PythonExecutor;
pub use shell::ShellExecutor;
pub use tmux::TmuxShellExecutor;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::blocks::BlockStatus;

/// Status of a code execution. Monotonic: Pending → Running →
/// (Success | Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl From<ExecutionStatus> for BlockStatus {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Pending => BlockStatus::Pending,
            ExecutionStatus::Running => BlockStatus::Running,
            ExecutionStatus::Success => BlockStatus::Success,
            ExecutionStatus::Error => BlockStatus::Error,
        }
    }
}

/// Result of executing a piece of code or a command.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub code: String,
    pub status: ExecutionStatus,
    /// Accumulated stdout.
    pub output: String,
    /// Accumulated stderr.
    pub error: String,
    /// Value of a Python expression, when the code evaluated as one.
    pub result_value: Option<serde_json::Value>,
    /// Short description of a raised exception, if any.
    pub exception: Option<String>,
}

impl ExecutionResult {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: ExecutionStatus::Pending,
            output: String::new(),
            error: String::new(),
            result_value: None,
            exception: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// The text fed back to the assistant: stdout, then stderr.
    pub fn combined_output(&self) -> String {
        let mut text = self.output.clone();
        if !self.error.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.error);
        }
        text
    }
}

/// Streamed output from a running execution.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    Stdout(String),
    Stderr(String),
}

/// Channel the executor streams output through while running.
pub type OutputSink = mpsc::UnboundedSender<OutputEvent>;

/// Uniform executor interface for Python, shell, and tmux backends.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `code`, streaming stdout/stderr through `sink` as it arrives.
    ///
    /// Failures of the executed code are reported through the result's
    /// status, never as panics. A `timeout` of None means unbounded.
    async fn execute(
        &self,
        code: &str,
        sink: OutputSink,
        timeout: Option<Duration>,
    ) -> ExecutionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_into_block_status() {
        assert_eq!(
            BlockStatus::from(ExecutionStatus::Success),
            BlockStatus::Success
        );
        assert_eq!(BlockStatus::from(ExecutionStatus::Error), BlockStatus::Error);
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let mut result = ExecutionResult::new("cmd");
        result.output = "out".into();
        result.error = "err".into();
        assert_eq!(result.combined_output(), "out\nerr");

        let mut result = ExecutionResult::new("cmd");
        result.error = "only err".into();
        assert_eq!(result.combined_output(), "only err");
    }
}
