//! Shell execution through an existing tmux pane.
//!
//! Sends the command with `tmux send-keys`, then polls the pane contents
//! until the configured prompt pattern re-appears below the echoed
//! command. Everything between the command echo and the re-emerged prompt
//! is the captured output.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::{ExecutionResult, ExecutionStatus, Executor, OutputEvent, OutputSink};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Executes commands by driving a tmux pane.
pub struct TmuxShellExecutor {
    target: String,
    prompt_pattern: Regex,
    check_exit_code: bool,
}

impl TmuxShellExecutor {
    pub fn new(
        target: impl Into<String>,
        prompt_pattern: &str,
        check_exit_code: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            target: target.into(),
            prompt_pattern: Regex::new(prompt_pattern)?,
            check_exit_code,
        })
    }

    async fn tmux(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new("tmux")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run tmux: {e}"))?;
        if !output.status.success() {
            return Err(format!(
                "tmux {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send_line(&self, line: &str) -> Result<(), String> {
        self.tmux(&["send-keys", "-t", &self.target, line, "Enter"])
            .await
            .map(|_| ())
    }

    async fn capture_pane(&self) -> Result<String, String> {
        self.tmux(&["capture-pane", "-p", "-t", &self.target]).await
    }

    /// Wait for `pred` to extract a value from the pane contents.
    async fn poll_pane<T>(
        &self,
        limit: Duration,
        mut pred: impl FnMut(&str) -> Option<T>,
    ) -> Result<T, String> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let pane = self.capture_pane().await?;
            if let Some(value) = pred(&pane) {
                return Ok(value);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(format!(
                    "prompt did not re-appear within {limit:?} (pattern: {})",
                    self.prompt_pattern.as_str()
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Extract the output lines between the last echo of `command` and the
/// prompt line that follows it. None while the prompt hasn't re-appeared.
fn extract_output(pane: &str, command: &str, prompt: &Regex) -> Option<String> {
    let lines: Vec<&str> = pane.lines().collect();
    let echo_idx = lines.iter().rposition(|line| line.contains(command))?;
    let prompt_idx = lines
        .iter()
        .enumerate()
        .skip(echo_idx + 1)
        .find(|(_, line)| prompt.is_match(line))
        .map(|(i, _)| i)?;
    let body = lines[echo_idx + 1..prompt_idx].join("\n");
    Some(if body.is_empty() { body } else { body + "\n" })
}

/// Pull the numeric result of `echo $?` out of the pane.
fn extract_exit_code(pane: &str, marker: &str) -> Option<i32> {
    // The marker line itself is the echo of the command; the code is on
    // the following non-empty line.
    let lines: Vec<&str> = pane.lines().collect();
    let echo_idx = lines.iter().rposition(|line| line.contains(marker))?;
    lines
        .iter()
        .skip(echo_idx + 1)
        .find_map(|line| line.trim().parse::<i32>().ok())
}

#[async_trait]
impl Executor for TmuxShellExecutor {
    async fn execute(
        &self,
        command: &str,
        sink: OutputSink,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::new(command);
        result.status = ExecutionStatus::Running;
        let limit = timeout.unwrap_or(DEFAULT_TIMEOUT);

        if let Err(e) = self.send_line(command).await {
            result.error = format!("{e}\n");
            result.status = ExecutionStatus::Error;
            let _ = sink.send(OutputEvent::Stderr(result.error.clone()));
            return result;
        }

        let output = self
            .poll_pane(limit, |pane| {
                extract_output(pane, command, &self.prompt_pattern)
            })
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                result.error = format!("{e}\n");
                result.status = ExecutionStatus::Error;
                let _ = sink.send(OutputEvent::Stderr(result.error.clone()));
                return result;
            }
        };

        if !output.is_empty() {
            let _ = sink.send(OutputEvent::Stdout(output.clone()));
        }
        result.output = output;

        if self.check_exit_code {
            let marker = "echo $?";
            let code = match self.send_line(marker).await {
                Ok(()) => {
                    self.poll_pane(limit, |pane| extract_exit_code(pane, marker))
                        .await
                }
                Err(e) => Err(e),
            };
            match code {
                Ok(0) => result.status = ExecutionStatus::Success,
                Ok(code) => {
                    result.status = ExecutionStatus::Error;
                    result
                        .error
                        .push_str(&format!("command exited with status {code}\n"));
                }
                Err(e) => {
                    result.status = ExecutionStatus::Error;
                    result.error.push_str(&format!("{e}\n"));
                }
            }
        } else {
            // Without exit-code confirmation, reaching the prompt again is
            // the best success signal available.
            result.status = ExecutionStatus::Success;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Regex {
        Regex::new(r"^\$ ").unwrap()
    }

    #[test]
    fn test_extract_output_between_echo_and_prompt() {
        let pane = "$ ls -la\ntotal 0\nfile.txt\n$ ";
        let out = extract_output(pane, "ls -la", &prompt()).unwrap();
        assert_eq!(out, "total 0\nfile.txt\n");
    }

    #[test]
    fn test_extract_output_waits_for_prompt() {
        // Command echoed but still running: no prompt below it yet.
        let pane = "$ sleep 10\npartial";
        assert!(extract_output(pane, "sleep 10", &prompt()).is_none());
    }

    #[test]
    fn test_extract_output_empty_command_output() {
        let pane = "$ true\n$ ";
        assert_eq!(extract_output(pane, "true", &prompt()).unwrap(), "");
    }

    #[test]
    fn test_extract_output_uses_last_echo() {
        // The same command ran earlier in the scrollback.
        let pane = "$ pwd\n/old\n$ pwd\n/new\n$ ";
        assert_eq!(extract_output(pane, "pwd", &prompt()).unwrap(), "/new\n");
    }

    #[test]
    fn test_extract_exit_code() {
        let pane = "$ false\n$ echo $?\n1\n$ ";
        assert_eq!(extract_exit_code(pane, "echo $?"), Some(1));

        let pane = "$ true\n$ echo $?\n0\n$ ";
        assert_eq!(extract_exit_code(pane, "echo $?"), Some(0));
    }

    #[test]
    fn test_bad_prompt_pattern_rejected() {
        assert!(TmuxShellExecutor::new("main", "([", false).is_err());
    }
}
