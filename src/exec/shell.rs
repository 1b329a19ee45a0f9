//! Shell command execution with streaming output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::{ExecutionResult, ExecutionStatus, Executor, OutputEvent, OutputSink};

/// Characters that force interpretation through the system shell.
const SHELL_METACHARS: &[char] = &[
    '|', '&', ';', '>', '<', '*', '?', '[', ']', '$', '(', ')', '{', '}', '`', '\n',
];

/// Executes shell commands, one subprocess per call.
///
/// Commands containing shell metacharacters run via `sh -c`; anything else
/// is tokenised with `shlex` and executed directly, which keeps simple
/// commands off the shell and reduces the injection surface. Stdout and
/// stderr are read line-by-line concurrently and streamed through the
/// sink.
#[derive(Debug, Default)]
pub struct ShellExecutor {
    /// Sourced before every command when set (forces the shell path).
    pub init_script: Option<String>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_init_script(init_script: Option<String>) -> Self {
        Self { init_script }
    }

    fn build_command(&self, command: &str) -> Result<Command, String> {
        let needs_shell =
            self.init_script.is_some() || command.contains(|c| SHELL_METACHARS.contains(&c));

        if needs_shell {
            let script = match &self.init_script {
                Some(init) => format!("{init}\n{command}"),
                None => command.to_string(),
            };
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
            return Ok(cmd);
        }

        let args =
            shlex::split(command).ok_or_else(|| "unbalanced quotes in command".to_string())?;
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        Ok(cmd)
    }
}

/// Read one stream line-by-line, forwarding to the sink and a buffer.
async fn stream_lines<R>(
    reader: R,
    sink: OutputSink,
    buffer: &mut String,
    make_event: fn(String) -> OutputEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let text = format!("{line}\n");
        buffer.push_str(&text);
        let _ = sink.send(make_event(text));
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(
        &self,
        command: &str,
        sink: OutputSink,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::new(command);
        result.status = ExecutionStatus::Running;

        let mut cmd = match self.build_command(command) {
            Ok(cmd) => cmd,
            Err(msg) => {
                let text = format!("Invalid command syntax: {msg}\n");
                let _ = sink.send(OutputEvent::Stderr(text.clone()));
                result.error = text;
                result.status = ExecutionStatus::Error;
                return result;
            }
        };

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let text = format!("Failed to execute command: {e}\n");
                let _ = sink.send(OutputEvent::Stderr(text.clone()));
                result.error = text;
                result.status = ExecutionStatus::Error;
                return result;
            }
        };

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        let mut out_buf = String::new();
        let mut err_buf = String::new();

        // Bind the outcome so the future's borrows of the child and the
        // buffers end before the arms below touch them.
        let wait_result: Option<std::io::Result<std::process::ExitStatus>> = {
            let run = async {
                tokio::join!(
                    stream_lines(stdout, sink.clone(), &mut out_buf, OutputEvent::Stdout),
                    stream_lines(stderr, sink.clone(), &mut err_buf, OutputEvent::Stderr),
                );
                child.wait().await
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        result.output = out_buf;
        result.error = err_buf;
        result.status = match wait_result {
            Some(Ok(status)) if status.success() => ExecutionStatus::Success,
            Some(Ok(_)) => ExecutionStatus::Error,
            Some(Err(e)) => {
                result.error.push_str(&format!("Process wait failed: {e}\n"));
                ExecutionStatus::Error
            }
            None => {
                let _ = child.start_kill();
                let limit = timeout.expect("timeout elapsed without a limit");
                result.error.push_str(&format!("Timed out after {limit:?}\n"));
                ExecutionStatus::Error
            }
        };
        result
    }
}
