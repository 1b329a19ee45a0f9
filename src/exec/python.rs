//! Python execution with persistent REPL semantics.
//!
//! A long-lived `python3` child process holds the interpreter state, so
//! variables, functions and imports persist across executions. The child
//! runs a small driver loop: it reads one JSON request per line on stdin
//! and emits JSON events on stdout — `out` / `err` for streamed output and
//! a final `done` carrying the expression value or error. Expression-first
//! evaluation (try `eval`, fall back to `exec`) happens inside the driver,
//! which is where Python's own compiler lives.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{ExecutionResult, ExecutionStatus, Executor, OutputEvent, OutputSink};

/// Driver loop run inside the python child. Protocol events go to the
/// duplicated original stdout; user prints are redirected into events.
const DRIVER: &str = r#"
import json, os, sys, traceback

proto = os.fdopen(os.dup(1), "w", buffering=1)

class _Emit:
    def __init__(self, kind):
        self._kind = kind
    def write(self, s):
        if s:
            proto.write(json.dumps({"t": self._kind, "d": s}) + "\n")
        return len(s)
    def flush(self):
        pass

sys.stdout = _Emit("out")
sys.stderr = _Emit("err")

scope = {"__name__": "__main__"}

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        code = json.loads(line)["code"]
    except (ValueError, KeyError):
        continue
    value = None
    error = None
    try:
        try:
            value = eval(compile(code, "<repl>", "eval"), scope)
        except SyntaxError:
            value = None
            exec(compile(code, "<repl>", "exec"), scope)
    except BaseException:
        error = traceback.format_exc()
        sys.stderr.write(error)
    if value is not None and not isinstance(value, (int, float, str, bool, list, dict)):
        value = repr(value)
    try:
        proto.write(json.dumps({"t": "done", "value": value, "error": error}) + "\n")
    except (TypeError, ValueError):
        proto.write(json.dumps({"t": "done", "value": repr(value), "error": error}) + "\n")
"#;

#[derive(Debug, Deserialize)]
struct DriverEvent {
    t: String,
    #[serde(default)]
    d: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl Session {
    async fn spawn(program: &str) -> std::io::Result<Session> {
        let mut child = Command::new(program)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().expect("stdin piped");
        let stdout = BufReader::new(child.stdout.take().expect("stdout piped")).lines();
        Ok(Session {
            child,
            stdin,
            stdout,
        })
    }
}

/// Executes Python code in a persistent interpreter session.
///
/// A mutex serialises executions — only one piece of code touches the
/// interpreter at a time. `reset` discards the session (and with it the
/// accumulated globals); the next execution starts a fresh one.
pub struct PythonExecutor {
    program: String,
    session: Mutex<Option<Session>>,
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonExecutor {
    pub fn new() -> Self {
        Self::with_program("python3")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            session: Mutex::new(None),
        }
    }

    /// Discard the interpreter session and its globals.
    pub async fn reset(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.child.start_kill();
        }
    }

    async fn run_in_session(
        &self,
        session: &mut Session,
        code: &str,
        sink: &OutputSink,
        result: &mut ExecutionResult,
    ) -> Result<(), std::io::Error> {
        let request = serde_json::json!({ "code": code });
        session
            .stdin
            .write_all(format!("{request}\n").as_bytes())
            .await?;

        loop {
            let line = match session.stdout.next_line().await? {
                Some(line) => line,
                None => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "python interpreter exited",
                    ))
                }
            };
            let event: DriverEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(_) => continue,
            };
            match event.t.as_str() {
                "out" => {
                    result.output.push_str(&event.d);
                    let _ = sink.send(OutputEvent::Stdout(event.d));
                }
                "err" => {
                    result.error.push_str(&event.d);
                    let _ = sink.send(OutputEvent::Stderr(event.d));
                }
                "done" => {
                    result.result_value = event.value;
                    result.exception = event.error;
                    return Ok(());
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl Executor for PythonExecutor {
    async fn execute(
        &self,
        code: &str,
        sink: OutputSink,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::new(code);
        result.status = ExecutionStatus::Running;

        let mut guard = self.session.lock().await;
        if guard.is_none() {
            match Session::spawn(&self.program).await {
                Ok(session) => *guard = Some(session),
                Err(e) => {
                    let text = format!("Failed to start python: {e}\n");
                    let _ = sink.send(OutputEvent::Stderr(text.clone()));
                    result.error = text;
                    result.status = ExecutionStatus::Error;
                    return result;
                }
            }
        }
        // Bind the outcome so the future's borrows of session and result
        // end before the cleanup below.
        let outcome: Option<Result<(), std::io::Error>> = {
            let session = guard.as_mut().expect("session just ensured");
            let run = self.run_in_session(session, code, &sink, &mut result);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(r) => Some(r),
                    Err(_) => None,
                },
                None => Some(run.await),
            }
        };

        match outcome {
            Some(Ok(())) => {
                result.status = if result.exception.is_some() || !result.error.is_empty() {
                    ExecutionStatus::Error
                } else {
                    ExecutionStatus::Success
                };
            }
            Some(Err(e)) => {
                // Child died mid-run; drop the session so the next call
                // respawns.
                *guard = None;
                result.error.push_str(&format!("{e}\n"));
                result.status = ExecutionStatus::Error;
            }
            None => {
                // The interpreter may be stuck mid-execution; a fresh
                // session is the only safe continuation.
                if let Some(mut dead) = guard.take() {
                    let _ = dead.child.start_kill();
                }
                let limit = timeout.expect("timeout elapsed without a limit");
                result
                    .error
                    .push_str(&format!("Timed out after {limit:?}\n"));
                result.status = ExecutionStatus::Error;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sink() -> (OutputSink, mpsc::UnboundedReceiver<OutputEvent>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_expression_returns_value() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        let result = exec.execute("1 + 2", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.result_value, Some(serde_json::json!(3)));
    }

    #[tokio::test]
    async fn test_repl_state_persists_across_calls() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        let result = exec.execute("x = 5", tx.clone(), None).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.result_value, None);

        let result = exec.execute("x + 1", tx, None).await;
        assert_eq!(result.result_value, Some(serde_json::json!(6)));
    }

    #[tokio::test]
    async fn test_print_streams_stdout() {
        let exec = PythonExecutor::new();
        let (tx, mut rx) = sink();
        let result = exec.execute("print('hi')", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.output, "hi\n");
        assert!(matches!(rx.try_recv().unwrap(), OutputEvent::Stdout(_)));
    }

    #[tokio::test]
    async fn test_runtime_error_is_captured() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        let result = exec.execute("1 / 0", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.exception.is_some());
        assert!(result.error.contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_captured() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        let result = exec.execute("def :", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.contains("SyntaxError"));
    }

    #[tokio::test]
    async fn test_reset_clears_globals() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        exec.execute("y = 42", tx.clone(), None).await;
        exec.reset().await;
        let result = exec.execute("y", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Error);
        assert!(result.error.contains("NameError"));
    }

    #[tokio::test]
    async fn test_non_json_value_falls_back_to_repr() {
        let exec = PythonExecutor::new();
        let (tx, _rx) = sink();
        let result = exec.execute("set([1])", tx, None).await;
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.result_value, Some(serde_json::json!("{1}")));
    }
}
