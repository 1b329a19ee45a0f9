//! Application state and the terminal controller.
//!
//! The [`App`] owns the block store, the execution and agent
//! coordinators, and the input line, and routes user-visible events:
//! prompts to the agent, code to the executors, execute/cancel/clear
//! actions to whichever component they belong to. Exactly one
//! cancellable task runs at a time.

mod render;

use std::sync::{Arc, Mutex};

use crossterm::event::{Event as CrosstermEvent, KeyCode, KeyEvent, KeyModifiers};
use futures::StreamExt;
use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{format_executed_message, AgentCoordinator, TokenUsage, TurnOutcome};
use crate::blocks::{BlockId, BlockKind, BlockStatus, BlockStore, BlockUpdate};
use crate::config::{ArtificeConfig, History, InputMode, SessionWriter};
use crate::error::Result;
use crate::event::TaskEvent;
use crate::exec::ExecutionCoordinator;

/// Milliseconds between UI refresh ticks.
const TICK_MS: u64 = 33;

pub struct App {
    pub(crate) store: Arc<Mutex<BlockStore>>,
    exec: Arc<ExecutionCoordinator>,
    agent: Arc<tokio::sync::Mutex<AgentCoordinator>>,
    history: History,
    session: Option<SessionWriter>,
    /// Next block id not yet written to the session transcript.
    session_cursor: u64,

    pub(crate) mode: InputMode,
    pub(crate) auto_send: bool,
    pub(crate) input: String,
    pub(crate) scroll_up: u16,
    pub(crate) selected_block: Option<BlockId>,
    pub(crate) paused_block: Option<BlockId>,
    pub(crate) agent_label: String,
    pub(crate) last_usage: Option<TokenUsage>,

    task: Option<JoinHandle<()>>,
    current_exec_block: Option<BlockId>,
    task_tx: mpsc::UnboundedSender<TaskEvent>,
    task_rx: mpsc::UnboundedReceiver<TaskEvent>,
    should_quit: bool,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ArtificeConfig,
        store: Arc<Mutex<BlockStore>>,
        exec: Arc<ExecutionCoordinator>,
        agent: Arc<tokio::sync::Mutex<AgentCoordinator>>,
        session: Option<SessionWriter>,
        agent_label: String,
    ) -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let auto_send = config.send_user_commands_to_agent;
        Self {
            store,
            exec,
            agent,
            history: History::new(None),
            session,
            session_cursor: 0,
            mode: InputMode::Ai,
            auto_send,
            input: String::new(),
            scroll_up: 0,
            selected_block: None,
            paused_block: None,
            agent_label,
            last_usage: None,
            task: None,
            current_exec_block: None,
            task_tx,
            task_rx,
            should_quit: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_block.is_some()
    }

    pub fn task_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Main loop: draw, then wait for input, a block update, a tick, or
    /// a task event.
    pub async fn run<B: Backend>(mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut input_events = crossterm::event::EventStream::new();
        let mut tick = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));
        let mut updates = self.store.lock().expect("block store poisoned").subscribe();

        loop {
            terminal.draw(|frame| render::draw(frame, &self))?;

            tokio::select! {
                maybe_event = input_events.next() => {
                    match maybe_event {
                        Some(Ok(event)) => self.handle_input(event),
                        Some(Err(e)) => tracing::warn!("input error: {e}"),
                        None => break,
                    }
                }
                Some(task_event) = self.task_rx.recv() => {
                    self.handle_task_event(task_event).await;
                }
                update = updates.recv() => {
                    // New output: follow the stream to the bottom. One
                    // redraw per loop turn debounces the scroll.
                    if matches!(
                        update,
                        Ok(BlockUpdate::Added(_) | BlockUpdate::Appended(_))
                    ) {
                        self.scroll_up = 0;
                    }
                }
                _ = tick.tick() => {}
            }

            if self.should_quit {
                break;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = self.history.save();
        self.flush_session();
        if let Some(session) = self.session.as_mut() {
            let _ = session.finish();
        }
    }

    // ── Input routing ────────────────────────────────────────────────────

    fn handle_input(&mut self, event: CrosstermEvent) {
        match event {
            CrosstermEvent::Key(key) => self.handle_key(key),
            CrosstermEvent::Paste(text) => self.input.push_str(&text),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        // Pause protocol takes over the keyboard until resolved.
        if let Some(block) = self.paused_block {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.run_paused_block(block),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Char('s') => {
                    self.resume_stream(false)
                }
                KeyCode::Esc => self.cancel_paused(),
                _ => {}
            }
            return;
        }

        match (key.code, ctrl) {
            (KeyCode::Char('c'), true) => {
                if self.task_running() {
                    self.cancel_task();
                } else {
                    self.should_quit = true;
                }
            }
            (KeyCode::Char('d'), true) => self.should_quit = true,
            (KeyCode::Char('l'), true) => self.clear_blocks(),
            (KeyCode::Char('k'), true) => self.clear_context(),
            (KeyCode::Char('a'), true) => self.toggle_auto_send(),
            (KeyCode::Char('r'), true) => self.execute_selected(),
            (KeyCode::Tab, _) => self.mode = self.mode.next(),
            (KeyCode::Esc, _) => self.cancel_task(),
            (KeyCode::Enter, _) => self.submit(),
            (KeyCode::Backspace, _) => {
                self.input.pop();
            }
            (KeyCode::Up, _) => {
                if let Some(entry) = self.history.navigate_back(self.mode, &self.input.clone()) {
                    self.input = entry;
                }
            }
            (KeyCode::Down, _) => {
                if let Some(entry) = self.history.navigate_forward(self.mode) {
                    self.input = entry;
                }
            }
            (KeyCode::PageUp, _) => self.scroll_up = self.scroll_up.saturating_add(5),
            (KeyCode::PageDown, _) => self.scroll_up = self.scroll_up.saturating_sub(5),
            (KeyCode::Char(c), false) => self.input.push(c),
            _ => {}
        }
    }

    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        if line.trim().is_empty() {
            return;
        }
        self.history.add(&line, self.mode);
        self.scroll_up = 0;
        match self.mode {
            InputMode::Ai => self.submit_prompt(line),
            InputMode::Python => self.submit_code(line, crate::blocks::Language::Python),
            InputMode::Shell => self.submit_code(line, crate::blocks::Language::Bash),
        }
    }

    fn submit_prompt(&mut self, prompt: String) {
        if self.task_running() {
            self.system_note("a task is already running");
            return;
        }
        self.store
            .lock()
            .expect("block store poisoned")
            .push(BlockKind::AgentInput { text: prompt.clone() }, self.auto_send);

        self.spawn_turn(prompt);
    }

    fn spawn_turn(&mut self, prompt: String) {
        let agent = Arc::clone(&self.agent);
        let tx = self.task_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = agent.lock().await.handle_prompt(&prompt).await;
            let _ = tx.send(TaskEvent::Turn(outcome));
        }));
    }

    fn submit_code(&mut self, code: String, language: crate::blocks::Language) {
        if self.task_running() {
            self.system_note("a task is already running");
            return;
        }
        let exec = Arc::clone(&self.exec);
        let tx = self.task_tx.clone();
        let auto_send = self.auto_send;

        // The input block is created here so cancellation can mark it.
        let block = self.store.lock().expect("block store poisoned").push(
            BlockKind::CodeInput {
                code: code.clone(),
                language,
                status: BlockStatus::Pending,
            },
            auto_send,
        );
        self.current_exec_block = Some(block);

        self.task = Some(tokio::spawn(async move {
            let (result, block) = exec
                .execute(&code, language, Some(block), auto_send, None)
                .await;
            let followup = auto_send.then(|| {
                format_executed_message(language, &code, &result.combined_output())
            });
            let _ = tx.send(TaskEvent::ExecDone {
                block,
                success: result.is_success(),
                followup,
            });
        }));
    }

    // ── Block execution dispatch ─────────────────────────────────────────

    /// "Execute this block": pending tool call, plain code block, or the
    /// paused detector's last code block.
    fn execute_selected(&mut self) {
        let Some(block) = self.selected_block.or_else(|| self.last_executable_block()) else {
            self.system_note("nothing to execute");
            return;
        };
        if self.task_running() {
            self.system_note("a task is already running");
            return;
        }

        let kind = {
            let store = self.store.lock().expect("block store poisoned");
            store.get(block).map(|b| b.kind.clone())
        };
        match kind {
            Some(BlockKind::ToolCall { .. }) => self.execute_tool_block(block),
            Some(BlockKind::CodeInput { code, language, .. }) => {
                let exec = Arc::clone(&self.exec);
                let tx = self.task_tx.clone();
                let auto_send = self.auto_send;
                self.current_exec_block = Some(block);
                self.task = Some(tokio::spawn(async move {
                    let (result, block) = exec
                        .execute(&code, language, Some(block), auto_send, None)
                        .await;
                    let followup = auto_send.then(|| {
                        format_executed_message(language, &code, &result.combined_output())
                    });
                    let _ = tx.send(TaskEvent::ExecDone {
                        block,
                        success: result.is_success(),
                        followup,
                    });
                }));
            }
            _ => self.system_note("selected block is not executable"),
        }
    }

    fn execute_tool_block(&mut self, block: BlockId) {
        let agent = Arc::clone(&self.agent);
        let tx = self.task_tx.clone();
        self.task = Some(tokio::spawn(async move {
            match agent.lock().await.execute_tool_block(block).await {
                Ok(continue_conversation) => {
                    let _ = tx.send(TaskEvent::ToolDone {
                        continue_conversation,
                    });
                }
                Err(e) => {
                    let _ = tx.send(TaskEvent::Failed(e));
                }
            }
        }));
    }

    fn last_executable_block(&self) -> Option<BlockId> {
        let store = self.store.lock().expect("block store poisoned");
        let id = store
            .iter()
            .rev()
            .find(|b| {
                matches!(
                    b.kind,
                    BlockKind::CodeInput {
                        status: BlockStatus::Pending,
                        ..
                    } | BlockKind::ToolCall {
                        status: BlockStatus::Pending,
                        ..
                    }
                )
            })
            .map(|b| b.id);
        id
    }

    // ── Pause protocol ───────────────────────────────────────────────────

    fn run_paused_block(&mut self, block: BlockId) {
        self.paused_block = None;
        let exec = Arc::clone(&self.exec);
        let agent = Arc::clone(&self.agent);
        let tx = self.task_tx.clone();
        let auto_send = self.auto_send;

        let (code, language) = {
            let store = self.store.lock().expect("block store poisoned");
            match store.get(block).map(|b| b.kind.clone()) {
                Some(BlockKind::CodeInput { code, language, .. }) => (code, language),
                _ => return,
            }
        };

        self.task = Some(tokio::spawn(async move {
            let _ = exec
                .execute(&code, language, Some(block), auto_send, None)
                .await;
            // Execution done: resume the interrupted stream.
            let outcome = agent.lock().await.resume_streaming();
            let _ = tx.send(TaskEvent::Turn(outcome));
        }));
    }

    fn resume_stream(&mut self, _executed: bool) {
        self.paused_block = None;
        let agent = Arc::clone(&self.agent);
        let tx = self.task_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = agent.lock().await.resume_streaming();
            let _ = tx.send(TaskEvent::Turn(outcome));
        }));
    }

    fn cancel_paused(&mut self) {
        self.paused_block = None;
        let agent = Arc::clone(&self.agent);
        let tx = self.task_tx.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = agent.lock().await.cancel_paused_turn();
            let _ = tx.send(TaskEvent::Turn(outcome));
        }));
    }

    // ── Task events ──────────────────────────────────────────────────────

    async fn handle_task_event(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Turn(outcome) => {
                self.task = None;
                match outcome {
                    TurnOutcome::Complete(response) => {
                        tracing::debug!(
                            chars = response.text.len(),
                            thinking = response.thinking.is_some(),
                            "turn complete"
                        );
                        if let Some(error) = response.error {
                            tracing::error!("turn failed: {error}");
                        }
                        if let Some(usage) = response.usage {
                            tracing::debug!(total = usage.total_tokens, "token usage");
                            self.last_usage = Some(usage);
                        }
                        if !response.tool_calls.is_empty() {
                            // Highlight the first pending tool call.
                            let agent = self.agent.lock().await;
                            self.selected_block = agent.pending_tool_blocks().first().copied();
                        } else {
                            self.selected_block = None;
                        }
                        self.flush_session();
                    }
                    TurnOutcome::Paused { block, .. } => {
                        self.paused_block = block;
                        self.selected_block = block;
                    }
                }
            }
            TaskEvent::ExecDone {
                block,
                success,
                followup,
            } => {
                tracing::debug!("execution of {block:?} finished (success={success})");
                self.task = None;
                self.current_exec_block = None;
                self.flush_session();
                if let Some(message) = followup {
                    self.spawn_turn(message);
                }
            }
            TaskEvent::ToolDone {
                continue_conversation,
            } => {
                self.task = None;
                self.selected_block = {
                    let agent = self.agent.lock().await;
                    agent.pending_tool_blocks().first().copied()
                };
                self.flush_session();
                if continue_conversation {
                    self.spawn_turn(String::new());
                }
            }
            TaskEvent::Failed(message) => {
                self.task = None;
                self.system_note(&message);
            }
        }
    }

    // ── Direct manipulations ─────────────────────────────────────────────

    fn cancel_task(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();

        // Mark the interrupted execution, if any.
        if let Some(block) = self.current_exec_block.take() {
            let mut store = self.store.lock().expect("block store poisoned");
            let _ = store.set_status(block, BlockStatus::Error);
            store.push(
                BlockKind::CodeOutput {
                    text: "[Execution cancelled]".to_string(),
                    is_error: true,
                },
                false,
            );
        }

        let agent = Arc::clone(&self.agent);
        let exec = Arc::clone(&self.exec);
        tokio::spawn(async move {
            // The aborted task may have left the interpreter mid-run.
            exec.reset_python().await;
            agent.lock().await.finalize_cancelled();
        });
        self.paused_block = None;
    }

    fn clear_blocks(&mut self) {
        self.store.lock().expect("block store poisoned").clear();
        self.selected_block = None;
        self.scroll_up = 0;
    }

    fn clear_context(&mut self) {
        self.store
            .lock()
            .expect("block store poisoned")
            .clear_context();
        let agent = Arc::clone(&self.agent);
        tokio::spawn(async move {
            agent.lock().await.clear_history();
        });
        self.system_note("context cleared");
    }

    fn toggle_auto_send(&mut self) {
        self.auto_send = !self.auto_send;
        let enabled = self.auto_send;
        let agent = Arc::clone(&self.agent);
        tokio::spawn(async move {
            agent.lock().await.set_auto_send(enabled);
        });
        self.system_note(if enabled {
            "auto-send on"
        } else {
            "auto-send off"
        });
    }

    fn system_note(&mut self, text: &str) {
        self.store.lock().expect("block store poisoned").push(
            BlockKind::System {
                text: text.to_string(),
            },
            false,
        );
    }

    /// Write blocks that finished since the last flush to the session
    /// transcript.
    fn flush_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let store = self.store.lock().expect("block store poisoned");
        let cursor = self.session_cursor;
        let mut new_cursor = cursor;
        for block in store.iter().filter(|b| b.id.0 >= cursor) {
            if block.is_streaming() {
                // Still growing; everything after it waits too.
                break;
            }
            if let Err(e) = session.write_block(block) {
                tracing::warn!("session write failed: {e}");
            }
            new_cursor = block.id.0 + 1;
        }
        self.session_cursor = new_cursor;
    }
}
