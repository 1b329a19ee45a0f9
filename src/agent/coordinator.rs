// Agent coordinator - history accessors are test- and invariant-facing
#![allow(dead_code)]

//! Agent coordinator — orchestrates one user turn end to end.
//!
//! Pipes the provider's event stream through the stream manager (content
//! and thinking channels), aggregates tool-call deltas, materialises
//! tool-call blocks, keeps the conversation history consistent, and
//! drives the pause-on-code-block protocol.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use serde_json::Value;

use super::conversation::{ChatMessage, ConversationHistory, RawToolCall, Role};
use super::minimax;
use super::provider::{Provider, ProviderError, ProviderEvent, TokenUsage, ToolCallAggregator};
use crate::blocks::{BlockId, BlockKind, BlockStatus, BlockStore, Language};
use crate::exec::ExecutionCoordinator;
use crate::stream::{Drain, DrainOutcome, StreamManager};
use crate::tools::{ToolCall, ToolRegistry};

/// Agent behaviour knobs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub system_prompt: Option<String>,
    pub prompt_prefix: Option<String>,
    pub use_tools: bool,
    /// fnmatch-style patterns selecting which registered tools to expose.
    pub tool_patterns: Vec<String>,
    pub pause_on_code: bool,
    /// Auto-send mode: created blocks join the context and execution
    /// results flow back to the assistant automatically.
    pub auto_send: bool,
    pub show_tool_output: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            prompt_prefix: None,
            use_tools: false,
            tool_patterns: vec!["*".to_string()],
            pause_on_code: false,
            auto_send: true,
            show_tool_output: true,
        }
    }
}

/// The assembled result of one assistant turn.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    pub text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub error: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// What a turn produced: either it ran to completion, or it paused at a
/// closed code block and awaits the user's run / skip / cancel decision.
#[derive(Debug)]
pub enum TurnOutcome {
    Complete(AgentResponse),
    Paused {
        code: String,
        language: Language,
        block: Option<BlockId>,
    },
}

/// In-flight turn accumulation, kept across a pause.
struct TurnState {
    text: String,
    thinking: String,
    aggregator: ToolCallAggregator,
    usage: Option<TokenUsage>,
    user_pushed: bool,
    tool_schemas: Vec<Value>,
}

enum Step {
    Event(Option<Result<ProviderEvent, ProviderError>>),
    Drained(Drain),
}

/// Build the `Executed: ...` user message for plain code results.
pub fn format_executed_message(language: Language, code: &str, output: &str) -> String {
    let tag = match language {
        Language::Python => "python",
        Language::Bash => "bash",
    };
    format!("Executed: <{tag}>{code}</{tag}>\n\nOutput:\n{output}\n")
}

pub struct AgentCoordinator {
    provider: Arc<dyn Provider>,
    store: Arc<Mutex<BlockStore>>,
    stream: StreamManager,
    exec: Arc<ExecutionCoordinator>,
    history: ConversationHistory,
    settings: AgentSettings,
    turn: Option<TurnState>,
    /// Tool calls awaiting execution, with their blocks.
    pending_calls: Vec<(ToolCall, BlockId)>,
    xml_call_counter: usize,
}

impl AgentCoordinator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<Mutex<BlockStore>>,
        exec: Arc<ExecutionCoordinator>,
        settings: AgentSettings,
        streaming_fps: u32,
    ) -> Self {
        let history = match &settings.system_prompt {
            Some(prompt) => ConversationHistory::with_system(prompt.clone()),
            None => ConversationHistory::new(),
        };
        let stream = StreamManager::new(Arc::clone(&store), streaming_fps);
        Self {
            provider,
            store,
            stream,
            exec,
            history,
            settings,
            turn: None,
            pending_calls: Vec::new(),
            xml_call_counter: 0,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn set_auto_send(&mut self, auto_send: bool) {
        self.settings.auto_send = auto_send;
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        self.history.has_pending_tool_calls()
    }

    /// Pending tool-call block ids in arrival order (the first is the one
    /// the UI highlights).
    pub fn pending_tool_blocks(&self) -> Vec<BlockId> {
        self.pending_calls.iter().map(|(_, id)| *id).collect()
    }

    /// Clear the conversation (user command). Blocks are not touched.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.pending_calls.clear();
        if let Some(prompt) = &self.settings.system_prompt {
            self.history = ConversationHistory::with_system(prompt.clone());
        }
    }

    /// Run one user turn: append the prompt, stream the response through
    /// the detector, and finish or pause.
    pub async fn handle_prompt(&mut self, prompt: &str) -> TurnOutcome {
        let full_prompt = match &self.settings.prompt_prefix {
            Some(prefix) if !prompt.trim().is_empty() => format!("{prefix}{prompt}"),
            _ => prompt.to_string(),
        };
        let user_pushed = self.history.push_user(&full_prompt);

        let tool_schemas = if self.settings.use_tools {
            let patterns: Vec<&str> = self
                .settings
                .tool_patterns
                .iter()
                .map(String::as_str)
                .collect();
            ToolRegistry::global().schemas_for(&patterns)
        } else {
            Vec::new()
        };

        let messages = self.build_messages();
        self.stream
            .create_detector(self.settings.auto_send, self.settings.pause_on_code);

        let mut provider_stream = match self.provider.stream(&messages, &tool_schemas).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_turn(user_pushed, &e),
        };

        let mut turn = TurnState {
            text: String::new(),
            thinking: String::new(),
            aggregator: ToolCallAggregator::new(),
            usage: None,
            user_pushed,
            tool_schemas,
        };

        loop {
            // Biased: consume provider events ahead of drains so the
            // accumulated turn text never trails the presentation layer.
            let step = tokio::select! {
                biased;
                event = provider_stream.next() => Step::Event(event),
                drain = self.stream.recv_drain() => Step::Drained(drain),
            };
            match step {
                Step::Event(Some(Ok(event))) => match event {
                    ProviderEvent::ContentDelta(text) => {
                        turn.text.push_str(&text);
                        self.stream.on_chunk(&text);
                    }
                    ProviderEvent::ReasoningDelta(text) => {
                        turn.thinking.push_str(&text);
                        self.stream.on_thinking_chunk(&text);
                    }
                    ProviderEvent::ToolCallDelta {
                        index,
                        id,
                        name,
                        arguments,
                    } => {
                        turn.aggregator.push(
                            index,
                            id.as_deref(),
                            name.as_deref(),
                            arguments.as_deref(),
                        );
                    }
                    ProviderEvent::Usage(usage) => turn.usage = Some(usage),
                },
                Step::Event(Some(Err(e))) => {
                    self.stream.finalize();
                    return self.fail_turn(user_pushed, &e);
                }
                Step::Event(None) => break,
                Step::Drained(Drain::Content(text)) => {
                    if self.stream.apply_content(&text) == DrainOutcome::Paused {
                        // Cancel the in-flight provider request by
                        // dropping the stream; the remainder replays on
                        // resume.
                        drop(provider_stream);
                        self.turn = Some(turn);
                        return self.paused_outcome();
                    }
                }
                Step::Drained(Drain::Thinking(text)) => self.stream.apply_thinking(&text),
                Step::Drained(Drain::Closed) => {}
            }
        }

        if self.stream.flush_pending() == DrainOutcome::Paused {
            self.turn = Some(turn);
            return self.paused_outcome();
        }
        self.stream.finish();
        self.finish_turn(turn)
    }

    /// Resume streaming after a pause (the run and skip arms both land
    /// here once any execution is done).
    pub fn resume_streaming(&mut self) -> TurnOutcome {
        self.stream.resume();
        if self.stream.is_paused() || self.stream.flush_pending() == DrainOutcome::Paused {
            return self.paused_outcome();
        }
        self.stream.finish();
        match self.turn.take() {
            Some(turn) => self.finish_turn(turn),
            None => TurnOutcome::Complete(AgentResponse::default()),
        }
    }

    /// Cancel at a pause: discard the remainder and finalise the turn
    /// with what streamed so far.
    pub fn cancel_paused_turn(&mut self) -> TurnOutcome {
        self.stream.discard_remainder();
        self.stream.finalize();
        match self.turn.take() {
            Some(turn) => self.finish_turn(turn),
            None => TurnOutcome::Complete(AgentResponse::default()),
        }
    }

    /// Finalise after the surrounding task was aborted: close partial
    /// blocks, roll back the user message, and append a cancel marker.
    pub fn finalize_cancelled(&mut self) {
        self.stream.finalize();
        if let Some(turn) = self.turn.take() {
            if turn.user_pushed {
                self.history.pop_last_user();
            }
        }
        let mut store = self.store.lock().expect("block store poisoned");
        store.push(
            BlockKind::CodeOutput {
                text: "[Cancelled]".to_string(),
                is_error: true,
            },
            false,
        );
    }

    /// Execute a pending tool-call block, feed the result back into the
    /// history, and report whether the conversation should continue
    /// automatically.
    pub async fn execute_tool_block(&mut self, block_id: BlockId) -> Result<bool, String> {
        let position = self
            .pending_calls
            .iter()
            .position(|(_, id)| *id == block_id)
            .ok_or_else(|| "not a pending tool call".to_string())?;
        let (call, _) = self.pending_calls[position].clone();

        let has_executor = ToolRegistry::global()
            .get(&call.name)
            .is_some_and(|def| def.executor.is_some());

        if has_executor {
            self.set_status(block_id, BlockStatus::Running);
            let outcome = ToolRegistry::global()
                .execute_tool_call(&call)
                .await
                .expect("executor checked above");
            let (content, is_error) = match outcome {
                Ok(output) => (output, false),
                Err(error) => (error, true),
            };
            if self.settings.show_tool_output && !content.is_empty() {
                let mut store = self.store.lock().expect("block store poisoned");
                store.push(
                    BlockKind::CodeOutput {
                        text: content.clone(),
                        is_error,
                    },
                    self.settings.auto_send,
                );
            }
            self.set_status(
                block_id,
                if is_error {
                    BlockStatus::Error
                } else {
                    BlockStatus::Success
                },
            );
            self.history.add_tool_result(&call.id, &content);
        } else {
            // Code tool: route through the REPL execution path, which
            // drives the block's status itself.
            let (result, _) = self
                .exec
                .execute(
                    &call.code(),
                    call.language(),
                    Some(block_id),
                    self.settings.auto_send,
                    None,
                )
                .await;
            self.history
                .add_tool_result(&call.id, result.combined_output());
        }

        self.pending_calls.remove(position);
        Ok(!self.history.has_pending_tool_calls() && self.settings.auto_send)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = Vec::new();
        let has_system = self
            .history
            .messages()
            .first()
            .is_some_and(|m| m.role == Role::System);
        if !has_system {
            if let Some(prompt) = &self.settings.system_prompt {
                messages.push(ChatMessage::system(prompt.clone()));
            }
        }
        messages.extend(self.history.messages().iter().cloned());
        messages
    }

    fn paused_outcome(&self) -> TurnOutcome {
        TurnOutcome::Paused {
            code: self.stream.last_completed_code().unwrap_or_default(),
            language: self
                .stream
                .last_code_block()
                .and_then(|id| {
                    self.store
                        .lock()
                        .expect("block store poisoned")
                        .get(id)
                        .and_then(|b| b.kind.language())
                })
                .unwrap_or(Language::Bash),
            block: self.stream.last_code_block(),
        }
    }

    fn fail_turn(&mut self, user_pushed: bool, error: &ProviderError) -> TurnOutcome {
        tracing::error!("provider error: {error}");
        if user_pushed {
            self.history.pop_last_user();
        }
        // Surface the failure on the first assistant block (created on
        // demand when nothing streamed yet).
        self.stream.apply_content("");
        if let Some(id) = self.stream.first_assistant_block() {
            let mut store = self.store.lock().expect("block store poisoned");
            let _ = store.append_text(id, &format!("\n[Error: {error}]"));
        }
        self.stream.finish();
        TurnOutcome::Complete(AgentResponse {
            error: Some(error.to_string()),
            ..AgentResponse::default()
        })
    }

    fn finish_turn(&mut self, turn: TurnState) -> TurnOutcome {
        let mut text = turn.text;
        let raw_calls: Vec<RawToolCall>;
        let calls: Vec<ToolCall>;

        if self.provider.xml_tool_calls() {
            let (prose, xml_calls) =
                minimax::parse_xml_tool_calls(&text, &turn.tool_schemas, self.xml_call_counter);
            self.xml_call_counter += xml_calls.len();
            if !xml_calls.is_empty() {
                text = prose;
            }
            raw_calls = xml_calls
                .iter()
                .map(|c| RawToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: Value::Object(c.args.clone()).to_string(),
                })
                .collect();
            calls = xml_calls;
        } else {
            raw_calls = turn.aggregator.raw_calls();
            calls = turn.aggregator.finish();
        }

        if !calls.is_empty() {
            for call in &calls {
                let block_id = self.materialize_tool_call(call);
                self.pending_calls.push((call.clone(), block_id));
            }
            self.history
                .push_assistant_with_tool_calls(&text, raw_calls);
        } else if !text.is_empty() {
            self.history.push_assistant(text.clone());
        }

        TurnOutcome::Complete(AgentResponse {
            text,
            thinking: (!turn.thinking.is_empty()).then_some(turn.thinking),
            tool_calls: calls,
            error: None,
            usage: turn.usage,
        })
    }

    fn materialize_tool_call(&self, call: &ToolCall) -> BlockId {
        let mut store = self.store.lock().expect("block store poisoned");
        store.push(
            BlockKind::ToolCall {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                args: call.args.clone(),
                code: call.display_text(),
                language: call.language(),
                status: BlockStatus::Pending,
            },
            self.settings.auto_send,
        )
    }

    fn set_status(&self, id: BlockId, status: BlockStatus) {
        let mut store = self.store.lock().expect("block store poisoned");
        if let Err(e) = store.set_status(id, status) {
            tracing::warn!("tool block status update failed: {e}");
        }
    }
}
