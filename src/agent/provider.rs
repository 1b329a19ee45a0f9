//! Provider adapter — the seam between the coordinator and any LLM
//! backend.
//!
//! A provider is a black box that turns a message list into an async
//! stream of typed events: content deltas, reasoning deltas, tool-call
//! deltas (partials, concatenated by index), and usage. Everything
//! provider-specific (wire format, auth, SSE framing) stays behind this
//! trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use super::conversation::{ChatMessage, RawToolCall};
use crate::tools::{ToolArgs, ToolCall};

/// Token accounting reported at stream end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// One typed event from the provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    ContentDelta(String),
    ReasoningDelta(String),
    /// Partial tool call; fragments with the same index are concatenated.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    Usage(TokenUsage),
}

/// Provider-side failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimit(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },
}

/// Boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProviderEvent, ProviderError>> + Send>>;

/// Unified streaming LLM interface.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logs and transcripts.
    fn name(&self) -> &str;

    /// Model identifier in use.
    fn model(&self) -> &str;

    /// Open a streaming completion over `messages` with `tools` exposed
    /// in function-call schema form.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<EventStream, ProviderError>;

    /// True for models that emit tool calls as XML inside the content
    /// text rather than native tool-call deltas (MiniMax-style). The
    /// coordinator runs the XML extractor over the final text when set.
    fn xml_tool_calls(&self) -> bool {
        false
    }
}

/// Accumulates tool-call deltas by index into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    partial: Vec<RawToolCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta in. Fragments concatenate field-wise.
    pub fn push(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        while self.partial.len() <= index {
            self.partial.push(RawToolCall {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
        }
        let call = &mut self.partial[index];
        if let Some(id) = id {
            call.id.push_str(id);
        }
        if let Some(name) = name {
            call.name.push_str(name);
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
    }

    /// The raw calls as they'll be recorded on the assistant message.
    pub fn raw_calls(&self) -> Vec<RawToolCall> {
        self.partial.clone()
    }

    /// Parse the accumulated calls. Malformed JSON arguments degrade to
    /// an empty mapping with a warning — the call is still surfaced so
    /// the user can inspect it.
    pub fn finish(self) -> Vec<ToolCall> {
        self.partial
            .into_iter()
            .map(|raw| {
                let args: ToolArgs = match serde_json::from_str(&raw.arguments) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) | Err(_) => {
                        tracing::warn!(
                            "malformed tool-call arguments for {}: {:?}",
                            raw.name,
                            raw.arguments
                        );
                        ToolArgs::new()
                    }
                };
                ToolCall::new(raw.id, raw.name, args)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates_fragments_by_index() {
        let mut agg = ToolCallAggregator::new();
        agg.push(0, Some("call_"), Some("re"), Some("{\"pa"));
        agg.push(0, Some("1"), Some("ad"), Some("th\":\"/x\"}"));
        let calls = agg.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "read");
        assert_eq!(
            calls[0].args.get("path").and_then(|v| v.as_str()),
            Some("/x")
        );
    }

    #[test]
    fn test_interleaved_indices() {
        let mut agg = ToolCallAggregator::new();
        agg.push(1, Some("b"), Some("shell"), Some("{}"));
        agg.push(0, Some("a"), Some("python"), Some("{}"));
        let calls = agg.finish();
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[1].id, "b");
    }

    #[test]
    fn test_malformed_arguments_become_empty_map() {
        let mut agg = ToolCallAggregator::new();
        agg.push(0, Some("x"), Some("read"), Some("{not json"));
        let calls = agg.finish();
        assert_eq!(calls[0].args.len(), 0);
        assert_eq!(calls[0].name, "read");
    }

    #[test]
    fn test_non_object_arguments_become_empty_map() {
        let mut agg = ToolCallAggregator::new();
        agg.push(0, Some("x"), Some("read"), Some("[1,2]"));
        assert_eq!(agg.finish()[0].args.len(), 0);
    }
}
