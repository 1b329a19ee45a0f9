// Simulated provider - turn builders are test- and demo-facing
#![allow(dead_code)]

//! Simulated provider — scripted responses for tests and offline demos.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::conversation::ChatMessage;
use super::provider::{EventStream, Provider, ProviderError, ProviderEvent, TokenUsage};

/// One scripted assistant turn.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTurn {
    pub thinking: Option<String>,
    pub text: String,
    /// (id, name, json-encoded arguments)
    pub tool_calls: Vec<(String, String, String)>,
}

impl SimulatedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }

    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        self.tool_calls
            .push((id.into(), name.into(), arguments.into()));
        self
    }
}

/// Replays scripted turns, splitting text into small deltas to exercise
/// the chunk-boundary paths downstream.
pub struct SimulatedProvider {
    turns: Mutex<Vec<SimulatedTurn>>,
    chunk_size: usize,
}

impl SimulatedProvider {
    pub fn new(turns: Vec<SimulatedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            chunk_size: 7,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

fn chunks_of(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    fn model(&self) -> &str {
        "simulated"
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _tools: &[Value],
    ) -> Result<EventStream, ProviderError> {
        let turn = {
            let mut turns = self.turns.lock().expect("simulated turns poisoned");
            if turns.is_empty() {
                return Err(ProviderError::Network("no scripted turns left".to_string()));
            }
            turns.remove(0)
        };

        let chunk_size = self.chunk_size;
        let (tx, rx) = mpsc::channel::<Result<ProviderEvent, ProviderError>>(32);

        tokio::spawn(async move {
            if let Some(thinking) = &turn.thinking {
                for chunk in chunks_of(thinking, chunk_size) {
                    if tx
                        .send(Ok(ProviderEvent::ReasoningDelta(chunk)))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            for chunk in chunks_of(&turn.text, chunk_size) {
                if tx.send(Ok(ProviderEvent::ContentDelta(chunk))).await.is_err() {
                    return;
                }
            }
            for (index, (id, name, arguments)) in turn.tool_calls.iter().enumerate() {
                // Identity first, then arguments — the shape real
                // backends stream.
                let first = ProviderEvent::ToolCallDelta {
                    index,
                    id: Some(id.clone()),
                    name: Some(name.clone()),
                    arguments: None,
                };
                if tx.send(Ok(first)).await.is_err() {
                    return;
                }
                for chunk in chunks_of(arguments, chunk_size) {
                    let delta = ProviderEvent::ToolCallDelta {
                        index,
                        id: None,
                        name: None,
                        arguments: Some(chunk),
                    };
                    if tx.send(Ok(delta)).await.is_err() {
                        return;
                    }
                }
            }
            let _ = tx
                .send(Ok(ProviderEvent::Usage(TokenUsage {
                    input_tokens: 1,
                    output_tokens: 1,
                    total_tokens: 2,
                })))
                .await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_replays_text_in_chunks() {
        let provider =
            SimulatedProvider::new(vec![SimulatedTurn::text("hello world")]).with_chunk_size(4);
        let mut stream = provider.stream(&[], &[]).await.unwrap();

        let mut text = String::new();
        while let Some(Ok(event)) = stream.next().await {
            if let ProviderEvent::ContentDelta(chunk) = event {
                text.push_str(&chunk);
            }
        }
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let provider = SimulatedProvider::new(vec![]);
        assert!(provider.stream(&[], &[]).await.is_err());
    }
}
