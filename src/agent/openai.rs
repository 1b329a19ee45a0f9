//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` SSE protocol, which most hosted and
//! local backends expose (OpenAI, Groq, Ollama, vLLM, ...). Reasoning
//! deltas are read from the `reasoning` / `reasoning_content` fields that
//! thinking-capable models attach to deltas.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::conversation::{ChatMessage, Role};
use super::provider::{EventStream, Provider, ProviderError, ProviderEvent, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Surface tool calls parsed from XML in content (MiniMax-style
    /// models that don't emit native tool-call deltas).
    pub xml_tool_calls: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            max_tokens: None,
            temperature: None,
            xml_tool_calls: false,
        }
    }
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    http_client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            http_client: Client::new(),
        }
    }

    fn build_request_body(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let messages: Vec<Value> = messages.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if !tools.is_empty() && !self.config.xml_tool_calls {
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

fn message_to_json(message: &ChatMessage) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut out = json!({"role": role});
    out["content"] = if message.content.is_empty() && message.tool_calls.is_some() {
        Value::Null
    } else {
        json!(message.content)
    };
    if let Some(calls) = &message.tool_calls {
        out["tool_calls"] = json!(calls
            .iter()
            .map(|c| json!({
                "id": c.id,
                "type": "function",
                "function": {"name": c.name, "arguments": c.arguments},
            }))
            .collect::<Vec<_>>());
    }
    if let Some(id) = &message.tool_call_id {
        out["tool_call_id"] = json!(id);
    }
    out
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn xml_tool_calls(&self) -> bool {
        self.config.xml_tool_calls
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
    ) -> Result<EventStream, ProviderError> {
        let body = self.build_request_body(messages, tools);
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error_response(status.as_u16(), &text));
        }

        let (tx, rx) = mpsc::channel::<Result<ProviderEvent, ProviderError>>(32);
        let byte_stream = response.bytes_stream();
        tokio::spawn(async move {
            parse_sse_stream(byte_stream, tx).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

async fn parse_sse_stream(
    mut byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
    tx: mpsc::Sender<Result<ProviderEvent, ProviderError>>,
) {
    let mut buffer = String::new();

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(ProviderError::Network(e.to_string()))).await;
                return;
            }
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer = buffer[pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }
            if let Some(data) = line.strip_prefix("data: ") {
                if data == "[DONE]" {
                    continue;
                }
                for event in parse_sse_data(data) {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Parse one SSE data payload into provider events.
fn parse_sse_data(data: &str) -> Vec<ProviderEvent> {
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return Vec::new();
    };
    let mut events = Vec::new();

    if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
        events.push(ProviderEvent::Usage(TokenUsage {
            input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
            total_tokens: usage["total_tokens"].as_u64().unwrap_or(0),
        }));
    }

    let Some(choices) = json["choices"].as_array() else {
        return events;
    };
    for choice in choices {
        let delta = &choice["delta"];

        // Thinking-capable backends use either field name.
        for key in ["reasoning", "reasoning_content"] {
            if let Some(text) = delta[key].as_str() {
                if !text.is_empty() {
                    events.push(ProviderEvent::ReasoningDelta(text.to_string()));
                }
            }
        }

        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                events.push(ProviderEvent::ContentDelta(text.to_string()));
            }
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tool_call in tool_calls {
                let index = tool_call["index"].as_u64().unwrap_or(0) as usize;
                let function = &tool_call["function"];
                events.push(ProviderEvent::ToolCallDelta {
                    index,
                    id: tool_call["id"].as_str().map(str::to_owned),
                    name: function["name"].as_str().map(str::to_owned),
                    arguments: function["arguments"].as_str().map(str::to_owned),
                });
            }
        }
    }
    events
}

fn parse_error_response(status: u16, body: &str) -> ProviderError {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let message = json["error"]["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let error_type = json["error"]["type"].as_str().unwrap_or("");
        let error_code = json["error"]["code"].as_str().unwrap_or("");

        return match (status, error_type, error_code) {
            (401, _, _) | (_, "invalid_api_key", _) | (_, _, "invalid_api_key") => {
                ProviderError::Auth(message)
            }
            (429, _, _) | (_, "rate_limit_error", _) => ProviderError::RateLimit(message),
            _ => ProviderError::Provider { status, message },
        };
    }
    ProviderError::Provider {
        status,
        message: body.to_string(),
    }
}
