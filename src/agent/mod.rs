//! Agent layer: conversation state, provider adapters, turn orchestration.

mod conversation;
mod coordinator;
mod minimax;
mod openai;
mod provider;
mod simulated;

pub use conversation::{ChatMessage, ConversationHistory, RawToolCall, Role};
pub use coordinator::{
    format_executed_message, AgentCoordinator, AgentResponse, AgentSettings, TurnOutcome,
};
pub use minimax::{is_minimax_model, parse_xml_tool_calls};
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{
    EventStream, Provider, ProviderError, ProviderEvent, TokenUsage, ToolCallAggregator,
};
pub use simulated::{SimulatedProvider, SimulatedTurn};
