// Conversation state - the well-formedness check is invariant-facing
#![allow(dead_code)]

//! Conversation history — the messages the assistant actually sees.
//!
//! An append-only list of role-tagged messages in the provider wire shape:
//! assistant messages may carry tool calls, tool messages answer them by
//! id. The history is the authoritative context; block context flags are
//! only its visual shadow.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call as carried on an assistant message: arguments stay a
/// JSON-encoded string until execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<RawToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Ordered, append-only conversation history with tool-call pairing.
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
    /// Ids of assistant tool calls without a tool result yet.
    pending: Vec<String>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the history with a system message.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut history = Self::new();
        history.messages.push(ChatMessage::system(prompt));
        history
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a user message. Empty or whitespace-only input never
    /// mutates the history.
    pub fn push_user(&mut self, content: &str) -> bool {
        if content.trim().is_empty() {
            return false;
        }
        self.messages.push(ChatMessage::user(content));
        true
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Append an assistant message that declared tool calls; they become
    /// pending until each receives a tool result.
    pub fn push_assistant_with_tool_calls(&mut self, content: &str, calls: Vec<RawToolCall>) {
        self.pending.extend(calls.iter().map(|c| c.id.clone()));
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: Some(calls),
            tool_call_id: None,
        });
    }

    /// Record a tool result, resolving the matching pending call.
    pub fn add_tool_result(&mut self, tool_call_id: &str, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        });
        self.pending.retain(|id| id != tool_call_id);
    }

    pub fn has_pending_tool_calls(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Roll back the trailing user message (provider failure path).
    pub fn pop_last_user(&mut self) {
        if matches!(self.messages.last(), Some(m) if m.role == Role::User) {
            self.messages.pop();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending.clear();
    }

    /// Check the tool-call pairing invariant: every id declared by an
    /// assistant message has a matching tool result before the next
    /// assistant turn.
    pub fn is_well_formed(&self) -> bool {
        let mut open: Vec<&str> = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    if !open.is_empty() {
                        return false;
                    }
                    if let Some(calls) = &message.tool_calls {
                        open.extend(calls.iter().map(|c| c.id.as_str()));
                    }
                }
                Role::Tool => {
                    let Some(id) = message.tool_call_id.as_deref() else {
                        return false;
                    };
                    let Some(pos) = open.iter().position(|open_id| *open_id == id) else {
                        return false;
                    };
                    open.remove(pos);
                }
                Role::System | Role::User => {}
            }
        }
        open.is_empty() || self.has_pending_tool_calls()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> RawToolCall {
        RawToolCall {
            id: id.to_string(),
            name: "read".to_string(),
            arguments: r#"{"path":"/x"}"#.to_string(),
        }
    }

    #[test]
    fn test_empty_prompt_does_not_mutate() {
        let mut history = ConversationHistory::new();
        assert!(!history.push_user(""));
        assert!(!history.push_user("   \n\t"));
        assert!(history.is_empty());

        assert!(history.push_user("hello"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let mut history = ConversationHistory::new();
        history.push_user("read /x");
        history.push_assistant_with_tool_calls("", vec![call("call_1")]);
        assert!(history.has_pending_tool_calls());

        history.add_tool_result("call_1", "file contents");
        assert!(!history.has_pending_tool_calls());
        assert!(history.is_well_formed());

        let tool_msg = history.messages().last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.content, "file contents");
    }

    #[test]
    fn test_multiple_pending_calls() {
        let mut history = ConversationHistory::new();
        history.push_assistant_with_tool_calls("", vec![call("a"), call("b")]);
        history.add_tool_result("a", "one");
        assert!(history.has_pending_tool_calls());
        history.add_tool_result("b", "two");
        assert!(!history.has_pending_tool_calls());
    }

    #[test]
    fn test_unmatched_tool_result_is_ill_formed() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.add_tool_result("ghost", "output");
        assert!(!history.is_well_formed());
    }

    #[test]
    fn test_assistant_turn_with_open_calls_is_ill_formed() {
        let mut history = ConversationHistory::new();
        history.push_assistant_with_tool_calls("", vec![call("a")]);
        // Forged: a second assistant turn arrives with "a" still open.
        history.pending.clear();
        history.push_assistant("next turn");
        assert!(!history.is_well_formed());
    }

    #[test]
    fn test_pop_last_user_only_pops_user() {
        let mut history = ConversationHistory::new();
        history.push_user("hi");
        history.push_assistant("yo");
        history.pop_last_user();
        assert_eq!(history.len(), 2);

        history.push_user("again");
        history.pop_last_user();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_seeded_system_message() {
        let history = ConversationHistory::with_system("be helpful");
        assert_eq!(history.messages()[0].role, Role::System);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut history = ConversationHistory::new();
        history.push_assistant_with_tool_calls("", vec![call("a")]);
        history.clear();
        assert!(history.is_empty());
        assert!(!history.has_pending_tool_calls());
    }
}
