// Block model - some accessors are test- and invariant-facing
#![allow(dead_code)]

//! Block model — the unit of rendered output.
//!
//! Every piece of terminal output is a block: user prompts, streamed
//! assistant prose, thinking, code awaiting execution, captured output,
//! tool calls. Blocks live in a [`BlockStore`] which hands out ids and
//! broadcasts updates; the UI observes the broadcast channel rather than
//! holding block references.

use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Code language for input blocks. Immutable after block creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Bash,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Bash => "bash",
        }
    }

    /// Map a fence language label to an execution language.
    ///
    /// Unknown labels default to python (best syntax-highlighting guess);
    /// an empty label means a plain shell fence.
    pub fn from_fence_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "bash" | "sh" | "shell" | "" => Language::Bash,
            _ => Language::Python,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status shown on code and tool-call blocks.
///
/// Transitions are one-way: Pending → Running → (Success | Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl BlockStatus {
    fn rank(self) -> u8 {
        match self {
            BlockStatus::Pending => 0,
            BlockStatus::Running => 1,
            BlockStatus::Success | BlockStatus::Error => 2,
        }
    }

    /// True if `next` is a legal forward transition from `self`.
    pub fn can_advance_to(self, next: BlockStatus) -> bool {
        next.rank() > self.rank()
    }
}

/// Unique block identifier, stable for the lifetime of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// The tagged block variants. A block's kind never changes.
#[derive(Debug, Clone)]
pub enum BlockKind {
    /// User prompt echoed into the transcript.
    AgentInput { text: String },
    /// Streamed assistant prose.
    AgentOutput { text: String, streaming: bool },
    /// Streamed assistant reasoning.
    ThinkingOutput { text: String, streaming: bool },
    /// Code the user can execute.
    CodeInput {
        code: String,
        language: Language,
        status: BlockStatus,
    },
    /// Captured stdout/stderr from an execution.
    CodeOutput { text: String, is_error: bool },
    /// A tool call requested by the model — a code input plus identity.
    ToolCall {
        call_id: String,
        tool_name: String,
        args: Map<String, Value>,
        code: String,
        language: Language,
        status: BlockStatus,
    },
    /// Informational message from the terminal itself.
    System { text: String },
}

impl BlockKind {
    pub fn text(&self) -> &str {
        match self {
            BlockKind::AgentInput { text }
            | BlockKind::AgentOutput { text, .. }
            | BlockKind::ThinkingOutput { text, .. }
            | BlockKind::CodeOutput { text, .. }
            | BlockKind::System { text } => text,
            BlockKind::CodeInput { code, .. } | BlockKind::ToolCall { code, .. } => code,
        }
    }

    pub fn status(&self) -> Option<BlockStatus> {
        match self {
            BlockKind::CodeInput { status, .. } | BlockKind::ToolCall { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn language(&self) -> Option<Language> {
        match self {
            BlockKind::CodeInput { language, .. } | BlockKind::ToolCall { language, .. } => {
                Some(*language)
            }
            _ => None,
        }
    }
}

/// A block plus its store bookkeeping.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    /// Whether this block is part of the conversation the assistant sees.
    pub in_context: bool,
}

impl Block {
    pub fn text(&self) -> &str {
        self.kind.text()
    }

    pub fn status(&self) -> Option<BlockStatus> {
        self.kind.status()
    }

    pub fn is_streaming(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::AgentOutput { streaming: true, .. }
                | BlockKind::ThinkingOutput { streaming: true, .. }
        )
    }
}

/// Store change notifications for observers (the UI layer).
#[derive(Debug, Clone)]
pub enum BlockUpdate {
    Added(BlockId),
    Appended(BlockId),
    StatusChanged(BlockId, BlockStatus),
    Finalized(BlockId),
    Removed(BlockId),
    Cleared,
    ContextCleared,
}

/// Errors from illegal block mutations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlockError {
    #[error("Block not found: {0:?}")]
    NotFound(BlockId),

    #[error("Block {0:?} does not carry a status")]
    NoStatus(BlockId),

    #[error("Illegal status transition {from:?} -> {to:?} on {id:?}")]
    BackwardStatus {
        id: BlockId,
        from: BlockStatus,
        to: BlockStatus,
    },

    #[error("Block {0:?} text is finalised")]
    Finalised(BlockId),
}

/// Ordered collection of blocks with broadcast change notifications.
pub struct BlockStore {
    blocks: Vec<Block>,
    next_id: u64,
    updates: broadcast::Sender<BlockUpdate>,
}

impl BlockStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            blocks: Vec::new(),
            next_id: 0,
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BlockUpdate> {
        self.updates.subscribe()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Block> {
        self.blocks.iter()
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Append a new block, returning its id.
    pub fn push(&mut self, kind: BlockKind, in_context: bool) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.blocks.push(Block {
            id,
            kind,
            in_context,
        });
        let _ = self.updates.send(BlockUpdate::Added(id));
        id
    }

    /// Grow a block's text buffer. Only valid while the block streams.
    pub fn append_text(&mut self, id: BlockId, text: &str) -> Result<(), BlockError> {
        let block = self.get_mut(id)?;
        match &mut block.kind {
            BlockKind::AgentOutput {
                text: buf,
                streaming,
            }
            | BlockKind::ThinkingOutput {
                text: buf,
                streaming,
            } => {
                if !*streaming {
                    return Err(BlockError::Finalised(id));
                }
                buf.push_str(text);
            }
            BlockKind::CodeInput { code, .. } | BlockKind::ToolCall { code, .. } => {
                code.push_str(text);
            }
            BlockKind::CodeOutput { text: buf, .. } => buf.push_str(text),
            BlockKind::AgentInput { text: buf } | BlockKind::System { text: buf } => {
                buf.push_str(text)
            }
        }
        let _ = self.updates.send(BlockUpdate::Appended(id));
        Ok(())
    }

    /// Advance a code/tool block's status. Backward transitions are errors.
    pub fn set_status(&mut self, id: BlockId, status: BlockStatus) -> Result<(), BlockError> {
        let block = self.get_mut(id)?;
        let current = block.kind.status().ok_or(BlockError::NoStatus(id))?;
        if !current.can_advance_to(status) {
            return Err(BlockError::BackwardStatus {
                id,
                from: current,
                to: status,
            });
        }
        match &mut block.kind {
            BlockKind::CodeInput { status: s, .. } | BlockKind::ToolCall { status: s, .. } => {
                *s = status
            }
            _ => unreachable!(),
        }
        let _ = self.updates.send(BlockUpdate::StatusChanged(id, status));
        Ok(())
    }

    /// Stop a prose/thinking block from streaming; its text is now final.
    pub fn finalize_streaming(&mut self, id: BlockId) -> Result<(), BlockError> {
        let block = self.get_mut(id)?;
        if let BlockKind::AgentOutput { streaming, .. }
        | BlockKind::ThinkingOutput { streaming, .. } = &mut block.kind
        {
            *streaming = false;
        }
        let _ = self.updates.send(BlockUpdate::Finalized(id));
        Ok(())
    }

    pub fn remove(&mut self, id: BlockId) -> Result<(), BlockError> {
        let idx = self
            .blocks
            .iter()
            .position(|b| b.id == id)
            .ok_or(BlockError::NotFound(id))?;
        self.blocks.remove(idx);
        let _ = self.updates.send(BlockUpdate::Removed(id));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        let _ = self.updates.send(BlockUpdate::Cleared);
    }

    /// Strip the context flag from every block. Visual only — the
    /// authoritative conversation lives in the history.
    pub fn clear_context(&mut self) {
        for block in &mut self.blocks {
            block.in_context = false;
        }
        let _ = self.updates.send(BlockUpdate::ContextCleared);
    }

    fn get_mut(&mut self, id: BlockId) -> Result<&mut Block, BlockError> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(BlockError::NotFound(id))
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_block(store: &mut BlockStore) -> BlockId {
        store.push(
            BlockKind::CodeInput {
                code: "print(1)".into(),
                language: Language::Python,
                status: BlockStatus::Pending,
            },
            true,
        )
    }

    #[test]
    fn test_status_monotonic() {
        let mut store = BlockStore::new();
        let id = code_block(&mut store);

        store.set_status(id, BlockStatus::Running).unwrap();
        store.set_status(id, BlockStatus::Success).unwrap();
        // success -> running is backward
        let err = store.set_status(id, BlockStatus::Running).unwrap_err();
        assert!(matches!(err, BlockError::BackwardStatus { .. }));
    }

    #[test]
    fn test_pending_straight_to_error_allowed() {
        let mut store = BlockStore::new();
        let id = code_block(&mut store);
        store.set_status(id, BlockStatus::Error).unwrap();
        assert_eq!(store.get(id).unwrap().status(), Some(BlockStatus::Error));
    }

    #[test]
    fn test_append_after_finalize_fails() {
        let mut store = BlockStore::new();
        let id = store.push(
            BlockKind::AgentOutput {
                text: String::new(),
                streaming: true,
            },
            true,
        );
        store.append_text(id, "hello").unwrap();
        store.finalize_streaming(id).unwrap();
        assert!(matches!(
            store.append_text(id, "more"),
            Err(BlockError::Finalised(_))
        ));
        assert_eq!(store.get(id).unwrap().text(), "hello");
    }

    #[test]
    fn test_context_membership() {
        let mut store = BlockStore::new();
        let a = code_block(&mut store);
        let b = store.push(BlockKind::System { text: "hi".into() }, false);
        assert!(store.get(a).unwrap().in_context);
        assert!(!store.get(b).unwrap().in_context);

        store.clear_context();
        assert!(!store.get(a).unwrap().in_context);
    }

    #[test]
    fn test_updates_broadcast() {
        let mut store = BlockStore::new();
        let mut rx = store.subscribe();
        let id = code_block(&mut store);
        store.set_status(id, BlockStatus::Running).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), BlockUpdate::Added(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            BlockUpdate::StatusChanged(_, BlockStatus::Running)
        ));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = BlockStore::new();
        let a = code_block(&mut store);
        let _b = code_block(&mut store);
        store.remove(a).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(a).is_none());
        store.clear();
        assert!(store.is_empty());
    }
}
