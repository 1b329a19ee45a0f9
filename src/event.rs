use crate::agent::TurnOutcome;
use crate::blocks::BlockId;

/// Completion notifications from spawned tasks back to the main loop.
#[derive(Debug)]
pub enum TaskEvent {
    /// An agent turn finished or paused.
    Turn(TurnOutcome),
    /// A code execution finished.
    ExecDone {
        block: BlockId,
        success: bool,
        /// Auto-send payload, when the result goes back to the agent.
        followup: Option<String>,
    },
    /// A tool-call execution finished.
    ToolDone { continue_conversation: bool },
    /// A task failed outside of its own error handling.
    Failed(String),
}
