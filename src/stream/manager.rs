//! Stream manager — multiplexes content and thinking channels.
//!
//! Owns the two rate-limited chunk buffers and the active fence detector
//! for an assistant turn, and applies detector events to the block store.
//! The agent coordinator is the single consumer task: it pushes provider
//! deltas in via [`StreamManager::on_chunk`] / [`on_thinking_chunk`] and
//! pulls drained batches with [`recv_drain`], so all parsing and block
//! mutation happens on one task.
//!
//! [`on_thinking_chunk`]: StreamManager::on_thinking_chunk
//! [`recv_drain`]: StreamManager::recv_drain

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::chunk_buffer::ChunkBuffer;
use super::detector::{StreamEvent, StreamingFenceDetector};
use crate::blocks::{BlockId, BlockKind, BlockStore};

/// A drained batch from one of the two channels.
#[derive(Debug)]
pub enum Drain {
    Content(String),
    Thinking(String),
    /// Both channels closed — nothing further will arrive.
    Closed,
}

/// Result of applying a content drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Continue,
    /// The detector paused after a closed code block; the content buffer
    /// has been paused too. The coordinator owns what happens next.
    Paused,
}

/// Applies detector events to the block store, tracking the blocks this
/// turn created.
struct EventApplier {
    store: Arc<Mutex<BlockStore>>,
    in_context: bool,
    current: Option<BlockId>,
    first_prose: Option<BlockId>,
    created: Vec<BlockId>,
    last_code_block: Option<BlockId>,
}

impl EventApplier {
    fn apply(&mut self, events: Vec<StreamEvent>) {
        let mut store = self.store.lock().expect("block store poisoned");
        for event in events {
            match event {
                StreamEvent::OpenProse => {
                    let id = store.push(
                        BlockKind::AgentOutput {
                            text: String::new(),
                            streaming: true,
                        },
                        self.in_context,
                    );
                    if self.first_prose.is_none() && self.created.is_empty() {
                        self.first_prose = Some(id);
                    }
                    self.created.push(id);
                    self.current = Some(id);
                }
                StreamEvent::OpenThinking => {
                    let id = store.push(
                        BlockKind::ThinkingOutput {
                            text: String::new(),
                            streaming: true,
                        },
                        self.in_context,
                    );
                    self.created.push(id);
                    self.current = Some(id);
                }
                StreamEvent::OpenCode { language } => {
                    let id = store.push(
                        BlockKind::CodeInput {
                            code: String::new(),
                            language,
                            status: crate::blocks::BlockStatus::Pending,
                        },
                        self.in_context,
                    );
                    self.created.push(id);
                    self.current = Some(id);
                }
                StreamEvent::Append(text) => {
                    if let Some(id) = self.current {
                        if let Err(e) = store.append_text(id, &text) {
                            tracing::warn!("stream append failed: {e}");
                        }
                    }
                }
                StreamEvent::Close { discard } => {
                    let Some(id) = self.current.take() else {
                        continue;
                    };
                    if discard {
                        if self.first_prose == Some(id) {
                            self.first_prose = None;
                        }
                        self.created.retain(|&b| b != id);
                        let _ = store.remove(id);
                    } else {
                        let block = store.get(id);
                        let is_code = matches!(
                            block.map(|b| &b.kind),
                            Some(BlockKind::CodeInput { .. })
                        );
                        if is_code {
                            self.last_code_block = Some(id);
                        } else {
                            let _ = store.finalize_streaming(id);
                        }
                    }
                }
            }
        }
    }

    /// Remove finished prose blocks that ended up whitespace-only, keeping
    /// the first assistant block as the turn's status indicator.
    fn sweep_empty_prose(&mut self) {
        let mut store = self.store.lock().expect("block store poisoned");
        let empties: Vec<BlockId> = self
            .created
            .iter()
            .copied()
            .filter(|&id| {
                if self.first_prose == Some(id) {
                    return false;
                }
                match store.get(id) {
                    Some(block) => {
                        matches!(block.kind, BlockKind::AgentOutput { .. })
                            && block.text().trim().is_empty()
                    }
                    None => false,
                }
            })
            .collect();
        for id in empties {
            self.created.retain(|&b| b != id);
            let _ = store.remove(id);
        }
    }
}

/// Streaming state for one assistant turn.
pub struct StreamManager {
    store: Arc<Mutex<BlockStore>>,
    fps: u32,
    content_buf: ChunkBuffer,
    content_rx: mpsc::UnboundedReceiver<String>,
    thinking_buf: ChunkBuffer,
    thinking_rx: mpsc::UnboundedReceiver<String>,
    detector: Option<StreamingFenceDetector>,
    applier: Option<EventApplier>,
    thinking_block: Option<BlockId>,
    paused: bool,
}

impl StreamManager {
    pub fn new(store: Arc<Mutex<BlockStore>>, fps: u32) -> Self {
        let (content_buf, content_rx) = ChunkBuffer::new(fps);
        let (thinking_buf, thinking_rx) = ChunkBuffer::new(fps);
        Self {
            store,
            fps,
            content_buf,
            content_rx,
            thinking_buf,
            thinking_rx,
            detector: None,
            applier: None,
            thinking_block: None,
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Id of the most recently completed code block this turn.
    pub fn last_code_block(&self) -> Option<BlockId> {
        self.applier.as_ref().and_then(|a| a.last_code_block)
    }

    /// Text of the most recently completed code block this turn.
    pub fn last_completed_code(&self) -> Option<String> {
        self.detector
            .as_ref()
            .and_then(|d| d.last_completed_code().map(str::to_owned))
    }

    /// Install a fresh detector for a new assistant response.
    ///
    /// `in_context` marks every block the turn creates; `pause_after_code`
    /// enables the pause-on-code-block protocol.
    pub fn create_detector(&mut self, in_context: bool, pause_after_code: bool) {
        let (content_buf, content_rx) = ChunkBuffer::new(self.fps);
        let (thinking_buf, thinking_rx) = ChunkBuffer::new(self.fps);
        self.content_buf = content_buf;
        self.content_rx = content_rx;
        self.thinking_buf = thinking_buf;
        self.thinking_rx = thinking_rx;
        self.detector = Some(StreamingFenceDetector::new(pause_after_code));
        self.applier = Some(EventApplier {
            store: Arc::clone(&self.store),
            in_context,
            current: None,
            first_prose: None,
            created: Vec::new(),
            last_code_block: None,
        });
        self.thinking_block = None;
        self.paused = false;
    }

    /// Forward a provider content delta into the rate-limited buffer.
    pub fn on_chunk(&self, text: &str) {
        self.content_buf.append(text);
    }

    /// Forward a provider reasoning delta into the thinking buffer.
    pub fn on_thinking_chunk(&self, text: &str) {
        self.thinking_buf.append(text);
    }

    /// Await the next drained batch from either channel.
    pub async fn recv_drain(&mut self) -> Drain {
        tokio::select! {
            batch = self.content_rx.recv() => match batch {
                Some(text) => Drain::Content(text),
                None => Drain::Closed,
            },
            batch = self.thinking_rx.recv() => match batch {
                Some(text) => Drain::Thinking(text),
                None => Drain::Closed,
            },
        }
    }

    /// Feed a drained content batch through the detector.
    pub fn apply_content(&mut self, text: &str) -> DrainOutcome {
        let Some(detector) = self.detector.as_mut() else {
            return DrainOutcome::Continue;
        };
        let events = detector.feed(text);
        if let Some(applier) = self.applier.as_mut() {
            applier.apply(events);
        }
        if detector.is_paused() {
            self.paused = true;
            self.content_buf.pause();
            DrainOutcome::Paused
        } else {
            DrainOutcome::Continue
        }
    }

    /// Append a drained thinking batch, creating the thinking block lazily
    /// so empty reasoning never shows.
    pub fn apply_thinking(&mut self, text: &str) {
        let mut store = self.store.lock().expect("block store poisoned");
        let id = match self.thinking_block {
            Some(id) => id,
            None => {
                let in_context = self.applier.as_ref().map(|a| a.in_context).unwrap_or(false);
                let id = store.push(
                    BlockKind::ThinkingOutput {
                        text: String::new(),
                        streaming: true,
                    },
                    in_context,
                );
                self.thinking_block = Some(id);
                id
            }
        };
        if let Err(e) = store.append_text(id, text) {
            tracing::warn!("thinking append failed: {e}");
        }
    }

    /// Resume after a pause-on-code-block: replay the detector remainder,
    /// then un-pause the content buffer so accumulated text drains.
    ///
    /// The replayed remainder may itself close another code block, in
    /// which case the manager pauses again and the buffer stays held.
    pub fn resume(&mut self) {
        self.paused = false;
        let events = self.detector.as_mut().map(|d| d.resume());
        if let (Some(events), Some(applier)) = (events, self.applier.as_mut()) {
            applier.apply(events);
        }
        if self.detector.as_ref().is_some_and(|d| d.is_paused()) {
            self.paused = true;
            return;
        }
        self.content_buf.resume();
    }

    /// Drop the saved remainder and buffered content without processing
    /// it (the cancel arm of the pause protocol).
    pub fn discard_remainder(&mut self) {
        self.paused = false;
        if let Some(detector) = self.detector.as_mut() {
            detector.discard_remainder();
        }
        self.content_buf.discard();
        while self.content_rx.try_recv().is_ok() {}
    }

    /// Flush both buffers synchronously and run every queued batch
    /// through the pipeline. Stops early (returning `Paused`) if the
    /// detector pauses; the rest stays queued for the next resume.
    pub fn flush_pending(&mut self) -> DrainOutcome {
        self.thinking_buf.flush_sync();
        self.content_buf.flush_sync();

        while let Ok(text) = self.thinking_rx.try_recv() {
            self.apply_thinking(&text);
        }
        while let Ok(text) = self.content_rx.try_recv() {
            if self.apply_content(&text) == DrainOutcome::Paused {
                return DrainOutcome::Paused;
            }
        }
        if self.paused {
            DrainOutcome::Paused
        } else {
            DrainOutcome::Continue
        }
    }

    /// Close the thinking block, run the detector to completion, and
    /// sweep empty prose blocks.
    pub fn finish(&mut self) {
        if let Some(id) = self.thinking_block.take() {
            let mut store = self.store.lock().expect("block store poisoned");
            let _ = store.finalize_streaming(id);
        }

        if let Some(mut detector) = self.detector.take() {
            let events = detector.finish();
            if let Some(applier) = self.applier.as_mut() {
                applier.apply(events);
                applier.sweep_empty_prose();
            }
            // Keep the detector around for last_completed_code queries.
            self.detector = Some(detector);
        }
    }

    /// Force-finalise everything that has arrived, pause or no pause
    /// (the cancellation path).
    pub fn finalize(&mut self) {
        let _ = self.flush_pending();
        self.finish();
    }

    /// The first assistant prose block of the turn, if it survived.
    pub fn first_assistant_block(&self) -> Option<BlockId> {
        self.applier.as_ref().and_then(|a| a.first_prose)
    }
}
