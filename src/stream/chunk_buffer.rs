//! Frame-rate-limited chunk accumulation.
//!
//! Provider chunks can arrive far faster than the terminal can usefully
//! repaint. The [`ChunkBuffer`] absorbs them with an O(1) append and drains
//! the accumulated text to its consumer at most once per frame interval.
//! Drained batches are delivered in FIFO order over a channel owned by the
//! consumer task; no text is ever dropped, only coalesced.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

struct Shared {
    buffer: String,
    scheduled: bool,
    paused: bool,
    last_drain: Option<Instant>,
    min_interval: Duration,
}

/// Accumulates text chunks and drains them in rate-limited batches.
///
/// `append` never blocks; at most one drain is scheduled at a time. While
/// paused, appends keep accumulating but drains are deferred; `resume`
/// drains immediately if anything is buffered. `flush_sync` bypasses the
/// scheduler entirely (used at stream finalisation).
#[derive(Clone)]
pub struct ChunkBuffer {
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::UnboundedSender<String>,
}

impl ChunkBuffer {
    /// Create a buffer draining at most `fps` times per second. Returns the
    /// receiver the consumer task reads drained batches from.
    pub fn new(fps: u32) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fps = fps.max(1);
        let buffer = Self {
            shared: Arc::new(Mutex::new(Shared {
                buffer: String::new(),
                scheduled: false,
                paused: false,
                last_drain: None,
                min_interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            })),
            tx,
        };
        (buffer, rx)
    }

    /// Add text to the buffer and schedule a drain if none is pending.
    pub fn append(&self, text: &str) {
        let delay = {
            let mut shared = self.shared.lock().expect("chunk buffer poisoned");
            shared.buffer.push_str(text);
            if shared.scheduled {
                return;
            }
            shared.scheduled = true;

            match shared.last_drain {
                Some(last) => {
                    let elapsed = last.elapsed();
                    if elapsed >= shared.min_interval {
                        Duration::ZERO
                    } else {
                        shared.min_interval - elapsed
                    }
                }
                None => Duration::ZERO,
            }
        };

        if delay.is_zero() {
            self.flush();
        } else {
            let this = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.flush();
            });
        }
    }

    /// Defer drains; appends keep accumulating.
    pub fn pause(&self) {
        self.shared.lock().expect("chunk buffer poisoned").paused = true;
    }

    /// Lift a pause and drain immediately if non-empty.
    pub fn resume(&self) {
        {
            let mut shared = self.shared.lock().expect("chunk buffer poisoned");
            shared.paused = false;
            if shared.buffer.is_empty() {
                return;
            }
        }
        self.flush_sync();
    }

    /// Drain any buffered text right now, bypassing the rate limit.
    pub fn flush_sync(&self) {
        let mut shared = self.shared.lock().expect("chunk buffer poisoned");
        shared.scheduled = false;
        if shared.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut shared.buffer);
        shared.last_drain = Some(Instant::now());
        let _ = self.tx.send(text);
    }

    /// Throw away buffered text without draining it.
    pub fn discard(&self) {
        let mut shared = self.shared.lock().expect("chunk buffer poisoned");
        shared.paused = false;
        shared.buffer.clear();
    }

    fn flush(&self) {
        let mut shared = self.shared.lock().expect("chunk buffer poisoned");
        shared.scheduled = false;
        if shared.paused || shared.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut shared.buffer);
        shared.last_drain = Some(Instant::now());
        let _ = self.tx.send(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain_all(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        let mut out = String::new();
        while let Ok(batch) = rx.try_recv() {
            out.push_str(&batch);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_append_drains_immediately() {
        let (buf, mut rx) = ChunkBuffer::new(30);
        buf.append("hello");
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_appends_coalesce() {
        let (buf, mut rx) = ChunkBuffer::new(30);
        buf.append("a");
        // Within the frame interval: these accumulate into one batch.
        buf.append("b");
        buf.append("c");

        assert_eq!(rx.recv().await.unwrap(), "a");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.recv().await.unwrap(), "bc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_preservation() {
        let (buf, mut rx) = ChunkBuffer::new(60);
        let chunks = ["one ", "two ", "three ", "four"];
        for (i, c) in chunks.iter().enumerate() {
            buf.append(c);
            if i % 2 == 1 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        buf.flush_sync();
        tokio::time::sleep(Duration::from_millis(100)).await;
        buf.flush_sync();

        let drained = drain_all(&mut rx).await;
        assert_eq!(drained, chunks.concat());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_defers_resume_drains() {
        let (buf, mut rx) = ChunkBuffer::new(30);
        buf.append("first");
        assert_eq!(rx.recv().await.unwrap(), "first");

        buf.pause();
        buf.append("while paused");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        buf.resume();
        assert_eq!(rx.recv().await.unwrap(), "while paused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_sync_bypasses_scheduler() {
        let (buf, mut rx) = ChunkBuffer::new(1);
        buf.append("x");
        assert_eq!(rx.recv().await.unwrap(), "x");
        buf.append("y");
        // A 1 fps buffer would wait a second; flush_sync doesn't.
        buf.flush_sync();
        assert_eq!(rx.try_recv().unwrap(), "y");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_resume_sends_nothing() {
        let (buf, mut rx) = ChunkBuffer::new(30);
        buf.pause();
        buf.resume();
        assert!(rx.try_recv().is_err());
    }
}
