//! Streaming fence detector — turns a character stream into block events.
//!
//! A single-threaded state machine over PROSE / CODE / THINKING. Markdown
//! fences (``` at start of line) and XML-style tags (`<python>`, `<shell>`,
//! `<think>`, `<detail>`) open and close blocks; blank lines split prose and
//! thinking into paragraph blocks. The detector owns no block objects: it
//! emits [`StreamEvent`]s in character-arrival order and the stream manager
//! applies them to the block store.

use super::backtick_tracker::BacktickTracker;
use super::string_tracker::StringTracker;
use super::tag_parser::{TagFeed, TagParser};
use crate::blocks::Language;

const PROSE_TAG_TARGETS: &[&str] = &["<think>", "<detail>", "<python>", "<shell>"];

/// Block lifecycle event emitted by the detector.
///
/// `Append` always applies to the most recently opened block; `Close`
/// closes it. `Close { discard: true }` means the block ended empty and
/// should be dropped rather than finalised.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    OpenProse,
    OpenThinking,
    OpenCode { language: Language },
    Append(String),
    Close { discard: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Prose,
    Code,
    Thinking,
}

/// Detects code fences and tags in streaming text, splitting it into
/// blocks in real time.
///
/// `PROSE -> CODE` on `<python>` / `<shell>` / ```` ```lang ````,
/// `PROSE -> THINKING` on `<think>` / `<detail>`, and back on the matching
/// close. With `pause_after_code` set, processing stops each time a code
/// block closes so the caller can offer execution; [`resume`] replays the
/// saved remainder.
///
/// [`resume`]: StreamingFenceDetector::resume
pub struct StreamingFenceDetector {
    state: FenceState,
    started: bool,
    pause_after_code: bool,
    paused: bool,
    remainder: String,

    /// Text accumulated for the current block, emitted as one Append per
    /// feed call.
    pending: String,
    /// Current line in PROSE/THINKING for blank-line detection.
    current_line: String,
    /// True while everything sent to the current block is whitespace.
    current_blank: bool,

    code_close_tag: String,
    thinking_close_tag: String,

    in_markdown_fence: bool,
    detecting_fence_open: bool,
    fence_lang_buf: String,
    fence_backticks: usize,
    fence_close_backticks: usize,
    /// True when the current code line contains only whitespace so far.
    code_line_blank: bool,
    /// A newline held back in fenced code: if the closing fence follows, it
    /// belongs to the fence line, not the code text.
    held_newline: bool,

    strip_leading_ws: bool,

    current_code_text: String,
    last_completed_code: Option<String>,

    tag_parser: TagParser,
    backticks: BacktickTracker,
    strings: StringTracker,
}

impl StreamingFenceDetector {
    pub fn new(pause_after_code: bool) -> Self {
        Self {
            state: FenceState::Prose,
            started: false,
            pause_after_code,
            paused: false,
            remainder: String::new(),
            pending: String::new(),
            current_line: String::new(),
            current_blank: true,
            code_close_tag: "</shell>".to_string(),
            thinking_close_tag: "</think>".to_string(),
            in_markdown_fence: false,
            detecting_fence_open: false,
            fence_lang_buf: String::new(),
            fence_backticks: 0,
            fence_close_backticks: 0,
            code_line_blank: true,
            held_newline: false,
            strip_leading_ws: false,
            current_code_text: String::new(),
            last_completed_code: None,
            tag_parser: TagParser::new(),
            backticks: BacktickTracker::new(),
            strings: StringTracker::new(),
        }
    }

    /// True if processing paused after a code block closed.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Text of the most recently completed code block.
    pub fn last_completed_code(&self) -> Option<&str> {
        self.last_completed_code.as_deref()
    }

    /// Open the initial prose block. Idempotent.
    pub fn start(&mut self) -> Vec<StreamEvent> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        self.current_blank = true;
        vec![StreamEvent::OpenProse]
    }

    /// Process a chunk of streaming text.
    ///
    /// If `pause_after_code` is on and a code block closes mid-chunk,
    /// processing stops there; the unconsumed suffix (truncated at the
    /// next newline, discarding trailing text on the closing-fence line)
    /// is kept for [`resume`].
    ///
    /// [`resume`]: StreamingFenceDetector::resume
    pub fn feed(&mut self, text: &str) -> Vec<StreamEvent> {
        if self.paused {
            // Fed while paused (forced flush): keep the text with the
            // remainder rather than dropping it.
            self.remainder.push_str(text);
            return Vec::new();
        }
        let mut events = self.start();

        for (i, ch) in text.char_indices() {
            self.feed_char(ch, &mut events);
            if self.paused {
                let raw = &text[i + ch.len_utf8()..];
                self.remainder = match raw.find('\n') {
                    Some(pos) => raw[pos + 1..].to_string(),
                    None => String::new(),
                };
                break;
            }
        }

        self.flush_pending(&mut events);
        events
    }

    /// Resume after a pause, replaying any saved remainder.
    pub fn resume(&mut self) -> Vec<StreamEvent> {
        self.paused = false;
        let remainder = std::mem::take(&mut self.remainder);
        if remainder.is_empty() {
            Vec::new()
        } else {
            self.feed(&remainder)
        }
    }

    /// Drop the saved remainder and lift the pause without processing it.
    pub fn discard_remainder(&mut self) {
        self.paused = false;
        self.remainder.clear();
    }

    /// Flush remaining state at end of stream and close the open block.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self.start();

        // A newline held back for fence detection is real content when the
        // stream ends without the closing fence.
        self.release_held_newline();

        // An incomplete tag attempt is plain text after all.
        if self.tag_parser.has_buffered() {
            let text = self.tag_parser.flush_to_text();
            if self.state == FenceState::Code {
                self.current_code_text.push_str(&text);
            }
            self.pending.push_str(&text);
        }

        self.flush_pending(&mut events);
        // Never discard here: the consumer sweeps empty prose blocks and
        // decides whether the first assistant block survives.
        events.push(StreamEvent::Close { discard: false });

        if self.state == FenceState::Code {
            self.last_completed_code = Some(std::mem::take(&mut self.current_code_text));
        }

        events
    }

    fn feed_char(&mut self, ch: char, events: &mut Vec<StreamEvent>) {
        match self.state {
            FenceState::Prose => self.feed_prose(ch, events),
            FenceState::Code => self.feed_code(ch, events),
            FenceState::Thinking => self.feed_thinking(ch, events),
        }
    }

    // ── PROSE ────────────────────────────────────────────────────────────

    fn feed_prose(&mut self, ch: char, events: &mut Vec<StreamEvent>) {
        // Swallow the whitespace run after a closing tag or fence.
        if self.strip_leading_ws {
            if ch.is_whitespace() {
                return;
            }
            self.strip_leading_ws = false;
        }

        if self.detecting_fence_open {
            if ch == '\n' {
                let language = Language::from_fence_label(self.fence_lang_buf.trim());
                self.fence_lang_buf.clear();
                self.detecting_fence_open = false;
                self.open_code_block(language, true, events);
            } else {
                self.fence_lang_buf.push(ch);
            }
            return;
        }

        // Count backticks toward a possible fence before anything else.
        if ch == '`' {
            self.fence_backticks += 1;
            if self.fence_backticks == 3 {
                self.detecting_fence_open = true;
            }
            return;
        } else if self.fence_backticks > 0 {
            // Short run: ordinary backticks after all.
            for _ in 0..self.fence_backticks {
                self.backticks.feed('`');
                self.pending.push('`');
            }
            self.current_blank = false;
            self.current_line.push_str(&"`".repeat(self.fence_backticks));
            self.fence_backticks = 0;
        }

        self.backticks.feed(ch);

        // Tag detection is suppressed inside inline code spans.
        if !self.backticks.in_span() && (self.tag_parser.has_buffered() || ch == '<') {
            match self.check_tags(ch, PROSE_TAG_TARGETS) {
                Some(tag) => match tag.as_str() {
                    "<think>" | "<detail>" => {
                        self.thinking_close_tag = if tag == "<think>" {
                            "</think>".to_string()
                        } else {
                            "</detail>".to_string()
                        };
                        self.flush_pending(events);
                        events.push(StreamEvent::Close { discard: false });
                        events.push(StreamEvent::OpenThinking);
                        self.current_line.clear();
                        self.current_blank = true;
                        self.state = FenceState::Thinking;
                    }
                    "<python>" | "<shell>" => {
                        let language = if tag == "<python>" {
                            Language::Python
                        } else {
                            Language::Bash
                        };
                        self.code_close_tag = if language == Language::Python {
                            "</python>".to_string()
                        } else {
                            "</shell>".to_string()
                        };
                        self.open_code_block(language, false, events);
                    }
                    _ => {}
                },
                None => {}
            }
            return;
        }

        if ch == '\n' {
            self.pending.push('\n');
            if self.current_line.trim().is_empty() {
                // Blank line: split into a new paragraph block.
                self.flush_pending(events);
                events.push(StreamEvent::Close { discard: false });
                events.push(StreamEvent::OpenProse);
                self.current_blank = true;
            }
            self.current_line.clear();
        } else {
            self.pending.push(ch);
            self.current_line.push(ch);
            if !ch.is_whitespace() {
                self.current_blank = false;
            }
        }
    }

    /// Close the current prose block (discarding it when empty) and open a
    /// code block.
    fn open_code_block(
        &mut self,
        language: Language,
        markdown_fence: bool,
        events: &mut Vec<StreamEvent>,
    ) {
        self.flush_pending(events);
        events.push(StreamEvent::Close {
            discard: self.current_blank,
        });
        events.push(StreamEvent::OpenCode { language });

        self.in_markdown_fence = markdown_fence;
        self.pending.clear();
        self.current_line.clear();
        self.current_blank = true;
        self.code_line_blank = true;
        self.current_code_text.clear();
        self.strings.reset();
        self.state = FenceState::Code;
    }

    // ── CODE ─────────────────────────────────────────────────────────────

    fn feed_code(&mut self, ch: char, events: &mut Vec<StreamEvent>) {
        if self.in_markdown_fence {
            self.strings.track(ch);

            if ch == '`' && !self.strings.in_string() && self.code_line_blank {
                self.fence_close_backticks += 1;
                if self.fence_close_backticks == 3 {
                    self.fence_close_backticks = 0;
                    self.close_code_block(true, events);
                }
                return;
            }

            if self.fence_close_backticks > 0 {
                // Backticks at line start interrupted: they're code content.
                self.release_held_newline();
                let run = "`".repeat(self.fence_close_backticks);
                self.pending.push_str(&run);
                self.current_code_text.push_str(&run);
                self.fence_close_backticks = 0;
                self.code_line_blank = false;
            }

            self.push_code_char(ch);
            return;
        }

        // Tag-delimited code: only the matching close tag ends it.
        if self.tag_parser.has_buffered() || ch == '<' {
            let close_tag = self.code_close_tag.clone();
            if let Some(tag) = self.check_tags(ch, &[close_tag.as_str()]) {
                debug_assert_eq!(tag, close_tag);
                self.close_code_block(false, events);
            }
            return;
        }

        self.push_code_char(ch);
    }

    fn push_code_char(&mut self, ch: char) {
        if ch == '\n' && self.in_markdown_fence {
            // Hold the newline: if a closing fence follows it belongs to
            // the fence line and is dropped from the code text.
            self.release_held_newline();
            self.held_newline = true;
            self.code_line_blank = true;
            return;
        }
        self.release_held_newline();
        self.pending.push(ch);
        self.current_code_text.push(ch);
        if ch == '\n' {
            self.code_line_blank = true;
        } else if !ch.is_whitespace() {
            self.code_line_blank = false;
        }
    }

    fn release_held_newline(&mut self) {
        if self.held_newline {
            self.held_newline = false;
            self.pending.push('\n');
            self.current_code_text.push('\n');
        }
    }

    fn close_code_block(&mut self, markdown_fence: bool, events: &mut Vec<StreamEvent>) {
        if markdown_fence {
            // The newline preceding the closing fence is not code content.
            self.held_newline = false;
        }

        self.flush_pending(events);
        events.push(StreamEvent::Close { discard: false });
        events.push(StreamEvent::OpenProse);

        self.last_completed_code = Some(std::mem::take(&mut self.current_code_text));
        self.in_markdown_fence = false;
        self.current_line.clear();
        self.current_blank = true;
        self.strip_leading_ws = true;
        self.state = FenceState::Prose;

        if self.pause_after_code {
            self.paused = true;
        }
    }

    // ── THINKING ─────────────────────────────────────────────────────────

    fn feed_thinking(&mut self, ch: char, events: &mut Vec<StreamEvent>) {
        if self.tag_parser.has_buffered() || ch == '<' {
            let close_tag = self.thinking_close_tag.clone();
            if self.check_tags(ch, &[close_tag.as_str()]).is_some() {
                self.flush_pending(events);
                events.push(StreamEvent::Close { discard: false });
                events.push(StreamEvent::OpenProse);
                self.current_line.clear();
                self.current_blank = true;
                self.strip_leading_ws = true;
                self.state = FenceState::Prose;
            }
            return;
        }

        if ch == '\n' {
            self.pending.push('\n');
            // Split on blank lines, but never create a leading empty block.
            if self.current_line.trim().is_empty() && !self.current_blank {
                self.flush_pending(events);
                events.push(StreamEvent::Close { discard: false });
                events.push(StreamEvent::OpenThinking);
                self.current_blank = true;
            }
            self.current_line.clear();
        } else {
            self.pending.push(ch);
            self.current_line.push(ch);
            if !ch.is_whitespace() {
                self.current_blank = false;
            }
        }
    }

    // ── Shared plumbing ──────────────────────────────────────────────────

    /// Run the tag parser over one character, recovering buffered text
    /// into `pending` when the attempt fails.
    fn check_tags(&mut self, ch: char, targets: &[&str]) -> Option<String> {
        match self.tag_parser.feed_char(ch, targets) {
            TagFeed::Match(tag) => Some(tag),
            TagFeed::Buffering => None,
            TagFeed::NoMatch => {
                let text = if ch == '<' {
                    self.tag_parser.restart_at_angle()
                } else {
                    self.tag_parser.flush_to_text()
                };
                if !text.trim().is_empty() {
                    self.current_blank = false;
                }
                // Note: the prose line buffer deliberately ignores flushed
                // tag text; blank-line detection only sees literal prose.
                if self.state == FenceState::Code {
                    self.current_code_text.push_str(&text);
                }
                self.pending.push_str(&text);
                None
            }
        }
    }

    fn flush_pending(&mut self, events: &mut Vec<StreamEvent>) {
        if self.pending.is_empty() {
            return;
        }
        if !self.pending.trim().is_empty() {
            self.current_blank = false;
        }
        events.push(StreamEvent::Append(std::mem::take(&mut self.pending)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Replay detector events into (kind, text) block tuples.
    #[derive(Debug, Clone, PartialEq)]
    enum Kind {
        Prose,
        Thinking,
        Code(Language),
    }

    #[derive(Default)]
    struct Collector {
        blocks: Vec<(Kind, String)>,
        discarded: Vec<(Kind, String)>,
        open: Option<(Kind, String)>,
    }

    impl Collector {
        fn apply(&mut self, events: Vec<StreamEvent>) {
            for ev in events {
                match ev {
                    StreamEvent::OpenProse => {
                        self.open = Some((Kind::Prose, String::new()));
                    }
                    StreamEvent::OpenThinking => {
                        self.open = Some((Kind::Thinking, String::new()));
                    }
                    StreamEvent::OpenCode { language } => {
                        self.open = Some((Kind::Code(language), String::new()));
                    }
                    StreamEvent::Append(text) => {
                        self.open.as_mut().expect("append without open").1.push_str(&text);
                    }
                    StreamEvent::Close { discard } => {
                        let block = self.open.take().expect("close without open");
                        if discard {
                            self.discarded.push(block);
                        } else {
                            self.blocks.push(block);
                        }
                    }
                }
            }
        }

        /// Finished blocks with whitespace-only prose dropped, mirroring
        /// the stream manager's final sweep.
        fn swept(&self) -> Vec<(Kind, String)> {
            self.blocks
                .iter()
                .filter(|(kind, text)| !(matches!(kind, Kind::Prose | Kind::Thinking) && text.trim().is_empty()))
                .cloned()
                .collect()
        }
    }

    fn run(text: &str) -> Collector {
        run_chunked(&[text])
    }

    fn run_chunked(chunks: &[&str]) -> Collector {
        let mut det = StreamingFenceDetector::new(false);
        let mut col = Collector::default();
        for chunk in chunks {
            col.apply(det.feed(chunk));
        }
        col.apply(det.finish());
        col
    }

    #[test]
    fn test_plain_prose_single_block() {
        let col = run("Hello there.");
        assert_eq!(col.swept(), vec![(Kind::Prose, "Hello there.".to_string())]);
    }

    #[test]
    fn test_markdown_fence_splits_blocks() {
        let col = run("Here's code:\n\n```python\nprint(\"hi\")\n```\nDone.");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Prose, "Here's code:\n\n".to_string()),
                (Kind::Code(Language::Python), "print(\"hi\")".to_string()),
                (Kind::Prose, "Done.".to_string()),
            ]
        );
    }

    #[test]
    fn test_fence_language_mapping() {
        for (label, lang) in [
            ("bash", Language::Bash),
            ("sh", Language::Bash),
            ("shell", Language::Bash),
            ("", Language::Bash),
            ("python", Language::Python),
            ("py", Language::Python),
            ("rust", Language::Python),
        ] {
            let col = run(&format!("```{label}\nx\n```\n"));
            let codes: Vec<_> = col
                .blocks
                .iter()
                .filter_map(|(k, _)| match k {
                    Kind::Code(l) => Some(*l),
                    _ => None,
                })
                .collect();
            assert_eq!(codes, vec![lang], "label {label:?}");
        }
    }

    #[test]
    fn test_triple_backtick_inside_string_does_not_close() {
        let col = run("```python\nx = \"```\"\nprint(x)\n```\n");
        assert_eq!(
            col.swept(),
            vec![(
                Kind::Code(Language::Python),
                "x = \"```\"\nprint(x)".to_string()
            )]
        );
    }

    #[test]
    fn test_triple_quote_string_does_not_close_fence() {
        let code = "s = \"\"\"\n```\nnot a fence\n\"\"\"\ny = 1";
        let col = run(&format!("```python\n{code}\n```\n"));
        assert_eq!(col.swept(), vec![(Kind::Code(Language::Python), code.to_string())]);
    }

    #[test]
    fn test_backticks_mid_line_are_code_content() {
        let col = run("```bash\necho ```\n```\n");
        assert_eq!(
            col.swept(),
            vec![(Kind::Code(Language::Bash), "echo ```".to_string())]
        );
    }

    #[test]
    fn test_xml_code_tags() {
        let col = run("Run this: <shell>ls -la</shell> then stop.");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Prose, "Run this: ".to_string()),
                (Kind::Code(Language::Bash), "ls -la".to_string()),
                (Kind::Prose, "then stop.".to_string()),
            ]
        );
    }

    #[test]
    fn test_python_tag_with_alias_close() {
        let col = run("<python>x = 1</python>after");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Code(Language::Python), "x = 1".to_string()),
                (Kind::Prose, "after".to_string()),
            ]
        );
    }

    #[test]
    fn test_thinking_then_prose() {
        let col = run("<think>reasoning</think>Answer.");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Thinking, "reasoning".to_string()),
                (Kind::Prose, "Answer.".to_string()),
            ]
        );
    }

    #[test]
    fn test_detail_tag_opens_thinking() {
        let col = run("<detail>hidden</detail>visible");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Thinking, "hidden".to_string()),
                (Kind::Prose, "visible".to_string()),
            ]
        );
    }

    #[test]
    fn test_fence_inside_think_never_opens_code() {
        let col = run("<think>look:\n```python\nx\n```\ndone</think>ok");
        let has_code = col.blocks.iter().any(|(k, _)| matches!(k, Kind::Code(_)));
        assert!(!has_code);
        assert_eq!(col.swept().last().unwrap().1, "ok");
    }

    #[test]
    fn test_tag_inside_backtick_span_is_prose() {
        let col = run("Use `<python>` to open code.");
        assert_eq!(
            col.swept(),
            vec![(Kind::Prose, "Use `<python>` to open code.".to_string())]
        );
    }

    #[test]
    fn test_blank_line_splits_prose_paragraphs() {
        let col = run("First paragraph.\n\nSecond paragraph.");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Prose, "First paragraph.\n\n".to_string()),
                (Kind::Prose, "Second paragraph.".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_line_splits_thinking() {
        let col = run("<think>one\n\ntwo</think>");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Thinking, "one\n\n".to_string()),
                (Kind::Thinking, "two".to_string()),
            ]
        );
    }

    #[test]
    fn test_partial_tag_across_chunk_boundary() {
        let col = run_chunked(&["before <pyt", "hon>code()</python>"]);
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Prose, "before ".to_string()),
                (Kind::Code(Language::Python), "code()".to_string()),
            ]
        );
    }

    #[test]
    fn test_partial_fence_across_chunk_boundary() {
        let col = run_chunked(&["``", "`python\nx = 1\n`", "``\n"]);
        assert_eq!(
            col.swept(),
            vec![(Kind::Code(Language::Python), "x = 1".to_string())]
        );
    }

    #[test]
    fn test_incomplete_tag_flushed_as_text_at_finish() {
        let col = run("trailing <pyth");
        assert_eq!(col.swept(), vec![(Kind::Prose, "trailing <pyth".to_string())]);
    }

    #[test]
    fn test_false_tag_recovered_as_text() {
        let col = run("a < b and c > d");
        assert_eq!(col.swept(), vec![(Kind::Prose, "a < b and c > d".to_string())]);
    }

    #[test]
    fn test_stream_reassembly_chunked_arbitrarily() {
        let text = "Intro.\n\n```python\nprint('x')\n```\nOutro with `span`.";
        let whole = run(text).swept();
        for size in [1usize, 2, 3, 7] {
            let chunks: Vec<String> = text
                .chars()
                .collect::<Vec<_>>()
                .chunks(size)
                .map(|c| c.iter().collect())
                .collect();
            let refs: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
            assert_eq!(run_chunked(&refs).swept(), whole, "chunk size {size}");
        }
    }

    #[test]
    fn test_empty_prose_before_code_is_discarded() {
        let col = run("```bash\nls\n```\n");
        assert_eq!(col.discarded.len(), 1);
        assert_eq!(col.discarded[0].0, Kind::Prose);
        assert_eq!(col.swept(), vec![(Kind::Code(Language::Bash), "ls".to_string())]);
    }

    #[test]
    fn test_pause_and_resume_round_trip() {
        let text = "Say:\n```bash\necho hi\n```\nAnd then more text.";
        let unpaused = run(text).swept();

        let mut det = StreamingFenceDetector::new(true);
        let mut col = Collector::default();
        col.apply(det.feed(text));
        assert!(det.is_paused());
        assert_eq!(det.last_completed_code(), Some("echo hi"));
        while det.is_paused() {
            col.apply(det.resume());
        }
        col.apply(det.finish());

        assert_eq!(col.swept(), unpaused);
    }

    #[test]
    fn test_pause_remainder_truncated_at_newline() {
        // Trailing junk on the closing-fence line is discarded.
        let mut det = StreamingFenceDetector::new(true);
        let mut col = Collector::default();
        col.apply(det.feed("```bash\nls\n``` junk here\nkept"));
        assert!(det.is_paused());
        col.apply(det.resume());
        col.apply(det.finish());
        let prose: String = col
            .swept()
            .iter()
            .filter(|(k, _)| *k == Kind::Prose)
            .map(|(_, t)| t.clone())
            .collect();
        assert!(prose.contains("kept"));
        assert!(!prose.contains("junk"));
    }

    #[test]
    fn test_last_completed_code_for_tag_block() {
        let mut det = StreamingFenceDetector::new(false);
        let mut col = Collector::default();
        col.apply(det.feed("<shell>pwd</shell>"));
        assert_eq!(det.last_completed_code(), Some("pwd"));
        col.apply(det.finish());
    }

    #[test]
    fn test_whitespace_stripped_after_close_tag() {
        let col = run("<shell>ls</shell>\n\nNext.");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Code(Language::Bash), "ls".to_string()),
                (Kind::Prose, "Next.".to_string()),
            ]
        );
    }

    #[test]
    fn test_indented_closing_fence_counts() {
        let col = run("```python\nx = 1\n  ```\nafter");
        assert_eq!(
            col.swept(),
            vec![
                (Kind::Code(Language::Python), "x = 1\n  ".to_string()),
                (Kind::Prose, "after".to_string()),
            ]
        );
    }
}
