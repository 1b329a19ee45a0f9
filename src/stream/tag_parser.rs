//! XML-style tag parsing with liberal syntax support.

/// Maximum buffered length before a tag attempt is abandoned.
const MAX_TAG_LEN: usize = 50;

/// Normalise alternative tag names to canonical ones.
fn alias(name: &str) -> &str {
    match name {
        "py" | "code" => "python",
        "tool_call" | "bash" | "sh" | "cmd" => "shell",
        other => other,
    }
}

/// Result of feeding one character to the tag parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFeed {
    /// A complete tag matched one of the requested targets; the canonical
    /// form (e.g. `<python>`) is returned.
    Match(String),
    /// Still accumulating — no `>` seen yet.
    Buffering,
    /// Not a matching tag; caller should recover the text via
    /// [`TagParser::flush_to_text`].
    NoMatch,
}

/// Streaming recogniser for XML-style tags.
///
/// Accepts interior whitespace (`< shell >`), namespace prefixes
/// (`<minimax:tool_call>`), and alias names (`<sh>` for `<shell>`).
#[derive(Debug, Default)]
pub struct TagParser {
    buffer: String,
}

impl TagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if there's text in the tag buffer.
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Accumulate one character and check against `targets`.
    ///
    /// Gives up (NoMatch) on a second `<`, an interior newline, or an
    /// over-long buffer.
    pub fn feed_char(&mut self, ch: char, targets: &[&str]) -> TagFeed {
        self.buffer.push(ch);

        if ch == '>' {
            if let Some(canonical) = Self::normalize(&self.buffer) {
                if targets.contains(&canonical.as_str()) {
                    self.buffer.clear();
                    return TagFeed::Match(canonical);
                }
            }
            return TagFeed::NoMatch;
        }

        if ch == '<' && self.buffer.len() > 1 {
            // The earlier '<' wasn't a real tag. The caller flushes the old
            // text and keeps this '<' as a fresh attempt.
            return TagFeed::NoMatch;
        }

        if ch == '\n' || self.buffer.len() > MAX_TAG_LEN {
            return TagFeed::NoMatch;
        }

        TagFeed::Buffering
    }

    /// Normalise a raw tag like `< minimax:tool_call >` to `<shell>`.
    ///
    /// Strips outer angle brackets, whitespace, and namespace prefixes, and
    /// maps aliases. Returns None for anything that isn't tag-shaped.
    pub fn normalize(raw: &str) -> Option<String> {
        if raw.len() < 2 || !raw.starts_with('<') || !raw.ends_with('>') {
            return None;
        }

        let mut inner = raw[1..raw.len() - 1].trim();

        let is_closing = inner.starts_with('/');
        if is_closing {
            inner = inner[1..].trim();
        }

        if let Some((_, rest)) = inner.split_once(':') {
            inner = rest.trim();
        }

        if inner.is_empty() || !inner.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }

        let name = alias(inner);
        Some(if is_closing {
            format!("</{name}>")
        } else {
            format!("<{name}>")
        })
    }

    /// Return accumulated text that turned out not to be a tag.
    pub fn flush_to_text(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    /// Drop all but the trailing `<` from the buffer, returning the rest.
    ///
    /// Used when a second `<` arrives: the prefix becomes prose, the new
    /// `<` stays buffered as a fresh tag attempt.
    pub fn restart_at_angle(&mut self) -> String {
        let keep = self.buffer.pop();
        let text = std::mem::take(&mut self.buffer);
        if let Some(c) = keep {
            self.buffer.push(c);
        }
        text
    }
}
