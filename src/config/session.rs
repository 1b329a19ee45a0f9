//! Session transcripts — append-only markdown, one file per session.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::blocks::{Block, BlockKind};

/// Writes the running session to a markdown file as blocks finalise.
pub struct SessionWriter {
    path: PathBuf,
    file: std::fs::File,
}

impl SessionWriter {
    /// Create the session file with its header. The filename carries the
    /// start timestamp.
    pub fn create(
        dir: &Path,
        agent_name: &str,
        provider: &str,
        system_prompt: Option<&str>,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let started = Local::now();
        let path = dir.join(format!("session-{}.md", started.format("%Y%m%d-%H%M%S")));
        let mut file = std::fs::File::create(&path)?;

        writeln!(file, "# Artifice Session")?;
        writeln!(file)?;
        writeln!(file, "- Started: {}", started.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(file, "- Agent: {agent_name}")?;
        writeln!(file, "- Provider: {provider}")?;
        if let Some(prompt) = system_prompt {
            writeln!(file, "- System prompt: {prompt}")?;
        }
        writeln!(file)?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one finalised block.
    pub fn write_block(&mut self, block: &Block) -> std::io::Result<()> {
        match &block.kind {
            BlockKind::AgentInput { text } => {
                writeln!(self.file, "## User\n\n{text}\n")?;
            }
            BlockKind::AgentOutput { text, .. } => {
                if !text.trim().is_empty() {
                    writeln!(self.file, "## Assistant\n\n{text}\n")?;
                }
            }
            BlockKind::ThinkingOutput { text, .. } => {
                writeln!(
                    self.file,
                    "<details>\n<summary>Thinking</summary>\n\n{text}\n\n</details>\n"
                )?;
            }
            BlockKind::CodeInput {
                code, language, ..
            } => {
                writeln!(self.file, "### Code\n\n```{language}\n{code}\n```\n")?;
            }
            BlockKind::ToolCall {
                tool_name, code, ..
            } => {
                writeln!(
                    self.file,
                    "### Tool: {tool_name}\n\n```\n{code}\n```\n"
                )?;
            }
            BlockKind::CodeOutput { text, .. } => {
                writeln!(self.file, "### Output\n\n```\n{text}\n```\n")?;
            }
            BlockKind::System { text } => {
                writeln!(self.file, "> {text}\n")?;
            }
        }
        self.file.flush()
    }

    /// Footer written on graceful exit.
    pub fn finish(&mut self) -> std::io::Result<()> {
        writeln!(
            self.file,
            "---\n\nEnded: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockId, BlockStatus, Language};
    use tempfile::TempDir;

    fn block(kind: BlockKind) -> Block {
        Block {
            id: BlockId(0),
            kind,
            in_context: true,
        }
    }

    #[test]
    fn test_transcript_sections() {
        let dir = TempDir::new().unwrap();
        let mut writer =
            SessionWriter::create(dir.path(), "main", "openai", Some("be brief")).unwrap();

        writer
            .write_block(&block(BlockKind::AgentInput {
                text: "run ls".into(),
            }))
            .unwrap();
        writer
            .write_block(&block(BlockKind::CodeInput {
                code: "ls".into(),
                language: Language::Bash,
                status: BlockStatus::Success,
            }))
            .unwrap();
        writer
            .write_block(&block(BlockKind::CodeOutput {
                text: "file.txt\n".into(),
                is_error: false,
            }))
            .unwrap();
        writer
            .write_block(&block(BlockKind::ThinkingOutput {
                text: "considering".into(),
                streaming: false,
            }))
            .unwrap();
        writer.finish().unwrap();

        let text = std::fs::read_to_string(writer.path()).unwrap();
        assert!(text.starts_with("# Artifice Session"));
        assert!(text.contains("- Agent: main"));
        assert!(text.contains("- System prompt: be brief"));
        assert!(text.contains("## User\n\nrun ls"));
        assert!(text.contains("### Code\n\n```bash\nls\n```"));
        assert!(text.contains("### Output\n\n```\nfile.txt\n```"));
        assert!(text.contains("<summary>Thinking</summary>"));
        assert!(text.contains("Ended:"));
    }

    #[test]
    fn test_empty_prose_skipped() {
        let dir = TempDir::new().unwrap();
        let mut writer = SessionWriter::create(dir.path(), "a", "p", None).unwrap();
        writer
            .write_block(&block(BlockKind::AgentOutput {
                text: "  \n".into(),
                streaming: false,
            }))
            .unwrap();
        let text = std::fs::read_to_string(writer.path()).unwrap();
        assert!(!text.contains("## Assistant"));
    }
}
