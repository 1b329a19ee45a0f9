// Tool registry - display helpers are consumed by the UI layer as needed
#![allow(dead_code)]

//! Tool registry — capabilities the assistant can request.
//!
//! Tools with a direct executor (read, write, glob, grep, replace,
//! web_fetch, web_search) run as soon as the user confirms them. The
//! `python` and `shell` tools have no executor: their code routes through
//! the REPL execution path instead.

mod executors;
mod web;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::blocks::Language;

/// JSON object carrying a tool call's arguments.
pub type ToolArgs = Map<String, Value>;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: ToolArgs,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// The code/command string for python/shell calls.
    pub fn code(&self) -> String {
        self.arg_str("code")
            .or_else(|| self.arg_str("command"))
            .unwrap_or_default()
    }

    /// Execution language for python/shell calls.
    pub fn language(&self) -> Language {
        if self.name == "shell" {
            Language::Bash
        } else {
            Language::Python
        }
    }

    /// The primary argument shown in the UI (code, path, query, ...).
    pub fn display_text(&self) -> String {
        match ToolRegistry::global().get(&self.name) {
            Some(def) => match self.args.get(def.display_arg) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(self.args.clone()).to_string(),
            },
            None => Value::Object(self.args.clone()).to_string(),
        }
    }

    /// Syntax highlighting hint for the displayed argument.
    pub fn display_language(&self) -> &'static str {
        ToolRegistry::global()
            .get(&self.name)
            .map(|def| def.display_language)
            .unwrap_or("text")
    }

    fn arg_str(&self, key: &str) -> Option<String> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Directly executable tool behaviour.
///
/// Failures are returned as human-readable strings — they become the tool
/// result the assistant sees, never a crash.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn run(&self, args: &ToolArgs) -> Result<String, String>;
}

/// Self-contained definition of a tool available to the agent.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON-schema parameter block in function-call format.
    pub parameters: Value,
    pub display_arg: &'static str,
    pub display_language: &'static str,
    pub executor: Option<Arc<dyn ToolExecutor>>,
}

impl ToolDef {
    /// Serialise to provider-facing function-call format.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Process-global tool registry, built once at startup and immutable
/// thereafter.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

static REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

impl ToolRegistry {
    pub fn global() -> &'static ToolRegistry {
        REGISTRY.get_or_init(ToolRegistry::with_builtins)
    }

    fn with_builtins() -> Self {
        let web = Arc::new(web::WebClient::new());
        let tools = vec![
            ToolDef {
                name: "python",
                description: "Execute Python code in the user's REPL session.",
                parameters: params(json!({"code": {"type": "string"}}), &["code"]),
                display_arg: "code",
                display_language: "python",
                executor: None,
            },
            ToolDef {
                name: "shell",
                description: "Execute a shell command in the user's terminal session.",
                parameters: params(json!({"command": {"type": "string"}}), &["command"]),
                display_arg: "command",
                display_language: "bash",
                executor: None,
            },
            ToolDef {
                name: "read",
                description: "Read the contents of a file.",
                parameters: params(
                    json!({
                        "path": {"type": "string", "description": "Absolute or relative file path."},
                        "offset": {"type": "integer", "description": "Line number to start reading from (0-based)."},
                        "limit": {"type": "integer", "description": "Maximum number of lines to read."},
                    }),
                    &["path"],
                ),
                display_arg: "path",
                display_language: "text",
                executor: Some(Arc::new(executors::ReadTool)),
            },
            ToolDef {
                name: "write",
                description: "Write or create a file with the given content.",
                parameters: params(
                    json!({
                        "path": {"type": "string", "description": "Absolute or relative file path."},
                        "content": {"type": "string", "description": "Content to write to the file."},
                    }),
                    &["path", "content"],
                ),
                display_arg: "path",
                display_language: "text",
                executor: Some(Arc::new(executors::WriteTool)),
            },
            ToolDef {
                name: "glob",
                description: "Search for files matching a glob pattern.",
                parameters: params(
                    json!({
                        "pattern": {"type": "string", "description": "Glob pattern (supports ** for recursive)."},
                        "path": {"type": "string", "description": "Directory to search in (default: current directory)."},
                    }),
                    &["pattern"],
                ),
                display_arg: "pattern",
                display_language: "text",
                executor: Some(Arc::new(executors::GlobTool)),
            },
            ToolDef {
                name: "grep",
                description: "Search for regex patterns in files.",
                parameters: params(
                    json!({
                        "pattern": {"type": "string", "description": "Regular expression pattern to search for."},
                        "path": {"type": "string", "description": "Directory to search in (default: current directory)."},
                        "file_filter": {"type": "string", "description": "Glob pattern to filter files (default: *)."},
                        "case_sensitive": {"type": "boolean", "description": "Whether the search is case sensitive (default: true)."},
                        "context_before": {"type": "integer", "description": "Lines of context before each match (default: 0)."},
                        "context_after": {"type": "integer", "description": "Lines of context after each match (default: 0)."},
                    }),
                    &["pattern"],
                ),
                display_arg: "pattern",
                display_language: "text",
                executor: Some(Arc::new(executors::GrepTool)),
            },
            ToolDef {
                name: "replace",
                description: "Replace string occurrences in a file with regex support.",
                parameters: params(
                    json!({
                        "path": {"type": "string", "description": "Absolute or relative file path."},
                        "pattern": {"type": "string", "description": "Regular expression pattern to match."},
                        "replacement": {"type": "string", "description": "Replacement string (supports backreferences)."},
                        "case_sensitive": {"type": "boolean", "description": "Whether the search is case sensitive (default: true)."},
                        "dry_run": {"type": "boolean", "description": "If true, only show what would change without writing (default: true)."},
                    }),
                    &["path", "pattern", "replacement"],
                ),
                display_arg: "path",
                display_language: "text",
                executor: Some(Arc::new(executors::ReplaceTool)),
            },
            ToolDef {
                name: "edit",
                description: "Replace a unique string in a file. The old_string must appear exactly once.",
                parameters: params(
                    json!({
                        "path": {"type": "string", "description": "Absolute or relative file path."},
                        "old_string": {"type": "string", "description": "Exact string to find (must be unique in the file)."},
                        "new_string": {"type": "string", "description": "Replacement string."},
                    }),
                    &["path", "old_string", "new_string"],
                ),
                display_arg: "path",
                display_language: "text",
                executor: Some(Arc::new(executors::EditTool)),
            },
            ToolDef {
                name: "web_search",
                description: "Search the web for information.",
                parameters: params(
                    json!({"query": {"type": "string", "description": "Search query."}}),
                    &["query"],
                ),
                display_arg: "query",
                display_language: "text",
                executor: Some(Arc::new(web::WebSearchTool(web.clone()))),
            },
            ToolDef {
                name: "web_fetch",
                description: "Fetch the contents of a URL.",
                parameters: params(
                    json!({"url": {"type": "string", "description": "URL to fetch."}}),
                    &["url"],
                ),
                display_arg: "url",
                display_language: "text",
                executor: Some(Arc::new(web::WebFetchTool(web))),
            },
        ];
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Provider-facing schemas for all registered tools.
    pub fn all_schemas(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDef::to_schema).collect()
    }

    /// Schemas for tools whose names match any fnmatch-style pattern
    /// (e.g. `"web_*"`).
    pub fn schemas_for(&self, patterns: &[&str]) -> Vec<Value> {
        let patterns: Vec<glob::Pattern> = patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        self.tools
            .iter()
            .filter(|t| patterns.iter().any(|p| p.matches(t.name)))
            .map(ToolDef::to_schema)
            .collect()
    }

    /// Dispatch a tool call to its executor.
    ///
    /// `None` means the tool has no direct executor — the caller routes
    /// the code through the REPL execution path instead.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> Option<Result<String, String>> {
        let def = self.get(&call.name)?;
        let executor = def.executor.as_ref()?;
        Some(executor.run(&call.args).await)
    }
}

fn params(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_registry_has_all_builtins() {
        let registry = ToolRegistry::global();
        for name in [
            "python",
            "shell",
            "read",
            "write",
            "glob",
            "grep",
            "replace",
            "edit",
            "web_search",
            "web_fetch",
        ] {
            assert!(registry.get(name).is_some(), "missing tool {name}");
        }
    }

    #[test]
    fn test_code_tools_have_no_executor() {
        let registry = ToolRegistry::global();
        assert!(registry.get("python").unwrap().executor.is_none());
        assert!(registry.get("shell").unwrap().executor.is_none());
        assert!(registry.get("read").unwrap().executor.is_some());
    }

    #[test]
    fn test_schema_shape() {
        let schema = ToolRegistry::global().get("read").unwrap().to_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "read");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
        assert_eq!(schema["function"]["parameters"]["required"][0], "path");
    }

    #[test]
    fn test_schemas_for_patterns() {
        let registry = ToolRegistry::global();
        let web = registry.schemas_for(&["web_*"]);
        assert_eq!(web.len(), 2);

        let all = registry.schemas_for(&["*"]);
        assert_eq!(all.len(), registry.all_schemas().len());

        let none = registry.schemas_for(&["nothing_matches"]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_display_text_uses_display_arg() {
        let call = ToolCall::new(
            "call_1",
            "read",
            args(&[("path", Value::String("/x".into()))]),
        );
        assert_eq!(call.display_text(), "/x");
        assert_eq!(call.display_language(), "text");
    }

    #[test]
    fn test_tool_call_code_and_language() {
        let call = ToolCall::new(
            "c1",
            "shell",
            args(&[("command", Value::String("ls".into()))]),
        );
        assert_eq!(call.code(), "ls");
        assert_eq!(call.language(), Language::Bash);

        let call = ToolCall::new(
            "c2",
            "python",
            args(&[("code", Value::String("x = 1".into()))]),
        );
        assert_eq!(call.code(), "x = 1");
        assert_eq!(call.language(), Language::Python);
    }

    #[tokio::test]
    async fn test_execute_tool_call_without_executor_is_none() {
        let call = ToolCall::new("c3", "python", ToolArgs::new());
        assert!(ToolRegistry::global()
            .execute_tool_call(&call)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_is_none() {
        let call = ToolCall::new("c4", "nope", ToolArgs::new());
        assert!(ToolRegistry::global()
            .execute_tool_call(&call)
            .await
            .is_none());
    }
}
