//! XML tool-call extraction for MiniMax-style models.
//!
//! Some models emit tool calls as `<minimax:tool_call>` XML blocks inside
//! the content text instead of native tool-call deltas. This is an
//! optional provider capability: when a provider reports it, the
//! coordinator runs the extractor over the finished text. Nothing in the
//! core pipeline depends on it.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::tools::{ToolArgs, ToolCall};

fn tool_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<minimax:tool_call>(.*?)</minimax:tool_call>").expect("static regex")
    })
}

fn invoke_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<invoke name=(.*?)</invoke>").expect("static regex"))
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<parameter name=(.*?)</parameter>").expect("static regex"))
}

/// True if the model id denotes a MiniMax variant.
pub fn is_minimax_model(model: &str) -> bool {
    let lower = model.to_lowercase();
    lower.contains("minimax") || lower.starts_with("abab")
}

/// Parse `<minimax:tool_call>` blocks out of `text`.
///
/// Returns the prose with the blocks removed plus the extracted calls.
/// Parameter values are coerced using the declared JSON-schema types from
/// `tool_schemas` (function-call format); unknown parameters stay strings.
pub fn parse_xml_tool_calls(
    text: &str,
    tool_schemas: &[Value],
    start_id: usize,
) -> (String, Vec<ToolCall>) {
    if !text.contains("<minimax:tool_call>") {
        return (text.to_string(), Vec::new());
    }

    let mut calls = Vec::new();
    let mut next_id = start_id;

    for block in tool_call_re().captures_iter(text) {
        for invoke in invoke_re().captures_iter(&block[1]) {
            let body = &invoke[1];
            let Some(angle) = body.find('>') else { continue };
            let name = body[..angle].trim().trim_matches(&['"', '\''][..]).to_string();
            if name.is_empty() {
                continue;
            }

            let types = param_types(tool_schemas, &name);
            let mut args = ToolArgs::new();
            for param in param_re().captures_iter(body) {
                let inner = &param[1];
                let Some(close) = inner.find('>') else { continue };
                let key = inner[..close].trim().trim_matches(&['"', '\''][..]).to_string();
                let raw_value = inner[close + 1..].trim().trim_matches('\n');
                let declared = types
                    .as_ref()
                    .and_then(|t| t.get(&key))
                    .map(String::as_str)
                    .unwrap_or("string");
                args.insert(key, convert_param_value(raw_value, declared));
            }

            calls.push(ToolCall::new(format!("minimax_{next_id}"), name, args));
            next_id += 1;
        }
    }

    let prose = tool_call_re().replace_all(text, "");
    let collapse = Regex::new(r"\n{3,}").expect("static regex");
    let prose = collapse.replace_all(&prose, "\n\n").trim().to_string();
    (prose, calls)
}

/// Parameter name → declared type for one tool, from its schema.
fn param_types(tool_schemas: &[Value], name: &str) -> Option<std::collections::HashMap<String, String>> {
    let schema = tool_schemas
        .iter()
        .find(|s| s["function"]["name"].as_str() == Some(name))?;
    let props = schema["function"]["parameters"]["properties"].as_object()?;
    Some(
        props
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    v["type"].as_str().unwrap_or("string").to_string(),
                )
            })
            .collect(),
    )
}

/// Coerce a string parameter value by its declared JSON-schema type.
fn convert_param_value(value: &str, declared: &str) -> Value {
    if value.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    match declared {
        "string" | "str" | "text" => Value::String(value.to_string()),
        "integer" | "int" => value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        "number" | "float" => value
            .parse::<f64>()
            .ok()
            .and_then(|v| {
                if v.fract() == 0.0 {
                    Some(Value::from(v as i64))
                } else {
                    serde_json::Number::from_f64(v).map(Value::Number)
                }
            })
            .unwrap_or_else(|| Value::String(value.to_string())),
        "boolean" | "bool" => Value::Bool(matches!(value.to_lowercase().as_str(), "true" | "1")),
        _ => serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schemas() -> Vec<Value> {
        vec![json!({
            "type": "function",
            "function": {
                "name": "shell",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "command": {"type": "string"},
                        "count": {"type": "integer"},
                    }
                }
            }
        })]
    }

    #[test]
    fn test_model_detection() {
        assert!(is_minimax_model("MiniMax-M2.5"));
        assert!(is_minimax_model("abab6.5s-chat"));
        assert!(!is_minimax_model("gpt-4o"));
    }

    #[test]
    fn test_extract_single_call() {
        let text = "Let me run that.\n<minimax:tool_call>\n<invoke name=\"shell\">\n<parameter name=\"command\">ls -la</parameter>\n</invoke>\n</minimax:tool_call>\n";
        let (prose, calls) = parse_xml_tool_calls(text, &schemas(), 0);
        assert_eq!(prose, "Let me run that.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "minimax_0");
        assert_eq!(calls[0].name, "shell");
        assert_eq!(
            calls[0].args.get("command").and_then(Value::as_str),
            Some("ls -la")
        );
    }

    #[test]
    fn test_type_coercion() {
        let text = "<minimax:tool_call><invoke name=\"shell\"><parameter name=\"count\">3</parameter></invoke></minimax:tool_call>";
        let (_, calls) = parse_xml_tool_calls(text, &schemas(), 5);
        assert_eq!(calls[0].id, "minimax_5");
        assert_eq!(calls[0].args.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_no_blocks_passthrough() {
        let (prose, calls) = parse_xml_tool_calls("plain text", &schemas(), 0);
        assert_eq!(prose, "plain text");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_multiple_invokes_counted() {
        let text = "<minimax:tool_call>\
            <invoke name=\"shell\"><parameter name=\"command\">a</parameter></invoke>\
            <invoke name=\"shell\"><parameter name=\"command\">b</parameter></invoke>\
            </minimax:tool_call>";
        let (prose, calls) = parse_xml_tool_calls(text, &schemas(), 0);
        assert!(prose.is_empty());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].id, "minimax_1");
    }
}
