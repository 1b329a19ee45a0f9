//! Built-in tool executors for filesystem access.
//!
//! All of these are I/O-bound and run on the blocking thread pool so the
//! event loop never stalls on disk. Output is bounded: oversized results
//! are truncated with an explicit notice rather than silently cut.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};

use super::{ToolArgs, ToolExecutor};

const MAX_READ_CHARS: usize = 50_000;
const MAX_GLOB_RESULTS: usize = 100;
const MAX_GREP_FILES: usize = 50;
const MAX_GREP_MATCHES: usize = 200;
const DIFF_CONTEXT: usize = 3;

fn arg_str(args: &ToolArgs, key: &str) -> Result<String, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| format!("Error: missing required argument '{key}'"))
}

fn arg_usize(args: &ToolArgs, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn arg_bool(args: &ToolArgs, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Display paths relative to the working directory when possible.
fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

// ── read ─────────────────────────────────────────────────────────────────

pub struct ReadTool;

#[async_trait]
impl ToolExecutor for ReadTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let path = expand_path(&arg_str(args, "path")?);
        let offset = arg_usize(args, "offset").unwrap_or(0);
        let limit = arg_usize(args, "limit");

        tokio::task::spawn_blocking(move || read_file(&path, offset, limit))
            .await
            .map_err(|e| format!("Error: read task failed: {e}"))
    }
}

fn read_file(path: &Path, offset: usize, limit: Option<usize>) -> String {
    tracing::debug!("reading file: {} (offset={offset})", path.display());

    if !path.is_file() {
        return format!("Error: File not found: {}", display_path(path));
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return format!("Error reading file: {e}"),
    };

    let lines: Vec<&str> = content.lines().collect();
    let end = limit
        .map(|l| (offset + l).min(lines.len()))
        .unwrap_or(lines.len());
    if offset >= lines.len() && !lines.is_empty() {
        return format!("Error: offset {offset} past end of file ({} lines)", lines.len());
    }

    let mut out = String::new();
    let mut truncated = false;
    for (i, line) in lines[offset.min(lines.len())..end].iter().enumerate() {
        out.push_str(&format!("{:4} | {line}\n", offset + i + 1));
        if out.len() > MAX_READ_CHARS {
            truncated = true;
            break;
        }
    }
    if truncated {
        out.push_str(&format!(
            "... (truncated at {MAX_READ_CHARS} characters, {} total lines)\n",
            lines.len()
        ));
    }
    if out.is_empty() {
        "(empty file)".to_string()
    } else {
        out
    }
}

// ── write ────────────────────────────────────────────────────────────────

pub struct WriteTool;

#[async_trait]
impl ToolExecutor for WriteTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let path = expand_path(&arg_str(args, "path")?);
        let content = arg_str(args, "content")?;

        tokio::task::spawn_blocking(move || write_file(&path, &content))
            .await
            .map_err(|e| format!("Error: write task failed: {e}"))
    }
}

fn write_file(path: &Path, content: &str) -> String {
    let is_new_file = !path.exists();
    let old_lines: Vec<String> = if is_new_file {
        Vec::new()
    } else {
        std::fs::read_to_string(path)
            .map(|old| old.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return json!({"success": false, "error": format!("Error writing file: {e}")})
                .to_string();
        }
    }
    if let Err(e) = std::fs::write(path, content) {
        return json!({"success": false, "error": format!("Error writing file: {e}")}).to_string();
    }

    let new_lines: Vec<&str> = if content.is_empty() {
        vec![""]
    } else {
        content.lines().collect()
    };

    json!({
        "success": true,
        "path": display_path(path),
        "old_lines": old_lines,
        "new_lines": new_lines,
        "start_line": 1,
        "context_before": [],
        "context_after": [],
        "is_new_file": is_new_file,
        "error": null,
    })
    .to_string()
}

// ── edit ─────────────────────────────────────────────────────────────────

pub struct EditTool;

#[async_trait]
impl ToolExecutor for EditTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let path = expand_path(&arg_str(args, "path")?);
        let old_string = arg_str(args, "old_string")?;
        let new_string = arg_str(args, "new_string")?;

        tokio::task::spawn_blocking(move || edit_file(&path, &old_string, &new_string))
            .await
            .map_err(|e| format!("Error: edit task failed: {e}"))
    }
}

fn edit_file(path: &Path, old_string: &str, new_string: &str) -> String {
    let fail = |error: String| json!({"success": false, "error": error}).to_string();

    if !path.is_file() {
        return fail(format!("File not found: {}", display_path(path)));
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return fail(format!("Error reading file: {e}")),
    };

    let count = content.matches(old_string).count();
    if count == 0 {
        return fail(format!("String not found in {}", display_path(path)));
    }
    if count > 1 {
        return fail(format!(
            "String found {count} times in {}. Provide a more specific string with surrounding context.",
            display_path(path)
        ));
    }

    let char_pos = content.find(old_string).expect("counted above");
    let start_line = content[..char_pos].matches('\n').count() + 1;

    let lines: Vec<&str> = content.lines().collect();
    let old_lines: Vec<&str> = old_string.lines().collect();
    let end_line = start_line + old_lines.len().max(1) - 1;

    let before_start = start_line.saturating_sub(1 + DIFF_CONTEXT);
    let context_before: Vec<&str> = lines[before_start..start_line - 1].to_vec();
    let after_end = (end_line + DIFF_CONTEXT).min(lines.len());
    let context_after: Vec<&str> = lines[end_line.min(lines.len())..after_end].to_vec();

    let new_content = content.replacen(old_string, new_string, 1);
    if let Err(e) = std::fs::write(path, new_content) {
        return fail(format!("Error writing file: {e}"));
    }

    let new_lines: Vec<&str> = if new_string.is_empty() {
        vec![""]
    } else {
        new_string.lines().collect()
    };

    json!({
        "success": true,
        "path": display_path(path),
        "old_lines": old_lines,
        "new_lines": new_lines,
        "start_line": start_line,
        "context_before": context_before,
        "context_after": context_after,
        "is_new_file": false,
        "error": null,
    })
    .to_string()
}

// ── glob ─────────────────────────────────────────────────────────────────

pub struct GlobTool;

#[async_trait]
impl ToolExecutor for GlobTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let pattern = arg_str(args, "pattern")?;
        let base = expand_path(&arg_str(args, "path").unwrap_or_else(|_| ".".into()));

        tokio::task::spawn_blocking(move || glob_files(&base, &pattern))
            .await
            .map_err(|e| format!("Error: glob task failed: {e}"))
    }
}

fn glob_files(base: &Path, pattern: &str) -> String {
    let full_pattern = base.join(pattern).display().to_string();
    let paths = match glob::glob(&full_pattern) {
        Ok(paths) => paths,
        Err(e) => return format!("Error searching: {e}"),
    };

    let mut matches: Vec<String> = paths
        .filter_map(Result::ok)
        .map(|p| display_path(&p))
        .collect();
    matches.sort();

    if matches.is_empty() {
        return format!("No files matching '{pattern}' in {}", display_path(base));
    }

    let total = matches.len();
    matches.truncate(MAX_GLOB_RESULTS);
    let mut result = matches.join("\n");
    if total > MAX_GLOB_RESULTS {
        result.push_str(&format!("\n... and {} more", total - MAX_GLOB_RESULTS));
    }
    result
}

// ── grep ─────────────────────────────────────────────────────────────────

pub struct GrepTool;

#[async_trait]
impl ToolExecutor for GrepTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let pattern = arg_str(args, "pattern")?;
        let base = expand_path(&arg_str(args, "path").unwrap_or_else(|_| ".".into()));
        let file_filter = arg_str(args, "file_filter").unwrap_or_else(|_| "*".into());
        let case_sensitive = arg_bool(args, "case_sensitive", true);
        let context_before = arg_usize(args, "context_before").unwrap_or(0);
        let context_after = arg_usize(args, "context_after").unwrap_or(0);

        tokio::task::spawn_blocking(move || {
            grep_files(
                &base,
                &pattern,
                &file_filter,
                case_sensitive,
                context_before,
                context_after,
            )
        })
        .await
        .map_err(|e| format!("Error: grep task failed: {e}"))
    }
}

fn grep_files(
    base: &Path,
    pattern: &str,
    file_filter: &str,
    case_sensitive: bool,
    context_before: usize,
    context_after: usize,
) -> String {
    let regex = match RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => return format!("Error: Invalid regex pattern: {e}"),
    };

    let search_pattern = base.join("**").join(file_filter).display().to_string();
    let files: Vec<PathBuf> = match glob::glob(&search_pattern) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .take(MAX_GREP_FILES)
            .collect(),
        Err(e) => return format!("Error during grep: {e}"),
    };

    let mut results: Vec<String> = Vec::new();
    let mut hit_cap = false;

    'files: for file in files {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let mut file_results: Vec<String> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if regex.is_match(line) {
                let start = i.saturating_sub(context_before);
                for (j, ctx) in lines[start..i].iter().enumerate() {
                    file_results.push(format!("  {}: {}", start + j + 1, ctx));
                }
                file_results.push(format!("  {}: {}", i + 1, line));
                let end = (i + 1 + context_after).min(lines.len());
                for (j, ctx) in lines[i + 1..end].iter().enumerate() {
                    file_results.push(format!("  {}: {}", i + j + 2, ctx));
                }
            }
        }
        if !file_results.is_empty() {
            results.push(format!("{}:", display_path(&file)));
            results.extend(file_results);
            if results.len() >= MAX_GREP_MATCHES {
                results.truncate(MAX_GREP_MATCHES);
                hit_cap = true;
                break 'files;
            }
        }
    }

    if results.is_empty() {
        return format!("No matches found for '{pattern}' in {}", display_path(base));
    }
    let mut output = results.join("\n");
    if hit_cap {
        output.push_str(&format!("\n... (max {MAX_GREP_MATCHES} matches reached)"));
    }
    output
}

// ── replace ──────────────────────────────────────────────────────────────

pub struct ReplaceTool;

#[async_trait]
impl ToolExecutor for ReplaceTool {
    async fn run(&self, args: &ToolArgs) -> Result<String, String> {
        let path = expand_path(&arg_str(args, "path")?);
        let pattern = arg_str(args, "pattern")?;
        let replacement = arg_str(args, "replacement")?;
        let case_sensitive = arg_bool(args, "case_sensitive", true);
        let dry_run = arg_bool(args, "dry_run", true);

        tokio::task::spawn_blocking(move || {
            replace_in_file(&path, &pattern, &replacement, case_sensitive, dry_run)
        })
        .await
        .map_err(|e| format!("Error: replace task failed: {e}"))
    }
}

fn replace_in_file(
    path: &Path,
    pattern: &str,
    replacement: &str,
    case_sensitive: bool,
    dry_run: bool,
) -> String {
    if !path.is_file() {
        return format!("Error: File not found: {}", display_path(path));
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return format!("Error reading file: {e}"),
    };

    let regex = match RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => return format!("Error: Invalid regex pattern: {e}"),
    };

    let count = regex.find_iter(&content).count();
    if count == 0 {
        return format!("No matches found for '{pattern}' in {}", display_path(path));
    }

    if dry_run {
        let mut out = vec![format!(
            "DRY RUN: {count} replacement(s) would be made to {}:",
            display_path(path)
        )];
        out.push(String::new());
        for (idx, m) in regex.find_iter(&content).take(10).enumerate() {
            let ctx_start = m.start().saturating_sub(30);
            let ctx_end = (m.end() + 30).min(content.len());
            let before = &content[floor_char(&content, ctx_start)..m.start()];
            let after = &content[m.end()..ceil_char(&content, ctx_end)];
            out.push(format!("  Match {} at position {}:", idx + 1, m.start()));
            out.push(format!("    - {before:?}{:?}{after:?}", m.as_str()));
            out.push(format!("    + {before:?}{replacement:?}{after:?}"));
            out.push(String::new());
        }
        if count > 10 {
            out.push(format!("  ... and {} more replacement(s)", count - 10));
        }
        return out.join("\n");
    }

    let new_content = regex.replace_all(&content, replacement).into_owned();
    match std::fs::write(path, new_content) {
        Ok(()) => format!(
            "Replaced {count} occurrence(s) in {}",
            display_path(path)
        ),
        Err(e) => format!("Error writing file: {e}"),
    }
}

/// Round a byte index down to a char boundary.
fn floor_char(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Round a byte index up to a char boundary.
fn ceil_char(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_read_numbers_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "alpha\nbeta\n").unwrap();

        let out = ReadTool
            .run(&args(&[("path", path.display().to_string().into())]))
            .await
            .unwrap();
        assert!(out.contains("1 | alpha"));
        assert!(out.contains("2 | beta"));
    }

    #[tokio::test]
    async fn test_read_offset_and_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "a\nb\nc\nd\n").unwrap();

        let out = ReadTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("offset", 1.into()),
                ("limit", 2.into()),
            ]))
            .await
            .unwrap();
        assert!(out.contains("2 | b"));
        assert!(out.contains("3 | c"));
        assert!(!out.contains("| a"));
        assert!(!out.contains("| d"));
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error_string() {
        let out = ReadTool
            .run(&args(&[("path", "/no/such/file".into())]))
            .await
            .unwrap();
        assert!(out.starts_with("Error: File not found"));
    }

    #[tokio::test]
    async fn test_write_new_file_diff_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new/nested.txt");

        let out = WriteTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("content", "line1\nline2".into()),
            ]))
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["is_new_file"], true);
        assert_eq!(payload["old_lines"].as_array().unwrap().len(), 0);
        assert_eq!(payload["new_lines"][0], "line1");
        assert_eq!(payload["start_line"], 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line1\nline2");
    }

    #[tokio::test]
    async fn test_edit_unique_string_with_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "one\ntwo\nthree\nfour\nfive\nsix\nseven\n").unwrap();

        let out = EditTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("old_string", "four".into()),
                ("new_string", "FOUR".into()),
            ]))
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["start_line"], 4);
        assert_eq!(payload["old_lines"][0], "four");
        assert_eq!(payload["new_lines"][0], "FOUR");
        assert_eq!(
            payload["context_before"].as_array().unwrap(),
            &vec![Value::from("one"), "two".into(), "three".into()]
        );
        assert_eq!(
            payload["context_after"].as_array().unwrap(),
            &vec![Value::from("five"), "six".into(), "seven".into()]
        );
        assert!(std::fs::read_to_string(&path).unwrap().contains("FOUR"));
    }

    #[tokio::test]
    async fn test_edit_ambiguous_string_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "dup\ndup\n").unwrap();

        let out = EditTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("old_string", "dup".into()),
                ("new_string", "x".into()),
            ]))
            .await
            .unwrap();
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["success"], false);
        assert!(payload["error"].as_str().unwrap().contains("2 times"));
    }

    #[tokio::test]
    async fn test_glob_finds_and_caps() {
        let dir = TempDir::new().unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("f{i}.rs")), "x").unwrap();
        }
        std::fs::write(dir.path().join("other.txt"), "x").unwrap();

        let out = GlobTool
            .run(&args(&[
                ("pattern", "*.rs".into()),
                ("path", dir.path().display().to_string().into()),
            ]))
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains("other.txt"));
    }

    #[tokio::test]
    async fn test_glob_no_matches() {
        let dir = TempDir::new().unwrap();
        let out = GlobTool
            .run(&args(&[
                ("pattern", "*.nope".into()),
                ("path", dir.path().display().to_string().into()),
            ]))
            .await
            .unwrap();
        assert!(out.starts_with("No files matching"));
    }

    #[tokio::test]
    async fn test_grep_matches_with_line_numbers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing\nneedle here\nend\n").unwrap();

        let out = GrepTool
            .run(&args(&[
                ("pattern", "needle".into()),
                ("path", dir.path().display().to_string().into()),
            ]))
            .await
            .unwrap();
        assert!(out.contains("a.txt:"));
        assert!(out.contains("2: needle here"));
    }

    #[tokio::test]
    async fn test_grep_case_insensitive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "NEEDLE\n").unwrap();

        let out = GrepTool
            .run(&args(&[
                ("pattern", "needle".into()),
                ("path", dir.path().display().to_string().into()),
                ("case_sensitive", false.into()),
            ]))
            .await
            .unwrap();
        assert!(out.contains("NEEDLE"));
    }

    #[tokio::test]
    async fn test_grep_bad_regex_is_error_string() {
        let out = GrepTool
            .run(&args(&[("pattern", "([".into())]))
            .await
            .unwrap();
        assert!(out.starts_with("Error: Invalid regex pattern"));
    }

    #[tokio::test]
    async fn test_replace_dry_run_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "foo bar foo\n").unwrap();

        let out = ReplaceTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("pattern", "foo".into()),
                ("replacement", "baz".into()),
            ]))
            .await
            .unwrap();
        assert!(out.starts_with("DRY RUN: 2 replacement(s)"));
        // File untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "foo bar foo\n");
    }

    #[tokio::test]
    async fn test_replace_writes_when_not_dry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "foo bar\n").unwrap();

        let out = ReplaceTool
            .run(&args(&[
                ("path", path.display().to_string().into()),
                ("pattern", "foo".into()),
                ("replacement", "baz".into()),
                ("dry_run", false.into()),
            ]))
            .await
            .unwrap();
        assert!(out.contains("Replaced 1 occurrence(s)"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "baz bar\n");
    }

    #[tokio::test]
    async fn test_missing_argument_reported() {
        let err = ReadTool.run(&ToolArgs::new()).await.unwrap_err();
        assert!(err.starts_with("Error: missing required argument"));
    }
}
