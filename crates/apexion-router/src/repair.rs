// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{Map, Value};

/// A tool name the model guessed that isn't registered, mapped to the real
/// tool.  Covers the common synonyms a model reaches for when it doesn't
/// remember the exact registered name.
fn name_aliases(name: &str) -> Option<&'static str> {
    match name {
        "read" | "cat" | "view_file" | "open_file" => Some("read_file"),
        "ls" | "list_files" | "listdir" => Some("list_dir"),
        "search" | "rg" | "ripgrep" => Some("grep"),
        "fetch" | "curl" | "http_get" => Some("web_fetch"),
        "search_web" | "google" => Some("web_search"),
        "docs" | "lookup_docs" => Some("doc_context"),
        "write_file" | "save_file" | "create_file" => Some("write"),
        "edit" | "patch_file" | "str_replace" => Some("edit_file"),
        "rm" | "remove_file" | "unlink" => Some("delete_file"),
        "find" | "glob" | "find_files" => Some("find_file"),
        "run" | "shell" | "exec" | "bash" => Some("run_terminal_command"),
        "symbols" | "goto_definition" | "find_references" => Some("symbol_nav"),
        "overview" | "repo_overview" | "repo_tree" => Some("repo_map"),
        _ => None,
    }
}

/// MCP-style `server/tool` or `server.tool` names get rewritten to the
/// `mcp__server__tool` convention the registry actually uses.
fn normalize_mcp_name(name: &str) -> Option<String> {
    if name.starts_with("mcp__") {
        return None;
    }
    for sep in ['/', '.'] {
        if let Some((server, tool)) = name.split_once(sep) {
            if !server.is_empty() && !tool.is_empty() && !tool.contains(sep) {
                return Some(format!("mcp__{server}__{tool}"));
            }
        }
    }
    None
}

/// Resolve a model-supplied tool name against the registered names, trying
/// an exact match first, then the alias table, then MCP normalization.
///
/// Returns `None` when nothing matches — the caller falls back to the
/// fallback-chain / degrade policy instead.
pub fn repair_tool_name(called: &str, known: &[String]) -> Option<String> {
    if known.iter().any(|n| n == called) {
        return Some(called.to_string());
    }
    if let Some(alias) = name_aliases(called) {
        if known.iter().any(|n| n == alias) {
            return Some(alias.to_string());
        }
    }
    if let Some(mcp) = normalize_mcp_name(called) {
        if known.iter().any(|n| n == &mcp) {
            return Some(mcp);
        }
    }
    None
}

/// Per-tool argument key rewrites: maps a stray key the model used onto the
/// tool's actual canonical parameter name.  Grounded in the real schemas in
/// `apexion-tools::builtin` rather than guessed — each tool's real parameter
/// names are the only ones honored here.
fn arg_aliases(tool_name: &str) -> &'static [(&'static str, &'static str)] {
    match tool_name {
        "read_file" => &[("path", "file_path"), ("filepath", "file_path"), ("file", "file_path")],
        "grep" => &[
            ("query", "pattern"),
            ("q", "pattern"),
            ("regex", "pattern"),
            ("dir", "path"),
            ("directory", "path"),
            ("glob", "include"),
            ("file_pattern", "include"),
        ],
        "web_fetch" => &[("link", "url"), ("uri", "url")],
        "web_search" => &[("q", "query"), ("search_query", "query")],
        "write" | "edit_file" | "delete_file" => &[
            ("path", "file_path"),
            ("filepath", "file_path"),
            ("file", "file_path"),
        ],
        "list_dir" | "find_file" => &[("dir", "path"), ("directory", "path")],
        _ => &[],
    }
}

/// Rewrite stray argument keys to their canonical name for `tool_name`.
/// A key already matching the canonical name always wins over an alias, so
/// applying this twice is a no-op — repair is idempotent.
pub fn repair_tool_args(tool_name: &str, args: &Value) -> Value {
    repair_tool_args_with_actions(tool_name, args).0
}

/// Same rewrite as [`repair_tool_args`], but also returns a human-readable
/// description of each key rewritten (e.g. `` arg `path` -> `file_path` ``)
/// so callers can report what repair actually did rather than just that it
/// happened.
pub fn repair_tool_args_with_actions(tool_name: &str, args: &Value) -> (Value, Vec<String>) {
    let Some(obj) = args.as_object() else {
        return (args.clone(), Vec::new());
    };
    let aliases = arg_aliases(tool_name);
    if aliases.is_empty() {
        return (args.clone(), Vec::new());
    }
    let canonical_names: Vec<&str> = aliases.iter().map(|(_, c)| *c).collect();

    let mut out = Map::new();
    // Pass 1: keys that are already canonical always win, regardless of
    // iteration order relative to any alias for the same slot.
    for (key, value) in obj {
        if canonical_names.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }
    // Pass 2: aliases fill in only the slots pass 1 left empty.
    let mut actions = Vec::new();
    for (key, value) in obj {
        if let Some((alias, canonical)) = aliases.iter().find(|(alias, _)| alias == key) {
            if out.contains_key(*canonical) {
                continue;
            }
            out.insert(canonical.to_string(), value.clone());
            actions.push(format!("arg `{alias}` -> `{canonical}`"));
        } else if !canonical_names.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }
    (Value::Object(out), actions)
}

/// Prefix applied to repaired tool-result content so the transcript records
/// that the call only succeeded after a name/arg rewrite.
pub const REPAIR_PREFIX: &str = "[Tool repair]";

/// Build the repair-marker prefix, listing the actions taken (name mapping,
/// argument key rewrites, fallback hops) so the model sees what changed
/// rather than a contentless tag.
pub fn prefix_repaired(content: &str, actions: &[String]) -> String {
    if actions.is_empty() {
        return format!("{REPAIR_PREFIX} {content}");
    }
    format!("{REPAIR_PREFIX} ({}) {content}", actions.join(", "))
}
