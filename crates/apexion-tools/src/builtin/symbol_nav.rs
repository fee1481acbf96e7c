// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Lightweight grep-backed symbol lookup: definitions, references, or both.
///
/// This is not a language server — it has no type information and no
/// cross-file resolution beyond textual heuristics. It exists to satisfy the
/// router's `symbol_lookup` fastpath so common "where is X defined / used /
/// called" questions resolve in one call instead of a grep-then-read loop.
pub struct SymbolNavTool;

fn definition_patterns(symbol: &str) -> Vec<String> {
    let s = regex::escape(symbol);
    vec![
        format!(r"\b(fn|struct|enum|trait|impl|type|const|static)\s+{s}\b"),
        format!(r"\b(function|class|interface|def|const|let|var)\s+{s}\b"),
        format!(r"^\s*{s}\s*[:=]"),
    ]
}

fn reference_pattern(symbol: &str) -> String {
    format!(r"\b{}\b", regex::escape(symbol))
}

#[async_trait]
impl Tool for SymbolNavTool {
    fn name(&self) -> &str {
        "symbol_nav"
    }

    fn description(&self) -> &str {
        "Find where a symbol is defined, referenced, or both, using a grep-backed\n\
         heuristic index (no language server, no type resolution).\n\
         mode: 'definitions' (declarations only), 'references' (all occurrences),\n\
         'both' (default). Best for a single well-known identifier; for broader\n\
         exploratory search use grep or search_codebase instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Exact identifier to look up, e.g. 'run_agentic_loop'"
                },
                "path": {
                    "type": "string",
                    "description": "Root directory to search from (default: current directory)"
                },
                "mode": {
                    "type": "string",
                    "enum": ["definitions", "references", "both"],
                    "description": "What to return (default: both)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum matches per section (default 50)"
                }
            },
            "required": ["symbol"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let symbol = match call.args.get("symbol").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return ToolOutput::err(&call.id, "missing required parameter 'symbol'"),
        };
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let mode = call
            .args
            .get("mode")
            .and_then(|v| v.as_str())
            .unwrap_or("both")
            .to_string();
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(50) as usize;

        debug!(symbol = %symbol, path = %path, mode = %mode, "symbol_nav tool");

        let mut sections = Vec::new();

        if mode == "definitions" || mode == "both" {
            let combined = definition_patterns(&symbol).join("|");
            match run_rg(&combined, &path, limit).await {
                Ok(out) if out.trim().is_empty() => {
                    sections.push("definitions: (no matches)".to_string())
                }
                Ok(out) => sections.push(format!("definitions:\n{out}")),
                Err(e) => return ToolOutput::err(&call.id, format!("symbol_nav error: {e}")),
            }
        }

        if mode == "references" || mode == "both" {
            let pattern = reference_pattern(&symbol);
            match run_rg(&pattern, &path, limit).await {
                Ok(out) if out.trim().is_empty() => {
                    sections.push("references: (no matches)".to_string())
                }
                Ok(out) => sections.push(format!("references:\n{out}")),
                Err(e) => return ToolOutput::err(&call.id, format!("symbol_nav error: {e}")),
            }
        }

        if sections.is_empty() {
            return ToolOutput::err(
                &call.id,
                format!("invalid 'mode': {mode} (expected definitions|references|both)"),
            );
        }

        ToolOutput::ok(&call.id, sections.join("\n\n"))
    }
}

async fn run_rg(pattern: &str, path: &str, limit: usize) -> anyhow::Result<String> {
    let output = tokio::process::Command::new("rg")
        .args([
            "--color", "never", "--vimgrep", "--no-heading", "-e", pattern, path,
        ])
        .stdin(std::process::Stdio::null())
        .output()
        .await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().take(limit).collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "s1".into(),
            name: "symbol_nav".into(),
            args,
        }
    }

    #[test]
    fn definition_patterns_include_rust_fn() {
        let pats = definition_patterns("run_agentic_loop");
        assert!(pats[0].contains("fn"));
        assert!(pats[0].contains("run_agentic_loop"));
    }

    #[test]
    fn reference_pattern_is_word_bounded() {
        assert_eq!(reference_pattern("foo"), r"\bfoo\b");
    }

    #[tokio::test]
    async fn missing_symbol_is_error() {
        let out = SymbolNavTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'symbol'"));
    }

    #[tokio::test]
    async fn invalid_mode_is_error() {
        let out = SymbolNavTool
            .execute(&call(json!({"symbol": "x", "mode": "everything"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("invalid 'mode'"));
    }

    #[tokio::test]
    async fn finds_struct_definition() {
        let out = SymbolNavTool
            .execute(&call(json!({
                "symbol": "SymbolNavTool",
                "path": "/data/agents/apexion/crates/apexion-tools/src/builtin/symbol_nav.rs",
                "mode": "definitions"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("pub struct SymbolNavTool"), "{}", out.content);
    }

    #[tokio::test]
    async fn both_mode_returns_two_sections() {
        let out = SymbolNavTool
            .execute(&call(json!({
                "symbol": "SymbolNavTool",
                "path": "/data/agents/apexion/crates/apexion-tools/src/builtin/symbol_nav.rs"
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("definitions:"));
        assert!(out.content.contains("references:"));
    }
}
