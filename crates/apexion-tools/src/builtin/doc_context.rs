// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_SNIPPET_CHARS: usize = 4000;
const MAX_FILES: usize = 5;

/// Docs-first lookup: search the project's own documentation (README,
/// `docs/`, `*.md` at the root) for a query before reaching out to the
/// network. Feeds the `doc_context → web_search → web_fetch` fallback chain:
/// when local docs don't answer the question, the router falls through to
/// searching and fetching the web instead.
pub struct DocContextTool;

static DOC_DIRS: &[&str] = &["docs", "doc", "Documentation"];
static DOC_ROOT_FILES: &[&str] = &[
    "README.md",
    "ARCHITECTURE.md",
    "CONTRIBUTING.md",
    "CHANGELOG.md",
];

#[async_trait]
impl Tool for DocContextTool {
    fn name(&self) -> &str {
        "doc_context"
    }

    fn description(&self) -> &str {
        "Search this project's own documentation (README, ARCHITECTURE.md, docs/)\n\
         for a query before falling back to the web. Returns the surrounding\n\
         paragraph from each matching file. If nothing local answers the\n\
         question, use web_search or web_fetch instead."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Topic or keyword to look up, e.g. 'compaction strategy'"
                },
                "root": {
                    "type": "string",
                    "description": "Project root to search from (default: current directory)"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return ToolOutput::err(&call.id, "missing required parameter 'query'"),
        };
        let root = call
            .args
            .get("root")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();

        debug!(query = %query, root = %root, "doc_context tool");

        let mut candidates = Vec::new();
        for name in DOC_ROOT_FILES {
            candidates.push(format!("{}/{}", root.trim_end_matches('/'), name));
        }
        for dir in DOC_DIRS {
            let dir_path = format!("{}/{}", root.trim_end_matches('/'), dir);
            collect_markdown(&dir_path, &mut candidates).await;
        }

        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        for path in candidates {
            if hits.len() >= MAX_FILES {
                break;
            }
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if let Some(snippet) = extract_snippet(&content, &needle) {
                hits.push(format!("--- {path} ---\n{snippet}"));
            }
        }

        if hits.is_empty() {
            ToolOutput::ok(
                &call.id,
                "(no local documentation matched; try web_search or web_fetch)",
            )
        } else {
            ToolOutput::ok(&call.id, hits.join("\n\n"))
        }
    }
}

#[async_recursion::async_recursion]
async fn collect_markdown(dir: &str, out: &mut Vec<String>) {
    let Ok(mut rd) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        let path = entry.path();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            collect_markdown(&path.to_string_lossy(), out).await;
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            out.push(path.to_string_lossy().to_string());
        }
    }
}

/// Find the first paragraph containing `needle` (case-insensitive) and
/// return it trimmed to `MAX_SNIPPET_CHARS`.
fn extract_snippet(content: &str, needle: &str) -> Option<String> {
    let lower = content.to_lowercase();
    let pos = lower.find(needle)?;

    let start = content[..pos].rfind("\n\n").map(|p| p + 2).unwrap_or(0);
    let end = content[pos..]
        .find("\n\n")
        .map(|p| pos + p)
        .unwrap_or(content.len());

    let snippet = &content[start..end];
    if snippet.len() > MAX_SNIPPET_CHARS {
        Some(format!("{}...[truncated]", &snippet[..MAX_SNIPPET_CHARS]))
    } else {
        Some(snippet.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "d1".into(),
            name: "doc_context".into(),
            args,
        }
    }

    #[test]
    fn extract_snippet_finds_paragraph() {
        let content = "intro paragraph.\n\nThe compaction strategy masks low-importance\ntool results first.\n\nfooter.";
        let snippet = extract_snippet(content, "compaction").unwrap();
        assert!(snippet.contains("compaction strategy"));
        assert!(!snippet.contains("intro paragraph"));
        assert!(!snippet.contains("footer"));
    }

    #[test]
    fn extract_snippet_is_case_insensitive() {
        let content = "Some text.\n\nCOMPACTION lives here.\n\nmore.";
        assert!(extract_snippet(content, "compaction").is_some());
    }

    #[test]
    fn extract_snippet_returns_none_when_absent() {
        assert!(extract_snippet("nothing relevant here", "compaction").is_none());
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let out = DocContextTool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'query'"));
    }

    #[tokio::test]
    async fn finds_match_in_readme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("README.md"),
            "# Project\n\nThe turn loop drives tool execution.\n\nLicense: Apache-2.0.",
        )
        .unwrap();

        let out = DocContextTool
            .execute(&call(json!({
                "query": "turn loop",
                "root": dir.path().to_str().unwrap()
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("turn loop"), "{}", out.content);
    }

    #[tokio::test]
    async fn finds_match_in_docs_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(
            dir.path().join("docs/architecture.md"),
            "# Architecture\n\nThe router scores candidate tools by domain and risk.",
        )
        .unwrap();

        let out = DocContextTool
            .execute(&call(json!({
                "query": "router scores",
                "root": dir.path().to_str().unwrap()
            })))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("router scores"), "{}", out.content);
    }

    #[tokio::test]
    async fn no_match_suggests_web_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Empty project").unwrap();

        let out = DocContextTool
            .execute(&call(json!({
                "query": "nonexistent_topic_xyzzy",
                "root": dir.path().to_str().unwrap()
            })))
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("web_search"));
    }
}
