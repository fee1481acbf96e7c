// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use apexion_tools::{ApprovalPolicy, OutputCategory, Tool, ToolCall, ToolOutput};

use crate::store::MemoryStore;

/// Persist a fact to cross-session memory. Distinct from `update_memory`
/// (a flat key-value scratchpad): `remember` facts are searchable by
/// content, scoped to a project, and surfaced automatically in the system
/// prompt of future sessions via `load_for_prompt`.
pub struct RememberTool {
    pub store: Arc<dyn MemoryStore>,
    pub project_tag: Option<String>,
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Save a fact to persistent cross-session memory (e.g. a project convention, \
         a decision, or a user preference). Stored facts are searchable later with \
         `recall` and the most recent ones are shown automatically at the start of \
         future sessions in this project."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The fact to remember, as a single self-contained sentence"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional labels for grouping (e.g. [\"convention\", \"testing\"])"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c.to_string(),
            _ => return ToolOutput::err(&call.id, "missing required parameter 'content'"),
        };
        let tags: Vec<String> = call
            .args
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        debug!(content_len = content.len(), tags = ?tags, "remember tool");

        match self
            .store
            .add(&content, &tags, "agent", None, self.project_tag.as_deref())
            .await
        {
            Ok(memory) => ToolOutput::ok(&call.id, format!("remembered ({})", memory.id)),
            Err(e) => ToolOutput::err(&call.id, format!("failed to save memory: {e}")),
        }
    }
}

/// Search previously remembered facts.
pub struct RecallTool {
    pub store: Arc<dyn MemoryStore>,
}

#[async_trait]
impl Tool for RecallTool {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Search facts saved earlier with `remember`. Returns the best-matching \
         entries, most relevant first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords or phrase to search for"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 10)"
                }
            },
            "required": ["query"],
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
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return ToolOutput::err(&call.id, "missing required parameter 'query'"),
        };
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(10) as usize;

        match self.store.search(&query, limit).await {
            Ok(hits) if hits.is_empty() => ToolOutput::ok(&call.id, "(no matching memories)"),
            Ok(hits) => {
                let body = hits
                    .iter()
                    .map(|m| format!("- [{}] {}", m.created_at.format("%Y-%m-%d"), m.content))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolOutput::ok(&call.id, body)
            }
            Err(e) => ToolOutput::err(&call.id, format!("search failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteMemoryStore;
    use serde_json::json;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "t1".into(), name: "remember".into(), args }
    }

    #[tokio::test]
    async fn remember_then_recall_round_trips() {
        let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open_in_memory().await.unwrap());
        let remember = RememberTool { store: store.clone(), project_tag: Some("proj".into()) };
        let recall = RecallTool { store };

        let out = remember
            .execute(&call(json!({"content": "the project uses tokio for async I/O"})))
            .await;
        assert!(!out.is_error, "{}", out.content);

        let out = recall
            .execute(&ToolCall { id: "t2".into(), name: "recall".into(), args: json!({"query": "tokio"}) })
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("tokio"), "{}", out.content);
    }

    #[tokio::test]
    async fn remember_requires_content() {
        let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open_in_memory().await.unwrap());
        let remember = RememberTool { store, project_tag: None };
        let out = remember.execute(&call(json!({}))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn recall_with_no_matches_is_not_an_error() {
        let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open_in_memory().await.unwrap());
        let recall = RecallTool { store };
        let out = recall
            .execute(&ToolCall { id: "t3".into(), name: "recall".into(), args: json!({"query": "nothing"}) })
            .await;
        assert!(!out.is_error);
        assert!(out.content.contains("no matching"));
    }
}
