// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single persisted fact, grounded to the session and project it was
/// captured in.
///
/// `project_tag` scopes a memory to a project (typically the repository
/// name or absolute root path); memories with no `project_tag` are treated
/// as global and surface in every project's prompt preamble.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Where the fact came from: `"user"`, `"agent"`, or a tool name.
    pub source: String,
    pub session_id: Option<String>,
    pub project_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cross-session persistent memory, independent of any single conversation.
///
/// Implementations must make `search`/`list`/`delete` safe to call
/// concurrently with `add` — the store is shared across agent turns and,
/// via sub-agents, across nested sessions.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert a new memory and return it (with its generated id and
    /// timestamp filled in).
    async fn add(
        &self,
        content: &str,
        tags: &[String],
        source: &str,
        session_id: Option<&str>,
        project_tag: Option<&str>,
    ) -> Result<Memory>;

    /// Full-text search over stored memory content, most relevant first,
    /// capped at `limit` results.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>>;

    /// Most recent memories, newest first, capped at `limit`.
    async fn list(&self, limit: usize) -> Result<Vec<Memory>>;

    /// Remove a memory by id. Errors with `MemoryError::NotFound` if absent.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Render the memories relevant to `project_tag` (plus global memories)
    /// as plain text suitable for embedding in a system prompt, newest
    /// first, truncated to at most `max_bytes` bytes. Returns an empty
    /// string when there is nothing to show — callers should skip wrapping
    /// an empty result in `<persistent_memory>` tags.
    async fn load_for_prompt(&self, project_tag: &str, max_bytes: usize) -> Result<String>;
}
