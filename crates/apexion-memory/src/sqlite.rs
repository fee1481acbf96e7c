// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::store::{Memory, MemoryStore};

/// SQLite + FTS5-backed [`MemoryStore`].
///
/// `rusqlite` is synchronous, so every operation runs on a blocking pool
/// thread via `spawn_blocking` and the connection is shared behind a mutex
/// — the same shape used for session persistence elsewhere in this
/// workspace's ecosystem, adapted here for the memory contract.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open (creating if absent) the memory database at `path` and apply
    /// the schema. `path` should usually come from
    /// `apexion_config::MemoryConfig::db_path` or the
    /// `~/.local/share/apexion/memory.db` default.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).ok();
                }
            }
            let conn = Connection::open(&path)?;
            migrate(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| MemoryError::Join(e.to_string()))?
        .map_err(|e| MemoryError::Db(e.to_string()))?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// In-memory store, useful for tests and ephemeral sub-agents.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio::task::spawn_blocking(|| -> rusqlite::Result<Connection> {
            let conn = Connection::open_in_memory()?;
            migrate(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| MemoryError::Join(e.to_string()))?
        .map_err(|e| MemoryError::Db(e.to_string()))?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn run_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| MemoryError::Join(e.to_string()))?
        .map_err(|e| MemoryError::Db(e.to_string()))
    }
}

fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            rowid       INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT UNIQUE NOT NULL,
            content     TEXT NOT NULL,
            tags        TEXT NOT NULL,
            source      TEXT NOT NULL,
            session_id  TEXT,
            project_tag TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_project_tag ON memories(project_tag);
        CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at);
        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(content, tags);",
    )
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let created_at_str: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        tags,
        source: row.get("source")?,
        session_id: row.get("session_id")?,
        project_tag: row.get("project_tag")?,
        created_at,
    })
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn add(
        &self,
        content: &str,
        tags: &[String],
        source: &str,
        session_id: Option<&str>,
        project_tag: Option<&str>,
    ) -> Result<Memory> {
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            tags: tags.to_vec(),
            source: source.to_string(),
            session_id: session_id.map(str::to_string),
            project_tag: project_tag.map(str::to_string),
            created_at: Utc::now(),
        };
        let m = memory.clone();
        let tags_json = serde_json::to_string(&m.tags)
            .map_err(|e| MemoryError::Codec(e.to_string()))?;

        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO memories (id, content, tags, source, session_id, project_tag, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    m.id,
                    m.content,
                    tags_json,
                    m.source,
                    m.session_id,
                    m.project_tag,
                    m.created_at.to_rfc3339(),
                ],
            )?;
            let rowid = conn.last_insert_rowid();
            conn.execute(
                "INSERT INTO memories_fts(rowid, content, tags) VALUES (?1, ?2, ?3)",
                params![rowid, m.content, tags_json],
            )?;
            Ok(())
        })
        .await?;

        Ok(memory)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Memory>> {
        let query = fts_escape(query);
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.content, m.tags, m.source, m.session_id, m.project_tag, m.created_at
                 FROM memories_fts AS f
                 JOIN memories AS m ON f.rowid = m.rowid
                 WHERE memories_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![query, limit as i64], row_to_memory)?;
            rows.collect::<rusqlite::Result<Vec<Memory>>>()
        })
        .await
    }

    async fn list(&self, limit: usize) -> Result<Vec<Memory>> {
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content, tags, source, session_id, project_tag, created_at
                 FROM memories ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_memory)?;
            rows.collect::<rusqlite::Result<Vec<Memory>>>()
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let deleted = self
            .run_blocking(move |conn| {
                let rowid: Option<i64> = conn
                    .query_row("SELECT rowid FROM memories WHERE id = ?1", params![id], |r| r.get(0))
                    .optional()?;
                let Some(rowid) = rowid else { return Ok(false) };
                conn.execute("DELETE FROM memories WHERE rowid = ?1", params![rowid])?;
                conn.execute("DELETE FROM memories_fts WHERE rowid = ?1", params![rowid])?;
                Ok(true)
            })
            .await?;

        if deleted {
            Ok(())
        } else {
            Err(MemoryError::NotFound(id.clone()))
        }
    }

    async fn load_for_prompt(&self, project_tag: &str, max_bytes: usize) -> Result<String> {
        let project_tag = project_tag.to_string();
        let memories = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, content, tags, source, session_id, project_tag, created_at
                     FROM memories
                     WHERE project_tag = ?1 OR project_tag IS NULL
                     ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![project_tag], row_to_memory)?;
                rows.collect::<rusqlite::Result<Vec<Memory>>>()
            })
            .await?;

        let mut out = String::new();
        for memory in &memories {
            let line = format!("- {}\n", memory.content.trim());
            if out.len() + line.len() > max_bytes {
                break;
            }
            out.push_str(&line);
        }
        Ok(out.trim_end().to_string())
    }
}

/// FTS5 `MATCH` treats bare punctuation as syntax. Quote the whole query so
/// free-form user text (which may contain `-`, `"`, `:`) is always treated
/// as a literal phrase search rather than raising a syntax error.
fn fts_escape(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}
