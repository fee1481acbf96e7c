// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-session persistent memory.
//!
//! Implements the Memory Store external collaborator: `add`/`search`/`list`/
//! `delete` over durably stored facts, plus `load_for_prompt` to surface the
//! facts relevant to a project in a new session's system prompt. Backed by
//! SQLite + FTS5 (BM25 ranking); see [`sqlite::SqliteMemoryStore`].

mod error;
mod sqlite;
mod store;
mod tool;

pub use error::{MemoryError, Result};
pub use sqlite::SqliteMemoryStore;
pub use store::{Memory, MemoryStore};
pub use tool::{RecallTool, RememberTool};

use std::path::PathBuf;

/// Default database location: `~/.local/share/apexion/memory.db`, falling
/// back to `$TMPDIR/apexion/memory.db` when no home directory is resolvable
/// (matches the event-log directory resolution used elsewhere in this
/// workspace).
pub fn default_db_path() -> PathBuf {
    if let Some(dir) = dirs::data_local_dir() {
        return dir.join("apexion").join("memory.db");
    }
    std::env::temp_dir().join("apexion").join("memory.db")
}
