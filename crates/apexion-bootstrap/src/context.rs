// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Runtime context types for agent construction.
//!
//! [`RuntimeContext`] holds environment-detected information (project root,
//! git state, CI environment) that is not part of the config file schema.
//!
//! [`ToolSetProfile`] selects which tools to register, and carries the
//! shared state needed by stateful tools (todos, mode lock, task depth).

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use apexion_runtime::{CiContext, GitContext};
use apexion_tools::{events::TodoItem, QuestionRequest};

// ─── RuntimeContext ───────────────────────────────────────────────────────────

/// Environment-detected context for an agent session.
///
/// Separate from [`apexion_config::AgentConfig`] (which holds only
/// config-file fields) so that "what the user configured" and "what we
/// found at runtime" stay cleanly separated.
#[derive(Debug, Default, Clone)]
pub struct RuntimeContext {
    /// Absolute path to the project root (detected from `.git` walk-up).
    pub project_root: Option<PathBuf>,
    /// Live git metadata (branch, commit, dirty state).
    pub git_context: Option<GitContext>,
    /// CI environment metadata.
    pub ci_context: Option<CiContext>,
    /// Contents of `.apexion/context.md`, `AGENTS.md`, or `CLAUDE.md`.
    pub project_context_file: Option<String>,
    /// Text appended after the default system prompt's guidelines section.
    pub append_system_prompt: Option<String>,
    /// Full system prompt override (from `--system-prompt-file`).
    pub system_prompt_override: Option<String>,
}

impl RuntimeContext {
    /// Create with auto-detected project, git, and CI context.
    pub fn auto_detect() -> Self {
        let project_root = apexion_runtime::find_project_root().ok();
        let git_context = project_root
            .as_ref()
            .map(|r| apexion_runtime::collect_git_context(r));
        let ci_context = Some(apexion_runtime::detect_ci_context());
        let project_context_file = project_root
            .as_ref()
            .and_then(|r| apexion_runtime::load_project_context_file(r));

        Self {
            project_root,
            git_context,
            ci_context,
            project_context_file,
            append_system_prompt: None,
            system_prompt_override: None,
        }
    }

    /// Create an empty context (no project/git/CI detection). Used by
    /// callers with no project root to walk, e.g. piped single-shot input.
    pub fn empty() -> Self {
        Self::default()
    }
}

// ─── ToolSetProfile ───────────────────────────────────────────────────────────

/// Selects which tool set to register and carries the caller-owned shared
/// state that stateful tools require.
///
/// `mode_lock` and the tool-event channel are intentionally **not** part of
/// this enum — [`crate::AgentBuilder::build`] creates them, wires them into
/// the registry, and passes the same instances to `Agent::new()` so that
/// `SwitchModeTool` and `TodoWriteTool` events are correctly observed by the
/// agent loop.
pub enum ToolSetProfile {
    /// Full tool set for a top-level session (TUI and headless/CI alike).
    /// `--mode` gates which tools are exposed to the model; this profile
    /// always registers the complete set, including `task`.
    ///
    /// `question_tx`: when `Some`, `ask_question` routes to the TUI; when
    /// `None`, it falls back to stdin.
    Full {
        question_tx: Option<mpsc::Sender<QuestionRequest>>,
        todos: Arc<Mutex<Vec<TodoItem>>>,
        /// Shared nesting-depth counter handed to the `task` tool so
        /// sibling and nested sub-agents all count against the same cap.
        task_depth: Arc<AtomicUsize>,
    },

    /// Sub-agent tool set (`Full` minus `task`, to bound nesting at the
    /// source rather than relying solely on the depth counter).
    ///
    /// `read_only`: `true` for `explore`/`plan` sub-agents (no write or
    /// shell tools registered at all); `false` for `code` sub-agents.
    SubAgent {
        todos: Arc<Mutex<Vec<TodoItem>>>,
        read_only: bool,
    },
}
