// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Builds an [`Agent`] from a [`Config`], optional [`RuntimeContext`], and a
//! [`ToolSetProfile`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use apexion_config::{AgentMode, Config};
use apexion_core::{Agent, AgentRuntimeContext};
use apexion_memory::{MemoryStore, SqliteMemoryStore};
use apexion_model::ModelProvider;
use apexion_runtime::{CiContext, GitContext};
use apexion_tools::events::ToolEvent;

use crate::context::{RuntimeContext, ToolSetProfile};
use crate::registry::build_tool_registry;

/// Opens the configured memory store and renders its `<persistent_memory>`
/// contents for `project_tag`. Returns `(None, None)` when memory is
/// disabled; logs and degrades to `(None, None)` on open failure rather than
/// failing agent construction — persistent memory is a convenience, not a
/// turn-loop dependency.
async fn load_memory(
    cfg: &Config,
    project_tag: Option<&str>,
) -> (Option<Arc<dyn MemoryStore>>, Option<String>) {
    if !cfg.tools.memory.enabled {
        return (None, None);
    }
    let path = cfg
        .tools
        .memory
        .db_path
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(apexion_memory::default_db_path);

    match SqliteMemoryStore::open(&path).await {
        Ok(store) => {
            let store: Arc<dyn MemoryStore> = Arc::new(store);
            let note = match store
                .load_for_prompt(project_tag.unwrap_or("default"), cfg.tools.memory.max_prompt_bytes)
                .await
            {
                Ok(text) if !text.is_empty() => Some(text),
                Ok(_) => None,
                Err(e) => {
                    warn!("failed to load persistent memory for prompt: {e}");
                    None
                }
            };
            (Some(store), note)
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to open persistent memory store: {e}");
            (None, None)
        }
    }
}

/// Assembles a [`Config`] and environment-detected [`RuntimeContext`] into a
/// ready-to-run [`Agent`], performing skill/subagent/knowledge discovery and
/// wiring the tool registry for a given [`ToolSetProfile`].
pub struct AgentBuilder {
    config: Arc<Config>,
    runtime_ctx: RuntimeContext,
}

impl AgentBuilder {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            runtime_ctx: RuntimeContext::empty(),
        }
    }

    /// Attach environment-detected context (git, CI, project files). Skipped
    /// entirely for callers (like piped single-shot conversations) that have
    /// no project root to walk.
    pub fn with_runtime_context(mut self, ctx: RuntimeContext) -> Self {
        self.runtime_ctx = ctx;
        self
    }

    /// Assemble the full tool registry, runtime context, and model into a
    /// ready-to-run [`Agent`].
    ///
    /// Async because opening the persistent memory store (SQLite) and
    /// rendering its `load_for_prompt` snapshot happen once here, at session
    /// construction, rather than on every turn.
    pub async fn build(self, mode: AgentMode, model: Arc<dyn ModelProvider>, profile: ToolSetProfile) -> Agent {
        let project_root = self.runtime_ctx.project_root.clone();

        let skills = apexion_runtime::discover_skills(project_root.as_deref());
        let agents = apexion_runtime::discover_agents(project_root.as_deref());
        let knowledge = apexion_runtime::discover_knowledge(project_root.as_deref());
        let knowledge_drift_note = match (knowledge.is_empty(), project_root.as_deref()) {
            (false, Some(root)) => {
                let warnings = apexion_runtime::check_knowledge_drift(root, &knowledge);
                apexion_runtime::format_drift_warnings(&warnings)
            }
            _ => None,
        };

        let project_tag = project_root
            .as_deref()
            .and_then(|r| r.file_name())
            .map(|n| n.to_string_lossy().to_string());
        let (memory_store, persistent_memory_note) = load_memory(&self.config, project_tag.as_deref()).await;

        let runtime = AgentRuntimeContext {
            project_root,
            git_context_note: self
                .runtime_ctx
                .git_context
                .as_ref()
                .and_then(GitContext::to_prompt_section),
            ci_context_note: self
                .runtime_ctx
                .ci_context
                .as_ref()
                .and_then(CiContext::to_prompt_section),
            project_context_file: self.runtime_ctx.project_context_file,
            append_system_prompt: self.runtime_ctx.append_system_prompt,
            system_prompt_override: self.runtime_ctx.system_prompt_override,
            skills: apexion_runtime::SharedSkills::new(skills),
            agents: apexion_runtime::SharedAgents::new(agents),
            knowledge: apexion_runtime::SharedKnowledge::new(knowledge),
            knowledge_drift_note,
            persistent_memory_note,
        };

        let mode_lock: Arc<Mutex<AgentMode>> = Arc::new(Mutex::new(mode));
        let (tool_event_tx, tool_event_rx) = tokio::sync::mpsc::channel::<ToolEvent>(64);

        let registry = build_tool_registry(
            &self.config,
            model.clone(),
            profile,
            mode_lock.clone(),
            tool_event_tx,
            runtime.clone(),
            memory_store,
            project_tag,
        );

        let max_context_tokens = model.catalog_context_window().unwrap_or(128_000) as usize;

        Agent::new(
            model,
            Arc::new(registry),
            Arc::new(self.config.agent.clone()),
            runtime,
            mode_lock,
            tool_event_rx,
            max_context_tokens,
        )
    }
}
