// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Centralised tool-registry builder.
//!
//! All callers (CI runner, conversation runner, and sub-agents via
//! [`crate::task_tool::TaskTool`]) use `build_tool_registry` with the
//! appropriate [`ToolSetProfile`] instead of each inlining their own
//! registration loop, so the tool set never drifts between a top-level
//! session and a delegated sub-agent.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use apexion_config::{AgentMode, Config};
use apexion_memory::{MemoryStore, RecallTool, RememberTool};
use apexion_model::ModelProvider;
use apexion_tools::{
    events::ToolEvent, AskQuestionTool, DeleteFileTool, DocContextTool, EditFileTool,
    FindFileTool, GrepTool, ListDirTool, LoadSkillTool, ReadFileTool, ReadImageTool,
    ReadLintsTool, RepoMapTool, RunTerminalCommandTool, SearchCodebaseTool, SwitchModeTool,
    SymbolNavTool, TodoWriteTool, ToolRegistry, UpdateMemoryTool, WebFetchTool, WebSearchTool,
    WriteTool,
};

use apexion_core::AgentRuntimeContext;

use crate::context::ToolSetProfile;
use crate::task_tool::TaskTool;

/// Build a [`ToolRegistry`] populated according to the given `profile`.
///
/// ### Shared-state parameters
///
/// * `mode_lock` — the **same** `Arc` passed to `Agent::new()`. `SwitchModeTool`
///   holds a clone so mode changes are immediately visible to the agent loop.
/// * `tool_event_tx` — the sending half of the channel whose receiving end is
///   passed to `Agent::new()`. `TodoWriteTool` and `SwitchModeTool` send
///   events here.
/// * `sub_agent_runtime` — inherited by `TaskTool` sub-agents (project root,
///   CI/git notes, `AGENTS.md`, discovered skills/agents/knowledge). Only
///   meaningful for the `Full` profile (where `task` is registered); pass
///   `AgentRuntimeContext::default()` for `SubAgent`.
pub fn build_tool_registry(
    cfg: &Config,
    model: Arc<dyn ModelProvider>,
    profile: ToolSetProfile,
    mode_lock: Arc<Mutex<AgentMode>>,
    tool_event_tx: mpsc::Sender<ToolEvent>,
    sub_agent_runtime: AgentRuntimeContext,
    memory_store: Option<Arc<dyn MemoryStore>>,
    project_tag: Option<String>,
) -> ToolRegistry {
    match profile {
        ToolSetProfile::Full { question_tx, todos, task_depth } => {
            let mut reg = ToolRegistry::new();
            register_read_tools(&mut reg, cfg, sub_agent_runtime.skills.get());
            register_write_tools(&mut reg, cfg);
            register_memory_tools(&mut reg, memory_store.clone(), project_tag.clone());

            match question_tx {
                Some(tx) => reg.register(AskQuestionTool::new_tui(tx)),
                None => reg.register(AskQuestionTool::new()),
            }
            reg.register(TodoWriteTool::new(todos, tool_event_tx.clone()));
            reg.register(SwitchModeTool::new(mode_lock, tool_event_tx));
            reg.register(TaskTool::new(
                model,
                Arc::new(cfg.clone()),
                task_depth,
                sub_agent_runtime,
            ));

            reg
        }

        ToolSetProfile::SubAgent { todos, read_only } => {
            let mut reg = ToolRegistry::new();
            register_read_tools(&mut reg, cfg, sub_agent_runtime.skills.get());
            if !read_only {
                register_write_tools(&mut reg, cfg);
            }
            register_memory_tools(&mut reg, memory_store, project_tag);

            reg.register(AskQuestionTool::new());
            reg.register(TodoWriteTool::new(todos, tool_event_tx.clone()));
            reg.register(SwitchModeTool::new(mode_lock, tool_event_tx));
            // `task` intentionally omitted: the restricted sub-registry
            // built for a sub-agent never registers the sub-agent-spawning
            // tool itself, which is the primary guard against unbounded
            // nesting (the depth counter in `TaskTool` is the backstop).

            reg
        }
    }
}

/// Registers `remember`/`recall` when the persistent memory store is
/// available (disabled via config, or the store failed to open, yields
/// `None` and both tools are simply omitted from this turn's schema list).
fn register_memory_tools(
    reg: &mut ToolRegistry,
    memory_store: Option<Arc<dyn MemoryStore>>,
    project_tag: Option<String>,
) {
    if let Some(store) = memory_store {
        reg.register(RememberTool { store: store.clone(), project_tag });
        reg.register(RecallTool { store });
    }
}

fn register_read_tools(
    reg: &mut ToolRegistry,
    cfg: &Config,
    skills: Arc<[apexion_runtime::SkillInfo]>,
) {
    reg.register(ReadFileTool);
    reg.register(ReadImageTool);
    reg.register(ListDirTool);
    reg.register(FindFileTool);
    reg.register(GrepTool);
    reg.register(SearchCodebaseTool);
    reg.register(ReadLintsTool);
    reg.register(DocContextTool);
    reg.register(RepoMapTool);
    reg.register(SymbolNavTool);
    reg.register(LoadSkillTool::new(skills));
    reg.register(WebFetchTool);
    reg.register(WebSearchTool {
        api_key: cfg.tools.web.search.api_key.clone(),
    });
    reg.register(UpdateMemoryTool {
        memory_file: cfg.tools.memory.memory_file.clone(),
    });
}

fn register_write_tools(reg: &mut ToolRegistry, cfg: &Config) {
    reg.register(WriteTool);
    reg.register(EditFileTool);
    reg.register(DeleteFileTool);
    reg.register(RunTerminalCommandTool {
        timeout_secs: cfg.tools.timeout_secs,
    });
}
