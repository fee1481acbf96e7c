// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The `task` tool: delegates a sub-goal to an ephemeral sub-agent.
//!
//! Lives in this crate (not `apexion-core`, where the rest of the turn loop
//! lives) to avoid a circular dependency: building a sub-agent requires
//! [`crate::registry::build_tool_registry`], which itself needs to register
//! `TaskTool` in the `Full` profile.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use apexion_config::{AgentConfig, AgentMode, Config};
use apexion_core::{Agent, AgentEvent, AgentRuntimeContext};
use apexion_model::ModelProvider;
use apexion_tools::{ApprovalPolicy, OutputCategory, Tool, ToolCall, ToolOutput};

use crate::context::ToolSetProfile;
use crate::registry::build_tool_registry;

/// Nesting cap: a sub-agent's restricted registry never registers `task`
/// itself, so this only guards against pathological configs or future
/// registry changes that might re-introduce it.
const MAX_DEPTH: usize = 3;

/// `{mode}` argument accepted by the `task` tool, distinct from
/// [`AgentMode`] because the spec's sub-agent vocabulary names what the
/// sub-agent is *for* (exploring, planning, writing code), not which
/// top-level session mode it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubagentMode {
    Explore,
    Plan,
    Code,
}

impl SubagentMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "explore" => Some(Self::Explore),
            "plan" => Some(Self::Plan),
            "code" => Some(Self::Code),
            _ => None,
        }
    }

    fn as_agent_mode(self) -> AgentMode {
        match self {
            Self::Explore => AgentMode::Research,
            Self::Plan => AgentMode::Plan,
            Self::Code => AgentMode::Agent,
        }
    }

    fn is_read_only(self) -> bool {
        !matches!(self, Self::Code)
    }
}

impl std::fmt::Display for SubagentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Explore => "explore",
            Self::Plan => "plan",
            Self::Code => "code",
        };
        f.write_str(s)
    }
}

/// Delegates a prompt to a fresh, isolated sub-agent and returns its final
/// answer as the tool result.
pub struct TaskTool {
    model: Arc<dyn ModelProvider>,
    config: Arc<Config>,
    depth: Arc<AtomicUsize>,
    sub_agent_runtime: AgentRuntimeContext,
}

impl TaskTool {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        config: Arc<Config>,
        depth: Arc<AtomicUsize>,
        sub_agent_runtime: AgentRuntimeContext,
    ) -> Self {
        Self {
            model,
            config,
            depth,
            sub_agent_runtime,
        }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained sub-goal to an isolated sub-agent. Use `explore` to \
         investigate the codebase read-only, `plan` to design an approach read-only, or \
         `code` to make changes. The sub-agent has no memory of this conversation beyond \
         the prompt you give it, so state goals and any relevant findings explicitly."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "mode": {
                    "type": "string",
                    "enum": ["explore", "plan", "code"],
                    "description": "explore/plan are read-only; code can write files and run commands."
                },
                "prompt": {
                    "type": "string",
                    "description": "The self-contained task for the sub-agent to carry out."
                }
            },
            "required": ["mode", "prompt"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn modes(&self) -> &[AgentMode] {
        &[AgentMode::Agent]
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let mode_str = match call.args.get("mode").and_then(|v| v.as_str()) {
            Some(m) => m,
            None => return ToolOutput::err(&call.id, "missing required argument `mode`"),
        };
        let prompt = match call.args.get("prompt").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolOutput::err(&call.id, "missing required argument `prompt`"),
        };
        let mode = match SubagentMode::parse(mode_str) {
            Some(m) => m,
            None => {
                return ToolOutput::err(
                    &call.id,
                    format!("invalid mode `{mode_str}`, expected one of: explore, plan, code"),
                )
            }
        };

        if self.depth.load(Ordering::SeqCst) >= MAX_DEPTH {
            return ToolOutput::err(
                &call.id,
                format!(
                    "sub-agent nesting depth limit ({MAX_DEPTH}) reached; cannot spawn another sub-agent"
                ),
            );
        }
        self.depth.fetch_add(1, Ordering::SeqCst);
        let result = self.run_subagent(mode, prompt).await;
        self.depth.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, format!("sub-agent failed: {e:#}")),
        }
    }
}

impl TaskTool {
    async fn run_subagent(&self, mode: SubagentMode, prompt: &str) -> anyhow::Result<String> {
        let agent_config: Arc<AgentConfig> = Arc::new(self.config.agent.clone());

        let todos = Arc::new(Mutex::new(Vec::new()));
        let profile = ToolSetProfile::SubAgent {
            todos,
            read_only: mode.is_read_only(),
        };

        let mode_lock = Arc::new(Mutex::new(mode.as_agent_mode()));
        let (tool_event_tx, tool_event_rx) = mpsc::channel(64);

        // Inherits the parent's project root / git / CI / AGENTS.md context
        // (and discovered skills/agents/knowledge) so the sub-agent reasons
        // about the same project the parent is working in. Append a note
        // identifying this as a delegated sub-agent so its system prompt
        // reads naturally for the mode it was spawned in.
        let mut sub_runtime = self.sub_agent_runtime.clone();
        let delegation_note = format!(
            "You were delegated this task by a parent agent as a `{mode}` sub-agent. \
             Focus only on the task given to you; you cannot ask the user questions."
        );
        sub_runtime.append_system_prompt = Some(match sub_runtime.append_system_prompt.take() {
            Some(existing) => format!("{existing}\n\n{delegation_note}"),
            None => delegation_note,
        });

        let registry = build_tool_registry(
            &self.config,
            self.model.clone(),
            profile,
            mode_lock.clone(),
            tool_event_tx,
            AgentRuntimeContext::default(),
            // Sub-agents don't share the parent's persistent memory store:
            // they are ephemeral and read-only/scoped to the delegated task.
            None,
            None,
        );

        let max_context_tokens = self
            .model
            .catalog_context_window()
            .unwrap_or(128_000) as usize;

        let mut agent = Agent::new(
            self.model.clone(),
            Arc::new(registry),
            agent_config,
            sub_runtime,
            mode_lock,
            tool_event_rx,
            max_context_tokens,
        );

        // Drain events concurrently with `submit` rather than after it: the
        // channel is bounded, so collecting only once `submit` returns would
        // deadlock as soon as the sub-agent emits more events than fit in
        // the buffer.
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(256);
        let drain = tokio::spawn(async move {
            let mut text = String::new();
            while let Some(event) = rx.recv().await {
                match event {
                    AgentEvent::TextDelta(delta) => text.push_str(&delta),
                    AgentEvent::Aborted { partial_text } => text.push_str(&partial_text),
                    _ => {}
                }
            }
            text
        });

        agent.submit(prompt, tx).await?;
        let text = drain.await.unwrap_or_default();

        Ok(text)
    }
}
