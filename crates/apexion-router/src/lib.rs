// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool routing: intent classification, capability-aware candidate scoring,
//! deterministic fastpaths, a per-tool circuit breaker, call repair and
//! fallback chains, and the doom-loop / failure-loop detectors that bound a
//! turn's tool-call budget.

mod capability;
mod detectors;
mod fastpath;
mod intent;
mod plan;
mod repair;
mod score;

pub use capability::{capability_for, Cost, Risk, SemanticLevel, ToolCapability};
pub use detectors::{CallShape, DoomLoopDetector, FailureLoopDetector, LoopVerdict};
pub use fastpath::detect_fastpath;
pub use health::{CircuitStatus, HealthRegistry, ToolHealthState};
pub use intent::{classify, Intent, ResearchFocus};
pub use plan::{FastpathPlan, FilteredTool, RoutePlan, ScoredTool, ShadowPlan};
pub use repair::{
    prefix_repaired, repair_tool_args, repair_tool_args_with_actions, repair_tool_name,
    REPAIR_PREFIX,
};
pub use score::{build_plan, RouteInput};

pub mod health;

use std::sync::Arc;

use apexion_config::ToolRoutingConfig;
use apexion_tools::{ToolCall, ToolOutput, ToolRegistry};

/// Outcome of routing + dispatching one model-issued tool call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// The tool actually executed, after name repair (may differ from the
    /// name the model asked for).
    pub resolved_name: String,
    pub output: ToolOutput,
    /// `true` when the call only succeeded after a name and/or argument
    /// rewrite — the caller should prefix the transcript entry accordingly.
    pub was_repaired: bool,
    /// `true` when the primary tool's circuit was open and a degrade-policy
    /// fallback tool was executed instead.
    pub used_fallback: bool,
}

/// Ties together intent classification, candidate scoring, the circuit
/// breaker, and call repair into a single per-turn entry point.
///
/// Holds no session state itself beyond the health registry — callers own
/// the conversation and loop detectors, and decide what `build_plan`'s
/// output means for exposing tools to the next model call.
pub struct Router {
    config: ToolRoutingConfig,
    health: HealthRegistry,
}

impl Router {
    pub fn new(config: ToolRoutingConfig) -> Self {
        let health = HealthRegistry::new(config.circuit_breaker.clone());
        Self { config, health }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Classify the turn's intent and build a candidate plan. `text` is the
    /// user's latest message; `available_tools` is the full registered tool
    /// list for the current agent mode.
    pub fn plan(
        &self,
        text: &str,
        has_image: bool,
        model_supports_images: bool,
        available_tools: &[String],
    ) -> RoutePlan {
        let (intent, focus) = classify(text, has_image);
        let input = RouteInput {
            intent,
            focus,
            has_image,
            model_supports_images,
            available_tools,
        };
        let mut plan = build_plan(&input, &self.config);
        if self.config.deterministic_fastpath {
            if let Some(fp) = detect_fastpath(text) {
                if fp.confidence >= self.config.fastpath_confidence {
                    plan.fastpath = Some(fp);
                }
            }
        }
        plan
    }

    /// Execute one model-issued tool call, applying the circuit breaker,
    /// name/argument repair, and degrade-policy fallback chain in turn.
    ///
    /// Pipeline (per the tool-execution contract this crate implements; each
    /// repair/fallback step is gated by `config.enable_repair` /
    /// `config.enable_fallback`):
    /// 1. Name repair: resolve `call.name` against `registry`, trying
    ///    aliases/MCP naming if the exact name isn't registered.
    /// 2. Arg repair: rewrite stray argument keys to the resolved tool's
    ///    canonical parameter names.
    /// 3. Circuit check + fallback chain: try the resolved tool, then its
    ///    `degrade_policy` candidates in order, skipping any whose circuit
    ///    is open and re-running arg repair for each candidate's own
    ///    schema; on a real execution failure, advance to the next
    ///    candidate too. If every candidate's circuit is open, return a
    ///    synthetic `is_error` result describing the remaining cooldown
    ///    instead of actually invoking anything.
    /// 4. Record success/failure against whichever tool was actually (or
    ///    would have been) invoked.
    /// 5. Prefix `[Tool repair]` onto a successful result that only
    ///    succeeded after a rename, arg rewrite, or fallback hop, listing
    ///    each action taken so the model sees what changed.
    pub async fn dispatch(&self, registry: &ToolRegistry, call: &ToolCall) -> DispatchOutcome {
        let known = registry.names();
        let mut was_repaired = false;
        let mut actions: Vec<String> = Vec::new();

        let resolved_name = if self.config.enable_repair {
            match repair_tool_name(&call.name, &known) {
                Some(n) if n == call.name => n,
                Some(n) => {
                    was_repaired = true;
                    actions.push(format!("renamed `{}` -> `{n}`", call.name));
                    n
                }
                None => call.name.clone(),
            }
        } else {
            call.name.clone()
        };

        let mut candidates = vec![resolved_name.clone()];
        if self.config.enable_fallback {
            candidates.extend(
                capability_for(&resolved_name)
                    .degrade_policy
                    .iter()
                    .map(|s| s.to_string()),
            );
        }

        let last_idx = candidates.len() - 1;
        for (i, name) in candidates.iter().enumerate() {
            let used_fallback = i > 0;
            if registry.get(name).is_none() {
                if i == last_idx {
                    break;
                }
                continue;
            }
            if used_fallback {
                actions.push(format!("fallback to `{name}`"));
            }

            if let CircuitStatus::Open { remaining_secs } = self.health.check(name) {
                if i < last_idx {
                    continue;
                }
                // Every candidate (including the primary, if it was the only
                // one) is circuit-open: don't actually invoke it, report the
                // cooldown directly.
                let output = ToolOutput::err(
                    &call.id,
                    format!(
                        "tool `{name}` temporarily disabled by circuit breaker (cooldown {remaining_secs}s)"
                    ),
                );
                return DispatchOutcome {
                    resolved_name: name.clone(),
                    output,
                    was_repaired,
                    used_fallback,
                };
            }

            let exec_args = if self.config.enable_repair {
                let (rewritten, arg_actions) = repair_tool_args_with_actions(name, &call.args);
                actions.extend(arg_actions);
                rewritten
            } else {
                call.args.clone()
            };
            if used_fallback || exec_args != call.args {
                was_repaired = true;
            }

            let exec_call = ToolCall {
                id: call.id.clone(),
                name: name.clone(),
                args: exec_args,
            };
            let mut output = registry.execute(&exec_call).await;

            if output.is_error {
                self.health.record_failure(name, &output.content);
                // A real execution failure (not a circuit trip) still moves
                // on to the next fallback candidate, per the degrade chain.
                if i < last_idx {
                    continue;
                }
            } else {
                self.health.record_success(name);
            }

            if was_repaired && !output.is_error {
                output.content = prefix_repaired(&output.content, &actions);
            }

            return DispatchOutcome {
                resolved_name: name.clone(),
                output,
                was_repaired,
                used_fallback,
            };
        }

        // No candidate was registered at all — surface the registry's own
        // "unknown tool" error for the originally resolved name.
        let exec_call = ToolCall {
            id: call.id.clone(),
            name: resolved_name.clone(),
            args: call.args.clone(),
        };
        let output = registry.execute(&exec_call).await;
        DispatchOutcome {
            resolved_name,
            output,
            was_repaired,
            used_fallback: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apexion_config::{CircuitBreakerConfig, RouterStrategy};
    use apexion_tools::{GrepTool, ReadFileTool};
    use serde_json::json;

    fn cfg() -> ToolRoutingConfig {
        ToolRoutingConfig {
            enabled: true,
            strategy: RouterStrategy::Hybrid,
            max_candidates: 6,
            shadow_eval: false,
            shadow_sample_rate: 0.0,
            deterministic_fastpath: true,
            fastpath_confidence: 0.85,
            enable_repair: true,
            enable_fallback: true,
            debug: false,
            circuit_breaker: CircuitBreakerConfig { enabled: true, fail_threshold: 3, cooldown_sec: 120 },
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(ReadFileTool);
        r.register(GrepTool);
        r
    }

    #[tokio::test]
    async fn dispatch_repairs_alias_name_and_args() {
        let router = Router::new(cfg());
        let reg = registry();
        let call = ToolCall { id: "1".into(), name: "cat".into(), args: json!({"path": "/nonexistent"}) };
        let outcome = router.dispatch(&reg, &call).await;
        assert_eq!(outcome.resolved_name, "read_file");
        assert!(outcome.was_repaired);
    }

    #[tokio::test]
    async fn dispatch_exact_name_no_repair_flag_on_clean_call() {
        let router = Router::new(cfg());
        let reg = registry();
        let call = ToolCall {
            id: "1".into(),
            name: "grep".into(),
            args: json!({"pattern": "fn main", "path": "."}),
        };
        let outcome = router.dispatch(&reg, &call).await;
        assert_eq!(outcome.resolved_name, "grep");
        assert!(!outcome.was_repaired);
    }

    #[tokio::test]
    async fn repeated_failures_open_circuit_and_health_reflects_it() {
        let router = Router::new(cfg());
        let reg = registry();
        let bad_call = |id: &str| ToolCall { id: id.into(), name: "read_file".into(), args: json!({}) };
        for i in 0..3 {
            router.dispatch(&reg, &bad_call(&i.to_string())).await;
        }
        assert!(matches!(router.health().check("read_file"), CircuitStatus::Open { .. }));
    }

    #[test]
    fn plan_classifies_and_scores_for_debug_intent() {
        let router = Router::new(cfg());
        let tools = vec!["read_file".to_string(), "grep".to_string(), "run_terminal_command".to_string()];
        let plan = router.plan("why is this test failing with a panic", false, true, &tools);
        assert_eq!(plan.intent, Intent::Debug);
        assert!(!plan.primary.is_empty());
    }

    #[test]
    fn plan_detects_fastpath_for_symbol_lookup() {
        let router = Router::new(cfg());
        let tools = vec!["symbol_nav".to_string()];
        let plan = router.plan("trace call chain for runAgentLoop", false, true, &tools);
        assert!(plan.fastpath.is_some());
        assert_eq!(plan.fastpath.unwrap().tool, "symbol_nav");
    }

    #[tokio::test]
    async fn open_circuit_with_no_fallback_returns_synthetic_cooldown_error() {
        // read_file has an empty degrade_policy, so once its circuit trips
        // there is nothing to fall back to — the breaker must short-circuit
        // the call entirely rather than actually invoking the tool again.
        let mut c = cfg();
        c.circuit_breaker.fail_threshold = 1;
        let router = Router::new(c);
        let reg = registry();
        let bad = ToolCall { id: "1".into(), name: "read_file".into(), args: json!({}) };
        router.dispatch(&reg, &bad).await; // trips the circuit
        let second = router.dispatch(&reg, &bad).await;
        assert!(second.output.is_error);
        assert!(second.output.content.contains("circuit breaker"));
        assert!(second.output.content.contains("read_file"));
    }

    /// A fake `grep` standing in for the real one so the fallback chain can
    /// be exercised deterministically, without depending on an `rg` binary.
    struct FakeGrep;
    #[async_trait::async_trait]
    impl apexion_tools::Tool for FakeGrep {
        fn name(&self) -> &str {
            "grep"
        }
        fn description(&self) -> &str {
            "fake grep"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        fn default_policy(&self) -> apexion_tools::ApprovalPolicy {
            apexion_tools::ApprovalPolicy::Auto
        }
        async fn execute(&self, call: &ToolCall) -> apexion_tools::ToolOutput {
            apexion_tools::ToolOutput::ok(&call.id, "fake grep matched")
        }
    }

    fn registry_with_fake_grep() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(ReadFileTool);
        r.register(FakeGrep);
        r
    }

    #[tokio::test]
    async fn fallback_chain_reaches_a_registered_alternative() {
        // `symbol_nav` is never registered in this test registry, so the
        // fallback chain (symbol_nav -> grep -> read_file) must skip it and
        // land on `grep`, applying grep's own arg repair along the way.
        let router = Router::new(cfg());
        let reg = registry_with_fake_grep();
        let call = ToolCall {
            id: "1".into(),
            name: "symbol_nav".into(),
            args: json!({"query": "runAgentLoop"}),
        };
        let outcome = router.dispatch(&reg, &call).await;
        assert_eq!(outcome.resolved_name, "grep");
        assert!(outcome.used_fallback);
        assert!(!outcome.output.is_error);
        assert!(outcome.output.content.starts_with("[Tool repair]"));
    }

    #[tokio::test]
    async fn disabled_fallback_surfaces_unknown_tool_error() {
        let mut c = cfg();
        c.enable_fallback = false;
        let router = Router::new(c);
        let reg = registry_with_fake_grep();
        let call = ToolCall {
            id: "1".into(),
            name: "symbol_nav".into(),
            args: json!({"query": "runAgentLoop"}),
        };
        let outcome = router.dispatch(&reg, &call).await;
        assert!(outcome.output.is_error);
        assert!(outcome.output.content.contains("unknown tool"));
    }
}
