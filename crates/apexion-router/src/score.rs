// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use apexion_config::{RouterStrategy, ToolRoutingConfig};

use crate::capability::{capability_for, Cost, Risk, SemanticLevel};
use crate::intent::{Intent, ResearchFocus};
use crate::plan::{FilteredTool, RoutePlan, ScoredTool, ShadowPlan};

/// Everything the scorer needs to know about the current turn.
#[derive(Debug, Clone)]
pub struct RouteInput<'a> {
    pub intent: Intent,
    pub focus: Option<ResearchFocus>,
    pub has_image: bool,
    pub model_supports_images: bool,
    pub available_tools: &'a [String],
}

/// `{allow_first, block_first}` tool-name sets applied before scoring.
struct FirstStepPolicy {
    allow_first: &'static [&'static str],
    block_first: &'static [&'static str],
}

fn first_step_policy(intent: Intent, focus: Option<ResearchFocus>) -> FirstStepPolicy {
    match (intent, focus) {
        (Intent::Git, _) => FirstStepPolicy {
            allow_first: &["run_terminal_command"],
            block_first: &["delete_file"],
        },
        (Intent::Debug, _) => FirstStepPolicy {
            allow_first: &["run_terminal_command", "read_lints"],
            block_first: &[],
        },
        (Intent::Codebase, _) => FirstStepPolicy {
            allow_first: &["read_file", "grep", "symbol_nav", "repo_map"],
            block_first: &["delete_file"],
        },
        (Intent::Research, Some(ResearchFocus::Docs)) => FirstStepPolicy {
            allow_first: &["doc_context"],
            block_first: &[],
        },
        (Intent::Research, Some(ResearchFocus::Github)) => FirstStepPolicy {
            allow_first: &["web_fetch"],
            block_first: &[],
        },
        (Intent::Research, _) => FirstStepPolicy {
            allow_first: &["web_search", "doc_context"],
            block_first: &[],
        },
        (Intent::Vision, _) => FirstStepPolicy {
            allow_first: &["read_image"],
            block_first: &[],
        },
        (Intent::System, _) => FirstStepPolicy {
            allow_first: &["run_terminal_command"],
            block_first: &["delete_file"],
        },
    }
}

fn semantic_bonus(level: SemanticLevel) -> f32 {
    match level {
        SemanticLevel::High => 1.5,
        SemanticLevel::Medium => 0.75,
        SemanticLevel::Primitive => 0.0,
    }
}

fn cost_adjustment(cost: Cost) -> f32 {
    match cost {
        Cost::Low => 0.3,
        Cost::Medium => 0.0,
        Cost::High => -0.5,
    }
}

fn intent_boost(tool_name: &str, intent: Intent, focus: Option<ResearchFocus>) -> f32 {
    match intent {
        Intent::Vision if tool_name == "read_image" => 3.0,
        Intent::Research if focus == Some(ResearchFocus::Docs) && tool_name == "doc_context" => 2.0,
        Intent::Research if focus == Some(ResearchFocus::Github) && tool_name == "web_fetch" => 2.0,
        Intent::Research if tool_name == "web_search" => 1.0,
        Intent::Debug | Intent::System if tool_name == "run_terminal_command" => 1.5,
        _ => 0.0,
    }
}

/// Base scorer shared by both strategies: rank-in-preferred-list is folded
/// into the domain-match bonus (a tool whose capability table lists the
/// active intent among its domains is "preferred" for this turn).
fn score_base(tool_name: &str, intent: Intent, focus: Option<ResearchFocus>) -> f32 {
    let cap = capability_for(tool_name);
    let mut score = 1.0;
    if cap.domains.contains(&intent) {
        score += 2.0;
    }
    score += semantic_bonus(cap.semantic_level);
    if cap.risk == Risk::Read {
        score += 0.5;
    }
    score += cost_adjustment(cap.cost);
    score += intent_boost(tool_name, intent, focus);
    score
}

/// Legacy (v1) scorer: base score only, no capability gate beyond the hard
/// gate applied uniformly to both strategies.
fn score_v1(tool_name: &str, intent: Intent, focus: Option<ResearchFocus>) -> f32 {
    score_base(tool_name, intent, focus)
}

/// `capability_v2` scorer: layers a read-only preference penalty for
/// mutating tools when the turn's intent favors non-destructive exploration.
fn score_v2(tool_name: &str, intent: Intent, focus: Option<ResearchFocus>) -> f32 {
    let cap = capability_for(tool_name);
    let mut score = score_base(tool_name, intent, focus);
    let prefers_read_only = matches!(intent, Intent::Research | Intent::Codebase);
    if prefers_read_only && matches!(cap.risk, Risk::Write | Risk::Execute) {
        score -= 1.0;
    }
    score
}

/// Hard gate: drop tools whose `requires` set names a capability this turn
/// does not have.  Currently the only modeled requirement is image input.
fn hard_gate(input: &RouteInput) -> (Vec<String>, Vec<FilteredTool>) {
    let mut kept = Vec::new();
    let mut filtered = Vec::new();
    for name in input.available_tools {
        let cap = capability_for(name);
        if cap.requires.contains(&"model.image_input") && !input.model_supports_images {
            filtered.push(FilteredTool {
                name: name.clone(),
                reason: "requires model.image_input, which this model does not support".into(),
            });
            continue;
        }
        kept.push(name.clone());
    }
    (kept, filtered)
}

/// Rank `names` by `scorer`, tie-breaking lexicographically so permuting the
/// input tool list never changes the output order (router determinism).
fn rank(names: &[String], scorer: impl Fn(&str) -> f32) -> Vec<ScoredTool> {
    let mut scored: Vec<ScoredTool> = names
        .iter()
        .map(|n| ScoredTool {
            name: n.clone(),
            score: scorer(n),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    scored
}

/// Apply the first-step policy to an already-ranked list: drop `block_first`
/// tools, and if no `allow_first` tool already leads, promote the
/// highest-ranked allowed tool to the front.
///
/// Returns the (possibly reordered) list, the tools dropped by `block_first`,
/// and an optional reason code describing which policy branch fired.
fn apply_first_step_policy(
    ranked: Vec<ScoredTool>,
    policy: &FirstStepPolicy,
) -> (Vec<ScoredTool>, Vec<FilteredTool>, Option<String>) {
    let mut blocked = Vec::new();
    let mut kept: Vec<ScoredTool> = Vec::new();
    for st in ranked {
        if policy.block_first.contains(&st.name.as_str()) {
            blocked.push(FilteredTool {
                name: st.name,
                reason: "first-step policy disallow".into(),
            });
        } else {
            kept.push(st);
        }
    }

    if policy.allow_first.is_empty() {
        return (kept, blocked, None);
    }

    let leader_is_allowed = kept
        .first()
        .map(|st| policy.allow_first.contains(&st.name.as_str()))
        .unwrap_or(true);
    if leader_is_allowed {
        return (kept, blocked, None);
    }

    if let Some(pos) = kept
        .iter()
        .position(|st| policy.allow_first.contains(&st.name.as_str()))
    {
        let promoted = kept.remove(pos);
        kept.insert(0, promoted);
        return (
            kept,
            blocked,
            Some(format!("promoted '{}' per first-step allow list", kept[0].name)),
        );
    }

    (kept, blocked, None)
}

/// Split a ranked, policy-applied list into `primary` (top `max_candidates`)
/// and `fallback` (the remainder, known to the router but not exposed to the
/// model this turn).  `max_candidates == 0` means uncapped.
fn cap_candidates(ranked: Vec<ScoredTool>, max_candidates: usize) -> (Vec<ScoredTool>, Vec<String>) {
    if max_candidates == 0 || ranked.len() <= max_candidates {
        return (ranked, Vec::new());
    }
    let mut ranked = ranked;
    let rest = ranked.split_off(max_candidates);
    (ranked, rest.into_iter().map(|s| s.name).collect())
}

/// Build the full strategy-specific plan: gate, score, first-step policy,
/// cap.  Used both for the live plan and, under `hybrid`, for the shadow
/// plan.
fn build_strategy_plan(
    input: &RouteInput,
    config: &ToolRoutingConfig,
    use_v2: bool,
) -> (Vec<ScoredTool>, Vec<String>, Vec<FilteredTool>, Option<String>) {
    let (gated, mut filtered) = hard_gate(input);
    let scorer = |name: &str| {
        if use_v2 {
            score_v2(name, input.intent, input.focus)
        } else {
            score_v1(name, input.intent, input.focus)
        }
    };
    let ranked = rank(&gated, scorer);
    let policy = first_step_policy(input.intent, input.focus);
    let (policy_applied, blocked, reason_code) = apply_first_step_policy(ranked, &policy);
    filtered.extend(blocked);
    let (primary, fallback) = cap_candidates(policy_applied, config.max_candidates);
    (primary, fallback, filtered, reason_code)
}

/// Deterministic pseudo-fraction in `[0, 1)` derived from the turn's own
/// inputs, used to decide whether `hybrid` strategy samples a shadow plan
/// this turn.  Using a hash of the input (rather than a global counter or an
/// RNG) keeps `build_plan` a pure function of its arguments.
fn sample_fraction(input: &RouteInput) -> f32 {
    let mut sorted_tools = input.available_tools.to_vec();
    sorted_tools.sort();
    let joined = sorted_tools.join(",");
    let mut hash: u32 = 2166136261; // FNV-1a offset basis
    for b in joined.as_bytes() {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash = hash.wrapping_mul(2654435761);
    hash as f64 as f32 / u32::MAX as f32
}

/// Build the full [`RoutePlan`] for a turn.
pub fn build_plan(input: &RouteInput, config: &ToolRoutingConfig) -> RoutePlan {
    let use_v2 = matches!(config.strategy, RouterStrategy::CapabilityV2);
    let (primary, fallback, filtered, _reason) = build_strategy_plan(input, config, use_v2);

    // `shadow_eval` opts legacy-strategy turns into shadow sampling; hybrid
    // always samples (the flag is documented as ignored once strategy is
    // already hybrid or capability_v2, since hybrid's whole point is to run
    // the shadow plan).
    let wants_shadow = match config.strategy {
        RouterStrategy::Hybrid => true,
        RouterStrategy::Legacy => config.shadow_eval,
        RouterStrategy::CapabilityV2 => false,
    };
    let shadow = if wants_shadow && sample_fraction(input) < config.shadow_sample_rate {
        let (s_primary, s_fallback, s_filtered, _) = build_strategy_plan(input, config, true);
        Some(ShadowPlan {
            strategy: "capability_v2",
            primary: s_primary,
            fallback: s_fallback,
            filtered: s_filtered,
        })
    } else {
        None
    };

    RoutePlan {
        intent: input.intent,
        primary,
        fallback,
        filtered,
        fastpath: None,
        shadow,
    }
}
