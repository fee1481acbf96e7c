// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use crate::intent::Intent;

/// A tool and its score, ordered descending within [`RoutePlan::primary`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTool {
    pub name: String,
    pub score: f32,
}

/// A tool excluded from the plan, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredTool {
    pub name: String,
    pub reason: String,
}

/// A deterministic single-tool execution the router wants to run before the
/// first model call, bypassing the LM round entirely when confidence is
/// high enough.
#[derive(Debug, Clone, PartialEq)]
pub struct FastpathPlan {
    pub tool: String,
    pub task: String,
    pub input_json: Value,
    pub confidence: f32,
}

/// A non-executed plan produced by the `capability_v2` scorer while `hybrid`
/// strategy is live, retained purely for observability.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPlan {
    pub strategy: &'static str,
    pub primary: Vec<ScoredTool>,
    pub fallback: Vec<String>,
    pub filtered: Vec<FilteredTool>,
}

/// The router's output for a single turn: which tools the model sees, which
/// are held in reserve for repair fallback, which were hard-gated out, and
/// an optional fastpath or shadow plan.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub intent: Intent,
    pub primary: Vec<ScoredTool>,
    pub fallback: Vec<String>,
    pub filtered: Vec<FilteredTool>,
    pub fastpath: Option<FastpathPlan>,
    pub shadow: Option<ShadowPlan>,
}

impl RoutePlan {
    /// Names of the tools exposed to the model, in score order.
    pub fn primary_names(&self) -> Vec<String> {
        self.primary.iter().map(|s| s.name.clone()).collect()
    }
}
