// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use apexion_model::Message;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

/// In-memory conversation session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list
    pub token_count: usize,
    /// Maximum context tokens (set from model config / provider limits)
    pub max_tokens: usize,
    /// Maximum output tokens the model can generate in one completion.
    /// Reserved out of the context window when computing `input_budget`.
    pub max_output_tokens: usize,
    /// Estimated token cost of items sent with every request but not held in
    /// `messages`: tool schemas and the dynamic context block. Recomputed by
    /// the agent before each model call.
    pub schema_overhead: usize,
    /// Correction factor applied to the chars/4 token estimate, derived from
    /// the provider's actually-reported input token counts. Starts at 1.0
    /// and drifts towards the provider's real tokenizer behaviour.
    pub calibration_factor: f32,
    /// Running total of prompt-cache-read tokens for the whole session.
    pub cache_read_total: u64,
    /// Running total of prompt-cache-write tokens for the whole session.
    pub cache_write_total: u64,
    /// Which compaction phase has been applied to the current message list:
    /// 0 = none, 1 = low-importance masked, 2 = low+medium masked. Reset to
    /// 0 whenever a full (phase-3-equivalent) compaction runs. Not persisted.
    pub compact_phase: u8,
    /// Rolling summary produced by the most recent structured/narrative
    /// compaction, kept for display/diagnostics purposes.
    pub summary: Option<String>,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
            compact_phase: 0,
            summary: None,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs { self.push(m); }
    }

    /// Fraction of context window consumed (0.0–1.0)
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 { return 0.0; }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    /// Replace the message list and recalculate token count (for resubmit / edit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    /// Tokens available for prompt input: the context window minus the
    /// reserved output budget and the per-request schema/context overhead.
    /// Returns 0 (rather than underflowing) if the window is too small to
    /// hold the reserved output and overhead.
    pub fn input_budget(&self) -> usize {
        self.max_tokens
            .saturating_sub(self.max_output_tokens)
            .saturating_sub(self.schema_overhead)
    }

    /// Fold a new provider-reported input token count into the running
    /// calibration factor, nudging the chars/4 estimate towards reality.
    /// Uses a simple exponential moving average so one outlier response
    /// cannot swing the factor too far.
    pub fn update_calibration(&mut self, actual_input: u32, estimated: usize) {
        if estimated == 0 {
            return;
        }
        let sample = actual_input as f32 / estimated as f32;
        if !sample.is_finite() || sample <= 0.0 {
            return;
        }
        const SMOOTHING: f32 = 0.2;
        self.calibration_factor =
            (1.0 - SMOOTHING) * self.calibration_factor + SMOOTHING * sample;
        self.calibration_factor = self.calibration_factor.clamp(0.25, 4.0);
    }

    /// Accumulate prompt-cache read/write token counts reported for the turn.
    pub fn add_cache_usage(&mut self, cache_read_tokens: u32, cache_write_tokens: u32) {
        self.cache_read_total += cache_read_tokens as u64;
        self.cache_write_total += cache_write_tokens as u64;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
