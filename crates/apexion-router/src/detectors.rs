// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One tool call's identity for loop-signature purposes: name plus its
/// argument JSON, serialized so that identical calls always hash the same.
#[derive(Debug, Clone)]
pub struct CallShape {
    pub name: String,
    pub input_json: String,
    pub is_error: bool,
}

/// A stable signature for a batch of tool calls, independent of call order
/// within the batch (the model may emit the same parallel batch with its
/// calls reordered between turns).
fn batch_signature(calls: &[CallShape]) -> u64 {
    let mut items: Vec<String> = calls
        .iter()
        .map(|c| format!("{}:{}", c.name, c.input_json))
        .collect();
    items.sort();
    let joined = items.join("|");
    let mut hasher = DefaultHasher::new();
    joined.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    Ok,
    Warn,
    Stop,
}

/// Tracks repeated identical tool-call batches across turns ("doom loop"):
/// the model issuing the same call (or same parallel batch) over and over
/// with no new information. Warns at 3 consecutive repeats, stops at 5.
#[derive(Debug, Default)]
pub struct DoomLoopDetector {
    last_signature: Option<u64>,
    streak: u32,
}

impl DoomLoopDetector {
    pub const WARN_AT: u32 = 3;
    pub const STOP_AT: u32 = 5;

    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one batch of tool calls (as issued in a single turn) and
    /// return the current verdict.
    pub fn observe(&mut self, calls: &[CallShape]) -> LoopVerdict {
        if calls.is_empty() {
            self.last_signature = None;
            self.streak = 0;
            return LoopVerdict::Ok;
        }
        let sig = batch_signature(calls);
        if self.last_signature == Some(sig) {
            self.streak += 1;
        } else {
            self.last_signature = Some(sig);
            self.streak = 1;
        }
        if self.streak >= Self::STOP_AT {
            LoopVerdict::Stop
        } else if self.streak >= Self::WARN_AT {
            LoopVerdict::Warn
        } else {
            LoopVerdict::Ok
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Tracks repeated identical tool-call batches that *all failed* ("failure
/// loop"): a model retrying the same broken call without adapting. Warns at
/// 2 consecutive all-error repeats, stops at 4 — tighter than the doom-loop
/// thresholds because a repeated failure wastes a turn and produces no
/// progress even in the best case.
#[derive(Debug, Default)]
pub struct FailureLoopDetector {
    last_signature: Option<u64>,
    streak: u32,
}

impl FailureLoopDetector {
    pub const WARN_AT: u32 = 2;
    pub const STOP_AT: u32 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one batch of tool call results. A batch only counts toward
    /// the streak when every call in it errored; any success resets.
    pub fn observe(&mut self, calls: &[CallShape]) -> LoopVerdict {
        if calls.is_empty() || !calls.iter().all(|c| c.is_error) {
            self.last_signature = None;
            self.streak = 0;
            return LoopVerdict::Ok;
        }
        let sig = batch_signature(calls);
        if self.last_signature == Some(sig) {
            self.streak += 1;
        } else {
            self.last_signature = Some(sig);
            self.streak = 1;
        }
        if self.streak >= Self::STOP_AT {
            LoopVerdict::Stop
        } else if self.streak >= Self::WARN_AT {
            LoopVerdict::Warn
        } else {
            LoopVerdict::Ok
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}
