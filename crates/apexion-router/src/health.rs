// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use apexion_config::CircuitBreakerConfig;

const LAST_ERROR_TRUNCATE: usize = 240;

/// Per-tool health counters, process-lifetime (never persisted).
#[derive(Debug, Clone)]
pub struct ToolHealthState {
    pub successes: u64,
    pub failures: u64,
    pub consecutive_fails: u32,
    pub cooldown_until: Option<Instant>,
    pub last_error: Option<String>,
    pub updated_at: Instant,
}

impl Default for ToolHealthState {
    fn default() -> Self {
        Self {
            successes: 0,
            failures: 0,
            consecutive_fails: 0,
            cooldown_until: None,
            last_error: None,
            updated_at: Instant::now(),
        }
    }
}

impl ToolHealthState {
    /// `100*successes/(successes+failures) - 10*consecutive_fails`, clamped
    /// to `[0, 100]`; an open circuit further clamps the result to `<= 20`.
    pub fn health_score(&self) -> u8 {
        let total = self.successes + self.failures;
        let base = if total == 0 {
            100.0
        } else {
            100.0 * (self.successes as f64) / (total as f64)
        };
        let penalized = base - 10.0 * self.consecutive_fails as f64;
        let clamped = penalized.clamp(0.0, 100.0);
        let circuit_open = self
            .cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false);
        let score = if circuit_open { clamped.min(20.0) } else { clamped };
        score.round() as u8
    }
}

/// Result of a circuit check for a single tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open { remaining_secs: u64 },
}

/// Tracks per-tool success/failure counters and trips a circuit breaker on
/// repeated consecutive failures.  Shared across a session's turns (wrap in
/// `Arc` — all methods take `&self`).
pub struct HealthRegistry {
    states: Mutex<HashMap<String, ToolHealthState>>,
    config: CircuitBreakerConfig,
}

impl HealthRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Check whether `name`'s circuit is open. Returns `Closed` when the
    /// breaker is disabled in config, regardless of failure history.
    pub fn check(&self, name: &str) -> CircuitStatus {
        if !self.config.enabled {
            return CircuitStatus::Closed;
        }
        let states = self.states.lock().expect("health registry mutex poisoned");
        match states.get(name).and_then(|s| s.cooldown_until) {
            Some(until) => {
                let now = Instant::now();
                if now >= until {
                    CircuitStatus::Closed
                } else {
                    CircuitStatus::Open {
                        remaining_secs: (until - now).as_secs().max(1),
                    }
                }
            }
            None => CircuitStatus::Closed,
        }
    }

    pub fn record_success(&self, name: &str) {
        let mut states = self.states.lock().expect("health registry mutex poisoned");
        let state = states.entry(name.to_string()).or_default();
        state.successes += 1;
        state.consecutive_fails = 0;
        state.cooldown_until = None;
        state.updated_at = Instant::now();
    }

    pub fn record_failure(&self, name: &str, err: &str) {
        let mut states = self.states.lock().expect("health registry mutex poisoned");
        let state = states.entry(name.to_string()).or_default();
        state.failures += 1;
        state.consecutive_fails += 1;
        let truncated: String = err.chars().take(LAST_ERROR_TRUNCATE).collect();
        state.last_error = Some(truncated);
        state.updated_at = Instant::now();
        if self.config.enabled && state.consecutive_fails >= self.config.fail_threshold {
            state.cooldown_until =
                Some(Instant::now() + Duration::from_secs(self.config.cooldown_sec));
        }
    }

    pub fn health_score(&self, name: &str) -> u8 {
        let states = self.states.lock().expect("health registry mutex poisoned");
        states.get(name).map(|s| s.health_score()).unwrap_or(100)
    }

    /// Snapshot of a tool's current state, for diagnostics/debug logging.
    pub fn snapshot(&self, name: &str) -> Option<ToolHealthState> {
        let states = self.states.lock().expect("health registry mutex poisoned");
        states.get(name).cloned()
    }
}
