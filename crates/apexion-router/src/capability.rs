// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::intent::Intent;

/// How abstract a tool's operation is.  Higher-level tools (e.g. `symbol_nav`)
/// are preferred over primitives (e.g. `grep`) when both satisfy the intent,
/// because they save the model a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticLevel {
    High,
    Medium,
    Primitive,
}

/// The kind of effect a tool call has on the world.  Used for the hard gate
/// (e.g. network tools on an offline run) and for the read-only scoring bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Risk {
    Read,
    Write,
    Execute,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Low,
    Medium,
    High,
}

/// Static router metadata for one tool, looked up by name.
///
/// Tools themselves (the `Tool` trait in `apexion-tools`) carry no routing
/// metadata — this table is the router's own view of the catalogue, kept
/// separate so that adding a routing capability never requires touching the
/// tool implementation itself.
#[derive(Debug, Clone)]
pub struct ToolCapability {
    pub domains: &'static [Intent],
    pub semantic_level: SemanticLevel,
    pub risk: Risk,
    pub cost: Cost,
    pub requires: &'static [&'static str],
    pub deterministic_for: &'static [&'static str],
    pub degrade_policy: &'static [&'static str],
}

impl ToolCapability {
    /// Parallel-safe execution is derived from read-only risk: only tools
    /// that cannot mutate shared state may run concurrently with others in
    /// the same batch without an ordering hazard.
    pub fn supports_parallel(&self) -> bool {
        self.risk == Risk::Read
    }
}

const EMPTY_STR: &[&str] = &[];

macro_rules! cap {
    ($domains:expr, $level:expr, $risk:expr, $cost:expr) => {
        ToolCapability {
            domains: $domains,
            semantic_level: $level,
            risk: $risk,
            cost: $cost,
            requires: EMPTY_STR,
            deterministic_for: EMPTY_STR,
            degrade_policy: EMPTY_STR,
        }
    };
    ($domains:expr, $level:expr, $risk:expr, $cost:expr, requires: $requires:expr) => {
        ToolCapability {
            domains: $domains,
            semantic_level: $level,
            risk: $risk,
            cost: $cost,
            requires: $requires,
            deterministic_for: EMPTY_STR,
            degrade_policy: EMPTY_STR,
        }
    };
    ($domains:expr, $level:expr, $risk:expr, $cost:expr, deterministic_for: $det:expr, degrade: $deg:expr) => {
        ToolCapability {
            domains: $domains,
            semantic_level: $level,
            risk: $risk,
            cost: $cost,
            requires: EMPTY_STR,
            deterministic_for: $det,
            degrade_policy: $deg,
        }
    };
}

/// Look up router metadata for a tool by name.
///
/// Unknown tools (e.g. an MCP-provided tool with no static entry) get a
/// conservative default: primitive, write-risk (no parallel bonus, no
/// fastpath eligibility), medium cost.
pub fn capability_for(tool_name: &str) -> ToolCapability {
    use Cost::*;
    use Intent::*;
    use Risk::*;
    use SemanticLevel::*;

    match tool_name {
        "read_file" => cap!(&[Codebase, Debug], Primitive, Read, Low),
        "write" => cap!(&[Codebase], Primitive, Write, Low),
        "edit_file" => cap!(&[Codebase], Primitive, Write, Low),
        "delete_file" => cap!(&[Codebase], Primitive, Write, Low),
        "list_dir" => cap!(&[Codebase], Primitive, Read, Low),
        "find_file" => cap!(&[Codebase], Primitive, Read, Low),
        "grep" => cap!(&[Codebase, Debug], Primitive, Read, Low,
            degrade: &["search_codebase"], deterministic_for: &[]),
        "search_codebase" => cap!(&[Codebase, Research], Medium, Read, Medium),
        "run_terminal_command" => cap!(&[Debug, System], Primitive, Execute, Medium),
        "web_fetch" => cap!(&[Research], Primitive, Network, Medium,
            requires: &["network"]),
        "web_search" => cap!(&[Research], Medium, Network, Medium,
            requires: &["network"]),
        "switch_mode" => cap!(&[Codebase, System], Primitive, Write, Low),
        "todo_write" => cap!(&[Codebase, System], Primitive, Write, Low),
        "ask_question" => cap!(&[Codebase, System], Primitive, Write, Low),
        "update_memory" => cap!(&[System], Primitive, Write, Low),
        "load_skill" => cap!(&[Codebase, System], Primitive, Read, Low),
        "read_image" => cap!(&[Vision], Primitive, Read, Low,
            requires: &["model.image_input"]),
        "read_lints" => cap!(&[Codebase, Debug], Medium, Read, Low),
        "symbol_nav" => cap!(&[Codebase, Debug], High, Read, Medium,
            deterministic_for: &["symbol_lookup"], degrade: &["grep", "read_file"]),
        "repo_map" => cap!(&[Codebase, Research], High, Read, Medium,
            deterministic_for: &["repo_overview"], degrade: &["list_dir", "find_file"]),
        "doc_context" => cap!(&[Research], High, Read, Low,
            degrade: &["web_search", "web_fetch"]),
        _ => cap!(&[Codebase], Primitive, Write, Medium),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_file_is_read_only_and_parallel_safe() {
        let c = capability_for("read_file");
        assert_eq!(c.risk, Risk::Read);
        assert!(c.supports_parallel());
    }

    #[test]
    fn write_tool_is_not_parallel_safe() {
        let c = capability_for("write");
        assert_eq!(c.risk, Risk::Write);
        assert!(!c.supports_parallel());
    }

    #[test]
    fn read_image_requires_image_input() {
        let c = capability_for("read_image");
        assert!(c.requires.contains(&"model.image_input"));
    }

    #[test]
    fn symbol_nav_deterministic_for_symbol_lookup() {
        let c = capability_for("symbol_nav");
        assert!(c.deterministic_for.contains(&"symbol_lookup"));
        assert_eq!(c.degrade_policy, &["grep", "read_file"]);
    }

    #[test]
    fn doc_context_fallback_chain_matches_spec() {
        let c = capability_for("doc_context");
        assert_eq!(c.degrade_policy, &["web_search", "web_fetch"]);
    }

    #[test]
    fn unknown_tool_gets_conservative_default() {
        let c = capability_for("some_mcp_tool_nobody_registered");
        assert_eq!(c.risk, Risk::Write);
        assert_eq!(c.semantic_level, SemanticLevel::Primitive);
        assert!(!c.supports_parallel());
    }

    #[test]
    fn web_fetch_requires_network() {
        let c = capability_for("web_fetch");
        assert!(c.requires.contains(&"network"));
    }
}
