// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;

use crate::plan::FastpathPlan;

fn symbol_lookup_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)find where\s+(\w+)\s+is\s+defined").unwrap(),
                "definitions",
            ),
            (
                Regex::new(r"(?i)where\s+is\s+(\w+)\s+defined").unwrap(),
                "definitions",
            ),
            (
                Regex::new(r"(?i)find where\s+(\w+)\s+is\s+(used|called)").unwrap(),
                "references",
            ),
            (
                Regex::new(r"(?i)who\s+calls\s+(\w+)").unwrap(),
                "references",
            ),
            (
                Regex::new(r"(?i)trace call chain for\s+(\w+)").unwrap(),
                "both",
            ),
            // CJK: "查找 X 的定义" (find X's definition), "X 在哪里被调用" (where is X called)
            (Regex::new(r"查找\s*([\w_]+)\s*的定义").unwrap(), "definitions"),
            (Regex::new(r"([\w_]+)\s*在哪里被调用").unwrap(), "references"),
            (Regex::new(r"([\w_]+)\s*的调用链").unwrap(), "both"),
        ]
    })
}

fn repo_overview_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"(?i)architecture overview").unwrap(),
            Regex::new(r"(?i)give me an overview of (this|the) repo").unwrap(),
            Regex::new(r"(?i)how is (this|the) repo(sitory)? organi[sz]ed").unwrap(),
            Regex::new(r"(?i)what.s the (overall )?structure of this (repo|project|codebase)")
                .unwrap(),
            Regex::new(r"整体架构").unwrap(),
        ]
    })
}

/// Detect a deterministic fastpath task for `text`, if any.
///
/// Confidence is fixed per pattern family rather than computed, since these
/// are hand-authored high-precision patterns: a match means the phrasing is
/// unambiguous enough to skip the model's first round entirely.
pub fn detect_fastpath(text: &str) -> Option<FastpathPlan> {
    for (re, mode) in symbol_lookup_patterns() {
        if let Some(caps) = re.captures(text) {
            let symbol = caps.get(1)?.as_str().to_string();
            return Some(FastpathPlan {
                tool: "symbol_nav".to_string(),
                task: "symbol_lookup".to_string(),
                input_json: json!({ "symbol": symbol, "path": ".", "mode": mode }),
                confidence: 0.92,
            });
        }
    }

    for re in repo_overview_patterns() {
        if re.is_match(text) {
            return Some(FastpathPlan {
                tool: "repo_map".to_string(),
                task: "repo_overview".to_string(),
                input_json: json!({ "path": "." }),
                confidence: 0.9,
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_call_chain_detects_both_mode() {
        let fp = detect_fastpath("trace call chain for runAgentLoop").unwrap();
        assert_eq!(fp.tool, "symbol_nav");
        assert_eq!(fp.task, "symbol_lookup");
        assert_eq!(fp.input_json["symbol"], "runAgentLoop");
        assert_eq!(fp.input_json["mode"], "both");
        assert!(fp.confidence >= 0.9);
    }

    #[test]
    fn find_where_defined_detects_definitions_mode() {
        let fp = detect_fastpath("find where parseConfig is defined").unwrap();
        assert_eq!(fp.input_json["mode"], "definitions");
        assert_eq!(fp.input_json["symbol"], "parseConfig");
    }

    #[test]
    fn find_where_used_detects_references_mode() {
        let fp = detect_fastpath("find where Session is used").unwrap();
        assert_eq!(fp.input_json["mode"], "references");
    }

    #[test]
    fn architecture_overview_detects_repo_map() {
        let fp = detect_fastpath("give me an architecture overview").unwrap();
        assert_eq!(fp.tool, "repo_map");
        assert_eq!(fp.task, "repo_overview");
    }

    #[test]
    fn unrelated_text_has_no_fastpath() {
        assert!(detect_fastpath("please fix the failing test").is_none());
    }

    #[test]
    fn cjk_definition_lookup_detected() {
        let fp = detect_fastpath("查找 runLoop 的定义").unwrap();
        assert_eq!(fp.input_json["mode"], "definitions");
        assert_eq!(fp.input_json["symbol"], "runLoop");
    }
}
