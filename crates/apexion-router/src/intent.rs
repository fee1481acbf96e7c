// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// High-level classification of what the user is asking for this turn.
///
/// Drives which tools are promoted to the top of the candidate list (see
/// [`crate::score`]) and which fastpath task, if any, is attempted before
/// the first model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Codebase,
    Debug,
    Research,
    Git,
    Vision,
    System,
}

/// Secondary classification of a [`Intent::Research`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchFocus {
    Docs,
    Github,
    General,
}

const GIT_CUES: &[&str] = &[
    "git ", "commit", "branch", "merge", "rebase", "diff", "pull request", "pr ", "stash",
    "checkout", "提交", "分支", "合并", "差异",
];

const DEBUG_CUES: &[&str] = &[
    "debug", "stack trace", "traceback", "panic", "segfault", "crash", "breakpoint", "gdb",
    "exception", "调试", "崩溃", "报错",
];

const ARCHITECTURE_CUES: &[&str] = &[
    "architecture", "module", "directory structure", "repo layout", "how is this organized",
    "call chain", "call graph", "defined", "definition of", "where is", "used by", "references to",
    "结构", "目录", "调用链", "架构",
];

const DOCS_CUES: &[&str] = &["documentation", "docs for", "readme", "api reference", "文档"];
const GITHUB_CUES: &[&str] = &["github.com", "issue #", "pull request #", "repository"];
const RESEARCH_CUES: &[&str] = &[
    "research", "look up", "find out about", "what is", "explain", "compare", "versus", "vs ",
    "调研", "查一下", "是什么",
];

const SYSTEM_CUES: &[&str] = &[
    "install", "environment variable", "os version", "operating system", "disk space", "process list",
    "系统", "安装",
];

/// Classify `(text, has_image)` into a primary intent and, for research
/// queries, a secondary focus.
///
/// Images always win: a turn carrying an image is always `vision`,
/// regardless of any textual cues, because the model needs an
/// image-capable tool before anything else matters.
pub fn classify(text: &str, has_image: bool) -> (Intent, Option<ResearchFocus>) {
    if has_image {
        return (Intent::Vision, None);
    }

    let lower = text.to_lowercase();
    let has_any = |cues: &[&str]| cues.iter().any(|c| lower.contains(c));

    if has_any(GIT_CUES) {
        return (Intent::Git, None);
    }
    if has_any(DEBUG_CUES) {
        return (Intent::Debug, None);
    }
    if has_any(ARCHITECTURE_CUES) {
        return (Intent::Codebase, None);
    }
    if has_any(RESEARCH_CUES) {
        let focus = if has_any(DOCS_CUES) {
            ResearchFocus::Docs
        } else if has_any(GITHUB_CUES) {
            ResearchFocus::Github
        } else {
            ResearchFocus::General
        };
        return (Intent::Research, Some(focus));
    }
    if has_any(SYSTEM_CUES) {
        return (Intent::System, None);
    }

    (Intent::Codebase, None)
}
