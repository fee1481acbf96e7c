// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Directory/module overview: top-level layout plus manifest files, without
/// descending into every file. Satisfies the router's `repo_overview`
/// fastpath — "what does this project look like" resolves in one call
/// instead of a list_dir-then-read loop.
pub struct RepoMapTool;

static EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".svn",
    "__pycache__",
    ".mypy_cache",
];

static MANIFEST_FILES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "CMakeLists.txt",
    "README.md",
];

#[async_trait]
impl Tool for RepoMapTool {
    fn name(&self) -> &str {
        "repo_map"
    }

    fn description(&self) -> &str {
        "Produce a directory/module overview of a project: top-level layout\n\
         (directories and files, to the given depth) plus the contents of any\n\
         manifest files found at the root (Cargo.toml, package.json, pyproject.toml,\n\
         go.mod, CMakeLists.txt, README.md). Use for 'what is this project / how is\n\
         it structured' questions; use list_dir for a plain directory listing."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Root directory to map (default: current directory)"
                },
                "depth": {
                    "type": "integer",
                    "description": "Maximum recursion depth for the layout tree (default 2, max 4)"
                }
            },
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let depth = call
            .args
            .get("depth")
            .and_then(|v| v.as_u64())
            .unwrap_or(2)
            .min(4) as usize;

        debug!(path = %path, depth, "repo_map tool");

        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("cannot access {path}: {e}")),
        }

        let mut tree = Vec::new();
        build_tree(&path, &path, 0, depth, &mut tree).await;

        let mut manifests = Vec::new();
        for name in MANIFEST_FILES {
            let candidate = format!("{}/{}", path.trim_end_matches('/'), name);
            if let Ok(content) = tokio::fs::read_to_string(&candidate).await {
                let snippet: String = content.chars().take(2000).collect();
                manifests.push(format!("--- {name} ---\n{snippet}"));
            }
        }

        let mut output = String::new();
        output.push_str("layout:\n");
        output.push_str(&tree.join("\n"));
        if !manifests.is_empty() {
            output.push_str("\n\nmanifests:\n");
            output.push_str(&manifests.join("\n\n"));
        }

        ToolOutput::ok(&call.id, output)
    }
}

#[async_recursion::async_recursion]
async fn build_tree(base: &str, dir: &str, current_depth: usize, max_depth: usize, out: &mut Vec<String>) {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut children: Vec<(String, bool)> = Vec::new();
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') && name != ".github" {
            continue;
        }
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir && EXCLUDED_DIRS.contains(&name.as_str()) {
            continue;
        }
        children.push((name, is_dir));
    }
    children.sort_by(|(a, a_dir), (b, b_dir)| b_dir.cmp(a_dir).then(a.cmp(b)));

    let indent = "  ".repeat(current_depth);
    for (name, is_dir) in children {
        let full_path = format!("{}/{}", dir.trim_end_matches('/'), name);
        let rel = full_path
            .strip_prefix(base)
            .unwrap_or(&full_path)
            .trim_start_matches('/')
            .to_string();
        if is_dir {
            out.push(format!("{indent}{rel}/"));
            if current_depth < max_depth {
                build_tree(base, &full_path, current_depth + 1, max_depth, out).await;
            }
        } else {
            out.push(format!("{indent}{rel}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "r1".into(),
            name: "repo_map".into(),
            args,
        }
    }

    #[tokio::test]
    async fn maps_a_small_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}").unwrap();

        let out = RepoMapTool
            .execute(&call(json!({"path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("src/"), "{}", out.content);
        assert!(out.content.contains("lib.rs"), "{}", out.content);
        assert!(out.content.contains("Cargo.toml"), "{}", out.content);
        assert!(out.content.contains("[package]"), "{}", out.content);
    }

    #[tokio::test]
    async fn excludes_git_and_target() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();

        let out = RepoMapTool
            .execute(&call(json!({"path": dir.path().to_str().unwrap()})))
            .await;
        assert!(!out.content.contains(".git/"), "{}", out.content);
        assert!(!out.content.contains("target/"), "{}", out.content);
    }

    #[tokio::test]
    async fn nonexistent_path_is_error() {
        let out = RepoMapTool
            .execute(&call(json!({"path": "/tmp/apexion_no_such_repo_xyzzy"})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn depth_is_capped_at_four() {
        let dir = tempfile::tempdir().unwrap();
        let out = RepoMapTool
            .execute(&call(json!({"path": dir.path().to_str().unwrap(), "depth": 99})))
            .await;
        assert!(!out.is_error);
    }
}
