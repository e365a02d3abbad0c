// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Which tool events never make it into the durable queue: tools whose
//! output is rarely worth distilling, and writes to the host's own
//! bookkeeping files (which would otherwise cause mnemod to observe itself).

/// Tool names excluded outright regardless of their input/output.
const EXCLUDED_TOOLS: &[&str] = &["TodoWrite", "AskUserQuestion", "ExitPlanMode"];

pub fn is_excluded_tool(tool_name: &str) -> bool {
    EXCLUDED_TOOLS.iter().any(|t| t.eq_ignore_ascii_case(tool_name))
}

/// A write targeting the host's own meta/bookkeeping files (its settings,
/// transcript cache, or this worker's own data directory) is never
/// interesting to distill.
pub fn is_meta_file_write(tool_input: &serde_json::Value) -> bool {
    let Some(path) = tool_input.get("file_path").and_then(|v| v.as_str()) else {
        return false;
    };
    path.contains("/.claude/") || path.contains("/.mnemod/") || path.ends_with(".mnemod-meta.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn excluded_tools_are_case_insensitive() {
        assert!(is_excluded_tool("TodoWrite"));
        assert!(is_excluded_tool("todowrite"));
        assert!(!is_excluded_tool("Write"));
    }

    #[test]
    fn meta_file_write_detects_claude_dir() {
        assert!(is_meta_file_write(&json!({"file_path": "/home/u/.claude/settings.json"})));
        assert!(!is_meta_file_write(&json!({"file_path": "/home/u/project/a.md"})));
    }

    #[test]
    fn meta_file_write_false_when_no_file_path() {
        assert!(!is_meta_file_write(&json!({"command": "ls"})));
    }
}
