//! The toolbelt dispatcher: a fixed set of named operations exposed to a
//! calling model through function-calling schemas.
//!
//! Every tool returns a human/model-readable string.  Failures come back as
//! `Error: …` descriptions; nothing here panics or propagates an error out
//! of the dispatcher.

pub mod llm_log;
pub mod memory;
pub mod reliability;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Value, json};

use crate::pipeline::{self, PipelineError, Policy};

/// Everything a tool invocation needs from the enclosing process.
#[derive(Debug)]
pub struct ToolContext {
    pub policy: Policy,
    pub timeout: Duration,
    pub memory_dir: PathBuf,
    /// Used when `record_tool_reliability` is called without a `goal_id`.
    pub current_goal_id: Option<i64>,
}

impl ToolContext {
    pub fn new(settings: &crate::config::Settings, current_goal_id: Option<i64>) -> Self {
        Self {
            policy: settings.policy.clone(),
            timeout: settings.timeout,
            memory_dir: settings.memory_dir.clone(),
            current_goal_id,
        }
    }
}

/// The full tool list in function-calling format, for the enclosing agent to
/// forward to its model.
pub fn definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "run_safe_shell",
                "description": "Run a safe, read-only shell command to inspect files or repo state. \
                    Commands may be piped (e.g. 'grep -r TODO . | wc -l'). Only whitelisted command \
                    prefixes are permitted; no write, delete, install, or dangerous commands.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "cmd": {
                            "type": "string",
                            "description": "The shell command to run (e.g. 'ls -la agent/', 'grep -r TODO .')"
                        }
                    },
                    "required": ["cmd"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "record_tool_reliability",
                "description": "After using a tool, record how successful and helpful it was for the current goal.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "tool_name": {"type": "string", "description": "Name of the tool used"},
                        "goal_id": {"type": "integer", "description": "ID of the current focus goal (optional but recommended)"},
                        "success": {"type": "boolean", "description": "Did the tool succeed without critical error?"},
                        "helpfulness": {"type": "number", "minimum": 0, "maximum": 1, "description": "0.0-1.0 how much it advanced the goal"},
                        "notes": {"type": "string", "description": "Optional short observation"}
                    },
                    "required": ["tool_name", "success", "helpfulness"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "list_tool_reliability",
                "description": "View aggregated reliability stats for tools (global and/or per-goal).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "goal_id": {"type": "integer", "description": "Specific goal ID to filter on (optional)"},
                        "include_global": {"type": "boolean", "description": "Include global stats", "default": true}
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "summarize_llm_logs",
                "description": "Get a summary of recent LLM calls (models used, latency, tokens, success rate). Useful for performance review.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "days_back": {"type": "integer", "description": "Look back this many days", "default": 7},
                        "limit": {"type": "integer", "description": "Max calls to analyze", "default": 50}
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "query_llm_logs",
                "description": "Search LLM call history with simple filters (e.g. 'model:qwen duration>10 success:false'). Returns matching entries.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "filter_expr": {"type": "string", "description": "Filter string (space-separated key:value / key>value atoms)"},
                        "limit": {"type": "integer", "description": "Max results to return", "default": 20}
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "write_memory_file",
                "description": "Write to pre-approved memory files with strict validation. Only whitelisted files \
                    (notes.md, goals.json, tool-reliability.json, llm-calls.log.jsonl) are writable.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Target memory file path (must be whitelisted)"},
                        "content": {"type": "string", "description": "Content to write"}
                    },
                    "required": ["path", "content"]
                }
            }
        }
    ])
}

/// Run a whitelisted command pipeline and render the result as an
/// agent-facing string.
pub fn run_safe_shell(cmd: &str, ctx: &ToolContext) -> String {
    if cmd.trim().is_empty() {
        return "Error: empty command".to_string();
    }

    let stages = match pipeline::split_and_tokenize(cmd) {
        Ok(stages) => stages,
        Err(e) => return format!("Error: {e}"),
    };

    match pipeline::execute(&stages, &ctx.policy, ctx.timeout) {
        Ok(result) => {
            if result.output.is_empty() {
                "(no output)".to_string()
            } else {
                format!("output: {}\n", result.output)
            }
        }
        Err(PipelineError::PolicyViolation { text, .. }) => format!(
            "Error: Command not allowed for safety reasons.\nAllowed prefixes: {}\nAttempted: {text}",
            ctx.policy.prefixes().join(", ")
        ),
        Err(PipelineError::Timeout { timeout }) => {
            format!("Command timed out after {} seconds: {cmd}", timeout.as_secs())
        }
        Err(PipelineError::StageFailed { stderr, .. }) if !stderr.trim().is_empty() => {
            format!("Execution error:\n{stderr}")
        }
        Err(e @ PipelineError::StageFailed { .. }) => format!("Execution error:\n{e}"),
        Err(PipelineError::Spawn { program, source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            format!("Command not found: {program}")
        }
        Err(e) => format!("Shell error: {e}"),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn int_arg(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn bool_arg(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// Route a tool call by name.
///
/// Arguments arrive as a JSON object; missing or mistyped optional fields
/// fall back to their documented defaults, required fields produce an
/// `Error:` string naming them.  Unknown names report the tool.
#[allow(clippy::cast_sign_loss)]
pub fn execute_tool(name: &str, args: &Value, ctx: &ToolContext) -> String {
    match name {
        "run_safe_shell" => run_safe_shell(str_arg(args, "cmd").unwrap_or(""), ctx),
        "record_tool_reliability" => {
            let Some(tool_name) = str_arg(args, "tool_name") else {
                return "Error: tool_name required".to_string();
            };
            reliability::record(
                &ctx.memory_dir,
                tool_name,
                int_arg(args, "goal_id").or(ctx.current_goal_id),
                bool_arg(args, "success").unwrap_or(false),
                args.get("helpfulness").and_then(Value::as_f64).unwrap_or(0.5),
                str_arg(args, "notes").unwrap_or(""),
            )
        }
        "list_tool_reliability" => reliability::list(
            &ctx.memory_dir,
            int_arg(args, "goal_id"),
            bool_arg(args, "include_global").unwrap_or(true),
        ),
        "summarize_llm_logs" => llm_log::summarize(
            &ctx.memory_dir,
            int_arg(args, "days_back").unwrap_or(7),
            int_arg(args, "limit").map_or(50, |l| l.max(0) as usize),
        ),
        "query_llm_logs" => llm_log::query(
            &ctx.memory_dir,
            str_arg(args, "filter_expr").unwrap_or(""),
            int_arg(args, "limit").map_or(20, |l| l.max(0) as usize),
        ),
        "write_memory_file" => {
            let Some(path) = str_arg(args, "path") else {
                return "Error: path required".to_string();
            };
            let Some(content) = str_arg(args, "content") else {
                return "Error: content required".to_string();
            };
            memory::write_memory_file(&ctx.memory_dir, path, content)
        }
        _ => format!("Unknown tool: {name}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ctx(memory_dir: PathBuf) -> ToolContext {
        ToolContext {
            policy: Policy::default_allow(),
            timeout: Duration::from_secs(10),
            memory_dir,
            current_goal_id: None,
        }
    }

    fn tmp_ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempfile::tempdir().unwrap();
        let context = ctx(dir.path().to_path_buf());
        (dir, context)
    }

    // --- definitions ---

    #[test]
    fn definitions_list_all_six_tools() {
        let defs = definitions();
        let names: Vec<&str> = defs
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "run_safe_shell",
                "record_tool_reliability",
                "list_tool_reliability",
                "summarize_llm_logs",
                "query_llm_logs",
                "write_memory_file",
            ]
        );
    }

    #[test]
    fn definitions_are_function_calling_shaped() {
        let defs = definitions();
        for tool in defs.as_array().unwrap() {
            assert_eq!(tool["type"], "function");
            assert_eq!(tool["function"]["parameters"]["type"], "object");
            assert!(tool["function"]["description"].as_str().unwrap().len() > 10);
        }
    }

    // --- run_safe_shell ---

    #[test]
    fn shell_success_is_prefixed_with_output() {
        let (_dir, ctx) = tmp_ctx();
        let out = run_safe_shell("echo hello", &ctx);
        assert_eq!(out, "output: hello\n\n");
    }

    #[test]
    fn shell_empty_command() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(run_safe_shell("", &ctx), "Error: empty command");
        assert_eq!(run_safe_shell("   ", &ctx), "Error: empty command");
    }

    #[test]
    fn shell_no_output_marker() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(run_safe_shell("echo -n", &ctx), "(no output)");
    }

    #[test]
    fn shell_policy_violation_lists_allowed_prefixes() {
        let (_dir, ctx) = tmp_ctx();
        let out = run_safe_shell("rm -rf /", &ctx);
        assert!(out.starts_with("Error: Command not allowed for safety reasons.\n"));
        assert!(out.contains("Allowed prefixes: ls, dir, tree,"));
        assert!(out.contains("Attempted: rm -rf /"));
    }

    #[test]
    fn shell_malformed_command() {
        let (_dir, ctx) = tmp_ctx();
        let out = run_safe_shell("echo \"open", &ctx);
        assert!(out.starts_with("Error: malformed command:"));
    }

    #[test]
    fn shell_execution_error_carries_stderr() {
        let (_dir, ctx) = tmp_ctx();
        let out = run_safe_shell("cat /nonexistent-toolbelt-test", &ctx);
        assert!(out.starts_with("Execution error:\n"));
        assert!(out.contains("nonexistent-toolbelt-test"));
    }

    #[test]
    fn shell_timeout_message_names_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext {
            policy: Policy::new(vec!["sleep".to_string()]),
            timeout: Duration::from_secs(1),
            memory_dir: dir.path().to_path_buf(),
            current_goal_id: None,
        };
        let out = run_safe_shell("sleep 30", &ctx);
        assert_eq!(out, "Command timed out after 1 seconds: sleep 30");
    }

    #[test]
    fn shell_pipeline_wires_stages() {
        let (_dir, ctx) = tmp_ctx();
        let out = run_safe_shell("echo \"hello world\" | wc -w", &ctx);
        assert!(out.starts_with("output:"));
        assert!(out.contains('2'));
    }

    // --- dispatch ---

    #[test]
    fn dispatch_unknown_tool_names_it() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(
            execute_tool("frobnicate", &json!({}), &ctx),
            "Unknown tool: frobnicate"
        );
    }

    #[test]
    fn dispatch_shell_with_missing_cmd_is_empty_command() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(execute_tool("run_safe_shell", &json!({}), &ctx), "Error: empty command");
    }

    #[test]
    fn dispatch_record_requires_tool_name() {
        let (_dir, ctx) = tmp_ctx();
        let out = execute_tool("record_tool_reliability", &json!({"success": true}), &ctx);
        assert_eq!(out, "Error: tool_name required");
    }

    #[test]
    fn dispatch_record_and_list_round_trip() {
        let (_dir, ctx) = tmp_ctx();
        let out = execute_tool(
            "record_tool_reliability",
            &json!({"tool_name": "run_safe_shell", "success": true, "helpfulness": 0.9}),
            &ctx,
        );
        assert!(out.contains("Reliability recorded for 'run_safe_shell'"));

        let out = execute_tool("list_tool_reliability", &json!({}), &ctx);
        assert!(out.contains("Global tool reliability:"));
        assert!(out.contains("run_safe_shell: 1 calls"));
    }

    #[test]
    fn dispatch_record_falls_back_to_context_goal() {
        let dir = tempfile::tempdir().unwrap();
        let mut context = ctx(dir.path().to_path_buf());
        context.current_goal_id = Some(9);
        execute_tool(
            "record_tool_reliability",
            &json!({"tool_name": "t", "success": true, "helpfulness": 0.5}),
            &context,
        );
        let out = execute_tool("list_tool_reliability", &json!({"goal_id": 9}), &context);
        assert!(out.contains("Goal 9 specific tool reliability:"));
    }

    #[test]
    fn dispatch_summarize_default_window() {
        let (_dir, ctx) = tmp_ctx();
        let out = execute_tool("summarize_llm_logs", &json!({}), &ctx);
        assert_eq!(out, "No LLM calls found in the last 7 days.");
    }

    #[test]
    fn dispatch_summarize_extreme_days_back_returns_a_string() {
        let (dir, ctx) = tmp_ctx();
        std::fs::write(dir.path().join("llm-calls.log.jsonl"), "").unwrap();
        let out = execute_tool("summarize_llm_logs", &json!({"days_back": i64::MAX}), &ctx);
        assert!(out.starts_with("No LLM calls found"));
    }

    #[test]
    fn dispatch_query_default_is_no_logs() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(execute_tool("query_llm_logs", &json!({}), &ctx), "No logs available.");
    }

    #[test]
    fn dispatch_write_memory_file_requires_fields() {
        let (_dir, ctx) = tmp_ctx();
        assert_eq!(
            execute_tool("write_memory_file", &json!({"content": "x"}), &ctx),
            "Error: path required"
        );
        assert_eq!(
            execute_tool("write_memory_file", &json!({"path": "notes.md"}), &ctx),
            "Error: content required"
        );
    }

    #[test]
    fn dispatch_write_memory_file_rejects_unlisted_paths() {
        let (_dir, ctx) = tmp_ctx();
        let out = execute_tool(
            "write_memory_file",
            &json!({"path": "evil.sh", "content": "x"}),
            &ctx,
        );
        assert_eq!(out, "Security error: Cannot write to evil.sh");
    }

    #[test]
    fn dispatch_mistyped_optionals_fall_back_to_defaults() {
        let (_dir, ctx) = tmp_ctx();
        // days_back as a string is ignored in favor of the default.
        let out = execute_tool("summarize_llm_logs", &json!({"days_back": "soon"}), &ctx);
        assert_eq!(out, "No LLM calls found in the last 7 days.");
    }
}
