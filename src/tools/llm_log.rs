//! Model-call log analytics over `llm-calls.log.jsonl` (JSON Lines).
//!
//! Loading is tolerant by design: malformed lines and entries without a
//! parseable RFC 3339 timestamp are skipped, never fatal.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

const LOG_FILE: &str = "llm-calls.log.jsonl";

/// Fixed window used by `query`, wider than the summarize default.
const QUERY_DAYS_BACK: i64 = 30;
const QUERY_LOAD_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct LogEntry {
    timestamp: String,
    model: Option<String>,
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
    duration_sec: Option<f64>,
    success: Option<bool>,
    tool_calls: Option<u64>,
    user_prompt_snippet: Option<String>,
    response_snippet: Option<String>,
}

impl LogEntry {
    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("unknown")
    }

    fn prompt_snippet(&self) -> &str {
        self.user_prompt_snippet.as_deref().unwrap_or("\u{2014}")
    }

    fn response_snippet(&self) -> &str {
        self.response_snippet.as_deref().unwrap_or("\u{2014}")
    }
}

/// Load entries newer than the `days_back` cutoff, newest first (timestamp
/// string order), keeping at most `limit`.
fn load_recent(memory_dir: &Path, days_back: i64, limit: usize) -> Vec<LogEntry> {
    let path = memory_dir.join(LOG_FILE);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };

    // Out-of-range windows degrade to "everything on record" instead of
    // overflowing inside chrono.
    let cutoff = chrono::TimeDelta::try_days(days_back)
        .and_then(|delta| Utc::now().checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut entries: Vec<LogEntry> = content
        .lines()
        .filter_map(|line| serde_json::from_str::<LogEntry>(line.trim()).ok())
        .filter(|entry| {
            DateTime::parse_from_rfc3339(&entry.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= cutoff)
                .unwrap_or(false)
        })
        .collect();

    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(limit);
    entries
}

/// Group digits in threes: `1234567` → `1,234,567`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Render a human-readable summary of recent model calls.
#[allow(clippy::cast_precision_loss)]
pub fn summarize(memory_dir: &Path, days_back: i64, limit: usize) -> String {
    let entries = load_recent(memory_dir, days_back, limit);
    if entries.is_empty() {
        return format!("No LLM calls found in the last {days_back} days.");
    }

    let total_calls = entries.len();
    let mut model_counts: Vec<(String, usize)> = Vec::new();
    let mut total_input: u64 = 0;
    let mut total_output: u64 = 0;
    let mut total_duration = 0.0;
    let mut success_count = 0usize;
    let mut tool_call_count: u64 = 0;

    for entry in &entries {
        let model = entry.model().to_string();
        match model_counts.iter_mut().find(|(m, _)| *m == model) {
            Some((_, count)) => *count += 1,
            None => model_counts.push((model, 1)),
        }
        total_input += entry.input_tokens.unwrap_or(0);
        total_output += entry.output_tokens.unwrap_or(0);
        total_duration += entry.duration_sec.unwrap_or(0.0);
        if entry.success.unwrap_or(false) {
            success_count += 1;
        }
        tool_call_count += entry.tool_calls.unwrap_or(0);
    }
    model_counts.sort_by(|a, b| b.1.cmp(&a.1));

    let avg_duration = total_duration / total_calls as f64;
    let success_rate = success_count as f64 / total_calls as f64 * 100.0;

    let mut out = String::new();
    let _ = writeln!(out, "LLM Call Summary (last {days_back} days, up to {total_calls} calls):");
    out.push('\n');
    let _ = writeln!(out, "\u{2022} Total calls: {total_calls}");
    let _ = writeln!(out, "\u{2022} Success rate: {success_rate:.1}%");
    let _ = writeln!(out, "\u{2022} Average duration: {avg_duration:.2} seconds");
    let _ = writeln!(out, "\u{2022} Total input tokens: {}", thousands(total_input));
    let _ = writeln!(out, "\u{2022} Total output tokens: {}", thousands(total_output));
    let _ = writeln!(out, "\u{2022} Total tool calls made: {tool_call_count}");
    out.push('\n');
    out.push_str("Models used:\n");
    for (model, count) in &model_counts {
        let _ = writeln!(out, "  - {model}: {count} calls");
    }

    if let Some(latest) = entries.first() {
        out.push('\n');
        let _ = writeln!(out, "Most recent call ({}):", latest.timestamp);
        let _ = writeln!(out, "  Model: {}", latest.model());
        let _ = writeln!(out, "  Prompt snippet: {}", latest.prompt_snippet());
        let _ = writeln!(out, "  Response snippet: {}", latest.response_snippet());
    }

    out.trim_end().to_string()
}

/// One parsed filter atom.
enum Atom {
    ModelContains(String),
    DurationOver(f64),
    ToolCallsOver(u64),
    Success(bool),
}

static ATOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^(?P<key>[a-z_]+)(?P<op>[:>])(?P<val>.+)$").unwrap()
});

/// Parse the whitespace-separated atom list; unknown atoms are ignored.
fn parse_atoms(filter_expr: &str) -> Vec<Atom> {
    filter_expr
        .to_lowercase()
        .split_whitespace()
        .filter_map(|word| {
            let caps = ATOM_RE.captures(word)?;
            let key = caps.name("key")?.as_str();
            let op = caps.name("op")?.as_str();
            let val = caps.name("val")?.as_str();
            match (key, op) {
                ("model", ":") => Some(Atom::ModelContains(val.to_string())),
                ("duration", ">") => val.parse().ok().map(Atom::DurationOver),
                ("tool_calls", ">") => val.parse().ok().map(Atom::ToolCallsOver),
                ("success", ":") => match val {
                    "true" => Some(Atom::Success(true)),
                    "false" => Some(Atom::Success(false)),
                    _ => None,
                },
                _ => None,
            }
        })
        .collect()
}

fn matches(entry: &LogEntry, atoms: &[Atom]) -> bool {
    atoms.iter().all(|atom| match atom {
        Atom::ModelContains(sub) => entry.model().to_lowercase().contains(sub),
        Atom::DurationOver(thresh) => entry.duration_sec.unwrap_or(0.0) > *thresh,
        Atom::ToolCallsOver(thresh) => entry.tool_calls.unwrap_or(0) > *thresh,
        Atom::Success(wanted) => entry.success.unwrap_or(false) == *wanted,
    })
}

/// Filter log entries with the atom grammar and render up to `limit`
/// numbered matches.
pub fn query(memory_dir: &Path, filter_expr: &str, limit: usize) -> String {
    let entries = load_recent(memory_dir, QUERY_DAYS_BACK, QUERY_LOAD_LIMIT);
    if entries.is_empty() {
        return "No logs available.".to_string();
    }

    let atoms = parse_atoms(filter_expr);
    let results: Vec<&LogEntry> = entries
        .iter()
        .filter(|entry| matches(entry, &atoms))
        .take(limit)
        .collect();

    if results.is_empty() {
        return format!("No matching LLM calls found for filter: '{filter_expr}'");
    }

    let mut out = format!("Found {} matching LLM calls:\n\n", results.len());
    for (i, entry) in results.iter().enumerate() {
        let dur = entry.duration_sec.map_or_else(|| "\u{2014}".to_string(), |d| d.to_string());
        let tokens_in = entry.input_tokens.map_or_else(|| "\u{2014}".to_string(), thousands);
        let tokens_out = entry.output_tokens.map_or_else(|| "\u{2014}".to_string(), thousands);
        let _ = writeln!(
            out,
            "{}. {} | {} | dur={dur}s | tools={} | in={tokens_in} out={tokens_out}",
            i + 1,
            entry.timestamp,
            entry.model(),
            entry.tool_calls.unwrap_or(0),
        );
        let _ = writeln!(out, "   Prompt: {}", entry.prompt_snippet());
        let _ = writeln!(out, "   Response: {}", entry.response_snippet());
        out.push('\n');
    }
    out.trim_end().to_string()
}
