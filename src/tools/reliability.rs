//! Reliability bookkeeping: per-tool success/helpfulness stats, persisted as
//! pretty-printed JSON in `tool-reliability.json` under the memory directory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

const RELIABILITY_FILE: &str = "tool-reliability.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalStats {
    calls: u64,
    success_count: u64,
    helpfulness_sum: f64,
    notes: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GoalStats {
    calls: u64,
    success_count: u64,
    helpfulness_sum: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    global: BTreeMap<String, GlobalStats>,
    per_goal: BTreeMap<String, BTreeMap<String, GoalStats>>,
}

/// Load the store, starting empty when the file is missing or unparseable.
fn load_store(memory_dir: &Path) -> Store {
    let path = memory_dir.join(RELIABILITY_FILE);
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

fn save_store(memory_dir: &Path, store: &Store) -> anyhow::Result<()> {
    std::fs::create_dir_all(memory_dir)
        .with_context(|| format!("failed to create {}", memory_dir.display()))?;
    let path = memory_dir.join(RELIABILITY_FILE);
    let content = serde_json::to_string_pretty(store)?;
    std::fs::write(&path, content)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn success_pct(success_count: u64, calls: u64) -> f64 {
    if calls == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        success_count as f64 / calls as f64 * 100.0
    }
}

fn avg_helpfulness(sum: f64, calls: u64) -> f64 {
    if calls == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        sum / calls as f64
    }
}

/// Record one observation and return a confirmation string quoting the
/// recorded values and the tool's updated global stats.
pub fn record(
    memory_dir: &Path,
    tool_name: &str,
    goal_id: Option<i64>,
    success: bool,
    helpfulness: f64,
    notes: &str,
) -> String {
    if tool_name.is_empty() {
        return "Error: tool_name required".to_string();
    }

    let mut store = load_store(memory_dir);
    let clamped = helpfulness.clamp(0.0, 1.0);

    let g = store.global.entry(tool_name.to_string()).or_default();
    g.calls += 1;
    if success {
        g.success_count += 1;
    }
    g.helpfulness_sum += clamped;
    if !notes.is_empty() {
        g.notes.push(notes.to_string());
    }
    let (calls, pct, avg) = (
        g.calls,
        success_pct(g.success_count, g.calls),
        avg_helpfulness(g.helpfulness_sum, g.calls),
    );

    if let Some(goal) = goal_id {
        let p = store
            .per_goal
            .entry(goal.to_string())
            .or_default()
            .entry(tool_name.to_string())
            .or_default();
        p.calls += 1;
        if success {
            p.success_count += 1;
        }
        p.helpfulness_sum += clamped;
    }

    if let Err(e) = save_store(memory_dir, &store) {
        return format!("Error: failed to save reliability data: {e:#}");
    }

    format!(
        "Reliability recorded for '{tool_name}': success={success}, helpfulness={helpfulness:.2}\n\
         Global stats: {calls} calls, {pct:.1}% success, avg helpfulness {avg:.2}"
    )
}

/// Append one `• tool: …` line per tool, sorted by call count descending.
fn render_stats_lines(
    out: &mut String,
    entries: impl Iterator<Item = (String, u64, u64, f64)>,
) {
    let mut rows: Vec<(String, u64, u64, f64)> = entries.collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    for (tool, calls, success_count, helpfulness_sum) in rows {
        let pct = success_pct(success_count, calls);
        let avg = avg_helpfulness(helpfulness_sum, calls);
        let _ = writeln!(
            out,
            "  \u{2022} {tool}: {calls} calls, {pct:.1}% success, avg helpfulness {avg:.2}"
        );
    }
}

/// Render aggregated reliability stats: the global section when requested
/// and present, then the per-goal section for a requested goal.
pub fn list(memory_dir: &Path, goal_id: Option<i64>, include_global: bool) -> String {
    let store = load_store(memory_dir);
    let mut out = String::new();

    if include_global && !store.global.is_empty() {
        out.push_str("Global tool reliability:\n");
        render_stats_lines(
            &mut out,
            store
                .global
                .iter()
                .map(|(t, s)| (t.clone(), s.calls, s.success_count, s.helpfulness_sum)),
        );
        out.push('\n');
    }

    if let Some(goal) = goal_id {
        match store.per_goal.get(&goal.to_string()) {
            Some(tools) if !tools.is_empty() => {
                let _ = writeln!(out, "Goal {goal} specific tool reliability:");
                render_stats_lines(
                    &mut out,
                    tools
                        .iter()
                        .map(|(t, s)| (t.clone(), s.calls, s.success_count, s.helpfulness_sum)),
                );
            }
            _ => {
                let _ = writeln!(out, "No per-goal data for goal {goal} yet.");
            }
        }
    }

    if out.is_empty() {
        return "No tool reliability data recorded yet.".to_string();
    }
    out.trim_end().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn record_creates_file_and_reports_stats() {
        let dir = tempfile::tempdir().unwrap();
        let msg = record(dir.path(), "run_safe_shell", None, true, 0.8, "");
        assert!(msg.contains("Reliability recorded for 'run_safe_shell'"));
        assert!(msg.contains("1 calls, 100.0% success, avg helpfulness 0.80"));
        assert!(dir.path().join(RELIABILITY_FILE).exists());
    }

    #[test]
    fn record_requires_a_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(record(dir.path(), "", None, true, 0.5, ""), "Error: tool_name required");
        assert!(!dir.path().join(RELIABILITY_FILE).exists());
    }

    #[test]
    fn helpfulness_is_clamped_into_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", None, true, 7.5, "");
        record(dir.path(), "t", None, false, -3.0, "");
        let store = load_store(dir.path());
        let stats = store.global.get("t").unwrap();
        assert!((stats.helpfulness_sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_accumulates_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", None, true, 1.0, "");
        let msg = record(dir.path(), "t", None, false, 0.0, "");
        assert!(msg.contains("2 calls, 50.0% success, avg helpfulness 0.50"));
    }

    #[test]
    fn notes_are_appended_only_when_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", None, true, 0.5, "worked well");
        record(dir.path(), "t", None, true, 0.5, "");
        let store = load_store(dir.path());
        assert_eq!(store.global.get("t").unwrap().notes, vec!["worked well"]);
    }

    #[test]
    fn goal_id_updates_the_per_goal_block() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", Some(7), true, 0.5, "");
        record(dir.path(), "t", None, true, 0.5, "");
        let store = load_store(dir.path());
        assert_eq!(store.per_goal.get("7").unwrap().get("t").unwrap().calls, 1);
        assert_eq!(store.global.get("t").unwrap().calls, 2);
    }

    #[test]
    fn unparseable_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(RELIABILITY_FILE), "not json at all").unwrap();
        let msg = record(dir.path(), "t", None, true, 0.5, "");
        assert!(msg.contains("1 calls"));
    }

    #[test]
    fn list_with_no_data() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(list(dir.path(), None, true), "No tool reliability data recorded yet.");
    }

    #[test]
    fn list_sorts_by_call_count_descending() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "rare", None, true, 0.5, "");
        record(dir.path(), "frequent", None, true, 0.5, "");
        record(dir.path(), "frequent", None, true, 0.5, "");
        let out = list(dir.path(), None, true);
        let frequent_pos = out.find("frequent").unwrap();
        let rare_pos = out.find("rare").unwrap();
        assert!(frequent_pos < rare_pos);
    }

    #[test]
    fn list_reports_missing_goal_data() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", None, true, 0.5, "");
        let out = list(dir.path(), Some(42), true);
        assert!(out.contains("Global tool reliability:"));
        assert!(out.contains("No per-goal data for goal 42 yet."));
    }

    #[test]
    fn list_goal_section_without_global() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "t", Some(3), true, 0.5, "");
        let out = list(dir.path(), Some(3), false);
        assert!(!out.contains("Global"));
        assert!(out.contains("Goal 3 specific tool reliability:"));
        assert!(out.contains("\u{2022} t: 1 calls"));
    }
}
