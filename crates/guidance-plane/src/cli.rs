//! Hand-rolled argument parsing for the `guidance-plane` binary, in the
//! shape of `ai-dx-mcp/src/cli.rs`: `match args[1]`, per-subcommand parse
//! functions returning `Result<_, String>`, no derive-macro CLI crate.

use guidance_plane::types::{GateDecision, RunOutcome, TaskIntent};

pub(crate) fn print_help() {
    println!(
        "Usage:\n  guidance-plane compile <rules-doc> [--overlay <path>] [--config <path>] [--state-dir <path>]\n  guidance-plane retrieve <rules-doc> --task <description> [--repo-path <path>] [--top-k <n>]\n  guidance-plane gate command <cmd-string>\n  guidance-plane gate tool <tool-name> <params-json>\n  guidance-plane gate edit <path> <diff-lines>\n  guidance-plane ledger <rules-doc> --event-id <id> --task-intent <intent> --outcome <outcome>\n    [--prompt-digest <d>] [--guidance-hash <h>] [--tests-passed true|false]\n    [--diff <added>:<removed>:<files>:<rework>]\n    [--violation <rule-id>:<gate-name>:<severity>:<cost>]... [--finalized-at <ms>]\n  guidance-plane optimize <rules-doc> [--state-dir <path>]\n\nDefaults:\n  --state-dir: ./.guidance\n  --config: <rules-doc-dir>/guidance.toml (if present)\n"
    );
}

pub(crate) fn parse_task_intent(s: &str) -> Result<TaskIntent, String> {
    match s {
        "bug-fix" => Ok(TaskIntent::BugFix),
        "feature" => Ok(TaskIntent::Feature),
        "refactor" => Ok(TaskIntent::Refactor),
        "security" => Ok(TaskIntent::Security),
        "performance" => Ok(TaskIntent::Performance),
        "testing" => Ok(TaskIntent::Testing),
        "docs" => Ok(TaskIntent::Docs),
        "deployment" => Ok(TaskIntent::Deployment),
        "architecture" => Ok(TaskIntent::Architecture),
        "debug" => Ok(TaskIntent::Debug),
        "general" => Ok(TaskIntent::General),
        other => Err(format!(
            "unknown --task-intent `{other}`; expected one of bug-fix|feature|refactor|security|performance|testing|docs|deployment|architecture|debug|general"
        )),
    }
}

pub(crate) fn parse_run_outcome(s: &str) -> Result<RunOutcome, String> {
    match s {
        "success" => Ok(RunOutcome::Success),
        "failure" => Ok(RunOutcome::Failure),
        "aborted" => Ok(RunOutcome::Aborted),
        other => Err(format!("unknown --outcome `{other}`; expected one of success|failure|aborted")),
    }
}

pub(crate) fn parse_gate_decision(s: &str) -> Result<GateDecision, String> {
    match s {
        "allow" => Ok(GateDecision::Allow),
        "warn" => Ok(GateDecision::Warn),
        "require-confirmation" => Ok(GateDecision::RequireConfirmation),
        "block" => Ok(GateDecision::Block),
        other => Err(format!(
            "unknown violation severity `{other}`; expected one of allow|warn|require-confirmation|block"
        )),
    }
}

/// `<rule-id>:<gate-name>:<severity>:<cost>`, parsed for `ledger --violation`.
#[derive(Debug)]
pub(crate) struct ViolationArg {
    pub(crate) rule_id: String,
    pub(crate) gate_name: String,
    pub(crate) severity: GateDecision,
    pub(crate) cost: u64,
}

fn parse_violation_arg(raw: &str) -> Result<ViolationArg, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [rule_id, gate_name, severity, cost] = parts.as_slice() else {
        return Err(format!(
            "invalid --violation `{raw}`; expected <rule-id>:<gate-name>:<severity>:<cost>"
        ));
    };
    Ok(ViolationArg {
        rule_id: rule_id.to_string(),
        gate_name: gate_name.to_string(),
        severity: parse_gate_decision(severity)?,
        cost: cost.parse().map_err(|_| format!("invalid cost in --violation `{raw}`"))?,
    })
}

/// `<added>:<removed>:<files>:<rework>`, parsed for `ledger --diff`.
#[derive(Debug)]
pub(crate) struct DiffArg {
    pub(crate) lines_added: u64,
    pub(crate) lines_removed: u64,
    pub(crate) files_changed: u64,
    pub(crate) rework_lines: u64,
}

fn parse_diff_arg(raw: &str) -> Result<DiffArg, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [added, removed, files, rework] = parts.as_slice() else {
        return Err(format!("invalid --diff `{raw}`; expected <added>:<removed>:<files>:<rework>"));
    };
    let parse = |s: &str| s.parse::<u64>().map_err(|_| format!("invalid number in --diff `{raw}`"));
    Ok(DiffArg {
        lines_added: parse(added)?,
        lines_removed: parse(removed)?,
        files_changed: parse(files)?,
        rework_lines: parse(rework)?,
    })
}

pub(crate) fn default_state_dir(state_dir: Option<String>) -> String {
    state_dir.unwrap_or_else(|| ".guidance".to_string())
}

pub(crate) struct CompileCli {
    pub(crate) rules_doc: String,
    pub(crate) overlay: Option<String>,
    pub(crate) config: Option<String>,
    pub(crate) state_dir: String,
}

pub(crate) fn parse_compile_cli(args: &[String]) -> Result<CompileCli, String> {
    let rules_doc = args
        .first()
        .cloned()
        .ok_or_else(|| "missing <rules-doc> argument".to_string())?;
    let mut overlay = None;
    let mut config = None;
    let mut state_dir = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--overlay" => {
                overlay = Some(next_value(args, &mut i, "--overlay")?);
            }
            "--config" => {
                config = Some(next_value(args, &mut i, "--config")?);
            }
            "--state-dir" => {
                state_dir = Some(next_value(args, &mut i, "--state-dir")?);
            }
            other => return Err(format!("unknown flag `{other}`")),
        }
    }
    Ok(CompileCli {
        rules_doc,
        overlay,
        config,
        state_dir: default_state_dir(state_dir),
    })
}

#[derive(Debug)]
pub(crate) struct RetrieveCli {
    pub(crate) rules_doc: String,
    pub(crate) task: String,
    pub(crate) repo_path: Option<String>,
    pub(crate) top_k: Option<usize>,
    pub(crate) config: Option<String>,
    pub(crate) state_dir: String,
}

pub(crate) fn parse_retrieve_cli(args: &[String]) -> Result<RetrieveCli, String> {
    let rules_doc = args
        .first()
        .cloned()
        .ok_or_else(|| "missing <rules-doc> argument".to_string())?;
    let mut task = None;
    let mut repo_path = None;
    let mut top_k = None;
    let mut config = None;
    let mut state_dir = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--task" => task = Some(next_value(args, &mut i, "--task")?),
            "--repo-path" => repo_path = Some(next_value(args, &mut i, "--repo-path")?),
            "--top-k" => {
                let raw = next_value(args, &mut i, "--top-k")?;
                top_k = Some(raw.parse::<usize>().map_err(|_| format!("invalid --top-k value `{raw}`"))?);
            }
            "--config" => config = Some(next_value(args, &mut i, "--config")?),
            "--state-dir" => state_dir = Some(next_value(args, &mut i, "--state-dir")?),
            other => return Err(format!("unknown flag `{other}`")),
        }
    }
    Ok(RetrieveCli {
        rules_doc,
        task: task.ok_or_else(|| "missing --task <description>".to_string())?,
        repo_path,
        top_k,
        config,
        state_dir: default_state_dir(state_dir),
    })
}

#[derive(Debug)]
pub(crate) struct LedgerCli {
    pub(crate) rules_doc: String,
    pub(crate) event_id: String,
    pub(crate) task_intent: TaskIntent,
    pub(crate) outcome: RunOutcome,
    pub(crate) prompt_digest: String,
    pub(crate) guidance_hash: String,
    pub(crate) tests_passed: Option<bool>,
    pub(crate) diff: Option<DiffArg>,
    pub(crate) violations: Vec<ViolationArg>,
    pub(crate) finalized_at: Option<i64>,
    pub(crate) config: Option<String>,
    pub(crate) state_dir: String,
}

pub(crate) fn parse_ledger_cli(args: &[String]) -> Result<LedgerCli, String> {
    let rules_doc = args
        .first()
        .cloned()
        .ok_or_else(|| "missing <rules-doc> argument".to_string())?;
    let mut event_id = None;
    let mut task_intent = None;
    let mut outcome = None;
    let mut prompt_digest = String::new();
    let mut guidance_hash = String::new();
    let mut tests_passed = None;
    let mut diff = None;
    let mut violations = Vec::new();
    let mut finalized_at = None;
    let mut config = None;
    let mut state_dir = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--event-id" => event_id = Some(next_value(args, &mut i, "--event-id")?),
            "--task-intent" => task_intent = Some(parse_task_intent(&next_value(args, &mut i, "--task-intent")?)?),
            "--outcome" => outcome = Some(parse_run_outcome(&next_value(args, &mut i, "--outcome")?)?),
            "--prompt-digest" => prompt_digest = next_value(args, &mut i, "--prompt-digest")?,
            "--guidance-hash" => guidance_hash = next_value(args, &mut i, "--guidance-hash")?,
            "--tests-passed" => {
                let raw = next_value(args, &mut i, "--tests-passed")?;
                tests_passed = Some(raw.parse::<bool>().map_err(|_| format!("invalid --tests-passed value `{raw}`"))?);
            }
            "--diff" => diff = Some(parse_diff_arg(&next_value(args, &mut i, "--diff")?)?),
            "--violation" => violations.push(parse_violation_arg(&next_value(args, &mut i, "--violation")?)?),
            "--finalized-at" => {
                let raw = next_value(args, &mut i, "--finalized-at")?;
                finalized_at = Some(raw.parse::<i64>().map_err(|_| format!("invalid --finalized-at value `{raw}`"))?);
            }
            "--config" => config = Some(next_value(args, &mut i, "--config")?),
            "--state-dir" => state_dir = Some(next_value(args, &mut i, "--state-dir")?),
            other => return Err(format!("unknown flag `{other}`")),
        }
    }
    Ok(LedgerCli {
        rules_doc,
        event_id: event_id.ok_or_else(|| "missing --event-id <id>".to_string())?,
        task_intent: task_intent.ok_or_else(|| "missing --task-intent <intent>".to_string())?,
        outcome: outcome.ok_or_else(|| "missing --outcome <outcome>".to_string())?,
        prompt_digest,
        guidance_hash,
        tests_passed,
        diff,
        violations,
        finalized_at,
        config,
        state_dir: default_state_dir(state_dir),
    })
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    let value = args
        .get(*i + 1)
        .cloned()
        .ok_or_else(|| format!("missing value for {flag}"))?;
    *i += 2;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compile_cli_requires_rules_doc() {
        assert!(parse_compile_cli(&[]).is_err());
    }

    #[test]
    fn compile_cli_parses_flags() {
        let parsed = parse_compile_cli(&v(&["rules.md", "--overlay", "local.md", "--state-dir", "/tmp/s"])).unwrap();
        assert_eq!(parsed.rules_doc, "rules.md");
        assert_eq!(parsed.overlay.as_deref(), Some("local.md"));
        assert_eq!(parsed.state_dir, "/tmp/s");
    }

    #[test]
    fn retrieve_cli_requires_task() {
        let err = parse_retrieve_cli(&v(&["rules.md"])).unwrap_err();
        assert!(err.contains("--task"));
    }

    #[test]
    fn retrieve_cli_parses_top_k() {
        let parsed = parse_retrieve_cli(&v(&["rules.md", "--task", "fix the bug", "--top-k", "3"])).unwrap();
        assert_eq!(parsed.top_k, Some(3));
    }

    #[test]
    fn ledger_cli_requires_event_id_and_task_intent_and_outcome() {
        assert!(parse_ledger_cli(&v(&["rules.md"])).is_err());
        assert!(parse_ledger_cli(&v(&["rules.md", "--event-id", "e1"])).is_err());
    }

    #[test]
    fn ledger_cli_parses_diff_and_violation_and_finalized_at() {
        let parsed = parse_ledger_cli(&v(&[
            "rules.md",
            "--event-id",
            "e1",
            "--task-intent",
            "bug-fix",
            "--outcome",
            "success",
            "--diff",
            "100:10:2:5",
            "--violation",
            "R010:secrets:block:25",
            "--finalized-at",
            "42",
        ]))
        .unwrap();
        assert_eq!(parsed.event_id, "e1");
        assert_eq!(parsed.task_intent, TaskIntent::BugFix);
        assert_eq!(parsed.outcome, RunOutcome::Success);
        assert_eq!(parsed.finalized_at, Some(42));
        let diff = parsed.diff.unwrap();
        assert_eq!(diff.lines_added, 100);
        assert_eq!(diff.rework_lines, 5);
        assert_eq!(parsed.violations.len(), 1);
        assert_eq!(parsed.violations[0].rule_id, "R010");
        assert_eq!(parsed.violations[0].severity, GateDecision::Block);
        assert_eq!(parsed.violations[0].cost, 25);
    }

    #[test]
    fn ledger_cli_rejects_malformed_violation() {
        let err = parse_ledger_cli(&v(&[
            "rules.md",
            "--event-id",
            "e1",
            "--task-intent",
            "bug-fix",
            "--outcome",
            "success",
            "--violation",
            "not-enough-parts",
        ]))
        .unwrap_err();
        assert!(err.contains("--violation"));
    }
}
