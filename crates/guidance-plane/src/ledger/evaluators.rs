//! Built-in evaluators (spec §4.4). Grounded on
//! `ai-dx-mcp/src/structured_report.rs`'s registration-order execution and
//! `checks/quality_delta.rs`'s ratio-threshold shape.

use crate::types::{EvaluatorResult, RunEvent};
use regex::Regex;

pub trait Evaluator: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, event: &RunEvent, history: &[RunEvent]) -> EvaluatorResult;
}

fn result(name: &'static str, passed: bool, score: f64, detail: String) -> EvaluatorResult {
    EvaluatorResult {
        name: name.to_string(),
        passed,
        score,
        detail,
    }
}

pub struct TestsPassEvaluator;

impl Evaluator for TestsPassEvaluator {
    fn name(&self) -> &'static str {
        "tests-pass"
    }

    fn evaluate(&self, event: &RunEvent, _history: &[RunEvent]) -> EvaluatorResult {
        let passed = event.tests_passed == Some(true);
        result(
            self.name(),
            passed,
            if passed { 1.0 } else { 0.0 },
            format!("tests_passed={:?}", event.tests_passed),
        )
    }
}

pub struct ForbiddenCommandScanEvaluator {
    patterns: Vec<Regex>,
}

impl ForbiddenCommandScanEvaluator {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }
}

impl Evaluator for ForbiddenCommandScanEvaluator {
    fn name(&self) -> &'static str {
        "forbidden-command-scan"
    }

    fn evaluate(&self, event: &RunEvent, _history: &[RunEvent]) -> EvaluatorResult {
        for used in &event.tools_used {
            if let Some(re) = self.patterns.iter().find(|re| re.is_match(used)) {
                return result(
                    self.name(),
                    false,
                    0.0,
                    format!("tool use `{used}` matches forbidden pattern `{}`", re.as_str()),
                );
            }
        }
        result(self.name(), true, 1.0, "no forbidden commands recorded".to_string())
    }
}

pub struct ForbiddenDependencyScanEvaluator {
    disallowed_tokens: Vec<String>,
}

impl ForbiddenDependencyScanEvaluator {
    pub fn new(disallowed_tokens: Vec<String>) -> Self {
        Self { disallowed_tokens }
    }
}

impl Evaluator for ForbiddenDependencyScanEvaluator {
    fn name(&self) -> &'static str {
        "forbidden-dependency-scan"
    }

    fn evaluate(&self, event: &RunEvent, _history: &[RunEvent]) -> EvaluatorResult {
        let haystacks = event.files_modified.iter().chain(event.tools_used.iter());
        for hay in haystacks {
            if let Some(tok) = self.disallowed_tokens.iter().find(|t| hay.contains(t.as_str())) {
                return result(
                    self.name(),
                    false,
                    0.0,
                    format!("`{hay}` introduces disallowed dependency token `{tok}`"),
                );
            }
        }
        result(
            self.name(),
            true,
            1.0,
            "no disallowed dependency tokens found".to_string(),
        )
    }
}

pub struct ViolationRateEvaluator {
    pub window: usize,
    pub max_rate_per_10_tasks: f64,
}

impl Evaluator for ViolationRateEvaluator {
    fn name(&self) -> &'static str {
        "violation-rate"
    }

    fn evaluate(&self, event: &RunEvent, history: &[RunEvent]) -> EvaluatorResult {
        let mut window: Vec<&RunEvent> = history.iter().rev().take(self.window.saturating_sub(1)).collect();
        window.push(event);
        let tasks = window.len().max(1) as f64;
        let violations: usize = window.iter().map(|e| e.violations.len()).sum();
        let rate = (violations as f64 / tasks) * 10.0;
        let passed = rate <= self.max_rate_per_10_tasks;
        result(
            self.name(),
            passed,
            rate,
            format!(
                "{violations} violations over {} tasks => {rate:.2} per 10 tasks (max {})",
                tasks as u64, self.max_rate_per_10_tasks
            ),
        )
    }
}

pub struct DiffQualityEvaluator {
    pub max_rework_ratio: f64,
}

impl Evaluator for DiffQualityEvaluator {
    fn name(&self) -> &'static str {
        "diff-quality"
    }

    fn evaluate(&self, event: &RunEvent, _history: &[RunEvent]) -> EvaluatorResult {
        let denom = event.diff_summary.lines_added + event.diff_summary.lines_removed;
        if denom == 0 {
            return result(self.name(), true, 1.0, "no diff lines; vacuously passes".to_string());
        }
        let ratio = event.diff_summary.rework_lines as f64 / denom as f64;
        let passed = ratio <= self.max_rework_ratio;
        result(
            self.name(),
            passed,
            ratio,
            format!("rework ratio {ratio:.3} (max {})", self.max_rework_ratio),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiffSummary, RunOutcome, TaskIntent};
    use std::collections::BTreeMap;

    fn base_event() -> RunEvent {
        RunEvent {
            schema_version: 1,
            id: "e1".to_string(),
            task_intent: TaskIntent::General,
            prompt_digest: "d".to_string(),
            guidance_hash: "h".to_string(),
            retrieved_rule_ids: vec![],
            tools_used: vec![],
            files_modified: vec![],
            diff_summary: DiffSummary::default(),
            tests_passed: None,
            violations: vec![],
            started_at: 0,
            finalized_at: Some(1),
            outcome: Some(RunOutcome::Success),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn tests_pass_requires_explicit_true() {
        let mut e = base_event();
        assert!(!TestsPassEvaluator.evaluate(&e, &[]).passed);
        e.tests_passed = Some(false);
        assert!(!TestsPassEvaluator.evaluate(&e, &[]).passed);
        e.tests_passed = Some(true);
        assert!(TestsPassEvaluator.evaluate(&e, &[]).passed);
    }

    #[test]
    fn diff_quality_passes_on_zero_denominator() {
        let e = base_event();
        let ev = DiffQualityEvaluator { max_rework_ratio: 0.3 };
        assert!(ev.evaluate(&e, &[]).passed);
    }

    #[test]
    fn diff_quality_fails_over_ratio() {
        let mut e = base_event();
        e.diff_summary = DiffSummary {
            lines_added: 100,
            lines_removed: 0,
            files_changed: 1,
            rework_lines: 40,
        };
        let ev = DiffQualityEvaluator { max_rework_ratio: 0.3 };
        assert!(!ev.evaluate(&e, &[]).passed);
    }

    #[test]
    fn forbidden_dependency_scan_flags_token_in_modified_file() {
        let mut e = base_event();
        e.files_modified = vec!["package.json".to_string()];
        e.tools_used = vec!["npm install event-stream".to_string()];
        let ev = ForbiddenDependencyScanEvaluator::new(vec!["event-stream".to_string()]);
        assert!(!ev.evaluate(&e, &[]).passed);
    }
}
