//! Ledger (spec §4.4): append-only run event log plus pluggable evaluators.
//! Grounded on `ai-dx-mcp/src/witness.rs`'s append-only event journal and
//! `structured_report.rs`'s fixed-order evaluator pipeline.

pub mod evaluators;

use crate::error::InvalidState;
use crate::storage;
use crate::types::{CycleMetrics, EvaluatorResult, RunEvent, RunOutcome, Violation, ViolationRanking};
use evaluators::Evaluator;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct Ledger {
    events_path: PathBuf,
    events: Vec<RunEvent>,
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl Ledger {
    /// Loads any events already on disk at `events_path` (empty if none),
    /// in the registration order `evaluators` were supplied.
    pub fn open(events_path: &Path, evaluators: Vec<Box<dyn Evaluator>>) -> std::io::Result<Self> {
        let events = storage::read_jsonl(events_path)?;
        Ok(Self {
            events_path: events_path.to_path_buf(),
            events,
            evaluators,
        })
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Opens a new in-memory event; it is not persisted until `finalize_event`.
    pub fn create_event(&self, event: RunEvent) -> RunEvent {
        event
    }

    pub fn record_violation(&self, event: &mut RunEvent, violation: Violation) -> Result<(), InvalidState> {
        if event.is_finalized() {
            return Err(InvalidState::AlreadyFinalized(event.id.clone()));
        }
        event.violations.push(violation);
        Ok(())
    }

    pub fn accumulate_diff(
        &self,
        event: &mut RunEvent,
        lines_added: u64,
        lines_removed: u64,
        files_changed: u64,
        rework_lines: u64,
    ) -> Result<(), InvalidState> {
        if event.is_finalized() {
            return Err(InvalidState::AlreadyFinalized(event.id.clone()));
        }
        event.diff_summary.lines_added += lines_added;
        event.diff_summary.lines_removed += lines_removed;
        event.diff_summary.files_changed += files_changed;
        event.diff_summary.rework_lines += rework_lines;
        Ok(())
    }

    /// Runs every evaluator in registration order, freezes the event, appends
    /// it to the on-disk log, and returns the per-evaluator results alongside
    /// the frozen event. Finalizing twice is an error (spec §8).
    pub fn finalize_event(
        &mut self,
        mut event: RunEvent,
        finalized_at: i64,
        outcome: RunOutcome,
    ) -> Result<(RunEvent, Vec<EvaluatorResult>), InvalidState> {
        if event.is_finalized() {
            return Err(InvalidState::AlreadyFinalized(event.id));
        }
        let results: Vec<EvaluatorResult> = self
            .evaluators
            .iter()
            .map(|e| e.evaluate(&event, &self.events))
            .collect();
        event.finalized_at = Some(finalized_at);
        event.outcome = Some(outcome);
        storage::append_jsonl(&self.events_path, &event)
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;
        self.events.push(event.clone());
        Ok((event, results))
    }

    /// Violations ranked by `frequency * cost` descending; ties broken by
    /// `rule_id` ascending (spec §4.4).
    pub fn rank_violations(&self) -> Vec<ViolationRanking> {
        let mut by_rule: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for event in &self.events {
            for v in &event.violations {
                let entry = by_rule.entry(v.rule_id.clone()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 += v.cost;
            }
        }
        let mut rankings: Vec<ViolationRanking> = by_rule
            .into_iter()
            .map(|(rule_id, (frequency, cost))| ViolationRanking {
                score: frequency * cost,
                rule_id,
                frequency,
                cost,
            })
            .collect();
        rankings.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.rule_id.cmp(&b.rule_id)));
        rankings
    }

    /// Aggregate metrics over the most recent `window` finalized events.
    pub fn compute_metrics(&self, window: usize) -> CycleMetrics {
        let finalized: Vec<&RunEvent> = self.events.iter().filter(|e| e.is_finalized()).collect();
        let slice_start = finalized.len().saturating_sub(window);
        let slice = &finalized[slice_start..];
        if slice.is_empty() {
            return CycleMetrics::default();
        }
        let tasks = slice.len() as f64;
        let violations: usize = slice.iter().map(|e| e.violations.len()).sum();
        let violation_rate_per_10_tasks = (violations as f64 / tasks) * 10.0;

        let rework_ratios: Vec<f64> = slice
            .iter()
            .filter_map(|e| {
                let denom = e.diff_summary.lines_added + e.diff_summary.lines_removed;
                if denom == 0 {
                    None
                } else {
                    Some(e.diff_summary.rework_lines as f64 / denom as f64)
                }
            })
            .collect();
        let avg_rework_ratio = if rework_ratios.is_empty() {
            0.0
        } else {
            rework_ratios.iter().sum::<f64>() / rework_ratios.len() as f64
        };

        let risk_score: f64 = slice
            .iter()
            .flat_map(|e| e.violations.iter())
            .map(|v| v.severity.severity() as f64)
            .sum::<f64>()
            / tasks;

        CycleMetrics {
            violation_rate_per_10_tasks,
            avg_rework_ratio,
            risk_score,
        }
    }
}
