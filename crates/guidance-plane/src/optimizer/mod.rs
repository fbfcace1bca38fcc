//! Optimizer (spec §4.5): weekly A/B loop proposing, evaluating, and
//! promoting rule changes via a win-twice stability rule. Grounded on the
//! teacher's `judge/mod.rs` decision-from-reasons shape, adapted into a
//! promotion state machine.

pub mod executor;

use crate::config::GuidanceConfig;
use crate::error::{GuidanceError, InvalidState};
use crate::ledger::Ledger;
use crate::storage;
use crate::types::{
    ABTestResult, CycleMetrics, RuleADR, RuleChange, RuleChangeKind, RuleSource, RuleShard,
    ViolationRanking, WinTracker,
};
use executor::{fallback_candidate_metrics, AbExecutor, ExecutorFailure};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug)]
pub struct CycleOutcome {
    pub adrs: Vec<RuleADR>,
    pub ran: bool,
}

pub struct Optimizer {
    adrs_path: PathBuf,
    tracker_path: PathBuf,
    wins: BTreeMap<String, u32>,
    tracker_extra: BTreeMap<String, serde_json::Value>,
    next_adr_number: u64,
    events_since_last_cycle: usize,
    in_flight: bool,
}

impl Optimizer {
    pub fn open(adrs_path: &std::path::Path, tracker_path: &std::path::Path) -> std::io::Result<Self> {
        let adrs: Vec<RuleADR> = storage::read_jsonl(adrs_path)?;
        let tracker: WinTracker = storage::read_json_file(tracker_path)?.unwrap_or_default();
        let next_adr_number = adrs.iter().map(|a| a.number).max().unwrap_or(0) + 1;
        Ok(Self {
            adrs_path: adrs_path.to_path_buf(),
            tracker_path: tracker_path.to_path_buf(),
            wins: tracker.wins,
            tracker_extra: tracker.extra,
            next_adr_number,
            events_since_last_cycle: 0,
            in_flight: false,
        })
    }

    pub fn note_event_finalized(&mut self) {
        self.events_since_last_cycle += 1;
    }

    fn persist(&self, adr: &RuleADR) -> Result<(), InvalidState> {
        storage::append_jsonl(&self.adrs_path, adr)
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;
        let tracker = WinTracker {
            schema_version: 1,
            wins: self.wins.clone(),
            extra: self.tracker_extra.clone(),
        };
        storage::write_json_file(&self.tracker_path, &tracker)
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;
        Ok(())
    }

    fn decide_change(ranking: &ViolationRanking, matching_rule: Option<&RuleShard>) -> RuleChange {
        if let Some(shard) = matching_rule {
            if ranking.frequency > 5 {
                return RuleChange {
                    kind: RuleChangeKind::Modify,
                    target_rule_id: Some(shard.rule.id.clone()),
                    proposed_text: Some(format!(
                        "{} [enforcement: repeated violations, frequency={}]",
                        shard.rule.text, ranking.frequency
                    )),
                    rationale: format!(
                        "rule {} violated {} times; sharpening text and flagging enforcement",
                        shard.rule.id, ranking.frequency
                    ),
                };
            }
            if ranking.cost > 50 {
                return RuleChange {
                    kind: RuleChangeKind::Modify,
                    target_rule_id: Some(shard.rule.id.clone()),
                    proposed_text: Some(format!(
                        "{} [cost warning: {} rework lines attributed]",
                        shard.rule.text, ranking.cost
                    )),
                    rationale: format!(
                        "rule {} attracted {} rework lines; elevating priority and warning",
                        shard.rule.id, ranking.cost
                    ),
                };
            }
            return RuleChange {
                kind: RuleChangeKind::Modify,
                target_rule_id: Some(shard.rule.id.clone()),
                proposed_text: None,
                rationale: format!(
                    "rule {} ranked among top violations but below the frequency/cost thresholds; minor touch-up",
                    shard.rule.id
                ),
            };
        }
        RuleChange {
            kind: RuleChangeKind::Add,
            target_rule_id: None,
            proposed_text: Some(format!(
                "Address recurring violation of rule {} (frequency={}, cost={})",
                ranking.rule_id, ranking.frequency, ranking.cost
            )),
            rationale: format!(
                "no existing local rule covers violation pattern for {}; proposing a new rule",
                ranking.rule_id
            ),
        }
    }

    /// `runCycle` (spec §4.5). No-op below `minEventsForOptimization`.
    /// Returns `InvalidState::OptimizerReentry` if a cycle is already in
    /// flight on this instance.
    pub fn run_cycle(
        &mut self,
        config: &GuidanceConfig,
        ledger: &Ledger,
        shards: &mut [RuleShard],
        executor: Option<&dyn AbExecutor>,
        deadline_ms: u64,
        now: i64,
    ) -> Result<CycleOutcome, GuidanceError> {
        if self.in_flight {
            return Err(InvalidState::OptimizerReentry.into());
        }
        if self.events_since_last_cycle < config.min_events_for_optimization {
            return Ok(CycleOutcome { adrs: Vec::new(), ran: false });
        }
        self.in_flight = true;
        let outcome = self.run_cycle_inner(config, ledger, shards, executor, deadline_ms, now);
        self.in_flight = false;
        outcome
    }

    fn run_cycle_inner(
        &mut self,
        config: &GuidanceConfig,
        ledger: &Ledger,
        shards: &mut [RuleShard],
        executor: Option<&dyn AbExecutor>,
        deadline_ms: u64,
        now: i64,
    ) -> Result<CycleOutcome, GuidanceError> {
        let rankings = ledger.rank_violations();
        let top: Vec<ViolationRanking> = rankings
            .into_iter()
            .take(config.top_violations_per_cycle)
            .collect();
        let baseline = ledger.compute_metrics(ledger.events().len());

        let mut adrs = Vec::new();
        for ranking in &top {
            let matching_index = shards.iter().position(|s| s.rule.id == ranking.rule_id);
            let promotion_eligible = matching_index
                .map(|_| *self.wins.get(&ranking.rule_id).unwrap_or(&0) >= config.promotion_wins - 1)
                .unwrap_or(false);

            let change = if promotion_eligible {
                let shard = &shards[matching_index.unwrap()];
                RuleChange {
                    kind: RuleChangeKind::Promote,
                    target_rule_id: Some(shard.rule.id.clone()),
                    proposed_text: None,
                    rationale: format!(
                        "rule {} has accumulated wins near the promotion threshold",
                        shard.rule.id
                    ),
                }
            } else {
                Self::decide_change(ranking, matching_index.map(|i| &shards[i]))
            };

            let candidate_metrics = match executor {
                Some(ex) => match ex.run(&change, &baseline, deadline_ms) {
                    Ok(metrics) => metrics,
                    // Cycle failure aborts without applying changes (spec §4.5),
                    // propagating the real failure kind instead of masking it.
                    Err(ExecutorFailure::Capability(e)) => return Err(e.into()),
                    Err(ExecutorFailure::Timeout(e)) => return Err(e.into()),
                },
                None => fallback_candidate_metrics(change.kind, &baseline),
            };
            let estimated = executor.is_none();

            let rework_delta = candidate_metrics.avg_rework_ratio - baseline.avg_rework_ratio;
            let violation_delta =
                candidate_metrics.violation_rate_per_10_tasks - baseline.violation_rate_per_10_tasks;
            let risk_delta = candidate_metrics.risk_score - baseline.risk_score;
            let should_promote =
                risk_delta <= config.max_risk_increase && rework_delta <= -config.improvement_threshold;

            let test_result = ABTestResult {
                baseline_metrics: baseline,
                candidate_metrics,
                rework_delta,
                violation_delta,
                risk_delta,
                should_promote,
                estimated,
            };

            let decision = if should_promote {
                let win_count = self.wins.entry(ranking.rule_id.clone()).or_insert(0);
                *win_count += 1;
                if *win_count >= config.promotion_wins {
                    if let Some(idx) = matching_index {
                        Self::apply_promotion(&mut shards[idx], change.proposed_text.as_deref(), now);
                    }
                    self.wins.remove(&ranking.rule_id);
                    "promoted"
                } else {
                    "rejected"
                }
            } else {
                self.wins.insert(ranking.rule_id.clone(), 0);
                if change.kind == RuleChangeKind::Promote {
                    if let Some(idx) = matching_index {
                        Self::apply_demotion(&mut shards[idx], now);
                    }
                    "demoted"
                } else {
                    "rejected"
                }
            };

            let adr = RuleADR {
                schema_version: 1,
                number: self.next_adr_number,
                title: format!("{:?} rule {}", change.kind, ranking.rule_id),
                decision: decision.to_string(),
                rationale: change.rationale.clone(),
                change,
                test_result: Some(test_result),
                date: now,
                extra: Default::default(),
            };
            self.next_adr_number += 1;
            self.persist(&adr)?;
            adrs.push(adr);
        }

        self.events_since_last_cycle = 0;
        Ok(CycleOutcome { adrs, ran: true })
    }

    fn apply_promotion(shard: &mut RuleShard, proposed_text: Option<&str>, now: i64) {
        shard.rule.source = RuleSource::Root;
        shard.rule.is_constitution = true;
        shard.rule.priority += 100;
        if let Some(text) = proposed_text {
            shard.rule.text = text.to_string();
        }
        shard.rule.updated_at = now;
    }

    fn apply_demotion(shard: &mut RuleShard, now: i64) {
        shard.rule.priority -= 100;
        shard.rule.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::evaluators::TestsPassEvaluator;
    use crate::types::{DiffSummary, GuidanceRule, RiskClass, RunEvent, RunOutcome, TaskIntent, Violation, GateDecision};
    use std::collections::{BTreeMap, BTreeSet};

    fn rule(id: &str) -> GuidanceRule {
        GuidanceRule {
            id: id.to_string(),
            text: "do the thing".to_string(),
            priority: 10,
            risk_class: RiskClass::Medium,
            tool_classes: BTreeSet::new(),
            intent_tags: BTreeSet::new(),
            repo_scopes: vec![],
            domains: BTreeSet::new(),
            verifiers: vec![],
            source: RuleSource::Local,
            is_constitution: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn shard(id: &str) -> RuleShard {
        RuleShard {
            rule: rule(id),
            compact_text: format!("[{id}] do the thing"),
            embedding: None,
        }
    }

    fn ledger_with_violations(dir: &std::path::Path, rule_id: &str, count: usize, cost: u64) -> Ledger {
        ledger_with_violations_and_rework(dir, rule_id, count, cost, 50)
    }

    fn ledger_with_violations_and_rework(
        dir: &std::path::Path,
        rule_id: &str,
        count: usize,
        cost: u64,
        rework_lines: u64,
    ) -> Ledger {
        let mut ledger = Ledger::open(&dir.join("events.log"), vec![Box::new(TestsPassEvaluator)]).unwrap();
        for i in 0..count.max(10) {
            let mut event = RunEvent {
                schema_version: 1,
                id: format!("e{i}"),
                task_intent: TaskIntent::BugFix,
                prompt_digest: "d".to_string(),
                guidance_hash: "h".to_string(),
                retrieved_rule_ids: vec![],
                tools_used: vec![],
                files_modified: vec![],
                diff_summary: DiffSummary {
                    lines_added: 100,
                    lines_removed: 0,
                    files_changed: 1,
                    rework_lines,
                },
                tests_passed: Some(true),
                violations: vec![],
                started_at: 0,
                finalized_at: None,
                outcome: None,
                extra: BTreeMap::new(),
            };
            if i < count {
                event.violations.push(Violation {
                    rule_id: rule_id.to_string(),
                    gate_name: "g".to_string(),
                    detail: "x".to_string(),
                    severity: GateDecision::Warn,
                    occurred_at: 0,
                    cost,
                });
            }
            ledger.finalize_event(event, i as i64, RunOutcome::Success).unwrap();
        }
        ledger
    }

    fn ledger_with_two_rule_violations(
        dir: &std::path::Path,
        rule_a: &str,
        rule_b: &str,
        count_each: usize,
        cost: u64,
        rework_lines: u64,
    ) -> Ledger {
        let mut ledger = Ledger::open(&dir.join("events.log"), vec![Box::new(TestsPassEvaluator)]).unwrap();
        for i in 0..(count_each * 2) {
            let rule_id = if i < count_each { rule_a } else { rule_b };
            let event = RunEvent {
                schema_version: 1,
                id: format!("e{i}"),
                task_intent: TaskIntent::BugFix,
                prompt_digest: "d".to_string(),
                guidance_hash: "h".to_string(),
                retrieved_rule_ids: vec![],
                tools_used: vec![],
                files_modified: vec![],
                diff_summary: DiffSummary {
                    lines_added: 100,
                    lines_removed: 0,
                    files_changed: 1,
                    rework_lines,
                },
                tests_passed: Some(true),
                violations: vec![Violation {
                    rule_id: rule_id.to_string(),
                    gate_name: "g".to_string(),
                    detail: "x".to_string(),
                    severity: GateDecision::Warn,
                    occurred_at: 0,
                    cost,
                }],
                started_at: 0,
                finalized_at: None,
                outcome: None,
                extra: BTreeMap::new(),
            };
            ledger.finalize_event(event, i as i64, RunOutcome::Success).unwrap();
        }
        ledger
    }

    #[test]
    fn cycle_is_a_no_op_below_min_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = Optimizer::open(&dir.path().join("adrs.log"), &dir.path().join("tracker.json")).unwrap();
        let config = GuidanceConfig::default();
        let ledger = ledger_with_violations(dir.path(), "r1", 0, 0);
        let mut shards = vec![shard("r1")];
        let outcome = opt
            .run_cycle(&config, &ledger, &mut shards, None, 1000, 0)
            .unwrap();
        assert!(!outcome.ran);
    }

    #[test]
    fn two_consecutive_wins_promote_the_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = Optimizer::open(&dir.path().join("adrs.log"), &dir.path().join("tracker.json")).unwrap();
        let mut config = GuidanceConfig::default();
        config.min_events_for_optimization = 1;
        let ledger = ledger_with_violations(dir.path(), "r1", 8, 2);
        let mut shards = vec![shard("r1")];

        opt.note_event_finalized();
        let first = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 100).unwrap();
        assert!(first.ran);
        assert!(!shards[0].rule.is_constitution);

        opt.note_event_finalized();
        let second = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 200).unwrap();
        assert!(second.ran);
        assert!(shards[0].rule.is_constitution);
        assert_eq!(shards[0].rule.source, RuleSource::Root);
        assert_eq!(shards[0].rule.priority, 110);
    }

    #[test]
    fn failing_ab_result_twice_in_a_row_keeps_win_count_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = Optimizer::open(&dir.path().join("adrs.log"), &dir.path().join("tracker.json")).unwrap();
        let mut config = GuidanceConfig::default();
        config.min_events_for_optimization = 1;
        // Frequency 2 and cost 10 are both below the modify thresholds, so
        // this is the minor "touch-up" branch of `decide_change`, whose
        // fallback (40% reduction) can't clear `improvementThreshold` when
        // the baseline rework ratio is already small.
        let ledger = ledger_with_violations_and_rework(dir.path(), "r1", 2, 5, 5);
        let mut shards = vec![shard("r1")];

        opt.note_event_finalized();
        let first = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 0).unwrap();
        assert_eq!(first.adrs[0].decision, "rejected");
        assert_eq!(opt.wins.get("r1"), Some(&0));

        opt.note_event_finalized();
        let second = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 0).unwrap();
        assert_eq!(second.adrs[0].decision, "rejected");
        assert_eq!(opt.wins.get("r1"), Some(&0));
        assert!(!shards[0].rule.is_constitution);
    }

    #[test]
    fn reentrant_call_while_in_flight_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = Optimizer::open(&dir.path().join("adrs.log"), &dir.path().join("tracker.json")).unwrap();
        opt.in_flight = true;
        let config = GuidanceConfig::default();
        let ledger = ledger_with_violations(dir.path(), "r1", 0, 0);
        let mut shards = vec![shard("r1")];
        let err = opt
            .run_cycle(&config, &ledger, &mut shards, None, 1000, 0)
            .unwrap_err();
        assert!(matches!(err, GuidanceError::InvalidState(InvalidState::OptimizerReentry)));
    }

    #[test]
    fn add_kind_proposals_track_wins_independently_per_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut opt = Optimizer::open(&dir.path().join("adrs.log"), &dir.path().join("tracker.json")).unwrap();
        let mut config = GuidanceConfig::default();
        config.min_events_for_optimization = 1;
        config.top_violations_per_cycle = 2;
        let ledger = ledger_with_two_rule_violations(dir.path(), "r1", "r2", 4, 10, 50);
        // No shard matches either violated rule id, so both proposals are
        // `add`-kind (spec §4.5 step 2's 4th bullet) and must track wins
        // under their own `ranking.rule_id`, not a shared bogus key.
        let mut shards: Vec<RuleShard> = Vec::new();

        opt.note_event_finalized();
        let first = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 0).unwrap();
        assert_eq!(first.adrs.len(), 2);
        assert!(first.adrs.iter().all(|a| a.decision == "rejected"));
        assert_eq!(opt.wins.get("r1"), Some(&1));
        assert_eq!(opt.wins.get("r2"), Some(&1));

        opt.note_event_finalized();
        let second = opt.run_cycle(&config, &ledger, &mut shards, None, 1000, 1).unwrap();
        assert_eq!(second.adrs.len(), 2);
        assert!(second.adrs.iter().all(|a| a.change.kind == RuleChangeKind::Add));
        assert!(second.adrs.iter().all(|a| a.decision == "promoted"));
    }
}
