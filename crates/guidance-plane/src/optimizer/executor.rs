//! A/B evaluation capability (spec §4.5). Grounded on the teacher's
//! `gate_jobs.rs` job-state-machine idiom: an injectable capability trait
//! plus a conservative fallback when no real implementation is wired.

use crate::error::{CapabilityError, Timeout};
use crate::types::{CycleMetrics, RuleChange, RuleChangeKind};

/// Runs a compliance suite against a baseline and a candidate rule set and
/// reports the resulting metrics. Implementations are expected to enforce
/// `deadline_ms` themselves and return `Timeout` if exceeded.
pub trait AbExecutor: Send + Sync {
    fn run(
        &self,
        change: &RuleChange,
        baseline: &CycleMetrics,
        deadline_ms: u64,
    ) -> Result<CycleMetrics, ExecutorFailure>;
}

pub enum ExecutorFailure {
    Capability(CapabilityError),
    Timeout(Timeout),
}

/// Conservative fallback percentages (spec §4.5) used only when no
/// `AbExecutor` is wired. Never the default path when a real executor is
/// configured.
pub fn fallback_candidate_metrics(kind: RuleChangeKind, baseline: &CycleMetrics) -> CycleMetrics {
    let violation_reduction = match kind {
        RuleChangeKind::Modify => 0.40,
        RuleChangeKind::Add => 0.60,
        RuleChangeKind::Promote => 0.80,
        RuleChangeKind::Remove => -0.20,
        RuleChangeKind::Demote => 0.0,
    };
    CycleMetrics {
        violation_rate_per_10_tasks: (baseline.violation_rate_per_10_tasks
            * (1.0 - violation_reduction))
            .max(0.0),
        avg_rework_ratio: (baseline.avg_rework_ratio * (1.0 - violation_reduction)).max(0.0),
        risk_score: baseline.risk_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_kind_fallback_reduces_violation_rate_by_sixty_percent() {
        let baseline = CycleMetrics {
            violation_rate_per_10_tasks: 10.0,
            avg_rework_ratio: 0.2,
            risk_score: 1.0,
        };
        let candidate = fallback_candidate_metrics(RuleChangeKind::Add, &baseline);
        assert!((candidate.violation_rate_per_10_tasks - 4.0).abs() < 1e-9);
    }

    #[test]
    fn remove_kind_fallback_is_a_regression() {
        let baseline = CycleMetrics {
            violation_rate_per_10_tasks: 10.0,
            avg_rework_ratio: 0.2,
            risk_score: 1.0,
        };
        let candidate = fallback_candidate_metrics(RuleChangeKind::Remove, &baseline);
        assert!(candidate.violation_rate_per_10_tasks > baseline.violation_rate_per_10_tasks);
    }
}
