//! Core data model (spec §3). Shapes here are shared by every subsystem;
//! enums use `snake_case` on the wire to match the external interfaces in
//! spec §6.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskClass {
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Additive score contribution per spec §4.2 `riskBoost`.
    pub fn boost(self) -> f64 {
        match self {
            RiskClass::Critical => 0.10,
            RiskClass::High => 0.07,
            RiskClass::Medium => 0.05,
            RiskClass::Low => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    Bash,
    Edit,
    Write,
    Mcp,
    #[serde(rename = "*")]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskIntent {
    BugFix,
    Feature,
    Refactor,
    Security,
    Performance,
    Testing,
    Docs,
    Deployment,
    Architecture,
    Debug,
    General,
}

impl TaskIntent {
    pub const ALL_SPECIFIC: [TaskIntent; 10] = [
        TaskIntent::BugFix,
        TaskIntent::Feature,
        TaskIntent::Refactor,
        TaskIntent::Security,
        TaskIntent::Performance,
        TaskIntent::Testing,
        TaskIntent::Docs,
        TaskIntent::Deployment,
        TaskIntent::Architecture,
        TaskIntent::Debug,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Root,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidanceRule {
    pub id: String,
    pub text: String,
    pub priority: i64,
    pub risk_class: RiskClass,
    #[serde(default)]
    pub tool_classes: BTreeSet<ToolClass>,
    #[serde(default)]
    pub intent_tags: BTreeSet<TaskIntent>,
    #[serde(default)]
    pub repo_scopes: Vec<String>,
    #[serde(default)]
    pub domains: BTreeSet<String>,
    #[serde(default)]
    pub verifiers: Vec<String>,
    pub source: RuleSource,
    pub is_constitution: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl GuidanceRule {
    /// True if `repoScopes` is empty or contains the global wildcard.
    pub fn is_globally_scoped(&self) -> bool {
        self.repo_scopes.is_empty() || self.repo_scopes.iter().any(|s| s == "*")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompileWarning {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Constitution {
    pub rules: Vec<GuidanceRule>,
    pub text: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleShard {
    pub rule: GuidanceRule,
    pub compact_text: String,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    #[serde(default = "schema_version_v1")]
    pub schema_version: u32,
    pub source_hashes: BTreeMap<String, String>,
    pub rule_counts_by_risk: BTreeMap<RiskClass, usize>,
    pub compiled_at: i64,
    /// Unknown fields from a newer schema version round-trip through here
    /// instead of being dropped (spec §6: "forward-compatible").
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PolicyBundle {
    pub constitution: Constitution,
    pub shards: Vec<RuleShard>,
    pub manifest: Manifest,
    #[serde(default)]
    pub warnings: Vec<CompileWarning>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShardScore {
    pub rule_id: String,
    pub score: f64,
    pub admitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetrievalResult {
    pub policy_text: String,
    pub selected_shards: Vec<RuleShard>,
    pub detected_intent: TaskIntent,
    pub confidence: f64,
    pub score_breakdown: Vec<ShardScore>,
    pub excluded_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GateDecision {
    Allow,
    Warn,
    RequireConfirmation,
    Block,
}

impl GateDecision {
    pub fn severity(self) -> u8 {
        match self {
            GateDecision::Allow => 0,
            GateDecision::Warn => 1,
            GateDecision::RequireConfirmation => 2,
            GateDecision::Block => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GateResult {
    pub gate_name: String,
    pub decision: GateDecision,
    pub reason: String,
    #[serde(default)]
    pub triggered_rules: Vec<String>,
    pub remediation: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct DiffSummary {
    pub lines_added: u64,
    pub lines_removed: u64,
    pub files_changed: u64,
    pub rework_lines: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Violation {
    pub rule_id: String,
    pub gate_name: String,
    pub detail: String,
    pub severity: GateDecision,
    pub occurred_at: i64,
    pub cost: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunEvent {
    #[serde(default = "schema_version_v1")]
    pub schema_version: u32,
    pub id: String,
    pub task_intent: TaskIntent,
    pub prompt_digest: String,
    pub guidance_hash: String,
    #[serde(default)]
    pub retrieved_rule_ids: Vec<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub diff_summary: DiffSummary,
    pub tests_passed: Option<bool>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    pub started_at: i64,
    pub finalized_at: Option<i64>,
    pub outcome: Option<RunOutcome>,
    /// Unknown fields from a newer schema version round-trip through here
    /// instead of being dropped (spec §6: "forward-compatible").
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

pub(crate) fn schema_version_v1() -> u32 {
    1
}

impl RunEvent {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ViolationRanking {
    pub rule_id: String,
    pub frequency: u64,
    pub cost: u64,
    pub score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleChangeKind {
    Add,
    Modify,
    Promote,
    Demote,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleChange {
    pub kind: RuleChangeKind,
    pub target_rule_id: Option<String>,
    pub proposed_text: Option<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
pub struct CycleMetrics {
    pub violation_rate_per_10_tasks: f64,
    pub avg_rework_ratio: f64,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ABTestResult {
    pub baseline_metrics: CycleMetrics,
    pub candidate_metrics: CycleMetrics,
    pub rework_delta: f64,
    pub violation_delta: f64,
    pub risk_delta: f64,
    pub should_promote: bool,
    /// True when no `AbExecutor` was wired and the conservative fallback
    /// percentages (spec §4.5) were used instead of a real measurement.
    pub estimated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleADR {
    #[serde(default = "schema_version_v1")]
    pub schema_version: u32,
    pub number: u64,
    pub title: String,
    pub decision: String,
    pub rationale: String,
    pub change: RuleChange,
    pub test_result: Option<ABTestResult>,
    pub date: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `tracker.json` (spec §6): the Optimizer's process-lifetime win-count map,
/// made self-describing like `events.log`/`adrs.log` so a future schema
/// revision can add fields without losing what an older build wrote.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WinTracker {
    #[serde(default = "schema_version_v1")]
    pub schema_version: u32,
    #[serde(default)]
    pub wins: BTreeMap<String, u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluatorResult {
    pub name: String,
    pub passed: bool,
    pub score: f64,
    pub detail: String,
}
