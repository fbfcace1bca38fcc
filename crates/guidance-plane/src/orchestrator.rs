//! Orchestrator (spec §3 ownership summary): owns the live `PolicyBundle`,
//! `Retriever`, `GateConfig`, `Ledger`, and `Optimizer`, exposing the
//! external interfaces of spec §6 as plain synchronous functions. Grounded
//! on `ai-dx-mcp/src/main.rs`'s single-struct-of-collaborators shape.

use crate::compiler;
use crate::config::GuidanceConfig;
use crate::error::{ConfigError, GuidanceError, InvalidState};
use crate::gates::{self, GateConfig};
use crate::ledger::evaluators::{
    DiffQualityEvaluator, Evaluator, ForbiddenCommandScanEvaluator, TestsPassEvaluator,
    ViolationRateEvaluator,
};
use crate::ledger::Ledger;
use crate::optimizer::executor::AbExecutor;
use crate::optimizer::{CycleOutcome, Optimizer};
use crate::retriever::{RetrievalRequest, Retriever};
use crate::storage;
use crate::types::{GateResult, PolicyBundle, RetrievalResult, RunEvent, RunOutcome, Violation};
use std::path::{Path, PathBuf};

pub struct StateDir {
    pub root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn events_log(&self) -> PathBuf {
        self.root.join("events.log")
    }

    fn adrs_log(&self) -> PathBuf {
        self.root.join("adrs.log")
    }

    fn tracker_json(&self) -> PathBuf {
        self.root.join("tracker.json")
    }

    fn manifest_json(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

pub struct Orchestrator {
    pub config: GuidanceConfig,
    pub bundle: PolicyBundle,
    pub gate_config: GateConfig,
    pub retriever: Retriever,
    pub ledger: Ledger,
    pub optimizer: Optimizer,
    state_dir: StateDir,
}

impl Orchestrator {
    /// Compiles a fresh bundle from `primary_path` (and optional
    /// `overlay_path`), then opens the persisted ledger/optimizer state
    /// under `state_dir`.
    pub fn bootstrap(
        primary_path: &Path,
        overlay_path: Option<&Path>,
        config: GuidanceConfig,
        state_dir: StateDir,
        now_millis: i64,
    ) -> Result<Self, GuidanceError> {
        if !primary_path.exists() {
            return Err(ConfigError::DocumentMissing(primary_path.to_path_buf()).into());
        }
        let primary_text =
            std::fs::read_to_string(primary_path).map_err(|source| ConfigError::ReadDocument {
                path: primary_path.to_path_buf(),
                source,
            })?;
        let overlay_text = match overlay_path {
            Some(p) if p.exists() => Some(std::fs::read_to_string(p).map_err(|source| {
                ConfigError::ReadDocument {
                    path: p.to_path_buf(),
                    source,
                }
            })?),
            _ => None,
        };

        let bundle = compiler::compile(&primary_text, overlay_text.as_deref(), &config, now_millis)?;
        storage::write_json_file(&state_dir.manifest_json(), &bundle.manifest)
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;

        let gate_config = GateConfig::compile(&config)?;

        let mut retriever = Retriever::new(config.clone());
        retriever.index(&bundle);

        let evaluators: Vec<Box<dyn Evaluator>> = vec![
            Box::new(TestsPassEvaluator),
            Box::new(ForbiddenCommandScanEvaluator::new(gates::patterns::DEFAULT_DESTRUCTIVE_PATTERNS
                .iter()
                .map(|p| regex::Regex::new(p).expect("static pattern"))
                .collect())),
            Box::new(ViolationRateEvaluator {
                window: 10,
                max_rate_per_10_tasks: 5.0,
            }),
            Box::new(DiffQualityEvaluator {
                max_rework_ratio: config.max_rework_ratio,
            }),
        ];
        let ledger = Ledger::open(&state_dir.events_log(), evaluators)
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;
        let optimizer = Optimizer::open(&state_dir.adrs_log(), &state_dir.tracker_json())
            .map_err(|e| InvalidState::PersistenceFailed(e.to_string()))?;

        Ok(Self {
            config,
            bundle,
            gate_config,
            retriever,
            ledger,
            optimizer,
            state_dir,
        })
    }

    pub fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResult {
        self.retriever.retrieve(request)
    }

    pub fn gate_command(&self, command: &str) -> GateResult {
        gates::aggregate(&gates::evaluate_command(command, &self.gate_config))
    }

    pub fn gate_tool_use(&self, tool_name: &str, params_serialized: &str) -> GateResult {
        gates::aggregate(&gates::evaluate_tool_use(tool_name, params_serialized, &self.gate_config))
    }

    pub fn gate_edit(&self, path: &str, content: &str, diff_lines: u64) -> GateResult {
        gates::aggregate(&gates::evaluate_edit(path, content, diff_lines, &self.gate_config))
    }

    pub fn create_event(&self, event: RunEvent) -> RunEvent {
        self.ledger.create_event(event)
    }

    pub fn record_violation(&self, event: &mut RunEvent, violation: Violation) -> Result<(), GuidanceError> {
        self.ledger.record_violation(event, violation).map_err(Into::into)
    }

    pub fn accumulate_diff(
        &self,
        event: &mut RunEvent,
        lines_added: u64,
        lines_removed: u64,
        files_changed: u64,
        rework_lines: u64,
    ) -> Result<(), GuidanceError> {
        self.ledger
            .accumulate_diff(event, lines_added, lines_removed, files_changed, rework_lines)
            .map_err(Into::into)
    }

    pub fn finalize_event(
        &mut self,
        event: RunEvent,
        finalized_at: i64,
        outcome: RunOutcome,
    ) -> Result<RunEvent, GuidanceError> {
        let (frozen, _results) = self.ledger.finalize_event(event, finalized_at, outcome)?;
        self.optimizer.note_event_finalized();
        Ok(frozen)
    }

    pub fn run_cycle(
        &mut self,
        executor: Option<&dyn AbExecutor>,
        deadline_ms: u64,
        now: i64,
    ) -> Result<CycleOutcome, GuidanceError> {
        let outcome = self.optimizer.run_cycle(
            &self.config,
            &self.ledger,
            self.retriever.shards_mut(),
            executor,
            deadline_ms,
            now,
        )?;
        Ok(outcome)
    }
}
