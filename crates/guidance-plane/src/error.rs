//! Error taxonomy (spec §7). Every failure kind is a `thiserror` variant
//! carrying enough context to reproduce it, with a stable `.code()` string.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rules document not found: {0}")]
    DocumentMissing(PathBuf),
    #[error("failed to read rules document: {path}: {source}")]
    ReadDocument {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read config file: {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {path}: {message}")]
    ParseConfig { path: PathBuf, message: String },
    #[error("unknown risk class: {0} (expected one of low|medium|high|critical)")]
    UnknownRiskClass(String),
    #[error("invalid glob in repoScopes: {pattern}: {message}")]
    InvalidGlob { pattern: String, message: String },
    #[error(
        "duplicate rule id {id} with equal priority ({priority}) and equal source ({source_kind})"
    )]
    DuplicateRuleId {
        id: String,
        priority: i64,
        source_kind: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidState {
    #[error("run event {0} already finalized; mutation rejected")]
    AlreadyFinalized(String),
    #[error("run event {0} not found")]
    UnknownEvent(String),
    #[error("optimizer cycle already in flight; reentry rejected")]
    OptimizerReentry,
    #[error("failed to persist ledger state: {0}")]
    PersistenceFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid regex {pattern}: {message}")]
    InvalidRegex { pattern: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),
    #[error(
        "embedding provider returned a vector of dimension {actual}, expected {expected}"
    )]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },
    #[error("A/B executor failed: {0}")]
    ExecutorFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Timeout {
    #[error("optimizer A/B execution exceeded deadline of {deadline_ms}ms")]
    AbExecution { deadline_ms: u64 },
}

/// Umbrella error for orchestrator-level call sites that can fail in more
/// than one taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum GuidanceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Timeout(#[from] Timeout),
}

impl GuidanceError {
    pub fn code(&self) -> &'static str {
        match self {
            GuidanceError::Config(e) => match e {
                ConfigError::DocumentMissing(_) => "config.document_missing",
                ConfigError::ReadDocument { .. } => "config.read_failed",
                ConfigError::ReadConfig { .. } => "config.read_failed",
                ConfigError::ParseConfig { .. } => "config.parse_failed",
                ConfigError::UnknownRiskClass(_) => "config.unknown_risk_class",
                ConfigError::InvalidGlob { .. } => "config.invalid_glob",
                ConfigError::DuplicateRuleId { .. } => "config.duplicate_rule_id",
            },
            GuidanceError::InvalidState(e) => match e {
                InvalidState::AlreadyFinalized(_) => "ledger.already_finalized",
                InvalidState::UnknownEvent(_) => "ledger.unknown_event",
                InvalidState::OptimizerReentry => "optimizer.reentry",
                InvalidState::PersistenceFailed(_) => "ledger.persistence_failed",
            },
            GuidanceError::Pattern(_) => "gates.invalid_pattern",
            GuidanceError::Capability(e) => match e {
                CapabilityError::EmbeddingFailed(_) => "retriever.embedding_failed",
                CapabilityError::EmbeddingDimensionMismatch { .. } => {
                    "retriever.embedding_dimension_mismatch"
                }
                CapabilityError::ExecutorFailed(_) => "optimizer.executor_failed",
            },
            GuidanceError::Timeout(_) => "optimizer.timeout",
        }
    }
}
