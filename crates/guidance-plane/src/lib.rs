//! Deterministic policy control plane governing an autonomous coding
//! agent's tool calls: compiles a rules corpus into a `PolicyBundle`,
//! retrieves task-relevant guidance, gates destructive/risky tool use, logs
//! outcomes to an append-only ledger, and runs a weekly optimization loop
//! over accumulated violations.

pub mod compiler;
pub mod config;
pub mod error;
pub mod gates;
pub mod ledger;
pub mod optimizer;
pub mod orchestrator;
pub mod retriever;
pub mod storage;
pub mod types;

pub use error::GuidanceError;
pub use orchestrator::{Orchestrator, StateDir};
