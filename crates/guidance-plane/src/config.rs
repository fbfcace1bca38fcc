//! Every configurable option named in spec §6, typed and defaulted — no
//! free-form option bag. Grounded on `ai-dx-mcp/src/config.rs`'s
//! `#[serde(deny_unknown_fields)]` struct style.

use crate::error::ConfigError;
use crate::types::RiskClass;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GuidanceConfig {
    pub max_constitution_lines: usize,
    pub top_k: usize,
    pub intent_boost: f64,
    pub risk_boost_critical: f64,
    pub risk_boost_high: f64,
    pub risk_boost_medium: f64,
    pub diff_size_threshold: u64,
    #[serde(default)]
    pub destructive_patterns: Vec<String>,
    #[serde(default)]
    pub secret_patterns: Vec<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub tool_allowlist_enabled: bool,
    pub promotion_wins: u32,
    pub top_violations_per_cycle: usize,
    pub improvement_threshold: f64,
    pub max_risk_increase: f64,
    pub min_events_for_optimization: usize,
    pub max_rework_ratio: f64,
    pub embedding_dim: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            max_constitution_lines: 60,
            top_k: 5,
            intent_boost: 0.15,
            risk_boost_critical: 0.10,
            risk_boost_high: 0.07,
            risk_boost_medium: 0.05,
            diff_size_threshold: 300,
            destructive_patterns: Vec::new(),
            secret_patterns: Vec::new(),
            allowed_tools: Vec::new(),
            tool_allowlist_enabled: false,
            promotion_wins: 2,
            top_violations_per_cycle: 3,
            improvement_threshold: 0.10,
            max_risk_increase: 0.05,
            min_events_for_optimization: 10,
            max_rework_ratio: 0.30,
            embedding_dim: 32,
        }
    }
}

impl GuidanceConfig {
    pub fn risk_boost(&self, risk: RiskClass) -> f64 {
        match risk {
            RiskClass::Critical => self.risk_boost_critical,
            RiskClass::High => self.risk_boost_high,
            RiskClass::Medium => self.risk_boost_medium,
            RiskClass::Low => 0.0,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            std::fs::read_to_string(path).map_err(|source| ConfigError::ReadConfig {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&raw).map_err(|e| ConfigError::ParseConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let c = GuidanceConfig::default();
        assert_eq!(c.max_constitution_lines, 60);
        assert_eq!(c.top_k, 5);
        assert_eq!(c.intent_boost, 0.15);
        assert_eq!(c.diff_size_threshold, 300);
        assert_eq!(c.promotion_wins, 2);
        assert_eq!(c.top_violations_per_cycle, 3);
        assert_eq!(c.improvement_threshold, 0.10);
        assert_eq!(c.max_risk_increase, 0.05);
        assert_eq!(c.min_events_for_optimization, 10);
        assert_eq!(c.max_rework_ratio, 0.30);
        assert!(!c.tool_allowlist_enabled);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml_str = "top_k = 5\nbogus_option = true\n";
        let err = toml::from_str::<GuidanceConfig>(toml_str).unwrap_err();
        assert!(err.to_string().contains("bogus_option"));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = GuidanceConfig::load(Path::new("/does/not/exist.toml")).unwrap();
        assert_eq!(cfg.top_k, GuidanceConfig::default().top_k);
    }
}
