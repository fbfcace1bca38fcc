//! Gates (spec §4.3): four pure, stateless evaluation functions over an
//! immutable `GateConfig`. Grounded on `ai-dx-mcp/src/checks/boundary.rs`'s
//! deny-regex-over-content shape and `judge/mod.rs`'s severity aggregation.

pub(crate) mod patterns;

use crate::config::GuidanceConfig;
use crate::error::PatternError;
use crate::types::GateDecision;
use crate::types::GateResult;
use regex::Regex;
use serde_json::json;

/// Precompiled pattern set. Built once from `GuidanceConfig` and reused for
/// every call — never recompiled per invocation — so the determinism
/// contract (spec §4.3, §8) holds.
pub struct GateConfig {
    destructive: Vec<Regex>,
    secrets: Vec<Regex>,
    allowed_tools: Vec<String>,
    tool_allowlist_enabled: bool,
    diff_size_threshold: u64,
}

pub(crate) fn compile_list(defaults: &[&str], overrides: &[String]) -> Result<Vec<Regex>, PatternError> {
    let mut sources: Vec<String> = defaults.iter().map(|s| s.to_string()).collect();
    sources.extend(overrides.iter().cloned());
    sources
        .into_iter()
        .map(|src| {
            Regex::new(&src).map_err(|e| PatternError::InvalidRegex {
                pattern: src,
                message: e.to_string(),
            })
        })
        .collect()
}

impl GateConfig {
    pub fn compile(config: &GuidanceConfig) -> Result<Self, PatternError> {
        Ok(Self {
            destructive: compile_list(
                patterns::DEFAULT_DESTRUCTIVE_PATTERNS,
                &config.destructive_patterns,
            )?,
            secrets: compile_list(patterns::DEFAULT_SECRET_PATTERNS, &config.secret_patterns)?,
            allowed_tools: config.allowed_tools.clone(),
            tool_allowlist_enabled: config.tool_allowlist_enabled,
            diff_size_threshold: config.diff_size_threshold,
        })
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        return "*".repeat(secret.len());
    }
    format!("{}****{}", &secret[..4], &secret[secret.len() - 4..])
}

fn gate_destructive_ops(command: &str, cfg: &GateConfig) -> GateResult {
    for re in &cfg.destructive {
        if let Some(m) = re.find(command) {
            return GateResult {
                gate_name: "destructive-ops".to_string(),
                decision: GateDecision::RequireConfirmation,
                reason: format!("command matches destructive pattern: {}", m.as_str().trim()),
                triggered_rules: vec![m.as_str().trim().to_string()],
                remediation: Some(
                    "1. Confirm the exact target and scope of this command. \
                     2. Get explicit user approval before running it. \
                     3. Re-run only after that confirmation is recorded."
                        .to_string(),
                ),
                metadata: json!({ "matched": m.as_str() }),
            };
        }
    }
    allow("destructive-ops")
}

fn gate_secrets(content: &str, cfg: &GateConfig) -> GateResult {
    for re in &cfg.secrets {
        if let Some(caps) = re.captures(content) {
            let secret = caps
                .name("secret")
                .map(|m| m.as_str())
                .unwrap_or_else(|| caps.get(0).unwrap().as_str());
            return GateResult {
                gate_name: "secrets".to_string(),
                decision: GateDecision::Block,
                reason: "content matches a secret pattern".to_string(),
                triggered_rules: vec!["secret-pattern".to_string()],
                remediation: Some(
                    "1. Remove the secret from the content. \
                     2. Rotate the exposed credential. \
                     3. Store it in a secret manager or environment variable instead."
                        .to_string(),
                ),
                metadata: json!({ "redacted": redact(secret) }),
            };
        }
    }
    allow("secrets")
}

fn gate_tool_allowlist(tool_name: &str, cfg: &GateConfig) -> GateResult {
    if !cfg.tool_allowlist_enabled {
        return allow("tool-allowlist");
    }
    let permitted = cfg.allowed_tools.iter().any(|pattern| {
        if pattern == "*" {
            true
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            tool_name.starts_with(prefix)
        } else {
            pattern == tool_name
        }
    });
    if permitted {
        allow("tool-allowlist")
    } else {
        GateResult {
            gate_name: "tool-allowlist".to_string(),
            decision: GateDecision::Block,
            reason: format!("tool `{tool_name}` is not on the allowlist"),
            triggered_rules: vec![tool_name.to_string()],
            remediation: Some(
                "1. Add the tool to the allowlist if it's legitimately needed. \
                 2. Otherwise pick an already-allowed tool for this step. \
                 3. Re-request after the allowlist is updated."
                    .to_string(),
            ),
            metadata: json!({ "tool": tool_name }),
        }
    }
}

fn gate_diff_size(path: &str, diff_lines: u64, cfg: &GateConfig) -> GateResult {
    if diff_lines > cfg.diff_size_threshold {
        GateResult {
            gate_name: "diff-size".to_string(),
            decision: GateDecision::Warn,
            reason: format!(
                "{path} changes {diff_lines} lines, over the threshold of {}",
                cfg.diff_size_threshold
            ),
            triggered_rules: vec![path.to_string()],
            remediation: Some(
                "1. Split this change into smaller, reviewable commits. \
                 2. Separate mechanical changes from behavioral ones. \
                 3. Re-submit each piece for review independently."
                    .to_string(),
            ),
            metadata: json!({ "path": path, "lines": diff_lines }),
        }
    } else {
        allow("diff-size")
    }
}

fn allow(gate_name: &str) -> GateResult {
    GateResult {
        gate_name: gate_name.to_string(),
        decision: GateDecision::Allow,
        reason: "no violation detected".to_string(),
        triggered_rules: Vec::new(),
        remediation: None,
        metadata: serde_json::Value::Null,
    }
}

pub fn evaluate_command(command: &str, cfg: &GateConfig) -> Vec<GateResult> {
    vec![gate_destructive_ops(command, cfg), gate_secrets(command, cfg)]
}

pub fn evaluate_tool_use(tool_name: &str, params_serialized: &str, cfg: &GateConfig) -> Vec<GateResult> {
    vec![
        gate_tool_allowlist(tool_name, cfg),
        gate_secrets(params_serialized, cfg),
    ]
}

pub fn evaluate_edit(path: &str, content: &str, diff_lines: u64, cfg: &GateConfig) -> Vec<GateResult> {
    vec![gate_diff_size(path, diff_lines, cfg), gate_secrets(content, cfg)]
}

/// Returns the result with maximum severity; ties broken by position (first
/// wins). Pure function: no I/O, no mutation.
pub fn aggregate(results: &[GateResult]) -> GateResult {
    results
        .iter()
        .fold(None::<&GateResult>, |best, candidate| match best {
            None => Some(candidate),
            Some(b) if candidate.decision.severity() > b.decision.severity() => Some(candidate),
            Some(b) => Some(b),
        })
        .cloned()
        .unwrap_or_else(|| allow("aggregate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GateConfig {
        GateConfig::compile(&GuidanceConfig::default()).unwrap()
    }

    #[test]
    fn destructive_command_requires_confirmation_with_remediation() {
        let results = evaluate_command("git push --force origin main", &cfg());
        let destructive = results.iter().find(|r| r.gate_name == "destructive-ops").unwrap();
        assert_eq!(destructive.decision, GateDecision::RequireConfirmation);
        assert!(destructive.remediation.as_deref().unwrap().contains("1."));
        assert!(destructive.remediation.as_deref().unwrap().contains("3."));
    }

    #[test]
    fn secret_in_tool_params_is_blocked_and_redacted() {
        let params = r#"{"apiKey": "sk-abcdefghijklmnopqrstuvwxyz012345"}"#;
        let results = evaluate_tool_use("http.post", params, &cfg());
        let secrets = results.iter().find(|r| r.gate_name == "secrets").unwrap();
        assert_eq!(secrets.decision, GateDecision::Block);
        let redacted = secrets.metadata["redacted"].as_str().unwrap();
        assert_eq!(redacted, "sk-a****2345");
    }

    #[test]
    fn diff_at_threshold_does_not_warn_but_threshold_plus_one_does() {
        let c = cfg();
        let at = gate_diff_size("src/foo.ts", 300, &c);
        assert_eq!(at.decision, GateDecision::Allow);
        let over = gate_diff_size("src/foo.ts", 301, &c);
        assert_eq!(over.decision, GateDecision::Warn);
    }

    #[test]
    fn diff_warn_scenario_aggregates_to_warn() {
        let results = evaluate_edit("src/foo.ts", "no secrets here", 301, &cfg());
        let agg = aggregate(&results);
        assert_eq!(agg.decision, GateDecision::Warn);
    }

    #[test]
    fn tool_allowlist_disabled_by_default_allows_everything() {
        let results = evaluate_tool_use("anything.exe", "{}", &cfg());
        let allowlist = results.iter().find(|r| r.gate_name == "tool-allowlist").unwrap();
        assert_eq!(allowlist.decision, GateDecision::Allow);
    }

    #[test]
    fn tool_allowlist_supports_wildcard_suffix_and_universal_star() {
        let mut raw = GuidanceConfig::default();
        raw.tool_allowlist_enabled = true;
        raw.allowed_tools = vec!["fs.*".to_string()];
        let c = GateConfig::compile(&raw).unwrap();
        assert_eq!(gate_tool_allowlist("fs.read", &c).decision, GateDecision::Allow);
        assert_eq!(gate_tool_allowlist("net.fetch", &c).decision, GateDecision::Block);

        raw.allowed_tools = vec!["*".to_string()];
        let c2 = GateConfig::compile(&raw).unwrap();
        assert_eq!(gate_tool_allowlist("anything", &c2).decision, GateDecision::Allow);
    }

    #[test]
    fn secret_regex_on_empty_content_does_not_match() {
        assert_eq!(gate_secrets("", &cfg()).decision, GateDecision::Allow);
    }

    #[test]
    fn aggregate_picks_max_severity_first_on_tie() {
        let a = allow("a");
        let mut b = allow("b");
        b.decision = GateDecision::Warn;
        let mut c = allow("c");
        c.decision = GateDecision::Warn;
        let agg = aggregate(&[a, b, c]);
        assert_eq!(agg.gate_name, "b");
    }

    #[test]
    fn determinism_same_config_same_input_same_output() {
        let c = cfg();
        let r1 = evaluate_command("rm -rf /tmp/foo", &c);
        let r2 = evaluate_command("rm -rf /tmp/foo", &c);
        assert_eq!(
            serde_json::to_string(&r1).unwrap(),
            serde_json::to_string(&r2).unwrap()
        );
    }
}
