//! Compiler (spec §4.1): parses a rules document plus an optional local
//! overlay into a `PolicyBundle`. Grounded on `ai-dx-mcp/src/repo.rs`'s
//! primary+overlay precedence and `checks/common.rs`'s glob-set idiom.

mod parser;

use crate::config::GuidanceConfig;
use crate::error::ConfigError;
use crate::types::{
    CompileWarning, Constitution, GuidanceRule, Manifest, PolicyBundle, RiskClass, RuleShard,
    RuleSource, TaskIntent, ToolClass,
};
use parser::{constitution_keyword_re, heading_re, parse_rule_line, ParsedRuleLine};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

struct RuleBuilder {
    id: String,
    text_lines: Vec<String>,
    tags: Vec<String>,
    domains: Vec<String>,
    scope: Option<String>,
    priority: Option<i64>,
    risk: Option<RiskClass>,
    is_constitution: bool,
    explicit_id: bool,
}

impl RuleBuilder {
    fn from_parsed(p: ParsedRuleLine, is_constitution: bool) -> Self {
        Self {
            id: p.id,
            text_lines: if p.text.is_empty() { vec![] } else { vec![p.text] },
            tags: p.tags,
            domains: p.domains,
            scope: p.scope,
            priority: p.priority,
            risk: p.risk,
            is_constitution,
            explicit_id: true,
        }
    }

    fn implicit(id: String, is_constitution: bool) -> Self {
        Self {
            id,
            text_lines: vec![],
            tags: vec![],
            domains: vec![],
            scope: None,
            priority: None,
            risk: None,
            is_constitution,
            explicit_id: false,
        }
    }

    fn push_prose(&mut self, line: &str) {
        self.text_lines.push(line.trim().to_string());
    }

    fn finish(self, source: RuleSource, now: i64) -> Option<GuidanceRule> {
        let text = self.text_lines.join(" ").trim().to_string();
        if text.is_empty() {
            return None;
        }
        let base_priority = self.priority.unwrap_or(0);
        let priority = if self.is_constitution {
            base_priority + 100
        } else {
            base_priority
        };
        let tool_classes = self
            .tags
            .iter()
            .filter_map(|t| match t.as_str() {
                "bash" => Some(ToolClass::Bash),
                "edit" => Some(ToolClass::Edit),
                "write" => Some(ToolClass::Write),
                "mcp" => Some(ToolClass::Mcp),
                "*" => Some(ToolClass::Any),
                _ => None,
            })
            .collect();
        let intent_tags = self
            .tags
            .iter()
            .filter_map(|t| match t.as_str() {
                "bug-fix" => Some(TaskIntent::BugFix),
                "feature" => Some(TaskIntent::Feature),
                "refactor" => Some(TaskIntent::Refactor),
                "security" => Some(TaskIntent::Security),
                "performance" => Some(TaskIntent::Performance),
                "testing" => Some(TaskIntent::Testing),
                "docs" => Some(TaskIntent::Docs),
                "deployment" => Some(TaskIntent::Deployment),
                "architecture" => Some(TaskIntent::Architecture),
                "debug" => Some(TaskIntent::Debug),
                "general" => Some(TaskIntent::General),
                _ => None,
            })
            .collect();
        Some(GuidanceRule {
            id: self.id,
            text,
            priority,
            risk_class: self.risk.unwrap_or(RiskClass::Low),
            tool_classes,
            intent_tags,
            repo_scopes: self.scope.into_iter().collect(),
            domains: self.domains.into_iter().collect(),
            verifiers: Vec::new(),
            source,
            is_constitution: self.is_constitution,
            created_at: now,
            updated_at: now,
        })
    }
}

fn parse_document(
    text: &str,
    source: RuleSource,
    now: i64,
    warnings: &mut Vec<CompileWarning>,
) -> Vec<GuidanceRule> {
    let mut rules = Vec::new();
    let mut current: Option<RuleBuilder> = None;
    let mut is_constitution_section = false;
    let mut implicit_counter: u64 = 0;

    let mut flush = |current: &mut Option<RuleBuilder>, rules: &mut Vec<GuidanceRule>| {
        if let Some(builder) = current.take()
            && let Some(rule) = builder.finish(source, now)
        {
            rules.push(rule);
        }
    };

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();

        if let Some(caps) = heading_re().captures(line) {
            flush(&mut current, &mut rules);
            let heading_text = &caps[2];
            is_constitution_section = constitution_keyword_re().is_match(heading_text);
            continue;
        }

        if line.trim().is_empty() {
            flush(&mut current, &mut rules);
            continue;
        }

        match parse_rule_line(line) {
            Some(Ok(parsed)) => {
                flush(&mut current, &mut rules);
                current = Some(RuleBuilder::from_parsed(parsed, is_constitution_section));
            }
            Some(Err(())) => {
                warnings.push(CompileWarning {
                    line: line_no,
                    message: format!("malformed rule header, treated as prose: {line}"),
                });
                match &mut current {
                    Some(builder) => builder.push_prose(line),
                    None => {
                        implicit_counter += 1;
                        let mut builder = RuleBuilder::implicit(
                            format!("auto-{source:?}-{implicit_counter}").to_lowercase(),
                            is_constitution_section,
                        );
                        builder.push_prose(line);
                        current = Some(builder);
                    }
                }
            }
            None => match &mut current {
                Some(builder) => builder.push_prose(line),
                None => {
                    implicit_counter += 1;
                    let mut builder = RuleBuilder::implicit(
                        format!("auto-{source:?}-{implicit_counter}").to_lowercase(),
                        is_constitution_section,
                    );
                    builder.push_prose(line);
                    current = Some(builder);
                }
            },
        }
    }
    flush(&mut current, &mut rules);
    rules
}

/// Duplicate-id resolution: higher priority wins; equal priority: local
/// overlay wins over root; equal priority and equal source is a fatal
/// `ConfigError::DuplicateRuleId`.
fn resolve_duplicates(rules: Vec<GuidanceRule>) -> Result<Vec<GuidanceRule>, ConfigError> {
    let mut by_id: BTreeMap<String, GuidanceRule> = BTreeMap::new();
    for rule in rules {
        match by_id.get(&rule.id) {
            None => {
                by_id.insert(rule.id.clone(), rule);
            }
            Some(existing) => {
                if rule.priority > existing.priority {
                    by_id.insert(rule.id.clone(), rule);
                } else if rule.priority == existing.priority {
                    match (existing.source, rule.source) {
                        (RuleSource::Root, RuleSource::Local) => {
                            by_id.insert(rule.id.clone(), rule);
                        }
                        (RuleSource::Local, RuleSource::Root) => {
                            // existing (local) already wins; keep it.
                        }
                        _ => {
                            return Err(ConfigError::DuplicateRuleId {
                                id: rule.id.clone(),
                                priority: rule.priority,
                                source_kind: format!("{:?}", rule.source),
                            });
                        }
                    }
                }
                // lower priority: existing wins, nothing to do.
            }
        }
    }
    Ok(by_id.into_values().collect())
}

fn canonicalize(text: &str) -> String {
    text.nfc().collect::<String>()
}

fn render_constitution(rules: &[GuidanceRule], max_lines: usize) -> String {
    let mut lines: Vec<String> = rules
        .iter()
        .map(|r| format!("[{}] {}", r.id, r.text))
        .collect();
    if lines.len() > max_lines {
        lines.truncate(max_lines);
        lines.push("... (truncated: constitution exceeds maxConstitutionLines)".to_string());
    }
    lines.join("\n")
}

fn compact_text(rule: &GuidanceRule) -> String {
    let mut s = format!("[{}] {}", rule.id, rule.text);
    for tag in &rule.domains {
        s.push_str(" @");
        s.push_str(tag);
    }
    s
}

pub fn compile(
    primary_text: &str,
    overlay_text: Option<&str>,
    config: &GuidanceConfig,
    now_millis: i64,
) -> Result<PolicyBundle, ConfigError> {
    let mut warnings = Vec::new();

    let mut root_hasher = Sha256::new();
    root_hasher.update(canonicalize(primary_text).as_bytes());
    let root_hash = format!("{:x}", root_hasher.finalize());

    let mut all_rules = parse_document(primary_text, RuleSource::Root, now_millis, &mut warnings);

    let local_hash = if let Some(overlay) = overlay_text {
        let mut h = Sha256::new();
        h.update(canonicalize(overlay).as_bytes());
        let overlay_rules = parse_document(overlay, RuleSource::Local, now_millis, &mut warnings);
        all_rules.extend(overlay_rules);
        Some(format!("{:x}", h.finalize()))
    } else {
        None
    };

    let resolved = resolve_duplicates(all_rules)?;

    let (constitution_rules, shard_rules): (Vec<_>, Vec<_>) =
        resolved.into_iter().partition(|r| r.is_constitution);

    let mut constitution_rules = constitution_rules;
    constitution_rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    let rendered = render_constitution(&constitution_rules, config.max_constitution_lines);
    let canonical = canonicalize(&rendered);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let full_hash = format!("{:x}", hasher.finalize());
    let hash = full_hash[..16].to_string();

    let constitution = Constitution {
        rules: constitution_rules,
        text: rendered,
        hash,
    };

    let shards: Vec<RuleShard> = shard_rules
        .into_iter()
        .map(|rule| RuleShard {
            compact_text: compact_text(&rule),
            rule,
            embedding: None,
        })
        .collect();

    let mut rule_counts_by_risk: BTreeMap<RiskClass, usize> = BTreeMap::new();
    for shard in &shards {
        *rule_counts_by_risk.entry(shard.rule.risk_class).or_insert(0) += 1;
    }
    for rule in &constitution.rules {
        *rule_counts_by_risk.entry(rule.risk_class).or_insert(0) += 1;
    }

    let mut source_hashes = BTreeMap::new();
    source_hashes.insert("root".to_string(), root_hash);
    if let Some(lh) = local_hash {
        source_hashes.insert("local".to_string(), lh);
    }

    let manifest = Manifest {
        schema_version: 1,
        source_hashes,
        rule_counts_by_risk,
        compiled_at: now_millis,
        extra: BTreeMap::new(),
    };

    Ok(PolicyBundle {
        constitution,
        shards,
        manifest,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"# Safety Invariants

[R001] Never commit secrets to the repository @security

# General Guidance

[R010] Prefer small diffs @refactor #quality priority:5 (medium)
Keep functions under 50 lines as a rule of thumb.
"#;

    #[test]
    fn constitution_gets_priority_boost_and_flag() {
        let cfg = GuidanceConfig::default();
        let bundle = compile(DOC, None, &cfg, 0).unwrap();
        assert_eq!(bundle.constitution.rules.len(), 1);
        let r = &bundle.constitution.rules[0];
        assert_eq!(r.id, "R001");
        assert!(r.is_constitution);
        assert!(r.priority >= 100);
    }

    #[test]
    fn prose_continuation_joins_into_shard_text() {
        let cfg = GuidanceConfig::default();
        let bundle = compile(DOC, None, &cfg, 0).unwrap();
        assert_eq!(bundle.shards.len(), 1);
        let shard = &bundle.shards[0];
        assert_eq!(shard.rule.id, "R010");
        assert!(shard.rule.text.contains("Prefer small diffs"));
        assert!(shard.rule.text.contains("Keep functions under 50 lines"));
        assert_eq!(shard.rule.priority, 5);
    }

    #[test]
    fn missing_primary_document_errors_at_call_site() {
        // The Compiler itself takes the document as a string; the "missing
        // document" hard error is raised by the filesystem-facing caller
        // (orchestrator), not here. Empty text compiles to an empty bundle.
        let cfg = GuidanceConfig::default();
        let bundle = compile("", None, &cfg, 0).unwrap();
        assert!(bundle.constitution.rules.is_empty());
        assert!(bundle.shards.is_empty());
    }

    #[test]
    fn duplicate_id_equal_priority_equal_source_is_fatal() {
        let doc = "[R001] first version priority:5\n\n[R001] second version priority:5\n";
        let cfg = GuidanceConfig::default();
        let err = compile(doc, None, &cfg, 0).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateRuleId { .. }));
    }

    #[test]
    fn local_overlay_wins_ties_over_root() {
        let root = "[R001] root version priority:5\n";
        let local = "[R001] local version priority:5\n";
        let cfg = GuidanceConfig::default();
        let bundle = compile(root, Some(local), &cfg, 0).unwrap();
        assert_eq!(bundle.shards.len(), 1);
        assert_eq!(bundle.shards[0].rule.text, "local version");
        assert_eq!(bundle.shards[0].rule.source, RuleSource::Local);
    }

    #[test]
    fn malformed_header_becomes_warning_not_error() {
        let doc = "[unterminated this is prose\n";
        let cfg = GuidanceConfig::default();
        let bundle = compile(doc, None, &cfg, 0).unwrap();
        assert_eq!(bundle.warnings.len(), 1);
    }

    #[test]
    fn constitution_truncates_at_max_lines_with_marker() {
        let mut doc = String::from("# Must Rules\n\n");
        for i in 0..5 {
            doc.push_str(&format!("[R{i:03}] rule number {i}\n\n"));
        }
        let mut cfg = GuidanceConfig::default();
        cfg.max_constitution_lines = 3;
        let bundle = compile(&doc, None, &cfg, 0).unwrap();
        let line_count = bundle.constitution.text.lines().count();
        assert_eq!(line_count, 4); // 3 rules + truncation marker
        assert!(bundle.constitution.text.contains("truncated"));
    }

    #[test]
    fn idempotent_compile() {
        let cfg = GuidanceConfig::default();
        let b1 = compile(DOC, None, &cfg, 0).unwrap();
        let b2 = compile(DOC, None, &cfg, 0).unwrap();
        assert_eq!(b1.constitution.hash, b2.constitution.hash);
        assert_eq!(b1.constitution.text, b2.constitution.text);
        assert_eq!(b1.shards.len(), b2.shards.len());
    }
}
