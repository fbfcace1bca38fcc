//! Retriever (spec §4.2). Grounded on `ai-dx-mcp/src/checks/quality_delta.rs`'s
//! weighted-scoring-then-deterministic-sort shape and `checks/common.rs`'s
//! precompiled `GlobSet` matching idiom.

pub mod embedding;
pub mod intent;

use crate::config::GuidanceConfig;
use crate::error::CapabilityError;
use crate::types::{PolicyBundle, RetrievalResult, RiskClass, RuleShard, ShardScore, TaskIntent};
use embedding::{cosine, EmbeddingProvider, HashEmbeddingProvider};
use globset::{Glob, GlobSetBuilder};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub task_description: String,
    pub intent: Option<TaskIntent>,
    pub repo_path: Option<String>,
    pub min_risk_class: Option<RiskClass>,
    pub top_k: Option<usize>,
}

struct NegationPair {
    positive: &'static str,
    negative: &'static str,
}

const NEGATION_PAIRS: &[NegationPair] = &[
    NegationPair { positive: r"(?i)\bmust\b", negative: r"(?i)\bnever\b|\bdo not\b|\bavoid\b" },
    NegationPair { positive: r"(?i)\balways\b", negative: r"(?i)\bnever\b|\bdon'?t\b" },
    NegationPair { positive: r"(?i)\brequire[sd]?\b", negative: r"(?i)\bforbid(s|den)?\b|\bprohibit(s|ed)?\b" },
];

fn negation_regexes() -> &'static Vec<(Regex, Regex)> {
    static RE: OnceLock<Vec<(Regex, Regex)>> = OnceLock::new();
    RE.get_or_init(|| {
        NEGATION_PAIRS
            .iter()
            .map(|p| {
                (
                    Regex::new(p.positive).expect("static regex"),
                    Regex::new(p.negative).expect("static regex"),
                )
            })
            .collect()
    })
}

fn contradicts(a: &RuleShard, b: &RuleShard) -> bool {
    if a.rule.domains.is_disjoint(&b.rule.domains) {
        return false;
    }
    for (pos, neg) in negation_regexes() {
        let a_pos = pos.is_match(&a.rule.text);
        let a_neg = neg.is_match(&a.rule.text);
        let b_pos = pos.is_match(&b.rule.text);
        let b_neg = neg.is_match(&b.rule.text);
        if (a_pos && b_neg) || (a_neg && b_pos) {
            return true;
        }
    }
    false
}

fn scope_matches(scopes: &[String], repo_path: &str) -> bool {
    if scopes.is_empty() || scopes.iter().any(|s| s == "*") {
        return true;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in scopes {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    match builder.build() {
        Ok(set) => set.is_match(repo_path),
        Err(_) => false,
    }
}

pub struct Retriever {
    config: GuidanceConfig,
    provider: Box<dyn EmbeddingProvider>,
    shards: Vec<RuleShard>,
    constitution_text: String,
}

impl Retriever {
    pub fn new(config: GuidanceConfig) -> Self {
        let dim = config.embedding_dim;
        Self {
            config,
            provider: Box::new(HashEmbeddingProvider::new(dim)),
            shards: Vec::new(),
            constitution_text: String::new(),
        }
    }

    pub fn with_embedding_provider(mut self, provider: Box<dyn EmbeddingProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Exposes the shard pool for mutation by the Optimizer only (spec §5:
    /// "shard pool: mutated only by the optimizer").
    pub fn shards_mut(&mut self) -> &mut [RuleShard] {
        &mut self.shards
    }

    /// Stores shards from a compiled bundle; computes embeddings for any
    /// shard lacking one. Embedding failures fall back to the default
    /// hash-based provider and are reported via the returned warning list
    /// (spec §7: "embedding failures fall back... and surface a warning").
    pub fn index(&mut self, bundle: &PolicyBundle) -> Vec<String> {
        self.constitution_text = bundle.constitution.text.clone();
        let mut warnings = Vec::new();
        let fallback = HashEmbeddingProvider::new(self.provider.dim());
        self.shards = bundle
            .shards
            .iter()
            .cloned()
            .map(|mut shard| {
                if shard.embedding.is_some() {
                    return shard;
                }
                let embedded = self.provider.embed(&shard.compact_text).and_then(|v| {
                    if v.len() == self.provider.dim() {
                        Ok(v)
                    } else {
                        Err(CapabilityError::EmbeddingDimensionMismatch {
                            expected: self.provider.dim(),
                            actual: v.len(),
                        })
                    }
                });
                shard.embedding = Some(match embedded {
                    Ok(v) => v,
                    Err(e) => {
                        warnings.push(format!(
                            "embedding provider failed for rule {}: {e}; used fallback",
                            shard.rule.id
                        ));
                        fallback
                            .embed(&shard.compact_text)
                            .unwrap_or_else(|_| vec![0.0; fallback.dim()])
                    }
                });
                shard
            })
            .collect();
        warnings
    }

    pub fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResult {
        let classification = intent::classify_intent(&request.task_description);
        let detected_intent = request.intent.unwrap_or(classification.intent);
        let confidence = if request.intent.is_some() {
            1.0
        } else {
            classification.confidence
        };
        let top_k = request.top_k.unwrap_or(self.config.top_k);

        let task_embedding = self
            .provider
            .embed(&request.task_description)
            .unwrap_or_else(|_| vec![0.0; self.provider.dim()]);

        let total = self.shards.len();
        let eligible: Vec<&RuleShard> = self
            .shards
            .iter()
            .filter(|s| {
                if let Some(path) = &request.repo_path
                    && !scope_matches(&s.rule.repo_scopes, path)
                {
                    return false;
                }
                if let Some(min_risk) = request.min_risk_class
                    && s.rule.risk_class < min_risk
                {
                    return false;
                }
                true
            })
            .collect();
        let excluded_count = total - eligible.len();

        let mut scored: Vec<(f64, &RuleShard)> = eligible
            .into_iter()
            .map(|shard| {
                let sim = shard
                    .embedding
                    .as_ref()
                    .map(|e| cosine(&task_embedding, e))
                    .unwrap_or(0.0);
                let intent_match = if shard.rule.intent_tags.contains(&detected_intent) {
                    1.0
                } else {
                    0.0
                };
                let score = sim
                    + self.config.intent_boost * intent_match
                    + self.config.risk_boost(shard.rule.risk_class);
                (score, shard)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.rule.id.cmp(&b.1.rule.id))
        });

        let mut admitted: Vec<(f64, &RuleShard)> = Vec::new();
        for (score, candidate) in &scored {
            let contradiction_idx = admitted
                .iter()
                .position(|(_, adm)| contradicts(adm, candidate));
            match contradiction_idx {
                Some(idx) => {
                    let (_, adm) = admitted[idx];
                    if candidate.rule.priority > adm.rule.priority {
                        admitted[idx] = (*score, candidate);
                    }
                    // else: tie or lower priority, candidate stays excluded.
                }
                None => {
                    if admitted.len() < top_k {
                        admitted.push((*score, candidate));
                    }
                }
            }
        }

        let admitted_ids: std::collections::HashSet<&str> =
            admitted.iter().map(|(_, s)| s.rule.id.as_str()).collect();
        let score_breakdown: Vec<ShardScore> = scored
            .iter()
            .map(|(score, shard)| ShardScore {
                rule_id: shard.rule.id.clone(),
                score: *score,
                admitted: admitted_ids.contains(shard.rule.id.as_str()),
            })
            .collect();

        let selected_shards: Vec<RuleShard> = admitted.into_iter().map(|(_, s)| s.clone()).collect();
        let compact_join = selected_shards
            .iter()
            .map(|s| s.compact_text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let policy_text = format!("{}\n\n{}", self.constitution_text, compact_join);

        RetrievalResult {
            policy_text,
            selected_shards,
            detected_intent,
            confidence,
            score_breakdown,
            excluded_count,
        }
    }
}
