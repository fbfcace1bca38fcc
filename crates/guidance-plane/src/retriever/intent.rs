//! 11-intent classification (spec §4.2). Each intent (except `general`) has
//! a weighted pattern list; highest total score wins, ties broken by
//! earliest declaration order.

use crate::types::TaskIntent;
use regex::Regex;
use std::sync::OnceLock;

struct WeightedPattern {
    regex_src: &'static str,
    weight: f64,
}

/// Declaration order doubles as the tie-break order (spec: "ties broken by
/// earliest declaration order").
fn pattern_table() -> &'static [(TaskIntent, Vec<WeightedPattern>)] {
    static TABLE: OnceLock<Vec<(TaskIntent, Vec<WeightedPattern>)>> = OnceLock::new();
    let built = TABLE.get_or_init(|| {
        vec![
            (
                TaskIntent::BugFix,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bfix(es|ed|ing)?\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bbug\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\bregression\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bcrash(es|ed|ing)?\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\bbroken\b", weight: 0.8 },
                ],
            ),
            (
                TaskIntent::Feature,
                vec![
                    WeightedPattern { regex_src: r"(?i)\badd(s|ed|ing)?\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\bimplement(s|ed|ing)?\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bnew feature\b", weight: 1.5 },
                    WeightedPattern { regex_src: r"(?i)\bsupport for\b", weight: 0.8 },
                ],
            ),
            (
                TaskIntent::Refactor,
                vec![
                    WeightedPattern { regex_src: r"(?i)\brefactor(s|ed|ing)?\b", weight: 1.5 },
                    WeightedPattern { regex_src: r"(?i)\bclean ?up\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\breorganize\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\bsimplify\b", weight: 0.8 },
                ],
            ),
            (
                TaskIntent::Security,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bsecurity\b", weight: 1.5 },
                    WeightedPattern { regex_src: r"(?i)\bvulnerabilit(y|ies)\b", weight: 1.5 },
                    WeightedPattern { regex_src: r"(?i)\bauth(entication|orization)?\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bexploit\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\bcve\b", weight: 1.2 },
                ],
            ),
            (
                TaskIntent::Performance,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bperformance\b", weight: 1.3 },
                    WeightedPattern { regex_src: r"(?i)\boptimiz(e|ation)\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\blatency\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bslow\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\bthroughput\b", weight: 1.0 },
                ],
            ),
            (
                TaskIntent::Testing,
                vec![
                    WeightedPattern { regex_src: r"(?i)\btest(s|ing)?\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\bcoverage\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bunit test\b", weight: 1.3 },
                    WeightedPattern { regex_src: r"(?i)\be2e\b", weight: 0.8 },
                ],
            ),
            (
                TaskIntent::Docs,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bdocs?\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bdocumentation\b", weight: 1.3 },
                    WeightedPattern { regex_src: r"(?i)\breadme\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bcomment(s|ing)?\b", weight: 0.6 },
                ],
            ),
            (
                TaskIntent::Deployment,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bdeploy(s|ed|ment|ing)?\b", weight: 1.4 },
                    WeightedPattern { regex_src: r"(?i)\brelease\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\bci/cd\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\brollout\b", weight: 1.0 },
                ],
            ),
            (
                TaskIntent::Architecture,
                vec![
                    WeightedPattern { regex_src: r"(?i)\barchitecture\b", weight: 1.4 },
                    WeightedPattern { regex_src: r"(?i)\bdesign\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\bmodule boundary\b", weight: 1.2 },
                    WeightedPattern { regex_src: r"(?i)\bsystem design\b", weight: 1.4 },
                ],
            ),
            (
                TaskIntent::Debug,
                vec![
                    WeightedPattern { regex_src: r"(?i)\bdebug(ging)?\b", weight: 1.3 },
                    WeightedPattern { regex_src: r"(?i)\binvestigat(e|ion)\b", weight: 1.0 },
                    WeightedPattern { regex_src: r"(?i)\btrace\b", weight: 0.8 },
                    WeightedPattern { regex_src: r"(?i)\breproduce\b", weight: 0.8 },
                ],
            ),
        ]
    });
    built.as_slice()
}

fn compiled_patterns() -> &'static [(TaskIntent, Vec<Regex>)] {
    static COMPILED: OnceLock<Vec<(TaskIntent, Vec<Regex>)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        pattern_table()
            .iter()
            .map(|(intent, patterns)| {
                (
                    *intent,
                    patterns
                        .iter()
                        .map(|p| Regex::new(p.regex_src).expect("static regex"))
                        .collect(),
                )
            })
            .collect()
    })
}

fn weights_by_intent() -> &'static std::collections::HashMap<TaskIntent, Vec<f64>> {
    static W: OnceLock<std::collections::HashMap<TaskIntent, Vec<f64>>> = OnceLock::new();
    W.get_or_init(|| {
        pattern_table()
            .iter()
            .map(|(intent, patterns)| (*intent, patterns.iter().map(|p| p.weight).collect()))
            .collect()
    })
}

#[derive(Debug, Clone, Copy)]
pub struct IntentClassification {
    pub intent: TaskIntent,
    pub confidence: f64,
}

pub fn classify_intent(task_description: &str) -> IntentClassification {
    let weights = weights_by_intent();
    let mut best: Option<(TaskIntent, f64, usize)> = None;
    for (decl_order, (intent, regexes)) in compiled_patterns().iter().enumerate() {
        let w = &weights[intent];
        let mut score = 0.0;
        for (re, weight) in regexes.iter().zip(w.iter()) {
            if re.is_match(task_description) {
                score += weight;
            }
        }
        if score <= 0.0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, best_score, _)) => score > *best_score,
        };
        if better {
            best = Some((*intent, score, decl_order));
        }
    }
    match best {
        Some((intent, score, _)) => IntentClassification {
            intent,
            confidence: (score / 3.0).min(1.0),
        },
        None => IntentClassification {
            intent: TaskIntent::General,
            confidence: 0.1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_wins_for_auth_vulnerability() {
        let c = classify_intent("fix the authentication vulnerability in the login page");
        assert_eq!(c.intent, TaskIntent::Security);
        assert!(c.confidence * 3.0 >= 1.9, "score too low: {}", c.confidence * 3.0);
    }

    #[test]
    fn empty_description_falls_back_to_general() {
        let c = classify_intent("zzz qqq no recognizable tokens here");
        assert_eq!(c.intent, TaskIntent::General);
        assert_eq!(c.confidence, 0.1);
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let c = classify_intent(
            "refactor refactor refactor cleanup reorganize simplify refactoring",
        );
        assert!(c.confidence <= 1.0);
    }
}
