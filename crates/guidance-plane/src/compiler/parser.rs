//! Rule-line grammar (spec §6):
//! `[ID] <text> (@tag)* (#domain)* (scope:<glob>)? (priority:<int>)? (\(risk\))?`

use crate::types::RiskClass;
use regex::Regex;
use std::sync::OnceLock;

fn id_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(?P<id>[^\]]+)\]\s*(?P<rest>.*)$").expect("static regex"))
}

fn malformed_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A line that looks like it was trying to be a rule line (opens with
    // `[`) but doesn't close the id bracket before end of line.
    RE.get_or_init(|| Regex::new(r"^\[[^\]]*$").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_.\-/]+)").expect("static regex"))
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z0-9_.\-/]+)").expect("static regex"))
}

fn scope_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"scope:(\S+)").expect("static regex"))
}

fn priority_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"priority:(-?\d+)").expect("static regex"))
}

fn risk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\((low|medium|high|critical)\)").expect("static regex")
    })
}

pub(crate) fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,4})\s*(.+?)\s*$").expect("static regex"))
}

pub(crate) fn constitution_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)safety|security|invariant|constitution|critical|non-negotiable|always|must|never|required|mandatory",
        )
        .expect("static regex")
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedRuleLine {
    pub id: String,
    pub text: String,
    pub tags: Vec<String>,
    pub domains: Vec<String>,
    pub scope: Option<String>,
    pub priority: Option<i64>,
    pub risk: Option<RiskClass>,
}

/// Returns `Some(Ok(parsed))` for a well-formed rule line, `Some(Err(()))`
/// for a line that looks like an attempted rule line but is malformed
/// (caller should emit a warning and treat it as prose), or `None` for a
/// line that's plain prose.
pub(crate) fn parse_rule_line(line: &str) -> Option<Result<ParsedRuleLine, ()>> {
    let trimmed = line.trim_end();
    if let Some(caps) = id_line_re().captures(trimmed) {
        let id = caps["id"].trim().to_string();
        if id.is_empty() {
            return Some(Err(()));
        }
        let mut rest = caps["rest"].to_string();

        let tags: Vec<String> = tag_re()
            .captures_iter(&rest)
            .map(|c| c[1].to_string())
            .collect();
        rest = tag_re().replace_all(&rest, "").to_string();

        let domains: Vec<String> = domain_re()
            .captures_iter(&rest)
            .map(|c| c[1].to_string())
            .collect();
        rest = domain_re().replace_all(&rest, "").to_string();

        let scope = scope_re().captures(&rest).map(|c| c[1].to_string());
        rest = scope_re().replace_all(&rest, "").to_string();

        let priority = priority_re()
            .captures(&rest)
            .and_then(|c| c[1].parse::<i64>().ok());
        rest = priority_re().replace_all(&rest, "").to_string();

        let risk = risk_re()
            .captures(&rest)
            .and_then(|c| RiskClass::from_str_loose(&c[1]));
        rest = risk_re().replace_all(&rest, "").to_string();

        let text = rest.split_whitespace().collect::<Vec<_>>().join(" ");

        return Some(Ok(ParsedRuleLine {
            id,
            text,
            tags,
            domains,
            scope,
            priority,
            risk,
        }));
    }
    if malformed_id_re().is_match(trimmed) {
        return Some(Err(()));
    }
    None
}
