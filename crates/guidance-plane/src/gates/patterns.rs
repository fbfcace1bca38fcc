//! Default pattern lists (spec §4.3). Precompiled once into the gate
//! instance at config-load time — never recompiled per call — so the
//! determinism contract holds regardless of how many times a gate runs.

pub const DEFAULT_DESTRUCTIVE_PATTERNS: &[&str] = &[
    r"(?i)\brm\s+-rf\b",
    r"(?i)\bDROP\s+(DATABASE|TABLE|SCHEMA|INDEX)\b",
    r"(?i)\bTRUNCATE\s+TABLE\b",
    r"(?i)\bgit\s+push\s+--force\b",
    r"(?i)\bgit\s+reset\s+--hard\b",
    r"(?i)\bgit\s+clean\s+-fd\b",
    r"(?i)\bformat\s+[a-zA-Z]:",
    r"(?i)\bdel\s+(/s|/f)\b",
    r"(?i)\b(kubectl|helm)\s+delete\s+(--all|.*\bnamespace\b)",
    r"(?i)\bDELETE\s+FROM\b.*$",
    r"(?i)\bALTER\s+TABLE\b.*\bDROP\b",
];

/// Every pattern carries a named `secret` capture group identifying exactly
/// the token to redact (spec: "the secret value is partially redacted",
/// not the surrounding assignment syntax).
pub const DEFAULT_SECRET_PATTERNS: &[&str] = &[
    r#"(?i)api[_-]?key\s*[:=]\s*['"]?(?P<secret>[A-Za-z0-9_\-]{16,})['"]?"#,
    r#"(?i)password\s*[:=]\s*['"]?(?P<secret>[^\s'"]{6,})['"]?"#,
    r"(?i)bearer\s+(?P<secret>[A-Za-z0-9\-_.]{16,})",
    r"(?P<secret>-----BEGIN\s+(RSA|EC|DSA|OPENSSH|PGP)?\s*PRIVATE KEY-----)",
    r"\b(?P<secret>sk-[A-Za-z0-9]{16,})\b",
    r"\b(?P<secret>ghp_[A-Za-z0-9]{20,})\b",
    r"\b(?P<secret>npm_[A-Za-z0-9]{20,})\b",
    r"\b(?P<secret>AKIA[A-Z0-9]{12,})\b",
];
