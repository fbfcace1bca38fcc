//! Persisted state layout (spec §6): `events.log` and `adrs.log` as
//! append-only JSON-lines, `manifest.json`/`tracker.json` as whole-file
//! JSON. Grounded on `ai-dx-mcp/src/witness.rs`'s self-describing,
//! forward-compatible JSON record style.

use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record)?;
    writeln!(file, "{line}")?;
    Ok(())
}

pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> std::io::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body)
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> std::io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}
