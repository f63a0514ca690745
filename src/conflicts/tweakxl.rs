//! TweakXL tweak parser and conflict analyser (spec §4.9), grounded on
//! `services/tweakxl_parser.py` and `services/tweakxl_conflict_analyzer.py`.

use crate::db::ConflictEvidenceRecord;
use anyhow::Result;
use regex_lite::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::sync::OnceLock;

pub const KIND: &str = "tweak_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweakOperation {
    Set,
    Append,
    Remove,
}

/// One flattened tweak operation parsed out of a `.yaml`/`.yml`/`.xl`/`.tweak` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweakEntry {
    pub key: String,
    pub operation: TweakOperation,
    pub value: String,
    pub source_file: String,
    pub mod_id: String,
}

fn tweak_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z0-9_.]+)\s*([+\-]?=)\s*(.+?)\s*$").unwrap())
}

fn normalize_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

/// `!append`/`!append-once` and `!remove` are YAML custom tags TweakXL
/// uses inside sequences; `serde_yaml` surfaces them as tagged values.
fn sequence_item_operation(value: &Value) -> (TweakOperation, String) {
    if let Value::Tagged(tagged) = value {
        let tag = tagged.tag.to_string();
        if tag == "!append" || tag == "!append-once" {
            return (TweakOperation::Append, normalize_value(&tagged.value));
        }
        if tag == "!remove" {
            return (TweakOperation::Remove, normalize_value(&tagged.value));
        }
    }
    (TweakOperation::Append, normalize_value(value))
}

fn flatten_yaml(prefix: &str, data: &Value, out: &mut Vec<(String, TweakOperation, String)>) {
    match data {
        Value::Mapping(map) => {
            for (k, v) in map {
                let Some(field) = k.as_str() else { continue };
                let child_key = if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") };
                flatten_yaml(&child_key, v, out);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                let (op, val) = sequence_item_operation(item);
                out.push((prefix.to_string(), op, val));
            }
        }
        other => out.push((prefix.to_string(), TweakOperation::Set, normalize_value(other))),
    }
}

const UTF8_BOM: &str = "\u{feff}";

fn decode_lossy(content: &[u8]) -> String {
    String::from_utf8_lossy(content).trim_start_matches(UTF8_BOM).to_string()
}

/// Parse a TweakXL YAML document (`.yaml`/`.yml`/`.xl`) into its flattened
/// tweak operations.
pub fn parse_yaml_tweaks(content: &[u8], source_file: &str, mod_id: &str) -> Vec<TweakEntry> {
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Vec::new();
    }
    let text = decode_lossy(content);

    let mut entries = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(&text) {
        let Ok(value) = Value::deserialize(doc) else { continue };
        let Value::Mapping(top) = value else { continue };
        for (top_key, top_val) in top {
            let Some(top_key) = top_key.as_str() else { continue };
            let mut flattened = Vec::new();
            flatten_yaml(top_key, &top_val, &mut flattened);
            for (key, operation, value) in flattened {
                entries.push(TweakEntry {
                    key,
                    operation,
                    value,
                    source_file: source_file.to_string(),
                    mod_id: mod_id.to_string(),
                });
            }
        }
    }
    entries
}

/// Parse a TweakXL `.tweak` file (line-oriented `key = value` /
/// `key += value` / `key -= value`) into its tweak operations.
pub fn parse_tweak_file(content: &[u8], source_file: &str, mod_id: &str) -> Vec<TweakEntry> {
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Vec::new();
    }
    let text = decode_lossy(content);

    let mut entries = Vec::new();
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') || stripped.starts_with("//") {
            continue;
        }
        let Some(caps) = tweak_line_re().captures(stripped) else { continue };
        let operation = match &caps[2] {
            "+=" => TweakOperation::Append,
            "-=" => TweakOperation::Remove,
            _ => TweakOperation::Set,
        };
        entries.push(TweakEntry {
            key: caps[1].to_string(),
            operation,
            value: caps[3].to_string(),
            source_file: source_file.to_string(),
            mod_id: mod_id.to_string(),
        });
    }
    entries
}

/// Dispatch to the correct parser based on `source_file`'s extension.
pub fn parse_tweak_bytes(content: &[u8], source_file: &str, mod_id: &str) -> Vec<TweakEntry> {
    let lower = source_file.to_ascii_lowercase();
    match lower.rsplit_once('.') {
        Some((_, "yaml" | "yml" | "xl")) => parse_yaml_tweaks(content, source_file, mod_id),
        Some((_, "tweak")) => parse_tweak_file(content, source_file, mod_id),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone)]
pub struct TweakConflictEvidence {
    pub key: String,
    pub severity: ConflictSeverity,
    pub description: String,
    pub entry_a: TweakEntry,
    pub entry_b: TweakEntry,
}

#[derive(Debug, Clone, Default)]
pub struct TweakConflictResult {
    pub total_entries: usize,
    pub total_conflicts: usize,
    pub conflicts: Vec<TweakConflictEvidence>,
    pub mods_analyzed: Vec<String>,
}

fn check_pair(a: &TweakEntry, b: &TweakEntry) -> Option<TweakConflictEvidence> {
    use TweakOperation::*;
    match (a.operation, b.operation) {
        (Set, Set) if a.value != b.value => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::High,
            description: format!("Both mods set {} to different values: '{}' vs '{}'", a.key, a.value, b.value),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Set, Set) => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Low,
            description: format!("Both mods set {} to the same value '{}' (redundant)", a.key, a.value),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Append, Remove) if a.value == b.value => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!("One mod appends '{}' to {} while the other removes it", a.value, a.key),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Remove, Append) if a.value == b.value => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!("One mod removes '{}' from {} while the other appends it", a.value, a.key),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Set, Append) => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!(
                "One mod overwrites {} while the other appends to it; final state depends on load order",
                a.key
            ),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Append, Set) => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!(
                "One mod appends to {} while the other overwrites it; final state depends on load order",
                a.key
            ),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Set, Remove) => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!("One mod sets {} while the other removes values from it", a.key),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        (Remove, Set) => Some(TweakConflictEvidence {
            key: a.key.clone(),
            severity: ConflictSeverity::Medium,
            description: format!("One mod removes values from {} while the other sets it", a.key),
            entry_a: a.clone(),
            entry_b: b.clone(),
        }),
        _ => None,
    }
}

fn compare_mod_pair(entries_a: &[TweakEntry], entries_b: &[TweakEntry]) -> Vec<TweakConflictEvidence> {
    let mut conflicts = Vec::new();
    for a in entries_a {
        for b in entries_b {
            if let Some(evidence) = check_pair(a, b) {
                conflicts.push(evidence);
            }
        }
    }
    conflicts
}

/// Compare tweak entries from N mods (keyed by mod id) and detect semantic
/// conflicts, case-insensitive on key.
pub fn analyze_conflicts(mod_entries: &std::collections::BTreeMap<String, Vec<TweakEntry>>) -> TweakConflictResult {
    let total_entries: usize = mod_entries.values().map(Vec::len).sum();

    let mut key_index: std::collections::HashMap<String, Vec<&TweakEntry>> = std::collections::HashMap::new();
    for entries in mod_entries.values() {
        for entry in entries {
            key_index.entry(entry.key.to_ascii_lowercase()).or_default().push(entry);
        }
    }

    let mut conflicts = Vec::new();
    for entries in key_index.values() {
        let mut by_mod: std::collections::BTreeMap<&str, Vec<TweakEntry>> = std::collections::BTreeMap::new();
        for e in entries {
            by_mod.entry(e.mod_id.as_str()).or_default().push((*e).clone());
        }
        if by_mod.len() < 2 {
            continue;
        }
        let mod_ids: Vec<&str> = by_mod.keys().copied().collect();
        for i in 0..mod_ids.len() {
            for j in (i + 1)..mod_ids.len() {
                conflicts.extend(compare_mod_pair(&by_mod[mod_ids[i]], &by_mod[mod_ids[j]]));
            }
        }
    }

    conflicts.sort_by(|a, b| (a.severity, &a.key).cmp(&(b.severity, &b.key)));

    TweakConflictResult {
        total_entries,
        total_conflicts: conflicts.len(),
        mods_analyzed: mod_entries.keys().cloned().collect(),
        conflicts,
    }
}

/// Registry-facing detector: given `(installed_mod_id, parsed tweak
/// entries)` pairs, flag any key claimed by ≥ 2 distinct mods. Severity is
/// `low` when every claim on that key is an append, else `medium`.
pub fn detect(game_id: &str, mod_entries: &[(i64, Vec<TweakEntry>)]) -> Result<Vec<ConflictEvidenceRecord>> {
    let mut claims_by_key: std::collections::BTreeMap<String, Vec<(i64, TweakOperation)>> =
        std::collections::BTreeMap::new();
    for (mod_id, entries) in mod_entries {
        for e in entries {
            claims_by_key.entry(e.key.to_ascii_lowercase()).or_default().push((*mod_id, e.operation));
        }
    }

    let mut evidence = Vec::new();
    for (key, claims) in claims_by_key {
        let mut unique_mods: Vec<i64> = claims.iter().map(|(id, _)| *id).collect();
        unique_mods.sort();
        unique_mods.dedup();
        if unique_mods.len() < 2 {
            continue;
        }
        let severity = if claims.iter().all(|(_, op)| *op == TweakOperation::Append) { "low" } else { "medium" };
        let anchor = unique_mods[0];
        for &other in &unique_mods[1..] {
            evidence.push(ConflictEvidenceRecord {
                id: None,
                game_id: game_id.to_string(),
                kind: KIND.to_string(),
                severity: severity.to_string(),
                key: key.clone(),
                mod_a_id: anchor,
                mod_b_id: other,
                winner_mod_id: None,
                detail_json: serde_json::to_string(&key)?,
            });
        }
    }
    Ok(evidence)
}
