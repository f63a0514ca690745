//! Redscript-target conflict detectors (spec §4.9). Two complementary
//! passes: a lightweight one used by the detector registry, and a richer
//! static-analysis pass (grounded on `services/redscript_analysis.py`)
//! surfaced separately because it also reports `wrapMethod` targets as
//! informational rather than conflicting.

use crate::db::{ConflictEvidenceRecord, Database};
use anyhow::Result;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const KIND: &str = "redscript_target";

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*@(wrapMethod|replaceMethod|addMethod|addField)\((\w*)\)").unwrap()
    })
}

fn func_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"func\s+(\w+)").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LightAnnotation {
    Wrap,
    Replace,
    Add,
}

/// One `(mod_id, annotation)` claim over a `Class.funcName` key, from the
/// lightweight scan.
#[derive(Debug, Clone)]
struct Claim {
    mod_id: i64,
    annotation: LightAnnotation,
}

fn scan_reds_lightweight(content: &str) -> Vec<(String, LightAnnotation)> {
    let lines: Vec<&str> = content.lines().collect();
    let mut results = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = annotation_re().captures(lines[i]) else {
            i += 1;
            continue;
        };
        let annotation = match &caps[1] {
            "wrapMethod" => LightAnnotation::Wrap,
            "replaceMethod" => LightAnnotation::Replace,
            _ => LightAnnotation::Add,
        };
        let class_name = caps[2].to_string();
        let lookahead_end = (i + 1 + 10).min(lines.len());
        let mut found = false;
        for j in (i + 1)..lookahead_end {
            if let Some(fcaps) = func_name_re().captures(lines[j]) {
                let key = format!("{class_name}.{}", &fcaps[1]);
                results.push((key, annotation));
                i = j + 1;
                found = true;
                break;
            }
        }
        if !found {
            i += 1;
        }
    }
    results
}

#[derive(Debug, Serialize)]
struct RedscriptConflictDetail {
    target: String,
    annotation: &'static str,
}

/// Lightweight registry-pass detector: `(installed_mod_id, reds_contents)`
/// pairs in, one `ConflictEvidence` per `Class.funcName` claimed by ≥ 2
/// distinct mods.
pub fn detect(
    db: &Database,
    game_id: &str,
    mod_reds_contents: &[(i64, Vec<String>)],
) -> Result<Vec<ConflictEvidenceRecord>> {
    let mut claims_by_key: HashMap<String, Vec<Claim>> = HashMap::new();
    for (mod_id, files) in mod_reds_contents {
        for content in files {
            for (key, annotation) in scan_reds_lightweight(content) {
                claims_by_key.entry(key).or_default().push(Claim { mod_id: *mod_id, annotation });
            }
        }
    }

    let mut evidence = Vec::new();
    let mut keys: Vec<&String> = claims_by_key.keys().collect();
    keys.sort();
    for key in keys {
        let claims = &claims_by_key[key];
        let mut unique_mods: Vec<i64> = claims.iter().map(|c| c.mod_id).collect();
        unique_mods.sort();
        unique_mods.dedup();
        if unique_mods.len() < 2 {
            continue;
        }
        let severity = if claims.iter().any(|c| matches!(c.annotation, LightAnnotation::Wrap | LightAnnotation::Replace)) {
            "high"
        } else {
            "medium"
        };
        let annotation_label = match claims[0].annotation {
            LightAnnotation::Wrap => "wrapMethod",
            LightAnnotation::Replace => "replaceMethod",
            LightAnnotation::Add => "addMethod",
        };
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
                detail_json: serde_json::to_string(&RedscriptConflictDetail {
                    target: key.clone(),
                    annotation: annotation_label,
                })?,
            });
        }
    }

    Ok(evidence)
}

/// The richer static-analysis pass, surfaced as its own query.
pub mod static_analysis {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum AnnotationType {
        ReplaceMethod,
        ReplaceGlobal,
        WrapMethod,
    }

    /// A parsed `@replaceMethod`/`@replaceGlobal`/`@wrapMethod` target.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RedscriptTarget {
        pub annotation_type: AnnotationType,
        pub class_name: Option<String>,
        pub func_name: String,
        pub param_types: Vec<String>,
        pub return_type: String,
        pub conflict_key: String,
    }

    #[derive(Debug, Clone)]
    pub struct ModEntry {
        pub installed_mod_id: i64,
        pub installed_mod_name: String,
        pub file_path: String,
        pub annotation_type: AnnotationType,
        pub line_number: usize,
    }

    #[derive(Debug, Clone)]
    pub struct Conflict {
        pub conflict_key: String,
        pub target_class: Option<String>,
        pub target_func: String,
        pub mods: Vec<ModEntry>,
    }

    #[derive(Debug, Clone)]
    pub struct WrapInfo {
        pub conflict_key: String,
        pub target_class: Option<String>,
        pub target_func: String,
        pub mods: Vec<ModEntry>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct ConflictResult {
        pub total_reds_files: usize,
        pub total_targets_found: usize,
        pub conflicts: Vec<Conflict>,
        pub wraps: Vec<WrapInfo>,
    }

    fn annotation_full_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(r"^\s*@(replaceMethod|replaceGlobal|wrapMethod)\(\s*(\w*)\s*\)").unwrap()
        })
    }

    fn func_sig_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(
                r"(?:public|protected|private)?\s*(?:static\s+)?(?:cb\s+)?func\s+(\w+)\s*\(([^)]*)\)(?:\s*->\s*([^{;]+))?",
            )
            .unwrap()
        })
    }

    fn normalize_param_types(params: &str) -> Vec<String> {
        if params.trim().is_empty() {
            return Vec::new();
        }
        params
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once(':') {
                Some((_, ty)) => ty.trim().to_string(),
                None => p.to_string(),
            })
            .collect()
    }

    fn build_conflict_key(class_name: Option<&str>, func_name: &str, param_types: &[String], return_type: &str) -> String {
        let scope = class_name.unwrap_or("global");
        let params = param_types.join(", ");
        let ret = if return_type.trim().is_empty() { "Void" } else { return_type.trim() };
        format!("{scope}::{func_name}({params}) -> {ret}")
    }

    /// Parse a `.reds` file's content, returning every annotated target with
    /// its annotation line number (1-based).
    pub fn parse_reds_content(content: &str) -> Vec<(RedscriptTarget, usize)> {
        let lines: Vec<&str> = content.lines().collect();
        let mut results = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let Some(caps) = annotation_full_re().captures(lines[i]) else {
                i += 1;
                continue;
            };
            let annotation_type = match &caps[1] {
                "replaceMethod" => AnnotationType::ReplaceMethod,
                "replaceGlobal" => AnnotationType::ReplaceGlobal,
                _ => AnnotationType::WrapMethod,
            };
            let class_arg = caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()).map(str::to_string);
            let annotation_line = i + 1;

            let lookahead_end = (i + 1 + 10).min(lines.len());
            let mut found = false;
            let mut joined = String::new();
            for j in (i + 1)..lookahead_end {
                if !joined.is_empty() {
                    joined.push(' ');
                }
                joined.push_str(lines[j]);
                if let Some(sig) = func_sig_re().captures(&joined) {
                    let func_name = sig[1].to_string();
                    let raw_params = sig.get(2).map(|m| m.as_str()).unwrap_or("");
                    let raw_return = sig
                        .get(3)
                        .map(|m| m.as_str().trim().trim_end_matches('{').trim())
                        .filter(|s| !s.is_empty())
                        .unwrap_or("Void")
                        .to_string();
                    let param_types = normalize_param_types(raw_params);
                    let conflict_key =
                        build_conflict_key(class_arg.as_deref(), &func_name, &param_types, &raw_return);
                    results.push((
                        RedscriptTarget {
                            annotation_type,
                            class_name: class_arg,
                            func_name,
                            param_types,
                            return_type: raw_return,
                            conflict_key,
                        },
                        annotation_line,
                    ));
                    i = j + 1;
                    found = true;
                    break;
                }
            }
            if !found {
                i += 1;
            }
        }
        results
    }

    /// Analyze `(installed_mod_id, installed_mod_name, file_path, content)`
    /// tuples for every `.reds` file of every enabled mod.
    pub fn check_conflicts(mod_reds_files: &[(i64, String, String, String)]) -> ConflictResult {
        let mut replace_targets: HashMap<String, Vec<ModEntry>> = HashMap::new();
        let mut wrap_targets: HashMap<String, Vec<ModEntry>> = HashMap::new();
        let mut total_reds_files = 0;
        let mut total_targets = 0;

        for (mod_id, mod_name, file_path, content) in mod_reds_files {
            total_reds_files += 1;
            for (target, line_no) in parse_reds_content(content) {
                total_targets += 1;
                let entry = ModEntry {
                    installed_mod_id: *mod_id,
                    installed_mod_name: mod_name.clone(),
                    file_path: file_path.clone(),
                    annotation_type: target.annotation_type,
                    line_number: line_no,
                };
                if matches!(target.annotation_type, AnnotationType::WrapMethod) {
                    wrap_targets.entry(target.conflict_key).or_default().push(entry);
                } else {
                    replace_targets.entry(target.conflict_key).or_default().push(entry);
                }
            }
        }

        let mut conflicts: Vec<Conflict> = replace_targets
            .into_iter()
            .filter_map(|(key, entries)| {
                let unique: std::collections::HashSet<i64> =
                    entries.iter().map(|e| e.installed_mod_id).collect();
                if unique.len() < 2 {
                    return None;
                }
                let (scope, rest) = key.split_once("::")?;
                let func_part = rest.split('(').next()?.to_string();
                Some(Conflict {
                    conflict_key: key.clone(),
                    target_class: (scope != "global").then(|| scope.to_string()),
                    target_func: func_part,
                    mods: entries,
                })
            })
            .collect();

        let mut wraps: Vec<WrapInfo> = wrap_targets
            .into_iter()
            .filter_map(|(key, entries)| {
                let (scope, rest) = key.split_once("::")?;
                let func_part = rest.split('(').next()?.to_string();
                Some(WrapInfo {
                    conflict_key: key.clone(),
                    target_class: (scope != "global").then(|| scope.to_string()),
                    target_func: func_part,
                    mods: entries,
                })
            })
            .collect();

        conflicts.sort_by(|a, b| a.conflict_key.cmp(&b.conflict_key));
        wraps.sort_by(|a, b| a.conflict_key.cmp(&b.conflict_key));

        ConflictResult { total_reds_files, total_targets_found: total_targets, conflicts, wraps }
    }
}

#[cfg(test)]
mod tests {
    use super::static_analysis::*;
    use super::*;
    use crate::db::GameRecord;

    fn setup_game(db: &Database) {
        db.upsert_game(&GameRecord {
            id: "cp".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: "/games/cp77".to_string(),
            mod_paths_json: "[]".to_string(),
        })
        .unwrap();
    }

    #[test]
    fn two_mods_replacing_the_same_method_is_high_severity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let src_a = "@replaceMethod(PlayerPuppet)\npublic func OnTakeDamage(evt: ref<gameDamageEvent>) -> Void {\n}"
            .to_string();
        let src_b = "@replaceMethod(PlayerPuppet)\npublic func OnTakeDamage(evt: ref<gameDamageEvent>) -> Void {\n}"
            .to_string();

        let evidence = detect(&db, "cp", &[(1, vec![src_a]), (2, vec![src_b])]).unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].severity, "high");
    }

    #[test]
    fn add_method_conflict_is_medium_severity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let src_a = "@addMethod(PlayerPuppet)\npublic func NewThing() -> Void {\n}".to_string();
        let src_b = "@addMethod(PlayerPuppet)\npublic func NewThing() -> Void {\n}".to_string();

        let evidence = detect(&db, "cp", &[(1, vec![src_a]), (2, vec![src_b])]).unwrap();
        assert_eq!(evidence[0].severity, "medium");
    }

    #[test]
    fn single_mod_claim_is_not_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let src = "@replaceMethod(PlayerPuppet)\npublic func OnTakeDamage() -> Void {\n}".to_string();
        assert!(detect(&db, "cp", &[(1, vec![src])]).unwrap().is_empty());
    }

    #[test]
    fn static_analysis_builds_canonical_conflict_key_with_param_types() {
        let content = "@replaceMethod(PlayerPuppet)\npublic func OnTakeDamage(evt: ref<gameDamageEvent>, force: Bool) -> Void {";
        let parsed = parse_reds_content(content);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0.conflict_key, "PlayerPuppet::OnTakeDamage(ref<gameDamageEvent>, Bool) -> Void");
    }

    #[test]
    fn static_analysis_separates_wrap_info_from_conflicts() {
        let a = (1, "ModA".to_string(), "a.reds".to_string(),
            "@wrapMethod(PlayerPuppet)\npublic func OnTakeDamage() -> Void {".to_string());
        let b = (2, "ModB".to_string(), "b.reds".to_string(),
            "@wrapMethod(PlayerPuppet)\npublic func OnTakeDamage() -> Void {".to_string());
        let result = check_conflicts(&[a, b]);
        assert!(result.conflicts.is_empty());
        assert_eq!(result.wraps.len(), 1);
        assert_eq!(result.wraps[0].mods.len(), 2);
    }

    #[test]
    fn static_analysis_reports_totals() {
        let a = (1, "ModA".to_string(), "a.reds".to_string(),
            "@replaceMethod(Foo)\npublic func Bar() -> Void {".to_string());
        let result = check_conflicts(&[a]);
        assert_eq!(result.total_reds_files, 1);
        assert_eq!(result.total_targets_found, 1);
    }
}
