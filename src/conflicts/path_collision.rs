//! Archive-entry path-collision detector (spec §4.9): any relative path
//! owned by two or more enabled installed mods is a conflict. Most roots
//! are settled in favour of whichever mod was installed most recently;
//! `archive/pc/mod/` is the one case neither the modlist nor the
//! rename-fallback load-order path can actually resolve (the filenames
//! collide, so there is nothing to rename), so that root is surfaced as
//! an unresolved, winnerless conflict instead (spec §9).

use crate::db::{ConflictEvidenceRecord, Database};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

pub const KIND: &str = "path_collision";
/// Two distinct installed mods both own the same `archive/pc/mod/` entry.
/// Neither the modlist path nor the rename fallback can order identical
/// filenames, so this is recorded without a winner rather than guessed.
pub const AMBIGUOUS_KIND: &str = "archive_entry_ambiguous";

#[derive(Debug, Serialize)]
struct PathCollisionDetail<'a> {
    path: &'a str,
}

fn is_archive_mod_root(path: &str) -> bool {
    path.replace('\\', "/").to_ascii_lowercase().starts_with("archive/pc/mod")
}

fn severity_for_path(path: &str) -> &'static str {
    let lower = path.replace('\\', "/").to_ascii_lowercase();
    if lower.starts_with("archive/pc/mod") || lower.starts_with("bin/x64/plugins") {
        "high"
    } else if lower.starts_with("r6/scripts") || lower.starts_with("r6/tweaks") || lower.starts_with("mods") {
        "medium"
    } else {
        "low"
    }
}

/// Rebuild path-collision evidence for `game_id`: collect every enabled
/// installed mod's owned relative paths and flag any path claimed by more
/// than one mod.
pub fn detect(db: &Database, game_id: &str) -> Result<Vec<ConflictEvidenceRecord>> {
    let mods = db.get_installed_mods(game_id)?;

    // path -> [(installed_mod_id, installed_at)], in mod-list order.
    let mut owners: HashMap<String, Vec<(i64, String)>> = HashMap::new();
    for m in mods.iter().filter(|m| !m.disabled) {
        let Some(mod_id) = m.id else { continue };
        for f in db.get_installed_mod_files(mod_id)? {
            if f.disabled {
                continue;
            }
            owners.entry(f.relative_path).or_default().push((mod_id, m.installed_at.clone()));
        }
    }

    let mut evidence = Vec::new();
    let mut paths: Vec<&String> = owners.keys().collect();
    paths.sort();
    for path in paths {
        let claimants = &owners[path];
        if claimants.len() < 2 {
            continue;
        }
        let mut sorted = claimants.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        let severity = severity_for_path(path);

        if is_archive_mod_root(path) {
            for i in 0..sorted.len() {
                for j in (i + 1)..sorted.len() {
                    evidence.push(ConflictEvidenceRecord {
                        id: None,
                        game_id: game_id.to_string(),
                        kind: AMBIGUOUS_KIND.to_string(),
                        severity: severity.to_string(),
                        key: path.clone(),
                        mod_a_id: sorted[i].0,
                        mod_b_id: sorted[j].0,
                        winner_mod_id: None,
                        detail_json: serde_json::to_string(&PathCollisionDetail { path })?,
                    });
                }
            }
            continue;
        }

        let (winner_mod_id, _) = sorted[0];
        for (loser_mod_id, _) in &sorted[1..] {
            if *loser_mod_id == winner_mod_id {
                continue;
            }
            evidence.push(ConflictEvidenceRecord {
                id: None,
                game_id: game_id.to_string(),
                kind: KIND.to_string(),
                severity: severity.to_string(),
                key: path.clone(),
                mod_a_id: winner_mod_id,
                mod_b_id: *loser_mod_id,
                winner_mod_id: Some(winner_mod_id),
                detail_json: serde_json::to_string(&PathCollisionDetail { path })?,
            });
        }
    }

    Ok(evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GameRecord, InstalledModFileRecord, InstalledModRecord};

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

    fn install_mod(db: &Database, name: &str, installed_at: &str, paths: &[&str]) -> i64 {
        let id = db
            .insert_installed_mod(&InstalledModRecord {
                id: None,
                game_id: "cp".to_string(),
                name: name.to_string(),
                source_archive: None,
                disabled: false,
                installed_version: None,
                nexus_mod_id: None,
                nexus_file_id: None,
                upload_timestamp: None,
                mod_group_id: None,
                installed_at: installed_at.to_string(),
            })
            .unwrap();
        for p in paths {
            db.insert_installed_mod_file(&InstalledModFileRecord {
                id: None,
                installed_mod_id: id,
                relative_path: p.to_string(),
                disabled: false,
            })
            .unwrap();
        }
        id
    }

    #[test]
    fn shared_archive_path_is_surfaced_as_an_unresolved_ambiguity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let first = install_mod(&db, "First", "2026-01-01T00:00:00Z", &["archive/pc/mod/shared.archive"]);
        let second = install_mod(&db, "Second", "2026-01-02T00:00:00Z", &["archive/pc/mod/shared.archive"]);

        let evidence = path_collision_detect(&db);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind, AMBIGUOUS_KIND);
        assert_eq!(evidence[0].severity, "high");
        assert_eq!(evidence[0].winner_mod_id, None);
        assert_eq!(evidence[0].mod_a_id, first);
        assert_eq!(evidence[0].mod_b_id, second);
    }

    #[test]
    fn scripts_path_collision_is_medium_severity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        install_mod(&db, "First", "2026-01-01T00:00:00Z", &["r6/scripts/shared.reds"]);
        install_mod(&db, "Second", "2026-01-02T00:00:00Z", &["r6/scripts/shared.reds"]);

        let evidence = path_collision_detect(&db);
        assert_eq!(evidence[0].severity, "medium");
    }

    #[test]
    fn unshared_paths_yield_no_evidence() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        install_mod(&db, "First", "2026-01-01T00:00:00Z", &["r6/scripts/a.reds"]);
        install_mod(&db, "Second", "2026-01-02T00:00:00Z", &["r6/scripts/b.reds"]);

        assert!(path_collision_detect(&db).is_empty());
    }

    fn path_collision_detect(db: &Database) -> Vec<ConflictEvidenceRecord> {
        detect(db, "cp").unwrap()
    }
}
