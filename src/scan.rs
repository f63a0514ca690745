//! Local scan orchestrator (spec §2 data flow): disk walk → ModFile rows →
//! grouping (C6) → conflict evidence (C8/C9) → load order (C11).
//!
//! Correlation against the catalog (C7) needs a `CatalogClient` this crate
//! ships no production implementation of (spec §6); it is invoked
//! separately by a caller that supplies one, not from this pipeline.

use crate::conflicts;
use crate::db::{Database, ModFileRecord, ModGroupRecord};
use crate::game::Game;
use crate::mods::grouper;
use anyhow::{Context, Result};

/// What one local scan pass touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_scanned: usize,
    pub groups: usize,
    pub conflict_evidence: usize,
    pub modlist_entries: usize,
}

/// Run every purely-local scan stage for `game`: rescan on-disk mod files,
/// regroup them, rebuild conflict evidence, and republish `modlist.txt`.
pub fn run(db: &Database, game: &Game) -> Result<ScanSummary> {
    let files = walk_mod_paths(game)?;
    db.replace_mod_files(&game.id, &files)?;
    let file_count = files.len();

    let scanned_files = db.get_mod_files(&game.id)?;
    let groups = persist_groups(db, game, scanned_files)?;

    let mut evidence = conflicts::rescan(db, &game.id)?;
    let (reds_contents, tweak_entries) = gather_script_and_tweak_sources(db, game)?;
    evidence = conflicts::rescan_scripts_and_tweaks(db, &game.id, &reds_contents, &tweak_entries)?;

    let modlist_entries = crate::loadorder::write_modlist(db, game)?;

    Ok(ScanSummary {
        files_scanned: file_count,
        groups,
        conflict_evidence: evidence.len(),
        modlist_entries,
    })
}

/// Walk every configured mod-path under `game.install_path`, recording each
/// file's path (relative to the game root, forward-slash separated) and
/// size in bytes. `.disabled` files are not part of the active surface.
fn walk_mod_paths(game: &Game) -> Result<Vec<(String, i64)>> {
    let mut files = Vec::new();
    for mod_path in &game.mod_paths {
        let root = game.install_path.join(mod_path);
        if root.is_dir() {
            walk_dir(game, &root, &mut files)?;
        }
    }
    Ok(files)
}

fn walk_dir(game: &Game, dir: &std::path::Path, out: &mut Vec<(String, i64)>) -> Result<()> {
    let read_dir = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(game, &path, out)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(&game.install_path) else { continue };
        let Some(relative_str) = relative.to_str() else { continue };
        if relative_str.ends_with(".disabled") {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        out.push((crate::game::normalize_separators(relative_str), metadata.len() as i64));
    }
    Ok(())
}

fn persist_groups(db: &Database, game: &Game, files: Vec<ModFileRecord>) -> Result<usize> {
    db.delete_mod_groups(&game.id)?;
    let groups = grouper::group_mod_files(game, files);
    let count = groups.len();
    for group in groups {
        let group_id = db.insert_mod_group(&ModGroupRecord {
            id: None,
            game_id: game.id.clone(),
            display_name: group.display_name,
            confidence: group.confidence,
        })?;
        for file in &group.files {
            if let Some(file_id) = file.id {
                db.assign_mod_group(file_id, group_id)?;
            }
        }
    }
    Ok(count)
}

/// Read every installed, enabled mod's redscript and tweak files from disk,
/// for the C9 detectors (which never touch the filesystem themselves).
fn gather_script_and_tweak_sources(
    db: &Database,
    game: &Game,
) -> Result<(Vec<(i64, Vec<String>)>, Vec<(i64, Vec<crate::conflicts::tweakxl::TweakEntry>)>)> {
    let mut reds_contents = Vec::new();
    let mut tweak_entries = Vec::new();

    for installed in db.get_installed_mods(&game.id)? {
        let Some(mod_id) = installed.id else { continue };
        let files = db.get_installed_mod_files(mod_id)?;

        let mut reds: Vec<String> = Vec::new();
        let mut tweaks = Vec::new();
        for f in files.iter().filter(|f| !f.disabled) {
            let path = game.resolve(&f.relative_path);
            let lower = f.relative_path.to_ascii_lowercase();
            if lower.ends_with(".reds") {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    reds.push(content);
                }
            } else if lower.ends_with(".yaml") || lower.ends_with(".yml") || lower.ends_with(".xl") || lower.ends_with(".tweak") {
                if let Ok(bytes) = std::fs::read(&path) {
                    tweaks.extend(crate::conflicts::tweakxl::parse_tweak_bytes(
                        &bytes,
                        &f.relative_path,
                        &mod_id.to_string(),
                    ));
                }
            }
        }
        if !reds.is_empty() {
            reds_contents.push((mod_id, reds));
        }
        if !tweaks.is_empty() {
            tweak_entries.push((mod_id, tweaks));
        }
    }

    Ok((reds_contents, tweak_entries))
}
