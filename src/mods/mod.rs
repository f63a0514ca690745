//! Mod installation, uninstallation, and enable/disable toggle (spec §4.10).
//!
//! Unlike the teacher's symlink-staged deployment model, a RED-engine mod is
//! extracted directly into the game tree and its ownership tracked per
//! relative path in `InstalledModFile` rather than reconciled by a
//! whole-game redeploy pass.

pub mod fomod;
pub mod grouper;

pub use grouper::*;

use crate::archive::ArchiveReader;
use crate::db::{Database, InstalledModFileRecord, InstalledModRecord};
use crate::filename::parse_filename;
use crate::game::{normalize_separators, safe_join, strip_wrapper, Game};
use crate::layout::{detect_layout, ArchiveLayout};
use crate::red_archive::parse_red_archive;
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "7z", "rar"];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct InstallResult {
    pub installed_mod_id: i64,
    pub name: String,
    pub files_extracted: usize,
    pub files_skipped: usize,
    pub files_overwritten: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct UninstallResult {
    pub files_deleted: usize,
    pub directories_removed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ToggleResult {
    pub disabled: bool,
    pub files_affected: usize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrphanCleanupResult {
    pub deleted_count: usize,
    pub freed_bytes: u64,
    pub deleted_files: Vec<String>,
}

fn is_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ARCHIVE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Every staged archive sitting in `<install_path>/downloaded_mods`.
pub fn list_staged_archives(game: &Game) -> Result<Vec<PathBuf>> {
    let staging = game.staging_dir();
    if !staging.is_dir() {
        return Ok(Vec::new());
    }
    let mut archives: Vec<PathBuf> = std::fs::read_dir(&staging)
        .with_context(|| format!("failed to read {}", staging.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_archive_extension(p))
        .collect();
    archives.sort();
    Ok(archives)
}

/// `{lower-cased relative path -> owning InstalledMod id}` across every
/// installed mod for this game.
fn file_ownership_map(db: &Database, game_id: &str) -> Result<HashMap<String, i64>> {
    let mut ownership = HashMap::new();
    for m in db.get_installed_mods(game_id)? {
        let Some(mod_id) = m.id else { continue };
        for f in db.get_installed_mod_files(mod_id)? {
            ownership.insert(f.relative_path.to_ascii_lowercase(), mod_id);
        }
    }
    Ok(ownership)
}

struct PlannedEntry {
    archive_entry: String,
    target_relative: String,
    target_relative_lower: String,
}

/// Extract `archive_path` into `game`'s tree and record file ownership.
///
/// Rejects FOMOD-layout archives; callers must route those through
/// [`fomod`] instead.
pub fn install(
    db: &Database,
    game: &Game,
    archive_path: &Path,
    skip_conflicts: &[String],
    file_renames: &HashMap<String, String>,
) -> Result<InstallResult> {
    if !archive_path.is_file() {
        bail!("archive not found: {}", archive_path.display());
    }
    if !game.install_path.is_dir() {
        bail!("game directory not found: {}", game.install_path.display());
    }

    let filename = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("archive path has no filename: {}", archive_path.display()))?;
    let parsed = parse_filename(filename);

    if db.get_installed_mod(&game.id, &parsed.name)?.is_some() {
        bail!("mod '{}' is already installed; uninstall first to reinstall", parsed.name);
    }

    let skip_set: HashSet<String> =
        skip_conflicts.iter().map(|p| normalize_separators(p).to_ascii_lowercase()).collect();
    let rename_map: HashMap<String, String> = file_renames
        .iter()
        .map(|(k, v)| (normalize_separators(k), normalize_separators(v)))
        .collect();

    let ownership = file_ownership_map(db, &game.id)?;

    let mut reader = ArchiveReader::open(archive_path)?;
    let entries = reader.list_entries()?;
    let layout = detect_layout(&entries);
    if layout == ArchiveLayout::Fomod {
        bail!(
            "'{filename}' is a FOMOD installer; install it through the FOMOD wizard instead of the plain installer"
        );
    }
    let strip_prefix = match &layout {
        ArchiveLayout::Wrapped { strip_prefix } => Some(strip_prefix.clone()),
        _ => None,
    };

    let mut planned = Vec::new();
    let mut skipped = 0usize;
    for entry in &entries {
        let mut normalized = normalize_separators(entry);
        if let Some(prefix) = &strip_prefix {
            let stripped = strip_wrapper(&normalized, prefix);
            if stripped == normalized {
                skipped += 1;
                continue;
            }
            normalized = stripped;
        }
        if let Some(renamed) = rename_map.get(&normalized) {
            normalized = renamed.clone();
        }
        let lower = normalized.to_ascii_lowercase();
        if skip_set.contains(&lower) {
            skipped += 1;
            continue;
        }
        if safe_join(&game.install_path, &normalized).is_none() {
            tracing::warn!("skipping path traversal entry: {entry}");
            skipped += 1;
            continue;
        }
        planned.push(PlannedEntry {
            archive_entry: entry.clone(),
            target_relative: normalized,
            target_relative_lower: lower,
        });
    }

    let contents = reader.read_all_files()?;

    let mut extracted_paths = Vec::new();
    let mut overwritten = 0usize;
    let mut reclaimed_owners: HashMap<i64, Vec<String>> = HashMap::new();

    for entry in &planned {
        let Some(data) = contents.get(&entry.archive_entry) else {
            tracing::warn!("batch read missed entry: {}", entry.archive_entry);
            skipped += 1;
            continue;
        };
        let target = game.resolve(&entry.target_relative);
        if target.exists() {
            overwritten += 1;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, data).with_context(|| format!("failed to write {}", target.display()))?;
        extracted_paths.push(entry.target_relative.clone());

        if let Some(&prev_mod_id) = ownership.get(&entry.target_relative_lower) {
            reclaimed_owners.entry(prev_mod_id).or_default().push(entry.target_relative.clone());
        }
    }

    for (prev_mod_id, paths) in &reclaimed_owners {
        for path in paths {
            db.delete_installed_mod_file_by_path(*prev_mod_id, path)?;
        }
    }

    let installed_mod_id = db.insert_installed_mod(&InstalledModRecord {
        id: None,
        game_id: game.id.clone(),
        name: parsed.name.clone(),
        source_archive: Some(filename.to_string()),
        disabled: false,
        installed_version: parsed.version.clone(),
        nexus_mod_id: parsed.nexus_mod_id,
        nexus_file_id: None,
        upload_timestamp: parsed.upload_timestamp,
        mod_group_id: None,
        installed_at: chrono::Utc::now().to_rfc3339(),
    })?;

    if let Some(nexus_mod_id) = parsed.nexus_mod_id {
        enrich_from_prior_downloads(db, &game.id, installed_mod_id, nexus_mod_id)?;
    }

    for relative_path in &extracted_paths {
        db.insert_installed_mod_file(&InstalledModFileRecord {
            id: None,
            installed_mod_id,
            relative_path: relative_path.clone(),
            disabled: false,
        })?;
    }

    index_installed_archives(db, game, installed_mod_id, &extracted_paths)?;

    tracing::info!(
        "installed '{}' ({} files, {} overwritten)",
        parsed.name,
        extracted_paths.len(),
        overwritten
    );

    Ok(InstallResult {
        installed_mod_id,
        name: parsed.name,
        files_extracted: extracted_paths.len(),
        files_skipped: skipped,
        files_overwritten: overwritten,
    })
}

/// Opportunistically enrich a newly-installed mod's `nexus_file_id` from a
/// prior catalog download, and `mod_group_id` from the strongest existing
/// correlation, when the correlating data already exists locally.
fn enrich_from_prior_downloads(
    db: &Database,
    game_id: &str,
    installed_mod_id: i64,
    nexus_mod_id: i64,
) -> Result<()> {
    let file_id = db
        .get_nexus_downloads(game_id)?
        .into_iter()
        .find(|d| d.nexus_mod_id == nexus_mod_id && d.file_id.is_some())
        .and_then(|d| d.file_id);
    if let Some(file_id) = file_id {
        db.set_installed_mod_file_ids(installed_mod_id, Some(nexus_mod_id), Some(file_id))?;
    }

    let best_correlation = db
        .get_correlations_for_game(game_id)?
        .into_iter()
        .filter(|c| c.nexus_mod_id == nexus_mod_id)
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(correlation) = best_correlation {
        db.set_installed_mod_group(installed_mod_id, Some(correlation.mod_group_id))?;
    }

    Ok(())
}

/// Parse every `.archive` extracted by an install and index its
/// `(resource_hash, sha1)` pairs for collision detection (spec §4.8).
fn index_installed_archives(
    db: &Database,
    game: &Game,
    installed_mod_id: i64,
    extracted_paths: &[String],
) -> Result<()> {
    for relative_path in extracted_paths {
        if !relative_path.to_ascii_lowercase().ends_with(".archive") {
            continue;
        }
        let full_path = game.resolve(relative_path);
        let data = std::fs::read(&full_path)
            .with_context(|| format!("failed to read extracted archive {}", full_path.display()))?;
        let parsed = parse_red_archive(&data)
            .with_context(|| format!("failed to parse RED archive {}", full_path.display()))?;
        let hash_entries: Vec<(i64, String)> =
            parsed.entries.iter().map(|e| (e.resource_hash as i64, e.sha1_hex())).collect();
        let archive_filename =
            Path::new(relative_path).file_name().and_then(|n| n.to_str()).unwrap_or(relative_path);
        db.replace_archive_entry_index(&game.id, Some(installed_mod_id), archive_filename, &hash_entries)?;
    }
    Ok(())
}

fn disabled_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".disabled");
    PathBuf::from(name)
}

/// Remove empty parent directories of `file_path` up to (but not including)
/// `root`. Returns the number of directories removed.
fn remove_empty_parents(file_path: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut parent = file_path.parent();
    while let Some(dir) = parent {
        if dir == root {
            break;
        }
        let is_empty = std::fs::read_dir(dir).map(|mut it| it.next().is_none()).unwrap_or(false);
        if !is_empty || std::fs::remove_dir(dir).is_err() {
            break;
        }
        removed += 1;
        parent = dir.parent();
    }
    removed
}

/// Delete every path owned by `installed_mod_id` (or its `.disabled`
/// sibling), remove now-empty directories, and drop the DB record.
pub fn uninstall(db: &Database, game: &Game, installed_mod_id: i64) -> Result<UninstallResult> {
    let files = db.get_installed_mod_files(installed_mod_id)?;
    let mut deleted = 0usize;
    let mut directories_removed = 0usize;

    for f in &files {
        let path = game.resolve(&f.relative_path);
        if path.exists() {
            if std::fs::remove_file(&path).is_ok() {
                deleted += 1;
                directories_removed += remove_empty_parents(&path, &game.install_path);
            } else {
                tracing::warn!("could not delete {}", path.display());
            }
            continue;
        }
        let disabled_path = disabled_sibling(&path);
        if disabled_path.exists() {
            if std::fs::remove_file(&disabled_path).is_ok() {
                deleted += 1;
                directories_removed += remove_empty_parents(&disabled_path, &game.install_path);
            } else {
                tracing::warn!("could not delete {}", disabled_path.display());
            }
        }
    }

    db.delete_archive_entry_index_for_mod(installed_mod_id)?;
    db.delete_installed_mod(installed_mod_id)?;

    tracing::info!("uninstalled mod id {installed_mod_id} ({deleted} files deleted)");
    Ok(UninstallResult { files_deleted: deleted, directories_removed })
}

/// Rename every path owned by `installed_mod_id` to/from its `.disabled`
/// sibling. Never moves bytes; never destructive.
pub fn toggle(db: &Database, game: &Game, installed_mod_id: i64) -> Result<ToggleResult> {
    let installed = db
        .get_installed_mod_by_id(installed_mod_id)?
        .with_context(|| format!("no installed mod with id {installed_mod_id}"))?;
    let should_disable = !installed.disabled;
    let files = db.get_installed_mod_files(installed_mod_id)?;
    let mut files_affected = 0usize;

    for f in &files {
        let path = game.resolve(&f.relative_path);
        let disabled_path = disabled_sibling(&path);
        if should_disable {
            if path.exists() {
                match std::fs::rename(&path, &disabled_path) {
                    Ok(()) => files_affected += 1,
                    Err(e) => tracing::warn!("could not disable {}: {e}", path.display()),
                }
            }
        } else if disabled_path.exists() {
            match std::fs::rename(&disabled_path, &path) {
                Ok(()) => files_affected += 1,
                Err(e) => tracing::warn!("could not enable {}: {e}", disabled_path.display()),
            }
        }
    }

    db.set_installed_mod_disabled(installed_mod_id, should_disable)?;

    let action = if should_disable { "disabled" } else { "enabled" };
    tracing::info!("{action} mod id {installed_mod_id} ({files_affected} files)");
    Ok(ToggleResult { disabled: should_disable, files_affected })
}

/// Delete staged archives referenced by neither an InstalledMod nor a
/// recorded catalog download.
pub fn delete_orphaned_archives(db: &Database, game: &Game) -> Result<OrphanCleanupResult> {
    let staging = game.staging_dir();
    if !staging.is_dir() {
        return Ok(OrphanCleanupResult::default());
    }

    let all_files: HashSet<String> = std::fs::read_dir(&staging)
        .with_context(|| format!("failed to read {}", staging.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_archive_extension(p))
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    if all_files.is_empty() {
        return Ok(OrphanCleanupResult::default());
    }

    let mut referenced: HashSet<String> =
        db.get_installed_mods(&game.id)?.into_iter().filter_map(|m| m.source_archive).collect();
    referenced.extend(db.get_nexus_downloads(&game.id)?.into_iter().filter_map(|d| d.file_name));

    let mut orphans: Vec<&String> = all_files.difference(&referenced).collect();
    orphans.sort();

    let mut deleted_files = Vec::new();
    let mut freed_bytes: u64 = 0;
    for filename in orphans {
        let path = staging.join(filename);
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::warn!("failed to stat orphan archive {}: {e}", path.display());
                continue;
            }
        };
        if std::fs::remove_file(&path).is_ok() {
            freed_bytes += size;
            deleted_files.push(filename.clone());
        } else {
            tracing::warn!("failed to delete orphan archive {}", path.display());
        }
    }

    if !deleted_files.is_empty() {
        tracing::info!("cleaned {} orphan archives, freed {} bytes", deleted_files.len(), freed_bytes);
    }

    Ok(OrphanCleanupResult {
        deleted_count: deleted_files.len(),
        freed_bytes,
        deleted_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GameRecord;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn setup_game(tmp: &tempfile::TempDir) -> (Database, Game) {
        let install_path = tmp.path().join("cp77");
        std::fs::create_dir_all(install_path.join("downloaded_mods")).unwrap();

        let db = Database::open_in_memory().unwrap();
        let record = GameRecord {
            id: "cp".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: install_path.to_string_lossy().to_string(),
            mod_paths_json: serde_json::to_string(&vec!["r6/scripts".to_string(), "archive/pc/mod".to_string()])
                .unwrap(),
        };
        db.upsert_game(&record).unwrap();
        let game = Game::from_record(&record).unwrap();
        (db, game)
    }

    fn write_test_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> = FileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn installs_a_plain_archive_and_tracks_ownership() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("CoolMod-123-1-0-1700000000.zip");
        write_test_zip(&archive_path, &[("r6/scripts/coolmod/init.reds", b"// init")]);

        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();
        assert_eq!(result.name, "CoolMod");
        assert_eq!(result.files_extracted, 1);
        assert_eq!(result.files_overwritten, 0);

        let extracted = game.resolve("r6/scripts/coolmod/init.reds");
        assert!(extracted.exists());

        let files = db.get_installed_mod_files(result.installed_mod_id).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "r6/scripts/coolmod/init.reds");
    }

    #[test]
    fn rejects_fomod_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("WizardMod.zip");
        write_test_zip(&archive_path, &[("fomod/ModuleConfig.xml", b"<config/>")]);

        let err = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("FOMOD"));
    }

    #[test]
    fn overwrite_transfers_ownership_from_prior_mod() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);

        let first = tmp.path().join("First-1-1-0-1700000000.zip");
        write_test_zip(&first, &[("r6/scripts/shared.reds", b"old")]);
        let first_result = install(&db, &game, &first, &[], &HashMap::new()).unwrap();

        let second = tmp.path().join("Second-2-1-0-1700000001.zip");
        write_test_zip(&second, &[("r6/scripts/shared.reds", b"new")]);
        let second_result = install(&db, &game, &second, &[], &HashMap::new()).unwrap();
        assert_eq!(second_result.files_overwritten, 1);

        assert!(db.get_installed_mod_files(first_result.installed_mod_id).unwrap().is_empty());
        assert_eq!(db.get_installed_mod_files(second_result.installed_mod_id).unwrap().len(), 1);

        let content = std::fs::read_to_string(game.resolve("r6/scripts/shared.reds")).unwrap();
        assert_eq!(content, "new");
    }

    #[test]
    fn path_traversal_entries_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("Sneaky-7-1-0-1700000002.zip");
        write_test_zip(
            &archive_path,
            &[("../../etc/passwd", b"nope"), ("r6/scripts/safe.reds", b"fine")],
        );

        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();
        assert_eq!(result.files_extracted, 1);
        assert_eq!(result.files_skipped, 1);
    }

    #[test]
    fn wrapped_layout_strips_the_wrapper_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("Wrapped-9-1-0-1700000003.zip");
        write_test_zip(&archive_path, &[("MyModFolder/r6/scripts/a.reds", b"x")]);

        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();
        assert!(game.resolve("r6/scripts/a.reds").exists());
        assert_eq!(result.files_extracted, 1);
    }

    #[test]
    fn indexes_extracted_archive_files_for_conflict_detection() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);

        let mut archive_bytes = Vec::new();
        archive_bytes.extend_from_slice(&0x5244_4152u32.to_le_bytes());
        archive_bytes.extend_from_slice(&1u32.to_le_bytes());
        archive_bytes.extend_from_slice(&40u64.to_le_bytes());
        archive_bytes.extend_from_slice(&40u64.to_le_bytes());
        archive_bytes.extend_from_slice(&0u64.to_le_bytes());
        archive_bytes.extend_from_slice(&80u64.to_le_bytes());
        archive_bytes.extend_from_slice(&7u64.to_le_bytes());
        archive_bytes.extend_from_slice(&[9u8; 20]);
        archive_bytes.extend_from_slice(&[0u8; 12]);

        let archive_path = tmp.path().join("Archived-11-1-0-1700000004.zip");
        write_test_zip(&archive_path, &[("archive/pc/mod/cool.archive", &archive_bytes)]);

        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();
        let index = db.get_archive_entry_index("cp").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].installed_mod_id, Some(result.installed_mod_id));
        assert_eq!(index[0].source_archive, "cool.archive");
    }

    #[test]
    fn uninstall_deletes_owned_files_and_empty_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("ToRemove-13-1-0-1700000005.zip");
        write_test_zip(&archive_path, &[("r6/scripts/toremove/a.reds", b"x")]);
        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();

        let outcome = uninstall(&db, &game, result.installed_mod_id).unwrap();
        assert_eq!(outcome.files_deleted, 1);
        assert!(!game.resolve("r6/scripts/toremove/a.reds").exists());
        assert!(!game.resolve("r6/scripts/toremove").exists());
        assert!(db.get_installed_mod_by_id(result.installed_mod_id).unwrap().is_none());
    }

    #[test]
    fn toggle_renames_files_to_and_from_disabled_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let archive_path = tmp.path().join("Toggled-17-1-0-1700000006.zip");
        write_test_zip(&archive_path, &[("r6/scripts/toggled.reds", b"x")]);
        let result = install(&db, &game, &archive_path, &[], &HashMap::new()).unwrap();

        let disabled = toggle(&db, &game, result.installed_mod_id).unwrap();
        assert!(disabled.disabled);
        assert!(game.resolve("r6/scripts/toggled.reds.disabled").exists());
        assert!(!game.resolve("r6/scripts/toggled.reds").exists());

        let enabled = toggle(&db, &game, result.installed_mod_id).unwrap();
        assert!(!enabled.disabled);
        assert!(game.resolve("r6/scripts/toggled.reds").exists());
    }

    #[test]
    fn delete_orphaned_archives_keeps_archives_referenced_by_installed_mods() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup_game(&tmp);
        let kept = tmp.path().join("Kept-19-1-0-1700000007.zip");
        write_test_zip(&kept, &[("r6/scripts/kept.reds", b"x")]);
        install(&db, &game, &kept, &[], &HashMap::new()).unwrap();

        let orphan = game.staging_dir().join("orphan.zip");
        write_test_zip(&orphan, &[("unused", b"y")]);

        let result = delete_orphaned_archives(&db, &game).unwrap();
        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.deleted_files, vec!["orphan.zip".to_string()]);
        assert!(!orphan.exists());
    }
}
