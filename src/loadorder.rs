//! Load-order planning for `archive/pc/mod/` (spec §4.11).
//!
//! The RED engine loads `.archive` files in ASCII filename order unless a
//! `modlist.txt` is present in that directory, in which case its explicit
//! order wins. This module turns "prefer mod A over mod B" preferences into
//! that file without renaming anything on disk.

use crate::db::{Database, LoadOrderPreferenceRecord};
use crate::game::{normalize_separators, Game};
use anyhow::{Context, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

const ARCHIVE_DIR: &str = "archive/pc/mod";
const MODLIST_FILENAME: &str = "modlist.txt";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Managed(i64),
    Unmanaged(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModlistGroupEntry {
    pub position: usize,
    pub mod_id: Option<i64>,
    pub mod_name: String,
    pub archive_filenames: Vec<String>,
    pub is_unmanaged: bool,
    pub has_user_preference: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceEntry {
    pub winner_mod_id: i64,
    pub winner_mod_name: String,
    pub loser_mod_id: i64,
    pub loser_mod_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModlistView {
    pub groups: Vec<ModlistGroupEntry>,
    pub preferences: Vec<PreferenceEntry>,
    pub total_archives: usize,
    pub modlist_active: bool,
}

fn scan_archive_files(game: &Game) -> Result<Vec<String>> {
    let dir = game.archive_mod_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<String> = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("archive"))
                    .unwrap_or(false)
        })
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    files.sort_by_key(|f| f.to_ascii_lowercase());
    Ok(files)
}

/// `{lowercased archive filename -> owning installed_mod_id}`, considering
/// only enabled mods and enabled files.
fn build_file_to_mod_map(db: &Database, game_id: &str) -> Result<HashMap<String, i64>> {
    let mut map = HashMap::new();
    let prefix = format!("{ARCHIVE_DIR}/");
    for m in db.get_installed_mods(game_id)? {
        if m.disabled {
            continue;
        }
        let Some(mod_id) = m.id else { continue };
        for f in db.get_installed_mod_files(mod_id)? {
            if f.disabled {
                continue;
            }
            let lower = normalize_separators(&f.relative_path).to_ascii_lowercase();
            if lower.starts_with(&prefix) && lower.ends_with(".archive") {
                if let Some(filename) = lower.rsplit('/').next() {
                    map.insert(filename.to_string(), mod_id);
                }
            }
        }
    }
    Ok(map)
}

/// Group disk archives by owning mod (or as their own unmanaged group), sort
/// groups by default filename order, then apply preference edges via Kahn's
/// topological sort with a min-heap tie-break so ties preserve ASCII order.
fn compute_ordered_groups(
    db: &Database,
    game: &Game,
) -> Result<(Vec<(GroupKey, Vec<String>)>, Vec<LoadOrderPreferenceRecord>)> {
    let disk_files = scan_archive_files(game)?;
    if disk_files.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let file_mod_map = build_file_to_mod_map(db, &game.id)?;

    let mut groups: HashMap<GroupKey, Vec<String>> = HashMap::new();
    for filename in &disk_files {
        let key = match file_mod_map.get(&filename.to_ascii_lowercase()) {
            Some(&mod_id) => GroupKey::Managed(mod_id),
            None => GroupKey::Unmanaged(filename.clone()),
        };
        groups.entry(key).or_default().push(filename.clone());
    }
    for files in groups.values_mut() {
        files.sort_by_key(|f| f.to_ascii_lowercase());
    }

    let mut sort_key: HashMap<GroupKey, String> = HashMap::new();
    for (key, files) in &groups {
        sort_key.insert(key.clone(), files[0].to_ascii_lowercase());
    }
    let mut sorted_keys: Vec<GroupKey> = groups.keys().cloned().collect();
    sorted_keys.sort_by(|a, b| sort_key[a].cmp(&sort_key[b]));

    let key_to_idx: HashMap<GroupKey, usize> =
        sorted_keys.iter().cloned().enumerate().map(|(i, k)| (k, i)).collect();
    let n = sorted_keys.len();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_degree = vec![0usize; n];

    let preferences = db.get_load_order_preferences(&game.id)?;
    for pref in &preferences {
        let winner_idx = key_to_idx.get(&GroupKey::Managed(pref.winner_mod_id));
        let loser_idx = key_to_idx.get(&GroupKey::Managed(pref.loser_mod_id));
        let (Some(&w), Some(&l)) = (winner_idx, loser_idx) else { continue };
        if w == l {
            continue;
        }
        adjacency[w].push(l);
        in_degree[l] += 1;
    }

    let mut heap: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
    let mut topo_order = Vec::with_capacity(n);
    while let Some(Reverse(node)) = heap.pop() {
        topo_order.push(node);
        for &neighbor in &adjacency[node] {
            in_degree[neighbor] -= 1;
            if in_degree[neighbor] == 0 {
                heap.push(Reverse(neighbor));
            }
        }
    }
    if topo_order.len() < n {
        let seen: HashSet<usize> = topo_order.iter().copied().collect();
        let mut remaining: Vec<usize> = (0..n).filter(|i| !seen.contains(i)).collect();
        remaining.sort_unstable();
        tracing::warn!(
            "cycle detected in load-order preferences for '{}'; {} group(s) appended in default order",
            game.id,
            remaining.len()
        );
        topo_order.extend(remaining);
    }

    let ordered = topo_order
        .into_iter()
        .map(|idx| {
            let key = sorted_keys[idx].clone();
            let files = groups[&key].clone();
            (key, files)
        })
        .collect();

    Ok((ordered, preferences))
}

/// Flat, ordered list of archive filenames respecting user preferences.
pub fn generate_modlist(db: &Database, game: &Game) -> Result<Vec<String>> {
    let (ordered, _) = compute_ordered_groups(db, game)?;
    Ok(ordered.into_iter().flat_map(|(_, files)| files).collect())
}

/// Write (or remove, if empty) `modlist.txt` in `archive/pc/mod/`. Returns
/// the number of entries written.
pub fn write_modlist(db: &Database, game: &Game) -> Result<usize> {
    let ordered = generate_modlist(db, game)?;
    let dir = game.archive_mod_dir();
    let modlist_path = dir.join(MODLIST_FILENAME);

    if ordered.is_empty() {
        if modlist_path.exists() {
            std::fs::remove_file(&modlist_path)?;
        }
        return Ok(0);
    }

    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut content = ordered.join("\n");
    content.push('\n');
    std::fs::write(&modlist_path, content)
        .with_context(|| format!("failed to write {}", modlist_path.display()))?;
    tracing::info!("wrote {} with {} entries", modlist_path.display(), ordered.len());
    Ok(ordered.len())
}

/// Record `winner > loser` for each loser, skipping self-preferences and
/// edges that already exist, then regenerate `modlist.txt`.
pub fn add_preferences(
    db: &Database,
    game: &Game,
    winner_mod_id: i64,
    loser_mod_ids: &[i64],
) -> Result<usize> {
    let existing = db.get_load_order_preferences(&game.id)?;
    let mut added = 0;
    for &loser_mod_id in loser_mod_ids {
        if loser_mod_id == winner_mod_id {
            continue;
        }
        let already_present = existing
            .iter()
            .any(|p| p.winner_mod_id == winner_mod_id && p.loser_mod_id == loser_mod_id);
        if already_present {
            continue;
        }
        db.set_load_order_preference(&game.id, winner_mod_id, loser_mod_id)?;
        added += 1;
    }
    write_modlist(db, game)?;
    tracing::info!("added {added} preference(s) for '{}'", game.id);
    Ok(added)
}

/// Remove a single preference edge and regenerate `modlist.txt`.
pub fn remove_preference(db: &Database, game: &Game, winner_mod_id: i64, loser_mod_id: i64) -> Result<bool> {
    let removed = db.delete_load_order_preference(&game.id, winner_mod_id, loser_mod_id)?;
    if removed {
        write_modlist(db, game)?;
    }
    Ok(removed)
}

/// Delete every preference for this game and regenerate `modlist.txt`.
pub fn remove_all_preferences(db: &Database, game: &Game) -> Result<usize> {
    let count = db.get_load_order_preferences(&game.id)?.len();
    db.clear_load_order_preferences(&game.id)?;
    write_modlist(db, game)?;
    tracing::info!("removed all {count} preference(s) for '{}'", game.id);
    Ok(count)
}

/// Build the modlist view: ordered groups, preferences, and whether
/// `modlist.txt` is currently active.
pub fn get_modlist_view(db: &Database, game: &Game) -> Result<ModlistView> {
    let (ordered, preferences) = compute_ordered_groups(db, game)?;

    let mod_ids: Vec<i64> = ordered
        .iter()
        .filter_map(|(key, _)| match key {
            GroupKey::Managed(id) => Some(*id),
            GroupKey::Unmanaged(_) => None,
        })
        .collect();
    let mut names: HashMap<i64, String> = HashMap::new();
    if !mod_ids.is_empty() {
        for m in db.get_installed_mods(&game.id)? {
            if let Some(id) = m.id {
                if mod_ids.contains(&id) {
                    names.insert(id, m.name);
                }
            }
        }
    }

    let mut pref_mod_ids: HashSet<i64> = HashSet::new();
    for pref in &preferences {
        pref_mod_ids.insert(pref.winner_mod_id);
        pref_mod_ids.insert(pref.loser_mod_id);
    }

    let mut total_archives = 0;
    let groups = ordered
        .into_iter()
        .enumerate()
        .map(|(i, (key, files))| {
            total_archives += files.len();
            let (mod_id, mod_name, is_unmanaged) = match key {
                GroupKey::Managed(id) => {
                    (Some(id), names.get(&id).cloned().unwrap_or_else(|| format!("Mod #{id}")), false)
                }
                GroupKey::Unmanaged(_) => (None, "Unmanaged".to_string(), true),
            };
            ModlistGroupEntry {
                position: i + 1,
                mod_id,
                mod_name,
                archive_filenames: files,
                is_unmanaged,
                has_user_preference: mod_id.map(|id| pref_mod_ids.contains(&id)).unwrap_or(false),
            }
        })
        .collect();

    let pref_entries = preferences
        .iter()
        .map(|p| PreferenceEntry {
            winner_mod_id: p.winner_mod_id,
            winner_mod_name: names
                .get(&p.winner_mod_id)
                .cloned()
                .unwrap_or_else(|| format!("Mod #{}", p.winner_mod_id)),
            loser_mod_id: p.loser_mod_id,
            loser_mod_name: names
                .get(&p.loser_mod_id)
                .cloned()
                .unwrap_or_else(|| format!("Mod #{}", p.loser_mod_id)),
        })
        .collect();

    Ok(ModlistView {
        groups,
        preferences: pref_entries,
        total_archives,
        modlist_active: game.archive_mod_dir().join(MODLIST_FILENAME).is_file(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GameRecord, InstalledModFileRecord, InstalledModRecord};

    fn setup(tmp: &tempfile::TempDir, archives: &[&str]) -> (Database, Game) {
        let install_path = tmp.path().join("cp77");
        let mod_dir = install_path.join(ARCHIVE_DIR);
        std::fs::create_dir_all(&mod_dir).unwrap();
        for name in archives {
            std::fs::write(mod_dir.join(name), b"x").unwrap();
        }

        let db = Database::open_in_memory().unwrap();
        let record = GameRecord {
            id: "cp".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: install_path.to_string_lossy().to_string(),
            mod_paths_json: serde_json::to_string(&vec!["archive/pc/mod".to_string()]).unwrap(),
        };
        db.upsert_game(&record).unwrap();
        (db, Game::from_record(&record).unwrap())
    }

    fn install_mod(db: &Database, name: &str, files: &[&str]) -> i64 {
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
                installed_at: "2026-01-01T00:00:00Z".to_string(),
            })
            .unwrap();
        for f in files {
            db.insert_installed_mod_file(&InstalledModFileRecord {
                id: None,
                installed_mod_id: id,
                relative_path: f.to_string(),
                disabled: false,
            })
            .unwrap();
        }
        id
    }

    #[test]
    fn default_order_is_ascii_by_lowest_filename_per_group() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup(&tmp, &["b.archive", "a.archive", "c.archive"]);
        let list = generate_modlist(&db, &game).unwrap();
        assert_eq!(list, vec!["a.archive", "b.archive", "c.archive"]);
    }

    #[test]
    fn preference_reorders_groups_before_default_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup(&tmp, &["alpha.archive", "zulu.archive"]);
        let alpha_mod = install_mod(&db, "Alpha", &["archive/pc/mod/alpha.archive"]);
        let zulu_mod = install_mod(&db, "Zulu", &["archive/pc/mod/zulu.archive"]);

        let added = add_preferences(&db, &game, zulu_mod, &[alpha_mod]).unwrap();
        assert_eq!(added, 1);

        let list = generate_modlist(&db, &game).unwrap();
        assert_eq!(list, vec!["zulu.archive".to_string(), "alpha.archive".to_string()]);

        let modlist_path = game.archive_mod_dir().join(MODLIST_FILENAME);
        assert!(modlist_path.exists());
        let contents = std::fs::read_to_string(modlist_path).unwrap();
        assert_eq!(contents, "zulu.archive\nalpha.archive\n");
    }

    #[test]
    fn unmanaged_archives_are_each_their_own_group() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup(&tmp, &["vanilla_a.archive", "vanilla_b.archive"]);
        let view = get_modlist_view(&db, &game).unwrap();
        assert_eq!(view.groups.len(), 2);
        assert!(view.groups.iter().all(|g| g.is_unmanaged));
    }

    #[test]
    fn remove_preference_falls_back_to_default_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup(&tmp, &["alpha.archive", "zulu.archive"]);
        let alpha_mod = install_mod(&db, "Alpha", &["archive/pc/mod/alpha.archive"]);
        let zulu_mod = install_mod(&db, "Zulu", &["archive/pc/mod/zulu.archive"]);
        add_preferences(&db, &game, zulu_mod, &[alpha_mod]).unwrap();

        let removed = remove_preference(&db, &game, zulu_mod, alpha_mod).unwrap();
        assert!(removed);
        let list = generate_modlist(&db, &game).unwrap();
        assert_eq!(list, vec!["alpha.archive".to_string(), "zulu.archive".to_string()]);
    }

    #[test]
    fn cycle_falls_back_to_default_order_for_affected_groups() {
        let tmp = tempfile::tempdir().unwrap();
        let (db, game) = setup(&tmp, &["alpha.archive", "bravo.archive", "charlie.archive"]);
        let alpha_mod = install_mod(&db, "Alpha", &["archive/pc/mod/alpha.archive"]);
        let bravo_mod = install_mod(&db, "Bravo", &["archive/pc/mod/bravo.archive"]);
        let charlie_mod = install_mod(&db, "Charlie", &["archive/pc/mod/charlie.archive"]);

        db.set_load_order_preference("cp", alpha_mod, bravo_mod).unwrap();
        db.set_load_order_preference("cp", bravo_mod, charlie_mod).unwrap();
        db.set_load_order_preference("cp", charlie_mod, alpha_mod).unwrap();

        let list = generate_modlist(&db, &game).unwrap();
        assert_eq!(list.len(), 3);
    }
}
