//! Profile service (spec §4.13): named snapshots of each InstalledMod's
//! enabled/disabled state, loadable, exportable, comparable.

use crate::db::{Database, InstalledModRecord, ProfileEntryRecord, ProfileRecord};
use crate::game::Game;
use crate::mods;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One mod's entry in a profile export (spec §6 profile export format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileExportEntry {
    pub name: String,
    pub nexus_mod_id: Option<i64>,
    pub version: String,
    pub source_archive: Option<String>,
}

/// Stable, shareable profile export payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileExport {
    pub profile_name: String,
    pub game_name: String,
    pub exported_at: String,
    pub mod_count: usize,
    pub mods: Vec<ProfileExportEntry>,
}

/// Installed-mod-id sets describing how two profiles' entries differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDiff {
    /// In `b` but not `a`.
    pub added: Vec<i64>,
    /// In `a` but not `b`.
    pub removed: Vec<i64>,
    /// In both, with a different `enabled` state.
    pub state_changed: Vec<i64>,
}

/// Outcome of loading a profile: how many mods were toggled to match it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub mods_toggled: usize,
}

/// Snapshot every InstalledMod's `disabled` state for `game` into a new
/// profile named `name`.
pub fn create(db: &Database, game: &Game, name: &str) -> Result<ProfileRecord> {
    if db.get_profile(&game.id, name)?.is_some() {
        bail!("profile '{name}' already exists for game '{}'", game.id);
    }

    let record = ProfileRecord {
        id: None,
        game_id: game.id.clone(),
        name: name.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let id = db.insert_profile(&record)?;

    let installed = db.get_installed_mods(&game.id)?;
    let entries: Vec<(i64, bool)> =
        installed.iter().filter_map(|m| m.id.map(|id| (id, !m.disabled))).collect();
    db.replace_profile_entries(id, &entries)?;

    Ok(ProfileRecord { id: Some(id), ..record })
}

/// Toggle every InstalledMod to match `profile`'s snapshot, via [`mods::toggle`].
/// Mods absent from the snapshot are left untouched.
pub fn load(db: &Database, game: &Game, profile: &ProfileRecord) -> Result<LoadResult> {
    let profile_id = profile.id.context("profile has no id")?;
    let entries = db.get_profile_entries(profile_id)?;
    let mut mods_toggled = 0usize;

    for entry in entries {
        let Some(installed) = db.get_installed_mod_by_id(entry.installed_mod_id)? else { continue };
        let currently_enabled = !installed.disabled;
        if currently_enabled != entry.enabled {
            mods::toggle(db, game, entry.installed_mod_id)?;
            mods_toggled += 1;
        }
    }

    Ok(LoadResult { mods_toggled })
}

/// Build the stable export payload for `profile` (spec §6).
pub fn export(db: &Database, game: &Game, profile: &ProfileRecord) -> Result<ProfileExport> {
    let profile_id = profile.id.context("profile has no id")?;
    let entries = db.get_profile_entries(profile_id)?;
    let installed_by_id: HashMap<i64, InstalledModRecord> = db
        .get_installed_mods(&game.id)?
        .into_iter()
        .filter_map(|m| m.id.map(|id| (id, m)))
        .collect();

    let mods: Vec<ProfileExportEntry> = entries
        .iter()
        .filter(|e| e.enabled)
        .filter_map(|e| installed_by_id.get(&e.installed_mod_id))
        .map(|m| ProfileExportEntry {
            name: m.name.clone(),
            nexus_mod_id: m.nexus_mod_id,
            version: m.installed_version.clone().unwrap_or_default(),
            source_archive: m.source_archive.clone(),
        })
        .collect();

    Ok(ProfileExport {
        profile_name: profile.name.clone(),
        game_name: game.name.clone(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        mod_count: mods.len(),
        mods,
    })
}

/// Import a profile export, matching each entry to an InstalledMod by name
/// first, then by `nexus_mod_id`. Unmatched entries are silently skipped.
/// A name collision with an existing profile gets a numeric suffix.
pub fn import(db: &Database, game: &Game, payload: &ProfileExport) -> Result<ProfileRecord> {
    let mut name = payload.profile_name.clone();
    if db.get_profile(&game.id, &name)?.is_some() {
        let base = name.clone();
        let mut i = 1;
        loop {
            name = format!("{base} ({i})");
            if db.get_profile(&game.id, &name)?.is_none() {
                break;
            }
            i += 1;
        }
    }

    let record = ProfileRecord {
        id: None,
        game_id: game.id.clone(),
        name,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let id = db.insert_profile(&record)?;

    let installed = db.get_installed_mods(&game.id)?;
    let by_name: HashMap<&str, &InstalledModRecord> =
        installed.iter().map(|m| (m.name.as_str(), m)).collect();
    let by_nexus_id: HashMap<i64, &InstalledModRecord> =
        installed.iter().filter_map(|m| m.nexus_mod_id.map(|nid| (nid, m))).collect();

    let mut entries = Vec::new();
    for mod_entry in &payload.mods {
        let matched = by_name.get(mod_entry.name.as_str()).copied().or_else(|| {
            mod_entry.nexus_mod_id.and_then(|nid| by_nexus_id.get(&nid).copied())
        });
        if let Some(m) = matched {
            if let Some(mid) = m.id {
                entries.push((mid, true));
            }
        }
    }
    db.replace_profile_entries(id, &entries)?;

    Ok(ProfileRecord { id: Some(id), ..record })
}

/// Diff two profiles' entries by installed mod id.
pub fn compare(db: &Database, a: &ProfileRecord, b: &ProfileRecord) -> Result<ProfileDiff> {
    let a_id = a.id.context("profile has no id")?;
    let b_id = b.id.context("profile has no id")?;

    let a_entries: HashMap<i64, bool> =
        db.get_profile_entries(a_id)?.into_iter().map(|e| (e.installed_mod_id, e.enabled)).collect();
    let b_entries: HashMap<i64, bool> =
        db.get_profile_entries(b_id)?.into_iter().map(|e| (e.installed_mod_id, e.enabled)).collect();

    let a_ids: HashSet<i64> = a_entries.keys().copied().collect();
    let b_ids: HashSet<i64> = b_entries.keys().copied().collect();

    let mut added: Vec<i64> = b_ids.difference(&a_ids).copied().collect();
    let mut removed: Vec<i64> = a_ids.difference(&b_ids).copied().collect();
    let mut state_changed: Vec<i64> = a_ids
        .intersection(&b_ids)
        .copied()
        .filter(|id| a_entries.get(id) != b_entries.get(id))
        .collect();

    added.sort_unstable();
    removed.sort_unstable();
    state_changed.sort_unstable();

    Ok(ProfileDiff { added, removed, state_changed })
}

/// Clone `profile`'s entries into a new profile named `new_name`.
pub fn duplicate(db: &Database, profile: &ProfileRecord, new_name: &str) -> Result<ProfileRecord> {
    if db.get_profile(&profile.game_id, new_name)?.is_some() {
        bail!("profile '{new_name}' already exists for game '{}'", profile.game_id);
    }
    let profile_id = profile.id.context("profile has no id")?;

    let record = ProfileRecord {
        id: None,
        game_id: profile.game_id.clone(),
        name: new_name.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    let new_id = db.insert_profile(&record)?;

    let entries: Vec<(i64, bool)> = db
        .get_profile_entries(profile_id)?
        .into_iter()
        .map(|e: ProfileEntryRecord| (e.installed_mod_id, e.enabled))
        .collect();
    db.replace_profile_entries(new_id, &entries)?;

    Ok(ProfileRecord { id: Some(new_id), ..record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GameRecord;

    fn setup() -> (Database, Game) {
        let db = Database::open_in_memory().unwrap();
        db.upsert_game(&GameRecord {
            id: "cp".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: "/games/cp77".to_string(),
            mod_paths_json: "[]".to_string(),
        })
        .unwrap();
        let game = Game::cyberpunk2077("/games/cp77");
        (db, game)
    }

    fn install(db: &Database, game: &Game, name: &str, nexus_mod_id: Option<i64>, disabled: bool) -> i64 {
        let id = db
            .insert_installed_mod(&InstalledModRecord {
                id: None,
                game_id: game.id.clone(),
                name: name.to_string(),
                source_archive: Some(format!("{name}.zip")),
                disabled,
                installed_version: Some("1.0.0".to_string()),
                nexus_mod_id,
                nexus_file_id: None,
                upload_timestamp: None,
                mod_group_id: None,
                installed_at: chrono::Utc::now().to_rfc3339(),
            })
            .unwrap();
        if disabled {
            db.set_installed_mod_disabled(id, true).unwrap();
        }
        id
    }

    #[test]
    fn create_snapshots_current_enabled_state() {
        let (db, game) = setup();
        let a = install(&db, &game, "Mod A", Some(1), false);
        let _b = install(&db, &game, "Mod B", Some(2), true);

        let profile = create(&db, &game, "default").unwrap();
        let entries = db.get_profile_entries(profile.id.unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        let a_entry = entries.iter().find(|e| e.installed_mod_id == a).unwrap();
        assert!(a_entry.enabled);
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let (db, game) = setup();
        create(&db, &game, "default").unwrap();
        assert!(create(&db, &game, "default").is_err());
    }

    #[test]
    fn load_toggles_mods_to_match_snapshot() {
        let (db, game) = setup();
        let a = install(&db, &game, "Mod A", Some(1), false);
        let profile = create(&db, &game, "baseline").unwrap();

        // Disable the mod after the snapshot was taken.
        mods::toggle(&db, &game, a).unwrap();
        assert!(db.get_installed_mod_by_id(a).unwrap().unwrap().disabled);

        let result = load(&db, &game, &profile).unwrap();
        assert_eq!(result.mods_toggled, 1);
        assert!(!db.get_installed_mod_by_id(a).unwrap().unwrap().disabled);
    }

    #[test]
    fn load_is_noop_when_state_already_matches() {
        let (db, game) = setup();
        install(&db, &game, "Mod A", Some(1), false);
        let profile = create(&db, &game, "baseline").unwrap();

        let result = load(&db, &game, &profile).unwrap();
        assert_eq!(result.mods_toggled, 0);
    }

    #[test]
    fn export_only_includes_enabled_mods() {
        let (db, game) = setup();
        install(&db, &game, "Mod A", Some(1), false);
        install(&db, &game, "Mod B", Some(2), true);
        let profile = create(&db, &game, "default").unwrap();

        let payload = export(&db, &game, &profile).unwrap();
        assert_eq!(payload.mod_count, 1);
        assert_eq!(payload.mods[0].name, "Mod A");
        assert_eq!(payload.game_name, "Cyberpunk 2077");
    }

    #[test]
    fn import_matches_by_name_then_nexus_id_and_skips_unmatched() {
        let (db, game) = setup();
        let a = install(&db, &game, "Mod A", Some(1), false);
        let b = install(&db, &game, "Mod B", Some(2), false);

        let payload = ProfileExport {
            profile_name: "shared".to_string(),
            game_name: "Cyberpunk 2077".to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            mod_count: 3,
            mods: vec![
                ProfileExportEntry {
                    name: "Mod A".to_string(),
                    nexus_mod_id: Some(999),
                    version: "1.0.0".to_string(),
                    source_archive: None,
                },
                ProfileExportEntry {
                    name: "Renamed".to_string(),
                    nexus_mod_id: Some(2),
                    version: "1.0.0".to_string(),
                    source_archive: None,
                },
                ProfileExportEntry {
                    name: "Ghost Mod".to_string(),
                    nexus_mod_id: Some(404),
                    version: "1.0.0".to_string(),
                    source_archive: None,
                },
            ],
        };

        let profile = import(&db, &game, &payload).unwrap();
        let entries = db.get_profile_entries(profile.id.unwrap()).unwrap();
        let matched: HashSet<i64> = entries.iter().map(|e| e.installed_mod_id).collect();
        assert_eq!(matched, HashSet::from([a, b]));
    }

    #[test]
    fn import_suffixes_colliding_name() {
        let (db, game) = setup();
        create(&db, &game, "default").unwrap();

        let payload = ProfileExport {
            profile_name: "default".to_string(),
            game_name: "Cyberpunk 2077".to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            mod_count: 0,
            mods: Vec::new(),
        };
        let imported = import(&db, &game, &payload).unwrap();
        assert_eq!(imported.name, "default (1)");
    }

    #[test]
    fn compare_reports_added_removed_and_state_changed() {
        let (db, game) = setup();
        let a = install(&db, &game, "Mod A", Some(1), false);
        let b = install(&db, &game, "Mod B", Some(2), false);
        let profile_a = create(&db, &game, "a").unwrap();

        mods::toggle(&db, &game, b).unwrap();
        let c = install(&db, &game, "Mod C", Some(3), false);
        let profile_b = create(&db, &game, "b").unwrap();

        let diff = compare(&db, &profile_a, &profile_b).unwrap();
        assert_eq!(diff.added, vec![c]);
        assert_eq!(diff.removed, Vec::<i64>::new());
        assert_eq!(diff.state_changed, vec![b]);
        let _ = a;
    }

    #[test]
    fn duplicate_clones_entries_under_a_new_name() {
        let (db, game) = setup();
        install(&db, &game, "Mod A", Some(1), false);
        let original = create(&db, &game, "default").unwrap();

        let copy = duplicate(&db, &original, "default-copy").unwrap();
        let original_entries = db.get_profile_entries(original.id.unwrap()).unwrap();
        let copy_entries = db.get_profile_entries(copy.id.unwrap()).unwrap();
        assert_eq!(original_entries.len(), copy_entries.len());
        assert_eq!(copy.name, "default-copy");
    }
}
