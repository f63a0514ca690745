//! Update checker (spec §4.12): timestamp-first detection across installed,
//! correlated, endorsed, and tracked mods, cached for 24 hours.
//!
//! `NexusModMeta` in this engine carries no version field of its own (it is
//! refreshed independently of `NexusDownload.version` — see the data model);
//! the per-file versions cached in `NexusModFile` stand in for it wherever
//! the teacher's equivalent service compares against a mod-page version.

use crate::correlate::{CatalogClient, CatalogFileInfo};
use crate::db::{Database, InstalledModRecord, NexusModFileRecord, NexusModMetaRecord};
use crate::filename::{is_newer_version, parse_filename};
use crate::game::Game;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Semaphore;

const MAX_CONCURRENT: usize = 5;
const CACHE_KEY_PREFIX: &str = "update_cache_";
const CACHE_TTL_SECONDS: i64 = 24 * 60 * 60;
const ARCHIVED_CATEGORY: i32 = 7;
const MAIN_CATEGORY: i32 = 1;

/// Where a [`TrackedMod`]'s local version/mtime came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedSource {
    Installed,
    Correlation,
    Endorsed,
    Tracked,
}

impl TrackedSource {
    fn as_str(self) -> &'static str {
        match self {
            TrackedSource::Installed => "installed",
            TrackedSource::Correlation => "correlation",
            TrackedSource::Endorsed => "endorsed",
            TrackedSource::Tracked => "tracked",
        }
    }
}

/// A mod tracked for updates, merged from whichever source ranks highest.
#[derive(Debug, Clone)]
pub struct TrackedMod {
    pub nexus_mod_id: i64,
    pub local_version: String,
    pub display_name: String,
    pub source: TrackedSource,
    pub installed_mod_id: Option<i64>,
    pub mod_group_id: Option<i64>,
    pub upload_timestamp: Option<i64>,
    pub nexus_url: String,
    pub local_file_mtime: Option<i64>,
    pub source_archive: Option<String>,
}

/// One mod with a newer catalog file available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub installed_mod_id: Option<i64>,
    pub mod_group_id: Option<i64>,
    pub display_name: String,
    pub local_version: String,
    pub nexus_version: String,
    pub nexus_mod_id: i64,
    pub nexus_file_id: Option<i64>,
    pub nexus_file_name: String,
    pub nexus_url: String,
    pub author: String,
    pub source: String,
    pub local_timestamp: Option<i64>,
    pub nexus_timestamp: Option<i64>,
    pub detection_method: String,
    pub source_archive: Option<String>,
    pub reason: String,
}

/// Fields the detection/resolution pipeline needs but never exposes.
#[derive(Debug, Clone)]
struct WorkingUpdate {
    entry: UpdateEntry,
    matched_file_id: Option<i64>,
    is_dl_newer: bool,
    is_file_update: bool,
    resolved_file_ts: Option<i64>,
    initial_nexus_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    pub total_checked: usize,
    pub updates: Vec<UpdateEntry>,
}

#[derive(Serialize, Deserialize)]
struct CachedPayload {
    total_checked: usize,
    updates: Vec<UpdateEntry>,
    cached_at: String,
}

/// Best cached file for display/version comparison: MAIN category wins,
/// ties broken by most recent upload. Archived entries never qualify.
fn best_cached_file(files: &[NexusModFileRecord]) -> Option<&NexusModFileRecord> {
    let candidates: Vec<&NexusModFileRecord> =
        files.iter().filter(|f| f.category_id != ARCHIVED_CATEGORY).collect();
    let main: Vec<&NexusModFileRecord> = candidates.iter().copied().filter(|f| f.category_id == MAIN_CATEGORY).collect();
    let pool = if main.is_empty() { &candidates } else { &main };
    pool.iter().copied().max_by_key(|f| f.uploaded_timestamp)
}

/// Scan `downloaded_mods/` for Nexus-shaped filenames, keyed by mod id,
/// keeping whichever staged archive parses to the latest upload timestamp.
fn scan_download_archives(game: &Game) -> HashMap<i64, crate::filename::ParsedFilename> {
    let mut results: HashMap<i64, crate::filename::ParsedFilename> = HashMap::new();
    let Ok(archives) = crate::mods::list_staged_archives(game) else {
        return results;
    };
    for path in archives {
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let parsed = parse_filename(filename);
        let Some(mid) = parsed.nexus_mod_id else { continue };
        match results.get(&mid) {
            Some(existing) => {
                let newer = match (parsed.upload_timestamp, existing.upload_timestamp) {
                    (Some(a), Some(b)) => a > b,
                    (Some(_), None) => true,
                    _ => false,
                };
                if newer {
                    results.insert(mid, parsed);
                }
            }
            None => {
                results.insert(mid, parsed);
            }
        }
    }
    results
}

/// Earliest on-disk mtime (unix seconds) across up to 5 of a ModGroup's files.
fn group_file_mtime(db: &Database, game: &Game, group_id: i64) -> Option<i64> {
    let files = db.get_mod_files(&game.id).ok()?;
    files
        .iter()
        .filter(|f| f.mod_group_id == Some(group_id))
        .take(5)
        .filter_map(|f| {
            let path = game.resolve(&f.relative_path);
            let meta = std::fs::metadata(&path).ok()?;
            let modified = meta.modified().ok()?;
            modified.duration_since(std::time::UNIX_EPOCH).ok().map(|d| d.as_secs() as i64)
        })
        .min()
}

/// Collect every `nexus_mod_id` with a local version, deduplicated by
/// priority (installed > correlation > endorsed/tracked) and enriched
/// from staged archives in `downloaded_mods/` (ground truth).
pub fn collect_tracked_mods(db: &Database, game: &Game) -> Result<HashMap<i64, TrackedMod>> {
    let mut mods: HashMap<i64, TrackedMod> = HashMap::new();

    for installed in db.get_installed_mods(&game.id)? {
        let (Some(mid), Some(version)) = (installed.nexus_mod_id, installed.installed_version.clone()) else {
            continue;
        };
        let local_file_mtime = installed
            .upload_timestamp
            .or_else(|| installed.mod_group_id.and_then(|gid| group_file_mtime(db, game, gid)));
        mods.insert(
            mid,
            TrackedMod {
                nexus_mod_id: mid,
                local_version: version,
                display_name: installed.name.clone(),
                source: TrackedSource::Installed,
                installed_mod_id: installed.id,
                mod_group_id: installed.mod_group_id,
                upload_timestamp: installed.upload_timestamp,
                nexus_url: format!("https://www.nexusmods.com/{}/mods/{}", game.catalog_domain, mid),
                local_file_mtime,
                source_archive: installed.source_archive.clone(),
            },
        );
    }

    let groups = db.get_mod_groups(&game.id)?;
    let group_names: HashMap<i64, String> =
        groups.iter().filter_map(|g| g.id.map(|id| (id, g.display_name.clone()))).collect();
    let correlations = db.get_correlations_for_game(&game.id)?;
    let downloads = db.get_nexus_downloads(&game.id)?;
    let downloads_by_mod: HashMap<i64, &crate::db::NexusDownloadRecord> =
        downloads.iter().map(|d| (d.nexus_mod_id, d)).collect();

    for corr in &correlations {
        if mods.contains_key(&corr.nexus_mod_id) {
            continue;
        }
        let Some(dl) = downloads_by_mod.get(&corr.nexus_mod_id) else { continue };
        let parsed_version = dl.file_name.as_deref().and_then(|fname| parse_filename(fname).version);
        let Some(local_v) = parsed_version.or_else(|| dl.version.clone()) else { continue };
        let display_name = group_names.get(&corr.mod_group_id).cloned().unwrap_or_default();
        let mtime = group_file_mtime(db, game, corr.mod_group_id);
        mods.insert(
            corr.nexus_mod_id,
            TrackedMod {
                nexus_mod_id: corr.nexus_mod_id,
                local_version: local_v,
                display_name,
                source: TrackedSource::Correlation,
                installed_mod_id: None,
                mod_group_id: Some(corr.mod_group_id),
                upload_timestamp: None,
                nexus_url: format!("https://www.nexusmods.com/{}/mods/{}", game.catalog_domain, corr.nexus_mod_id),
                local_file_mtime: mtime,
                source_archive: dl.file_name.clone(),
            },
        );
    }

    for dl in downloads.iter().filter(|d| d.is_endorsed || d.is_tracked) {
        if mods.contains_key(&dl.nexus_mod_id) {
            continue;
        }
        let Some(version) = dl.version.clone() else { continue };
        let source = if dl.is_endorsed { TrackedSource::Endorsed } else { TrackedSource::Tracked };
        mods.insert(
            dl.nexus_mod_id,
            TrackedMod {
                nexus_mod_id: dl.nexus_mod_id,
                local_version: version,
                display_name: dl.mod_name.clone(),
                source,
                installed_mod_id: None,
                mod_group_id: None,
                upload_timestamp: None,
                nexus_url: format!("https://www.nexusmods.com/{}/mods/{}", game.catalog_domain, dl.nexus_mod_id),
                local_file_mtime: None,
                source_archive: dl.file_name.clone(),
            },
        );
    }

    for (mid, parsed) in scan_download_archives(game) {
        let Some(existing) = mods.get(&mid) else { continue };
        let new_version = parsed.version.unwrap_or_else(|| existing.local_version.clone());
        let new_ts = parsed.upload_timestamp.or(existing.upload_timestamp);
        if new_version != existing.local_version || new_ts != existing.upload_timestamp {
            let mut updated = existing.clone();
            updated.local_version = new_version;
            updated.upload_timestamp = new_ts;
            mods.insert(mid, updated);
        }
    }

    Ok(mods)
}

/// Match a local filename against a mod's catalog files: exact stem, then
/// upload timestamp, then version (preferring MAIN category), then the most
/// recent MAIN file. Archived files (category 7) never match.
fn match_local_to_catalog_file(
    local_filename: Option<&str>,
    files: &[CatalogFileInfo],
    parsed_version: Option<&str>,
    parsed_timestamp: Option<i64>,
) -> Option<CatalogFileInfo> {
    let active: Vec<CatalogFileInfo> =
        files.iter().filter(|f| f.category_id != ARCHIVED_CATEGORY).cloned().collect();
    if active.is_empty() {
        return None;
    }

    if let Some(local) = local_filename {
        let local_stem = std::path::Path::new(local)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(local)
            .to_ascii_lowercase();
        if !local_stem.is_empty() {
            if let Some(hit) = active.iter().find(|f| {
                std::path::Path::new(&f.file_name)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&f.file_name)
                    .to_ascii_lowercase()
                    == local_stem
            }) {
                return Some(hit.clone());
            }
        }
    }

    if let Some(ts) = parsed_timestamp {
        if let Some(hit) = active.iter().find(|f| f.uploaded_timestamp == ts) {
            return Some(hit.clone());
        }
    }

    if let Some(version) = parsed_version {
        let version_matches: Vec<&CatalogFileInfo> =
            active.iter().filter(|f| f.version.as_deref() == Some(version)).collect();
        if let Some(main) = version_matches.iter().find(|f| f.category_id == MAIN_CATEGORY) {
            return Some((*main).clone());
        }
        if let Some(first) = version_matches.first() {
            return Some((*first).clone());
        }
    }

    let main_files: Vec<&CatalogFileInfo> = active.iter().filter(|f| f.category_id == MAIN_CATEGORY).collect();
    let pool: Vec<&CatalogFileInfo> = if main_files.is_empty() { active.iter().collect() } else { main_files };
    pool.into_iter().max_by_key(|f| f.uploaded_timestamp).cloned()
}

async fn refresh_metadata(
    db: &Database,
    game: &Game,
    catalog: &dyn CatalogClient,
    mod_ids: &HashSet<i64>,
) {
    if mod_ids.is_empty() {
        return;
    }
    let semaphore = Semaphore::new(MAX_CONCURRENT);
    let futs = mod_ids.iter().map(|&mod_id| {
        let sem = &semaphore;
        async move {
            let _permit = sem.acquire().await.ok()?;
            catalog.mod_meta(&game.catalog_domain, mod_id).await.ok()
        }
    });
    let refreshed: Vec<_> = futures::future::join_all(futs).await.into_iter().flatten().collect();
    for meta in refreshed {
        if let Err(err) = db.upsert_nexus_mod_meta(&NexusModMetaRecord {
            nexus_mod_id: meta.nexus_mod_id,
            author: Some(meta.author),
            summary: Some(meta.summary),
            description: None,
            updated_at: meta.updated_timestamp,
            endorsement_count: meta.endorsement_count,
            picture_url: Some(meta.picture_url),
        }) {
            tracing::warn!("failed to persist refreshed metadata for mod {}: {err}", meta.nexus_mod_id);
        }
    }
}

async fn resolve_file_ids(game: &Game, catalog: &dyn CatalogClient, updates: &mut [WorkingUpdate]) {
    let semaphore = Semaphore::new(MAX_CONCURRENT);
    let futs = updates.iter().map(|u| {
        let sem = &semaphore;
        let mid = u.entry.nexus_mod_id;
        let local_fn = u.entry.source_archive.clone();
        async move {
            let _permit = sem.acquire().await.ok()?;
            let (files, file_updates) = catalog.mod_files(&game.catalog_domain, mid).await.ok()?;

            let parsed = local_fn.as_deref().map(parse_filename);
            let mut best = match_local_to_catalog_file(
                local_fn.as_deref(),
                &files,
                parsed.as_ref().and_then(|p| p.version.as_deref()),
                parsed.as_ref().and_then(|p| p.upload_timestamp),
            );
            if best.is_none() {
                best = match_local_to_catalog_file(None, &files, None, None);
            }
            let Some(mut resolved) = best else { return None };
            let matched_file_id = resolved.file_id;

            let chain: HashMap<i64, i64> =
                file_updates.into_iter().map(|u| (u.old_file_id, u.new_file_id)).collect();
            let mut visited = HashSet::new();
            let mut current = matched_file_id;
            while let Some(&next) = chain.get(&current) {
                if !visited.insert(current) {
                    break;
                }
                current = next;
            }
            if current != matched_file_id {
                if let Some(replacement) =
                    files.iter().find(|f| f.file_id == current && f.category_id != ARCHIVED_CATEGORY)
                {
                    resolved = replacement.clone();
                }
            }

            Some((mid, matched_file_id, resolved))
        }
    });

    let resolved: HashMap<i64, (i64, CatalogFileInfo)> =
        futures::future::join_all(futs).await.into_iter().flatten().map(|(mid, matched, file)| (mid, (matched, file))).collect();

    for update in updates.iter_mut() {
        let Some((matched_file_id, file)) = resolved.get(&update.entry.nexus_mod_id) else { continue };
        update.matched_file_id = Some(*matched_file_id);
        update.entry.nexus_file_id = Some(file.file_id);
        update.entry.nexus_file_name = file.file_name.clone();
        if let Some(v) = &file.version {
            update.entry.nexus_version = v.clone();
        }
        update.resolved_file_ts = Some(file.uploaded_timestamp);
    }
}

fn persist_resolved_file_ids(db: &Database, game: &Game, updates: &[WorkingUpdate]) -> Result<()> {
    for update in updates {
        let Some(fid) = update.entry.nexus_file_id else { continue };
        let installed_fid = update.matched_file_id.unwrap_or(fid);
        let mid = update.entry.nexus_mod_id;

        if let Some(installed_id) = update.entry.installed_mod_id {
            if let Some(installed) = db.get_installed_mod_by_id(installed_id)? {
                if installed.nexus_file_id.is_none() {
                    db.set_installed_mod_file_ids(installed_id, Some(mid), Some(installed_fid))?;
                }
            }
        }

        if let Some(dl) = db.get_nexus_downloads(&game.id)?.into_iter().find(|d| d.nexus_mod_id == mid) {
            if dl.file_id.is_none() {
                db.upsert_nexus_download(&crate::db::NexusDownloadRecord { file_id: Some(installed_fid), ..dl })?;
            }
        }
    }
    Ok(())
}

fn cache_key(game_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{game_id}")
}

fn cache_update_result(db: &Database, game_id: &str, result: &UpdateResult) -> Result<()> {
    let payload = CachedPayload {
        total_checked: result.total_checked,
        updates: result.updates.clone(),
        cached_at: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_string(&payload).context("failed to serialize update cache")?;
    db.set_setting(&cache_key(game_id), &json)
}

fn load_cached_result(db: &Database, game_id: &str) -> Result<Option<UpdateResult>> {
    let Some(raw) = db.get_setting(&cache_key(game_id))? else { return Ok(None) };
    let Ok(payload) = serde_json::from_str::<CachedPayload>(&raw) else {
        tracing::warn!("failed to parse cached update result for game '{game_id}'");
        return Ok(None);
    };
    let Ok(cached_at) = chrono::DateTime::parse_from_rfc3339(&payload.cached_at) else { return Ok(None) };
    let age = chrono::Utc::now().signed_duration_since(cached_at).num_seconds();
    if age > CACHE_TTL_SECONDS {
        return Ok(None);
    }
    Ok(Some(UpdateResult { total_checked: payload.total_checked, updates: payload.updates }))
}

/// Download date for a tracked mod: the recorded `NexusDownload.downloaded_at`
/// when one exists, falling back to the owning `InstalledMod.installed_at`.
fn download_date(
    tracked: &TrackedMod,
    downloads_by_mod: &HashMap<i64, &crate::db::NexusDownloadRecord>,
    installed_by_id: &HashMap<i64, &InstalledModRecord>,
) -> Option<i64> {
    if let Some(dl) = downloads_by_mod.get(&tracked.nexus_mod_id) {
        if let Some(ts) = dl.downloaded_at.as_deref().and_then(parse_rfc3339_epoch) {
            return Some(ts);
        }
    }
    tracked.installed_mod_id.and_then(|id| installed_by_id.get(&id)).and_then(|m| parse_rfc3339_epoch(&m.installed_at))
}

fn parse_rfc3339_epoch(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp())
}

/// Unified update check. One catalog call for recently-updated mods, a
/// bounded metadata refresh, three-signal detection, bounded file-ID
/// resolution, and a false-positive filter on the resolved file. Result is
/// cached under a per-game `AppSetting` key with a 24 hour TTL.
pub async fn check_all_updates(db: &Database, game: &Game, catalog: &dyn CatalogClient) -> Result<UpdateResult> {
    let tracked = collect_tracked_mods(db, game)?;
    if tracked.is_empty() {
        return Ok(UpdateResult::default());
    }

    let mut file_update_map: HashMap<i64, i64> = HashMap::new();
    match catalog.updated_mods(&game.catalog_domain, "1m").await {
        Ok(entries) => {
            for entry in entries {
                file_update_map.insert(entry.nexus_mod_id, entry.latest_file_update);
            }
        }
        Err(err) => tracing::warn!("failed to fetch recently updated mods: {err}"),
    }

    let tracked_ids: Vec<i64> = tracked.keys().copied().collect();
    let mut baseline_map: HashMap<i64, Option<i64>> = HashMap::new();
    for &mid in &tracked_ids {
        if let Some(meta) = db.get_nexus_mod_meta(mid)? {
            baseline_map.insert(mid, meta.updated_at);
        }
    }

    let mut timestamp_flagged: HashSet<i64> = HashSet::new();
    let mut missing_meta: HashSet<i64> = HashSet::new();
    for &mid in &tracked_ids {
        let Some(baseline) = baseline_map.get(&mid) else {
            missing_meta.insert(mid);
            continue;
        };
        let Some(latest_file_ts) = file_update_map.get(&mid) else { continue };
        match baseline {
            None => {
                timestamp_flagged.insert(mid);
            }
            Some(baseline_ts) if latest_file_ts > baseline_ts => {
                timestamp_flagged.insert(mid);
            }
            _ => {}
        }
    }

    let to_refresh: HashSet<i64> = timestamp_flagged.union(&missing_meta).copied().collect();
    refresh_metadata(db, game, catalog, &to_refresh).await;

    let mut meta_map: HashMap<i64, NexusModMetaRecord> = HashMap::new();
    for &mid in &tracked_ids {
        if let Some(meta) = db.get_nexus_mod_meta(mid)? {
            meta_map.insert(mid, meta);
        }
    }

    let downloads = db.get_nexus_downloads(&game.id)?;
    let downloads_by_mod: HashMap<i64, &crate::db::NexusDownloadRecord> =
        downloads.iter().map(|d| (d.nexus_mod_id, d)).collect();
    let installed_mods = db.get_installed_mods(&game.id)?;
    let installed_by_id: HashMap<i64, &InstalledModRecord> =
        installed_mods.iter().filter_map(|m| m.id.map(|id| (id, m))).collect();

    let mut working: Vec<WorkingUpdate> = Vec::new();
    for (&mid, mod_) in &tracked {
        let Some(meta) = meta_map.get(&mid) else { continue };
        let cached_files = db.get_nexus_mod_files(mid)?;
        let best_cached = best_cached_file(&cached_files);

        let nexus_update_ts = file_update_map.get(&mid).copied().or(meta.updated_at);

        let is_ts_flagged = match (mod_.local_file_mtime, nexus_update_ts) {
            (Some(mtime), Some(ts)) => ts > mtime,
            _ => timestamp_flagged.contains(&mid),
        };

        let nexus_version = best_cached.and_then(|f| f.version.clone()).unwrap_or_default();
        let is_version_newer = !nexus_version.is_empty() && is_newer_version(&nexus_version, &mod_.local_version);
        let is_version_equal = !is_version_newer
            && !nexus_version.is_empty()
            && !is_newer_version(&mod_.local_version, &nexus_version);

        let dl_date = download_date(mod_, &downloads_by_mod, &installed_by_id);
        let is_dl_newer = matches!((dl_date, nexus_update_ts), (Some(d), Some(ts)) if ts > d);

        let is_file_update = file_update_map.contains_key(&mid);

        if !(is_version_newer || is_dl_newer || (is_ts_flagged && (is_file_update || !is_version_equal))) {
            continue;
        }

        let detection = if is_dl_newer && is_version_newer {
            "both"
        } else if is_dl_newer {
            "timestamp"
        } else if is_ts_flagged && is_version_newer {
            "both"
        } else if is_ts_flagged {
            "timestamp"
        } else {
            "version"
        };

        let reason = match detection {
            "version" => format!("Newer version available: v{nexus_version}"),
            "timestamp" => "Newer file uploaded on Nexus".to_string(),
            _ => format!("Newer version v{nexus_version} + newer file on Nexus"),
        };

        working.push(WorkingUpdate {
            entry: UpdateEntry {
                installed_mod_id: mod_.installed_mod_id,
                mod_group_id: mod_.mod_group_id,
                display_name: mod_.display_name.clone(),
                local_version: mod_.local_version.clone(),
                nexus_version: nexus_version.clone(),
                nexus_mod_id: mid,
                nexus_file_id: None,
                nexus_file_name: String::new(),
                nexus_url: mod_.nexus_url.clone(),
                author: meta.author.clone().unwrap_or_default(),
                source: mod_.source.as_str().to_string(),
                local_timestamp: mod_.upload_timestamp,
                nexus_timestamp: nexus_update_ts,
                detection_method: detection.to_string(),
                source_archive: mod_.source_archive.clone(),
                reason,
            },
            matched_file_id: None,
            is_dl_newer,
            is_file_update,
            resolved_file_ts: None,
            initial_nexus_version: nexus_version,
        });
    }

    if !working.is_empty() {
        resolve_file_ids(game, catalog, &mut working).await;
        persist_resolved_file_ids(db, game, &working)?;

        for update in working.iter_mut() {
            if !update.entry.nexus_version.is_empty() && update.entry.nexus_version != update.initial_nexus_version {
                update.entry.reason = format!("Newer version available: v{}", update.entry.nexus_version);
            }
        }

        working = working
            .into_iter()
            .filter(|u| {
                if u.is_dl_newer {
                    return true;
                }
                let resolved_v = &u.entry.nexus_version;
                let local_v = &u.entry.local_version;
                if !resolved_v.is_empty() && !local_v.is_empty() && !is_newer_version(resolved_v, local_v) {
                    if !u.is_file_update {
                        return false;
                    }
                    let local_mtime = tracked.get(&u.entry.nexus_mod_id).and_then(|m| m.local_file_mtime);
                    if let (Some(resolved_ts), Some(local_mtime)) = (u.resolved_file_ts, local_mtime) {
                        if resolved_ts <= local_mtime {
                            return false;
                        }
                    }
                    if local_mtime.is_none() && matches!(u.entry.source.as_str(), "endorsed" | "tracked") {
                        return false;
                    }
                }
                true
            })
            .collect();
    }

    let result = UpdateResult {
        total_checked: tracked.len(),
        updates: working.into_iter().map(|w| w.entry).collect(),
    };
    cache_update_result(db, &game.id, &result)?;
    Ok(result)
}

/// Cached result when one is fresh (≤24h); otherwise a purely offline
/// fallback comparing each tracked mod's local version against the best
/// cached catalog file version, with no catalog calls at all.
pub fn check_cached_updates(db: &Database, game: &Game) -> Result<UpdateResult> {
    if let Some(cached) = load_cached_result(db, &game.id)? {
        return Ok(cached);
    }

    let tracked = collect_tracked_mods(db, game)?;
    if tracked.is_empty() {
        return Ok(UpdateResult::default());
    }

    let mut updates = Vec::new();
    for (&mid, mod_) in &tracked {
        let Some(meta) = db.get_nexus_mod_meta(mid)? else { continue };
        let cached_files = db.get_nexus_mod_files(mid)?;
        let Some(best) = best_cached_file(&cached_files) else { continue };
        let Some(nexus_version) = best.version.clone() else { continue };
        if !is_newer_version(&nexus_version, &mod_.local_version) {
            continue;
        }
        updates.push(UpdateEntry {
            installed_mod_id: mod_.installed_mod_id,
            mod_group_id: mod_.mod_group_id,
            display_name: mod_.display_name.clone(),
            local_version: mod_.local_version.clone(),
            nexus_version: nexus_version.clone(),
            nexus_mod_id: mid,
            nexus_file_id: None,
            nexus_file_name: String::new(),
            nexus_url: mod_.nexus_url.clone(),
            author: meta.author.clone().unwrap_or_default(),
            source: mod_.source.as_str().to_string(),
            local_timestamp: mod_.upload_timestamp,
            nexus_timestamp: None,
            detection_method: "version".to_string(),
            source_archive: mod_.source_archive.clone(),
            reason: format!("Newer version available: v{nexus_version}"),
        });
    }

    Ok(UpdateResult { total_checked: tracked.len(), updates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GameRecord, InstalledModRecord, NexusDownloadRecord};

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

    fn install(db: &Database, game: &Game, mid: i64, version: &str) -> i64 {
        db.insert_installed_mod(&InstalledModRecord {
            id: None,
            game_id: game.id.clone(),
            name: format!("Mod {mid}"),
            source_archive: None,
            disabled: false,
            installed_version: Some(version.to_string()),
            nexus_mod_id: Some(mid),
            nexus_file_id: None,
            upload_timestamp: Some(1_700_000_000),
            mod_group_id: None,
            installed_at: chrono::Utc::now().to_rfc3339(),
        })
        .unwrap()
    }

    #[test]
    fn collect_tracked_mods_picks_up_installed_mods() {
        let (db, game) = setup();
        install(&db, &game, 42, "1.0.0");
        let tracked = collect_tracked_mods(&db, &game).unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[&42].source, TrackedSource::Installed);
        assert_eq!(tracked[&42].local_version, "1.0.0");
    }

    #[test]
    fn installed_mods_win_over_endorsed_duplicates() {
        let (db, game) = setup();
        install(&db, &game, 42, "1.0.0");
        db.upsert_nexus_download(&NexusDownloadRecord {
            id: None,
            game_id: game.id.clone(),
            nexus_mod_id: 42,
            mod_name: "Mod 42".to_string(),
            file_name: None,
            file_id: None,
            version: Some("0.9.0".to_string()),
            is_tracked: false,
            is_endorsed: true,
            downloaded_at: None,
        })
        .unwrap();

        let tracked = collect_tracked_mods(&db, &game).unwrap();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[&42].source, TrackedSource::Installed);
        assert_eq!(tracked[&42].local_version, "1.0.0");
    }

    #[test]
    fn endorsed_mods_with_no_version_are_not_tracked() {
        let (db, game) = setup();
        db.upsert_nexus_download(&NexusDownloadRecord {
            id: None,
            game_id: game.id.clone(),
            nexus_mod_id: 7,
            mod_name: "No Version".to_string(),
            file_name: None,
            file_id: None,
            version: None,
            is_tracked: false,
            is_endorsed: true,
            downloaded_at: None,
        })
        .unwrap();
        let tracked = collect_tracked_mods(&db, &game).unwrap();
        assert!(tracked.is_empty());
    }

    #[test]
    fn best_cached_file_prefers_main_category_then_latest_upload() {
        let files = vec![
            NexusModFileRecord {
                id: None,
                nexus_mod_id: 1,
                file_id: 10,
                file_name: "old.zip".to_string(),
                version: Some("1.0.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 1000,
                file_size: 10,
            },
            NexusModFileRecord {
                id: None,
                nexus_mod_id: 1,
                file_id: 11,
                file_name: "new.zip".to_string(),
                version: Some("1.1.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 2000,
                file_size: 10,
            },
            NexusModFileRecord {
                id: None,
                nexus_mod_id: 1,
                file_id: 12,
                file_name: "optional.zip".to_string(),
                version: Some("9.9.9".to_string()),
                category_id: 3,
                uploaded_timestamp: 5000,
                file_size: 10,
            },
        ];
        let best = best_cached_file(&files).unwrap();
        assert_eq!(best.file_id, 11);
    }

    #[test]
    fn match_local_to_catalog_file_prefers_exact_stem() {
        let files = vec![
            CatalogFileInfo {
                file_id: 1,
                file_name: "ModX-1.0.zip".to_string(),
                version: Some("1.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 100,
                file_size: 10,
            },
            CatalogFileInfo {
                file_id: 2,
                file_name: "ModX-2.0.zip".to_string(),
                version: Some("2.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 200,
                file_size: 10,
            },
        ];
        let matched = match_local_to_catalog_file(Some("ModX-1.0.zip"), &files, None, None).unwrap();
        assert_eq!(matched.file_id, 1);
    }

    #[test]
    fn match_local_to_catalog_file_falls_back_to_most_recent_main() {
        let files = vec![
            CatalogFileInfo {
                file_id: 1,
                file_name: "a.zip".to_string(),
                version: Some("1.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 100,
                file_size: 10,
            },
            CatalogFileInfo {
                file_id: 2,
                file_name: "b.zip".to_string(),
                version: Some("2.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 200,
                file_size: 10,
            },
        ];
        let matched = match_local_to_catalog_file(None, &files, None, None).unwrap();
        assert_eq!(matched.file_id, 2);
    }

    #[test]
    fn match_local_to_catalog_file_never_matches_archived() {
        let files = vec![CatalogFileInfo {
            file_id: 1,
            file_name: "gone.zip".to_string(),
            version: Some("1.0".to_string()),
            category_id: ARCHIVED_CATEGORY,
            uploaded_timestamp: 100,
            file_size: 10,
        }];
        assert!(match_local_to_catalog_file(None, &files, None, None).is_none());
    }

    #[test]
    fn check_cached_updates_with_no_cache_and_no_meta_returns_empty() {
        let (db, game) = setup();
        install(&db, &game, 42, "1.0.0");
        let result = check_cached_updates(&db, &game).unwrap();
        assert_eq!(result.total_checked, 1);
        assert!(result.updates.is_empty());
    }

    #[test]
    fn check_cached_updates_offline_fallback_flags_newer_cached_file_version() {
        let (db, game) = setup();
        install(&db, &game, 42, "1.0.0");
        db.upsert_nexus_mod_meta(&NexusModMetaRecord {
            nexus_mod_id: 42,
            author: Some("Someone".to_string()),
            summary: None,
            description: None,
            updated_at: Some(1_700_000_500),
            endorsement_count: 0,
            picture_url: None,
        })
        .unwrap();
        db.replace_nexus_mod_files(
            42,
            &[NexusModFileRecord {
                id: None,
                nexus_mod_id: 42,
                file_id: 99,
                file_name: "ModForty-42-1-1-0-1700000500.zip".to_string(),
                version: Some("1.1.0".to_string()),
                category_id: 1,
                uploaded_timestamp: 1_700_000_500,
                file_size: 20,
            }],
        )
        .unwrap();

        let result = check_cached_updates(&db, &game).unwrap();
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].detection_method, "version");
        assert_eq!(result.updates[0].nexus_version, "1.1.0");
    }

    #[test]
    fn cache_round_trips_through_app_settings() {
        let (db, game) = setup();
        let result = UpdateResult {
            total_checked: 3,
            updates: vec![UpdateEntry {
                installed_mod_id: Some(1),
                mod_group_id: None,
                display_name: "Mod".to_string(),
                local_version: "1.0".to_string(),
                nexus_version: "1.1".to_string(),
                nexus_mod_id: 42,
                nexus_file_id: Some(99),
                nexus_file_name: "mod.zip".to_string(),
                nexus_url: "https://www.nexusmods.com/cyberpunk2077/mods/42".to_string(),
                author: "Someone".to_string(),
                source: "installed".to_string(),
                local_timestamp: None,
                nexus_timestamp: None,
                detection_method: "version".to_string(),
                source_archive: None,
                reason: "Newer version available: v1.1".to_string(),
            }],
        };
        cache_update_result(&db, &game.id, &result).unwrap();
        let loaded = load_cached_result(&db, &game.id).unwrap().unwrap();
        assert_eq!(loaded.total_checked, 3);
        assert_eq!(loaded.updates[0].nexus_mod_id, 42);
    }

    #[test]
    fn stale_cache_is_not_served() {
        let (db, game) = setup();
        let payload = CachedPayload {
            total_checked: 1,
            updates: Vec::new(),
            cached_at: (chrono::Utc::now() - chrono::Duration::hours(25)).to_rfc3339(),
        };
        db.set_setting(&cache_key(&game.id), &serde_json::to_string(&payload).unwrap()).unwrap();
        assert!(load_cached_result(&db, &game.id).unwrap().is_none());
    }
}
