//! Tier 2.5 (catalog-filename matching) and tier 2.75 (endorsed-by-name),
//! spec §4.7.

use super::name_score::{compute_name_score, ACCEPT_THRESHOLD};
use crate::archive::ArchiveReader;
use crate::db::{Database, ModNexusCorrelationRecord};
use anyhow::Result;
use std::collections::HashMap;

/// Nexus file category ids that should never be matched against (stale or removed).
const SKIP_CATEGORIES: &[i32] = &[4, 6, 7]; // OLD_VERSION, DELETED, ARCHIVED

/// Category priority: lower sorts first. MAIN(1) < UPDATE(2) < OPTIONAL(3).
pub fn category_priority(category_id: i32) -> i32 {
    match category_id {
        1 => 0,
        2 => 1,
        3 => 2,
        other => 100 + other,
    }
}

pub fn is_skippable_category(category_id: i32) -> bool {
    SKIP_CATEGORIES.contains(&category_id)
}

/// Compare a staged archive's entries against the ModFile index for `game_id`,
/// crediting whichever ModGroup owns the most matched entries. Returns
/// `(mod_group_id, match_ratio)` when ≥ 50% of archive entries match.
pub fn match_catalog_filename(
    db: &Database,
    game_id: &str,
    archive: &mut ArchiveReader,
) -> Result<Option<(i64, f64)>> {
    let entries = archive.list_entries()?;
    if entries.is_empty() {
        return Ok(None);
    }

    let mod_files = db.get_mod_files(game_id)?;
    let mut path_index: HashMap<String, i64> = HashMap::new();
    let mut leaf_index: HashMap<String, i64> = HashMap::new();
    for f in &mod_files {
        let Some(group_id) = f.mod_group_id else { continue };
        let norm = f.relative_path.replace('\\', "/").to_ascii_lowercase();
        path_index.insert(norm.clone(), group_id);
        if let Some(leaf) = norm.rsplit('/').next() {
            leaf_index.entry(leaf.to_string()).or_insert(group_id);
        }
    }

    let mut matched = 0usize;
    // (path_hits, leaf_hits) per group; a path hit outranks a leaf-only hit.
    let mut group_hits: HashMap<i64, (usize, usize)> = HashMap::new();
    for entry in &entries {
        let norm = entry.replace('\\', "/").to_ascii_lowercase();
        if let Some(&group_id) = path_index.get(&norm) {
            matched += 1;
            group_hits.entry(group_id).or_insert((0, 0)).0 += 1;
        } else if let Some(leaf) = norm.rsplit('/').next() {
            if let Some(&group_id) = leaf_index.get(leaf) {
                matched += 1;
                group_hits.entry(group_id).or_insert((0, 0)).1 += 1;
            }
        }
    }

    let ratio = matched as f64 / entries.len() as f64;
    if ratio < 0.5 {
        return Ok(None);
    }

    let winner = group_hits
        .into_iter()
        .max_by_key(|(_, (path_hits, leaf_hits))| path_hits * 2 + leaf_hits)
        .map(|(group_id, _)| group_id);

    Ok(winner.map(|group_id| (group_id, ratio)))
}

/// Tier 2.75: for endorsed/tracked downloads with no archive evidence, match
/// by name against uncorrelated groups, boosting the accepted score to ≥0.85.
pub fn correlate_endorsed_by_name(db: &Database, game_id: &str) -> Result<usize> {
    let groups = db.get_mod_groups(game_id)?;
    let downloads = db.get_nexus_downloads(game_id)?;
    let correlations = db.get_correlations_for_game(game_id)?;

    let matched_group_ids: std::collections::HashSet<i64> =
        correlations.iter().map(|c| c.mod_group_id).collect();
    let consumed_nexus_ids: std::collections::HashSet<i64> =
        correlations.iter().map(|c| c.nexus_mod_id).collect();

    let mut created = 0usize;
    for dl in downloads.iter().filter(|d| d.is_tracked || d.is_endorsed) {
        if consumed_nexus_ids.contains(&dl.nexus_mod_id) {
            continue;
        }
        let best = groups
            .iter()
            .filter(|g| g.id.map(|id| !matched_group_ids.contains(&id)).unwrap_or(false))
            .filter_map(|g| {
                let (score, _method) = compute_name_score(&dl.mod_name, &g.display_name);
                (score >= ACCEPT_THRESHOLD).then_some((g.id.unwrap(), score))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        if let Some((group_id, score)) = best {
            db.upsert_correlation(&ModNexusCorrelationRecord {
                id: None,
                mod_group_id: group_id,
                nexus_mod_id: dl.nexus_mod_id,
                score: score.max(0.85),
                method: "endorsed_name".to_string(),
                confirmed_by_user: false,
                reasoning: None,
            })?;
            created += 1;
        }
    }
    Ok(created)
}

/// A NexusModFile that should be considered for filename matching,
/// in catalog-priority order (MAIN, then UPDATE, then OPTIONAL).
pub fn sort_candidate_files(mut files: Vec<crate::db::NexusModFileRecord>) -> Vec<crate::db::NexusModFileRecord> {
    files.retain(|f| !is_skippable_category(f.category_id));
    files.sort_by_key(|f| category_priority(f.category_id));
    files
}
