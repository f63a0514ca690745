//! Tier 3: general name correlator (spec §4.7), ported behaviourally from
//! `correlate_game_mods` in the original implementation's test suite.

use super::name_score::{compute_name_score, is_name_based_method, ACCEPT_THRESHOLD};
use crate::db::{Database, ModGroupRecord, ModNexusCorrelationRecord, NexusDownloadRecord};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationSummary {
    pub total_groups: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Run the general name correlator for one game: purge stale non-confirmed
/// name-based correlations, then match remaining uncorrelated groups
/// against remaining unconsumed downloads.
pub fn correlate_by_name(db: &Database, game_id: &str) -> Result<CorrelationSummary> {
    purge_stale_name_correlations(db, game_id)?;

    let groups = db.get_mod_groups(game_id)?;
    let downloads = db.get_nexus_downloads(game_id)?;
    let correlations = db.get_correlations_for_game(game_id)?;

    let matched_group_ids: HashSet<i64> = correlations.iter().map(|c| c.mod_group_id).collect();
    let consumed_nexus_ids: HashSet<i64> = correlations.iter().map(|c| c.nexus_mod_id).collect();

    let mut candidates: Vec<(i64, i64, f64, &'static str)> = Vec::new();
    for group in &groups {
        let Some(group_id) = group.id else { continue };
        if matched_group_ids.contains(&group_id) {
            continue;
        }
        let mut best: Option<(i64, f64, &'static str)> = None;
        for dl in &downloads {
            if consumed_nexus_ids.contains(&dl.nexus_mod_id) {
                continue;
            }
            let (score, method) = compute_name_score(&group.display_name, &dl.mod_name);
            if score < ACCEPT_THRESHOLD {
                continue;
            }
            let better = match best {
                Some((_, best_score, _)) => score > best_score,
                None => true,
            };
            if better {
                best = Some((dl.nexus_mod_id, score, method));
            }
        }
        if let Some((nexus_mod_id, score, method)) = best {
            candidates.push((group_id, nexus_mod_id, score, method));
        }
    }

    // One nexus_mod_id can only end up correlated to its single best-scoring group.
    let mut best_per_nexus: HashMap<i64, (i64, f64, &'static str)> = HashMap::new();
    for (group_id, nexus_mod_id, score, method) in candidates {
        best_per_nexus
            .entry(nexus_mod_id)
            .and_modify(|existing| {
                if score > existing.1 {
                    *existing = (group_id, score, method);
                }
            })
            .or_insert((group_id, score, method));
    }

    for (nexus_mod_id, (group_id, score, method)) in &best_per_nexus {
        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: *group_id,
            nexus_mod_id: *nexus_mod_id,
            score: *score,
            method: method.to_string(),
            confirmed_by_user: false,
            reasoning: None,
        })?;
    }

    let total_groups = groups.len();
    let matched = matched_group_ids.len() + best_per_nexus.len();
    Ok(CorrelationSummary { total_groups, matched, unmatched: total_groups - matched })
}

fn purge_stale_name_correlations(db: &Database, game_id: &str) -> Result<()> {
    let correlations = db.get_correlations_for_game(game_id)?;
    if correlations.is_empty() {
        return Ok(());
    }
    let downloads = db.get_nexus_downloads(game_id)?;
    let groups = db.get_mod_groups(game_id)?;
    let download_by_id: HashMap<i64, &NexusDownloadRecord> =
        downloads.iter().map(|d| (d.nexus_mod_id, d)).collect();
    let group_by_id: HashMap<i64, &ModGroupRecord> =
        groups.iter().filter_map(|g| g.id.map(|id| (id, g))).collect();

    for c in &correlations {
        if c.confirmed_by_user || !is_name_based_method(&c.method) {
            continue;
        }
        let Some(group) = group_by_id.get(&c.mod_group_id) else {
            continue;
        };
        let still_valid = download_by_id
            .get(&c.nexus_mod_id)
            .map(|dl| compute_name_score(&group.display_name, &dl.mod_name).0 >= ACCEPT_THRESHOLD)
            .unwrap_or(false);
        if !still_valid {
            db.delete_correlation(c.mod_group_id, c.nexus_mod_id)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GameRecord;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_game(&GameRecord {
            id: "cp".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: "/games/cp77".to_string(),
            mod_paths_json: "[]".to_string(),
        })
        .unwrap();
        db
    }

    fn group(db: &Database, display_name: &str) -> i64 {
        db.insert_mod_group(&ModGroupRecord {
            id: None,
            game_id: "cp".to_string(),
            display_name: display_name.to_string(),
            confidence: 1.0,
        })
        .unwrap()
    }

    fn download(db: &Database, nexus_mod_id: i64, mod_name: &str) {
        db.upsert_nexus_download(&NexusDownloadRecord {
            id: None,
            game_id: "cp".to_string(),
            nexus_mod_id,
            mod_name: mod_name.to_string(),
            file_name: None,
            file_id: None,
            version: None,
            is_tracked: false,
            is_endorsed: false,
            downloaded_at: None,
        })
        .unwrap();
    }

    #[test]
    fn no_groups_yields_zero_total() {
        let db = setup();
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result, CorrelationSummary { total_groups: 0, matched: 0, unmatched: 0 });
    }

    #[test]
    fn no_downloads_leaves_group_unmatched() {
        let db = setup();
        group(&db, "MyMod");
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.total_groups, 1);
        assert_eq!(result.matched, 0);
    }

    #[test]
    fn creates_correlation_for_matching_names() {
        let db = setup();
        group(&db, "Enhanced Weather");
        download(&db, 100, "Enhanced Weather");
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 1);
    }

    #[test]
    fn skips_low_score_pairs() {
        let db = setup();
        group(&db, "AAAA");
        download(&db, 200, "ZZZZ");
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 0);
    }

    #[test]
    fn skips_already_matched_groups() {
        let db = setup();
        let group_id = group(&db, "CET");
        download(&db, 300, "CET");
        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: group_id,
            nexus_mod_id: 300,
            score: 1.0,
            method: "exact".to_string(),
            confirmed_by_user: false,
            reasoning: None,
        })
        .unwrap();
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.unmatched, 0);
    }

    #[test]
    fn purges_stale_name_correlation_on_rename() {
        let db = setup();
        let group_id = group(&db, "Yaiba Muramasa");
        download(&db, 500, "Lizzie's Braindances");
        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: group_id,
            nexus_mod_id: 500,
            score: 1.0,
            method: "exact".to_string(),
            confirmed_by_user: false,
            reasoning: None,
        })
        .unwrap();
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 0);
        assert_eq!(result.unmatched, 1);
        assert!(db.get_correlations_for_game("cp").unwrap().is_empty());
    }

    #[test]
    fn preserves_confirmed_correlation_even_when_names_diverge() {
        let db = setup();
        let group_id = group(&db, "CustomMod");
        download(&db, 600, "Totally Different Name");
        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: group_id,
            nexus_mod_id: 600,
            score: 1.0,
            method: "exact".to_string(),
            confirmed_by_user: true,
            reasoning: None,
        })
        .unwrap();
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 1);
    }

    #[test]
    fn preserves_non_name_methods_even_when_names_diverge() {
        let db = setup();
        let group_id = group(&db, "SomeMod");
        download(&db, 700, "Completely Unrelated");
        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: group_id,
            nexus_mod_id: 700,
            score: 0.95,
            method: "filename_id".to_string(),
            confirmed_by_user: false,
            reasoning: None,
        })
        .unwrap();
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 1);
    }

    #[test]
    fn dedupes_one_nexus_id_to_its_best_scoring_group() {
        let db = setup();
        group(&db, "Weather Mod");
        group(&db, "Enhanced Weather");
        download(&db, 800, "Enhanced Weather");
        let result = correlate_by_name(&db, "cp").unwrap();
        assert_eq!(result.matched, 1);
        let correlations = db.get_correlations_for_game("cp").unwrap();
        assert_eq!(correlations.len(), 1);
    }
}
