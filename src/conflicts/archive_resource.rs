//! Resource-hash collision detector (spec §4.8), grounded on
//! `archive_conflict_detector.detect_archive_conflicts`.

use crate::db::{ArchiveEntryIndexRecord, ConflictEvidenceRecord, Database};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

pub const KIND: &str = "archive_resource";

#[derive(Debug, Serialize)]
struct ResourceConflictDetail<'a> {
    winner_archive: &'a str,
    loser_archives: Vec<&'a str>,
    sha1s: BTreeMap<&'a str, &'a str>,
    /// "identical" when winner and loser SHA1 match (cosmetic override),
    /// "real" otherwise.
    classification: &'static str,
}

/// Per-archive rollup of win/loss counts across all colliding hashes.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub archive: String,
    pub wins: usize,
    pub losses: usize,
    /// `low` when the archive never loses (cosmetic), `high` when it
    /// loses more than half its colliding entries, `medium` otherwise.
    pub severity: &'static str,
}

/// Per-partner-archive identical/real tally for one archive's conflicts.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerConflictDetail {
    pub partner_archive: String,
    pub identical_count: usize,
    pub real_count: usize,
}

fn colliding_groups(
    entries: &[ArchiveEntryIndexRecord],
) -> BTreeMap<i64, BTreeMap<&str, &ArchiveEntryIndexRecord>> {
    let mut by_hash: BTreeMap<i64, Vec<&ArchiveEntryIndexRecord>> = BTreeMap::new();
    for entry in entries {
        by_hash.entry(entry.resource_hash).or_default().push(entry);
    }
    by_hash
        .into_iter()
        .filter_map(|(hash, group)| {
            let mut by_archive: BTreeMap<&str, &ArchiveEntryIndexRecord> = BTreeMap::new();
            for entry in group {
                by_archive.entry(entry.source_archive.as_str()).or_insert(entry);
            }
            if by_archive.len() < 2 {
                None
            } else {
                Some((hash, by_archive))
            }
        })
        .collect()
}

/// Per-archive summary view (spec §4.8): classify each archive as
/// low/cosmetic when it never loses, high when it loses more than half
/// its colliding entries, medium otherwise.
pub fn summarize_by_archive(db: &Database, game_id: &str) -> Result<Vec<ArchiveSummary>> {
    let entries = db.get_archive_entry_index(game_id)?;
    let mut tally: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for by_archive in colliding_groups(&entries).values() {
        let mut sorted: Vec<&str> = by_archive.keys().copied().collect();
        sorted.sort_by_key(|name| name.to_ascii_lowercase());
        let winner = sorted[0];
        tally.entry(winner.to_string()).or_default().0 += 1;
        for loser in &sorted[1..] {
            tally.entry((*loser).to_string()).or_default().1 += 1;
        }
    }

    let mut summaries: Vec<ArchiveSummary> = tally
        .into_iter()
        .map(|(archive, (wins, losses))| {
            let total = wins + losses;
            let severity = if losses == 0 {
                "low"
            } else if losses * 2 > total {
                "high"
            } else {
                "medium"
            };
            ArchiveSummary { archive, wins, losses, severity }
        })
        .collect();
    summaries.sort_by(|a, b| a.archive.to_ascii_lowercase().cmp(&b.archive.to_ascii_lowercase()));
    Ok(summaries)
}

/// Per-conflict detail view for one archive (spec §4.8): for each partner
/// archive it collides with, how many of those collisions are identical
/// (same SHA1, cosmetic) versus real (differing content).
pub fn archive_detail(
    db: &Database,
    game_id: &str,
    archive: &str,
) -> Result<Vec<PartnerConflictDetail>> {
    let entries = db.get_archive_entry_index(game_id)?;
    let mut partners: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for by_archive in colliding_groups(&entries).values() {
        let Some(&this_entry) = by_archive.get(archive) else { continue };
        for (&other, &other_entry) in by_archive {
            if other == archive {
                continue;
            }
            let tally = partners.entry(other.to_string()).or_default();
            if this_entry.sha1_hex == other_entry.sha1_hex {
                tally.0 += 1;
            } else {
                tally.1 += 1;
            }
        }
    }

    let mut out: Vec<PartnerConflictDetail> = partners
        .into_iter()
        .map(|(partner_archive, (identical_count, real_count))| PartnerConflictDetail {
            partner_archive,
            identical_count,
            real_count,
        })
        .collect();
    out.sort_by(|a, b| a.partner_archive.to_ascii_lowercase().cmp(&b.partner_archive.to_ascii_lowercase()));
    Ok(out)
}

/// Rebuild archive resource-hash collision evidence for `game_id` from the
/// current `ArchiveEntryIndex`. One row per colliding hash; the winner is
/// the archive that sorts first case-insensitive-ASCII (RED engine's own
/// first-loaded-wins rule).
pub fn detect(db: &Database, game_id: &str) -> Result<Vec<ConflictEvidenceRecord>> {
    let entries = db.get_archive_entry_index(game_id)?;

    let mut by_hash: BTreeMap<i64, Vec<&ArchiveEntryIndexRecord>> = BTreeMap::new();
    for entry in &entries {
        by_hash.entry(entry.resource_hash).or_default().push(entry);
    }

    let mut evidence = Vec::new();
    for (resource_hash, group) in by_hash {
        // One (shallowest-seen) entry per distinct source_archive.
        let mut by_archive: BTreeMap<&str, &ArchiveEntryIndexRecord> = BTreeMap::new();
        for entry in group {
            by_archive.entry(entry.source_archive.as_str()).or_insert(entry);
        }
        if by_archive.len() < 2 {
            continue;
        }

        let mut sorted: Vec<(&str, &ArchiveEntryIndexRecord)> =
            by_archive.into_iter().collect();
        sorted.sort_by_key(|(name, _)| name.to_ascii_lowercase());

        let (winner_name, winner_entry) = sorted[0];
        let losers = &sorted[1..];

        let Some(winner_mod_id) = winner_entry.installed_mod_id else { continue };
        // Conflicts where either side isn't a tracked InstalledMod (vanilla
        // archives aren't indexed at all) can't be expressed as a pairwise
        // mod_a/mod_b evidence row, so skip them.
        let mod_ids: Vec<i64> = sorted.iter().filter_map(|(_, e)| e.installed_mod_id).collect();
        let unique_mod_ids: std::collections::HashSet<i64> = mod_ids.iter().copied().collect();
        let severity = if unique_mod_ids.len() <= 1 { "low" } else { "high" };

        let sha1s: BTreeMap<&str, &str> =
            sorted.iter().map(|(name, e)| (*name, e.sha1_hex.as_str())).collect();

        for (loser_name, loser_entry) in losers {
            let Some(loser_mod_id) = loser_entry.installed_mod_id else { continue };
            if loser_mod_id == winner_mod_id {
                continue;
            }
            let classification =
                if winner_entry.sha1_hex == loser_entry.sha1_hex { "identical" } else { "real" };
            let detail = ResourceConflictDetail {
                winner_archive: winner_name,
                loser_archives: vec![loser_name],
                sha1s: sha1s.clone(),
                classification,
            };
            evidence.push(ConflictEvidenceRecord {
                id: None,
                game_id: game_id.to_string(),
                kind: KIND.to_string(),
                severity: severity.to_string(),
                key: format!("{resource_hash:#018x}"),
                mod_a_id: winner_mod_id,
                mod_b_id: loser_mod_id,
                winner_mod_id: Some(winner_mod_id),
                detail_json: serde_json::to_string(&detail)?,
            });
        }
    }

    Ok(evidence)
}

#[cfg(test)]
mod tests {
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
    fn colliding_hash_across_two_mods_is_high_severity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "AAAFirst.archive", &[(42, "aaa".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "ZZZSecond.archive", &[(42, "bbb".to_string())]).unwrap();

        let evidence = detect(&db, "cp").unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].severity, "high");
        assert_eq!(evidence[0].winner_mod_id, Some(1));
        assert_eq!(evidence[0].mod_b_id, 2);
    }

    #[test]
    fn same_mod_internal_override_is_low_severity() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "a.archive", &[(7, "same".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(1), "b.archive", &[(7, "same".to_string())]).unwrap();

        let evidence = detect(&db, "cp").unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].severity, "low");
    }

    #[test]
    fn non_colliding_hashes_yield_no_evidence() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "a.archive", &[(1, "x".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "b.archive", &[(2, "y".to_string())]).unwrap();

        assert!(detect(&db, "cp").unwrap().is_empty());
    }

    #[test]
    fn identical_sha1_across_archives_is_classified_cosmetic() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "AAAFirst.archive", &[(100, "same".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "ZZZSecond.archive", &[(100, "same".to_string())]).unwrap();

        let evidence = detect(&db, "cp").unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].severity, "high");
        let detail: serde_json::Value = serde_json::from_str(&evidence[0].detail_json).unwrap();
        assert_eq!(detail["classification"], "identical");
    }

    #[test]
    fn differing_sha1_across_archives_is_classified_real() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "AAAFirst.archive", &[(100, "aaa".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "ZZZSecond.archive", &[(100, "bbb".to_string())]).unwrap();

        let evidence = detect(&db, "cp").unwrap();
        let detail: serde_json::Value = serde_json::from_str(&evidence[0].detail_json).unwrap();
        assert_eq!(detail["classification"], "real");
    }

    #[test]
    fn per_archive_summary_classifies_wins_losses_and_mixed() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        // "AAA" always wins (alphabetically first) against both partners.
        db.replace_archive_entry_index("cp", Some(1), "AAA.archive", &[(1, "x".to_string()), (2, "x".to_string())]).unwrap();
        // "BBB" wins against CCC (hash 3) but loses to AAA (hash 1) -> mixed/medium.
        db.replace_archive_entry_index("cp", Some(2), "BBB.archive", &[(1, "y".to_string()), (3, "x".to_string())]).unwrap();
        // "CCC" always loses -> high.
        db.replace_archive_entry_index("cp", Some(3), "CCC.archive", &[(2, "y".to_string()), (3, "y".to_string())]).unwrap();

        let summary = summarize_by_archive(&db, "cp").unwrap();
        let aaa = summary.iter().find(|s| s.archive == "AAA.archive").unwrap();
        assert_eq!(aaa.severity, "low");
        assert_eq!(aaa.losses, 0);

        let ccc = summary.iter().find(|s| s.archive == "CCC.archive").unwrap();
        assert_eq!(ccc.severity, "high");
        assert_eq!(ccc.wins, 0);
    }

    #[test]
    fn archive_detail_groups_identical_and_real_by_partner() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "AAA.archive", &[(1, "same".to_string()), (2, "aaa".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "BBB.archive", &[(1, "same".to_string()), (2, "bbb".to_string())]).unwrap();

        let detail = archive_detail(&db, "cp", "AAA.archive").unwrap();
        assert_eq!(detail.len(), 1);
        assert_eq!(detail[0].partner_archive, "BBB.archive");
        assert_eq!(detail[0].identical_count, 1);
        assert_eq!(detail[0].real_count, 1);
    }

    #[test]
    fn winner_is_first_by_case_insensitive_ascii_order() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.replace_archive_entry_index("cp", Some(1), "zzzlast.archive", &[(9, "x".to_string())]).unwrap();
        db.replace_archive_entry_index("cp", Some(2), "AAAFirst.archive", &[(9, "y".to_string())]).unwrap();

        let evidence = detect(&db, "cp").unwrap();
        assert_eq!(evidence[0].winner_mod_id, Some(2));
    }
}
