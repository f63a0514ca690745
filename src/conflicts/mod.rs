//! Conflict detection (spec §4.8/§4.9). A scan rebuilds all
//! `ConflictEvidence` rows for a game from scratch: the resource-hash
//! index and path-collision scan run unconditionally, while the
//! redscript/tweak detectors need their callers to have already read the
//! relevant on-disk files (they don't touch the filesystem themselves).

pub mod archive_resource;
pub mod path_collision;
pub mod redscript;
pub mod tweakxl;

use crate::db::{ConflictEvidenceRecord, Database};
use anyhow::Result;

/// Rebuild the archive-resource and path-collision evidence for `game_id`
/// and persist it. Script/tweak evidence is rebuilt separately by
/// [`rescan_scripts_and_tweaks`] since it needs file contents the caller
/// must supply.
pub fn rescan(db: &Database, game_id: &str) -> Result<Vec<ConflictEvidenceRecord>> {
    let mut evidence = archive_resource::detect(db, game_id)?;
    evidence.extend(path_collision::detect(db, game_id)?);
    db.replace_conflict_evidence(game_id, &evidence)?;
    Ok(evidence)
}

/// Rebuild redscript-target and tweak-key evidence from pre-read mod file
/// contents, appending to whatever `rescan` already wrote for this game.
pub fn rescan_scripts_and_tweaks(
    db: &Database,
    game_id: &str,
    mod_reds_contents: &[(i64, Vec<String>)],
    mod_tweak_entries: &[(i64, Vec<tweakxl::TweakEntry>)],
) -> Result<Vec<ConflictEvidenceRecord>> {
    let mut evidence = db.get_conflict_evidence(game_id)?;
    evidence.extend(redscript::detect(db, game_id, mod_reds_contents)?);
    evidence.extend(tweakxl::detect(game_id, mod_tweak_entries)?);
    db.replace_conflict_evidence(game_id, &evidence)?;
    Ok(evidence)
}
