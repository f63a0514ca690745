//! Database record types (spec §3)

use rusqlite::Row;

/// A configured mod-management target.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub id: String,
    pub name: String,
    pub catalog_domain: String,
    pub install_path: String,
    /// JSON-encoded `Vec<String>` of relative mod-paths.
    pub mod_paths_json: String,
}

impl GameRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            catalog_domain: row.get(2)?,
            install_path: row.get(3)?,
            mod_paths_json: row.get(4)?,
        })
    }
}

/// One on-disk file under a mod-path, as found by the scanner.
#[derive(Debug, Clone)]
pub struct ModFileRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub relative_path: String,
    pub size_bytes: i64,
    pub mod_group_id: Option<i64>,
}

impl ModFileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            relative_path: row.get(2)?,
            size_bytes: row.get(3)?,
            mod_group_id: row.get(4)?,
        })
    }
}

/// A cluster of ModFiles representing one logical mod (C6).
#[derive(Debug, Clone)]
pub struct ModGroupRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub display_name: String,
    pub confidence: f64,
}

impl ModGroupRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            display_name: row.get(2)?,
            confidence: row.get(3)?,
        })
    }
}

/// A mod the installer has extracted into the game tree.
#[derive(Debug, Clone)]
pub struct InstalledModRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub name: String,
    pub source_archive: Option<String>,
    pub disabled: bool,
    pub installed_version: Option<String>,
    pub nexus_mod_id: Option<i64>,
    pub nexus_file_id: Option<i64>,
    pub upload_timestamp: Option<i64>,
    pub mod_group_id: Option<i64>,
    pub installed_at: String,
}

impl InstalledModRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            name: row.get(2)?,
            source_archive: row.get(3)?,
            disabled: row.get::<_, i32>(4)? != 0,
            installed_version: row.get(5)?,
            nexus_mod_id: row.get(6)?,
            nexus_file_id: row.get(7)?,
            upload_timestamp: row.get(8)?,
            mod_group_id: row.get(9)?,
            installed_at: row.get(10)?,
        })
    }
}

/// One extracted path owned by an InstalledMod.
#[derive(Debug, Clone)]
pub struct InstalledModFileRecord {
    pub id: Option<i64>,
    pub installed_mod_id: i64,
    pub relative_path: String,
    pub disabled: bool,
}

impl InstalledModFileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            installed_mod_id: row.get(1)?,
            relative_path: row.get(2)?,
            disabled: row.get::<_, i32>(3)? != 0,
        })
    }
}

/// A catalog mod the system has learned about.
#[derive(Debug, Clone)]
pub struct NexusDownloadRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub nexus_mod_id: i64,
    pub mod_name: String,
    pub file_name: Option<String>,
    pub file_id: Option<i64>,
    pub version: Option<String>,
    pub is_tracked: bool,
    pub is_endorsed: bool,
    pub downloaded_at: Option<String>,
}

impl NexusDownloadRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            nexus_mod_id: row.get(2)?,
            mod_name: row.get(3)?,
            file_name: row.get(4)?,
            file_id: row.get(5)?,
            version: row.get(6)?,
            is_tracked: row.get::<_, i32>(7)? != 0,
            is_endorsed: row.get::<_, i32>(8)? != 0,
            downloaded_at: row.get(9)?,
        })
    }
}

/// Richer catalog metadata for one `nexus_mod_id`.
#[derive(Debug, Clone)]
pub struct NexusModMetaRecord {
    pub nexus_mod_id: i64,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub updated_at: Option<i64>,
    pub endorsement_count: i64,
    pub picture_url: Option<String>,
}

impl NexusModMetaRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            nexus_mod_id: row.get(0)?,
            author: row.get(1)?,
            summary: row.get(2)?,
            description: row.get(3)?,
            updated_at: row.get(4)?,
            endorsement_count: row.get(5)?,
            picture_url: row.get(6)?,
        })
    }
}

/// One file known to exist on the catalog page for a mod.
#[derive(Debug, Clone)]
pub struct NexusModFileRecord {
    pub id: Option<i64>,
    pub nexus_mod_id: i64,
    pub file_id: i64,
    pub file_name: String,
    pub version: Option<String>,
    pub category_id: i32,
    pub uploaded_timestamp: i64,
    pub file_size: i64,
}

impl NexusModFileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            nexus_mod_id: row.get(1)?,
            file_id: row.get(2)?,
            file_name: row.get(3)?,
            version: row.get(4)?,
            category_id: row.get(5)?,
            uploaded_timestamp: row.get(6)?,
            file_size: row.get(7)?,
        })
    }
}

/// The link between a ModGroup and a NexusDownload.
#[derive(Debug, Clone)]
pub struct ModNexusCorrelationRecord {
    pub id: Option<i64>,
    pub mod_group_id: i64,
    pub nexus_mod_id: i64,
    pub score: f64,
    pub method: String,
    pub confirmed_by_user: bool,
    pub reasoning: Option<String>,
}

impl ModNexusCorrelationRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            mod_group_id: row.get(1)?,
            nexus_mod_id: row.get(2)?,
            score: row.get(3)?,
            method: row.get(4)?,
            confirmed_by_user: row.get::<_, i32>(5)? != 0,
            reasoning: row.get(6)?,
        })
    }
}

/// One resource entry inside a RED `.archive` on disk (C8 index).
#[derive(Debug, Clone)]
pub struct ArchiveEntryIndexRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub installed_mod_id: Option<i64>,
    pub source_archive: String,
    pub resource_hash: i64,
    pub sha1_hex: String,
}

impl ArchiveEntryIndexRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            installed_mod_id: row.get(2)?,
            source_archive: row.get(3)?,
            resource_hash: row.get(4)?,
            sha1_hex: row.get(5)?,
        })
    }
}

/// One detected conflict (C8/C9).
#[derive(Debug, Clone)]
pub struct ConflictEvidenceRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub kind: String,
    pub severity: String,
    pub key: String,
    pub mod_a_id: i64,
    pub mod_b_id: i64,
    pub winner_mod_id: Option<i64>,
    pub detail_json: String,
}

impl ConflictEvidenceRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            kind: row.get(2)?,
            severity: row.get(3)?,
            key: row.get(4)?,
            mod_a_id: row.get(5)?,
            mod_b_id: row.get(6)?,
            winner_mod_id: row.get(7)?,
            detail_json: row.get(8)?,
        })
    }
}

/// A directed "winner must load before loser" edge (C11).
#[derive(Debug, Clone)]
pub struct LoadOrderPreferenceRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub winner_mod_id: i64,
    pub loser_mod_id: i64,
}

impl LoadOrderPreferenceRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            winner_mod_id: row.get(2)?,
            loser_mod_id: row.get(3)?,
        })
    }
}

/// A named snapshot of enabled/disabled state (C13).
#[derive(Debug, Clone)]
pub struct ProfileRecord {
    pub id: Option<i64>,
    pub game_id: String,
    pub name: String,
    pub created_at: String,
}

impl ProfileRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            game_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

/// One `(installed_mod, enabled)` binding within a Profile.
#[derive(Debug, Clone)]
pub struct ProfileEntryRecord {
    pub id: Option<i64>,
    pub profile_id: i64,
    pub installed_mod_id: i64,
    pub enabled: bool,
}

impl ProfileEntryRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            profile_id: row.get(1)?,
            installed_mod_id: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
        })
    }
}

/// A flat key/value row for small cached blobs (update-check cache, SSO keys).
#[derive(Debug, Clone)]
pub struct AppSettingRecord {
    pub key: String,
    pub value: String,
}

impl AppSettingRecord {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self { key: row.get(0)?, value: row.get(1)? })
    }
}
