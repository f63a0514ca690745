//! Mod <-> catalog correlation pipeline (spec §4.7). Five tiers run in
//! order, each upgrading NexusDownload/ModNexusCorrelation rows a little
//! further before falling back to the next, cheaper-to-skip tier.

mod name_score;
mod tier0_metadata;
mod tier25;
mod tier3;
pub mod web_search;

pub use name_score::{compute_name_score, normalize, token_jaccard, ACCEPT_THRESHOLD};
pub use tier0_metadata::{inspect_archive, ArchiveMetadataHit};
pub use tier25::{category_priority, correlate_endorsed_by_name, is_skippable_category, match_catalog_filename};
pub use tier3::{correlate_by_name, CorrelationSummary};

use crate::archive::ArchiveReader;
use crate::db::{Database, NexusDownloadRecord, NexusModMetaRecord};
use crate::filename::parse_filename;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// An archive staged for installation, not yet extracted.
#[derive(Debug, Clone)]
pub struct StagedArchive {
    pub path: PathBuf,
    pub filename: String,
}

impl StagedArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Self { path, filename }
    }
}

/// Catalog metadata returned by a successful lookup, whether by id or MD5.
#[derive(Debug, Clone)]
pub struct CatalogModInfo {
    pub nexus_mod_id: i64,
    pub name: String,
    pub file_id: Option<i64>,
    pub file_name: Option<String>,
    pub version: Option<String>,
}

/// One file entry on a catalog mod page.
#[derive(Debug, Clone)]
pub struct CatalogFileInfo {
    pub file_id: i64,
    pub file_name: String,
    pub version: Option<String>,
    pub category_id: i32,
    pub uploaded_timestamp: i64,
    pub file_size: i64,
}

/// The `file_updates` chain entry on a `get_mod_files` response: an old
/// file id was superseded by a new one.
#[derive(Debug, Clone, Copy)]
pub struct CatalogFileUpdate {
    pub old_file_id: i64,
    pub new_file_id: i64,
}

/// Full mod-page metadata, for refreshing `NexusModMeta` (spec §4.12).
/// Richer than [`CatalogModInfo`], which only carries what correlation needs.
#[derive(Debug, Clone)]
pub struct CatalogModMeta {
    pub nexus_mod_id: i64,
    pub name: String,
    pub version: Option<String>,
    pub author: String,
    pub summary: String,
    pub endorsement_count: i64,
    pub updated_timestamp: Option<i64>,
    pub picture_url: String,
}

/// One entry from `get_updated_mods`: a mod with a file upload in the window.
#[derive(Debug, Clone, Copy)]
pub struct CatalogUpdateEntry {
    pub nexus_mod_id: i64,
    pub latest_file_update: i64,
}

/// The catalog-facing contract the correlation pipeline and update checker
/// need. No production implementation ships in this engine (spec §1
/// non-goal); a caller supplies one (e.g. a Nexus Mods API client) or runs
/// tests against the generated mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    async fn mod_info(&self, nexus_mod_id: i64) -> Result<CatalogModInfo>;
    async fn md5_search(&self, md5_hex: String) -> Result<Option<CatalogModInfo>>;
    async fn list_files(&self, nexus_mod_id: i64) -> Result<Vec<CatalogFileInfo>>;
    async fn hourly_rate_limit_remaining(&self) -> Option<u32>;

    /// Full mod-page metadata for `NexusModMeta` refresh (spec §4.12).
    async fn mod_meta(&self, game_domain: &str, nexus_mod_id: i64) -> Result<CatalogModMeta>;
    /// Every file on a mod's page, plus the `file_updates` supersession chain.
    async fn mod_files(
        &self,
        game_domain: &str,
        nexus_mod_id: i64,
    ) -> Result<(Vec<CatalogFileInfo>, Vec<CatalogFileUpdate>)>;
    /// Mods with an upload in the last `period` (e.g. `"1m"`).
    async fn updated_mods(&self, game_domain: &str, period: &str) -> Result<Vec<CatalogUpdateEntry>>;
}

/// Tier 1: for every staged archive whose filename parses as a Nexus CDN
/// shape, fetch and upsert catalog metadata.
pub async fn tier1_filename_id_enrichment(
    db: &Database,
    client: &dyn CatalogClient,
    game_id: &str,
    archives: &[StagedArchive],
) -> Result<usize> {
    let mut enriched = 0;
    for archive in archives {
        let parsed = parse_filename(&archive.filename);
        let Some(nexus_mod_id) = parsed.nexus_mod_id else {
            continue;
        };
        let info = client.mod_info(nexus_mod_id).await?;
        upsert_catalog_info(db, game_id, &info)?;
        enriched += 1;
    }
    Ok(enriched)
}

/// Tier 2: MD5-match each staged archive against the catalog.
pub async fn tier2_md5_matching(
    db: &Database,
    client: &dyn CatalogClient,
    game_id: &str,
    archives: &[StagedArchive],
) -> Result<usize> {
    let mut matched = 0;
    for archive in archives {
        let bytes = std::fs::read(&archive.path)
            .with_context(|| format!("reading {} for md5", archive.path.display()))?;
        let digest = md5::compute(&bytes);
        let hex = format!("{digest:x}");
        if let Some(info) = client.md5_search(hex).await? {
            upsert_catalog_info(db, game_id, &info)?;
            matched += 1;
        }
    }
    Ok(matched)
}

fn upsert_catalog_info(db: &Database, game_id: &str, info: &CatalogModInfo) -> Result<()> {
    db.upsert_nexus_download(&NexusDownloadRecord {
        id: None,
        game_id: game_id.to_string(),
        nexus_mod_id: info.nexus_mod_id,
        mod_name: info.name.clone(),
        file_name: info.file_name.clone(),
        file_id: info.file_id,
        version: info.version.clone(),
        is_tracked: false,
        is_endorsed: false,
        downloaded_at: None,
    })?;
    db.upsert_nexus_mod_meta(&NexusModMetaRecord {
        nexus_mod_id: info.nexus_mod_id,
        author: None,
        summary: None,
        description: None,
        updated_at: None,
        endorsement_count: 0,
        picture_url: None,
    })?;
    Ok(())
}

/// Tier 0.5 over a batch of staged archives: open each once, and when it
/// carries FOMOD/RED-mod metadata with a catalog id, record a direct
/// correlation at score 0.95.
pub fn tier0_archive_metadata(
    db: &Database,
    game_id: &str,
    archives: &[StagedArchive],
) -> Result<usize> {
    let mut hits = 0;
    for archive in archives {
        let Ok(mut reader) = ArchiveReader::open(&archive.path) else {
            continue;
        };
        if let Some(ArchiveMetadataHit::Fomod { nexus_mod_id: Some(nexus_mod_id) }) = inspect_archive(&mut reader)? {
            upsert_catalog_info(
                db,
                game_id,
                &CatalogModInfo { nexus_mod_id, name: archive.filename.clone(), file_id: None, file_name: None, version: None },
            )?;
            hits += 1;
        }
    }
    Ok(hits)
}

/// Runs tiers 1-3 (tier 0.5 and the optional tier 4 are driven separately:
/// tier 0.5 needs no network and should run before staging completes; tier
/// 4 needs caller-supplied search collaborators, see [`web_search`]).
pub async fn run_correlation_pipeline(
    db: &Database,
    client: &dyn CatalogClient,
    game_id: &str,
    archives: &[StagedArchive],
) -> Result<CorrelationSummary> {
    tier1_filename_id_enrichment(db, client, game_id, archives).await?;
    tier2_md5_matching(db, client, game_id, archives).await?;
    correlate_endorsed_by_name(db, game_id)?;
    correlate_by_name(db, game_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{GameRecord, ModGroupRecord};

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

    #[tokio::test]
    async fn tier1_enriches_nexus_cdn_shaped_filenames() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("CoolMod-137-1-0-1700000000.zip");
        std::fs::write(&archive_path, b"dummy").unwrap();

        let mut mock = MockCatalogClient::new();
        mock.expect_mod_info().withf(|id| *id == 137).returning(|_| {
            Ok(CatalogModInfo {
                nexus_mod_id: 137,
                name: "Cool Mod".to_string(),
                file_id: None,
                file_name: None,
                version: Some("1.0".to_string()),
            })
        });

        let enriched =
            tier1_filename_id_enrichment(&db, &mock, "cp", &[StagedArchive::new(&archive_path)]).await.unwrap();
        assert_eq!(enriched, 1);
        let downloads = db.get_nexus_downloads("cp").unwrap();
        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].mod_name, "Cool Mod");
    }

    #[tokio::test]
    async fn tier1_skips_filenames_with_no_catalog_id() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("Just A Mod.rar");
        std::fs::write(&archive_path, b"dummy").unwrap();

        let mock = MockCatalogClient::new();
        let enriched =
            tier1_filename_id_enrichment(&db, &mock, "cp", &[StagedArchive::new(&archive_path)]).await.unwrap();
        assert_eq!(enriched, 0);
    }

    #[tokio::test]
    async fn tier2_records_md5_hit() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("unknown.zip");
        std::fs::write(&archive_path, b"dummy").unwrap();

        let mut mock = MockCatalogClient::new();
        mock.expect_md5_search().returning(|_| {
            Ok(Some(CatalogModInfo {
                nexus_mod_id: 42,
                name: "Matched By Hash".to_string(),
                file_id: Some(9),
                file_name: Some("unknown.zip".to_string()),
                version: Some("2.0".to_string()),
            }))
        });

        let matched = tier2_md5_matching(&db, &mock, "cp", &[StagedArchive::new(&archive_path)]).await.unwrap();
        assert_eq!(matched, 1);
        let downloads = db.get_nexus_downloads("cp").unwrap();
        assert_eq!(downloads[0].nexus_mod_id, 42);
        assert_eq!(downloads[0].file_id, Some(9));
    }

    #[test]
    fn staged_archive_derives_filename_from_path() {
        let staged = StagedArchive::new("/staging/CoolMod-1-0-1700000000.zip");
        assert_eq!(staged.filename, "CoolMod-1-0-1700000000.zip");
    }

    #[test]
    fn tier0_records_direct_fomod_correlation() {
        use std::io::Write;
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let _ = ModGroupRecord { id: None, game_id: "cp".to_string(), display_name: String::new(), confidence: 0.0 };

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("mod.zip");
        let file = std::fs::File::create(&archive_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        writer.start_file("fomod/info.xml", opts).unwrap();
        writer.write_all(b"<fomod><Id>555</Id></fomod>").unwrap();
        writer.finish().unwrap();

        let hits = tier0_archive_metadata(&db, "cp", &[StagedArchive::new(&archive_path)]).unwrap();
        assert_eq!(hits, 1);
        let downloads = db.get_nexus_downloads("cp").unwrap();
        assert_eq!(downloads[0].nexus_mod_id, 555);
    }
}
