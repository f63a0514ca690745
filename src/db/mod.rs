//! SQLite persistence for the correlation/conflict/load-order engine (spec §3).

mod schema;

pub use schema::*;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Database wrapper with thread-safe access.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).context("failed to open database")?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database, used by tests and by one-shot CLI
    /// invocations that don't need persistence across runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                catalog_domain TEXT NOT NULL,
                install_path TEXT NOT NULL,
                mod_paths_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mod_files (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                mod_group_id INTEGER,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                FOREIGN KEY (mod_group_id) REFERENCES mod_groups(id) ON DELETE SET NULL,
                UNIQUE(game_id, relative_path)
            );

            CREATE TABLE IF NOT EXISTS mod_groups (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                confidence REAL NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS installed_mods (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                name TEXT NOT NULL,
                source_archive TEXT,
                disabled INTEGER NOT NULL DEFAULT 0,
                installed_version TEXT,
                nexus_mod_id INTEGER,
                nexus_file_id INTEGER,
                upload_timestamp INTEGER,
                mod_group_id INTEGER,
                installed_at TEXT NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                FOREIGN KEY (mod_group_id) REFERENCES mod_groups(id) ON DELETE SET NULL,
                UNIQUE(game_id, name)
            );

            CREATE TABLE IF NOT EXISTS installed_mod_files (
                id INTEGER PRIMARY KEY,
                installed_mod_id INTEGER NOT NULL,
                relative_path TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (installed_mod_id) REFERENCES installed_mods(id) ON DELETE CASCADE,
                UNIQUE(installed_mod_id, relative_path)
            );

            CREATE TABLE IF NOT EXISTS nexus_downloads (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                nexus_mod_id INTEGER NOT NULL,
                mod_name TEXT NOT NULL,
                file_name TEXT,
                file_id INTEGER,
                version TEXT,
                is_tracked INTEGER NOT NULL DEFAULT 0,
                is_endorsed INTEGER NOT NULL DEFAULT 0,
                downloaded_at TEXT,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                UNIQUE(game_id, nexus_mod_id)
            );

            CREATE TABLE IF NOT EXISTS nexus_mod_meta (
                nexus_mod_id INTEGER PRIMARY KEY,
                author TEXT,
                summary TEXT,
                description TEXT,
                updated_at INTEGER,
                endorsement_count INTEGER NOT NULL DEFAULT 0,
                picture_url TEXT
            );

            CREATE TABLE IF NOT EXISTS nexus_mod_files (
                id INTEGER PRIMARY KEY,
                nexus_mod_id INTEGER NOT NULL,
                file_id INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                version TEXT,
                category_id INTEGER NOT NULL,
                uploaded_timestamp INTEGER NOT NULL,
                file_size INTEGER NOT NULL,
                UNIQUE(nexus_mod_id, file_id)
            );

            CREATE TABLE IF NOT EXISTS mod_nexus_correlations (
                id INTEGER PRIMARY KEY,
                mod_group_id INTEGER NOT NULL,
                nexus_mod_id INTEGER NOT NULL,
                score REAL NOT NULL,
                method TEXT NOT NULL,
                confirmed_by_user INTEGER NOT NULL DEFAULT 0,
                reasoning TEXT,
                FOREIGN KEY (mod_group_id) REFERENCES mod_groups(id) ON DELETE CASCADE,
                UNIQUE(mod_group_id, nexus_mod_id)
            );

            CREATE TABLE IF NOT EXISTS archive_entry_index (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                installed_mod_id INTEGER,
                source_archive TEXT NOT NULL,
                resource_hash INTEGER NOT NULL,
                sha1_hex TEXT NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                FOREIGN KEY (installed_mod_id) REFERENCES installed_mods(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS conflict_evidence (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                key TEXT NOT NULL,
                mod_a_id INTEGER NOT NULL,
                mod_b_id INTEGER NOT NULL,
                winner_mod_id INTEGER,
                detail_json TEXT NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS load_order_preferences (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                winner_mod_id INTEGER NOT NULL,
                loser_mod_id INTEGER NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                UNIQUE(game_id, winner_mod_id, loser_mod_id)
            );

            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY,
                game_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (game_id) REFERENCES games(id) ON DELETE CASCADE,
                UNIQUE(game_id, name)
            );

            CREATE TABLE IF NOT EXISTS profile_entries (
                id INTEGER PRIMARY KEY,
                profile_id INTEGER NOT NULL,
                installed_mod_id INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE,
                FOREIGN KEY (installed_mod_id) REFERENCES installed_mods(id) ON DELETE CASCADE,
                UNIQUE(profile_id, installed_mod_id)
            );

            CREATE TABLE IF NOT EXISTS app_settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mod_files_game ON mod_files(game_id);
            CREATE INDEX IF NOT EXISTS idx_mod_files_group ON mod_files(mod_group_id);
            CREATE INDEX IF NOT EXISTS idx_installed_mods_game ON installed_mods(game_id);
            CREATE INDEX IF NOT EXISTS idx_installed_mod_files_mod ON installed_mod_files(installed_mod_id);
            CREATE INDEX IF NOT EXISTS idx_nexus_downloads_game ON nexus_downloads(game_id);
            CREATE INDEX IF NOT EXISTS idx_archive_entry_index_hash ON archive_entry_index(game_id, resource_hash);
            CREATE INDEX IF NOT EXISTS idx_conflict_evidence_game ON conflict_evidence(game_id);
            CREATE INDEX IF NOT EXISTS idx_load_order_prefs_game ON load_order_preferences(game_id);
            CREATE INDEX IF NOT EXISTS idx_profile_entries_profile ON profile_entries(profile_id);
            "#,
        )
        .context("failed to initialize database schema")?;
        Ok(())
    }

    // ===== Games =====

    pub fn upsert_game(&self, g: &GameRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO games (id, name, catalog_domain, install_path, mod_paths_json)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name, catalog_domain = excluded.catalog_domain,
                 install_path = excluded.install_path, mod_paths_json = excluded.mod_paths_json"#,
            params![g.id, g.name, g.catalog_domain, g.install_path, g.mod_paths_json],
        )?;
        Ok(())
    }

    pub fn get_game(&self, game_id: &str) -> Result<Option<GameRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, catalog_domain, install_path, mod_paths_json FROM games WHERE id = ?1",
            params![game_id],
            |row| GameRecord::from_row(row),
        )
        .optional()
        .context("failed to query game")
    }

    // ===== ModFiles (C6 input) =====

    /// Replace the full ModFile set for a game (the scanner's "replaced wholesale on rescan" contract).
    pub fn replace_mod_files(&self, game_id: &str, files: &[(String, i64)]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM mod_files WHERE game_id = ?1", params![game_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO mod_files (game_id, relative_path, size_bytes) VALUES (?1, ?2, ?3)",
            )?;
            for (relative_path, size_bytes) in files {
                stmt.execute(params![game_id, relative_path, size_bytes])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_mod_files(&self, game_id: &str) -> Result<Vec<ModFileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, game_id, relative_path, size_bytes, mod_group_id FROM mod_files WHERE game_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ModFileRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn assign_mod_group(&self, mod_file_id: i64, mod_group_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE mod_files SET mod_group_id = ?1 WHERE id = ?2",
            params![mod_group_id, mod_file_id],
        )?;
        Ok(())
    }

    // ===== ModGroups (C6) =====

    pub fn insert_mod_group(&self, g: &ModGroupRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mod_groups (game_id, display_name, confidence) VALUES (?1, ?2, ?3)",
            params![g.game_id, g.display_name, g.confidence],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_mod_groups(&self, game_id: &str) -> Result<Vec<ModGroupRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, game_id, display_name, confidence FROM mod_groups WHERE game_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ModGroupRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_mod_groups(&self, game_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM mod_groups WHERE game_id = ?1", params![game_id])?;
        Ok(())
    }

    // ===== InstalledMods / InstalledModFiles (C10) =====

    pub fn insert_installed_mod(&self, m: &InstalledModRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO installed_mods
               (game_id, name, source_archive, disabled, installed_version,
                nexus_mod_id, nexus_file_id, upload_timestamp, mod_group_id, installed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                m.game_id,
                m.name,
                m.source_archive,
                m.disabled as i32,
                m.installed_version,
                m.nexus_mod_id,
                m.nexus_file_id,
                m.upload_timestamp,
                m.mod_group_id,
                m.installed_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_installed_mod(&self, game_id: &str, name: &str) -> Result<Option<InstalledModRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT id, game_id, name, source_archive, disabled, installed_version,
                      nexus_mod_id, nexus_file_id, upload_timestamp, mod_group_id, installed_at
               FROM installed_mods WHERE game_id = ?1 AND name = ?2"#,
            params![game_id, name],
            |row| InstalledModRecord::from_row(row),
        )
        .optional()
        .context("failed to query installed mod")
    }

    pub fn get_installed_mod_by_id(&self, id: i64) -> Result<Option<InstalledModRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT id, game_id, name, source_archive, disabled, installed_version,
                      nexus_mod_id, nexus_file_id, upload_timestamp, mod_group_id, installed_at
               FROM installed_mods WHERE id = ?1"#,
            params![id],
            |row| InstalledModRecord::from_row(row),
        )
        .optional()
        .context("failed to query installed mod")
    }

    pub fn get_installed_mods(&self, game_id: &str) -> Result<Vec<InstalledModRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, game_id, name, source_archive, disabled, installed_version,
                      nexus_mod_id, nexus_file_id, upload_timestamp, mod_group_id, installed_at
               FROM installed_mods WHERE game_id = ?1 ORDER BY name ASC"#,
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| InstalledModRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_installed_mod_disabled(&self, id: i64, disabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE installed_mods SET disabled = ?1 WHERE id = ?2",
            params![disabled as i32, id],
        )?;
        Ok(())
    }

    pub fn set_installed_mod_file_ids(
        &self,
        id: i64,
        nexus_mod_id: Option<i64>,
        nexus_file_id: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE installed_mods SET nexus_mod_id = ?1, nexus_file_id = ?2 WHERE id = ?3",
            params![nexus_mod_id, nexus_file_id, id],
        )?;
        Ok(())
    }

    pub fn set_installed_mod_group(&self, id: i64, mod_group_id: Option<i64>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE installed_mods SET mod_group_id = ?1 WHERE id = ?2",
            params![mod_group_id, id],
        )?;
        Ok(())
    }

    pub fn delete_installed_mod(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM installed_mods WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn insert_installed_mod_file(&self, f: &InstalledModFileRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO installed_mod_files (installed_mod_id, relative_path, disabled) VALUES (?1, ?2, ?3)",
            params![f.installed_mod_id, f.relative_path, f.disabled as i32],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_installed_mod_files(&self, installed_mod_id: i64) -> Result<Vec<InstalledModFileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, installed_mod_id, relative_path, disabled FROM installed_mod_files WHERE installed_mod_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![installed_mod_id], |row| InstalledModFileRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Find whichever InstalledMod currently owns `relative_path`, if any.
    pub fn find_owner_of_path(&self, game_id: &str, relative_path: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT f.installed_mod_id FROM installed_mod_files f
               JOIN installed_mods m ON m.id = f.installed_mod_id
               WHERE m.game_id = ?1 AND f.relative_path = ?2"#,
            params![game_id, relative_path],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query path ownership")
    }

    pub fn delete_installed_mod_file_by_path(&self, installed_mod_id: i64, relative_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM installed_mod_files WHERE installed_mod_id = ?1 AND relative_path = ?2",
            params![installed_mod_id, relative_path],
        )?;
        Ok(())
    }

    pub fn set_installed_mod_file_disabled(&self, id: i64, disabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE installed_mod_files SET disabled = ?1 WHERE id = ?2",
            params![disabled as i32, id],
        )?;
        Ok(())
    }

    // ===== NexusDownloads / NexusModMeta / NexusModFiles (C7/C12) =====

    pub fn upsert_nexus_download(&self, d: &NexusDownloadRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO nexus_downloads
               (game_id, nexus_mod_id, mod_name, file_name, file_id, version, is_tracked, is_endorsed, downloaded_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
               ON CONFLICT(game_id, nexus_mod_id) DO UPDATE SET
                 mod_name = excluded.mod_name, file_name = excluded.file_name,
                 file_id = excluded.file_id, is_tracked = excluded.is_tracked,
                 is_endorsed = excluded.is_endorsed, downloaded_at = excluded.downloaded_at"#,
            params![
                d.game_id,
                d.nexus_mod_id,
                d.mod_name,
                d.file_name,
                d.file_id,
                d.version,
                d.is_tracked as i32,
                d.is_endorsed as i32,
                d.downloaded_at,
            ],
        )?;
        conn.query_row(
            "SELECT id FROM nexus_downloads WHERE game_id = ?1 AND nexus_mod_id = ?2",
            params![d.game_id, d.nexus_mod_id],
            |row| row.get(0),
        )
        .context("failed to read back nexus_download id")
    }

    pub fn get_nexus_downloads(&self, game_id: &str) -> Result<Vec<NexusDownloadRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, game_id, nexus_mod_id, mod_name, file_name, file_id, version,
                      is_tracked, is_endorsed, downloaded_at
               FROM nexus_downloads WHERE game_id = ?1"#,
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| NexusDownloadRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn upsert_nexus_mod_meta(&self, m: &NexusModMetaRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO nexus_mod_meta
               (nexus_mod_id, author, summary, description, updated_at, endorsement_count, picture_url)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(nexus_mod_id) DO UPDATE SET
                 author = excluded.author, summary = excluded.summary, description = excluded.description,
                 updated_at = excluded.updated_at, endorsement_count = excluded.endorsement_count,
                 picture_url = excluded.picture_url"#,
            params![
                m.nexus_mod_id,
                m.author,
                m.summary,
                m.description,
                m.updated_at,
                m.endorsement_count,
                m.picture_url,
            ],
        )?;
        Ok(())
    }

    pub fn get_nexus_mod_meta(&self, nexus_mod_id: i64) -> Result<Option<NexusModMetaRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT nexus_mod_id, author, summary, description, updated_at, endorsement_count, picture_url
               FROM nexus_mod_meta WHERE nexus_mod_id = ?1"#,
            params![nexus_mod_id],
            |row| NexusModMetaRecord::from_row(row),
        )
        .optional()
        .context("failed to query nexus mod meta")
    }

    pub fn replace_nexus_mod_files(&self, nexus_mod_id: i64, files: &[NexusModFileRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM nexus_mod_files WHERE nexus_mod_id = ?1", params![nexus_mod_id])?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO nexus_mod_files
                   (nexus_mod_id, file_id, file_name, version, category_id, uploaded_timestamp, file_size)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            )?;
            for f in files {
                stmt.execute(params![
                    nexus_mod_id,
                    f.file_id,
                    f.file_name,
                    f.version,
                    f.category_id,
                    f.uploaded_timestamp,
                    f.file_size,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_nexus_mod_files(&self, nexus_mod_id: i64) -> Result<Vec<NexusModFileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, nexus_mod_id, file_id, file_name, version, category_id, uploaded_timestamp, file_size
               FROM nexus_mod_files WHERE nexus_mod_id = ?1"#,
        )?;
        let rows = stmt
            .query_map(params![nexus_mod_id], |row| NexusModFileRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== ModNexusCorrelations (C7) =====

    pub fn upsert_correlation(&self, c: &ModNexusCorrelationRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO mod_nexus_correlations
               (mod_group_id, nexus_mod_id, score, method, confirmed_by_user, reasoning)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(mod_group_id, nexus_mod_id) DO UPDATE SET
                 score = excluded.score, method = excluded.method, reasoning = excluded.reasoning
               WHERE mod_nexus_correlations.confirmed_by_user = 0"#,
            params![c.mod_group_id, c.nexus_mod_id, c.score, c.method, c.confirmed_by_user as i32, c.reasoning],
        )?;
        Ok(())
    }

    pub fn get_correlations_for_game(&self, game_id: &str) -> Result<Vec<ModNexusCorrelationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.mod_group_id, c.nexus_mod_id, c.score, c.method, c.confirmed_by_user, c.reasoning
               FROM mod_nexus_correlations c
               JOIN mod_groups g ON g.id = c.mod_group_id
               WHERE g.game_id = ?1"#,
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ModNexusCorrelationRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_correlation(&self, mod_group_id: i64, nexus_mod_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM mod_nexus_correlations WHERE mod_group_id = ?1 AND nexus_mod_id = ?2 AND confirmed_by_user = 0",
            params![mod_group_id, nexus_mod_id],
        )?;
        Ok(())
    }

    // ===== ArchiveEntryIndex (C8) =====

    pub fn replace_archive_entry_index(
        &self,
        game_id: &str,
        installed_mod_id: Option<i64>,
        source_archive: &str,
        entries: &[(i64, String)],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM archive_entry_index WHERE game_id = ?1 AND source_archive = ?2",
            params![game_id, source_archive],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO archive_entry_index (game_id, installed_mod_id, source_archive, resource_hash, sha1_hex)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
            )?;
            for (resource_hash, sha1_hex) in entries {
                stmt.execute(params![game_id, installed_mod_id, source_archive, resource_hash, sha1_hex])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_archive_entry_index_for_mod(&self, installed_mod_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM archive_entry_index WHERE installed_mod_id = ?1",
            params![installed_mod_id],
        )?;
        Ok(())
    }

    pub fn get_archive_entry_index(&self, game_id: &str) -> Result<Vec<ArchiveEntryIndexRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, game_id, installed_mod_id, source_archive, resource_hash, sha1_hex
               FROM archive_entry_index WHERE game_id = ?1"#,
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ArchiveEntryIndexRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== ConflictEvidence (C8/C9) =====

    /// Conflict evidence is rebuilt end-to-end on each scan; never partially updated.
    pub fn replace_conflict_evidence(&self, game_id: &str, evidence: &[ConflictEvidenceRecord]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM conflict_evidence WHERE game_id = ?1", params![game_id])?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO conflict_evidence
                   (game_id, kind, severity, key, mod_a_id, mod_b_id, winner_mod_id, detail_json)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            )?;
            for e in evidence {
                stmt.execute(params![
                    game_id, e.kind, e.severity, e.key, e.mod_a_id, e.mod_b_id, e.winner_mod_id, e.detail_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_conflict_evidence(&self, game_id: &str) -> Result<Vec<ConflictEvidenceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT id, game_id, kind, severity, key, mod_a_id, mod_b_id, winner_mod_id, detail_json
               FROM conflict_evidence WHERE game_id = ?1"#,
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ConflictEvidenceRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== LoadOrderPreferences (C11) =====

    /// Record `winner > loser`, first removing any existing opposite edge.
    pub fn set_load_order_preference(&self, game_id: &str, winner_mod_id: i64, loser_mod_id: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM load_order_preferences WHERE game_id = ?1 AND winner_mod_id = ?2 AND loser_mod_id = ?3",
            params![game_id, loser_mod_id, winner_mod_id],
        )?;
        tx.execute(
            r#"INSERT INTO load_order_preferences (game_id, winner_mod_id, loser_mod_id)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(game_id, winner_mod_id, loser_mod_id) DO NOTHING"#,
            params![game_id, winner_mod_id, loser_mod_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_load_order_preferences(&self, game_id: &str) -> Result<Vec<LoadOrderPreferenceRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, game_id, winner_mod_id, loser_mod_id FROM load_order_preferences WHERE game_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| LoadOrderPreferenceRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Remove a single preference edge. Returns whether a row was deleted.
    pub fn delete_load_order_preference(
        &self,
        game_id: &str,
        winner_mod_id: i64,
        loser_mod_id: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM load_order_preferences WHERE game_id = ?1 AND winner_mod_id = ?2 AND loser_mod_id = ?3",
            params![game_id, winner_mod_id, loser_mod_id],
        )?;
        Ok(affected > 0)
    }

    pub fn clear_load_order_preferences(&self, game_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM load_order_preferences WHERE game_id = ?1", params![game_id])?;
        Ok(())
    }

    // ===== Profiles / ProfileEntries (C13) =====

    pub fn insert_profile(&self, p: &ProfileRecord) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profiles (game_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![p.game_id, p.name, p.created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_profile(&self, game_id: &str, name: &str) -> Result<Option<ProfileRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, game_id, name, created_at FROM profiles WHERE game_id = ?1 AND name = ?2",
            params![game_id, name],
            |row| ProfileRecord::from_row(row),
        )
        .optional()
        .context("failed to query profile")
    }

    pub fn get_profiles(&self, game_id: &str) -> Result<Vec<ProfileRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, game_id, name, created_at FROM profiles WHERE game_id = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map(params![game_id], |row| ProfileRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_profile(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn replace_profile_entries(&self, profile_id: i64, entries: &[(i64, bool)]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM profile_entries WHERE profile_id = ?1", params![profile_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO profile_entries (profile_id, installed_mod_id, enabled) VALUES (?1, ?2, ?3)",
            )?;
            for (installed_mod_id, enabled) in entries {
                stmt.execute(params![profile_id, installed_mod_id, *enabled as i32])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_profile_entries(&self, profile_id: i64) -> Result<Vec<ProfileEntryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, profile_id, installed_mod_id, enabled FROM profile_entries WHERE profile_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![profile_id], |row| ProfileEntryRecord::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ===== AppSettings (C12 cache, SSO) =====

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT value FROM app_settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .context("failed to query setting")
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO app_settings (key, value) VALUES (?1, ?2)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            params![key, value],
        )?;
        Ok(())
    }
}
