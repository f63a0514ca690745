//! XDG-compliant path management

use directories::ProjectDirs;
use std::path::PathBuf;

/// Manages all application paths using XDG base directory specification
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: ProjectDirs,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let dirs = ProjectDirs::from("", "", "ripperkit")
            .expect("Failed to determine project directories");
        Self { dirs }
    }

    // ========== Config Paths ==========

    /// Config directory: ~/.config/ripperkit/
    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// Main config file: ~/.config/ripperkit/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    // ========== Data Paths ==========

    /// Data directory: ~/.local/share/ripperkit/
    pub fn data_dir(&self) -> PathBuf {
        self.dirs.data_dir().to_path_buf()
    }

    /// Database file: ~/.local/share/ripperkit/ripperkit.db
    pub fn database_file(&self) -> PathBuf {
        self.data_dir().join("ripperkit.db")
    }

    /// Staging directory root (holds `downloaded_mods/` per game)
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir().join("downloaded_mods")
    }

    /// Staged archives directory for a specific game
    pub fn game_staging_dir(&self, game_id: &str) -> PathBuf {
        self.staging_dir().join(game_id)
    }

    /// Profiles directory: ~/.local/share/ripperkit/profiles/
    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir().join("profiles")
    }

    /// Profile directory for a specific game
    pub fn game_profiles_dir(&self, game_id: &str) -> PathBuf {
        self.profiles_dir().join(game_id)
    }

    // ========== Cache Paths ==========

    /// Cache directory: ~/.cache/ripperkit/
    pub fn cache_dir(&self) -> PathBuf {
        self.dirs.cache_dir().to_path_buf()
    }

    /// Archive extraction scratch space (7z/rar staging): ~/.cache/ripperkit/extract/
    pub fn extract_cache_dir(&self) -> PathBuf {
        self.cache_dir().join("extract")
    }

    // ========== Utility Methods ==========

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.staging_dir())?;
        std::fs::create_dir_all(self.profiles_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        std::fs::create_dir_all(self.extract_cache_dir())?;
        Ok(())
    }
}
