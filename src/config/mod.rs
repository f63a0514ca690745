//! Configuration management for the engine
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/ripperkit/config.toml
//! - Data: ~/.local/share/ripperkit/
//! - Cache: ~/.cache/ripperkit/

mod paths;

pub use paths::Paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Active game identifier (e.g., "cyberpunk2077")
    pub active_game: Option<String>,

    /// Active profile name
    pub active_profile: Option<String>,

    /// Nexus Mods API key
    pub nexus_api_key: Option<String>,

    /// Concurrency and rate-limit tuning for the correlation pipeline and update checker
    pub concurrency: ConcurrencyConfig,

    /// Staging directory override for this invocation (set by `--mods-dir`)
    #[serde(skip)]
    pub staging_dir_override: Option<String>,

    /// Paths configuration
    #[serde(skip)]
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_game: None,
            active_profile: None,
            nexus_api_key: None,
            concurrency: ConcurrencyConfig::default(),
            staging_dir_override: None,
            paths: Paths::new(),
        }
    }
}

/// Bounded-concurrency and cache-TTL settings for the correlation pipeline (spec §5)
/// and the update checker (spec §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Concurrent catalog calls allowed during Tier 1/2/2.5/2.75/metadata refresh
    pub catalog_fanout: usize,
    /// Concurrent AI-assisted web search calls (Tier 4)
    pub ai_search_fanout: usize,
    /// Concurrent deterministic web search calls (Tier 4)
    pub web_search_fanout: usize,
    /// Abort a tier once the catalog's reported remaining hourly quota drops below this
    pub rate_limit_floor: u32,
    /// How long a cached `check_all_updates` result remains valid, in hours
    pub update_cache_ttl_hours: i64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            catalog_fanout: 5,
            ai_search_fanout: 5,
            web_search_fanout: 10,
            rate_limit_floor: 5,
            update_cache_ttl_hours: 24,
        }
    }
}

impl Config {
    /// Load configuration from disk or create default
    pub async fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            config.save().await?;
            config
        };

        config.paths = paths;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Resolve the staging directory for a game, honoring the CLI override.
    pub fn staging_dir_for(&self, game_id: &str) -> std::path::PathBuf {
        match &self.staging_dir_override {
            Some(dir) => std::path::PathBuf::from(dir),
            None => self.paths.game_staging_dir(game_id),
        }
    }
}
