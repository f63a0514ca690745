//! The `Game` entity (spec §3) and the known RED-engine root layout (spec §4.4).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The set of top-level directories the layout detector and installer recognise
/// as belonging to the mod surface of a RED-engine game. Case-insensitive.
pub const KNOWN_MOD_ROOTS: &[&str] = &["archive", "bin", "red4ext", "r6", "mods"];

/// A configured mod-management target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    /// Stable identifier, e.g. "cyberpunk2077"
    pub id: String,
    /// Human display name
    pub name: String,
    /// Catalog domain identifier (Nexus "game domain name")
    pub catalog_domain: String,
    /// Filesystem root of the installed game
    pub install_path: PathBuf,
    /// Relative subtrees under `install_path` the engine treats as the mod surface,
    /// in the order conflicts/paths should be reasoned about.
    pub mod_paths: Vec<String>,
}

impl Game {
    /// The concrete target this engine ships calibrated for.
    pub fn cyberpunk2077(install_path: impl Into<PathBuf>) -> Self {
        Self {
            id: "cyberpunk2077".to_string(),
            name: "Cyberpunk 2077".to_string(),
            catalog_domain: "cyberpunk2077".to_string(),
            install_path: install_path.into(),
            mod_paths: vec![
                "archive/pc/mod".to_string(),
                "bin/x64/plugins".to_string(),
                "red4ext".to_string(),
                "r6/scripts".to_string(),
                "r6/tweaks".to_string(),
                "mods".to_string(),
            ],
        }
    }

    /// Build a `Game` from a stored `GameRecord`, decoding `mod_paths_json`.
    pub fn from_record(record: &crate::db::GameRecord) -> anyhow::Result<Self> {
        let mod_paths: Vec<String> = serde_json::from_str(&record.mod_paths_json)
            .map_err(|e| anyhow::anyhow!("invalid mod_paths_json for game '{}': {e}", record.id))?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            catalog_domain: record.catalog_domain.clone(),
            install_path: PathBuf::from(&record.install_path),
            mod_paths,
        })
    }

    /// The folder where downloadable archives are staged, next to the game install.
    pub fn staging_dir(&self) -> PathBuf {
        self.install_path.join("downloaded_mods")
    }

    /// The `archive/pc/mod` directory, where `modlist.txt` and `.archive` files live.
    pub fn archive_mod_dir(&self) -> PathBuf {
        self.install_path.join("archive").join("pc").join("mod")
    }

    /// Absolute path for a relative mod-surface path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.install_path.join(relative)
    }

    /// Whether `relative` (forward-slash, no leading slash) falls under one of
    /// this game's configured mod paths.
    pub fn owns_path(&self, relative: &str) -> bool {
        let normalized = normalize_separators(relative);
        self.mod_paths
            .iter()
            .any(|p| normalized.eq_ignore_ascii_case(p) || starts_with_ci(&normalized, p))
    }
}

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

fn starts_with_ci(haystack: &str, prefix: &str) -> bool {
    let haystack_lower = haystack.to_ascii_lowercase();
    let prefix_lower = prefix.to_ascii_lowercase();
    haystack_lower == prefix_lower
        || haystack_lower.starts_with(&format!("{prefix_lower}/"))
}

/// Is `root` (a single path segment, lowercase-compared) one of the known
/// RED-engine top-level mod roots?
pub fn is_known_root(root: &str) -> bool {
    KNOWN_MOD_ROOTS.iter().any(|r| r.eq_ignore_ascii_case(root))
}

/// First path segment of a normalized, forward-slash relative path.
pub fn first_segment(path: &str) -> Option<&str> {
    let normalized = path.trim_start_matches('/');
    normalized.split('/').next().filter(|s| !s.is_empty())
}

/// Helper used by the layout detector and installer alike: strip a wrapper
/// folder prefix from an archive-internal path, if present.
pub fn strip_wrapper(path: &str, wrapper: &str) -> String {
    let normalized = normalize_separators(path);
    let prefix = format!("{}/", normalize_separators(wrapper));
    if let Some(stripped) = normalized.strip_prefix(&prefix) {
        stripped.to_string()
    } else {
        normalized
    }
}

/// Join archive-relative path segments the way entries in a zip/7z/rar store them,
/// guarding against path traversal. Returns `None` if the resolved path would
/// escape `base`.
pub fn safe_join(base: &Path, relative: &str) -> Option<PathBuf> {
    let normalized = normalize_separators(relative);
    let mut result = base.to_path_buf();
    for component in normalized.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            seg => result.push(seg),
        }
    }
    result.strip_prefix(base).ok()?;
    Some(result)
}
