//! Tier 4: web search fallback for mod groups that survive tiers 0.5-3
//! with no correlation (spec §4.7). Optional: callers that have no search
//! provider simply never invoke [`search_unmatched_groups`].

use super::{CatalogClient, CatalogModInfo};
use crate::db::{Database, ModGroupRecord, ModNexusCorrelationRecord};
use anyhow::Result;
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Semaphore;

const CONCURRENCY: usize = 5;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_QUERY_LEN: usize = 120;
const WEB_SEARCH_CONFIDENCE_CAP: f64 = 0.85;
const MIN_RESULT_SCORE: f64 = 0.5;
const RATE_LIMIT_FLOOR: u32 = 5;

fn nexus_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"nexusmods\.com/\w+/mods/(\d+)").unwrap())
}

/// One hit from a web search provider.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub url: String,
    pub score: f64,
}

/// A pluggable web search backend (e.g. a Tavily-style search API). No
/// production implementation ships in this engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: String) -> Result<Vec<SearchResult>>;
}

/// Summary of one web-search enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSearchSummary {
    pub searched: usize,
    pub matched: usize,
    pub unmatched: usize,
}

fn build_query(display_name: &str, catalog_domain: &str) -> String {
    let sanitized: String =
        display_name.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '.')).collect();
    let trimmed = sanitized.trim();
    let name = if trimmed.is_empty() { "mod" } else { &trimmed[..trimmed.len().min(MAX_QUERY_LEN)] };
    format!("{name} {catalog_domain} site:nexusmods.com")
}

fn extract_nexus_mod_id(url: &str) -> Option<i64> {
    nexus_url_re().captures(url)?.get(1)?.as_str().parse().ok()
}

/// Search the web for every ModGroup in `game_id` with no existing
/// correlation, capped at `max_searches` queries ordered by group
/// confidence descending, and record a correlation for each confident hit.
pub async fn search_unmatched_groups(
    db: &Database,
    search_client: &dyn WebSearchClient,
    catalog_client: &dyn CatalogClient,
    game_id: &str,
    catalog_domain: &str,
    max_searches: usize,
) -> Result<WebSearchSummary> {
    let groups = db.get_mod_groups(game_id)?;
    let correlations = db.get_correlations_for_game(game_id)?;
    let matched_group_ids: std::collections::HashSet<i64> =
        correlations.iter().map(|c| c.mod_group_id).collect();

    let mut unmatched: Vec<ModGroupRecord> =
        groups.into_iter().filter(|g| g.id.map(|id| !matched_group_ids.contains(&id)).unwrap_or(false)).collect();
    unmatched.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    unmatched.truncate(max_searches);

    if unmatched.is_empty() {
        return Ok(WebSearchSummary { searched: 0, matched: 0, unmatched: 0 });
    }

    let semaphore = Semaphore::new(CONCURRENCY);
    let search_futs = unmatched.iter().map(|group| {
        let query = build_query(&group.display_name, catalog_domain);
        let sem = &semaphore;
        async move {
            let _permit = sem.acquire().await.ok()?;
            let results = search_client.search(query).await.ok()?;
            results
                .into_iter()
                .find_map(|r| {
                    let nexus_mod_id = extract_nexus_mod_id(&r.url)?;
                    (r.score > MIN_RESULT_SCORE).then_some((nexus_mod_id, r.score.min(WEB_SEARCH_CONFIDENCE_CAP)))
                })
                .map(|(nexus_mod_id, score)| (group.id.unwrap(), nexus_mod_id, score))
        }
    });

    let found: Vec<(i64, i64, f64)> =
        match tokio::time::timeout(SEARCH_TIMEOUT, futures::future::join_all(search_futs)).await {
            Ok(results) => results.into_iter().flatten().collect(),
            Err(_) => Vec::new(),
        };

    let searched = unmatched.len();
    let mut created = 0usize;
    let mut known_nexus_ids: std::collections::HashSet<i64> =
        db.get_nexus_downloads(game_id)?.iter().map(|d| d.nexus_mod_id).collect();

    for (group_id, nexus_mod_id, score) in found {
        if !known_nexus_ids.contains(&nexus_mod_id) {
            if let Some(remaining) = catalog_client.hourly_rate_limit_remaining().await {
                if remaining < RATE_LIMIT_FLOOR {
                    break;
                }
            }
            let Ok(info) = catalog_client.mod_info(nexus_mod_id).await else {
                continue;
            };
            upsert_catalog_download(db, game_id, &info)?;
            known_nexus_ids.insert(nexus_mod_id);
        }

        db.upsert_correlation(&ModNexusCorrelationRecord {
            id: None,
            mod_group_id: group_id,
            nexus_mod_id,
            score,
            method: "web_search".to_string(),
            confirmed_by_user: false,
            reasoning: Some(format!("web search hit for nexus mod {nexus_mod_id}")),
        })?;
        created += 1;
    }

    Ok(WebSearchSummary { searched, matched: created, unmatched: searched - created })
}

fn upsert_catalog_download(db: &Database, game_id: &str, info: &CatalogModInfo) -> Result<()> {
    db.upsert_nexus_download(&crate::db::NexusDownloadRecord {
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
    Ok(())
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
    fn extracts_nexus_mod_id_from_url() {
        assert_eq!(extract_nexus_mod_id("https://www.nexusmods.com/cyberpunk2077/mods/9001"), Some(9001));
        assert_eq!(extract_nexus_mod_id("https://example.com/nope"), None);
    }

    #[test]
    fn build_query_strips_punctuation_and_caps_length() {
        let query = build_query("Cool Mod! (v2.0) #1", "cyberpunk2077");
        assert_eq!(query, "Cool Mod v2.0 1 cyberpunk2077 site:nexusmods.com");
    }

    #[test]
    fn build_query_falls_back_to_mod_when_name_is_all_punctuation() {
        let query = build_query("!!!", "cyberpunk2077");
        assert_eq!(query, "mod cyberpunk2077 site:nexusmods.com");
    }

    #[tokio::test]
    async fn no_unmatched_groups_yields_zero_summary() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        let search = MockWebSearchClient::new();
        let catalog = super::super::MockCatalogClient::new();
        let summary =
            search_unmatched_groups(&db, &search, &catalog, "cp", "cyberpunk2077", 50).await.unwrap();
        assert_eq!(summary, WebSearchSummary { searched: 0, matched: 0, unmatched: 0 });
    }

    #[tokio::test]
    async fn confident_hit_creates_a_correlation() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.insert_mod_group(&ModGroupRecord {
            id: None,
            game_id: "cp".to_string(),
            display_name: "Obscure Mod".to_string(),
            confidence: 1.0,
        })
        .unwrap();

        let mut search = MockWebSearchClient::new();
        search.expect_search().returning(|_| {
            Ok(vec![SearchResult {
                url: "https://www.nexusmods.com/cyberpunk2077/mods/4242".to_string(),
                score: 0.9,
            }])
        });
        let mut catalog = super::super::MockCatalogClient::new();
        catalog.expect_hourly_rate_limit_remaining().returning(|| None);
        catalog.expect_mod_info().returning(|_| {
            Ok(CatalogModInfo {
                nexus_mod_id: 4242,
                name: "Obscure Mod".to_string(),
                file_id: None,
                file_name: None,
                version: None,
            })
        });

        let summary =
            search_unmatched_groups(&db, &search, &catalog, "cp", "cyberpunk2077", 50).await.unwrap();
        assert_eq!(summary.matched, 1);
        let correlations = db.get_correlations_for_game("cp").unwrap();
        assert_eq!(correlations[0].method, "web_search");
        assert!(correlations[0].score <= WEB_SEARCH_CONFIDENCE_CAP);
    }

    #[tokio::test]
    async fn low_score_results_are_ignored() {
        let db = Database::open_in_memory().unwrap();
        setup_game(&db);
        db.insert_mod_group(&ModGroupRecord {
            id: None,
            game_id: "cp".to_string(),
            display_name: "Obscure Mod".to_string(),
            confidence: 1.0,
        })
        .unwrap();

        let mut search = MockWebSearchClient::new();
        search.expect_search().returning(|_| {
            Ok(vec![SearchResult {
                url: "https://www.nexusmods.com/cyberpunk2077/mods/4242".to_string(),
                score: 0.2,
            }])
        });
        let catalog = super::super::MockCatalogClient::new();

        let summary =
            search_unmatched_groups(&db, &search, &catalog, "cp", "cyberpunk2077", 50).await.unwrap();
        assert_eq!(summary.matched, 0);
    }
}
