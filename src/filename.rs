//! Filename parsing for staged mod archives (spec §4.1).
//!
//! Recognises the shapes Nexus Mods' CDN and casual renamers produce, and
//! orders version strings the way the catalog's own "is this newer" checks do.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Result of parsing a staged archive's filename. Every field but the
/// stripped display name is optional; the parser is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub nexus_mod_id: Option<i64>,
    pub name: String,
    pub version: Option<String>,
    pub upload_timestamp: Option<i64>,
}

fn cdn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Name-{modid}-{v...}-{unixTs}.ext ; version segments are dash-joined digits.
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?)-(?P<modid>\d+)-(?P<rest>[\d-]+)\.(?P<ext>[A-Za-z0-9]+)$")
            .unwrap()
    })
}

fn simple_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<id>\d+)[-_](?P<name>.+)\.(?P<ext>[A-Za-z0-9]+)$").unwrap())
}

const TIMESTAMP_MIN: i64 = 1_000_000_000;
const TIMESTAMP_MAX: i64 = 2_000_000_000;

/// Parse a staged archive's filename (with extension) into its components.
/// Total: always returns a value, falling back to the plain shape.
pub fn parse_filename(filename: &str) -> ParsedFilename {
    if let Some(parsed) = try_parse_cdn(filename) {
        return parsed;
    }
    if let Some(caps) = simple_id_re().captures(filename) {
        return ParsedFilename {
            nexus_mod_id: caps["id"].parse().ok(),
            name: caps["name"].replace(['_', '-'], " ").trim().to_string(),
            version: None,
            upload_timestamp: None,
        };
    }
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    ParsedFilename {
        nexus_mod_id: None,
        name: stem.replace(['_', '-'], " ").trim().to_string(),
        version: None,
        upload_timestamp: None,
    }
}

fn try_parse_cdn(filename: &str) -> Option<ParsedFilename> {
    let caps = cdn_re().captures(filename)?;
    let name = caps["name"].replace(['_', '-'], " ").trim().to_string();
    let mod_id: i64 = caps["modid"].parse().ok()?;
    let rest = &caps["rest"];
    let segments: Vec<&str> = rest.split('-').filter(|s| !s.is_empty()).collect();
    let (last, head) = segments.split_last()?;
    let last_ts: i64 = last.parse().ok()?;
    if !(TIMESTAMP_MIN..TIMESTAMP_MAX).contains(&last_ts) {
        return None;
    }
    let version = if head.is_empty() {
        None
    } else {
        Some(head.join("."))
    };
    Some(ParsedFilename {
        nexus_mod_id: Some(mod_id),
        name,
        version,
        upload_timestamp: Some(last_ts),
    })
}

/// A single dot/dash/underscore-separated segment of a version string,
/// comparable the way the catalog's own semver-ish strings compare:
/// numeric segments always outrank non-numeric ones, and are compared
/// numerically rather than lexicographically.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VersionSegment {
    Numeric(u64),
    Text(String),
}

impl PartialOrd for VersionSegment {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionSegment {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use VersionSegment::*;
        match (self, other) {
            (Numeric(a), Numeric(b)) => a.cmp(b),
            (Numeric(_), Text(_)) => std::cmp::Ordering::Greater,
            (Text(_), Numeric(_)) => std::cmp::Ordering::Less,
            (Text(a), Text(b)) => a.cmp(b),
        }
    }
}

fn split_segments(version: &str) -> Vec<VersionSegment> {
    version
        .split(|c| c == '.' || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(n) => VersionSegment::Numeric(n),
            Err(_) => VersionSegment::Text(s.to_ascii_lowercase()),
        })
        .collect()
}

/// `a > b`, with an empty suffix always outranking a non-empty one
/// (`1.0` beats `1.0-beta`) and numeric-major comparisons beating
/// lexicographic ones (`0.15.0 > 0.2.0`).
pub fn is_newer_version(a: &str, b: &str) -> bool {
    compare_versions(a, b) == std::cmp::Ordering::Greater
}

pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let (a_core, a_suffix) = split_prerelease(a);
    let (b_core, b_suffix) = split_prerelease(b);

    let a_segs = split_segments(a_core);
    let b_segs = split_segments(b_core);

    for i in 0..a_segs.len().max(b_segs.len()) {
        let a_seg = a_segs.get(i);
        let b_seg = b_segs.get(i);
        let ord = match (a_seg, b_seg) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => std::cmp::Ordering::Equal,
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }

    // Core versions tied: an empty prerelease suffix outranks a non-empty one.
    match (a_suffix.is_empty(), b_suffix.is_empty()) {
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        _ => a_suffix.cmp(b_suffix),
    }
}

/// Splits a version string at its first alphabetic character: everything
/// before is the purely-numeric core, everything from there on (including
/// any separator immediately preceding it) is the prerelease suffix.
/// `"1.0-beta2"` -> (`"1.0"`, `"-beta2"`); `"0.15.0"` -> (`"0.15.0"`, `""`).
fn split_prerelease(version: &str) -> (&str, &str) {
    match version.find(|c: char| c.is_ascii_alphabetic()) {
        None => (version, ""),
        Some(idx) => {
            let cut = version[..idx]
                .rfind(['-', '.', '_'])
                .map(|i| i + 1)
                .unwrap_or(idx);
            (&version[..cut], &version[cut..])
        }
    }
}
