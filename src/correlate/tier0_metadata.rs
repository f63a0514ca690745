//! Tier 0.5: archive metadata inspection (spec §4.7). Opens a staged
//! archive once and looks for a FOMOD `info.xml` or a RED-mod `info.json`
//! before any network call is made.

use crate::archive::ArchiveReader;
use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;

/// What tier 0.5 found inside a staged archive, if anything.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveMetadataHit {
    /// A FOMOD `info.xml` with an `<Id>` and/or `<Website>` tag.
    Fomod { nexus_mod_id: Option<i64> },
    /// A RED-mod `info.json` with name/version only (no catalog id).
    RedMod { name: String, version: Option<String> },
}

fn path_depth(path: &str) -> usize {
    let normalized = path.replace('\\', "/");
    normalized.trim_matches('/').matches('/').count()
}

/// The shallowest `info.xml`, depth ≥ 2 only (FOMOD convention nests it a
/// few levels under the staging root).
pub fn find_info_xml(entries: &[String]) -> Option<&str> {
    entries
        .iter()
        .filter(|e| e.to_ascii_lowercase().ends_with("info.xml") && path_depth(e) >= 2)
        .min_by_key(|e| path_depth(e))
        .map(|s| s.as_str())
}

/// The shallowest `info.json`, depth ≤ 2 only (RED-mod convention keeps it
/// near the archive root).
pub fn find_info_json(entries: &[String]) -> Option<&str> {
    entries
        .iter()
        .filter(|e| e.to_ascii_lowercase().ends_with("info.json") && path_depth(e) <= 2)
        .min_by_key(|e| path_depth(e))
        .map(|s| s.as_str())
}

/// Decode archive text tolerant of UTF-8 and UTF-16 BOM, per spec §4.7.
fn decode_text(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        let (text, _, _) = encoding_rs::UTF_16LE.decode(&bytes[2..]);
        text.into_owned()
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        let (text, _, _) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
        text.into_owned()
    } else {
        let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
        text.into_owned()
    }
}

fn parse_fomod_info(xml: &str) -> ArchiveMetadataHit {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_tag = String::new();
    let mut id: Option<i64> = None;
    let mut website: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "Id" => id = text.trim().parse().ok(),
                    "Website" => website = Some(text.trim().to_string()),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let from_website = website.as_deref().and_then(extract_mod_id_from_url);
    ArchiveMetadataHit::Fomod { nexus_mod_id: id.or(from_website) }
}

fn extract_mod_id_from_url(website: &str) -> Option<i64> {
    let url = url::Url::parse(website).ok()?;
    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "mods" {
            return segments.next()?.parse().ok();
        }
    }
    None
}

fn parse_redmod_info(json: &str) -> Option<ArchiveMetadataHit> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let name = value.get("name")?.as_str()?.to_string();
    let version = value.get("version").and_then(|v| v.as_str()).map(str::to_string);
    Some(ArchiveMetadataHit::RedMod { name, version })
}

/// Open `archive` and look for FOMOD `info.xml` first, then RED-mod
/// `info.json`. Returns `None` when neither is present.
pub fn inspect_archive(archive: &mut ArchiveReader) -> Result<Option<ArchiveMetadataHit>> {
    let entries = archive.list_entries()?;
    if let Some(path) = find_info_xml(&entries).map(str::to_string) {
        let bytes = archive.read_file(&path)?;
        return Ok(Some(parse_fomod_info(&decode_text(&bytes))));
    }
    if let Some(path) = find_info_json(&entries).map(str::to_string) {
        let bytes = archive.read_file(&path)?;
        if let Some(hit) = parse_redmod_info(&decode_text(&bytes)) {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_shallowest_info_xml_at_depth_two_or_more() {
        let entries = vec![
            "info.xml".to_string(),
            "fomod/info.xml".to_string(),
            "deeply/nested/fomod/info.xml".to_string(),
        ];
        assert_eq!(find_info_xml(&entries), Some("fomod/info.xml"));
    }

    #[test]
    fn finds_shallowest_info_json_at_depth_two_or_less() {
        let entries = vec!["a/b/c/info.json".to_string(), "Data/info.json".to_string()];
        assert_eq!(find_info_json(&entries), Some("Data/info.json"));
    }

    #[test]
    fn parses_fomod_id_tag() {
        let xml = "<fomod><Name>Cool Mod</Name><Id>137</Id></fomod>";
        let hit = parse_fomod_info(xml);
        assert_eq!(hit, ArchiveMetadataHit::Fomod { nexus_mod_id: Some(137) });
    }

    #[test]
    fn parses_fomod_id_from_website_when_id_tag_absent() {
        let xml = "<fomod><Website>https://www.nexusmods.com/cyberpunk2077/mods/9001</Website></fomod>";
        let hit = parse_fomod_info(xml);
        assert_eq!(hit, ArchiveMetadataHit::Fomod { nexus_mod_id: Some(9001) });
    }

    #[test]
    fn parses_redmod_info_json() {
        let json = r#"{"name": "Cool Redmod", "version": "1.2.0"}"#;
        let hit = parse_redmod_info(json);
        assert_eq!(
            hit,
            Some(ArchiveMetadataHit::RedMod { name: "Cool Redmod".to_string(), version: Some("1.2.0".to_string()) })
        );
    }
}
