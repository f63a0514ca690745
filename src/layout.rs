//! Archive layout detection (spec §4.4).

use crate::game::{first_segment, is_known_root, normalize_separators};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLayout {
    /// A known root appears at depth 0.
    Standard,
    /// Exactly one top-level folder wraps a known root; `strip_prefix` is that folder.
    Wrapped { strip_prefix: String },
    /// A FOMOD installer description exists somewhere in the tree.
    Fomod,
    /// None of the above.
    Unknown,
}

/// Classify an archive's layout from its flat list of internal entry paths.
pub fn detect_layout(entries: &[String]) -> ArchiveLayout {
    let normalized: Vec<String> = entries.iter().map(|e| normalize_separators(e)).collect();

    if normalized
        .iter()
        .filter_map(|e| first_segment(e))
        .any(is_known_root)
    {
        return ArchiveLayout::Standard;
    }

    // Check for a single top-level wrapper folder containing a known root.
    let top_levels: std::collections::HashSet<&str> =
        normalized.iter().filter_map(|e| first_segment(e)).collect();

    if top_levels.len() == 1 {
        let wrapper = *top_levels.iter().next().unwrap();
        let has_known_root_inside = normalized.iter().any(|e| {
            let normalized_lower = e.to_ascii_lowercase();
            let wrapper_lower = wrapper.to_ascii_lowercase();
            normalized_lower
                .strip_prefix(&format!("{wrapper_lower}/"))
                .and_then(first_segment)
                .is_some_and(is_known_root)
        });
        if has_known_root_inside {
            return ArchiveLayout::Wrapped {
                strip_prefix: wrapper.to_string(),
            };
        }
    }

    // FOMOD is checked last: a stray ModuleConfig.xml alongside an
    // already-recognised STANDARD or WRAPPED root shouldn't force the
    // installer into the wizard path.
    if normalized
        .iter()
        .any(|e| e.to_ascii_lowercase().ends_with("fomod/moduleconfig.xml"))
    {
        return ArchiveLayout::Fomod;
    }

    ArchiveLayout::Unknown
}
