//! Name normalisation and scoring shared by the catalog-filename matcher
//! (tier 2.5/2.75) and the general name correlator (tier 3, spec §4.7).

/// Lower-cases, splits CamelCase, strips a leading `z+`/`#+` ordering
/// prefix when immediately followed by an uppercase letter, and collapses
/// `_`/`-`/`.`/whitespace runs into single spaces.
///
/// Deliberately distinct from [`crate::mods::grouper`]'s normalisation:
/// this one does not strip version tokens (`"v1.2.3"` stays three tokens,
/// matching the catalog's own loose name comparisons).
pub fn normalize(name: &str) -> String {
    let stripped = strip_ordering_prefix(name);
    let spaced = split_camel(&stripped);
    let collapsed = collapse_separators(&spaced);
    collapsed.trim().to_ascii_lowercase()
}

fn strip_ordering_prefix(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let marker = match chars.first() {
        Some('#') => '#',
        Some('z') => 'z',
        _ => return name.to_string(),
    };
    let mut i = 0;
    while i < chars.len() && chars[i] == marker {
        i += 1;
    }
    if i < chars.len() && chars[i].is_uppercase() {
        chars[i..].iter().collect()
    } else {
        name.to_string()
    }
}

fn split_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() * 2);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() && chars[i - 1].is_lowercase() {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

fn collapse_separators(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !last_was_sep {
                out.push(' ');
            }
            last_was_sep = true;
        } else {
            out.push(c);
            last_was_sep = false;
        }
    }
    out
}

/// Jaccard similarity over whitespace-split tokens. Callers pass
/// already-normalised strings; an empty side always scores 0.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

/// The method that produced a [`compute_name_score`] result.
pub const METHOD_EXACT: &str = "exact";
pub const METHOD_SUBSTRING: &str = "substring";
pub const METHOD_FUZZY: &str = "fuzzy";

/// Name-similarity score between two raw (not pre-normalised) names, per
/// spec §4.7 tier 3: exact normalised equality, then substring containment
/// (≥4 chars), then `0.6·jaccard + 0.4·jaro_winkler`, forced to 0 when the
/// token Jaccard is 0.
pub fn compute_name_score(a: &str, b: &str) -> (f64, &'static str) {
    let na = normalize(a);
    let nb = normalize(b);

    if !na.is_empty() && na == nb {
        return (1.0, METHOD_EXACT);
    }

    let (shorter, longer) = if na.len() <= nb.len() { (&na, &nb) } else { (&nb, &na) };
    if shorter.len() >= 4 && longer.contains(shorter.as_str()) {
        return (0.9, METHOD_SUBSTRING);
    }

    let jaccard = token_jaccard(&na, &nb);
    if jaccard == 0.0 {
        return (0.0, METHOD_FUZZY);
    }
    let jw = strsim::jaro_winkler(&na, &nb);
    (0.6 * jaccard + 0.4 * jw, METHOD_FUZZY)
}

/// Acceptance threshold for tier 3 correlations (spec §4.7).
pub const ACCEPT_THRESHOLD: f64 = 0.55;

/// Tier-3 name-based correlation methods: the ones subject to staleness
/// purging when the underlying names no longer score above threshold.
pub fn is_name_based_method(method: &str) -> bool {
    matches!(method, METHOD_EXACT | METHOD_SUBSTRING | METHOD_FUZZY)
}
