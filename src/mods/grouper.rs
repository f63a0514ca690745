//! Clusters scanned ModFiles into ModGroups (spec §4.6).
//!
//! Three phases: deterministic folder grouping, TF-IDF + cosine-distance
//! clustering of whatever's left over (loose files directly under a
//! mod-path), then a cross-folder merge of groups that normalise to the
//! same name.

use crate::db::ModFileRecord;
use crate::game::Game;
use std::collections::{BTreeMap, HashMap};

const DEFAULT_EPS: f64 = 0.45;

/// One cluster of ModFiles the grouper believes make up a single mod.
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub display_name: String,
    pub files: Vec<ModFileRecord>,
    pub confidence: f64,
}

pub fn group_mod_files(game: &Game, files: Vec<ModFileRecord>) -> Vec<FileGroup> {
    group_mod_files_with_eps(game, files, DEFAULT_EPS)
}

pub fn group_mod_files_with_eps(game: &Game, files: Vec<ModFileRecord>, eps: f64) -> Vec<FileGroup> {
    if files.is_empty() {
        return Vec::new();
    }

    let mut folder_groups: BTreeMap<String, Vec<ModFileRecord>> = BTreeMap::new();
    let mut loose_files: Vec<ModFileRecord> = Vec::new();

    for file in files {
        match extract_mod_folder(game, &file.relative_path) {
            Some(folder) => folder_groups.entry(folder).or_default().push(file),
            None => loose_files.push(file),
        }
    }

    let mut results: Vec<FileGroup> = folder_groups
        .into_iter()
        .map(|(folder, files)| FileGroup {
            display_name: clean_display_name(&folder),
            files,
            confidence: 1.0,
        })
        .collect();

    if !loose_files.is_empty() {
        results.extend(cluster_loose_files(loose_files, eps));
    }

    merge_same_name_groups(results)
}

/// The immediate subdirectory of `relative_path` under whichever configured
/// mod-path contains it, or `None` if the file sits directly under the
/// mod-path with no further subdirectory (a loose file).
fn extract_mod_folder(game: &Game, relative_path: &str) -> Option<String> {
    let normalized = crate::game::normalize_separators(relative_path);
    let mod_path = game
        .mod_paths
        .iter()
        .map(|p| crate::game::normalize_separators(p))
        .find(|p| {
            let prefix = format!("{}/", p.to_ascii_lowercase());
            normalized.to_ascii_lowercase().starts_with(&prefix)
        })?;
    let remainder = &normalized[mod_path.len() + 1..];
    let (folder, rest) = remainder.split_once('/')?;
    if rest.is_empty() || folder.is_empty() {
        return None;
    }
    Some(folder.to_string())
}

fn cluster_loose_files(files: Vec<ModFileRecord>, eps: f64) -> Vec<FileGroup> {
    if files.len() == 1 {
        let name = normalize_name(&filename_of(&files[0].relative_path));
        let display = if name.is_empty() { filename_of(&files[0].relative_path) } else { title_case(&name) };
        return vec![FileGroup { display_name: display, files, confidence: 1.0 }];
    }

    let docs: Vec<String> = files
        .iter()
        .map(|f| {
            let filename = filename_of(&f.relative_path);
            let parent = parent_dir_name(&f.relative_path);
            format!("{} {}", normalize_name(&filename), parent).trim().to_string()
        })
        .collect();

    let vectors: Vec<HashMap<String, f64>> = docs.iter().map(|d| tfidf_char_ngrams(d, &docs)).collect();

    let n = files.len();
    let mut sim = vec![vec![0.0_f64; n]; n];
    for i in 0..n {
        sim[i][i] = 1.0;
        for j in (i + 1)..n {
            let s = cosine_similarity(&vectors[i], &vectors[j]);
            sim[i][j] = s;
            sim[j][i] = s;
        }
    }

    let labels = dbscan_precomputed(&sim, eps, 1);

    let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.into_iter().enumerate() {
        clusters.entry(label).or_default().push(idx);
    }

    let mut results = Vec::with_capacity(clusters.len());
    for (_label, indices) in clusters {
        let stems: Vec<String> = indices.iter().map(|&i| normalize_name(&filename_of(&files[i].relative_path))).collect();
        let longest_stem = stems.iter().max_by_key(|s| s.len()).cloned().unwrap_or_default();
        let group_name = if longest_stem.is_empty() {
            files[indices[0]].relative_path.clone()
        } else {
            title_case(&longest_stem)
        };

        let confidence = if indices.len() > 1 {
            let mut total = 0.0;
            let mut count = 0u32;
            for a in 0..indices.len() {
                for b in (a + 1)..indices.len() {
                    total += sim[indices[a]][indices[b]];
                    count += 1;
                }
            }
            if count > 0 { round3(total / count as f64) } else { 1.0 }
        } else {
            1.0
        };

        let cluster_files: Vec<ModFileRecord> = indices.into_iter().map(|i| files[i].clone()).collect();
        results.push(FileGroup { display_name: group_name, files: cluster_files, confidence });
    }

    results
}

/// DBSCAN over a precomputed similarity matrix, distance = 1 - similarity.
/// `min_samples = 1` means every point seeds its own cluster if it has no
/// neighbours within `eps`.
fn dbscan_precomputed(sim: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i64> {
    let n = sim.len();
    let mut labels = vec![-1_i64; n];
    let mut next_label = 0_i64;
    let mut visited = vec![false; n];

    let neighbors = |i: usize| -> Vec<usize> {
        (0..n).filter(|&j| j != i && (1.0 - sim[i][j]) <= eps).collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let mut seed_set = neighbors(i);
        if seed_set.len() + 1 < min_samples {
            labels[i] = next_label;
            next_label += 1;
            continue;
        }
        let label = next_label;
        next_label += 1;
        labels[i] = label;
        let mut k = 0;
        while k < seed_set.len() {
            let j = seed_set[k];
            if !visited[j] {
                visited[j] = true;
                let j_neighbors = neighbors(j);
                if j_neighbors.len() + 1 >= min_samples {
                    for n in j_neighbors {
                        if !seed_set.contains(&n) {
                            seed_set.push(n);
                        }
                    }
                }
            }
            if labels[j] == -1 {
                labels[j] = label;
            }
            k += 1;
        }
    }
    labels
}

fn merge_same_name_groups(groups: Vec<FileGroup>) -> Vec<FileGroup> {
    let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, g) in groups.iter().enumerate() {
        buckets.entry(normalize_name(&g.display_name)).or_default().push(idx);
    }

    let mut merged = Vec::new();
    let mut seen = vec![false; groups.len()];
    for (idx, g) in groups.iter().enumerate() {
        if seen[idx] {
            continue;
        }
        let key = normalize_name(&g.display_name);
        let indices = &buckets[&key];
        if indices.len() == 1 {
            seen[idx] = true;
            merged.push(g.clone());
            continue;
        }
        let mut best_name = g.display_name.clone();
        let mut best_conf = g.confidence;
        let mut combined_files = Vec::new();
        for &i in indices {
            seen[i] = true;
            combined_files.extend(groups[i].files.iter().cloned());
            if groups[i].display_name.len() > best_name.len() {
                best_name = groups[i].display_name.clone();
            }
            best_conf = best_conf.min(groups[i].confidence);
        }
        merged.push(FileGroup { display_name: best_name, files: combined_files, confidence: best_conf });
    }
    merged
}

// ===== normalization helpers =====

fn filename_of(relative_path: &str) -> String {
    crate::game::normalize_separators(relative_path)
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string()
}

fn parent_dir_name(relative_path: &str) -> String {
    let normalized = crate::game::normalize_separators(relative_path);
    let mut segments: Vec<&str> = normalized.split('/').collect();
    segments.pop();
    segments.last().map(|s| s.to_string()).unwrap_or_default()
}

/// Strips `#`, `z`/`zz`/`zzz` ordering prefixes, version tokens, splits
/// CamelCase, collapses separators, lower-cases. See spec §4.6.
fn normalize_name(name: &str) -> String {
    let stripped = strip_ordering_prefix(name);
    let without_ext = stripped.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(&stripped);
    let without_version = strip_version_tokens(without_ext);
    let split = split_camel(&without_version);
    collapse_separators(&split).trim().to_ascii_lowercase()
}

fn strip_ordering_prefix(name: &str) -> String {
    let trimmed = name.trim_start_matches(['#', '-', '_', ' ']);
    let mut chars = trimmed.char_indices();
    let mut end = 0;
    for (i, c) in chars.by_ref() {
        if c.is_ascii_digit() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    let after_digits = &trimmed[end..];
    let after_digits = after_digits.trim_start_matches(['-', '_', '.', ' ']);
    if end > 0 && !after_digits.is_empty() {
        after_digits.to_string()
    } else {
        let lower = trimmed.to_ascii_lowercase();
        let z_stripped = lower.trim_start_matches('z');
        if z_stripped.len() < lower.len() && !z_stripped.is_empty() {
            trimmed[lower.len() - z_stripped.len()..].to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Mirrors `[_\-.]?v?\d+\.\d+(\.\d+)?[_\-.]?`: an optional leading separator,
/// an optional `v`, a dotted version number, an optional trailing separator.
fn strip_version_tokens(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    let mut i = 0;
    while i < chars.len() {
        if let Some(end) = match_version_token(&chars, i) {
            out.push(' ');
            i = end;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn is_sep(c: char) -> bool {
    matches!(c, '_' | '-' | '.')
}

/// Tries to match a version token starting at or after index `start`,
/// allowing for a leading separator/`v` marker immediately before the
/// digits. Returns the index just past the full match, if any.
fn match_version_token(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    if i < chars.len() && is_sep(chars[i]) {
        i += 1;
    }
    if i < chars.len() && (chars[i] == 'v' || chars[i] == 'V') {
        i += 1;
    }
    let digits_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if i >= chars.len() || chars[i] != '.' {
        return None;
    }
    i += 1;
    let second_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == second_start {
        return None;
    }
    if i < chars.len() && chars[i] == '.' {
        let save = i;
        i += 1;
        let third_start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i == third_start {
            i = save;
        }
    }
    if i < chars.len() && is_sep(chars[i]) {
        i += 1;
    }
    Some(i)
}

fn split_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len() * 2);
    let chars: Vec<char> = name.chars().collect();
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

/// Title-cases a normalized-lowercase space-separated string for display.
fn title_case(name: &str) -> String {
    name.split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Folder names are already legible (they're directory names a mod author
/// chose); just re-assemble split CamelCase words without inserted spaces.
fn clean_display_name(folder: &str) -> String {
    let spaced = collapse_separators(&split_camel(folder));
    let rebuilt = title_case(&spaced.to_ascii_lowercase()).replace(' ', "");
    if rebuilt.is_empty() {
        folder.to_string()
    } else {
        rebuilt
    }
}

// ===== TF-IDF over char n-grams (2..4), matching sklearn's `char_wb` analyzer closely enough =====

fn char_ngrams(text: &str, n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        return Vec::new();
    }
    (0..=chars.len() - n).map(|i| chars[i..i + n].iter().collect()).collect()
}

fn document_ngrams(text: &str) -> Vec<String> {
    let mut grams = Vec::new();
    for n in 2..=4 {
        grams.extend(char_ngrams(text, n));
    }
    grams
}

fn tfidf_char_ngrams(doc: &str, corpus: &[String]) -> HashMap<String, f64> {
    let grams = document_ngrams(doc);
    if grams.is_empty() {
        return HashMap::new();
    }
    let mut tf: HashMap<String, f64> = HashMap::new();
    for g in &grams {
        *tf.entry(g.clone()).or_insert(0.0) += 1.0;
    }
    let total = grams.len() as f64;
    for v in tf.values_mut() {
        *v /= total;
    }

    let n_docs = corpus.len() as f64;
    let mut tfidf = HashMap::with_capacity(tf.len());
    for (gram, freq) in tf {
        let df = corpus.iter().filter(|d| document_ngrams(d).iter().any(|g| g == &gram)).count() as f64;
        let idf = (n_docs / df.max(1.0)).ln() + 1.0;
        tfidf.insert(gram, freq * idf);
    }
    tfidf
}

fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    for (k, va) in a {
        if let Some(vb) = b.get(k) {
            dot += va * vb;
        }
    }
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
