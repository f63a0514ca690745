//! Final file list computation for a FOMOD install (spec §4.5).
//!
//! Pure decision procedure: given a parsed `ModuleConfig`, the set of
//! plugin names the user selected, and the archive's flat entry list,
//! compute the ordered set of `(source, destination)` pairs that should
//! actually be extracted. No filesystem access happens here; see
//! `crate::mods::fomod::install` for the side-effecting half.

use super::conditions::ConditionEvaluator;
use super::parser::{FileItem, FileList, FolderItem, ModuleConfig};
use std::collections::HashMap;

/// One resolved file to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    /// Archive-relative source path.
    pub source: String,
    /// Destination path, relative to the game's mod-surface root.
    pub destination: String,
    pub priority: i32,
}

/// Compute the final, priority-resolved file list for a FOMOD install.
///
/// `entries` is the archive's flat list of non-directory paths (as returned
/// by `ArchiveReader::list_entries`), used to expand folder mappings.
/// `selected_plugins` are the plugin names the user chose in each visible
/// step's group (by name; FOMOD plugin names are unique within a config).
pub fn compute_file_list(
    config: &ModuleConfig,
    entries: &[String],
    selected_plugins: &[String],
) -> Vec<FileOperation> {
    let index = build_entry_index(entries);
    let mut candidates: Vec<FileOperation> = Vec::new();
    let mut flags: HashMap<String, String> = HashMap::new();

    if let Some(required) = &config.required_files {
        expand_file_list(required, &index, &mut candidates);
    }

    for step in &config.install_steps.steps {
        let mut evaluator = ConditionEvaluator::new();
        for (name, value) in &flags {
            evaluator.set_flag(name.clone(), value.clone());
        }
        if !evaluator.evaluate_dependencies(&step.visible) {
            continue;
        }

        for group in &step.groups.groups {
            for plugin in &group.plugins.plugins {
                if !selected_plugins.iter().any(|s| s == &plugin.name) {
                    continue;
                }
                if let Some(files) = &plugin.files {
                    expand_file_list(files, &index, &mut candidates);
                }
                if let Some(cond_flags) = &plugin.condition_flags {
                    for flag in &cond_flags.flags {
                        flags.insert(flag.name.clone(), flag.value.clone());
                    }
                }
            }
        }
    }

    if let Some(conditional) = &config.conditional_installs {
        if let Some(patterns) = &conditional.patterns {
            let mut evaluator = ConditionEvaluator::new();
            for (name, value) in &flags {
                evaluator.set_flag(name.clone(), value.clone());
            }
            for pattern in &patterns.patterns {
                if evaluator.evaluate_dependencies(&pattern.dependencies) {
                    if let Some(files) = &pattern.files {
                        expand_file_list(files, &index, &mut candidates);
                    }
                }
            }
        }
    }

    resolve_priority(candidates)
}

/// Lower-cased, forward-slash archive entry paths, for prefix matching.
struct EntryIndex {
    entries: Vec<String>,
}

fn build_entry_index(entries: &[String]) -> EntryIndex {
    EntryIndex {
        entries: entries.iter().map(|e| crate::archive::sanitize_path(e)).collect(),
    }
}

fn expand_file_list(list: &FileList, index: &EntryIndex, out: &mut Vec<FileOperation>) {
    for file in &list.files {
        expand_file_item(file, index, out);
    }
    for folder in &list.folders {
        expand_folder_item(folder, index, out);
    }
}

fn expand_file_item(item: &FileItem, index: &EntryIndex, out: &mut Vec<FileOperation>) {
    let source = crate::archive::sanitize_path(&item.source);
    let Some(matched) = index.entries.iter().find(|e| e.eq_ignore_ascii_case(&source)) else {
        return;
    };
    let destination = if item.destination.is_empty() {
        last_segment(matched).to_string()
    } else {
        item.destination.replace('\\', "/")
    };
    out.push(FileOperation { source: matched.clone(), destination, priority: item.priority });
}

fn expand_folder_item(item: &FolderItem, index: &EntryIndex, out: &mut Vec<FileOperation>) {
    let source = crate::archive::sanitize_path(&item.source);
    let prefix = format!("{}/", source.to_ascii_lowercase());
    let dest_prefix = item.destination.replace('\\', "/");

    for entry in &index.entries {
        let lower = entry.to_ascii_lowercase();
        let relative = if source.is_empty() {
            Some(entry.as_str())
        } else if let Some(rest) = lower.strip_prefix(&prefix) {
            Some(&entry[entry.len() - rest.len()..])
        } else {
            None
        };
        let Some(relative) = relative else { continue };
        let destination = if dest_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{dest_prefix}/{relative}")
        };
        out.push(FileOperation { source: entry.clone(), destination, priority: item.priority });
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Group by lower-cased destination, keep the highest priority, later
/// doc-order wins ties (candidates are already in document order).
fn resolve_priority(candidates: Vec<FileOperation>) -> Vec<FileOperation> {
    let mut winners: HashMap<String, FileOperation> = HashMap::new();
    for op in candidates {
        let key = op.destination.to_ascii_lowercase();
        match winners.get(&key) {
            Some(existing) if existing.priority > op.priority => {}
            _ => {
                winners.insert(key, op);
            }
        }
    }
    let mut result: Vec<FileOperation> = winners.into_values().collect();
    result.sort_by(|a, b| a.destination.cmp(&b.destination));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::fomod::parser::parse_module_config;

    fn entries() -> Vec<String> {
        vec![
            "Data/Main/foo.archive".to_string(),
            "Data/Extra/bar.reds".to_string(),
            "readme.txt".to_string(),
        ]
    }

    #[test]
    fn required_files_always_included() {
        let xml = r#"
            <config>
                <moduleName>Test</moduleName>
                <requiredInstallFiles>
                    <folder source="Data/Main" destination=""/>
                </requiredInstallFiles>
                <installSteps/>
            </config>
        "#;
        let config = parse_module_config(xml).unwrap();
        let ops = compute_file_list(&config, &entries(), &[]);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].destination, "foo.archive");
    }

    #[test]
    fn priority_resolution_keeps_highest_then_later() {
        let candidates = vec![
            FileOperation { source: "a".into(), destination: "x".into(), priority: 0 },
            FileOperation { source: "b".into(), destination: "x".into(), priority: 5 },
            FileOperation { source: "c".into(), destination: "x".into(), priority: 5 },
        ];
        let resolved = resolve_priority(candidates);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].source, "c");
    }

    #[test]
    fn selected_plugin_files_are_included() {
        let xml = r#"
            <config>
                <moduleName>Test</moduleName>
                <installSteps>
                    <installStep name="Step">
                        <optionalFileGroups>
                            <group name="Main" type="SelectExactlyOne">
                                <plugins>
                                    <plugin name="Extra">
                                        <description>d</description>
                                        <files>
                                            <folder source="Data/Extra" destination="r6/scripts"/>
                                        </files>
                                    </plugin>
                                </plugins>
                            </group>
                        </optionalFileGroups>
                    </installStep>
                </installSteps>
            </config>
        "#;
        let config = parse_module_config(xml).unwrap();
        let ops = compute_file_list(&config, &entries(), &["Extra".to_string()]);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].destination, "r6/scripts/bar.reds");
    }

    #[test]
    fn unselected_plugin_files_are_excluded() {
        let xml = r#"
            <config>
                <moduleName>Test</moduleName>
                <installSteps>
                    <installStep name="Step">
                        <optionalFileGroups>
                            <group name="Main" type="SelectExactlyOne">
                                <plugins>
                                    <plugin name="Extra">
                                        <description>d</description>
                                        <files>
                                            <folder source="Data/Extra" destination="r6/scripts"/>
                                        </files>
                                    </plugin>
                                </plugins>
                            </group>
                        </optionalFileGroups>
                    </installStep>
                </installSteps>
            </config>
        "#;
        let config = parse_module_config(xml).unwrap();
        let ops = compute_file_list(&config, &entries(), &[]);
        assert!(ops.is_empty());
    }

    #[test]
    fn hidden_step_is_revealed_once_its_flag_dependency_is_set() {
        let xml = r#"
            <config>
                <moduleName>Test</moduleName>
                <installSteps>
                    <installStep name="Base">
                        <optionalFileGroups>
                            <group name="Main" type="SelectExactlyOne">
                                <plugins>
                                    <plugin name="Base">
                                        <description>d</description>
                                        <conditionFlags>
                                            <flag name="extra">on</flag>
                                        </conditionFlags>
                                    </plugin>
                                </plugins>
                            </group>
                        </optionalFileGroups>
                    </installStep>
                    <installStep name="Extras">
                        <visible>
                            <flagDependency flag="extra" value="on"/>
                        </visible>
                        <optionalFileGroups>
                            <group name="Bonus" type="SelectExactlyOne">
                                <plugins>
                                    <plugin name="ExtraA">
                                        <description>d</description>
                                        <files>
                                            <file source="readme.txt" destination="bonus.txt"/>
                                        </files>
                                    </plugin>
                                </plugins>
                            </group>
                        </optionalFileGroups>
                    </installStep>
                </installSteps>
            </config>
        "#;
        let config = parse_module_config(xml).unwrap();

        let hidden = compute_file_list(&config, &entries(), &["ExtraA".to_string()]);
        assert!(hidden.is_empty());

        let revealed =
            compute_file_list(&config, &entries(), &["Base".to_string(), "ExtraA".to_string()]);
        assert_eq!(revealed.len(), 1);
        assert_eq!(revealed[0].destination, "bonus.txt");
    }

    #[test]
    fn compute_file_list_is_idempotent() {
        let xml = r#"
            <config>
                <moduleName>Test</moduleName>
                <requiredInstallFiles>
                    <folder source="Data/Main" destination=""/>
                </requiredInstallFiles>
                <installSteps/>
            </config>
        "#;
        let config = parse_module_config(xml).unwrap();
        let first = compute_file_list(&config, &entries(), &[]);
        let second = compute_file_list(&config, &entries(), &[]);
        assert_eq!(first, second);
    }
}
