//! Side-effecting half of a FOMOD install (spec §4.5): turns a resolved
//! `FileOperation` list into files on disk under a game's mod-surface root.

use super::planner::FileOperation;
use crate::archive::ArchiveReader;
use crate::game::safe_join;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Extract every resolved `FileOperation` from `archive` into `game_root`,
/// refusing to overwrite an existing destination and refusing any path that
/// would escape `game_root`. Returns the destination paths actually written,
/// one InstalledModFile row per caller convention.
pub fn install_file_operations(
    archive: &mut ArchiveReader,
    operations: &[FileOperation],
    game_root: &Path,
) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(operations.len());
    for op in operations {
        let Some(outpath) = safe_join(game_root, &op.destination) else {
            bail!("refusing path-traversal destination: {}", op.destination);
        };
        if outpath.exists() {
            bail!("destination already exists, refusing to overwrite: {}", op.destination);
        }
        let bytes = archive
            .read_file(&op.source)
            .with_context(|| format!("reading {} from archive", op.source))?;
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&outpath, &bytes)
            .with_context(|| format!("writing {}", outpath.display()))?;
        written.push(op.destination.clone());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        for (entry_name, content) in entries {
            writer.start_file(*entry_name, opts).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn extracts_resolved_operations() {
        let staging = tempfile::tempdir().unwrap();
        let game = tempfile::tempdir().unwrap();
        let zip_path = build_zip(staging.path(), "mod.zip", &[("Data/foo.archive", b"hello")]);
        let mut reader = ArchiveReader::open(&zip_path).unwrap();

        let ops = vec![FileOperation {
            source: "Data/foo.archive".to_string(),
            destination: "archive/pc/mod/foo.archive".to_string(),
            priority: 0,
        }];
        let written = install_file_operations(&mut reader, &ops, game.path()).unwrap();
        assert_eq!(written, vec!["archive/pc/mod/foo.archive".to_string()]);
        assert_eq!(
            std::fs::read(game.path().join("archive/pc/mod/foo.archive")).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn refuses_to_overwrite_existing_destination() {
        let staging = tempfile::tempdir().unwrap();
        let game = tempfile::tempdir().unwrap();
        let zip_path = build_zip(staging.path(), "mod.zip", &[("foo.archive", b"hello")]);
        let mut reader = ArchiveReader::open(&zip_path).unwrap();

        std::fs::create_dir_all(game.path().join("archive/pc/mod")).unwrap();
        std::fs::write(game.path().join("archive/pc/mod/foo.archive"), b"existing").unwrap();

        let ops = vec![FileOperation {
            source: "foo.archive".to_string(),
            destination: "archive/pc/mod/foo.archive".to_string(),
            priority: 0,
        }];
        assert!(install_file_operations(&mut reader, &ops, game.path()).is_err());
    }

    #[test]
    fn refuses_path_traversal_destination() {
        let staging = tempfile::tempdir().unwrap();
        let game = tempfile::tempdir().unwrap();
        let zip_path = build_zip(staging.path(), "mod.zip", &[("foo.archive", b"hello")]);
        let mut reader = ArchiveReader::open(&zip_path).unwrap();

        let ops = vec![FileOperation {
            source: "foo.archive".to_string(),
            destination: "../../etc/passwd".to_string(),
            priority: 0,
        }];
        assert!(install_file_operations(&mut reader, &ops, game.path()).is_err());
    }
}
