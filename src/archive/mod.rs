//! Uniform archive reader over ZIP, 7z, and RAR (spec §4.2).
//!
//! Each variant is opened once and offers `list_entries`/`read_file`/
//! `read_all_files`. 7z and RAR have no incremental random-access reader in
//! the crates available here, so both are extracted to a scratch directory
//! on open and served from there; callers that need a bulk read MUST use
//! `read_all_files` rather than looping `read_file`, since for Zip that is a
//! single pass over the central directory instead of one seek per file.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Detected archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    Rar,
    Unknown,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => Self::Zip,
            "7z" => Self::SevenZip,
            "rar" => Self::Rar,
            _ => Self::Unknown,
        }
    }

    fn from_magic(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0x50, 0x4B]) {
            Self::Zip
        } else if bytes.starts_with(&[0x37, 0x7A, 0xBC, 0xAF]) {
            Self::SevenZip
        } else if bytes.starts_with(&[0x52, 0x61, 0x72, 0x21]) {
            Self::Rar
        } else {
            Self::Unknown
        }
    }
}

/// A scoped handle on one staged archive. Always release via drop; the
/// 7z/RAR variants hold a `TempDir` that cleans itself up automatically.
pub enum ArchiveReader {
    Zip(zip::ZipArchive<std::fs::File>),
    Extracted { _scratch: TempDir, root: PathBuf, entries: Vec<String> },
}

impl ArchiveReader {
    /// Open an archive, detecting format by extension and falling back to magic bytes.
    pub fn open(path: &Path) -> Result<Self> {
        let mut format = ArchiveFormat::from_path(path);
        if format == ArchiveFormat::Unknown {
            let mut head = [0u8; 8];
            let mut file = std::fs::File::open(path).context("failed to open archive")?;
            let n = file.read(&mut head).unwrap_or(0);
            format = ArchiveFormat::from_magic(&head[..n]);
        }

        match format {
            ArchiveFormat::Zip => {
                let file = std::fs::File::open(path).context("failed to open archive")?;
                let zip = zip::ZipArchive::new(file).context("failed to read ZIP archive")?;
                Ok(Self::Zip(zip))
            }
            ArchiveFormat::SevenZip => {
                let scratch = TempDir::new().context("failed to create scratch directory")?;
                sevenz_rust::decompress_file(path, scratch.path())
                    .context("failed to extract 7z archive")?;
                let entries = walk_entries(scratch.path())?;
                Ok(Self::Extracted { root: scratch.path().to_path_buf(), _scratch: scratch, entries })
            }
            ArchiveFormat::Rar => {
                let scratch = TempDir::new().context("failed to create scratch directory")?;
                extract_rar_to(path, scratch.path())?;
                let entries = walk_entries(scratch.path())?;
                Ok(Self::Extracted { root: scratch.path().to_path_buf(), _scratch: scratch, entries })
            }
            ArchiveFormat::Unknown => bail!("unknown or unsupported archive format: {}", path.display()),
        }
    }

    /// Non-directory entry paths, forward-slash separated, relative to the archive root.
    pub fn list_entries(&mut self) -> Result<Vec<String>> {
        match self {
            Self::Zip(zip) => {
                let mut out = Vec::with_capacity(zip.len());
                for i in 0..zip.len() {
                    let entry = zip.by_index(i)?;
                    if !entry.is_dir() {
                        out.push(sanitize_path(entry.name()));
                    }
                }
                Ok(out)
            }
            Self::Extracted { entries, .. } => Ok(entries.clone()),
        }
    }

    /// Read a single entry's bytes by its archive-relative path.
    pub fn read_file(&mut self, relative: &str) -> Result<Vec<u8>> {
        match self {
            Self::Zip(zip) => {
                let mut entry = zip
                    .by_name(relative)
                    .with_context(|| format!("entry not found: {relative}"))?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Self::Extracted { root, .. } => {
                std::fs::read(root.join(relative)).with_context(|| format!("entry not found: {relative}"))
            }
        }
    }

    /// Read every entry's bytes in a single pass. Callers doing bulk
    /// extraction MUST use this instead of looping `read_file`.
    pub fn read_all_files(&mut self) -> Result<HashMap<String, Vec<u8>>> {
        match self {
            Self::Zip(zip) => {
                let mut out = HashMap::with_capacity(zip.len());
                for i in 0..zip.len() {
                    let mut entry = zip.by_index(i)?;
                    if entry.is_dir() {
                        continue;
                    }
                    let name = sanitize_path(entry.name());
                    let mut buf = Vec::new();
                    entry.read_to_end(&mut buf)?;
                    out.insert(name, buf);
                }
                Ok(out)
            }
            Self::Extracted { root, entries, .. } => {
                let mut out = HashMap::with_capacity(entries.len());
                for relative in entries.iter() {
                    out.insert(relative.clone(), std::fs::read(root.join(relative))?);
                }
                Ok(out)
            }
        }
    }
}

fn walk_entries(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(relative);
        }
    }
    Ok(entries)
}

fn extract_rar_to(archive: &Path, dest: &Path) -> Result<()> {
    let output = std::process::Command::new("unrar")
        .args(["x", "-o+", "-y"])
        .arg(archive)
        .arg(dest)
        .output();

    match output {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            bail!("unrar failed: {stderr}")
        }
        Err(_) => bail!(
            "RAR extraction requires 'unrar' to be installed.\n\
             Install it with: sudo apt install unrar (Debian/Ubuntu)\n\
                              sudo pacman -S unrar (Arch)"
        ),
    }
}

/// Extract an archive wholesale into `dest`, preserving relative paths.
/// Used by the installer (spec §4.10) once layout detection has decided the
/// archive doesn't need the FOMOD wizard.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize> {
    std::fs::create_dir_all(dest)?;
    let mut reader = ArchiveReader::open(archive)?;
    let files = reader.read_all_files()?;
    for (relative, bytes) in &files {
        let Some(outpath) = crate::game::safe_join(dest, relative) else {
            tracing::warn!("skipping path-traversal entry: {relative}");
            continue;
        };
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&outpath, bytes)?;
    }
    Ok(files.len())
}

/// Strip `.`/`..`/empty path components and normalize separators.
pub fn sanitize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}
