// mockbrew-aio/src/extract.rs
// Unpacks tarballs (plain, gzip, bzip2, xz) into a staging directory.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use mockbrew_common::error::{MbError, Result};
use tar::{Archive, EntryType};
use tracing::{debug, error, warn};
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveKind {
    /// Infers the archive kind from the file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz") || name.ends_with(".tbz2") {
            Ok(Self::TarBz2)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Ok(Self::TarXz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else {
            Err(MbError::Generic(format!(
                "Unsupported archive type for {}",
                path.display()
            )))
        }
    }
}

/// Extracts `archive_path` into `target_dir`, dropping the first
/// `strip_components` path components of every entry.
pub fn extract_archive(archive_path: &Path, target_dir: &Path, strip_components: usize) -> Result<()> {
    let kind = ArchiveKind::from_path(archive_path)?;
    debug!(
        "Extracting archive '{}' ({:?}) to '{}' (strip_components={})",
        archive_path.display(),
        kind,
        target_dir.display(),
        strip_components
    );
    fs::create_dir_all(target_dir)?;
    let file = File::open(archive_path).map_err(|e| {
        MbError::Io(std::sync::Arc::new(std::io::Error::new(
            e.kind(),
            format!("Failed to open archive {}: {}", archive_path.display(), e),
        )))
    })?;
    match kind {
        ArchiveKind::Tar => extract_tar(file, target_dir, strip_components, archive_path),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), target_dir, strip_components, archive_path),
        ArchiveKind::TarBz2 => extract_tar(BzDecoder::new(file), target_dir, strip_components, archive_path),
        ArchiveKind::TarXz => extract_tar(XzDecoder::new(file), target_dir, strip_components, archive_path),
    }
}

pub async fn extract_archive_async(
    archive_path: &Path,
    target_dir: &Path,
    strip_components: usize,
) -> Result<()> {
    let archive_path = archive_path.to_path_buf();
    let target_dir = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive_path, &target_dir, strip_components))
        .await
        .map_err(|e| MbError::Generic(format!("JoinError in archive extraction: {e}")))?
}

/// Maps an in-archive path to its destination, or `None` when the entry is
/// fully stripped. `..`, absolute and prefix components are rejected.
fn destination_for(path_in_archive: &Path, target_dir: &Path, strip_components: usize) -> Result<Option<PathBuf>> {
    let mut out = target_dir.to_path_buf();
    let mut pushed = false;
    for comp in path_in_archive.components().skip(strip_components) {
        match comp {
            Component::Normal(p) => {
                out.push(p);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MbError::ValidationError(format!(
                    "Unsafe path in archive entry: {}",
                    path_in_archive.display()
                )));
            }
        }
    }
    Ok(pushed.then_some(out))
}

/// Fails when a directory between `target_dir` and `dest` is a symlink, so no
/// entry is ever written through a link an earlier entry created.
fn ensure_no_symlinked_parent(dest: &Path, target_dir: &Path) -> Result<()> {
    let relative = dest.strip_prefix(target_dir).map_err(|_| {
        MbError::ValidationError(format!(
            "{} is outside {}",
            dest.display(),
            target_dir.display()
        ))
    })?;
    let mut current = target_dir.to_path_buf();
    if let Some(parent) = relative.parent() {
        for comp in parent.components() {
            current.push(comp);
            match current.symlink_metadata() {
                Ok(meta) if meta.file_type().is_symlink() => {
                    error!(
                        "Archive entry {} would be written through symlink {}",
                        dest.display(),
                        current.display()
                    );
                    return Err(MbError::ValidationError(format!(
                        "Archive entry {} traverses symlink {}",
                        relative.display(),
                        current.display()
                    )));
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

fn extract_tar<R: Read>(
    reader: R,
    target_dir: &Path,
    strip_components: usize,
    archive_path_for_log: &Path,
) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    // Hard links point at other entries; create them once everything is on disk.
    let mut deferred_hardlinks: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut count = 0usize;

    for entry_result in archive.entries()? {
        let mut entry = entry_result.map_err(|e| {
            MbError::Generic(format!(
                "Error reading TAR entry from {}: {}",
                archive_path_for_log.display(),
                e
            ))
        })?;
        let path_in_archive = entry
            .path()
            .map_err(|e| {
                MbError::Generic(format!(
                    "Invalid path in TAR entry from {}: {}",
                    archive_path_for_log.display(),
                    e
                ))
            })?
            .into_owned();
        let dest = match destination_for(&path_in_archive, target_dir, strip_components)? {
            Some(d) => d,
            None => {
                debug!("Skipping entry due to strip_components: {:?}", path_in_archive);
                continue;
            }
        };

        if entry.header().entry_type() == EntryType::Link {
            let link_name = entry
                .link_name()?
                .ok_or_else(|| MbError::Generic(format!("Hard link without target: {}", path_in_archive.display())))?
                .into_owned();
            match destination_for(&link_name, target_dir, strip_components)? {
                Some(src) => {
                    ensure_no_symlinked_parent(&src, target_dir)?;
                    deferred_hardlinks.push((src, dest));
                }
                None => warn!("Hard link target {} stripped away; skipping", link_name.display()),
            }
            continue;
        }

        ensure_no_symlinked_parent(&dest, target_dir)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if entry.header().entry_type() != EntryType::Directory
            && dest.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink())
        {
            debug!("Replacing symlink {} with archive entry", dest.display());
            fs::remove_file(&dest)?;
        }
        entry.unpack(&dest).map_err(|e| {
            error!("Failed to unpack {}: {}", dest.display(), e);
            MbError::Generic(format!(
                "Failed to unpack {} from {}: {}",
                path_in_archive.display(),
                archive_path_for_log.display(),
                e
            ))
        })?;
        count += 1;
    }

    for (src, dest) in deferred_hardlinks {
        ensure_no_symlinked_parent(&dest, target_dir)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.symlink_metadata().is_ok() {
            fs::remove_file(&dest)?;
        }
        fs::hard_link(&src, &dest)?;
        count += 1;
    }
    debug!(
        "Extracted {} entries from {}",
        count,
        archive_path_for_log.display()
    );
    Ok(())
}

/// Archives usually wrap their payload in one top-level directory
/// (`mockserver-3.9.15/bin`, ...). Returns that directory when it is the only
/// entry, otherwise `staging_dir` itself.
pub fn infer_artifact_root(staging_dir: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(staging_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    match entries.as_slice() {
        [only] if only.is_dir() && !staging_dir.join("bin").is_dir() => {
            debug!("Using single top-level directory {} as artifact root", only.display());
            Ok(only.clone())
        }
        _ => Ok(staging_dir.to_path_buf()),
    }
}
