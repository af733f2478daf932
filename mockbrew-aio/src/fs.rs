/*
File: mockbrew-aio/src/fs.rs
Purpose: Primitive filesystem operations shared by the installer and uninstaller.
*/
use std::fs::{self, Permissions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use mockbrew_common::error::{MbError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// True when `path` is a symlink whose target exists.
pub fn symlink_resolves(path: &Path) -> bool {
    match path.symlink_metadata() {
        Ok(meta) => meta.file_type().is_symlink() && path.exists(),
        Err(_) => false,
    }
}

/// Creates a directory and all its parent components if they are missing.
/// Succeeds without touching anything when the directory already exists.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        MbError::from(e)
    })
}

/// Removes a directory and all its contents recursively.
pub fn remove_directory_recursive(path: &Path) -> Result<()> {
    debug!("Removing directory recursively: {}", path.display());
    fs::remove_dir_all(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed remove dir_all {}: {}", path.display(), e);
        }
        MbError::from(e)
    })
}

/// Creates a symbolic link. Unix only.
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    debug!("Creating symlink {} -> {}", link.display(), target.display());
    symlink(target, link).map_err(|e| {
        error!(
            "Failed create symlink {} -> {}: {}",
            link.display(),
            target.display(),
            e
        );
        MbError::from(e)
    })
}

#[cfg(not(unix))]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    warn!(
        "Symlink creation not supported on this platform: {} -> {}",
        link.display(),
        target.display()
    );
    Err(MbError::Generic(
        "Symlinks not supported on this platform".to_string(),
    ))
}

/// Points `link` at `target`, replacing a previous symlink at `link`.
///
/// The target must already exist so the link is never dangling. A regular
/// file or directory sitting at `link` is left alone and reported as a
/// conflict.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    if !target.exists() {
        return Err(MbError::NotFound(format!(
            "Symlink target {} does not exist (for {})",
            target.display(),
            link.display()
        )));
    }
    match link.symlink_metadata() {
        Ok(meta) if meta.file_type().is_symlink() => {
            debug!("Replacing existing symlink at {}", link.display());
            fs::remove_file(link)?;
        }
        Ok(_) => {
            error!("Refusing to overwrite {} with a symlink", link.display());
            return Err(MbError::LinkConflict(link.display().to_string()));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(MbError::from(e)),
    }
    if let Some(parent) = link.parent() {
        create_dir_all(parent)?;
    }
    create_symlink(target, link)
}

/// Removes whatever is at `path` (symlink, file or directory). Missing paths
/// are not an error.
pub fn remove_existing_link_target(path: &Path) -> Result<()> {
    match path.symlink_metadata() {
        Ok(metadata) => {
            debug!("Removing existing item at link target: {}", path.display());
            let is_real_dir = metadata.file_type().is_dir() && !metadata.file_type().is_symlink();
            let remove_result = if is_real_dir {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            remove_result.map_err(|e| {
                debug!(
                    "Failed to remove existing item at link target {}: {}",
                    path.display(),
                    e
                );
                MbError::Io(Arc::new(e))
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MbError::Io(Arc::new(e))),
    }
}

/// Sets file permissions (Unix only). Mode is standard Unix octal mode.
#[cfg(unix)]
pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    debug!("Setting permissions on {}: {:o}", path.display(), mode);
    fs::set_permissions(path, Permissions::from_mode(mode)).map_err(|e| {
        error!("Failed set permissions on {}: {}", path.display(), e);
        MbError::from(e)
    })
}

#[cfg(not(unix))]
pub fn set_permissions(path: &Path, _mode: u32) -> Result<()> {
    warn!(
        "Setting permissions not fully supported on this platform: {}",
        path.display()
    );
    Ok(())
}

/// Atomically writes data to a file using a temporary file in the same
/// directory. Preserves original permissions if the file existed.
pub fn atomic_write_file(original_path: &Path, content: &[u8]) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        MbError::InstallError(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;
    create_dir_all(dir)?;

    let original_perms = fs::metadata(original_path).map(|m| m.permissions()).ok();

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_path.display()
    );
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist temporary file {} over {}: {}",
            temp_path.display(),
            original_path.display(),
            e.error
        );
        MbError::Io(Arc::new(e.error))
    })?;

    match original_perms {
        Some(perms) => {
            if let Err(e) = fs::set_permissions(original_path, perms) {
                warn!(
                    "Failed to restore original permissions on {}: {}",
                    original_path.display(),
                    e
                );
            }
        }
        None => {
            if let Err(e) = set_permissions(original_path, 0o644) {
                warn!(
                    "Failed to set default permissions on new file {}: {}",
                    original_path.display(),
                    e
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn replace_symlink_swaps_stale_links() {
        let tmp = TempDir::new().unwrap();
        let old_target = tmp.path().join("old");
        let new_target = tmp.path().join("new");
        fs::create_dir(&old_target).unwrap();
        fs::create_dir(&new_target).unwrap();
        let link = tmp.path().join("links").join("product");

        replace_symlink(&old_target, &link).unwrap();
        replace_symlink(&new_target, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), new_target);
        assert!(symlink_resolves(&link));
    }

    #[test]
    fn replace_symlink_refuses_regular_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = tmp.path().join("occupied");
        fs::write(&link, b"user data").unwrap();

        let err = replace_symlink(&target, &link).unwrap_err();
        assert!(matches!(err, MbError::LinkConflict(_)));
        assert_eq!(fs::read(&link).unwrap(), b"user data");
    }

    #[test]
    fn replace_symlink_requires_existing_target() {
        let tmp = TempDir::new().unwrap();
        let err = replace_symlink(&tmp.path().join("missing"), &tmp.path().join("l")).unwrap_err();
        assert!(matches!(err, MbError::NotFound(_)));
        assert!(tmp.path().join("l").symlink_metadata().is_err());
    }

    #[test]
    fn atomic_write_creates_parent_and_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("receipt.json");
        atomic_write_file(&path, b"{}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");
        remove_existing_link_target(&path).unwrap();
        remove_existing_link_target(&path).unwrap();
        assert!(!path.exists());
    }
}
