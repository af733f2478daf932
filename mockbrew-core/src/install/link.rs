// mockbrew-core/src/install/link.rs
use std::fs;
use std::path::{Path, PathBuf};

use mockbrew_aio::fs::{create_dir_all, remove_existing_link_target, replace_symlink};
use mockbrew_aio::json_io::{read_json_sync, write_json_sync};
use mockbrew_common::config::Config;
use mockbrew_common::error::Result;
use tracing::{debug, warn};

pub const INSTALL_MANIFEST: &str = "INSTALL_MANIFEST.json";

/// Keg subdirectories whose entries are linked into the prefix.
const LINKED_KEG_DIRS: [&str; 2] = ["bin", "lib"];

/// Links a keg into the prefix: `opt/<name>` to the keg, and every entry of the
/// keg's `bin/` and `lib/` into the prefix's `bin/` and `lib/`. Returns the
/// created links, which are also recorded in the keg's install manifest.
///
/// On failure every link made so far is removed again, and links that
/// previously pointed elsewhere are restored.
pub fn link_keg(name: &str, keg_path: &Path, config: &Config) -> Result<Vec<PathBuf>> {
    debug!("Linking {} from {}", name, keg_path.display());
    let mut created: Vec<CreatedLink> = Vec::new();
    match link_all(name, keg_path, config, &mut created) {
        Ok(()) => {
            let links: Vec<PathBuf> = created.into_iter().map(|c| c.link).collect();
            write_install_manifest(keg_path, &links)?;
            Ok(links)
        }
        Err(e) => {
            warn!(
                "Linking {} failed: {}; rolling back {} link(s)",
                name,
                e,
                created.len()
            );
            roll_back(&created);
            Err(e)
        }
    }
}

struct CreatedLink {
    link: PathBuf,
    previous: Option<PathBuf>,
}

fn link_all(
    name: &str,
    keg_path: &Path,
    config: &Config,
    created: &mut Vec<CreatedLink>,
) -> Result<()> {
    let opt_link = config.formula_opt_path(name);
    link_one(keg_path, opt_link, created)?;

    for dir_name in LINKED_KEG_DIRS {
        let source_dir = keg_path.join(dir_name);
        if !source_dir.is_dir() {
            continue;
        }
        let target_dir = config.prefix().join(dir_name);
        create_dir_all(&target_dir)?;
        for entry in fs::read_dir(&source_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with('.') {
                continue;
            }
            link_one(&entry.path(), target_dir.join(&file_name), created)?;
        }
    }
    Ok(())
}

fn link_one(source: &Path, link: PathBuf, created: &mut Vec<CreatedLink>) -> Result<()> {
    let previous = fs::read_link(&link).ok();
    replace_symlink(source, &link)?;
    debug!("  Linked {} -> {}", link.display(), source.display());
    created.push(CreatedLink { link, previous });
    Ok(())
}

fn roll_back(created: &[CreatedLink]) {
    for c in created.iter().rev() {
        if let Err(e) = remove_existing_link_target(&c.link) {
            warn!("Failed to remove {}: {}", c.link.display(), e);
            continue;
        }
        if let Some(previous) = &c.previous {
            if let Err(e) = replace_symlink(previous, &c.link) {
                debug!("Not restoring {} -> {}: {}", c.link.display(), previous.display(), e);
            }
        }
    }
}

fn write_install_manifest(keg_path: &Path, links: &[PathBuf]) -> Result<()> {
    let manifest: Vec<String> = links
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    write_json_sync(&keg_path.join(INSTALL_MANIFEST), &manifest)
}

/// Removes the prefix links recorded for a keg. Only symlinks inside the
/// managed prefix directories that still point into this keg are touched, so
/// links since taken over by another version survive. Returns how many links
/// were removed.
pub fn unlink_keg(keg_path: &Path, config: &Config) -> Result<usize> {
    let manifest_path = keg_path.join(INSTALL_MANIFEST);
    if !manifest_path.is_file() {
        warn!(
            "No install manifest at {}; nothing to unlink",
            manifest_path.display()
        );
        return Ok(0);
    }
    let links: Vec<String> = read_json_sync(&manifest_path)?;
    let managed = [config.opt_dir(), config.bin_dir(), config.lib_dir()];
    let keg_canonical = keg_path.canonicalize().unwrap_or_else(|_| keg_path.to_path_buf());

    let mut removed = 0;
    for link in links.iter().map(PathBuf::from) {
        if !managed.iter().any(|base| link.starts_with(base)) {
            warn!("Refusing to unlink {}: outside managed prefix", link.display());
            continue;
        }
        let Ok(target) = fs::read_link(&link) else {
            debug!("{} is no longer a symlink; skipping", link.display());
            continue;
        };
        let points_into_keg = target.starts_with(keg_path)
            || target
                .canonicalize()
                .map(|t| t.starts_with(&keg_canonical))
                .unwrap_or(false);
        if !points_into_keg {
            debug!(
                "{} now points at {}; leaving it alone",
                link.display(),
                target.display()
            );
            continue;
        }
        remove_existing_link_target(&link)?;
        debug!("Removed link {}", link.display());
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use mockbrew_common::error::MbError;
    use tempfile::TempDir;

    use super::*;

    fn fake_keg(config: &Config, version: &str) -> PathBuf {
        let keg = config.formula_keg_path("mockserver", version);
        fs::create_dir_all(keg.join("libexec/bin")).unwrap();
        fs::create_dir_all(keg.join("bin")).unwrap();
        fs::write(keg.join("libexec/bin/run_mockserver.sh"), "#!/bin/sh\n").unwrap();
        std::os::unix::fs::symlink(
            keg.join("libexec/bin/run_mockserver.sh"),
            keg.join("bin/mockserver"),
        )
        .unwrap();
        keg
    }

    #[test]
    fn links_and_unlinks_keg() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let keg = fake_keg(&config, "3.9.15");

        let links = link_keg("mockserver", &keg, &config).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            fs::read_link(config.bin_dir().join("mockserver")).unwrap(),
            keg.join("bin/mockserver")
        );
        assert!(config.bin_dir().join("mockserver").exists());
        assert_eq!(fs::read_link(config.formula_opt_path("mockserver")).unwrap(), keg);

        assert_eq!(unlink_keg(&keg, &config).unwrap(), 2);
        assert!(!config.bin_dir().join("mockserver").exists());
        assert!(config.bin_dir().is_dir());
    }

    #[test]
    fn failed_link_removes_partial_links() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let keg = fake_keg(&config, "3.9.15");
        fs::create_dir_all(config.bin_dir()).unwrap();
        fs::write(config.bin_dir().join("mockserver"), "user file").unwrap();

        let err = link_keg("mockserver", &keg, &config).unwrap_err();
        assert!(matches!(err, MbError::LinkConflict(_)), "{err}");
        assert!(fs::symlink_metadata(config.formula_opt_path("mockserver")).is_err());
        assert_eq!(
            fs::read_to_string(config.bin_dir().join("mockserver")).unwrap(),
            "user file"
        );
        assert!(!keg.join(INSTALL_MANIFEST).exists());
    }

    #[test]
    fn failed_relink_restores_previous_links() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let old = fake_keg(&config, "3.9.14");
        link_keg("mockserver", &old, &config).unwrap();
        let new = fake_keg(&config, "3.9.15");
        fs::create_dir_all(new.join("lib")).unwrap();
        fs::write(new.join("lib/mockserver"), "jar").unwrap();
        fs::create_dir_all(config.lib_dir()).unwrap();
        fs::write(config.lib_dir().join("mockserver"), "user file").unwrap();

        assert!(link_keg("mockserver", &new, &config).is_err());
        assert_eq!(fs::read_link(config.formula_opt_path("mockserver")).unwrap(), old);
        assert_eq!(
            fs::read_link(config.bin_dir().join("mockserver")).unwrap(),
            old.join("bin/mockserver")
        );
    }

    #[test]
    fn unlink_leaves_links_owned_by_other_kegs() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let old = fake_keg(&config, "3.9.14");
        let new = fake_keg(&config, "3.9.15");
        link_keg("mockserver", &old, &config).unwrap();
        link_keg("mockserver", &new, &config).unwrap();

        assert_eq!(unlink_keg(&old, &config).unwrap(), 0);
        assert_eq!(
            fs::read_link(config.bin_dir().join("mockserver")).unwrap(),
            new.join("bin/mockserver")
        );
    }
}
