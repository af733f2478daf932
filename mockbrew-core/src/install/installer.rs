// mockbrew-core/src/install/installer.rs
//! Places an unpacked artifact into its install root and wires the product
//! symlinks and the persistent log directory around it.

use std::fs;
use std::path::{Path, PathBuf};

use mockbrew_aio::fs::{create_dir_all, remove_existing_link_target, replace_symlink, symlink_resolves};
use mockbrew_common::config::Config;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::model::formula::Formula;
use tracing::{debug, error};

/// Where each piece of an installation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Name of the product links (`mockserver`).
    pub product: String,
    /// Launcher script under `<install_root>/bin`.
    pub launcher: String,
    /// Receives the artifact contents (`bin/`, `lib/`, ...).
    pub install_root: PathBuf,
    /// Executable search directory that gets the product link.
    pub exec_dir: PathBuf,
    /// Library search directory that gets the product link.
    pub lib_dir: PathBuf,
    /// Persistent log directory outside the install root.
    pub log_dir: PathBuf,
}

impl InstallLayout {
    /// Homebrew keg layout: the artifact goes to `<keg>/libexec`, product links
    /// to `<keg>/bin` and `<keg>/lib`, logs to `<prefix>/var/log/<name>`.
    pub fn for_keg(formula: &Formula, config: &Config) -> Self {
        let keg = config.formula_keg_path(formula.name(), formula.version_str());
        Self {
            product: formula.name().to_string(),
            launcher: formula.launcher.clone(),
            install_root: keg.join("libexec"),
            exec_dir: keg.join("bin"),
            lib_dir: keg.join("lib"),
            log_dir: config.formula_log_dir(formula.name()),
        }
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.install_root.join("bin").join(&self.launcher)
    }

    pub fn exec_link(&self) -> PathBuf {
        self.exec_dir.join(&self.product)
    }

    pub fn lib_link(&self) -> PathBuf {
        self.lib_dir.join(&self.product)
    }

    pub fn log_link(&self) -> PathBuf {
        self.install_root.join("log")
    }

    /// `(link, target)` for the three links an install creates.
    pub fn links(&self) -> [(PathBuf, PathBuf); 3] {
        [
            (self.exec_link(), self.launcher_path()),
            (self.lib_link(), self.install_root.join("lib")),
            (self.log_link(), self.log_dir.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub entries_installed: usize,
    pub links: Vec<(PathBuf, PathBuf)>,
    /// False when the log directory was already there (reinstall).
    pub log_dir_created: bool,
}

pub struct Installer<'a> {
    layout: &'a InstallLayout,
}

impl<'a> Installer<'a> {
    pub fn new(layout: &'a InstallLayout) -> Self {
        Self { layout }
    }

    /// Runs the install steps in order and stops at the first failure. Nothing
    /// is rolled back here; the caller owns cleanup of a partial install.
    pub fn install(&self, artifact_root: &Path) -> Result<InstallReport> {
        let layout = self.layout;
        debug!(
            "Installing {} from {} into {}",
            layout.product,
            artifact_root.display(),
            layout.install_root.display()
        );

        let entries_installed = move_tree_contents(artifact_root, &layout.install_root)?;

        let launcher = layout.launcher_path();
        if !launcher.is_file() {
            error!("Launcher {} missing from artifact", launcher.display());
            return Err(MbError::NotFound(format!(
                "Launcher script {} not found in artifact",
                launcher.display()
            )));
        }

        let mut links = Vec::with_capacity(3);
        let [exec, lib, log] = layout.links();

        replace_symlink(&exec.1, &exec.0)?;
        links.push(exec);
        replace_symlink(&lib.1, &lib.0)?;
        links.push(lib);

        let log_dir_created = !layout.log_dir.is_dir();
        create_dir_all(&layout.log_dir)?;
        if log_dir_created {
            debug!("Created log directory {}", layout.log_dir.display());
        } else {
            debug!("Log directory {} already present", layout.log_dir.display());
        }

        replace_symlink(&log.1, &log.0)?;
        links.push(log);

        Ok(InstallReport {
            entries_installed,
            links,
            log_dir_created,
        })
    }

    /// Fails if any of the product links is missing, dangling, or points
    /// somewhere else.
    pub fn verify(&self) -> Result<()> {
        for (link, target) in self.layout.links() {
            if !symlink_resolves(&link) {
                return Err(MbError::InstallError(format!(
                    "{} is missing or dangling",
                    link.display()
                )));
            }
            let actual = fs::read_link(&link)?;
            if actual != target {
                return Err(MbError::InstallError(format!(
                    "{} points at {}, expected {}",
                    link.display(),
                    actual.display(),
                    target.display()
                )));
            }
        }
        Ok(())
    }
}

/// Moves every top-level entry of `src` into `dest`. Falls back to
/// copy-then-delete when a rename is not possible (different filesystems).
fn move_tree_contents(src: &Path, dest: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(MbError::NotFound(format!(
            "Artifact directory {} does not exist",
            src.display()
        )));
    }
    create_dir_all(dest)?;
    let mut moved = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        remove_existing_link_target(&to)?;
        if let Err(rename_err) = fs::rename(&from, &to) {
            debug!(
                "Rename {} -> {} failed ({}); copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            let mut options = fs_extra::dir::CopyOptions::new();
            options.copy_inside = false;
            fs_extra::move_items(&[&from], dest, &options).map_err(|e| {
                MbError::InstallError(format!(
                    "Failed to move {} into {}: {}",
                    from.display(),
                    dest.display(),
                    e
                ))
            })?;
        }
        moved += 1;
    }
    debug!("Moved {} entries into {}", moved, dest.display());
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn artifact(root: &Path) -> PathBuf {
        let art = root.join("artifact");
        fs::create_dir_all(art.join("bin")).unwrap();
        fs::create_dir_all(art.join("lib")).unwrap();
        fs::write(art.join("bin/run_mockserver.sh"), "#!/bin/sh\n").unwrap();
        fs::write(art.join("lib/mockserver-netty.jar"), "jar").unwrap();
        art
    }

    fn layout(root: &Path) -> InstallLayout {
        InstallLayout {
            product: "mockserver".into(),
            launcher: "run_mockserver.sh".into(),
            install_root: root.join("root"),
            exec_dir: root.join("bin"),
            lib_dir: root.join("lib"),
            log_dir: root.join("var/log/mockserver"),
        }
    }

    #[test]
    fn clean_install_creates_resolving_links() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        let report = Installer::new(&layout).install(&artifact(tmp.path())).unwrap();

        assert_eq!(report.entries_installed, 2);
        assert!(report.log_dir_created);
        assert_eq!(
            fs::read_link(tmp.path().join("bin/mockserver")).unwrap(),
            tmp.path().join("root/bin/run_mockserver.sh")
        );
        assert_eq!(
            fs::read_link(tmp.path().join("lib/mockserver")).unwrap(),
            tmp.path().join("root/lib")
        );
        assert_eq!(
            fs::read_link(tmp.path().join("root/log")).unwrap(),
            tmp.path().join("var/log/mockserver")
        );
        Installer::new(&layout).verify().unwrap();
    }

    #[test]
    fn existing_log_dir_is_reused() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        fs::create_dir_all(&layout.log_dir).unwrap();
        fs::write(layout.log_dir.join("mockserver.log"), "old run").unwrap();

        let report = Installer::new(&layout).install(&artifact(tmp.path())).unwrap();
        assert!(!report.log_dir_created);
        assert_eq!(
            fs::read_to_string(layout.log_dir.join("mockserver.log")).unwrap(),
            "old run"
        );
    }

    #[test]
    fn missing_launcher_aborts() {
        let tmp = TempDir::new().unwrap();
        let art = artifact(tmp.path());
        fs::remove_file(art.join("bin/run_mockserver.sh")).unwrap();
        let err = Installer::new(&layout(tmp.path())).install(&art).unwrap_err();
        assert!(matches!(err, MbError::NotFound(_)));
    }

    #[test]
    fn conflicting_file_aborts() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        fs::create_dir_all(&layout.lib_dir).unwrap();
        fs::write(layout.lib_link(), "not ours").unwrap();
        let err = Installer::new(&layout).install(&artifact(tmp.path())).unwrap_err();
        assert!(matches!(err, MbError::LinkConflict(_)));
    }

    #[test]
    fn verify_flags_dangling_links() {
        let tmp = TempDir::new().unwrap();
        let layout = layout(tmp.path());
        Installer::new(&layout).install(&artifact(tmp.path())).unwrap();
        fs::remove_dir_all(&layout.log_dir).unwrap();
        assert!(Installer::new(&layout).verify().is_err());
    }

    #[test]
    fn keg_layout_matches_prefix() {
        let config = Config::with_prefix("/p");
        let layout = InstallLayout::for_keg(&Formula::mockserver(), &config);
        assert_eq!(layout.install_root, PathBuf::from("/p/Cellar/mockserver/3.9.15/libexec"));
        assert_eq!(layout.exec_link(), PathBuf::from("/p/Cellar/mockserver/3.9.15/bin/mockserver"));
        assert_eq!(
            layout.launcher_path(),
            PathBuf::from("/p/Cellar/mockserver/3.9.15/libexec/bin/run_mockserver.sh")
        );
        assert_eq!(layout.log_dir, PathBuf::from("/p/var/log/mockserver"));
    }
}
