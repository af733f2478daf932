// mockbrew-core/src/uninstall.rs
use std::fs;
use std::path::PathBuf;

use mockbrew_aio::fs::remove_directory_recursive;
use mockbrew_common::config::Config;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::keg::InstalledKeg;
use tracing::{debug, error, warn};

use crate::install::link;

#[derive(Debug, Clone)]
pub struct UninstallReport {
    pub removed_links: usize,
    pub keg_path: PathBuf,
    /// The log directory is left in place so logs survive reinstalls.
    pub log_dir: PathBuf,
}

/// Unlinks a keg from the prefix and deletes it. The formula's Cellar
/// directory goes too once no other version remains in it.
pub fn uninstall_keg(keg: &InstalledKeg, config: &Config) -> Result<UninstallReport> {
    debug!("Uninstalling {} {}", keg.name, keg.version_str);
    if !keg.path.exists() {
        return Err(MbError::NotFound(format!(
            "Keg {} does not exist",
            keg.path.display()
        )));
    }

    let removed_links = link::unlink_keg(&keg.path, config)?;
    debug!("Removed {} prefix links for {}", removed_links, keg.name);

    if let Err(e) = remove_directory_recursive(&keg.path) {
        error!("Failed to remove keg {}: {}", keg.path.display(), e);
        return Err(MbError::InstallError(format!(
            "Failed to remove keg directory {}: {}",
            keg.path.display(),
            e
        )));
    }

    let formula_cellar = config.formula_cellar_dir(&keg.name);
    match fs::read_dir(&formula_cellar).map(|mut entries| entries.next().is_none()) {
        Ok(true) => {
            if let Err(e) = fs::remove_dir(&formula_cellar) {
                warn!(
                    "Could not remove empty cellar directory {}: {}",
                    formula_cellar.display(),
                    e
                );
            }
        }
        Ok(false) => debug!(
            "Other versions remain in {}; keeping it",
            formula_cellar.display()
        ),
        Err(e) => debug!("Cannot read {}: {}", formula_cellar.display(), e),
    }

    Ok(UninstallReport {
        removed_links,
        keg_path: keg.path.clone(),
        log_dir: config.formula_log_dir(&keg.name),
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn installed(config: &Config, version: &str) -> InstalledKeg {
        let path = config.formula_keg_path("mockserver", version);
        fs::create_dir_all(path.join("libexec/bin")).unwrap();
        fs::create_dir_all(path.join("bin")).unwrap();
        fs::write(path.join("libexec/bin/run_mockserver.sh"), "#!/bin/sh\n").unwrap();
        std::os::unix::fs::symlink(
            path.join("libexec/bin/run_mockserver.sh"),
            path.join("bin/mockserver"),
        )
        .unwrap();
        link::link_keg("mockserver", &path, config).unwrap();
        InstalledKeg {
            name: "mockserver".into(),
            version_str: version.into(),
            path,
        }
    }

    #[test]
    fn removes_keg_links_and_empty_cellar_but_keeps_logs() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let keg = installed(&config, "3.9.15");
        let log_dir = config.formula_log_dir("mockserver");
        fs::create_dir_all(&log_dir).unwrap();

        let report = uninstall_keg(&keg, &config).unwrap();
        assert_eq!(report.removed_links, 2);
        assert!(!keg.path.exists());
        assert!(!config.formula_cellar_dir("mockserver").exists());
        assert!(fs::symlink_metadata(config.formula_opt_path("mockserver")).is_err());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn keeps_cellar_with_other_versions() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let old = installed(&config, "3.9.14");
        let _new = installed(&config, "3.9.15");

        uninstall_keg(&old, &config).unwrap();
        assert!(config.formula_keg_path("mockserver", "3.9.15").is_dir());
        assert!(config.bin_dir().join("mockserver").exists());
    }

    #[test]
    fn missing_keg_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let keg = InstalledKeg {
            name: "mockserver".into(),
            version_str: "1.0.0".into(),
            path: config.formula_keg_path("mockserver", "1.0.0"),
        };
        assert!(matches!(
            uninstall_keg(&keg, &config),
            Err(MbError::NotFound(_))
        ));
    }
}
