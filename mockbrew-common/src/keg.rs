// mockbrew-common/src/keg.rs
use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;

use semver::Version;
use tracing::{debug, warn};

use super::config::Config;
use super::error::Result;

/// An installed version of a formula under the Cellar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeg {
    pub name: String,
    pub version_str: String,
    pub path: PathBuf,
}

impl InstalledKeg {
    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }
}

/// Queries installed packages in the Cellar.
#[derive(Debug)]
pub struct KegRegistry {
    config: Config,
}

impl KegRegistry {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn cellar_path(&self) -> PathBuf {
        self.config.cellar_dir()
    }

    /// Returns the newest installed keg for `name`, if any.
    pub fn get_installed_keg(&self, name: &str) -> Result<Option<InstalledKeg>> {
        let formula_dir = self.config.formula_cellar_dir(name);
        debug!(
            "[KEG_REGISTRY:{}] Looking for kegs in {}",
            name,
            formula_dir.display()
        );
        if !formula_dir.is_dir() {
            return Ok(None);
        }
        let mut kegs = self.kegs_in(name, &formula_dir)?;
        kegs.sort_by(|a, b| compare_versions(&a.version_str, &b.version_str));
        let latest = kegs.pop();
        if let Some(keg) = &latest {
            debug!(
                "[KEG_REGISTRY:{}] Latest keg: {} ({})",
                name,
                keg.version_str,
                keg.path.display()
            );
        }
        Ok(latest)
    }

    pub fn list_installed_kegs(&self) -> Result<Vec<InstalledKeg>> {
        let cellar_dir = self.cellar_path();
        let mut installed = Vec::new();
        if !cellar_dir.is_dir() {
            debug!("[KEG_REGISTRY] Cellar not found at {}", cellar_dir.display());
            return Ok(installed);
        }
        for entry in fs::read_dir(&cellar_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("[KEG_REGISTRY] Error reading entry in cellar: {}. Skipping.", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                installed.extend(self.kegs_in(name, &path)?);
            }
        }
        installed.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| compare_versions(&a.version_str, &b.version_str))
        });
        debug!("[KEG_REGISTRY] Found {} installed kegs", installed.len());
        Ok(installed)
    }

    fn kegs_in(&self, name: &str, formula_dir: &std::path::Path) -> Result<Vec<InstalledKeg>> {
        let mut kegs = Vec::new();
        for entry in fs::read_dir(formula_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        "[KEG_REGISTRY:{}] Error reading entry in {}: {}. Skipping.",
                        name,
                        formula_dir.display(),
                        e
                    );
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(version_str) = path.file_name().and_then(|n| n.to_str()) {
                kegs.push(InstalledKeg {
                    name: name.to_string(),
                    version_str: version_str.to_string(),
                    path: path.clone(),
                });
            }
        }
        Ok(kegs)
    }
}

/// Semver order when both sides parse, lexicographic otherwise.
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}
