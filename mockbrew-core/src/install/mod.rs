// mockbrew-core/src/install/mod.rs
pub mod installer;
pub mod link;
pub mod requirements;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mockbrew_aio::extract::{extract_archive_async, infer_artifact_root};
use mockbrew_aio::fs::{create_dir_all, remove_directory_recursive};
use mockbrew_aio::json_io::{read_json_sync, write_json_sync};
use mockbrew_common::config::Config;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::keg::InstalledKeg;
use mockbrew_common::model::Formula;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

pub use installer::{InstallLayout, InstallReport, Installer};

pub const INSTALL_RECEIPT: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Skip the formula's runtime requirement checks.
    pub skip_requirements: bool,
    /// Replace an existing keg of the same version.
    pub force: bool,
}

/// Metadata written into every keg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub source_url: String,
    pub sha256: String,
    pub installed_at: DateTime<Utc>,
    pub install_root: PathBuf,
    pub log_dir: PathBuf,
    /// Product link the smoke test launches.
    pub launcher: PathBuf,
    pub port_flag: String,
    pub requirements_checked: bool,
}

impl InstallReceipt {
    pub fn read(keg_path: &Path) -> Result<Self> {
        read_json_sync(&keg_path.join(INSTALL_RECEIPT))
    }
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub keg: InstalledKeg,
    pub layout: InstallLayout,
    pub report: InstallReport,
    pub prefix_links: Vec<PathBuf>,
}

/// Installs `formula` from an already verified archive: checks requirements,
/// unpacks into a staging directory under `<prefix>/tmp`, runs the
/// [`Installer`] into a fresh keg, writes the receipt and links the keg into
/// the prefix. A failed install removes the partially built keg.
pub async fn install_formula(
    formula: &Formula,
    archive_path: &Path,
    config: &Config,
    options: InstallOptions,
) -> Result<InstallOutcome> {
    formula.validate()?;
    if options.skip_requirements {
        debug!("Skipping requirement checks for {}", formula.name());
    } else {
        requirements::check_requirements(formula).await?;
    }

    let keg_path = config.formula_keg_path(formula.name(), formula.version_str());
    if keg_path.exists() {
        if !options.force {
            return Err(MbError::InstallError(format!(
                "{} {} is already installed at {} (use --force to reinstall)",
                formula.name(),
                formula.version_str(),
                keg_path.display()
            )));
        }
        debug!("Removing existing keg before reinstall: {}", keg_path.display());
        link::unlink_keg(&keg_path, config)?;
        remove_directory_recursive(&keg_path)?;
    }

    create_dir_all(&config.tmp_dir())?;
    let staging = tempfile::Builder::new()
        .prefix(&format!("{}-stage-", formula.name()))
        .tempdir_in(config.tmp_dir())?;
    extract_archive_async(archive_path, staging.path(), 0).await?;
    let artifact_root = infer_artifact_root(staging.path())?;

    let layout = InstallLayout::for_keg(formula, config);
    let result = build_keg(
        formula,
        &layout,
        &artifact_root,
        &keg_path,
        config,
        !options.skip_requirements,
    );
    if let Err(e) = &result {
        error!("Install of {} failed: {}", formula.name(), e);
        if keg_path.exists() {
            if let Err(cleanup_err) = remove_directory_recursive(&keg_path) {
                warn!(
                    "Failed to clean up partial keg {}: {}",
                    keg_path.display(),
                    cleanup_err
                );
            }
        }
    }
    let (report, prefix_links) = result?;

    Ok(InstallOutcome {
        keg: InstalledKeg {
            name: formula.name().to_string(),
            version_str: formula.version_str().to_string(),
            path: keg_path,
        },
        layout,
        report,
        prefix_links,
    })
}

fn build_keg(
    formula: &Formula,
    layout: &InstallLayout,
    artifact_root: &Path,
    keg_path: &Path,
    config: &Config,
    requirements_checked: bool,
) -> Result<(InstallReport, Vec<PathBuf>)> {
    let installer = Installer::new(layout);
    let report = installer.install(artifact_root)?;
    installer.verify()?;

    let receipt = InstallReceipt {
        name: formula.name().to_string(),
        version: formula.version_str().to_string(),
        source_url: formula.url.clone(),
        sha256: formula.sha256.clone(),
        installed_at: Utc::now(),
        install_root: layout.install_root.clone(),
        log_dir: layout.log_dir.clone(),
        launcher: layout.exec_link(),
        port_flag: formula.port_flag.clone(),
        requirements_checked,
    };
    write_json_sync(&keg_path.join(INSTALL_RECEIPT), &receipt)?;

    let prefix_links = link::link_keg(formula.name(), keg_path, config)?;
    debug!(
        "Installed {} {} with {} prefix links",
        formula.name(),
        formula.version_str(),
        prefix_links.len()
    );
    Ok((report, prefix_links))
}
