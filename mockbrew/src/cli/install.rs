use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use mockbrew_aio::checksum::verify_checksum_async;
use mockbrew_common::config::Config;
use mockbrew_common::error::Result;
use mockbrew_core::install::{install_formula, InstallOptions};
use mockbrew_net::http::fetch_formula_archive;
use tracing::debug;

use super::{header, resolve_formula, DEFAULT_FORMULA};

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Formula to install
    #[arg(default_value = DEFAULT_FORMULA)]
    pub name: String,

    /// Use a local archive instead of downloading; it must match the
    /// formula's sha256
    #[arg(long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Read the formula from a JSON file instead of looking it up by name
    #[arg(long, value_name = "PATH")]
    pub formula_file: Option<PathBuf>,

    /// Do not check for a Java runtime before installing
    #[arg(long)]
    pub skip_requirements: bool,

    /// Replace an existing installation of the same version
    #[arg(long)]
    pub force: bool,
}

impl InstallArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formula = resolve_formula(config, &self.name, self.formula_file.as_deref())?;
        header(&format!(
            "Installing {} {}",
            formula.name(),
            formula.version_str()
        ));

        let archive = match &self.archive {
            Some(path) => {
                debug!("Verifying local archive {}", path.display());
                verify_checksum_async(path, &formula.sha256).await?;
                path.clone()
            }
            None => {
                println!("Downloading {}", formula.url.dimmed());
                fetch_formula_archive(&formula, config).await?
            }
        };

        let options = InstallOptions {
            skip_requirements: self.skip_requirements,
            force: self.force,
        };
        let outcome = install_formula(&formula, &archive, config, options).await?;

        println!(
            "{} Installed {} {} to {} ({} entries)",
            "✓".green(),
            formula.name().green(),
            formula.version_str(),
            outcome.keg.path.display(),
            outcome.report.entries_installed
        );
        for (link, target) in &outcome.report.links {
            println!("  {} -> {}", link.display(), target.display());
        }
        if outcome.report.log_dir_created {
            println!("  Created log directory {}", outcome.layout.log_dir.display());
        }
        println!(
            "Run {} to check the server starts.",
            format!("mockbrew test {}", formula.name()).cyan()
        );
        Ok(())
    }
}
