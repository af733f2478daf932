use clap::Args;
use colored::Colorize;
use mockbrew_common::config::Config;
use mockbrew_common::error::Result;
use mockbrew_common::keg::KegRegistry;
use mockbrew_common::{Formula, Formulary};
use mockbrew_core::install::InstallReceipt;
use tracing::debug;

use super::DEFAULT_FORMULA;

#[derive(Args, Debug)]
pub struct Info {
    /// Name of the formula
    #[arg(default_value = DEFAULT_FORMULA)]
    pub name: String,
}

impl Info {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formula = Formulary::new(config).load_formula(&self.name)?;
        print_formula(&formula);

        let kegs: Vec<_> = KegRegistry::new(config.clone())
            .list_installed_kegs()?
            .into_iter()
            .filter(|k| k.name == self.name)
            .collect();
        println!();
        if kegs.is_empty() {
            println!("{}", "Not installed".yellow());
            return Ok(());
        }
        for keg in kegs {
            println!("{} {}", "Installed:".bold(), keg.path.display());
            match InstallReceipt::read(&keg.path) {
                Ok(receipt) => {
                    println!("  Installed at {}", receipt.installed_at.to_rfc3339());
                    println!("  Logs: {}", receipt.log_dir.display());
                    if !receipt.requirements_checked {
                        println!("  {}", "Requirements were not checked".dimmed());
                    }
                }
                Err(e) => debug!("No readable receipt in {}: {}", keg.path.display(), e),
            }
        }
        Ok(())
    }
}

fn print_formula(formula: &Formula) {
    println!(
        "{}: {}",
        formula.name().green().bold(),
        formula.version_str()
    );
    if let Some(desc) = &formula.desc {
        println!("{desc}");
    }
    if let Some(homepage) = &formula.homepage {
        println!("{}", homepage.blue().underline());
    }
    println!("{} {}", "From:".bold(), formula.url);
    println!("{} {}", "SHA-256:".bold(), formula.sha256);
    if !formula.requirements.is_empty() {
        let reqs: Vec<String> = formula.requirements.iter().map(|r| r.to_string()).collect();
        println!("{} {}", "Requires:".bold(), reqs.join(", "));
    }
}
