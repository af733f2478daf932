use std::path::Path;

use clap::Args;
use colored::Colorize;
use mockbrew_common::config::Config;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::keg::KegRegistry;
use mockbrew_core::uninstall::uninstall_keg;
use tracing::{debug, error};
use walkdir::WalkDir;

#[derive(Args, Debug)]
pub struct Uninstall {
    /// The formula to uninstall (every installed version is removed)
    pub name: String,
}

impl Uninstall {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let name = &self.name;
        if name.contains('/') || name.contains("..") {
            return Err(MbError::ValidationError(format!(
                "Invalid formula name '{name}' contains disallowed characters"
            )));
        }

        let kegs: Vec<_> = KegRegistry::new(config.clone())
            .list_installed_kegs()?
            .into_iter()
            .filter(|k| &k.name == name)
            .collect();
        if kegs.is_empty() {
            return Err(MbError::NotFound(format!("{name} is not installed")));
        }

        let mut failures = Vec::new();
        for keg in &kegs {
            println!("Uninstalling {} {}...", name, keg.version_str);
            let (file_count, size_bytes) = count_files_and_size(&keg.path);
            match uninstall_keg(keg, config) {
                Ok(report) => {
                    debug!("Removed {} links for {}", report.removed_links, name);
                    println!(
                        "✓ Uninstalled {} {} ({} files, {})",
                        name.green(),
                        keg.version_str,
                        file_count,
                        format_size(size_bytes)
                    );
                    println!("  Logs kept in {}", report.log_dir.display());
                }
                Err(e) => {
                    error!("✖ Failed to uninstall '{}': {}", name.cyan(), e);
                    failures.push(format!("{}: {}", keg.version_str, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MbError::InstallError(format!(
                "Failed to uninstall {}: {}",
                name,
                failures.join("; ")
            )))
        }
    }
}

fn count_files_and_size(path: &Path) -> (usize, u64) {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(count, size), entry| {
            let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (count + 1, size + len)
        })
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0MB");
    }
}
