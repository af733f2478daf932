// mockbrew/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::path::Path;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use mockbrew_common::error::Result;
use mockbrew_common::formulary::load_formula_file;
use mockbrew_common::{Config, Formula, Formulary};

pub mod info;
pub mod install;
pub mod list;
pub mod uninstall;

use crate::cli::info::Info;
use crate::cli::install::InstallArgs;
use crate::cli::list::List;
use crate::cli::test::TestArgs;
use crate::cli::uninstall::Uninstall;

pub const DEFAULT_FORMULA: &str = "mockserver";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "mockbrew", bin_name = "mockbrew")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download, unpack and link a formula
    Install(InstallArgs),
    /// Start the installed server, check it answers, and stop it
    Test(TestArgs),
    Uninstall(Uninstall),
    Info(Info),
    List(List),
}

impl Command {
    pub async fn run(&self, config: &Config) -> Result<()> {
        match self {
            Self::Install(command) => command.run(config).await,
            Self::Test(command) => command.run(config).await,
            Self::Uninstall(command) => command.run(config).await,
            Self::Info(command) => command.run(config).await,
            Self::List(command) => command.run(config).await,
        }
    }
}

/// An explicit formula file wins over name lookup.
pub(crate) fn resolve_formula(
    config: &Config,
    name: &str,
    formula_file: Option<&Path>,
) -> Result<Arc<Formula>> {
    match formula_file {
        Some(path) => Ok(Arc::new(load_formula_file(path)?)),
        None => Formulary::new(config).load_formula(name),
    }
}

pub(crate) fn header(message: &str) {
    println!("{}{}", "==> ".bold().blue(), message.bold());
}
