use clap::Args;
use colored::Colorize;
use mockbrew_common::config::Config;
use mockbrew_common::error::Result;
use mockbrew_common::keg::KegRegistry;
use mockbrew_common::Formulary;
use prettytable::{format, Cell, Row, Table};

#[derive(Args, Debug)]
pub struct List {}

impl List {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let kegs = KegRegistry::new(config.clone()).list_installed_kegs()?;
        if kegs.is_empty() {
            println!("{}", "0 formulas installed".yellow());
            return Ok(());
        }

        let formulary = Formulary::new(config);
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        table.add_row(Row::new(vec![
            Cell::new("Name").style_spec("b"),
            Cell::new("Installed").style_spec("b"),
            Cell::new("Available").style_spec("b"),
            Cell::new("Path").style_spec("b"),
        ]));
        for keg in &kegs {
            let available = formulary
                .load_formula(&keg.name)
                .map(|f| f.version_str().to_string())
                .unwrap_or_else(|_| "-".to_string());
            table.add_row(Row::new(vec![
                Cell::new(&keg.name).style_spec("Fb"),
                Cell::new(&keg.version_str),
                Cell::new(&available),
                Cell::new(&keg.path.display().to_string()),
            ]));
        }
        table.printstd();
        println!("{}", format!("{} formulas installed", kegs.len()).bold());
        Ok(())
    }
}
