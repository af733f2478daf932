// mockbrew-core/src/lib.rs

pub mod install;
pub mod smoke;
pub mod uninstall;

pub use install::{install_formula, InstallOptions, InstallOutcome, InstallReceipt};
pub use smoke::{SmokeReport, SmokeStage, SmokeTest};
pub use uninstall::{uninstall_keg, UninstallReport};
