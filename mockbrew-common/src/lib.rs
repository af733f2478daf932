// mockbrew-common/src/lib.rs
pub mod config;
pub mod error;
pub mod formulary;
pub mod keg;
pub mod model;

// Re-export key types
pub use config::Config;
pub use error::{MbError, Result};
pub use formulary::Formulary;
pub use model::{Formula, Requirement};
