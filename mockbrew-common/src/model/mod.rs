// src/model/mod.rs
pub mod formula;
pub mod requirement;

// Re-export
pub use formula::Formula;
pub use requirement::Requirement;
