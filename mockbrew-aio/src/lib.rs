// mockbrew-aio/src/lib.rs
//! IO operations for mockbrew (filesystem, json, checksums, archives, processes)

pub mod checksum;
pub mod extract;
pub mod fs;
pub mod json_io;
pub mod process;

pub use checksum::{verify_checksum_async, verify_checksum_sync};
pub use extract::{extract_archive, extract_archive_async};
pub use fs::*;
pub use json_io::{read_json_sync, write_json_sync};
pub use process::{run_command_async, SupervisedChild};
