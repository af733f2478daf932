// mockbrew-net/src/lib.rs
pub mod http;
pub mod port;
pub mod probe;
pub mod validation;

pub use http::fetch_formula_archive;
pub use port::reserve_ephemeral_port;
pub use probe::{Backoff, ServerProbe};
pub use validation::{validate_url, verify_checksum};
