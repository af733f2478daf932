// mockbrew-aio/src/json_io.rs
use std::path::Path;
use std::sync::Arc;

use mockbrew_common::error::{MbError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub fn write_json_sync<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    debug!("Sync Writing JSON to: {}", path.display());
    let json_bytes = serde_json::to_vec_pretty(data).map_err(|e| MbError::Json(Arc::new(e)))?;
    crate::fs::atomic_write_file(path, &json_bytes)
}

pub fn read_json_sync<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Sync Reading JSON from: {}", path.display());
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| MbError::Json(Arc::new(e)))
}
