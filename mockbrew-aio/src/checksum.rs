// mockbrew-aio/src/checksum.rs
use std::path::Path;
use std::sync::Arc;

use mockbrew_common::error::{MbError, Result};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Asynchronously verifies the SHA256 checksum of a file.
pub async fn verify_checksum_async(path: &Path, expected: &str) -> Result<()> {
    debug!("Async Verifying checksum for: {}", path.display());
    let mut file = File::open(path).await.map_err(|e| MbError::Io(Arc::new(e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = Vec::with_capacity(8192);
    let mut total_bytes_read = 0u64;
    loop {
        buffer.clear();
        match file.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
                total_bytes_read += n as u64;
            }
            Err(e) => return Err(MbError::Io(Arc::new(e))),
        }
    }
    let actual = hex::encode(hasher.finalize());
    debug!(
        "Async Calculated SHA256: {} ({} bytes read)",
        actual, total_bytes_read
    );
    compare(path, expected, &actual)
}

pub fn verify_checksum_sync(path: &Path, expected: &str) -> Result<()> {
    debug!("Sync Verifying checksum for: {}", path.display());
    let actual = sha256_file(path)?;
    compare(path, expected, &actual)
}

/// Hex-encoded SHA256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let std_file = std::fs::File::open(path).map_err(|e| MbError::Io(Arc::new(e)))?;
    let mut reader = std::io::BufReader::new(std_file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn compare(path: &Path, expected: &str, actual: &str) -> Result<()> {
    debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(MbError::ChecksumError(format!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[tokio::test]
    async fn verifies_matching_and_mismatching_digests() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, b"hello\n").unwrap();

        verify_checksum_async(&path, HELLO).await.unwrap();
        verify_checksum_sync(&path, &HELLO.to_uppercase()).unwrap();
        let err = verify_checksum_sync(&path, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, MbError::ChecksumError(_)));
    }
}
