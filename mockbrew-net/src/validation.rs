// mockbrew-net/src/validation.rs
use std::path::Path;

use mockbrew_common::error::{MbError, Result};
use url::Url;

/// Verifies the SHA256 checksum of a downloaded file.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    mockbrew_aio::checksum::verify_checksum_sync(path, expected)
}

/// Validates a download URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str)
        .map_err(|e| MbError::ValidationError(format!("Failed to parse URL '{url_str}': {e}")))?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(MbError::ValidationError(format!(
            "Invalid URL scheme for '{}': Must be https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_https_is_accepted() {
        validate_url("https://oss.sonatype.org/x.tar").unwrap();
        assert!(matches!(
            validate_url("http://oss.sonatype.org/x.tar"),
            Err(MbError::ValidationError(_))
        ));
        assert!(validate_url("not a url").is_err());
    }
}
