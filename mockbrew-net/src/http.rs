use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mockbrew_common::config::Config;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::model::formula::Formula;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::validation::{validate_url, verify_checksum};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = "mockbrew package manager (Rust)";

/// Returns a verified copy of the formula's archive from the download cache,
/// downloading it first when missing or corrupt.
pub async fn fetch_formula_archive(formula: &Formula, config: &Config) -> Result<PathBuf> {
    let cache_dir = config.cache_dir();
    let cache_path = cache_dir.join(formula.archive_filename());
    debug!(
        "Preparing to fetch archive for '{}' from URL: {}",
        formula.name(),
        formula.url
    );
    debug!("Target cache path: {}", cache_path.display());

    if cache_path.is_file() {
        match verify_checksum(&cache_path, &formula.sha256) {
            Ok(()) => {
                debug!("Using valid cached file: {}", cache_path.display());
                return Ok(cache_path);
            }
            Err(e) => {
                debug!(
                    "Cached file checksum mismatch ({}): {}. Redownloading.",
                    cache_path.display(),
                    e
                );
                if let Err(remove_err) = fs::remove_file(&cache_path) {
                    debug!(
                        "Failed to remove corrupted cached file {}: {}",
                        cache_path.display(),
                        remove_err
                    );
                }
            }
        }
    } else {
        debug!("File not found in cache.");
    }

    fs::create_dir_all(&cache_dir).map_err(|e| {
        MbError::InstallError(format!(
            "Failed to create cache directory {}: {}",
            cache_dir.display(),
            e
        ))
    })?;
    validate_url(&formula.url)?;

    let client = build_http_client()?;
    download_and_verify(&client, &formula.url, &cache_path, &formula.sha256)
        .await
        .map_err(|e| {
            error!("Download failed from {}: {}", formula.url, e);
            match e {
                MbError::ChecksumError(_) | MbError::DownloadError(..) => e,
                other => MbError::DownloadError(
                    formula.name().to_string(),
                    formula.url.clone(),
                    other.to_string(),
                ),
            }
        })
}

fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| MbError::HttpError(format!("Failed to build HTTP client: {e}")))
}

/// Streams `url` into a hidden temp file next to `final_path`, verifies it,
/// then renames it into place. A failed download never leaves a file at
/// `final_path`.
async fn download_and_verify(
    client: &Client,
    url: &str,
    final_path: &Path,
    sha256_expected: &str,
) -> Result<PathBuf> {
    let file_name = final_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = final_path.with_file_name(format!(".{file_name}.download"));
    debug!("Downloading to temporary path: {}", temp_path.display());
    if temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            tracing::warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    let mut response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        MbError::HttpError(format!("HTTP request failed for {url}: {e}"))
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        return Err(match status {
            StatusCode::NOT_FOUND => MbError::DownloadError(
                file_name,
                url.to_string(),
                "Resource not found (404)".to_string(),
            ),
            StatusCode::FORBIDDEN => MbError::DownloadError(
                file_name,
                url.to_string(),
                "Access forbidden (403)".to_string(),
            ),
            _ => MbError::HttpError(format!("HTTP error {status} for URL {url}")),
        });
    }

    let mut temp_file = TokioFile::create(&temp_path).await.map_err(|e| {
        MbError::InstallError(format!(
            "Failed to create temp file {}: {}",
            temp_path.display(),
            e
        ))
    })?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MbError::HttpError(format!("Failed to read response body: {e}")))?
    {
        temp_file.write_all(&chunk).await?;
    }
    temp_file.flush().await?;
    drop(temp_file);

    if let Err(e) = verify_checksum(&temp_path, sha256_expected) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    fs::rename(&temp_path, final_path).map_err(|e| {
        MbError::InstallError(format!(
            "Failed to move temp file {} to {}: {}",
            temp_path.display(),
            final_path.display(),
            e
        ))
    })?;
    debug!("Moved verified file to final location: {}", final_path.display());
    Ok(final_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const HELLO_SHA: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[tokio::test]
    async fn downloads_and_verifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.tar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello\n".to_vec()))
            .mount(&server)
            .await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("pkg.tar");
        let client = build_http_client().unwrap();

        let got = download_and_verify(&client, &format!("{}/pkg.tar", server.uri()), &dest, HELLO_SHA)
            .await
            .unwrap();
        assert_eq!(got, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"hello\n");
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_nothing_behind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&server)
            .await;
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("pkg.tar");
        let client = build_http_client().unwrap();

        let err = download_and_verify(&client, &format!("{}/pkg.tar", server.uri()), &dest, HELLO_SHA)
            .await
            .unwrap_err();
        assert!(matches!(err, MbError::ChecksumError(_)));
        assert!(!dest.exists());
        assert!(!tmp.path().join(".pkg.tar.download").exists());
    }

    #[tokio::test]
    async fn missing_resource_is_a_download_error() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let client = build_http_client().unwrap();
        let err = download_and_verify(
            &client,
            &format!("{}/missing.tar", server.uri()),
            &tmp.path().join("missing.tar"),
            HELLO_SHA,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MbError::DownloadError(..)));
    }

    #[tokio::test]
    async fn valid_cache_entry_skips_network() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_prefix(tmp.path());
        let mut formula = Formula::mockserver();
        formula.sha256 = HELLO_SHA.to_string();
        fs::create_dir_all(config.cache_dir()).unwrap();
        let cached = config.cache_dir().join(formula.archive_filename());
        fs::write(&cached, b"hello\n").unwrap();

        assert_eq!(fetch_formula_archive(&formula, &config).await.unwrap(), cached);
    }
}
