// mockbrew-common/src/model/formula.rs
// Formula definitions: where a prebuilt archive comes from and how it is wired
// into the prefix once unpacked.

use semver::Version;
use serde::{Deserialize, Serialize};

use super::requirement::Requirement;
use crate::error::{MbError, Result};

const MOCKSERVER_VERSION: &str = "3.9.15";
const MOCKSERVER_URL: &str = "https://oss.sonatype.org/content/repositories/releases/org/mock-server/mockserver-netty/3.9.15/mockserver-netty-3.9.15-brew-tar.tar";
const MOCKSERVER_SHA256: &str = "0dbe6e78c3753c1da0381322ec0d348c2a3a02783fd65bf280a7bfaff02046d7";

fn default_port_flag() -> String {
    "-serverPort".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Formula {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    /// Download URL of the prebuilt archive.
    pub url: String,
    pub version: String,
    pub sha256: String,
    /// Script under the artifact's `bin/` that starts the server.
    pub launcher: String,
    /// Flag the launcher takes the listen port with.
    #[serde(default = "default_port_flag")]
    pub port_flag: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl Formula {
    /// The MockServer netty distribution packaged as a Homebrew tarball.
    pub fn mockserver() -> Self {
        Self {
            name: "mockserver".to_string(),
            desc: Some("Mock HTTP server for testing HTTP and HTTPS integrations".to_string()),
            homepage: Some("http://www.mock-server.com/".to_string()),
            url: MOCKSERVER_URL.to_string(),
            version: MOCKSERVER_VERSION.to_string(),
            sha256: MOCKSERVER_SHA256.to_string(),
            launcher: "run_mockserver.sh".to_string(),
            port_flag: default_port_flag(),
            requirements: vec![Requirement::Java("1.6".to_string())],
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let formula: Formula = serde_json::from_str(raw)?;
        formula.validate()?;
        Ok(formula)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_str(&self) -> &str {
        &self.version
    }

    pub fn semver(&self) -> Result<Version> {
        Ok(Version::parse(&self.version)?)
    }

    /// Checks the fields the installer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains('/') || self.name.starts_with('.') {
            return Err(MbError::ValidationError(format!(
                "Invalid formula name '{}'",
                self.name
            )));
        }
        self.semver()?;
        if self.sha256.len() != 64 || !self.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MbError::ValidationError(format!(
                "Formula '{}' has a malformed sha256 '{}'",
                self.name, self.sha256
            )));
        }
        if self.launcher.is_empty() || self.launcher.contains('/') {
            return Err(MbError::ValidationError(format!(
                "Formula '{}' has an invalid launcher '{}'",
                self.name, self.launcher
            )));
        }
        Ok(())
    }

    /// Archive file name as it will be stored in the download cache.
    pub fn archive_filename(&self) -> String {
        self.url
            .split('/')
            .next_back()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}-{}.tar", self.name, self.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_mockserver_is_valid() {
        let f = Formula::mockserver();
        f.validate().unwrap();
        assert_eq!(f.semver().unwrap(), Version::new(3, 9, 15));
        assert_eq!(f.archive_filename(), "mockserver-netty-3.9.15-brew-tar.tar");
        assert_eq!(f.requirements, vec![Requirement::Java("1.6".into())]);
    }

    #[test]
    fn json_formula_defaults_port_flag() {
        let raw = r#"{
            "name": "echo",
            "url": "https://example.com/echo-1.0.0.tar.gz",
            "version": "1.0.0",
            "sha256": "0000000000000000000000000000000000000000000000000000000000000000",
            "launcher": "run_echo.sh",
            "requirements": [{"kind": "java", "value": "11"}]
        }"#;
        let f = Formula::from_json_str(raw).unwrap();
        assert_eq!(f.port_flag, "-serverPort");
        assert_eq!(f.requirements, vec![Requirement::Java("11".into())]);
    }

    #[test]
    fn rejects_bad_checksum_and_names() {
        let mut f = Formula::mockserver();
        f.sha256 = "abc".into();
        assert!(matches!(f.validate(), Err(MbError::ValidationError(_))));

        let mut f = Formula::mockserver();
        f.name = "../evil".into();
        assert!(f.validate().is_err());

        let mut f = Formula::mockserver();
        f.version = "not-a-version".into();
        assert!(matches!(f.validate(), Err(MbError::SemVer(_))));
    }
}
