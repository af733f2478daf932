// mockbrew-core/src/install/requirements.rs
use std::env;
use std::path::PathBuf;

use lazy_static::lazy_static;
use mockbrew_aio::process::run_command_async;
use mockbrew_common::error::{MbError, Result};
use mockbrew_common::model::requirement::Requirement;
use mockbrew_common::model::Formula;
use regex::Regex;
use semver::Version;
use tracing::{debug, warn};

lazy_static! {
    // `java version "1.8.0_292"`, `openjdk version "17.0.2" 2022-01-18`
    static ref QUOTED_VERSION: Regex = Regex::new(r#"version\s+"([^"]+)""#).unwrap();
    // `openjdk 21 2023-09-19`
    static ref BARE_VERSION: Regex = Regex::new(r"(?m)^(?:java|openjdk)\s+(\d[\w.+-]*)").unwrap();
    static ref NUMERIC_PARTS: Regex = Regex::new(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap();
}

/// Turns a Java-style version string into a comparable semver version.
/// `1.8.0_292` -> 1.8.0, `17.0.2+8` -> 17.0.2, `21` -> 21.0.0.
pub fn normalize_java_version(raw: &str) -> Option<Version> {
    let caps = NUMERIC_PARTS.captures(raw.trim())?;
    let part = |i: usize| -> Option<u64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Extracts the runtime version from `java -version` output.
pub fn parse_java_version(output: &str) -> Option<Version> {
    QUOTED_VERSION
        .captures(output)
        .or_else(|| BARE_VERSION.captures(output))
        .and_then(|caps| caps.get(1))
        .and_then(|m| normalize_java_version(m.as_str()))
}

fn locate_java() -> Option<PathBuf> {
    if let Some(home) = env::var_os("JAVA_HOME").filter(|h| !h.is_empty()) {
        let candidate = PathBuf::from(home).join("bin").join("java");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    which::which("java").ok()
}

/// Probes the installed Java runtime. `Ok(None)` means no `java` was found.
pub async fn detect_java_version() -> Result<Option<Version>> {
    let Some(java) = locate_java() else {
        debug!("No java executable on PATH or under JAVA_HOME");
        return Ok(None);
    };
    debug!("Probing Java runtime at {}", java.display());
    let output = run_command_async(
        java.to_string_lossy().to_string(),
        vec!["-version".to_string()],
        None,
        None,
    )
    .await?;
    // `java -version` prints to stderr on every JDK we know of.
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    let version = parse_java_version(&text);
    if version.is_none() {
        warn!("Could not parse Java version from: {}", text.trim());
    }
    Ok(version)
}

/// Checks an already-detected Java version against a requirement minimum.
pub fn java_satisfies(found: Option<&Version>, min_version: &str) -> Result<()> {
    let min = normalize_java_version(min_version).ok_or_else(|| {
        MbError::ValidationError(format!("Invalid Java version requirement '{min_version}'"))
    })?;
    match found {
        Some(v) if *v >= min => Ok(()),
        Some(v) => Err(MbError::RequirementError(format!(
            "java >= {min_version} required, found {v}"
        ))),
        None => Err(MbError::RequirementError(format!(
            "java >= {min_version} required, but no Java runtime was found"
        ))),
    }
}

/// Verifies every enforceable requirement of `formula`.
pub async fn check_requirements(formula: &Formula) -> Result<()> {
    let mut java: Option<Option<Version>> = None;
    for requirement in &formula.requirements {
        match requirement {
            Requirement::Java(min) => {
                if java.is_none() {
                    java = Some(detect_java_version().await?);
                }
                let found = java.as_ref().and_then(|v| v.as_ref());
                java_satisfies(found, min)?;
                debug!("Requirement satisfied: {}", requirement);
            }
            Requirement::Other(_) => {
                warn!("Not checking {} for {}", requirement, formula.name());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_java_banners() {
        let legacy = "java version \"1.6.0_45\"\nJava(TM) SE Runtime Environment (build 1.6.0_45-b06)";
        assert_eq!(parse_java_version(legacy), Some(Version::new(1, 6, 0)));

        let eight = "openjdk version \"1.8.0_292\"\nOpenJDK Runtime Environment";
        assert_eq!(parse_java_version(eight), Some(Version::new(1, 8, 0)));

        let seventeen = "openjdk version \"17.0.2\" 2022-01-18\nOpenJDK Runtime Environment";
        assert_eq!(parse_java_version(seventeen), Some(Version::new(17, 0, 2)));

        let bare = "openjdk 21 2023-09-19\nOpenJDK Runtime Environment (build 21+35)";
        assert_eq!(parse_java_version(bare), Some(Version::new(21, 0, 0)));

        assert_eq!(parse_java_version("command not found"), None);
    }

    #[test]
    fn compares_against_minimum() {
        java_satisfies(Some(&Version::new(1, 6, 0)), "1.6").unwrap();
        java_satisfies(Some(&Version::new(17, 0, 2)), "1.6").unwrap();
        let err = java_satisfies(Some(&Version::new(1, 5, 0)), "1.6").unwrap_err();
        assert!(matches!(err, MbError::RequirementError(_)));
        assert!(matches!(
            java_satisfies(None, "1.6"),
            Err(MbError::RequirementError(_))
        ));
        assert!(matches!(
            java_satisfies(Some(&Version::new(11, 0, 0)), "latest"),
            Err(MbError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn formulas_without_java_pass() {
        let mut formula = Formula::mockserver();
        formula.requirements = vec![Requirement::Other("a network".into())];
        check_requirements(&formula).await.unwrap();
    }
}
