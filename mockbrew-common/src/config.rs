// mockbrew-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::{MbError, Result};

// Fallback if HOMEBREW_PREFIX is not set or is empty.
const DEFAULT_FALLBACK_PREFIX: &str = "/opt/homebrew";
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INITIAL: Duration = Duration::from_millis(100);
const DEFAULT_POLL_MAX: Duration = Duration::from_secs(2);

/// Timing knobs for the post-install smoke test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmokeSettings {
    /// Upper bound on the whole `/status` polling phase.
    pub ready_timeout: Duration,
    /// Upper bound on waiting for the server to exit after `/stop`.
    pub stop_timeout: Duration,
    pub poll_initial_delay: Duration,
    pub poll_max_delay: Duration,
}

impl Default for SmokeSettings {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            poll_initial_delay: DEFAULT_POLL_INITIAL,
            poll_max_delay: DEFAULT_POLL_MAX,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub prefix: PathBuf,
    pub cache_dir_override: Option<PathBuf>,
    pub smoke: SmokeSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading mockbrew configuration");

        let prefix_str = env::var("HOMEBREW_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "HOMEBREW_PREFIX not set or empty, falling back to default: {}",
                    DEFAULT_FALLBACK_PREFIX
                );
                DEFAULT_FALLBACK_PREFIX.to_string()
            });
        let prefix = PathBuf::from(&prefix_str);
        debug!("Effective prefix set to: {}", prefix.display());

        let cache_dir_override = env::var("MOCKBREW_CACHE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let mut smoke = SmokeSettings::default();
        if let Some(d) = duration_from_env("MOCKBREW_READY_TIMEOUT")? {
            smoke.ready_timeout = d;
        }
        if let Some(d) = duration_from_env("MOCKBREW_STOP_TIMEOUT")? {
            smoke.stop_timeout = d;
        }

        debug!("Configuration loaded successfully.");
        Ok(Self {
            prefix,
            cache_dir_override,
            smoke,
        })
    }

    /// A config rooted at `prefix` with default settings, ignoring the environment.
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            cache_dir_override: None,
            smoke: SmokeSettings::default(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.prefix.join("lib")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.prefix.join("opt")
    }

    pub fn cellar_dir(&self) -> PathBuf {
        self.prefix.join("Cellar")
    }

    pub fn var_dir(&self) -> PathBuf {
        self.prefix.join("var")
    }

    /// Where local JSON formula definitions are looked up.
    pub fn formula_dir(&self) -> PathBuf {
        self.prefix.join("Library").join("MockbrewFormula")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir_override
            .clone()
            .unwrap_or_else(|| self.prefix.join("mockbrew_cache"))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.prefix.join("tmp")
    }

    /// mockbrew's own log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.formula_log_dir("mockbrew")
    }

    /// Persistent per-formula log directory; lives outside the keg so it
    /// survives reinstall and uninstall.
    pub fn formula_log_dir(&self, formula_name: &str) -> PathBuf {
        self.var_dir().join("log").join(formula_name)
    }

    pub fn formula_cellar_dir(&self, formula_name: &str) -> PathBuf {
        self.cellar_dir().join(formula_name)
    }

    pub fn formula_keg_path(&self, formula_name: &str, version_str: &str) -> PathBuf {
        self.formula_cellar_dir(formula_name).join(version_str)
    }

    pub fn formula_opt_path(&self, formula_name: &str) -> PathBuf {
        self.opt_dir().join(formula_name)
    }
}

fn duration_from_env(key: &str) -> Result<Option<Duration>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| MbError::Config(format!("Invalid duration in {key}='{raw}': {e}"))),
        _ => Ok(None),
    }
}
