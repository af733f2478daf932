// mockbrew-common/src/formulary.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::config::Config;
use super::error::{MbError, Result};
use super::model::formula::Formula;

/// Resolves formula names to definitions. Local JSON files in
/// `Config::formula_dir` take precedence over the built-in formulas.
pub struct Formulary {
    formula_dir: PathBuf,
    parsed_cache: Mutex<HashMap<String, Arc<Formula>>>,
}

impl Formulary {
    pub fn new(config: &Config) -> Self {
        Self {
            formula_dir: config.formula_dir(),
            parsed_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn builtin_names() -> Vec<&'static str> {
        vec!["mockserver"]
    }

    fn builtin(name: &str) -> Option<Formula> {
        match name {
            "mockserver" => Some(Formula::mockserver()),
            _ => None,
        }
    }

    pub fn load_formula(&self, name: &str) -> Result<Arc<Formula>> {
        if let Some(formula) = self.lock_cache()?.get(name) {
            debug!("Loaded formula '{}' from parsed cache.", name);
            return Ok(Arc::clone(formula));
        }

        let json_path = self.formula_dir.join(format!("{name}.json"));
        let formula = if json_path.is_file() {
            debug!("Loading formula '{}' from {}", name, json_path.display());
            let formula = load_formula_file(&json_path)?;
            if formula.name != name {
                return Err(MbError::ValidationError(format!(
                    "Formula file {} declares name '{}', expected '{}'",
                    json_path.display(),
                    formula.name,
                    name
                )));
            }
            formula
        } else if let Some(formula) = Self::builtin(name) {
            debug!("Using built-in formula '{}'", name);
            formula
        } else {
            return Err(MbError::NotFound(format!(
                "No formula named '{name}' (built-in: {})",
                Self::builtin_names().join(", ")
            )));
        };

        let formula = Arc::new(formula);
        self.lock_cache()?
            .insert(name.to_string(), Arc::clone(&formula));
        Ok(formula)
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Formula>>>> {
        self.parsed_cache
            .lock()
            .map_err(|_| MbError::Generic("Formulary cache lock poisoned".to_string()))
    }
}

/// Reads and validates a standalone formula JSON file.
pub fn load_formula_file(path: &Path) -> Result<Formula> {
    let raw = fs::read_to_string(path).map_err(|e| {
        MbError::Io(Arc::new(std::io::Error::new(
            e.kind(),
            format!("Failed to read formula file {}: {}", path.display(), e),
        )))
    })?;
    Formula::from_json_str(&raw)
}
