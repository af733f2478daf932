use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Requirement {
    /// A Java runtime at or above the given version ("1.6", "11").
    Java(String),
    /// Free-form requirement; reported but never enforced.
    Other(String),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Java(v) => write!(f, "java >= {v}"),
            Self::Other(s) => write!(f, "Requirement: {s}"),
        }
    }
}
