//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Error taxonomy of the generator engine."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use dnm_common::ConfigError;
use thiserror::Error;

use crate::validator::{IntegrityReport, Violation};

pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Every error aborts the run; no partial dataset is ever returned.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("placement of {entity} failed after {attempts} attempts: {reason}")]
    Placement {
        entity: String,
        attempts: u32,
        reason: String,
    },
    #[error("integrity violation: {0}")]
    Integrity(Violation),
    #[error("integrity check failed with {} violation(s)", .0.len())]
    IntegrityReport(IntegrityReport),
}

impl GeneratorError {
    pub(crate) fn placement(
        entity: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::Placement {
            entity: entity.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Violations carried by this error, if it came from the validator.
    pub fn violations(&self) -> Vec<&Violation> {
        match self {
            Self::Integrity(violation) => vec![violation],
            Self::IntegrityReport(report) => report.violations().iter().collect(),
            _ => Vec::new(),
        }
    }
}
