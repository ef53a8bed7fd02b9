//! ---
//! dnm_section: "03-persistence-logging"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Dataset serializer and checksum manifest."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Writes a generated dataset to disk, one file per table, plus a
//! `manifest.json` recording the seed, row counts and SHA-256 digests.
//! Export only borrows the dataset; a failed export leaves it untouched.

/// Result alias used throughout the exporter.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Error type for the export subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Wrapper for IO errors encountered while writing table files.
    #[error("io error on {path}: {source}")]
    Io {
        /// File or directory being written.
        path: std::path::PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// Wrapper for CSV serialization issues.
    #[error("csv serialization error: {0}")]
    Csv(#[from] csv::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when a written file no longer matches its manifest digest.
    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),
}

impl ExportError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub mod manifest;
pub mod writer;

pub use manifest::{verify_export, Manifest, ManifestEntry, MANIFEST_FILE};
pub use writer::export_dataset;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_error_names_the_file() {
        let err = ExportError::ChecksumMismatch("load.csv".into());
        assert_eq!(format!("{err}"), "checksum mismatch for load.csv");
    }
}
