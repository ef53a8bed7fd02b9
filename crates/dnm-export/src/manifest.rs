//! ---
//! dnm_section: "03-persistence-logging"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Export manifest with per-file SHA-256 digests."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use dnm_common::ExportFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ExportError, Result};

/// Name of the manifest written next to the table files.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Canonical table name.
    pub table: String,
    /// File name relative to the export directory.
    pub file: String,
    /// Number of data rows written.
    pub rows: usize,
    /// Hex-encoded SHA-256 of the file contents.
    pub sha256: String,
}

/// Summary of an export run. Contains no wall-clock data so that the same
/// dataset always produces a byte-identical manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version of the exporter that wrote the files.
    pub generator_version: String,
    /// Seed the dataset was generated from.
    pub seed: u64,
    /// Encoding of the table files.
    pub format: ExportFormat,
    /// Tables in dependency order.
    pub tables: Vec<ManifestEntry>,
}

impl Manifest {
    /// Entry for `table`, if it was exported.
    pub fn entry(&self, table: &str) -> Option<&ManifestEntry> {
        self.tables.iter().find(|entry| entry.table == table)
    }

    pub(crate) fn save(&self, directory: &Path) -> Result<()> {
        let path = directory.join(MANIFEST_FILE);
        let file = File::create(&path).map_err(|err| ExportError::io(&path, err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|err| ExportError::io(&path, err))?;
        Ok(())
    }

    /// Read `manifest.json` from `directory`.
    pub fn load(directory: &Path) -> Result<Self> {
        let path = directory.join(MANIFEST_FILE);
        let file = File::open(&path).map_err(|err| ExportError::io(&path, err))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Re-hash every file listed in the manifest of `directory`.
pub fn verify_export(directory: &Path) -> Result<Manifest> {
    let manifest = Manifest::load(directory)?;
    for entry in &manifest.tables {
        let path = directory.join(&entry.file);
        let file = File::open(&path).map_err(|err| ExportError::io(&path, err))?;
        let mut hasher = Sha256::new();
        io::copy(&mut BufReader::new(file), &mut hasher)
            .map_err(|err| ExportError::io(&path, err))?;
        if hex::encode(hasher.finalize()) != entry.sha256 {
            return Err(ExportError::ChecksumMismatch(entry.file.clone()));
        }
    }
    Ok(manifest)
}
