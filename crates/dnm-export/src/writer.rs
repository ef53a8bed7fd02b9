//! ---
//! dnm_section: "03-persistence-logging"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Per-table CSV/JSON writers hashing output as it streams."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use dnm_common::ExportFormat;
use dnm_generator::{Dataset, TableRef};
use dnm_logging::{dnm_debug, log_stage_event, LogContext, StageOutcome};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::manifest::{Manifest, ManifestEntry};
use crate::{ExportError, Result};

/// Forwards writes while feeding the same bytes to a SHA-256 digest.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(mut self) -> io::Result<String> {
        self.inner.flush()?;
        Ok(hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn extension(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Csv => "csv",
        ExportFormat::Json => "json",
    }
}

fn write_rows<T: Serialize, W: Write>(
    rows: &[T],
    format: ExportFormat,
    writer: &mut HashingWriter<W>,
) -> Result<()> {
    match format {
        ExportFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            for row in rows {
                csv.serialize(row)?;
            }
            csv.flush().map_err(csv::Error::from)?;
        }
        ExportFormat::Json => {
            serde_json::to_writer(&mut *writer, rows)?;
            writer.write_all(b"\n").map_err(serde_json::Error::io)?;
        }
    }
    Ok(())
}

fn write_table<W: Write>(
    table: TableRef<'_>,
    format: ExportFormat,
    writer: &mut HashingWriter<W>,
) -> Result<()> {
    match table {
        TableRef::Substations(rows) => write_rows(rows, format, writer),
        TableRef::Feeders(rows) => write_rows(rows, format, writer),
        TableRef::Transformers(rows) => write_rows(rows, format, writer),
        TableRef::Customers(rows) => write_rows(rows, format, writer),
        TableRef::SolarInstallations(rows) => write_rows(rows, format, writer),
        TableRef::EvChargers(rows) => write_rows(rows, format, writer),
        TableRef::Batteries(rows) => write_rows(rows, format, writer),
        TableRef::SwitchingDevices(rows) => write_rows(rows, format, writer),
        TableRef::TieSwitches(rows) => write_rows(rows, format, writer),
        TableRef::NetworkNodes(rows) => write_rows(rows, format, writer),
        TableRef::NetworkEdges(rows) => write_rows(rows, format, writer),
        TableRef::Weather(rows) => write_rows(rows, format, writer),
        TableRef::Load(rows) => write_rows(rows, format, writer),
        TableRef::Outages(rows) => write_rows(rows, format, writer),
        TableRef::Ami(rows) => write_rows(rows, format, writer),
        TableRef::SolarProfiles(rows) => write_rows(rows, format, writer),
        TableRef::EvProfiles(rows) => write_rows(rows, format, writer),
        TableRef::GrowthScenarios(rows) => write_rows(rows, format, writer),
    }
}

/// Write every table of `dataset` into `directory` and return the manifest
/// that was saved alongside them.
pub fn export_dataset(dataset: &Dataset, directory: &Path, format: ExportFormat) -> Result<Manifest> {
    fs::create_dir_all(directory).map_err(|err| ExportError::io(directory, err))?;
    let ctx = LogContext::new()
        .with_stage("export")
        .with_seed(dataset.seed());

    let mut entries = Vec::new();
    for (name, table) in dataset.tables() {
        let file_name = format!("{name}.{}", extension(format));
        let path = directory.join(&file_name);
        let file = File::create(&path).map_err(|err| ExportError::io(&path, err))?;
        let mut writer = HashingWriter::new(BufWriter::new(file));
        write_table(table, format, &mut writer)?;
        let sha256 = writer.finish().map_err(|err| ExportError::io(&path, err))?;
        dnm_debug!(context = ctx, "wrote {} rows to {}", table.len(), path.display());
        entries.push(ManifestEntry {
            table: name.to_owned(),
            file: file_name,
            rows: table.len(),
            sha256,
        });
    }

    let manifest = Manifest {
        generator_version: env!("CARGO_PKG_VERSION").to_owned(),
        seed: dataset.seed(),
        format,
        tables: entries,
    };
    manifest.save(directory)?;
    log_stage_event(
        Some(&ctx),
        "stage.complete",
        &format!(
            "{} tables written to {}",
            manifest.tables.len(),
            directory.display()
        ),
        StageOutcome::Success,
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::verify_export;
    use dnm_generator::{DerTables, NetworkTables, SeriesTables};
    use tempfile::tempdir;

    fn small_dataset() -> Dataset {
        let mut config = dnm_common::GeneratorConfig::default();
        config.seed = 9;
        let series = SeriesTables {
            growth: dnm_generator::growth::project(&config.growth),
            ..SeriesTables::default()
        };
        Dataset::assemble(config, NetworkTables::default(), DerTables::default(), series)
    }

    #[test]
    fn csv_export_writes_every_table_and_manifest() {
        let dir = tempdir().unwrap();
        let dataset = small_dataset();
        let manifest = export_dataset(&dataset, dir.path(), ExportFormat::Csv).unwrap();
        assert_eq!(manifest.tables.len(), 18);
        assert_eq!(manifest.seed, 9);
        let growth = manifest.entry("growth_scenarios").unwrap();
        assert_eq!(growth.rows, dataset.growth_scenarios().len());
        let text = fs::read_to_string(dir.path().join(&growth.file)).unwrap();
        assert!(text.starts_with("scenario_id,name,year,"));
        assert_eq!(text.lines().count(), growth.rows + 1);
        assert_eq!(verify_export(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn json_export_is_byte_identical_across_runs() {
        let dataset = small_dataset();
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let first = export_dataset(&dataset, a.path(), ExportFormat::Json).unwrap();
        let second = export_dataset(&dataset, b.path(), ExportFormat::Json).unwrap();
        assert_eq!(first, second);
        let bytes = |dir: &Path| fs::read(dir.join("manifest.json")).unwrap();
        assert_eq!(bytes(a.path()), bytes(b.path()));
    }

    #[test]
    fn tampered_file_fails_verification() {
        let dir = tempdir().unwrap();
        export_dataset(&small_dataset(), dir.path(), ExportFormat::Csv).unwrap();
        fs::write(dir.path().join("growth_scenarios.csv"), "tampered\n").unwrap();
        let err = verify_export(dir.path()).unwrap_err();
        assert!(matches!(err, ExportError::ChecksumMismatch(file) if file == "growth_scenarios.csv"));
    }
}
