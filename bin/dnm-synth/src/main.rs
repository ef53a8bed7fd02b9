//! ---
//! dnm_section: "05-networking-external-interfaces"
//! dnm_subsection: "binary"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Binary entrypoint for dataset generation and export."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dnm_common::{init_tracing, run_span, AppConfig, ExportFormat, ValidationMode};
use dnm_export::export_dataset;
use dnm_generator::{Generator, GeneratorError};
use tracing::{error, info};

const DEFAULT_CANDIDATES: [&str; 2] = ["dnm.toml", "configs/dnm.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Synthetic distribution-utility dataset generator",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Generate a dataset and write every table to disk")]
    Generate(GenerateArgs),
    #[command(about = "Print the effective configuration as TOML")]
    PrintConfig,
}

#[derive(Debug, clap::Args)]
struct GenerateArgs {
    #[arg(long, help = "Override the configured seed")]
    seed: Option<u64>,

    #[arg(long, value_name = "DIR", help = "Output directory for table files")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, help = "Table encoding")]
    format: Option<CliFormat>,

    #[arg(long, help = "Report every integrity violation instead of stopping at the first")]
    collect_all: bool,

    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    Csv,
    Json,
}

impl From<CliFormat> for ExportFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Csv => ExportFormat::Csv,
            CliFormat::Json => ExportFormat::Json,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::from_path(path);
    }
    let env_override = std::env::var_os(AppConfig::ENV_CONFIG_PATH).is_some();
    if env_override || DEFAULT_CANDIDATES.iter().any(|c| Path::new(c).exists()) {
        return Ok(AppConfig::load_with_source(&DEFAULT_CANDIDATES)?.config);
    }
    Ok(AppConfig::default())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Generate(args) => {
            if let Some(seed) = args.seed {
                config.generator.seed = seed;
            }
            if let Some(dir) = args.output {
                config.export.directory = dir;
            }
            if let Some(format) = args.format {
                config.export.format = format.into();
            }
            if args.collect_all {
                config.generator.validation = ValidationMode::CollectAll;
            }
            if let Some(dir) = args.log_dir {
                config.logging.directory = dir;
            }
            init_tracing("dnm-synth", &config.logging)?;
            run_generate(config)
        }
    }
}

fn run_generate(config: AppConfig) -> Result<()> {
    let started = Instant::now();
    let seed = config.generator.seed;
    let generator = Generator::new(config.generator)?;
    let dataset = match generator.generate() {
        Ok(dataset) => dataset,
        Err(err) => {
            if let GeneratorError::IntegrityReport(report) = &err {
                for violation in report.violations() {
                    error!(%violation, "integrity violation");
                    eprintln!("{violation}");
                }
            }
            return Err(err).context(format!("generation with seed {seed} failed"));
        }
    };

    let directory = &config.export.directory;
    let manifest = run_span(seed)
        .in_scope(|| export_dataset(&dataset, directory, config.export.format))
        .with_context(|| format!("failed to export dataset to {}", directory.display()))?;
    let rows: usize = manifest.tables.iter().map(|entry| entry.rows).sum();
    info!(
        seed,
        tables = manifest.tables.len(),
        rows,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dataset exported"
    );
    println!(
        "seed {seed}: {} tables, {rows} rows -> {}",
        manifest.tables.len(),
        directory.display()
    );
    Ok(())
}
