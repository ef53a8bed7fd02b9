//! ---
//! dnm_section: "01-core-functionality"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Shared primitives for the generator workspace."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Shared primitives for the Dynamic Network Model workspace.
//! This crate exposes configuration loading and tracing initialisation
//! consumed by the generator, the exporter and the CLI.

pub mod config;
pub mod logging;

pub use config::{
    AmiConfig, AppConfig, BoundsPolicy, ConfigError, CountRange, DerConfig, DistanceMetric,
    ExportConfig, ExportFormat, FeederLayout, GeneratorConfig, GrowthConfig, HorizonConfig,
    LoadConfig, LoggingConfig, NetworkConfig, OutageConfig, PlacementConfig, ScaleConfig,
    SeasonWindow, TerritoryConfig, TransformerSpacing, ValidationMode, ValueRange, WeatherConfig,
};
pub use logging::{init_tracing, run_span, select_filter, FilterSource, LogFormat};
