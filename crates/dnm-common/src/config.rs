//! ---
//! dnm_section: "01-core-functionality"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Shared primitives for the generator workspace."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::logging::LogFormat;

/// Raised when a configuration value cannot produce a valid dataset.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid configuration `{field}`: {reason}")]
pub struct ConfigError {
    pub field: String,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

type Check = std::result::Result<(), ConfigError>;

fn ensure(condition: bool, field: &str, reason: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::new(field, reason()))
    }
}

fn ensure_probability(value: f64, field: &str) -> Check {
    ensure((0.0..=1.0).contains(&value), field, || {
        format!("must lie in [0, 1], got {value}")
    })
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_export_directory() -> PathBuf {
    PathBuf::from("target/dnm-data")
}

fn default_seed() -> u64 {
    42
}

fn default_horizon_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn default_horizon_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn default_utc_offset_hours() -> i32 {
    -7
}

fn default_recloser_fractions() -> Vec<f64> {
    vec![1.0 / 3.0, 2.0 / 3.0]
}

/// Top level configuration consumed by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "DNM_CONFIG";

    /// Load configuration from disk, respecting the `DNM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Render the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialise configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.generator.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `DNM_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: None,
        }
    }
}

/// On-disk encoding used by the exporter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
            format: ExportFormat::default(),
        }
    }
}

/// Inclusive integer range used for hierarchy counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub const fn exact(value: u32) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    fn validate_non_empty(&self, field: &str) -> Check {
        ensure(self.min >= 1, field, || {
            format!("minimum must be at least 1, got {}", self.min)
        })?;
        ensure(self.min <= self.max, field, || {
            format!("min {} exceeds max {}", self.min, self.max)
        })
    }
}

/// Inclusive floating point range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn validate_positive(&self, field: &str) -> Check {
        ensure(self.min.is_finite() && self.max.is_finite(), field, || {
            "bounds must be finite".to_owned()
        })?;
        ensure(self.min > 0.0, field, || {
            format!("minimum must be positive, got {}", self.min)
        })?;
        ensure(self.min <= self.max, field, || {
            format!("min {} exceeds max {}", self.min, self.max)
        })
    }
}

/// Calendar window expressed as month/day pairs, wrapping across new year
/// when `start` is later than `end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonWindow {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl SeasonWindow {
    pub const fn new(start_month: u32, start_day: u32, end_month: u32, end_day: u32) -> Self {
        Self {
            start_month,
            start_day,
            end_month,
            end_day,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let key = date.month() * 100 + date.day();
        let start = self.start_month * 100 + self.start_day;
        let end = self.end_month * 100 + self.end_day;
        if start <= end {
            (start..=end).contains(&key)
        } else {
            key >= start || key <= end
        }
    }

    fn validate(&self, field: &str) -> Check {
        for (month, day) in [
            (self.start_month, self.start_day),
            (self.end_month, self.end_day),
        ] {
            ensure(
                NaiveDate::from_ymd_opt(2024, month, day).is_some(),
                field,
                || format!("{month:02}-{day:02} is not a calendar day"),
            )?;
        }
        Ok(())
    }
}

/// Everything the generator engine needs for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub validation: ValidationMode,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub territory: TerritoryConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub der: DerConfig,
    #[serde(default)]
    pub horizon: HorizonConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub outages: OutageConfig,
    #[serde(default)]
    pub ami: AmiConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            validation: ValidationMode::default(),
            scale: ScaleConfig::default(),
            territory: TerritoryConfig::default(),
            placement: PlacementConfig::default(),
            network: NetworkConfig::default(),
            der: DerConfig::default(),
            horizon: HorizonConfig::default(),
            weather: WeatherConfig::default(),
            load: LoadConfig::default(),
            outages: OutageConfig::default(),
            ami: AmiConfig::default(),
            growth: GrowthConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Reject parameter combinations that cannot produce a valid hierarchy.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.scale.validate()?;
        self.territory.validate()?;
        self.placement.validate(&self.scale)?;
        self.network.validate()?;
        self.der.validate()?;
        self.horizon.validate()?;
        self.weather.validate()?;
        self.load.validate(&self.horizon)?;
        self.outages.validate()?;
        self.ami.validate()?;
        self.growth.validate()
    }
}

impl std::str::FromStr for GeneratorConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: GeneratorConfig =
            toml::from_str(content).with_context(|| "failed to parse generator configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// How the integrity validator reports violations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    #[default]
    FailFast,
    CollectAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleConfig {
    pub substations: u32,
    pub feeders_per_substation: CountRange,
    pub transformers_per_feeder: CountRange,
    pub customers_per_transformer: CountRange,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            substations: 6,
            feeders_per_substation: CountRange::new(2, 6),
            transformers_per_feeder: CountRange::new(20, 60),
            customers_per_transformer: CountRange::new(1, 12),
        }
    }
}

impl ScaleConfig {
    fn validate(&self) -> Check {
        ensure(self.substations >= 1, "scale.substations", || {
            "at least one substation is required".to_owned()
        })?;
        self.feeders_per_substation
            .validate_non_empty("scale.feeders_per_substation")?;
        self.transformers_per_feeder
            .validate_non_empty("scale.transformers_per_feeder")?;
        self.customers_per_transformer
            .validate_non_empty("scale.customers_per_transformer")
    }
}

/// Service-territory bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerritoryConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self {
            lat_min: 33.2,
            lat_max: 33.7,
            lon_min: -112.3,
            lon_max: -111.85,
        }
    }
}

impl TerritoryConfig {
    fn validate(&self) -> Check {
        ensure(
            -90.0 <= self.lat_min && self.lat_min < self.lat_max && self.lat_max <= 90.0,
            "territory.lat_min/lat_max",
            || format!("invalid latitude span [{}, {}]", self.lat_min, self.lat_max),
        )?;
        ensure(
            -180.0 <= self.lon_min && self.lon_min < self.lon_max && self.lon_max <= 180.0,
            "territory.lon_min/lon_max",
            || format!("invalid longitude span [{}, {}]", self.lon_min, self.lon_max),
        )
    }
}

/// What to do with a coordinate still outside the territory after retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundsPolicy {
    #[default]
    Clamp,
    Abort,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeederLayout {
    #[default]
    Radial,
    Cardinal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransformerSpacing {
    #[default]
    Even,
    Random,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Haversine,
    Equirectangular,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    pub min_substation_spacing_miles: f64,
    pub substation_max_attempts: u32,
    pub feeder_layout: FeederLayout,
    pub feeder_length_miles: ValueRange,
    pub feeder_angle_jitter_rad: f64,
    pub transformer_spacing: TransformerSpacing,
    pub transformer_lateral_offset_m: f64,
    pub customer_radius_m: f64,
    pub max_retries: u32,
    pub bounds_policy: BoundsPolicy,
    pub distance_metric: DistanceMetric,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_substation_spacing_miles: 3.0,
            substation_max_attempts: 200,
            feeder_layout: FeederLayout::Radial,
            feeder_length_miles: ValueRange::new(2.0, 8.0),
            feeder_angle_jitter_rad: 0.3,
            transformer_spacing: TransformerSpacing::Even,
            transformer_lateral_offset_m: 40.0,
            customer_radius_m: 150.0,
            max_retries: 8,
            bounds_policy: BoundsPolicy::Clamp,
            distance_metric: DistanceMetric::Haversine,
        }
    }
}

impl PlacementConfig {
    fn validate(&self, scale: &ScaleConfig) -> Check {
        ensure(
            self.min_substation_spacing_miles >= 0.0,
            "placement.min_substation_spacing_miles",
            || "spacing cannot be negative".to_owned(),
        )?;
        ensure(
            self.substation_max_attempts >= 1,
            "placement.substation_max_attempts",
            || "at least one attempt is required".to_owned(),
        )?;
        self.feeder_length_miles
            .validate_positive("placement.feeder_length_miles")?;
        ensure(
            self.feeder_angle_jitter_rad >= 0.0,
            "placement.feeder_angle_jitter_rad",
            || "jitter cannot be negative".to_owned(),
        )?;
        ensure(
            self.transformer_lateral_offset_m >= 0.0,
            "placement.transformer_lateral_offset_m",
            || "offset cannot be negative".to_owned(),
        )?;
        ensure(
            self.customer_radius_m > 0.0,
            "placement.customer_radius_m",
            || "radius must be positive".to_owned(),
        )?;
        if self.feeder_layout == FeederLayout::Cardinal {
            ensure(
                scale.feeders_per_substation.max <= 8,
                "scale.feeders_per_substation",
                || {
                    format!(
                        "cardinal layout supports at most 8 feeders per substation, got {}",
                        scale.feeders_per_substation.max
                    )
                },
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    #[serde(default = "default_recloser_fractions")]
    pub recloser_fractions: Vec<f64>,
    pub sectionalizer_every: u32,
    pub junctions_per_feeder: u32,
    pub underground_ratio: f64,
    pub impedance_variation: f64,
    pub tie_max_distance_miles: f64,
    pub diversity_factor: f64,
    pub target_utilization: f64,
    pub min_feeder_rating_mw: f64,
    pub transformer_health: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            recloser_fractions: default_recloser_fractions(),
            sectionalizer_every: 3,
            junctions_per_feeder: 8,
            underground_ratio: 0.25,
            impedance_variation: 0.05,
            tie_max_distance_miles: 4.0,
            diversity_factor: 0.35,
            target_utilization: 0.8,
            min_feeder_rating_mw: 5.0,
            transformer_health: true,
        }
    }
}

impl NetworkConfig {
    fn validate(&self) -> Check {
        for fraction in &self.recloser_fractions {
            ensure(
                *fraction > 0.0 && *fraction < 1.0,
                "network.recloser_fractions",
                || format!("fraction {fraction} must lie strictly inside (0, 1)"),
            )?;
        }
        ensure(
            self.sectionalizer_every >= 1,
            "network.sectionalizer_every",
            || "must be at least 1".to_owned(),
        )?;
        ensure(
            self.junctions_per_feeder >= 1,
            "network.junctions_per_feeder",
            || "must be at least 1".to_owned(),
        )?;
        ensure_probability(self.underground_ratio, "network.underground_ratio")?;
        ensure(
            (0.0..0.5).contains(&self.impedance_variation),
            "network.impedance_variation",
            || format!("must lie in [0, 0.5), got {}", self.impedance_variation),
        )?;
        ensure(
            self.tie_max_distance_miles > 0.0,
            "network.tie_max_distance_miles",
            || "must be positive".to_owned(),
        )?;
        ensure(
            self.diversity_factor > 0.0 && self.diversity_factor <= 1.0,
            "network.diversity_factor",
            || format!("must lie in (0, 1], got {}", self.diversity_factor),
        )?;
        ensure(
            self.target_utilization > 0.0 && self.target_utilization <= 1.0,
            "network.target_utilization",
            || format!("must lie in (0, 1], got {}", self.target_utilization),
        )?;
        ensure(
            self.min_feeder_rating_mw > 0.0,
            "network.min_feeder_rating_mw",
            || "must be positive".to_owned(),
        )
    }
}

/// Per-customer adoption probabilities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DerConfig {
    pub solar_rate: f64,
    pub ev_rate: f64,
    pub battery_rate: f64,
}

impl Default for DerConfig {
    fn default() -> Self {
        Self {
            solar_rate: 0.12,
            ev_rate: 0.08,
            battery_rate: 0.03,
        }
    }
}

impl DerConfig {
    fn validate(&self) -> Check {
        ensure_probability(self.solar_rate, "der.solar_rate")?;
        ensure_probability(self.ev_rate, "der.ev_rate")?;
        ensure_probability(self.battery_rate, "der.battery_rate")
    }
}

/// Half-open simulated period `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HorizonConfig {
    #[serde(default = "default_horizon_start")]
    pub start: DateTime<Utc>,
    #[serde(default = "default_horizon_end")]
    pub end: DateTime<Utc>,
    /// Fixed offset of the territory's local clock, used by diurnal shapes.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            start: default_horizon_start(),
            end: default_horizon_end(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl HorizonConfig {
    /// Number of hourly weather records covering the horizon.
    pub fn hours(&self) -> usize {
        usize::try_from((self.end - self.start).num_hours()).unwrap_or(0)
    }

    fn validate(&self) -> Check {
        ensure(
            (-12..=14).contains(&self.utc_offset_hours),
            "horizon.utc_offset_hours",
            || format!("must lie in [-12, 14], got {}", self.utc_offset_hours),
        )?;
        ensure(self.end > self.start, "horizon", || {
            format!("end {} must be after start {}", self.end, self.start)
        })?;
        for (label, instant) in [("horizon.start", self.start), ("horizon.end", self.end)] {
            ensure(
                instant.minute() == 0 && instant.second() == 0 && instant.nanosecond() == 0,
                label,
                || format!("{instant} must fall on an hour boundary"),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeatherConfig {
    pub annual_mean_f: f64,
    pub annual_amplitude_f: f64,
    pub peak_day_of_year: u32,
    pub diurnal_amplitude_f: f64,
    pub noise_f: f64,
    pub heat_season: SeasonWindow,
    pub hot_spell_probability: f64,
    pub hot_spell_uplift_f: ValueRange,
    pub heatwave_threshold_f: f64,
    pub heatwave_window_hours: u32,
    pub monsoon: SeasonWindow,
    pub storm_onset_probability: f64,
    pub monsoon_storm_onset_probability: f64,
    pub storm_duration_hours: CountRange,
    pub storm_wind_threshold_mph: f64,
    pub storm_precip_threshold_in: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            annual_mean_f: 75.0,
            annual_amplitude_f: 20.0,
            peak_day_of_year: 200,
            diurnal_amplitude_f: 11.0,
            noise_f: 3.0,
            heat_season: SeasonWindow::new(6, 1, 8, 31),
            hot_spell_probability: 0.15,
            hot_spell_uplift_f: ValueRange::new(5.0, 12.0),
            heatwave_threshold_f: 112.0,
            heatwave_window_hours: 3,
            monsoon: SeasonWindow::new(7, 1, 9, 30),
            storm_onset_probability: 0.001,
            monsoon_storm_onset_probability: 0.012,
            storm_duration_hours: CountRange::new(1, 6),
            storm_wind_threshold_mph: 35.0,
            storm_precip_threshold_in: 0.3,
        }
    }
}

impl WeatherConfig {
    fn validate(&self) -> Check {
        for (field, value) in [
            ("weather.annual_mean_f", self.annual_mean_f),
            ("weather.annual_amplitude_f", self.annual_amplitude_f),
            ("weather.diurnal_amplitude_f", self.diurnal_amplitude_f),
            ("weather.heatwave_threshold_f", self.heatwave_threshold_f),
        ] {
            ensure(value.is_finite(), field, || format!("must be finite, got {value}"))?;
        }
        ensure(
            (1..=366).contains(&self.peak_day_of_year),
            "weather.peak_day_of_year",
            || format!("must lie in [1, 366], got {}", self.peak_day_of_year),
        )?;
        ensure(self.noise_f >= 0.0, "weather.noise_f", || {
            "noise cannot be negative".to_owned()
        })?;
        self.heat_season.validate("weather.heat_season")?;
        self.monsoon.validate("weather.monsoon")?;
        ensure_probability(self.hot_spell_probability, "weather.hot_spell_probability")?;
        self.hot_spell_uplift_f
            .validate_positive("weather.hot_spell_uplift_f")?;
        ensure(
            self.heatwave_window_hours >= 1,
            "weather.heatwave_window_hours",
            || "window must cover at least one hour".to_owned(),
        )?;
        ensure_probability(self.storm_onset_probability, "weather.storm_onset_probability")?;
        ensure_probability(
            self.monsoon_storm_onset_probability,
            "weather.monsoon_storm_onset_probability",
        )?;
        self.storm_duration_hours
            .validate_non_empty("weather.storm_duration_hours")?;
        ensure(
            self.storm_wind_threshold_mph > 0.0 && self.storm_precip_threshold_in > 0.0,
            "weather.storm thresholds",
            || "storm thresholds must be positive".to_owned(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoadConfig {
    pub resolution_minutes: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub noise: f64,
    pub min_load_fraction: f64,
    pub cooling_base_f: f64,
    pub cooling_sensitivity: f64,
    pub heating_base_f: f64,
    pub heating_sensitivity: f64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            resolution_minutes: 60,
            window_start: None,
            window_end: None,
            noise: 0.06,
            min_load_fraction: 0.05,
            cooling_base_f: 75.0,
            cooling_sensitivity: 0.35,
            heating_base_f: 55.0,
            heating_sensitivity: 0.15,
        }
    }
}

impl LoadConfig {
    /// Effective observation window, defaulting to the full horizon.
    pub fn window(&self, horizon: &HorizonConfig) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.window_start.unwrap_or(horizon.start),
            self.window_end.unwrap_or(horizon.end),
        )
    }

    fn validate(&self, horizon: &HorizonConfig) -> Check {
        ensure(
            (1..=60).contains(&self.resolution_minutes) && 60 % self.resolution_minutes == 0,
            "load.resolution_minutes",
            || format!("must divide 60, got {}", self.resolution_minutes),
        )?;
        let (start, end) = self.window(horizon);
        ensure(
            horizon.start <= start && start < end && end <= horizon.end,
            "load.window_start/window_end",
            || format!("window [{start}, {end}) must lie inside the horizon"),
        )?;
        for (field, instant) in [("load.window_start", start), ("load.window_end", end)] {
            ensure(
                instant.minute() == 0 && instant.second() == 0 && instant.nanosecond() == 0,
                field,
                || format!("{instant} must fall on an hour boundary"),
            )?;
        }
        ensure(
            self.cooling_base_f.is_finite() && self.heating_base_f.is_finite(),
            "load base temperatures",
            || "base temperatures must be finite".to_owned(),
        )?;
        ensure(
            (0.0..0.5).contains(&self.noise),
            "load.noise",
            || format!("must lie in [0, 0.5), got {}", self.noise),
        )?;
        ensure(
            (0.0..1.0).contains(&self.min_load_fraction),
            "load.min_load_fraction",
            || format!("must lie in [0, 1), got {}", self.min_load_fraction),
        )?;
        ensure(
            self.cooling_sensitivity >= 0.0 && self.heating_sensitivity >= 0.0,
            "load sensitivities",
            || "weather sensitivities cannot be negative".to_owned(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutageConfig {
    pub daily_rate: f64,
    pub storm_inflation: f64,
    pub heatwave_inflation: f64,
    pub weather_cause_bias: f64,
}

impl Default for OutageConfig {
    fn default() -> Self {
        Self {
            daily_rate: 0.015,
            storm_inflation: 6.0,
            heatwave_inflation: 2.5,
            weather_cause_bias: 0.75,
        }
    }
}

impl OutageConfig {
    fn validate(&self) -> Check {
        ensure(
            self.daily_rate >= 0.0 && self.daily_rate.is_finite(),
            "outages.daily_rate",
            || "rate must be finite and non-negative".to_owned(),
        )?;
        ensure(
            self.storm_inflation >= 1.0 && self.heatwave_inflation >= 1.0,
            "outages inflation",
            || "inflation factors must be at least 1".to_owned(),
        )?;
        ensure_probability(self.weather_cause_bias, "outages.weather_cause_bias")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AmiConfig {
    pub sample_customers: u32,
    pub interval_minutes: u32,
    pub window_days: u32,
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            sample_customers: 50,
            interval_minutes: 15,
            window_days: 7,
        }
    }
}

impl AmiConfig {
    fn validate(&self) -> Check {
        ensure(
            (1..=60).contains(&self.interval_minutes) && 60 % self.interval_minutes == 0,
            "ami.interval_minutes",
            || format!("must divide 60, got {}", self.interval_minutes),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrowthConfig {
    pub start_year: i32,
    pub end_year: i32,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            start_year: 2024,
            end_year: 2040,
        }
    }
}

impl GrowthConfig {
    fn validate(&self) -> Check {
        ensure(self.start_year <= self.end_year, "growth", || {
            format!(
                "start year {} is after end year {}",
                self.start_year, self.end_year
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.generator.horizon.hours(), 8760);
    }

    #[test]
    fn zero_feeders_per_substation_is_rejected() {
        let mut config = GeneratorConfig::default();
        config.scale.feeders_per_substation = CountRange::new(0, 3);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "scale.feeders_per_substation");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let mut config = GeneratorConfig::default();
        config.scale.transformers_per_feeder = CountRange::new(10, 5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn cardinal_layout_caps_feeder_count() {
        let mut config = GeneratorConfig::default();
        config.placement.feeder_layout = FeederLayout::Cardinal;
        config.scale.feeders_per_substation = CountRange::new(2, 9);
        assert!(config.validate().is_err());
    }

    #[test]
    fn season_window_wraps_new_year() {
        let winter = SeasonWindow::new(11, 15, 2, 15);
        let jan = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let jul = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();
        assert!(winter.contains(jan));
        assert!(!winter.contains(jul));
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: AppConfig = r#"
            [generator]
            seed = 7
            validation = "collect-all"

            [generator.scale]
            substations = 2
            feeders_per_substation = { min = 3, max = 3 }
            transformers_per_feeder = { min = 50, max = 50 }
            customers_per_transformer = { min = 5, max = 5 }

            [generator.horizon]
            start = "2024-03-01T00:00:00Z"
            end = "2024-03-08T00:00:00Z"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.generator.seed, 7);
        assert_eq!(config.generator.validation, ValidationMode::CollectAll);
        assert_eq!(config.generator.scale.substations, 2);
        assert_eq!(config.generator.horizon.hours(), 7 * 24);
        assert_eq!(config.generator.der, DerConfig::default());
    }

    #[test]
    fn load_window_outside_horizon_is_rejected() {
        let mut config = GeneratorConfig::default();
        config.load.window_start = Some(config.horizon.end);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rendered_defaults_parse_back() {
        let rendered = AppConfig::default().to_toml().unwrap();
        let parsed: AppConfig = rendered.parse().unwrap();
        assert_eq!(parsed.generator.scale, ScaleConfig::default());
        assert_eq!(parsed.generator.horizon, HorizonConfig::default());
    }

    #[test]
    fn partial_section_tables_fill_from_defaults() {
        let config: AppConfig = r#"
            [generator.placement]
            feeder_layout = "cardinal"

            [generator.outages]
            daily_rate = 0.05
        "#
        .parse()
        .unwrap();
        let placement = &config.generator.placement;
        assert_eq!(placement.feeder_layout, FeederLayout::Cardinal);
        assert_eq!(placement.max_retries, PlacementConfig::default().max_retries);
        assert_eq!(config.generator.outages.daily_rate, 0.05);
        assert_eq!(config.generator.outages.storm_inflation, 6.0);
        assert_eq!(config.generator.load, LoadConfig::default());
    }

    #[test]
    fn load_window_end_must_be_hour_aligned() {
        let mut config = GeneratorConfig::default();
        config.load.window_end = Some(config.horizon.end - chrono::Duration::minutes(30));
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "load.window_end");
    }

    #[test]
    fn nan_heatwave_threshold_is_rejected() {
        let mut config = GeneratorConfig::default();
        config.weather.heatwave_threshold_f = f64::NAN;
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "weather.heatwave_threshold_f");
    }
}
