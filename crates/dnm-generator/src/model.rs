//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Row types of every generated table."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Rows are flat so they serialise to delimited text without reshaping.
//! Coordinates are stored as separate `latitude`/`longitude` columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::geo::GeoPoint;

/// Zero-padded, type-prefixed identifier such as `XFMR-000042`.
pub fn format_id(prefix: &str, width: usize, ordinal: usize) -> String {
    format!("{prefix}-{ordinal:0width$}")
}

/// Per-table counter producing ids in creation order.
#[derive(Debug, Clone)]
pub struct IdSequence {
    prefix: &'static str,
    width: usize,
    issued: usize,
}

impl IdSequence {
    pub const fn new(prefix: &'static str, width: usize) -> Self {
        Self {
            prefix,
            width,
            issued: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        self.issued += 1;
        format_id(self.prefix, self.width, self.issued)
    }

    pub fn issued(&self) -> usize {
        self.issued
    }
}

/// Rows addressable by a unique string id.
pub trait Keyed {
    fn id(&self) -> &str;
}

/// Rows with a single geographic position.
pub trait Located {
    fn location(&self) -> GeoPoint;
}

macro_rules! keyed {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(impl Keyed for $ty {
            fn id(&self) -> &str {
                &self.$field
            }
        })+
    };
}

macro_rules! located {
    ($($ty:ty),+ $(,)?) => {
        $(impl Located for $ty {
            fn location(&self) -> GeoPoint {
                GeoPoint::new(self.latitude, self.longitude)
            }
        })+
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssetStatus {
    Active,
    Maintenance,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustomerType {
    Residential,
    Commercial,
    Industrial,
    Municipal,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Recloser,
    Sectionalizer,
    Fuse,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwitchState {
    Closed,
    Open,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeType {
    SubstationBus,
    FeederBreaker,
    Junction,
    Transformer,
    ProtectiveDevice,
    TieSwitch,
    FeederEndpoint,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EdgeKind {
    BusTie,
    Primary,
    Lateral,
    Tie,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Construction {
    Overhead,
    Underground,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutageCause {
    EquipmentFailure,
    Weather,
    Overload,
    AnimalContact,
    Vegetation,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargerLevel {
    Level1,
    Level2,
    Dcfc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DayType {
    Weekday,
    Weekend,
}

/// Site class a charging profile describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargingSegment {
    Residential,
    Commercial,
    Dcfc,
}

impl ChargingSegment {
    pub const ALL: [ChargingSegment; 3] = [
        ChargingSegment::Residential,
        ChargingSegment::Commercial,
        ChargingSegment::Dcfc,
    ];

    /// Segment whose profile drives a charger of `level` at a `kind` site.
    pub fn of(kind: CustomerType, level: ChargerLevel) -> Self {
        match (kind, level) {
            (_, ChargerLevel::Dcfc) => ChargingSegment::Dcfc,
            (CustomerType::Residential, _) => ChargingSegment::Residential,
            _ => ChargingSegment::Commercial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substation {
    pub substation_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub voltage_high_kv: f64,
    pub voltage_low_kv: f64,
    pub rated_capacity_mva: f64,
    pub peak_load_mva: f64,
    pub power_transformer_count: u32,
    pub age_years: u32,
    pub status: AssetStatus,
    pub feeder_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feeder {
    pub feeder_id: String,
    pub substation_id: String,
    pub name: String,
    pub voltage_kv: f64,
    pub head_latitude: f64,
    pub head_longitude: f64,
    pub tail_latitude: f64,
    pub tail_longitude: f64,
    pub bearing_deg: f64,
    pub direction: String,
    pub length_miles: f64,
    pub conductor_type: String,
    pub rated_capacity_mw: f64,
    pub peak_load_mw: f64,
    pub transformer_count: u32,
    pub customer_count: u32,
    pub design_customer_limit: u32,
    pub tail_clamped: bool,
    pub status: AssetStatus,
}

impl Feeder {
    pub fn head(&self) -> GeoPoint {
        GeoPoint::new(self.head_latitude, self.head_longitude)
    }

    pub fn tail(&self) -> GeoPoint {
        GeoPoint::new(self.tail_latitude, self.tail_longitude)
    }

    /// Point on the head→tail trunk at `fraction` of its length.
    pub fn trunk_point(&self, fraction: f64) -> GeoPoint {
        self.head().lerp(self.tail(), fraction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub transformer_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub position_fraction: f64,
    pub rated_kva: f64,
    pub phase: String,
    pub primary_voltage_kv: f64,
    pub secondary_voltage_v: u32,
    pub manufacturer: String,
    pub install_year: i32,
    pub age_years: u32,
    pub health_index: Option<f64>,
    pub condition_score: Option<f64>,
    pub status: AssetStatus,
    pub placement_clamped: bool,
    pub customer_count: u32,
}

impl Transformer {
    pub fn phase_count(&self) -> u8 {
        self.phase.len().clamp(1, 3) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub transformer_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub customer_type: CustomerType,
    pub rate_class: String,
    pub contracted_demand_kw: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub has_solar: bool,
    pub has_ev: bool,
    pub has_battery: bool,
    pub placement_clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarInstallation {
    pub solar_id: String,
    pub customer_id: String,
    pub transformer_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity_kw: f64,
    pub panel_type: String,
    pub inverter_type: String,
    pub azimuth_deg: u32,
    pub tilt_deg: u32,
    pub install_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvCharger {
    pub charger_id: String,
    pub customer_id: String,
    pub transformer_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub charger_level: ChargerLevel,
    pub power_kw: f64,
    pub connector: String,
    pub network: String,
    pub install_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub battery_id: String,
    pub customer_id: String,
    pub transformer_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity_kwh: f64,
    pub power_kw: f64,
    pub chemistry: String,
    pub install_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingDevice {
    pub device_id: String,
    pub device_type: DeviceType,
    pub feeder_id: String,
    pub substation_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub position_fraction: f64,
    pub transformer_id: Option<String>,
    pub junction_index: Option<u32>,
    pub rated_amps: f64,
    pub normal_state: SwitchState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieSwitch {
    pub tie_id: String,
    pub feeder_a_id: String,
    pub feeder_b_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub separation_miles: f64,
    pub normal_state: SwitchState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub node_id: String,
    pub node_type: NodeType,
    pub entity_id: Option<String>,
    pub feeder_id: Option<String>,
    pub substation_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub voltage_kv: f64,
    pub rated_kva: Option<f64>,
    pub phases: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub edge_id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub feeder_id: Option<String>,
    pub substation_id: Option<String>,
    pub edge_kind: EdgeKind,
    pub construction: Construction,
    pub conductor_type: String,
    pub length_miles: f64,
    pub length_ft: f64,
    pub r1_ohm_per_mile: f64,
    pub x1_ohm_per_mile: f64,
    pub r0_ohm_per_mile: f64,
    pub x0_ohm_per_mile: f64,
    pub rated_amps: f64,
    pub phases: u8,
    pub status: SwitchState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub timestamp: DateTime<Utc>,
    pub temperature_f: f64,
    pub humidity_pct: f64,
    pub wind_speed_mph: f64,
    pub precipitation_in: f64,
    pub cloud_cover_pct: f64,
    pub ghi_w_per_m2: f64,
    pub is_storm: bool,
    pub is_heatwave: bool,
}

impl WeatherRecord {
    pub fn is_severe(&self) -> bool {
        self.is_storm || self.is_heatwave
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    pub timestamp: DateTime<Utc>,
    pub feeder_id: String,
    pub substation_id: String,
    pub load_mw: f64,
    pub load_mvar: f64,
    pub voltage_pu: f64,
    pub power_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageEvent {
    pub outage_id: String,
    pub feeder_id: String,
    pub substation_id: String,
    pub device_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub cause: OutageCause,
    pub customers_affected: u32,
    pub weather_related: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmiRecord {
    pub timestamp: DateTime<Utc>,
    pub customer_id: String,
    pub transformer_id: String,
    pub feeder_id: String,
    pub demand_kw: f64,
    pub solar_kw: f64,
    pub ev_kw: f64,
    pub net_kw: f64,
    pub voltage_v: f64,
}

/// One row per (scenario, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthScenario {
    pub scenario_id: String,
    pub name: String,
    pub year: i32,
    pub ev_adoption_pct: f64,
    pub solar_adoption_pct: f64,
    pub battery_adoption_pct: f64,
    pub load_growth_pct: f64,
    pub peak_growth_pct: f64,
    pub efficiency_savings_pct: f64,
    pub electrification_pct: f64,
    pub description: String,
}

/// Representative-day solar output for one local (month, hour), averaged
/// over every matching weather hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarProfile {
    pub month: u32,
    pub hour_of_day: u32,
    pub sample_days: u32,
    pub clear_sky_factor: f64,
    pub cloud_factor: f64,
    pub ghi_w_per_m2: f64,
    pub temperature_f: f64,
    pub generation_pct_of_capacity: f64,
}

/// Share of installed charging power in use for one segment and local hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvChargingProfile {
    pub day_type: DayType,
    pub hour_of_day: u32,
    pub segment: ChargingSegment,
    pub load_pct: f64,
    pub mean_power_kw: f64,
}

keyed!(
    Substation => substation_id,
    Feeder => feeder_id,
    Transformer => transformer_id,
    Customer => customer_id,
    SolarInstallation => solar_id,
    EvCharger => charger_id,
    Battery => battery_id,
    SwitchingDevice => device_id,
    TieSwitch => tie_id,
    NetworkNode => node_id,
    NetworkEdge => edge_id,
    OutageEvent => outage_id,
);

located!(
    Substation,
    Transformer,
    Customer,
    SolarInstallation,
    EvCharger,
    Battery,
    SwitchingDevice,
    TieSwitch,
    NetworkNode,
);

/// Round to `places` decimals for human-facing attribute columns.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_zero_padded_and_sequential() {
        let mut seq = IdSequence::new("XFMR", 6);
        assert_eq!(seq.next_id(), "XFMR-000001");
        assert_eq!(seq.next_id(), "XFMR-000002");
        assert_eq!(seq.issued(), 2);
        assert_eq!(format_id("SUB", 3, 12), "SUB-012");
    }

    #[test]
    fn enums_use_snake_case_labels() {
        assert_eq!(NodeType::SubstationBus.as_ref(), "substation_bus");
        assert_eq!(OutageCause::AnimalContact.to_string(), "animal_contact");
        assert_eq!(ChargerLevel::Dcfc.as_ref(), "dcfc");
        assert_eq!(DayType::Weekend.to_string(), "weekend");
    }

    #[test]
    fn charging_segment_follows_site_and_level() {
        use ChargingSegment as S;
        assert_eq!(S::of(CustomerType::Residential, ChargerLevel::Level1), S::Residential);
        assert_eq!(S::of(CustomerType::Commercial, ChargerLevel::Level2), S::Commercial);
        assert_eq!(S::of(CustomerType::Industrial, ChargerLevel::Dcfc), S::Dcfc);
    }

    #[test]
    fn rounding_keeps_requested_precision() {
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(2.25, 1), 2.3);
    }
}
