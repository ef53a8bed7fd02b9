//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Fixed conductor and equipment catalog."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use crate::model::{ChargerLevel, Construction, CustomerType};

/// Positive/zero sequence impedance in ohm per mile plus ampacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConductorSpec {
    pub label: &'static str,
    pub construction: Construction,
    pub r1: f64,
    pub x1: f64,
    pub r0: f64,
    pub x0: f64,
    pub ampacity: f64,
}

pub static CONDUCTORS: [ConductorSpec; 5] = [
    ConductorSpec {
        label: "477_ACSR",
        construction: Construction::Overhead,
        r1: 0.306,
        x1: 0.627,
        r0: 0.592,
        x0: 1.461,
        ampacity: 730.0,
    },
    ConductorSpec {
        label: "336_ACSR",
        construction: Construction::Overhead,
        r1: 0.306,
        x1: 0.627,
        r0: 0.592,
        x0: 1.461,
        ampacity: 530.0,
    },
    ConductorSpec {
        label: "2_ACSR",
        construction: Construction::Overhead,
        r1: 1.69,
        x1: 0.726,
        r0: 1.978,
        x0: 1.766,
        ampacity: 180.0,
    },
    ConductorSpec {
        label: "500_AL_EPR",
        construction: Construction::Underground,
        r1: 0.206,
        x1: 0.296,
        r0: 0.622,
        x0: 0.241,
        ampacity: 485.0,
    },
    ConductorSpec {
        label: "1/0_AL_EPR",
        construction: Construction::Underground,
        r1: 0.97,
        x1: 0.37,
        r0: 1.54,
        x0: 0.42,
        ampacity: 230.0,
    },
];

pub const TRUNK_OVERHEAD: [&str; 2] = ["477_ACSR", "336_ACSR"];
pub const TRUNK_UNDERGROUND: &str = "500_AL_EPR";
pub const LATERAL_OVERHEAD: &str = "2_ACSR";
pub const LATERAL_UNDERGROUND: &str = "1/0_AL_EPR";

pub fn conductor(label: &str) -> Option<&'static ConductorSpec> {
    CONDUCTORS.iter().find(|spec| spec.label == label)
}

pub const SUBSTATION_NAMES: [&str; 16] = [
    "Papago",
    "Camelback",
    "Desert Sky",
    "Encanto",
    "Salt River",
    "South Mountain",
    "Maryvale",
    "Ahwatukee",
    "Arcadia",
    "Laveen",
    "Sunnyslope",
    "Deer Valley",
    "Estrella",
    "Paradise Valley",
    "Tempe Junction",
    "Mesa Grande",
];

pub const HIGH_VOLTAGES_KV: [f64; 3] = [69.0, 115.0, 230.0];
pub const FEEDER_VOLTAGES_KV: [f64; 3] = [12.47, 13.8, 24.9];
/// Nameplate ratings of a single power transformer.
pub const POWER_TRANSFORMER_MVA: [f64; 4] = [20.0, 28.0, 37.5, 50.0];

pub const TRANSFORMER_KVA: [f64; 11] = [
    10.0, 15.0, 25.0, 37.5, 50.0, 75.0, 100.0, 167.0, 250.0, 333.0, 500.0,
];
pub const PHASES: [&str; 7] = ["A", "B", "C", "AB", "BC", "AC", "ABC"];
pub const SECONDARY_VOLTAGES_V: [u32; 4] = [120, 240, 208, 480];
pub const MANUFACTURERS: [&str; 6] = [
    "ABB",
    "Eaton",
    "GE",
    "Siemens",
    "Howard Industries",
    "Prolec",
];

/// Smallest standard kVA rating covering `demand_kva`, saturating at the largest.
pub fn transformer_size(demand_kva: f64) -> f64 {
    TRANSFORMER_KVA
        .iter()
        .copied()
        .find(|size| *size >= demand_kva)
        .unwrap_or(TRANSFORMER_KVA[TRANSFORMER_KVA.len() - 1])
}

pub const CUSTOMER_MIX: [(CustomerType, f64); 4] = [
    (CustomerType::Residential, 0.82),
    (CustomerType::Commercial, 0.13),
    (CustomerType::Industrial, 0.03),
    (CustomerType::Municipal, 0.02),
];

pub fn rate_classes(kind: CustomerType) -> &'static [&'static str] {
    match kind {
        CustomerType::Residential => &["R-1", "R-TOU", "R-EV"],
        CustomerType::Commercial => &["C-1", "C-TOU", "C-DEMAND"],
        CustomerType::Industrial => &["I-1", "I-DEMAND"],
        CustomerType::Municipal => &["M-1"],
    }
}

/// Contracted demand bounds in kW.
pub fn demand_range_kw(kind: CustomerType) -> (f64, f64) {
    match kind {
        CustomerType::Residential => (3.0, 15.0),
        CustomerType::Commercial => (20.0, 500.0),
        CustomerType::Industrial => (200.0, 5_000.0),
        CustomerType::Municipal => (10.0, 200.0),
    }
}

pub fn solar_range_kw(kind: CustomerType) -> (f64, f64) {
    match kind {
        CustomerType::Residential => (3.0, 12.0),
        CustomerType::Commercial => (25.0, 500.0),
        CustomerType::Industrial | CustomerType::Municipal => (5.0, 100.0),
    }
}

pub const PANEL_TYPES: [&str; 3] = ["monocrystalline", "polycrystalline", "thin-film"];
pub const INVERTER_TYPES: [&str; 3] = ["string", "micro", "hybrid"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargerSpec {
    pub level: ChargerLevel,
    pub power_kw: f64,
    pub connector: &'static str,
}

pub static CHARGERS: [ChargerSpec; 7] = [
    ChargerSpec {
        level: ChargerLevel::Level1,
        power_kw: 1.4,
        connector: "NEMA 5-15",
    },
    ChargerSpec {
        level: ChargerLevel::Level2,
        power_kw: 7.7,
        connector: "J1772",
    },
    ChargerSpec {
        level: ChargerLevel::Level2,
        power_kw: 11.5,
        connector: "J1772",
    },
    ChargerSpec {
        level: ChargerLevel::Level2,
        power_kw: 19.2,
        connector: "J1772",
    },
    ChargerSpec {
        level: ChargerLevel::Dcfc,
        power_kw: 50.0,
        connector: "CCS",
    },
    ChargerSpec {
        level: ChargerLevel::Dcfc,
        power_kw: 150.0,
        connector: "CCS",
    },
    ChargerSpec {
        level: ChargerLevel::Dcfc,
        power_kw: 350.0,
        connector: "CCS",
    },
];

/// Residential sites only get Level 1/2 hardware; everyone else skips Level 1.
pub fn charger_options(kind: CustomerType) -> &'static [ChargerSpec] {
    match kind {
        CustomerType::Residential => &CHARGERS[..4],
        _ => &CHARGERS[1..],
    }
}

pub const CHARGING_NETWORKS: [&str; 6] = [
    "ChargePoint",
    "Tesla",
    "EVgo",
    "Blink",
    "Electrify America",
    "private",
];

pub const BATTERY_CHEMISTRIES: [&str; 3] = ["LFP", "NMC", "NCA"];

/// Battery energy bounds in kWh.
pub fn battery_range_kwh(kind: CustomerType) -> (f64, f64) {
    match kind {
        CustomerType::Residential => (10.0, 27.0),
        CustomerType::Commercial => (50.0, 500.0),
        CustomerType::Industrial => (250.0, 2_000.0),
        CustomerType::Municipal => (30.0, 300.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_label_in_use_is_catalogued() {
        for label in TRUNK_OVERHEAD
            .iter()
            .chain([TRUNK_UNDERGROUND, LATERAL_OVERHEAD, LATERAL_UNDERGROUND].iter())
        {
            assert!(conductor(label).is_some(), "{label} missing");
        }
        assert!(conductor("4/0_CU").is_none());
    }

    #[test]
    fn transformer_size_rounds_up_to_standard() {
        assert_eq!(transformer_size(0.0), 10.0);
        assert_eq!(transformer_size(26.0), 37.5);
        assert_eq!(transformer_size(9_999.0), 500.0);
    }

    #[test]
    fn residential_chargers_exclude_fast_charging() {
        assert!(charger_options(CustomerType::Residential)
            .iter()
            .all(|spec| spec.level != ChargerLevel::Dcfc));
        assert!(charger_options(CustomerType::Commercial)
            .iter()
            .all(|spec| spec.level != ChargerLevel::Level1));
    }
}
