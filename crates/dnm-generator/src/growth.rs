//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Capped linear growth scenario projections per planning year."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use dnm_common::GrowthConfig;

use crate::model::{round_to, GrowthScenario};

/// Yearly slope of each trajectory plus the starting offsets that differ per
/// scenario.
struct Trajectory {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    ev_rate: f64,
    solar_rate: f64,
    battery_rate: f64,
    load_base: f64,
    load_rate: f64,
    peak_base: f64,
    peak_rate: f64,
    efficiency_rate: f64,
    electrification_base: f64,
    electrification_rate: f64,
}

const SCENARIOS: [Trajectory; 5] = [
    Trajectory {
        id: "SCN-001",
        name: "Reference Case",
        description: "Moderate growth, current policy trajectory",
        ev_rate: 2.5,
        solar_rate: 1.8,
        battery_rate: 0.8,
        load_base: 1.0,
        load_rate: 0.15,
        peak_base: 1.2,
        peak_rate: 0.2,
        efficiency_rate: 0.1,
        electrification_base: 2.0,
        electrification_rate: 0.5,
    },
    Trajectory {
        id: "SCN-002",
        name: "High EV Adoption",
        description: "Aggressive EV adoption driven by policy incentives",
        ev_rate: 5.0,
        solar_rate: 2.0,
        battery_rate: 1.2,
        load_base: 1.5,
        load_rate: 0.3,
        peak_base: 2.0,
        peak_rate: 0.4,
        efficiency_rate: 0.1,
        electrification_base: 3.0,
        electrification_rate: 0.8,
    },
    Trajectory {
        id: "SCN-003",
        name: "High Solar Growth",
        description: "Rapid DER expansion with net metering 2.0",
        ev_rate: 2.0,
        solar_rate: 4.5,
        battery_rate: 2.5,
        load_base: 0.5,
        load_rate: 0.05,
        peak_base: 0.8,
        peak_rate: 0.1,
        efficiency_rate: 0.2,
        electrification_base: 2.0,
        electrification_rate: 0.3,
    },
    Trajectory {
        id: "SCN-004",
        name: "Extreme Heat",
        description: "Climate-driven load growth from increased cooling demand",
        ev_rate: 2.5,
        solar_rate: 2.0,
        battery_rate: 1.0,
        load_base: 2.0,
        load_rate: 0.4,
        peak_base: 3.0,
        peak_rate: 0.6,
        efficiency_rate: 0.1,
        electrification_base: 2.0,
        electrification_rate: 0.4,
    },
    Trajectory {
        id: "SCN-005",
        name: "Full Electrification",
        description: "Building and transportation electrification mandate",
        ev_rate: 4.0,
        solar_rate: 3.0,
        battery_rate: 2.0,
        load_base: 2.5,
        load_rate: 0.5,
        peak_base: 3.0,
        peak_rate: 0.55,
        efficiency_rate: 0.15,
        electrification_base: 5.0,
        electrification_rate: 2.0,
    },
];

const EV_START_PCT: f64 = 8.0;
const SOLAR_START_PCT: f64 = 12.0;
const BATTERY_START_PCT: f64 = 3.0;
const EFFICIENCY_START_PCT: f64 = 0.5;

/// One row per scenario and year in `[start_year, end_year]`. Draws nothing.
pub fn project(config: &GrowthConfig) -> Vec<GrowthScenario> {
    let years = config.start_year..=config.end_year;
    let mut rows = Vec::with_capacity(SCENARIOS.len() * years.clone().count());
    for scenario in &SCENARIOS {
        for year in years.clone() {
            let elapsed = f64::from(year - config.start_year);
            rows.push(GrowthScenario {
                scenario_id: scenario.id.to_owned(),
                name: scenario.name.to_owned(),
                year,
                ev_adoption_pct: capped(EV_START_PCT + elapsed * scenario.ev_rate, 95.0),
                solar_adoption_pct: capped(SOLAR_START_PCT + elapsed * scenario.solar_rate, 90.0),
                battery_adoption_pct: capped(
                    BATTERY_START_PCT + elapsed * scenario.battery_rate,
                    80.0,
                ),
                load_growth_pct: round_to(scenario.load_base + elapsed * scenario.load_rate, 2),
                peak_growth_pct: round_to(scenario.peak_base + elapsed * scenario.peak_rate, 2),
                efficiency_savings_pct: round_to(
                    EFFICIENCY_START_PCT + elapsed * scenario.efficiency_rate,
                    2,
                ),
                electrification_pct: capped(
                    scenario.electrification_base + elapsed * scenario.electrification_rate,
                    95.0,
                ),
                description: scenario.description.to_owned(),
            });
        }
    }
    rows
}

fn capped(value: f64, cap: f64) -> f64 {
    round_to(value, 1).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_yields_seventeen_years_per_scenario() {
        let rows = project(&GrowthConfig::default());
        assert_eq!(rows.len(), 5 * 17);
        assert_eq!(rows[0].year, 2024);
        assert_eq!(rows[16].year, 2040);
        assert_eq!(rows[17].scenario_id, "SCN-002");
    }

    #[test]
    fn trajectories_start_at_baseline_and_respect_caps() {
        let rows = project(&GrowthConfig {
            start_year: 2024,
            end_year: 2080,
        });
        let first = &rows[0];
        assert_eq!(first.ev_adoption_pct, 8.0);
        assert_eq!(first.solar_adoption_pct, 12.0);
        assert_eq!(first.efficiency_savings_pct, 0.5);
        for row in &rows {
            assert!(row.ev_adoption_pct <= 95.0);
            assert!(row.solar_adoption_pct <= 90.0);
            assert!(row.battery_adoption_pct <= 80.0);
            assert!(row.electrification_pct <= 95.0);
        }
        let electrified = rows
            .iter()
            .filter(|r| r.scenario_id == "SCN-005")
            .last()
            .unwrap();
        assert_eq!(electrified.ev_adoption_pct, 95.0);
    }
}
