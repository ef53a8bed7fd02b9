//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Bernoulli attachment of rooftop solar, EV chargers and batteries to customers."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Customers are visited in id order with three draws each (solar, EV,
//! battery); a hit immediately draws that asset's attributes. Assets take the
//! customer's coordinate verbatim and set the matching `has_*` flag, so the
//! customer/asset cardinality is 1:1 by construction.

use chrono::Datelike;
use dnm_common::GeneratorConfig;
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use crate::catalog;
use crate::model::{
    round_to, Battery, Customer, CustomerType, EvCharger, IdSequence, SolarInstallation,
};
use crate::rng::GeneratorRng;
use crate::table::DerTables;

/// Attach DER assets, mutating the customers' adoption flags in place.
pub fn attach_der(
    config: &GeneratorConfig,
    customers: &mut [Customer],
    rng: &mut GeneratorRng,
) -> DerTables {
    let rates = &config.der;
    let year = config.horizon.start.year();
    let mut solar_ids = IdSequence::new("SOL", 6);
    let mut ev_ids = IdSequence::new("EV", 6);
    let mut battery_ids = IdSequence::new("BAT", 6);
    let mut out = DerTables::default();

    for customer in customers.iter_mut() {
        if rng.chance(rates.solar_rate) {
            customer.has_solar = true;
            out.solar.push(solar(customer, solar_ids.next_id(), year, rng));
        }
        if rng.chance(rates.ev_rate) {
            customer.has_ev = true;
            out.ev_chargers
                .push(charger(customer, ev_ids.next_id(), year, rng));
        }
        if rng.chance(rates.battery_rate) {
            customer.has_battery = true;
            out.batteries
                .push(battery(customer, battery_ids.next_id(), year, rng));
        }
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("der").with_seed(rng.seed())),
        "stage.complete",
        &format!(
            "{} solar, {} ev chargers, {} batteries across {} customers",
            out.solar.len(),
            out.ev_chargers.len(),
            out.batteries.len(),
            customers.len()
        ),
        StageOutcome::Success,
    );
    out
}

fn solar(customer: &Customer, solar_id: String, year: i32, rng: &mut GeneratorRng) -> SolarInstallation {
    let (low, high) = catalog::solar_range_kw(customer.customer_type);
    let capacity_kw = round_to(rng.uniform(low, high), 2);
    let panel_type = (*rng.pick(&catalog::PANEL_TYPES)).to_owned();
    let inverter_type = (*rng.pick(&catalog::INVERTER_TYPES)).to_owned();
    // South-facing with some east/west spread.
    let azimuth_deg = rng.between(135, 225);
    let tilt_deg = match customer.customer_type {
        CustomerType::Residential => rng.between(15, 35),
        _ => rng.between(5, 20),
    };
    let install_year = year - rng.between(0, 12) as i32;
    SolarInstallation {
        solar_id,
        customer_id: customer.customer_id.clone(),
        transformer_id: customer.transformer_id.clone(),
        feeder_id: customer.feeder_id.clone(),
        substation_id: customer.substation_id.clone(),
        latitude: customer.latitude,
        longitude: customer.longitude,
        capacity_kw,
        panel_type,
        inverter_type,
        azimuth_deg,
        tilt_deg,
        install_year,
    }
}

fn charger(customer: &Customer, charger_id: String, year: i32, rng: &mut GeneratorRng) -> EvCharger {
    let spec = rng
        .choose(catalog::charger_options(customer.customer_type))
        .copied()
        .unwrap_or(catalog::CHARGERS[1]);
    let network = match customer.customer_type {
        CustomerType::Residential => "private".to_owned(),
        _ => (*rng.pick(&catalog::CHARGING_NETWORKS)).to_owned(),
    };
    let install_year = year - rng.between(0, 6) as i32;
    EvCharger {
        charger_id,
        customer_id: customer.customer_id.clone(),
        transformer_id: customer.transformer_id.clone(),
        feeder_id: customer.feeder_id.clone(),
        substation_id: customer.substation_id.clone(),
        latitude: customer.latitude,
        longitude: customer.longitude,
        charger_level: spec.level,
        power_kw: spec.power_kw,
        connector: spec.connector.to_owned(),
        network,
        install_year,
    }
}

fn battery(customer: &Customer, battery_id: String, year: i32, rng: &mut GeneratorRng) -> Battery {
    let (low, high) = catalog::battery_range_kwh(customer.customer_type);
    let capacity_kwh = round_to(rng.uniform(low, high), 1);
    // Two to four hour duration systems.
    let power_kw = round_to(capacity_kwh / rng.uniform(2.0, 4.0), 1);
    let chemistry = (*rng.pick(&catalog::BATTERY_CHEMISTRIES)).to_owned();
    let install_year = year - rng.between(0, 5) as i32;
    Battery {
        battery_id,
        customer_id: customer.customer_id.clone(),
        transformer_id: customer.transformer_id.clone(),
        feeder_id: customer.feeder_id.clone(),
        substation_id: customer.substation_id.clone(),
        latitude: customer.latitude,
        longitude: customer.longitude,
        capacity_kwh,
        power_kw,
        chemistry,
        install_year,
    }
}
