//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Weather-sensitive feeder load series at the configured resolution."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Every feeder draws from its own sub-stream keyed by its index, so a
//! feeder's series is identical whatever order feeders are synthesized in.

use std::collections::HashMap;

use chrono::Datelike;
use dnm_common::GeneratorConfig;
use dnm_logging::{dnm_debug, log_stage_event, LogContext, StageOutcome};

use super::{
    annual_cycle, diurnal_shape, is_weekend, local_hour, local_time, steps, weather_multiplier,
    WeatherSeries,
};
use crate::model::{round_to, Customer, CustomerType, Feeder, LoadRecord};
use crate::rng::GeneratorRng;

/// Share of peak drawn by the average hour before weather and shape.
const BASE_LOAD_FACTOR: f64 = 0.62;
const SEASONAL_SWING: f64 = 0.08;
const PF_RANGE: (f64, f64) = (0.85, 1.0);
const VOLTAGE_RANGE: (f64, f64) = (0.95, 1.05);

/// Contracted-demand weighting of a feeder's customer classes.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMix {
    weights: Vec<(CustomerType, f64)>,
}

impl CustomerMix {
    pub fn from_customers<'a>(customers: impl IntoIterator<Item = &'a Customer>) -> Self {
        let mut totals: Vec<(CustomerType, f64)> = Vec::new();
        for customer in customers {
            match totals.iter_mut().find(|(kind, _)| *kind == customer.customer_type) {
                Some((_, total)) => *total += customer.contracted_demand_kw,
                None => totals.push((customer.customer_type, customer.contracted_demand_kw)),
            }
        }
        let sum: f64 = totals.iter().map(|(_, total)| total).sum();
        if sum > 0.0 {
            for (_, total) in &mut totals {
                *total /= sum;
            }
        } else {
            totals = vec![(CustomerType::Residential, 1.0)];
        }
        Self { weights: totals }
    }

    pub fn shape(&self, hour: f64, weekend: bool) -> f64 {
        self.weights
            .iter()
            .map(|(kind, weight)| weight * diurnal_shape(*kind, hour, weekend))
            .sum()
    }
}

/// Load rows for every feeder over the load window, feeder-major.
pub fn synthesize_load(
    config: &GeneratorConfig,
    feeders: &[Feeder],
    customers: &[Customer],
    weather: WeatherSeries<'_>,
    rng: &GeneratorRng,
) -> Vec<LoadRecord> {
    let mut by_feeder: HashMap<&str, Vec<&Customer>> = HashMap::new();
    for customer in customers {
        by_feeder
            .entry(customer.feeder_id.as_str())
            .or_default()
            .push(customer);
    }

    let mut rows = Vec::new();
    for (index, feeder) in feeders.iter().enumerate() {
        let mix = CustomerMix::from_customers(
            by_feeder
                .get(feeder.feeder_id.as_str())
                .into_iter()
                .flatten()
                .copied(),
        );
        let mut stream = rng.substream(index as u64);
        rows.extend(feeder_series(config, feeder, &mix, weather, &mut stream));
        dnm_debug!(
            context = LogContext::new()
                .with_stage("load")
                .with_substation(&feeder.substation_id)
                .with_feeder(&feeder.feeder_id),
            "feeder series complete"
        );
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("load").with_seed(rng.seed())),
        "stage.complete",
        &format!("{} load records for {} feeders", rows.len(), feeders.len()),
        StageOutcome::Success,
    );
    rows
}

/// One feeder's series; depends only on its own stream.
pub fn feeder_series(
    config: &GeneratorConfig,
    feeder: &Feeder,
    mix: &CustomerMix,
    weather: WeatherSeries<'_>,
    rng: &mut GeneratorRng,
) -> Vec<LoadRecord> {
    let load = &config.load;
    let (start, end) = load.window(&config.horizon);
    let rating = feeder.rated_capacity_mw;
    let floor = load.min_load_fraction * rating;
    let peak_day = config.weather.peak_day_of_year;

    steps(start, end, load.resolution_minutes)
        .map(|timestamp| {
            let local = local_time(timestamp, config.horizon.utc_offset_hours);
            let temperature = weather
                .at(timestamp)
                .map_or(config.weather.annual_mean_f, |record| record.temperature_f);
            let seasonal = 1.0 + SEASONAL_SWING * annual_cycle(local.ordinal(), peak_day);
            let raw = feeder.peak_load_mw
                * BASE_LOAD_FACTOR
                * mix.shape(local_hour(local), is_weekend(local))
                * seasonal
                * weather_multiplier(load, temperature)
                * (1.0 + rng.jitter(load.noise));
            let load_mw = raw.clamp(floor, rating);
            let utilisation = if rating > 0.0 { load_mw / rating } else { 0.0 };
            let power_factor =
                (0.97 - 0.04 * utilisation + rng.jitter(0.01)).clamp(PF_RANGE.0, PF_RANGE.1);
            let voltage_pu = (1.03 - 0.05 * utilisation + rng.jitter(0.005))
                .clamp(VOLTAGE_RANGE.0, VOLTAGE_RANGE.1);
            LoadRecord {
                timestamp,
                feeder_id: feeder.feeder_id.clone(),
                substation_id: feeder.substation_id.clone(),
                load_mw: round_to(load_mw, 4),
                load_mvar: round_to(load_mw * power_factor.acos().tan(), 4),
                voltage_pu: round_to(voltage_pu, 4),
                power_factor: round_to(power_factor, 4),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetStatus;
    use crate::timeseries::synthesize_weather;

    fn feeder(id: &str, peak: f64) -> Feeder {
        Feeder {
            feeder_id: id.into(),
            substation_id: "SUB-001".into(),
            name: id.into(),
            voltage_kv: 12.47,
            head_latitude: 33.45,
            head_longitude: -112.07,
            tail_latitude: 33.5,
            tail_longitude: -112.07,
            bearing_deg: 0.0,
            direction: "N".into(),
            length_miles: 3.0,
            conductor_type: "477_ACSR".into(),
            rated_capacity_mw: 5.0,
            peak_load_mw: peak,
            transformer_count: 10,
            customer_count: 40,
            design_customer_limit: 120,
            tail_clamped: false,
            status: AssetStatus::Active,
        }
    }

    #[test]
    fn load_stays_within_rating_and_floor() {
        let config = GeneratorConfig::default();
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(42));
        let series = WeatherSeries::new(&config.horizon, &weather);
        let feeders = [feeder("FDR-0001", 3.9), feeder("FDR-0002", 1.0)];
        let rows = synthesize_load(&config, &feeders, &[], series, &GeneratorRng::new(42));
        assert_eq!(rows.len(), 2 * 8_760);
        for row in &rows {
            assert!(row.load_mw <= 5.0 + 1e-9);
            assert!(row.load_mw >= 0.25 - 1e-9);
            assert!((0.85..=1.0).contains(&row.power_factor));
            assert!((0.95..=1.05).contains(&row.voltage_pu));
            assert!(row.load_mvar >= 0.0);
        }
    }

    #[test]
    fn feeder_series_do_not_depend_on_order() {
        let mut config = GeneratorConfig::default();
        config.horizon.end = config.horizon.start + chrono::Duration::days(7);
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(1));
        let series = WeatherSeries::new(&config.horizon, &weather);
        let rng = GeneratorRng::new(99);
        let a = feeder("FDR-0001", 2.0);
        let mix = CustomerMix::from_customers(std::iter::empty());
        let alone = feeder_series(&config, &a, &mix, series, &mut rng.substream(0));
        let together = synthesize_load(&config, &[a, feeder("FDR-0002", 3.0)], &[], series, &rng);
        assert_eq!(alone, together[..alone.len()]);
    }
}
