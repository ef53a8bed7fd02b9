//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Interval meter reads for a sample of customers around the hottest day."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use dnm_common::GeneratorConfig;
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use super::{
    diurnal_shape, is_weekend, local_hour, local_time, steps, weather_multiplier, WeatherSeries,
    CLEAR_SKY_GHI, INVERTER_DERATE,
};
use crate::model::{round_to, AmiRecord, Customer, EvCharger, SolarInstallation};
use crate::rng::GeneratorRng;

/// Sub-stream index reserved for meter data; feeder load streams use small
/// indices.
const AMI_STREAM: u64 = 1 << 32;
const AVERAGE_DEMAND_FACTOR: f64 = 0.55;
const SERVICE_VOLTAGE: (f64, f64, f64) = (228.0, 240.0, 252.0);

/// Observation window of `window_days` starting at local midnight of the
/// hottest day, shifted back so it fits inside the horizon.
pub fn ami_window(
    config: &GeneratorConfig,
    weather: WeatherSeries<'_>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let horizon = &config.horizon;
    let span = Duration::days(i64::from(config.ami.window_days.max(1)));
    let hottest = weather
        .records()
        .iter()
        .max_by(|a, b| a.temperature_f.total_cmp(&b.temperature_f))
        .map_or(horizon.start, |record| record.timestamp);
    let local = local_time(hottest, horizon.utc_offset_hours);
    let mut start = hottest - Duration::hours(i64::from(local.hour()));
    if start + span > horizon.end {
        start = horizon.end - span;
    }
    let start = start.max(horizon.start);
    (start, (start + span).min(horizon.end))
}

/// Evening charging session. A session ending after midnight carries its
/// remaining hours into the next local day.
#[derive(Debug, Default)]
struct Session {
    day: Option<NaiveDate>,
    start_hour: f64,
    end_hour: f64,
    carried_hours: f64,
}

impl Session {
    fn roll(&mut self, day: NaiveDate, start_hour: f64, end_hour: f64) {
        self.carried_hours = if self.day.is_some() {
            (self.end_hour - 24.0).max(0.0)
        } else {
            0.0
        };
        self.day = Some(day);
        self.start_hour = start_hour;
        self.end_hour = end_hour;
    }

    fn is_charging(&self, hour: f64) -> bool {
        hour < self.carried_hours || (hour >= self.start_hour && hour < self.end_hour)
    }
}

/// Meter rows for a random sample of customers, customer-major.
pub fn synthesize_ami(
    config: &GeneratorConfig,
    customers: &[Customer],
    solar: &[SolarInstallation],
    chargers: &[EvCharger],
    weather: WeatherSeries<'_>,
    rng: &GeneratorRng,
) -> Vec<AmiRecord> {
    let mut stream = rng.substream(AMI_STREAM);
    let amount = (config.ami.sample_customers as usize).min(customers.len());
    let sample = stream.sample_indices(customers.len(), amount);
    let solar_kw: HashMap<&str, f64> = solar
        .iter()
        .map(|s| (s.customer_id.as_str(), s.capacity_kw))
        .collect();
    let charger_kw: HashMap<&str, f64> = chargers
        .iter()
        .map(|c| (c.customer_id.as_str(), c.power_kw))
        .collect();
    let (start, end) = ami_window(config, weather);
    let offset = config.horizon.utc_offset_hours;

    let mut rows = Vec::new();
    for index in sample {
        let customer = &customers[index];
        let capacity = solar_kw.get(customer.customer_id.as_str()).copied();
        let charger = charger_kw.get(customer.customer_id.as_str()).copied();
        let mut session = Session::default();
        for timestamp in steps(start, end, config.ami.interval_minutes) {
            let local = local_time(timestamp, offset);
            let hour = local_hour(local);
            let record = weather.at(timestamp);
            let temperature = record.map_or(config.weather.annual_mean_f, |r| r.temperature_f);
            let ghi = record.map_or(0.0, |r| r.ghi_w_per_m2);

            let demand_kw = (customer.contracted_demand_kw
                * AVERAGE_DEMAND_FACTOR
                * diurnal_shape(customer.customer_type, hour, is_weekend(local))
                * weather_multiplier(&config.load, temperature)
                * (1.0 + stream.jitter(0.15)))
            .max(0.0);
            let solar_kw = capacity.map_or(0.0, |kw| {
                (kw * ghi / CLEAR_SKY_GHI * INVERTER_DERATE * (1.0 + stream.jitter(0.05))).max(0.0)
            });
            let ev_kw = match charger {
                Some(power) => {
                    if session.day != Some(local.date()) {
                        let start_hour = f64::from(stream.between(17, 22));
                        let end_hour = start_hour + f64::from(stream.between(1, 4));
                        session.roll(local.date(), start_hour, end_hour);
                    }
                    if session.is_charging(hour) {
                        power
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            };
            let net_kw = demand_kw + ev_kw - solar_kw;
            let sag = if customer.contracted_demand_kw > 0.0 {
                net_kw / customer.contracted_demand_kw
            } else {
                0.0
            };
            let voltage_v = (SERVICE_VOLTAGE.1 * (1.0 - 0.02 * sag) + stream.jitter(2.0))
                .clamp(SERVICE_VOLTAGE.0, SERVICE_VOLTAGE.2);

            rows.push(AmiRecord {
                timestamp,
                customer_id: customer.customer_id.clone(),
                transformer_id: customer.transformer_id.clone(),
                feeder_id: customer.feeder_id.clone(),
                demand_kw: round_to(demand_kw, 3),
                solar_kw: round_to(solar_kw, 3),
                ev_kw: round_to(ev_kw, 3),
                net_kw: round_to(net_kw, 3),
                voltage_v: round_to(voltage_v, 1),
            });
        }
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("ami").with_seed(rng.seed())),
        "stage.complete",
        &format!(
            "{} interval reads for {amount} customers between {start} and {end}",
            rows.len()
        ),
        StageOutcome::Success,
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CustomerType;
    use crate::timeseries::synthesize_weather;

    fn customer(index: usize, has_solar: bool) -> Customer {
        Customer {
            customer_id: format!("CUST-{index:07}"),
            transformer_id: "XFMR-000001".into(),
            feeder_id: "FDR-0001".into(),
            substation_id: "SUB-001".into(),
            customer_type: CustomerType::Residential,
            rate_class: "R1".into(),
            contracted_demand_kw: 10.0,
            latitude: 33.4,
            longitude: -112.0,
            has_solar,
            has_ev: false,
            has_battery: false,
            placement_clamped: false,
        }
    }

    #[test]
    fn window_fits_inside_horizon() {
        let config = GeneratorConfig::default();
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(42));
        let series = WeatherSeries::new(&config.horizon, &weather);
        let (start, end) = ami_window(&config, series);
        assert!(start >= config.horizon.start && end <= config.horizon.end);
        assert_eq!(end - start, Duration::days(7));
        assert_eq!(local_time(start, -7).hour(), 0);
    }

    #[test]
    fn solar_only_produces_in_daylight() {
        let mut config = GeneratorConfig::default();
        config.ami.sample_customers = 2;
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(3));
        let series = WeatherSeries::new(&config.horizon, &weather);
        let customers = [customer(1, true), customer(2, false)];
        let solar = [SolarInstallation {
            solar_id: "SOL-000001".into(),
            customer_id: "CUST-0000001".into(),
            transformer_id: "XFMR-000001".into(),
            feeder_id: "FDR-0001".into(),
            substation_id: "SUB-001".into(),
            latitude: 33.4,
            longitude: -112.0,
            capacity_kw: 8.0,
            panel_type: "monocrystalline".into(),
            inverter_type: "string".into(),
            azimuth_deg: 180,
            tilt_deg: 25,
            install_year: 2020,
        }];
        let rows = synthesize_ami(&config, &customers, &solar, &[], series, &GeneratorRng::new(3));
        assert_eq!(rows.len(), 2 * 7 * 24 * 4);
        for row in &rows {
            if row.customer_id == "CUST-0000002" {
                assert_eq!(row.solar_kw, 0.0);
            }
            let hour = local_time(row.timestamp, -7).hour();
            if !(6..18).contains(&hour) {
                assert_eq!(row.solar_kw, 0.0);
            }
            assert!((228.0..=252.0).contains(&row.voltage_v));
        }
        assert!(rows.iter().any(|r| r.solar_kw > 0.0));
    }

    #[test]
    fn late_sessions_continue_past_midnight() {
        let day = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
        let mut session = Session::default();
        session.roll(day, 22.0, 26.0);
        assert!(!session.is_charging(1.0));
        assert!(session.is_charging(23.5));

        session.roll(day.succ_opt().unwrap(), 18.0, 19.0);
        assert!(session.is_charging(0.0));
        assert!(session.is_charging(1.75));
        assert!(!session.is_charging(2.0));
        assert!(session.is_charging(18.5));
        assert!(!session.is_charging(19.0));
    }
}
