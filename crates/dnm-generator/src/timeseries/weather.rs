//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Hourly weather with hot spells, monsoon storm cells and irradiance."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Per hour: temperature is an annual cosine plus a diurnal sine plus the
//! active hot-spell uplift plus bounded noise. Hot spells are a daily
//! Markov chain inside the heat season; storm cells are an hourly Markov
//! chain whose onset probability rises in the monsoon window. Flags are
//! derived from the rounded values that end up in the table.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use dnm_common::GeneratorConfig;
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use super::{annual_cycle, local_hour, local_time, steps, CLEAR_SKY_GHI};
use crate::model::{round_to, WeatherRecord};
use crate::rng::GeneratorRng;

const DIURNAL_PEAK_HOUR: f64 = 15.0;
const SOLSTICE_DAY: u32 = 172;
const HOT_SPELL_DAYS: (u32, u32) = (3, 6);

#[derive(Debug, Default)]
struct HotSpell {
    days_left: u32,
    uplift_f: f64,
    day: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct StormCell {
    hours_left: u32,
}

/// Generate one record per hour of `[horizon.start, horizon.end)`.
pub fn synthesize_weather(config: &GeneratorConfig, rng: &mut GeneratorRng) -> Vec<WeatherRecord> {
    let weather = &config.weather;
    let horizon = &config.horizon;
    let mut spell = HotSpell::default();
    let mut storm = StormCell::default();
    let mut records = Vec::with_capacity(horizon.hours());

    for timestamp in steps(horizon.start, horizon.end, 60) {
        let local = local_time(timestamp, horizon.utc_offset_hours);
        let date = local.date();
        let hour = local_hour(local);
        let day_of_year = local.ordinal();
        let monsoon = weather.monsoon.contains(date);

        if spell.day != Some(date) {
            spell.day = Some(date);
            spell.days_left = spell.days_left.saturating_sub(1);
            if !weather.heat_season.contains(date) {
                spell.days_left = 0;
            } else if spell.days_left == 0 && rng.chance(weather.hot_spell_probability) {
                spell.days_left = rng.between(HOT_SPELL_DAYS.0, HOT_SPELL_DAYS.1);
                spell.uplift_f =
                    rng.uniform(weather.hot_spell_uplift_f.min, weather.hot_spell_uplift_f.max);
            }
        }
        let uplift = if spell.days_left > 0 { spell.uplift_f } else { 0.0 };

        let mut temperature = weather.annual_mean_f
            + weather.annual_amplitude_f * annual_cycle(day_of_year, weather.peak_day_of_year)
            + weather.diurnal_amplitude_f * (2.0 * PI * (hour - DIURNAL_PEAK_HOUR + 6.0) / 24.0).sin()
            + uplift
            + rng.jitter(weather.noise_f);

        if storm.hours_left == 0 {
            let onset = if monsoon {
                weather.monsoon_storm_onset_probability
            } else {
                weather.storm_onset_probability
            };
            if rng.chance(onset) {
                storm.hours_left =
                    rng.between(weather.storm_duration_hours.min, weather.storm_duration_hours.max);
            }
        }

        let (wind, precipitation, cloud, humidity) = if storm.hours_left > 0 {
            storm.hours_left -= 1;
            temperature -= rng.uniform(4.0, 12.0);
            (
                weather.storm_wind_threshold_mph + rng.uniform(0.0, 25.0),
                weather.storm_precip_threshold_in * rng.uniform(0.3, 3.0),
                rng.uniform(85.0, 100.0),
                rng.uniform(55.0, 90.0),
            )
        } else {
            let drizzle = if monsoon { 0.04 } else { 0.01 };
            let raining = rng.chance(drizzle);
            let precipitation = if raining {
                rng.uniform(0.01, weather.storm_precip_threshold_in * 0.9)
            } else {
                0.0
            };
            let cloud = if raining {
                rng.uniform(60.0, 90.0)
            } else if monsoon {
                rng.uniform(10.0, 60.0)
            } else {
                rng.uniform(0.0, 30.0)
            };
            let base_humidity = 40.0 - 0.5 * (temperature - weather.annual_mean_f)
                + if monsoon { 15.0 } else { 0.0 }
                + if raining { 20.0 } else { 0.0 };
            (
                3.0 + rng.uniform(0.0, 8.0),
                precipitation,
                cloud,
                base_humidity + rng.jitter(8.0),
            )
        };

        let ghi = clear_sky_ghi(day_of_year, hour) * cloud_attenuation(cloud);

        let wind_speed_mph = round_to(wind, 1);
        let precipitation_in = round_to(precipitation, 2);
        let is_storm = precipitation_in >= weather.storm_precip_threshold_in
            || wind_speed_mph >= weather.storm_wind_threshold_mph;
        records.push(WeatherRecord {
            timestamp,
            temperature_f: round_to(temperature, 1),
            humidity_pct: round_to(humidity.clamp(5.0, 100.0), 1),
            wind_speed_mph,
            precipitation_in,
            cloud_cover_pct: round_to(cloud, 1),
            ghi_w_per_m2: round_to(ghi.max(0.0), 1),
            is_storm,
            is_heatwave: false,
        });
    }

    mark_heatwaves(
        &mut records,
        weather.heatwave_threshold_f,
        weather.heatwave_window_hours as usize,
    );

    let storms = records.iter().filter(|r| r.is_storm).count();
    let heatwave = records.iter().filter(|r| r.is_heatwave).count();
    log_stage_event(
        Some(&LogContext::new().with_stage("weather").with_seed(rng.seed())),
        "stage.complete",
        &format!(
            "{} hourly records, {storms} storm hours, {heatwave} heatwave hours",
            records.len()
        ),
        StageOutcome::Success,
    );
    records
}

/// Cloudless irradiance for a local day of year and fractional hour.
pub(crate) fn clear_sky_ghi(day_of_year: u32, hour: f64) -> f64 {
    let sun = if (6.0..18.0).contains(&hour) {
        (PI * (hour - 6.0) / 12.0).sin()
    } else {
        0.0
    };
    let season = 0.75 + 0.25 * annual_cycle(day_of_year, SOLSTICE_DAY);
    CLEAR_SKY_GHI * sun * season
}

/// Share of clear-sky irradiance reaching the ground under `cloud_pct` cover.
pub(crate) fn cloud_attenuation(cloud_pct: f64) -> f64 {
    1.0 - 0.75 * (cloud_pct / 100.0).powf(3.4)
}

/// Flag every hour inside a run of at least `window` consecutive hours
/// strictly above `threshold_f`.
pub fn mark_heatwaves(records: &mut [WeatherRecord], threshold_f: f64, window: usize) {
    let mut run_start = 0;
    for index in 0..=records.len() {
        let hot = records
            .get(index)
            .is_some_and(|record| record.temperature_f > threshold_f);
        if hot {
            continue;
        }
        if index - run_start >= window.max(1) {
            for record in &mut records[run_start..index] {
                record.is_heatwave = true;
            }
        }
        run_start = index + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn record(hour: i64, temperature_f: f64) -> WeatherRecord {
        WeatherRecord {
            timestamp: Utc.with_ymd_and_hms(2023, 7, 1, 0, 0, 0).unwrap() + Duration::hours(hour),
            temperature_f,
            humidity_pct: 10.0,
            wind_speed_mph: 5.0,
            precipitation_in: 0.0,
            cloud_cover_pct: 0.0,
            ghi_w_per_m2: 0.0,
            is_storm: false,
            is_heatwave: false,
        }
    }

    #[test]
    fn heatwave_requires_a_full_window() {
        let temps = [113.0, 114.0, 100.0, 113.0, 115.0, 116.0, 112.0, 113.0];
        let mut records: Vec<_> = temps
            .iter()
            .enumerate()
            .map(|(h, t)| record(h as i64, *t))
            .collect();
        mark_heatwaves(&mut records, 112.0, 3);
        let flags: Vec<bool> = records.iter().map(|r| r.is_heatwave).collect();
        assert_eq!(
            flags,
            vec![false, false, false, true, true, true, false, false]
        );
    }

    #[test]
    fn trailing_run_is_flagged() {
        let mut records: Vec<_> = (0..4).map(|h| record(h, 120.0)).collect();
        mark_heatwaves(&mut records, 112.0, 3);
        assert!(records.iter().all(|r| r.is_heatwave));
    }

    #[test]
    fn full_year_is_contiguous_and_flags_are_consistent() {
        let config = GeneratorConfig::default();
        let records = synthesize_weather(&config, &mut GeneratorRng::new(42));
        assert_eq!(records.len(), 8_760);
        for pair in records.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, Duration::hours(1));
        }
        for record in &records {
            let storm = record.wind_speed_mph >= config.weather.storm_wind_threshold_mph
                || record.precipitation_in >= config.weather.storm_precip_threshold_in;
            assert_eq!(storm, record.is_storm);
            if record.is_heatwave {
                assert!(record.temperature_f > config.weather.heatwave_threshold_f);
            }
            assert!(record.ghi_w_per_m2 >= 0.0);
        }
        assert!(records.iter().any(|r| r.is_storm));
    }

    #[test]
    fn same_seed_same_series() {
        let config = GeneratorConfig::default();
        let a = synthesize_weather(&config, &mut GeneratorRng::new(8));
        let b = synthesize_weather(&config, &mut GeneratorRng::new(8));
        assert_eq!(a, b);
    }
}
