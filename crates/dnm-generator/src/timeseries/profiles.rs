//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Representative-day solar and EV charging profiles."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Solar profiles are reduced from the weather series and draw nothing.
//! Charging profiles use their own sub-stream so the other series do not
//! shift when the profile shapes change.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, Timelike};
use dnm_common::GeneratorConfig;
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use super::weather::{clear_sky_ghi, cloud_attenuation};
use super::{local_time, CLEAR_SKY_GHI, INVERTER_DERATE};
use crate::catalog::{charger_options, ChargerSpec, CHARGERS};
use crate::model::{
    round_to, ChargerLevel, ChargingSegment, CustomerType, DayType, EvChargingProfile,
    SolarProfile, WeatherRecord,
};
use crate::rng::GeneratorRng;

const EV_PROFILE_STREAM: u64 = 1 << 33;

#[derive(Debug, Default)]
struct HourStats {
    samples: u32,
    clear_sky: f64,
    cloud: f64,
    ghi: f64,
    temperature: f64,
}

/// One row per local (month, hour) present in the weather series, ordered by
/// month then hour.
pub fn solar_profiles(config: &GeneratorConfig, weather: &[WeatherRecord]) -> Vec<SolarProfile> {
    let mut stats: BTreeMap<(u32, u32), HourStats> = BTreeMap::new();
    for record in weather {
        let local = local_time(record.timestamp, config.horizon.utc_offset_hours);
        let hour = local.hour();
        let entry = stats.entry((local.month(), hour)).or_default();
        entry.samples += 1;
        entry.clear_sky += clear_sky_ghi(local.ordinal(), f64::from(hour)) / CLEAR_SKY_GHI;
        entry.cloud += cloud_attenuation(record.cloud_cover_pct);
        entry.ghi += record.ghi_w_per_m2;
        entry.temperature += record.temperature_f;
    }

    stats
        .into_iter()
        .map(|((month, hour_of_day), s)| {
            let n = f64::from(s.samples);
            let ghi = s.ghi / n;
            SolarProfile {
                month,
                hour_of_day,
                sample_days: s.samples,
                clear_sky_factor: round_to(s.clear_sky / n, 3),
                cloud_factor: round_to(s.cloud / n, 3),
                ghi_w_per_m2: round_to(ghi, 1),
                temperature_f: round_to(s.temperature / n, 1),
                generation_pct_of_capacity: round_to(
                    100.0 * INVERTER_DERATE * ghi / CLEAR_SKY_GHI,
                    1,
                ),
            }
        })
        .collect()
}

/// Charger hardware a segment installs.
pub fn segment_chargers(segment: ChargingSegment) -> impl Iterator<Item = &'static ChargerSpec> {
    let options: &'static [ChargerSpec] = match segment {
        ChargingSegment::Residential => charger_options(CustomerType::Residential),
        ChargingSegment::Commercial => charger_options(CustomerType::Commercial),
        ChargingSegment::Dcfc => &CHARGERS,
    };
    options.iter().filter(move |spec| {
        (segment == ChargingSegment::Dcfc) == (spec.level == ChargerLevel::Dcfc)
    })
}

fn mean_nameplate_kw(segment: ChargingSegment) -> f64 {
    let (total, count) =
        segment_chargers(segment).fold((0.0, 0u32), |(sum, n), spec| (sum + spec.power_kw, n + 1));
    if count == 0 {
        0.0
    } else {
        total / f64::from(count)
    }
}

/// Noise-free utilisation in percent and the noise half-width for it.
fn base_utilisation(segment: ChargingSegment, day: DayType, hour: u32) -> (f64, f64) {
    let h = f64::from(hour);
    match (segment, day) {
        (ChargingSegment::Residential, DayType::Weekday) => match hour {
            17..=22 => (60.0 + 30.0 * (PI * (h - 17.0) / 5.0).sin(), 5.0),
            0..=5 => (15.0, 3.0),
            _ => (10.0, 3.0),
        },
        (ChargingSegment::Residential, DayType::Weekend) => match hour {
            10..=20 => (30.0 + 20.0 * (PI * (h - 10.0) / 10.0).sin(), 5.0),
            _ => (12.0, 3.0),
        },
        (ChargingSegment::Commercial, _) => match hour {
            8..=17 => (40.0 + 30.0 * (PI * (h - 8.0) / 9.0).sin(), 5.0),
            _ => (10.0, 3.0),
        },
        (ChargingSegment::Dcfc, _) => match hour {
            7..=10 => (30.0 + 20.0 * (PI * (h - 7.0) / 3.0).sin(), 5.0),
            15..=19 => (40.0 + 30.0 * (PI * (h - 15.0) / 4.0).sin(), 5.0),
            _ => (8.0, 3.0),
        },
    }
}

/// Hourly utilisation for every (day type, hour, segment), in that order.
pub fn ev_charging_profiles(rng: &GeneratorRng) -> Vec<EvChargingProfile> {
    let mut stream = rng.substream(EV_PROFILE_STREAM);
    let mut rows = Vec::with_capacity(2 * 24 * ChargingSegment::ALL.len());
    for day_type in [DayType::Weekday, DayType::Weekend] {
        for hour_of_day in 0..24 {
            for segment in ChargingSegment::ALL {
                let (base, noise) = base_utilisation(segment, day_type, hour_of_day);
                let load_pct = round_to((base + stream.jitter(noise)).clamp(0.0, 100.0), 1);
                rows.push(EvChargingProfile {
                    day_type,
                    hour_of_day,
                    segment,
                    load_pct,
                    mean_power_kw: round_to(mean_nameplate_kw(segment) * load_pct / 100.0, 2),
                });
            }
        }
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("profiles").with_seed(rng.seed())),
        "stage.complete",
        &format!("{} charging profile rows", rows.len()),
        StageOutcome::Success,
    );
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::synthesize_weather;

    #[test]
    fn full_year_yields_twelve_representative_days() {
        let config = GeneratorConfig::default();
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(42));
        let rows = solar_profiles(&config, &weather);
        assert_eq!(rows.len(), 12 * 24);
        assert_eq!(
            rows.iter().map(|r| r.sample_days).sum::<u32>() as usize,
            weather.len()
        );
        for row in &rows {
            assert!((0.0..=1.0).contains(&row.clear_sky_factor));
            assert!((0.0..=1.0).contains(&row.cloud_factor));
            assert!((0.0..=100.0).contains(&row.generation_pct_of_capacity));
            if !(6..18).contains(&row.hour_of_day) {
                assert_eq!(row.ghi_w_per_m2, 0.0);
            }
        }
        let noon_june = rows.iter().find(|r| r.month == 6 && r.hour_of_day == 12).unwrap();
        let noon_dec = rows.iter().find(|r| r.month == 12 && r.hour_of_day == 12).unwrap();
        assert!(noon_june.clear_sky_factor > noon_dec.clear_sky_factor);
    }

    #[test]
    fn one_week_yields_only_its_month() {
        let mut config = GeneratorConfig::default();
        config.horizon.end = config.horizon.start + chrono::Duration::days(7);
        let weather = synthesize_weather(&config, &mut GeneratorRng::new(1));
        let rows = solar_profiles(&config, &weather);
        assert_eq!(rows.len(), 24 + 7);
        assert!(rows.iter().all(|r| r.month == 12 || r.month == 1));
    }

    #[test]
    fn charging_profiles_cover_every_segment_hour() {
        let rows = ev_charging_profiles(&GeneratorRng::new(5));
        assert_eq!(rows.len(), 2 * 24 * 3);
        for row in &rows {
            assert!(row.hour_of_day < 24);
            assert!((0.0..=100.0).contains(&row.load_pct));
            assert!(row.mean_power_kw >= 0.0);
        }
        let at = |day, hour, segment| {
            rows.iter()
                .find(|r| r.day_type == day && r.hour_of_day == hour && r.segment == segment)
                .map(|r| r.load_pct)
                .unwrap()
        };
        use ChargingSegment as S;
        assert!(at(DayType::Weekday, 19, S::Residential) > at(DayType::Weekday, 3, S::Residential));
        assert!(at(DayType::Weekday, 12, S::Commercial) > at(DayType::Weekday, 22, S::Commercial));
        assert!(at(DayType::Weekend, 17, S::Dcfc) > at(DayType::Weekend, 2, S::Dcfc));
        assert_eq!(rows, ev_charging_profiles(&GeneratorRng::new(5)));
    }

    #[test]
    fn segments_map_onto_catalog_levels() {
        assert!(segment_chargers(ChargingSegment::Dcfc).all(|s| s.level == ChargerLevel::Dcfc));
        assert!(segment_chargers(ChargingSegment::Commercial).all(|s| s.level == ChargerLevel::Level2));
        assert_eq!(segment_chargers(ChargingSegment::Residential).count(), 4);
        assert!(mean_nameplate_kw(ChargingSegment::Dcfc) > mean_nameplate_kw(ChargingSegment::Residential));
    }
}
