//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Shared calendar helpers and diurnal shapes for the time-series synthesizers."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Weather is produced first and is the only cross-series dependency: load,
//! outages and AMI read temperatures, flags and irradiance from it.

pub mod ami;
pub mod load;
pub mod outages;
pub mod profiles;
pub mod weather;

use std::f64::consts::PI;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc, Weekday};
use dnm_common::{HorizonConfig, LoadConfig};

use crate::model::{CustomerType, WeatherRecord};

pub use ami::synthesize_ami;
pub use load::synthesize_load;
pub use outages::synthesize_outages;
pub use profiles::{ev_charging_profiles, solar_profiles};
pub use weather::synthesize_weather;

/// Irradiance at which panel output equals nameplate, W/m².
pub(crate) const CLEAR_SKY_GHI: f64 = 1_000.0;
/// AC output share of DC nameplate.
pub(crate) const INVERTER_DERATE: f64 = 0.8;

/// Wall-clock time in the territory's fixed offset.
pub(crate) fn local_time(timestamp: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDateTime {
    (timestamp + Duration::hours(i64::from(utc_offset_hours))).naive_utc()
}

/// Fractional local hour of day in `[0, 24)`.
pub(crate) fn local_hour(local: NaiveDateTime) -> f64 {
    f64::from(local.hour()) + f64::from(local.minute()) / 60.0
}

pub(crate) fn is_weekend(local: NaiveDateTime) -> bool {
    matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Evenly spaced instants in `[start, end)`.
pub(crate) fn steps(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    minutes: u32,
) -> impl Iterator<Item = DateTime<Utc>> {
    let step = Duration::minutes(i64::from(minutes.max(1)));
    std::iter::successors(Some(start), move |t| Some(*t + step)).take_while(move |t| *t < end)
}

/// Relative demand by customer class and local hour, peaking near 1.0.
pub(crate) fn diurnal_shape(kind: CustomerType, hour: f64, weekend: bool) -> f64 {
    match kind {
        CustomerType::Residential => {
            0.45 + 0.25 * (-((hour - 7.5) / 1.5).powi(2)).exp()
                + 0.55 * (-((hour - 19.0) / 2.5).powi(2)).exp()
        }
        CustomerType::Commercial | CustomerType::Municipal => {
            let shape = 0.4 + 0.6 * (-((hour - 14.0) / 4.0).powi(2)).exp();
            if weekend {
                shape * 0.7
            } else {
                shape
            }
        }
        CustomerType::Industrial => {
            if (6.0..22.0).contains(&hour) {
                0.95
            } else {
                0.75
            }
        }
    }
}

/// Multiplicative demand response to cooling and heating degrees.
pub(crate) fn weather_multiplier(load: &LoadConfig, temperature_f: f64) -> f64 {
    let cooling = (temperature_f - load.cooling_base_f).max(0.0) / 20.0;
    let heating = (load.heating_base_f - temperature_f).max(0.0) / 20.0;
    1.0 + load.cooling_sensitivity * cooling + load.heating_sensitivity * heating
}

/// Annual cosine with its maximum on `peak_day`.
pub(crate) fn annual_cycle(day_of_year: u32, peak_day: u32) -> f64 {
    (2.0 * PI * (f64::from(day_of_year) - f64::from(peak_day)) / 365.25).cos()
}

/// Hour-indexed read access to the weather series.
#[derive(Debug, Clone, Copy)]
pub struct WeatherSeries<'a> {
    start: DateTime<Utc>,
    records: &'a [WeatherRecord],
}

impl<'a> WeatherSeries<'a> {
    pub fn new(horizon: &HorizonConfig, records: &'a [WeatherRecord]) -> Self {
        Self {
            start: horizon.start,
            records,
        }
    }

    /// Record covering the hour that contains `timestamp`.
    pub fn at(&self, timestamp: DateTime<Utc>) -> Option<&'a WeatherRecord> {
        let offset = (timestamp - self.start).num_hours();
        if timestamp < self.start {
            return None;
        }
        usize::try_from(offset)
            .ok()
            .and_then(|index| self.records.get(index))
    }

    pub fn records(&self) -> &'a [WeatherRecord] {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn steps_are_half_open() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::hours(2);
        let stamps: Vec<_> = steps(start, end, 15).collect();
        assert_eq!(stamps.len(), 8);
        assert_eq!(*stamps.last().unwrap(), end - Duration::minutes(15));
    }

    #[test]
    fn local_time_applies_offset() {
        let utc = Utc.with_ymd_and_hms(2023, 7, 1, 3, 30, 0).unwrap();
        let local = local_time(utc, -7);
        assert_eq!(local.hour(), 20);
        assert_eq!(local.day(), 30);
        assert!((local_hour(local) - 20.5).abs() < 1e-9);
    }

    #[test]
    fn residential_shape_peaks_in_the_evening() {
        let evening = diurnal_shape(CustomerType::Residential, 19.0, false);
        let night = diurnal_shape(CustomerType::Residential, 3.0, false);
        assert!(evening > 0.95 && evening > night);
        let weekday = diurnal_shape(CustomerType::Commercial, 14.0, false);
        let weekend = diurnal_shape(CustomerType::Commercial, 14.0, true);
        assert!((weekend - weekday * 0.7).abs() < 1e-12);
    }

    #[test]
    fn weather_multiplier_is_neutral_between_bases() {
        let load = LoadConfig::default();
        assert_eq!(weather_multiplier(&load, 65.0), 1.0);
        assert!(weather_multiplier(&load, 115.0) > 1.5);
        assert!(weather_multiplier(&load, 35.0) > 1.0);
    }
}
