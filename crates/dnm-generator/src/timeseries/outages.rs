//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Hourly Poisson outage process with weather inflation and topology scoping."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! For each feeder and weather hour an outage starts with probability
//! `1 - exp(-λ)`, `λ = daily_rate / 24 × inflation`. A weather cause is only
//! possible in flagged hours; those outages start exactly at the flagged
//! record so it lies inside `[start, end]`. The interrupting device is either
//! the transformer's lateral fuse or the nearest trunk device upstream of it.

use std::collections::HashMap;

use chrono::Duration;
use dnm_common::GeneratorConfig;
use dnm_logging::{dnm_debug, log_stage_event, LogContext, StageOutcome};
use petgraph::graph::NodeIndex;

use super::WeatherSeries;
use crate::graph::NetworkGraph;
use crate::model::{
    round_to, DeviceType, IdSequence, NodeType, OutageCause, OutageEvent, WeatherRecord,
};
use crate::rng::GeneratorRng;
use crate::table::NetworkTables;

const NON_WEATHER_CAUSES: [(OutageCause, f64); 4] = [
    (OutageCause::EquipmentFailure, 0.35),
    (OutageCause::Vegetation, 0.25),
    (OutageCause::AnimalContact, 0.25),
    (OutageCause::Overload, 0.15),
];
const LATERAL_SHARE: f64 = 0.7;
const MIN_DURATION_H: f64 = 5.0 / 60.0;
const MAX_DURATION_H: f64 = 48.0;

/// Median hours and log-space sigma of restoration time per cause.
fn duration_profile(cause: OutageCause) -> (f64, f64) {
    match cause {
        OutageCause::Weather => (3.0, 0.7),
        OutageCause::EquipmentFailure => (4.0, 0.9),
        OutageCause::AnimalContact => (1.5, 0.6),
        OutageCause::Overload => (1.0, 0.5),
        OutageCause::Vegetation => (2.5, 0.8),
    }
}

/// Outage-rate multiplier for the hour; storms dominate heat.
pub fn inflation(config: &GeneratorConfig, record: &WeatherRecord) -> f64 {
    let outages = &config.outages;
    let mut factor = 1.0_f64;
    if record.is_storm {
        factor = factor.max(outages.storm_inflation);
    }
    if record.is_heatwave {
        factor = factor.max(outages.heatwave_inflation);
    }
    factor
}

/// Devices and customer counts resolved from the graph.
struct Protection<'a> {
    network: &'a NetworkTables,
    graph: NetworkGraph,
    node_by_entity: HashMap<&'a str, NodeIndex>,
    device_by_id: HashMap<&'a str, usize>,
    customers_by_transformer: HashMap<&'a str, u32>,
    downstream_cache: HashMap<usize, u32>,
}

impl<'a> Protection<'a> {
    fn new(network: &'a NetworkTables) -> Self {
        let graph = NetworkGraph::new(&network.nodes, &network.edges);
        let node_by_entity = network
            .nodes
            .iter()
            .filter(|node| {
                matches!(
                    node.node_type,
                    NodeType::ProtectiveDevice | NodeType::Transformer
                )
            })
            .filter_map(|node| {
                let entity = node.entity_id.as_deref()?;
                Some((entity, graph.index(&node.node_id)?))
            })
            .collect();
        let device_by_id = network
            .switching_devices
            .iter()
            .enumerate()
            .map(|(index, device)| (device.device_id.as_str(), index))
            .collect();
        let customers_by_transformer = network
            .transformers
            .iter()
            .map(|t| (t.transformer_id.as_str(), t.customer_count))
            .collect();
        Self {
            network,
            graph,
            node_by_entity,
            device_by_id,
            customers_by_transformer,
            downstream_cache: HashMap::new(),
        }
    }

    /// Nearest recloser or sectionalizer above `fuse_id`, if any.
    fn upstream_trunk_device(&self, fuse_id: &str) -> Option<usize> {
        let start = *self.node_by_entity.get(fuse_id)?;
        self.graph.ancestors(start).find_map(|ancestor| {
            let node = &self.network.nodes[self.graph.row(ancestor)];
            if node.node_type != NodeType::ProtectiveDevice {
                return None;
            }
            let device = *self.device_by_id.get(node.entity_id.as_deref()?)?;
            (self.network.switching_devices[device].device_type != DeviceType::Fuse)
                .then_some(device)
        })
    }

    /// Customers served through `device`.
    fn customers_below(&mut self, device: usize) -> u32 {
        if let Some(count) = self.downstream_cache.get(&device) {
            return *count;
        }
        let device_id = self.network.switching_devices[device].device_id.as_str();
        let count = self
            .node_by_entity
            .get(device_id)
            .map(|start| {
                self.graph
                    .downstream(*start)
                    .into_iter()
                    .map(|row| &self.network.nodes[row])
                    .filter(|node| node.node_type == NodeType::Transformer)
                    .filter_map(|node| node.entity_id.as_deref())
                    .filter_map(|id| self.customers_by_transformer.get(id))
                    .sum()
            })
            .unwrap_or(0);
        self.downstream_cache.insert(device, count);
        count
    }
}

/// Outage events for every feeder over the weather horizon.
pub fn synthesize_outages(
    config: &GeneratorConfig,
    network: &NetworkTables,
    weather: WeatherSeries<'_>,
    rng: &mut GeneratorRng,
) -> Vec<OutageEvent> {
    let mut protection = Protection::new(network);
    let mut fuses_by_feeder: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, device) in network.switching_devices.iter().enumerate() {
        if device.device_type == DeviceType::Fuse && device.transformer_id.is_some() {
            fuses_by_feeder
                .entry(device.feeder_id.as_str())
                .or_default()
                .push(index);
        }
    }

    let hourly_rate = config.outages.daily_rate / 24.0;
    let mut ids = IdSequence::new("OUT", 5);
    let mut events = Vec::new();
    for feeder in &network.feeders {
        let Some(fuses) = fuses_by_feeder.get(feeder.feeder_id.as_str()) else {
            continue;
        };
        let before = events.len();
        for record in weather.records() {
            let probability = 1.0 - (-hourly_rate * inflation(config, record)).exp();
            if !rng.chance(probability) {
                continue;
            }
            let cause = if record.is_severe() && rng.chance(config.outages.weather_cause_bias) {
                OutageCause::Weather
            } else {
                *rng.weighted(&NON_WEATHER_CAUSES)
            };
            let start_time = if cause == OutageCause::Weather {
                record.timestamp
            } else {
                record.timestamp + Duration::minutes(i64::from(rng.between(0, 59)))
            };
            let (median, sigma) = duration_profile(cause);
            let hours = rng
                .log_normal(median, sigma)
                .clamp(MIN_DURATION_H, MAX_DURATION_H);
            let seconds = (hours * 3_600.0).round() as i64;

            let Some(&fuse) = rng.choose(fuses) else {
                continue;
            };
            let lateral = rng.chance(LATERAL_SHARE);
            let trunk = if lateral {
                None
            } else {
                protection.upstream_trunk_device(&network.switching_devices[fuse].device_id)
            };
            let (device, customers_affected) = match trunk {
                Some(device) => (device, protection.customers_below(device)),
                None => (fuse, protection.customers_below(fuse)),
            };

            events.push(OutageEvent {
                outage_id: ids.next_id(),
                feeder_id: feeder.feeder_id.clone(),
                substation_id: feeder.substation_id.clone(),
                device_id: network.switching_devices[device].device_id.clone(),
                start_time,
                end_time: start_time + Duration::seconds(seconds),
                duration_hours: round_to(seconds as f64 / 3_600.0, 4),
                cause,
                customers_affected,
                weather_related: cause == OutageCause::Weather,
            });
        }
        dnm_debug!(
            context = LogContext::new()
                .with_stage("outages")
                .with_feeder(&feeder.feeder_id),
            "{} outages",
            events.len() - before
        );
    }

    let weather_related = events.iter().filter(|e| e.weather_related).count();
    log_stage_event(
        Some(&LogContext::new().with_stage("outages").with_seed(rng.seed())),
        "stage.complete",
        &format!("{} outages, {weather_related} weather related", events.len()),
        StageOutcome::Success,
    );
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(is_storm: bool, is_heatwave: bool) -> WeatherRecord {
        WeatherRecord {
            timestamp: Utc.with_ymd_and_hms(2023, 8, 1, 20, 0, 0).unwrap(),
            temperature_f: 110.0,
            humidity_pct: 30.0,
            wind_speed_mph: if is_storm { 45.0 } else { 6.0 },
            precipitation_in: 0.0,
            cloud_cover_pct: 20.0,
            ghi_w_per_m2: 0.0,
            is_storm,
            is_heatwave,
        }
    }

    #[test]
    fn inflation_follows_the_worst_flag() {
        let config = GeneratorConfig::default();
        assert_eq!(inflation(&config, &record(false, false)), 1.0);
        assert_eq!(inflation(&config, &record(false, true)), 2.5);
        assert_eq!(inflation(&config, &record(true, true)), 6.0);
    }

    #[test]
    fn every_cause_has_a_positive_median() {
        for (cause, _) in NON_WEATHER_CAUSES {
            let (median, sigma) = duration_profile(cause);
            assert!(median > MIN_DURATION_H && sigma > 0.0);
        }
        let weights: f64 = NON_WEATHER_CAUSES.iter().map(|(_, w)| w).sum();
        assert!((weights - 1.0).abs() < 1e-12);
    }
}
