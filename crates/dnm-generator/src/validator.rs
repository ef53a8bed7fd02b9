//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Read-only integrity pass over a finished dataset."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Checks run in a fixed order: identifiers, references, topology, spatial
//! containment, capacity, DER consistency, outage causality, temporal
//! continuity, derived profiles. In fail-fast mode the first violation
//! aborts; otherwise every violation is collected into an [`IntegrityReport`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::Duration;
use dnm_common::ValidationMode;
use dnm_logging::{dnm_warn, log_stage_event, LogContext, StageOutcome};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::errors::{GeneratorError, Result};
use crate::geo::{distance_m, Territory, METERS_PER_MILE};
use crate::graph::NetworkGraph;
use crate::model::{
    ChargingSegment, EdgeKind, Keyed, Located, NodeType, OutageCause, SwitchState,
};
use crate::table::{Dataset, Table};
use crate::timeseries::ami::ami_window;
use crate::timeseries::profiles::solar_profiles;
use crate::timeseries::weather::mark_heatwaves;
use crate::timeseries::{steps, WeatherSeries};

/// Relative slack on cascading radii for floating-point drift.
const RADIUS_TOLERANCE: f64 = 1.01;
const RADIUS_SLACK_M: f64 = 1.0;
const CAPACITY_EPSILON: f64 = 1e-6;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckKind {
    UniqueId,
    ForeignKey,
    Topology,
    Spatial,
    Capacity,
    DerConsistency,
    OutageCausality,
    Temporal,
}

/// One broken invariant, located by table and row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub check: CheckKind,
    pub table: String,
    pub row_id: String,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{}: {}",
            self.check, self.table, self.row_id, self.detail
        )
    }
}

/// Every violation found by a collect-all pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    violations: Vec<Violation>,
}

impl IntegrityReport {
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, check: CheckKind) -> usize {
        self.violations.iter().filter(|v| v.check == check).count()
    }
}

struct Collector {
    mode: ValidationMode,
    violations: Vec<Violation>,
}

impl Collector {
    fn flag(
        &mut self,
        check: CheckKind,
        table: &str,
        row_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Result<()> {
        let violation = Violation {
            check,
            table: table.to_owned(),
            row_id: row_id.into(),
            detail: detail.into(),
        };
        match self.mode {
            ValidationMode::FailFast => Err(GeneratorError::Integrity(violation)),
            ValidationMode::CollectAll => {
                self.violations.push(violation);
                Ok(())
            }
        }
    }

    fn ensure(
        &mut self,
        condition: bool,
        check: CheckKind,
        table: &str,
        row_id: &str,
        detail: impl FnOnce() -> String,
    ) -> Result<()> {
        if condition {
            Ok(())
        } else {
            self.flag(check, table, row_id, detail())
        }
    }
}

/// Validate `dataset`; any violation is an error.
pub fn validate_dataset(dataset: &Dataset, mode: ValidationMode) -> Result<()> {
    let mut collector = Collector {
        mode,
        violations: Vec::new(),
    };
    let outcome = run_checks(dataset, &mut collector);
    let ctx = LogContext::new()
        .with_stage("validation")
        .with_seed(dataset.seed());
    match outcome {
        Err(err) => {
            log_stage_event(Some(&ctx), "stage.failed", &err.to_string(), StageOutcome::Fault);
            Err(err)
        }
        Ok(()) if collector.violations.is_empty() => {
            log_stage_event(
                Some(&ctx),
                "stage.complete",
                "no integrity violations",
                StageOutcome::Success,
            );
            Ok(())
        }
        Ok(()) => {
            for violation in collector.violations.iter().take(20) {
                dnm_warn!(context = ctx, "{violation}");
            }
            let report = IntegrityReport {
                violations: collector.violations,
            };
            log_stage_event(
                Some(&ctx),
                "stage.failed",
                &format!("{} integrity violations", report.len()),
                StageOutcome::Fault,
            );
            Err(GeneratorError::IntegrityReport(report))
        }
    }
}

/// Collect every violation without failing.
pub fn audit(dataset: &Dataset) -> IntegrityReport {
    match validate_dataset(dataset, ValidationMode::CollectAll) {
        Err(GeneratorError::IntegrityReport(report)) => report,
        _ => IntegrityReport::default(),
    }
}

fn run_checks(ds: &Dataset, c: &mut Collector) -> Result<()> {
    unique_ids(ds, c)?;
    foreign_keys(ds, c)?;
    topology(ds, c)?;
    spatial(ds, c)?;
    capacity(ds, c)?;
    der_consistency(ds, c)?;
    outage_causality(ds, c)?;
    temporal(ds, c)?;
    profiles(ds, c)
}

fn unique<T: Keyed>(table: &Table<T>, name: &str, c: &mut Collector) -> Result<()> {
    if !table.has_duplicate_ids() {
        return Ok(());
    }
    for (index, row) in table.iter().enumerate() {
        if table.position(row.id()) != Some(index) {
            c.flag(CheckKind::UniqueId, name, row.id(), "duplicate identifier")?;
        }
    }
    Ok(())
}

fn unique_ids(ds: &Dataset, c: &mut Collector) -> Result<()> {
    unique(ds.substations(), "substations", c)?;
    unique(ds.feeders(), "feeders", c)?;
    unique(ds.transformers(), "transformers", c)?;
    unique(ds.customers(), "customers", c)?;
    unique(ds.solar_installations(), "solar_installations", c)?;
    unique(ds.ev_chargers(), "ev_chargers", c)?;
    unique(ds.batteries(), "batteries", c)?;
    unique(ds.switching_devices(), "switching_devices", c)?;
    unique(ds.tie_switches(), "tie_switches", c)?;
    unique(ds.nodes(), "network_nodes", c)?;
    unique(ds.edges(), "network_edges", c)?;
    unique(ds.outages(), "outages", c)
}

fn foreign_keys(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::ForeignKey as FK;

    for feeder in ds.feeders() {
        c.ensure(
            ds.substations().contains(&feeder.substation_id),
            FK,
            "feeders",
            &feeder.feeder_id,
            || format!("unknown substation {}", feeder.substation_id),
        )?;
    }
    for transformer in ds.transformers() {
        let parent = ds.feeders().get(&transformer.feeder_id);
        c.ensure(
            parent.is_some_and(|f| f.substation_id == transformer.substation_id),
            FK,
            "transformers",
            &transformer.transformer_id,
            || format!("feeder {} missing or on another substation", transformer.feeder_id),
        )?;
    }
    for customer in ds.customers() {
        let parent = ds.transformers().get(&customer.transformer_id);
        c.ensure(
            parent.is_some_and(|t| {
                t.feeder_id == customer.feeder_id && t.substation_id == customer.substation_id
            }),
            FK,
            "customers",
            &customer.customer_id,
            || format!("transformer {} missing or inconsistent", customer.transformer_id),
        )?;
    }
    for device in ds.switching_devices() {
        let transformer_ok = device.transformer_id.as_deref().map_or(true, |id| {
            ds.transformers()
                .get(id)
                .is_some_and(|t| t.feeder_id == device.feeder_id)
        });
        c.ensure(
            ds.feeders().contains(&device.feeder_id) && transformer_ok,
            FK,
            "switching_devices",
            &device.device_id,
            || format!("feeder {} or protected transformer missing", device.feeder_id),
        )?;
    }
    for tie in ds.tie_switches() {
        c.ensure(
            ds.feeders().contains(&tie.feeder_a_id)
                && ds.feeders().contains(&tie.feeder_b_id)
                && tie.feeder_a_id != tie.feeder_b_id,
            FK,
            "tie_switches",
            &tie.tie_id,
            || format!("invalid feeder pair {} / {}", tie.feeder_a_id, tie.feeder_b_id),
        )?;
    }
    for node in ds.nodes() {
        let entity_ok = match (node.node_type, node.entity_id.as_deref()) {
            (NodeType::Junction, _) => true,
            (_, None) => false,
            (NodeType::SubstationBus, Some(id)) => ds.substations().contains(id),
            (NodeType::FeederBreaker | NodeType::FeederEndpoint, Some(id)) => {
                ds.feeders().contains(id)
            }
            (NodeType::Transformer, Some(id)) => ds.transformers().contains(id),
            (NodeType::ProtectiveDevice, Some(id)) => ds.switching_devices().contains(id),
            (NodeType::TieSwitch, Some(id)) => ds.tie_switches().contains(id),
        };
        let feeder_ok = node
            .feeder_id
            .as_deref()
            .map_or(true, |id| ds.feeders().contains(id));
        c.ensure(entity_ok && feeder_ok, FK, "network_nodes", &node.node_id, || {
            format!("{} references a missing entity", node.node_type)
        })?;
    }
    for edge in ds.edges() {
        c.ensure(
            edge.feeder_id
                .as_deref()
                .map_or(true, |id| ds.feeders().contains(id)),
            FK,
            "network_edges",
            &edge.edge_id,
            || "unknown feeder".to_owned(),
        )?;
    }
    let mut missing_load_feeders = HashSet::new();
    for row in ds.load() {
        if !ds.feeders().contains(&row.feeder_id) && missing_load_feeders.insert(&row.feeder_id) {
            c.flag(FK, "load", &row.feeder_id, "load series for unknown feeder")?;
        }
    }
    for outage in ds.outages() {
        let device = ds.switching_devices().get(&outage.device_id);
        c.ensure(
            ds.feeders().contains(&outage.feeder_id)
                && device.is_some_and(|d| d.feeder_id == outage.feeder_id),
            FK,
            "outages",
            &outage.outage_id,
            || format!("device {} is not on feeder {}", outage.device_id, outage.feeder_id),
        )?;
    }
    let mut missing_meters = HashSet::new();
    for row in ds.ami() {
        let ok = ds
            .customers()
            .get(&row.customer_id)
            .is_some_and(|cust| cust.transformer_id == row.transformer_id);
        if !ok && missing_meters.insert(&row.customer_id) {
            c.flag(FK, "ami", &row.customer_id, "meter reads for unknown customer")?;
        }
    }
    Ok(())
}

fn topology(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::Topology as T;

    let nodes = ds.nodes().rows();
    let edges = ds.edges().rows();
    let graph = NetworkGraph::new(nodes, edges);
    for &row in graph.dangling_edges() {
        c.flag(
            CheckKind::ForeignKey,
            "network_edges",
            &edges[row].edge_id,
            "endpoint node does not exist",
        )?;
    }
    for row in graph.loop_edges() {
        c.flag(T, "network_edges", &edges[row].edge_id, "closes a loop among closed edges")?;
    }
    for row in graph.multi_parent_nodes() {
        c.flag(T, "network_nodes", &nodes[row].node_id, "fed by more than one closed edge")?;
    }

    for edge in edges {
        let is_tie = edge.edge_kind == EdgeKind::Tie;
        c.ensure(
            is_tie == (edge.status == SwitchState::Open),
            T,
            "network_edges",
            &edge.edge_id,
            || format!("{} edge has status {}", edge.edge_kind, edge.status),
        )?;
        if is_tie {
            continue;
        }
        let feeder_of = |id: &str| ds.nodes().get(id).and_then(|n| n.feeder_id.as_deref());
        let crosses = [feeder_of(&edge.from_node_id), feeder_of(&edge.to_node_id)]
            .into_iter()
            .flatten()
            .any(|feeder| Some(feeder) != edge.feeder_id.as_deref());
        c.ensure(!crosses, T, "network_edges", &edge.edge_id, || {
            "closed edge joins different feeders".to_owned()
        })?;
        let Some(substation) = edge.substation_id.as_deref() else {
            continue;
        };
        for end in [&edge.from_node_id, &edge.to_node_id] {
            let Some(node) = ds.nodes().get(end) else {
                continue;
            };
            c.ensure(
                node.substation_id.as_deref() == Some(substation),
                T,
                "network_nodes",
                &node.node_id,
                || {
                    format!(
                        "substation {} disagrees with edge {} on {substation}",
                        node.substation_id.as_deref().unwrap_or("none"),
                        edge.edge_id
                    )
                },
            )?;
        }
    }

    let mut reached = vec![false; nodes.len()];
    for node in nodes {
        let Some(index) = graph.index(&node.node_id) else {
            continue;
        };
        match node.node_type {
            NodeType::SubstationBus => {
                for below in graph.downstream(index) {
                    reached[below] = true;
                }
            }
            NodeType::FeederBreaker => {
                let foreign = graph
                    .downstream(index)
                    .into_iter()
                    .find(|&below| nodes[below].feeder_id != node.feeder_id);
                if let Some(below) = foreign {
                    c.flag(
                        T,
                        "network_nodes",
                        &nodes[below].node_id,
                        format!("reachable from breaker {} of another feeder", node.node_id),
                    )?;
                }
            }
            _ => {}
        }
    }
    for (node, energised) in nodes.iter().zip(reached) {
        c.ensure(
            energised || node.node_type == NodeType::TieSwitch,
            T,
            "network_nodes",
            &node.node_id,
            || "not energised from any substation bus".to_owned(),
        )?;
    }

    let mut modelled: HashSet<&str> = HashSet::new();
    for node in nodes.iter().filter(|n| n.node_type == NodeType::Transformer) {
        if let Some(id) = node.entity_id.as_deref() {
            modelled.insert(id);
        }
    }
    for transformer in ds.transformers() {
        c.ensure(
            modelled.contains(transformer.transformer_id.as_str()),
            T,
            "transformers",
            &transformer.transformer_id,
            || "missing from the network model".to_owned(),
        )?;
    }
    Ok(())
}

fn inside<T: Keyed + Located>(
    rows: &Table<T>,
    name: &str,
    territory: &Territory,
    c: &mut Collector,
) -> Result<()> {
    for row in rows {
        let point = row.location();
        c.ensure(
            territory.contains(point),
            CheckKind::Spatial,
            name,
            row.id(),
            || format!("({:.6}, {:.6}) is outside the territory", point.latitude, point.longitude),
        )?;
    }
    Ok(())
}

fn spatial(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::Spatial as S;

    let config = ds.config();
    let territory = Territory::new(config.territory);
    let metric = config.placement.distance_metric;
    inside(ds.substations(), "substations", &territory, c)?;
    inside(ds.transformers(), "transformers", &territory, c)?;
    inside(ds.customers(), "customers", &territory, c)?;
    inside(ds.solar_installations(), "solar_installations", &territory, c)?;
    inside(ds.ev_chargers(), "ev_chargers", &territory, c)?;
    inside(ds.batteries(), "batteries", &territory, c)?;
    inside(ds.switching_devices(), "switching_devices", &territory, c)?;
    inside(ds.tie_switches(), "tie_switches", &territory, c)?;
    inside(ds.nodes(), "network_nodes", &territory, c)?;

    let max_feeder_m = config.placement.feeder_length_miles.max * METERS_PER_MILE;
    for feeder in ds.feeders() {
        let head_ok = ds
            .substations()
            .get(&feeder.substation_id)
            .map_or(true, |s| s.location() == feeder.head());
        c.ensure(
            head_ok && territory.contains(feeder.tail()),
            S,
            "feeders",
            &feeder.feeder_id,
            || "head is off its substation or tail is outside the territory".to_owned(),
        )?;
        let length = distance_m(metric, feeder.head(), feeder.tail());
        c.ensure(
            length <= max_feeder_m * RADIUS_TOLERANCE + RADIUS_SLACK_M,
            S,
            "feeders",
            &feeder.feeder_id,
            || format!("tail is {length:.0} m from the substation"),
        )?;
    }

    let lateral_m = config.placement.transformer_lateral_offset_m;
    for transformer in ds.transformers() {
        let Some(feeder) = ds.feeders().get(&transformer.feeder_id) else {
            continue;
        };
        let anchor = feeder.trunk_point(transformer.position_fraction);
        let offset = distance_m(metric, anchor, transformer.location());
        c.ensure(
            offset <= lateral_m * RADIUS_TOLERANCE + RADIUS_SLACK_M,
            S,
            "transformers",
            &transformer.transformer_id,
            || format!("{offset:.1} m off its feeder trunk"),
        )?;
    }

    let radius_m = config.placement.customer_radius_m;
    for customer in ds.customers() {
        let Some(transformer) = ds.transformers().get(&customer.transformer_id) else {
            continue;
        };
        let gap = distance_m(metric, transformer.location(), customer.location());
        c.ensure(
            gap <= radius_m * RADIUS_TOLERANCE + RADIUS_SLACK_M,
            S,
            "customers",
            &customer.customer_id,
            || format!("{gap:.1} m from its transformer"),
        )?;
    }
    Ok(())
}

fn capacity(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::Capacity as C;

    let mut customers_per_transformer: HashMap<&str, u32> = HashMap::new();
    let mut customers_per_feeder: HashMap<&str, u32> = HashMap::new();
    for customer in ds.customers() {
        *customers_per_transformer
            .entry(customer.transformer_id.as_str())
            .or_default() += 1;
        *customers_per_feeder
            .entry(customer.feeder_id.as_str())
            .or_default() += 1;
    }

    for substation in ds.substations() {
        c.ensure(
            substation.rated_capacity_mva > 0.0
                && substation.peak_load_mva <= substation.rated_capacity_mva + CAPACITY_EPSILON,
            C,
            "substations",
            &substation.substation_id,
            || {
                format!(
                    "peak {} MVA over rating {} MVA",
                    substation.peak_load_mva, substation.rated_capacity_mva
                )
            },
        )?;
    }
    for feeder in ds.feeders() {
        let actual = customers_per_feeder
            .get(feeder.feeder_id.as_str())
            .copied()
            .unwrap_or(0);
        c.ensure(
            feeder.peak_load_mw <= feeder.rated_capacity_mw + CAPACITY_EPSILON
                && feeder.customer_count == actual
                && actual <= feeder.design_customer_limit,
            C,
            "feeders",
            &feeder.feeder_id,
            || {
                format!(
                    "peak {} MW / rating {} MW, {actual} customers (recorded {}, limit {})",
                    feeder.peak_load_mw,
                    feeder.rated_capacity_mw,
                    feeder.customer_count,
                    feeder.design_customer_limit
                )
            },
        )?;
    }
    for transformer in ds.transformers() {
        let actual = customers_per_transformer
            .get(transformer.transformer_id.as_str())
            .copied()
            .unwrap_or(0);
        c.ensure(
            transformer.rated_kva > 0.0 && transformer.customer_count == actual,
            C,
            "transformers",
            &transformer.transformer_id,
            || {
                format!(
                    "{} kVA, {actual} customers (recorded {})",
                    transformer.rated_kva, transformer.customer_count
                )
            },
        )?;
    }
    for device in ds.switching_devices() {
        c.ensure(
            device.rated_amps > 0.0,
            C,
            "switching_devices",
            &device.device_id,
            || "non-positive rating".to_owned(),
        )?;
    }
    let mut overloaded = HashSet::new();
    for row in ds.load() {
        let Some(feeder) = ds.feeders().get(&row.feeder_id) else {
            continue;
        };
        let within = row.load_mw >= 0.0
            && row.load_mw <= feeder.rated_capacity_mw + CAPACITY_EPSILON
            && (0.0..=1.0).contains(&row.power_factor);
        if !within && overloaded.insert(&row.feeder_id) {
            c.flag(
                C,
                "load",
                &row.feeder_id,
                format!("{} MW at {} exceeds the feeder envelope", row.load_mw, row.timestamp),
            )?;
        }
    }
    Ok(())
}

fn der_consistency(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::DerConsistency as D;

    let mut solar: HashMap<&str, u32> = HashMap::new();
    let mut ev: HashMap<&str, u32> = HashMap::new();
    let mut battery: HashMap<&str, u32> = HashMap::new();

    macro_rules! assets {
        ($rows:expr, $name:literal, $counts:ident, $size:ident) => {
            for asset in $rows {
                *$counts.entry(asset.customer_id.as_str()).or_default() += 1;
                let owner = ds.customers().get(&asset.customer_id);
                let matches = owner.is_some_and(|cust| {
                    cust.location() == asset.location()
                        && cust.transformer_id == asset.transformer_id
                        && cust.feeder_id == asset.feeder_id
                        && cust.substation_id == asset.substation_id
                });
                c.ensure(matches && asset.$size > 0.0, D, $name, asset.id(), || {
                    format!("not co-located or inconsistent with {}", asset.customer_id)
                })?;
            }
        };
    }
    assets!(ds.solar_installations(), "solar_installations", solar, capacity_kw);
    assets!(ds.ev_chargers(), "ev_chargers", ev, power_kw);
    assets!(ds.batteries(), "batteries", battery, capacity_kwh);

    for customer in ds.customers() {
        let id = customer.customer_id.as_str();
        for (kind, flag, counts) in [
            ("solar", customer.has_solar, &solar),
            ("ev", customer.has_ev, &ev),
            ("battery", customer.has_battery, &battery),
        ] {
            let count = counts.get(id).copied().unwrap_or(0);
            c.ensure(count == u32::from(flag), D, "customers", id, || {
                format!("has_{kind} = {flag} but {count} asset(s) attached")
            })?;
        }
    }
    Ok(())
}

fn outage_causality(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::OutageCausality as O;

    let horizon = &ds.config().horizon;
    let weather = ds.weather();
    for outage in ds.outages() {
        let id = outage.outage_id.as_str();
        let duration = (outage.end_time - outage.start_time).num_seconds() as f64 / 3_600.0;
        c.ensure(
            outage.start_time <= outage.end_time
                && (duration - outage.duration_hours).abs() < 1e-3
                && outage.start_time >= horizon.start
                && outage.start_time < horizon.end,
            O,
            "outages",
            id,
            || format!("window {} .. {} is invalid", outage.start_time, outage.end_time),
        )?;
        let feeder_customers = ds
            .feeders()
            .get(&outage.feeder_id)
            .map_or(0, |f| f.customer_count);
        c.ensure(
            outage.customers_affected >= 1 && outage.customers_affected <= feeder_customers,
            O,
            "outages",
            id,
            || {
                format!(
                    "{} customers affected on a feeder of {feeder_customers}",
                    outage.customers_affected
                )
            },
        )?;
        c.ensure(
            outage.weather_related == (outage.cause == OutageCause::Weather),
            O,
            "outages",
            id,
            || format!("cause {} disagrees with weather_related", outage.cause),
        )?;
        if outage.weather_related {
            let from_start = (outage.start_time - horizon.start).num_seconds();
            let first = usize::try_from((from_start + 3_599).div_euclid(3_600)).unwrap_or(0);
            let caused = weather
                .iter()
                .skip(first)
                .take_while(|r| r.timestamp <= outage.end_time)
                .any(|r| r.is_severe());
            c.ensure(caused, O, "outages", id, || {
                "no storm or heatwave hour inside the outage window".to_owned()
            })?;
        }
    }
    Ok(())
}

fn temporal(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::Temporal as T;

    let config = ds.config();
    let horizon = &config.horizon;
    let weather = ds.weather();
    c.ensure(
        weather.len() == horizon.hours(),
        T,
        "weather",
        "*",
        || format!("{} records for {} horizon hours", weather.len(), horizon.hours()),
    )?;
    for (index, record) in weather.iter().enumerate() {
        let expected = horizon.start + Duration::hours(index as i64);
        if record.timestamp != expected {
            c.flag(
                T,
                "weather",
                record.timestamp.to_rfc3339(),
                format!("expected {expected}"),
            )?;
            break;
        }
    }
    let storm = &config.weather;
    let mut recomputed = weather.to_vec();
    for record in &mut recomputed {
        record.is_heatwave = false;
    }
    mark_heatwaves(
        &mut recomputed,
        storm.heatwave_threshold_f,
        storm.heatwave_window_hours as usize,
    );
    for (record, expected) in weather.iter().zip(&recomputed) {
        let is_storm = record.precipitation_in >= storm.storm_precip_threshold_in
            || record.wind_speed_mph >= storm.storm_wind_threshold_mph;
        c.ensure(
            record.is_heatwave == expected.is_heatwave && record.is_storm == is_storm,
            T,
            "weather",
            &record.timestamp.to_rfc3339(),
            || "severity flags disagree with the recorded values".to_owned(),
        )?;
    }

    let (start, end) = config.load.window(horizon);
    let expected: Vec<_> = steps(start, end, config.load.resolution_minutes).collect();
    contiguous(
        ds.load().iter().map(|r| (r.feeder_id.as_str(), r.timestamp)),
        &expected,
        "load",
        c,
    )?;
    let per_feeder: HashSet<&str> = ds.load().iter().map(|r| r.feeder_id.as_str()).collect();
    for feeder in ds.feeders() {
        c.ensure(
            per_feeder.contains(feeder.feeder_id.as_str()),
            T,
            "load",
            &feeder.feeder_id,
            || "feeder has no load series".to_owned(),
        )?;
    }

    let (start, end) = ami_window(config, WeatherSeries::new(horizon, weather));
    let expected: Vec<_> = steps(start, end, config.ami.interval_minutes).collect();
    contiguous(
        ds.ami().iter().map(|r| (r.customer_id.as_str(), r.timestamp)),
        &expected,
        "ami",
        c,
    )
}

fn profiles(ds: &Dataset, c: &mut Collector) -> Result<()> {
    use CheckKind::Temporal as T;

    let mut slots = HashSet::new();
    for row in ds.solar_profiles() {
        let key = format!("{:02}-{:02}", row.month, row.hour_of_day);
        let fresh = slots.insert((row.month, row.hour_of_day));
        c.ensure(
            fresh
                && (1..=12).contains(&row.month)
                && row.hour_of_day < 24
                && row.sample_days > 0
                && (0.0..=100.0).contains(&row.generation_pct_of_capacity),
            T,
            "solar_profiles",
            &key,
            || "duplicate or out-of-range representative hour".to_owned(),
        )?;
    }
    let expected = solar_profiles(ds.config(), ds.weather());
    c.ensure(
        ds.solar_profiles() == expected.as_slice(),
        T,
        "solar_profiles",
        "*",
        || "profiles disagree with the weather series".to_owned(),
    )?;

    let mut covered = HashSet::new();
    let mut slots = HashSet::new();
    for row in ds.ev_profiles() {
        covered.insert(row.segment);
        let key = format!("{}/{}/{}", row.day_type, row.hour_of_day, row.segment);
        let fresh = slots.insert((row.day_type, row.hour_of_day, row.segment));
        c.ensure(
            fresh && row.hour_of_day < 24 && (0.0..=100.0).contains(&row.load_pct),
            T,
            "ev_profiles",
            &key,
            || "duplicate or out-of-range charging hour".to_owned(),
        )?;
    }
    let full = 2 * 24 * ChargingSegment::ALL.len();
    c.ensure(slots.len() == full, T, "ev_profiles", "*", || {
        format!("{} of {full} (day type, hour, segment) slots present", slots.len())
    })?;
    for charger in ds.ev_chargers() {
        let Some(owner) = ds.customers().get(&charger.customer_id) else {
            continue;
        };
        let segment = ChargingSegment::of(owner.customer_type, charger.charger_level);
        c.ensure(
            covered.contains(&segment),
            CheckKind::ForeignKey,
            "ev_chargers",
            &charger.charger_id,
            || format!("no {segment} charging profile"),
        )?;
    }
    Ok(())
}

/// Rows grouped by key must each form one run equal to `expected`.
fn contiguous<'a>(
    rows: impl Iterator<Item = (&'a str, chrono::DateTime<chrono::Utc>)>,
    expected: &[chrono::DateTime<chrono::Utc>],
    table: &str,
    c: &mut Collector,
) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current: Option<(&str, usize, bool)> = None;
    let finish = |c: &mut Collector, run: Option<(&str, usize, bool)>| -> Result<()> {
        match run {
            Some((key, count, ok)) if !ok || count != expected.len() => c.flag(
                CheckKind::Temporal,
                table,
                key,
                format!("series has gaps or {count} of {} steps", expected.len()),
            ),
            _ => Ok(()),
        }
    };
    for (key, timestamp) in rows {
        if let Some((_, count, ok)) = current.as_mut().filter(|run| run.0 == key) {
            *ok &= expected.get(*count) == Some(&timestamp);
            *count += 1;
            continue;
        }
        finish(c, current.take())?;
        let fresh = seen.insert(key);
        current = Some((key, 1, fresh && expected.first() == Some(&timestamp)));
    }
    finish(c, current)
}
