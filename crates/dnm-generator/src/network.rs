//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "Normalised node/edge model derived from the placed hierarchy."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
//! Edges are emitted oriented away from the substation bus: bus → breaker
//! (`bus_tie`), consecutive trunk points (`primary`), junction → fuse →
//! transformer (`lateral`). Ties are modelled as tail → tie switch → tail,
//! both halves `open`.

use dnm_common::{DistanceMetric, GeneratorConfig};
use dnm_logging::{log_stage_event, LogContext, StageOutcome};

use crate::catalog::{self, ConductorSpec};
use crate::geo::{distance_miles, GeoPoint, FEET_PER_MILE};
use crate::model::{
    round_to, Construction, DeviceType, EdgeKind, IdSequence, Located, NetworkEdge, NetworkNode,
    NodeType, SwitchState,
};
use crate::rng::GeneratorRng;
use crate::ties::TiePlan;
use crate::topology::Hierarchy;

/// Output of the graph model builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphModel {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TrunkRank {
    Sectionalizer,
    Recloser,
    Junction,
    Endpoint,
}

struct TrunkPoint {
    fraction: f64,
    rank: TrunkRank,
    node: usize,
}

struct EdgeSpec<'a> {
    from: usize,
    to: usize,
    feeder_id: Option<&'a str>,
    substation_id: Option<&'a str>,
    kind: EdgeKind,
    phases: u8,
}

struct GraphBuilder<'a> {
    metric: DistanceMetric,
    underground_ratio: f64,
    variation: f64,
    node_ids: IdSequence,
    edge_ids: IdSequence,
    out: GraphModel,
    rng: &'a mut GeneratorRng,
}

impl GraphBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn node(
        &mut self,
        node_type: NodeType,
        entity_id: Option<&str>,
        feeder_id: Option<&str>,
        substation_id: Option<&str>,
        location: GeoPoint,
        voltage_kv: f64,
        rated_kva: Option<f64>,
        phases: u8,
    ) -> usize {
        self.out.nodes.push(NetworkNode {
            node_id: self.node_ids.next_id(),
            node_type,
            entity_id: entity_id.map(str::to_owned),
            feeder_id: feeder_id.map(str::to_owned),
            substation_id: substation_id.map(str::to_owned),
            latitude: location.latitude,
            longitude: location.longitude,
            voltage_kv,
            rated_kva,
            phases,
        });
        self.out.nodes.len() - 1
    }

    /// Draw construction then impedance variation, in that order.
    fn edge(&mut self, spec: EdgeSpec<'_>, overhead: &str, underground: &str) {
        let (construction, label) = if spec.kind == EdgeKind::Tie {
            (Construction::Overhead, overhead)
        } else if self.rng.chance(self.underground_ratio) {
            (Construction::Underground, underground)
        } else {
            (Construction::Overhead, overhead)
        };
        let factor = 1.0 + self.rng.jitter(self.variation);
        let conductor = catalog::conductor(label).copied().unwrap_or(ConductorSpec {
            label: "unknown",
            construction,
            r1: 0.0,
            x1: 0.0,
            r0: 0.0,
            x0: 0.0,
            ampacity: 0.0,
        });
        let from = &self.out.nodes[spec.from];
        let to = &self.out.nodes[spec.to];
        let miles = distance_miles(self.metric, from.location(), to.location());
        let status = if spec.kind == EdgeKind::Tie {
            SwitchState::Open
        } else {
            SwitchState::Closed
        };
        let edge = NetworkEdge {
            edge_id: self.edge_ids.next_id(),
            from_node_id: from.node_id.clone(),
            to_node_id: to.node_id.clone(),
            feeder_id: spec.feeder_id.map(str::to_owned),
            substation_id: spec.substation_id.map(str::to_owned),
            edge_kind: spec.kind,
            construction,
            conductor_type: label.to_owned(),
            length_miles: round_to(miles, 4),
            length_ft: round_to(miles * FEET_PER_MILE, 1),
            r1_ohm_per_mile: round_to(conductor.r1 * factor, 4),
            x1_ohm_per_mile: round_to(conductor.x1 * factor, 4),
            r0_ohm_per_mile: round_to(conductor.r0 * factor, 4),
            x0_ohm_per_mile: round_to(conductor.x0 * factor, 4),
            rated_amps: conductor.ampacity,
            phases: spec.phases,
            status,
        };
        self.out.edges.push(edge);
    }
}

/// Derive nodes and edges for the whole network.
pub fn build_graph(
    config: &GeneratorConfig,
    hierarchy: &Hierarchy,
    ties: &TiePlan,
    rng: &mut GeneratorRng,
) -> GraphModel {
    let seed = rng.seed();
    let mut builder = GraphBuilder {
        metric: config.placement.distance_metric,
        underground_ratio: config.network.underground_ratio,
        variation: config.network.impedance_variation,
        node_ids: IdSequence::new("NODE", 7),
        edge_ids: IdSequence::new("EDGE", 7),
        out: GraphModel::default(),
        rng,
    };
    let mut endpoints = vec![0usize; hierarchy.feeders.len()];

    for (substation_index, substation) in hierarchy.substations.iter().enumerate() {
        let sub_id = substation.substation_id.as_str();
        let bus = builder.node(
            NodeType::SubstationBus,
            Some(sub_id),
            None,
            Some(sub_id),
            substation.location(),
            substation.voltage_low_kv,
            Some(substation.rated_capacity_mva * 1_000.0),
            3,
        );
        for feeder_index in hierarchy.substation_feeders[substation_index].clone() {
            endpoints[feeder_index] = build_feeder(&mut builder, hierarchy, feeder_index, bus);
        }
    }

    for (tie, &(a, b)) in ties.switches.iter().zip(&ties.pairs) {
        let feeder_a = &hierarchy.feeders[a];
        let tie_node = builder.node(
            NodeType::TieSwitch,
            Some(&tie.tie_id),
            None,
            None,
            tie.location(),
            feeder_a.voltage_kv,
            None,
            3,
        );
        for (from, to) in [(endpoints[a], tie_node), (tie_node, endpoints[b])] {
            builder.edge(
                EdgeSpec {
                    from,
                    to,
                    feeder_id: None,
                    substation_id: None,
                    kind: EdgeKind::Tie,
                    phases: 3,
                },
                &feeder_a.conductor_type,
                catalog::TRUNK_UNDERGROUND,
            );
        }
    }

    log_stage_event(
        Some(&LogContext::new().with_stage("graph").with_seed(seed)),
        "stage.complete",
        &format!(
            "{} nodes, {} edges",
            builder.out.nodes.len(),
            builder.out.edges.len()
        ),
        StageOutcome::Success,
    );
    builder.out
}

/// Emit one feeder's breaker, trunk and laterals; returns the endpoint node.
fn build_feeder(
    builder: &mut GraphBuilder<'_>,
    hierarchy: &Hierarchy,
    feeder_index: usize,
    bus: usize,
) -> usize {
    let feeder = &hierarchy.feeders[feeder_index];
    let feeder_id = Some(feeder.feeder_id.as_str());
    let sub_id = Some(feeder.substation_id.as_str());
    let kv = feeder.voltage_kv;
    let trunk = feeder.conductor_type.as_str();

    let breaker = builder.node(
        NodeType::FeederBreaker,
        feeder_id,
        feeder_id,
        sub_id,
        feeder.head(),
        kv,
        None,
        3,
    );
    builder.edge(
        EdgeSpec {
            from: bus,
            to: breaker,
            feeder_id,
            substation_id: sub_id,
            kind: EdgeKind::BusTie,
            phases: 3,
        },
        trunk,
        catalog::TRUNK_UNDERGROUND,
    );

    let mut points = Vec::new();
    let junctions = hierarchy.feeder_junctions[feeder_index].clone();
    let mut junction_nodes = Vec::with_capacity(junctions.len());
    for junction in &hierarchy.junctions[junctions] {
        let node = builder.node(
            NodeType::Junction,
            None,
            feeder_id,
            sub_id,
            junction.location,
            kv,
            None,
            3,
        );
        junction_nodes.push(node);
        points.push(TrunkPoint {
            fraction: junction.position_fraction,
            rank: TrunkRank::Junction,
            node,
        });
    }

    let devices = &hierarchy.devices[hierarchy.feeder_devices[feeder_index].clone()];
    for device in devices.iter().filter(|d| d.device_type != DeviceType::Fuse) {
        let node = builder.node(
            NodeType::ProtectiveDevice,
            Some(&device.device_id),
            feeder_id,
            sub_id,
            device.location(),
            kv,
            None,
            3,
        );
        let rank = match device.device_type {
            DeviceType::Sectionalizer => TrunkRank::Sectionalizer,
            _ => TrunkRank::Recloser,
        };
        points.push(TrunkPoint {
            fraction: device.position_fraction,
            rank,
            node,
        });
    }

    let endpoint = builder.node(
        NodeType::FeederEndpoint,
        feeder_id,
        feeder_id,
        sub_id,
        feeder.tail(),
        kv,
        None,
        3,
    );
    points.push(TrunkPoint {
        fraction: 1.0,
        rank: TrunkRank::Endpoint,
        node: endpoint,
    });

    points.sort_by(|a, b| {
        a.fraction
            .total_cmp(&b.fraction)
            .then(a.rank.cmp(&b.rank))
            .then(a.node.cmp(&b.node))
    });
    let mut previous = breaker;
    for point in &points {
        builder.edge(
            EdgeSpec {
                from: previous,
                to: point.node,
                feeder_id,
                substation_id: sub_id,
                kind: EdgeKind::Primary,
                phases: 3,
            },
            trunk,
            catalog::TRUNK_UNDERGROUND,
        );
        previous = point.node;
    }

    let first_junction = hierarchy.feeder_junctions[feeder_index].start;
    for transformer_index in hierarchy.feeder_transformers[feeder_index].clone() {
        let transformer = &hierarchy.transformers[transformer_index];
        let fuse = &hierarchy.devices[hierarchy.transformer_fuse[transformer_index]];
        let junction_node = junction_nodes[hierarchy.transformer_junction[transformer_index] - first_junction];
        let phases = transformer.phase_count();
        let fuse_node = builder.node(
            NodeType::ProtectiveDevice,
            Some(&fuse.device_id),
            feeder_id,
            sub_id,
            fuse.location(),
            kv,
            None,
            phases,
        );
        let transformer_node = builder.node(
            NodeType::Transformer,
            Some(&transformer.transformer_id),
            feeder_id,
            sub_id,
            transformer.location(),
            kv,
            Some(transformer.rated_kva),
            phases,
        );
        for (from, to) in [(junction_node, fuse_node), (fuse_node, transformer_node)] {
            builder.edge(
                EdgeSpec {
                    from,
                    to,
                    feeder_id,
                    substation_id: sub_id,
                    kind: EdgeKind::Lateral,
                    phases,
                },
                catalog::LATERAL_OVERHEAD,
                catalog::LATERAL_UNDERGROUND,
            );
        }
    }
    endpoint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::place;
    use crate::ties::pair_feeder_tails;
    use crate::topology::build_hierarchy;
    use dnm_common::CountRange;
    use std::collections::HashSet;

    fn model(seed: u64) -> (Hierarchy, TiePlan, GraphModel) {
        let mut config = GeneratorConfig::default();
        config.scale.substations = 2;
        config.scale.feeders_per_substation = CountRange::exact(3);
        config.scale.transformers_per_feeder = CountRange::exact(10);
        config.scale.customers_per_transformer = CountRange::exact(2);
        let mut rng = GeneratorRng::new(seed);
        let mut hierarchy = build_hierarchy(&config, &mut rng).unwrap();
        place(&config, &mut hierarchy, &mut rng).unwrap();
        let ties = pair_feeder_tails(&config, &hierarchy.feeders);
        let graph = build_graph(&config, &hierarchy, &ties, &mut rng);
        (hierarchy, ties, graph)
    }

    #[test]
    fn every_edge_endpoint_exists() {
        let (_, _, graph) = model(42);
        let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.node_id.as_str()).collect();
        for edge in &graph.edges {
            assert!(ids.contains(edge.from_node_id.as_str()));
            assert!(ids.contains(edge.to_node_id.as_str()));
        }
    }

    #[test]
    fn node_counts_follow_hierarchy() {
        let (h, ties, graph) = model(7);
        let count = |kind: NodeType| graph.nodes.iter().filter(|n| n.node_type == kind).count();
        assert_eq!(count(NodeType::SubstationBus), h.substations.len());
        assert_eq!(count(NodeType::FeederBreaker), h.feeders.len());
        assert_eq!(count(NodeType::FeederEndpoint), h.feeders.len());
        assert_eq!(count(NodeType::Transformer), h.transformers.len());
        assert_eq!(count(NodeType::Junction), h.junctions.len());
        assert_eq!(count(NodeType::ProtectiveDevice), h.devices.len());
        assert_eq!(count(NodeType::TieSwitch), ties.switches.len());
    }

    #[test]
    fn only_ties_are_open() {
        let (_, _, graph) = model(3);
        for edge in &graph.edges {
            let is_tie = edge.edge_kind == EdgeKind::Tie;
            assert_eq!(is_tie, edge.status == SwitchState::Open);
            assert_eq!(is_tie, edge.feeder_id.is_none());
        }
    }

    #[test]
    fn impedance_stays_within_variation() {
        let (_, _, graph) = model(11);
        for edge in &graph.edges {
            let base = catalog::conductor(&edge.conductor_type).unwrap();
            let ratio = edge.r1_ohm_per_mile / base.r1;
            assert!((0.94..=1.06).contains(&ratio), "ratio {ratio}");
            assert!((edge.length_ft - edge.length_miles * FEET_PER_MILE).abs() < 1.0);
        }
    }
}
