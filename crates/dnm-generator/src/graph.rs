//! ---
//! dnm_section: "11-simulation"
//! dnm_subsection: "module"
//! dnm_type: "source"
//! dnm_scope: "code"
//! dnm_description: "petgraph view over the node/edge tables for traversal and radiality checks."
//! dnm_version: "v0.1.0"
//! dnm_owner: "tbd"
//! ---
use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, EdgeReference, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Dfs, EdgeFiltered, EdgeRef};
use petgraph::Direction;

use crate::model::{NetworkEdge, NetworkNode, SwitchState};

/// Directed graph whose weights are row positions in the node and edge tables.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    graph: DiGraph<usize, usize>,
    lookup: HashMap<String, NodeIndex>,
    closed: Vec<bool>,
    dangling: Vec<usize>,
}

impl NetworkGraph {
    /// Edges whose endpoints are unknown are left out and reported by
    /// [`NetworkGraph::dangling_edges`].
    pub fn new(nodes: &[NetworkNode], edges: &[NetworkEdge]) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut lookup = HashMap::with_capacity(nodes.len());
        for (row, node) in nodes.iter().enumerate() {
            let index = graph.add_node(row);
            lookup.entry(node.node_id.clone()).or_insert(index);
        }
        let mut dangling = Vec::new();
        for (row, edge) in edges.iter().enumerate() {
            match (lookup.get(&edge.from_node_id), lookup.get(&edge.to_node_id)) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, row);
                }
                _ => dangling.push(row),
            }
        }
        let closed = edges
            .iter()
            .map(|edge| edge.status == SwitchState::Closed)
            .collect();
        Self {
            graph,
            lookup,
            closed,
            dangling,
        }
    }

    pub fn index(&self, node_id: &str) -> Option<NodeIndex> {
        self.lookup.get(node_id).copied()
    }

    /// Node table row behind a graph index.
    pub fn row(&self, index: NodeIndex) -> usize {
        self.graph[index]
    }

    pub fn dangling_edges(&self) -> &[usize] {
        &self.dangling
    }

    fn is_closed(&self, edge: EdgeIndex) -> bool {
        self.closed[self.graph[edge]]
    }

    /// Edge rows that close an undirected loop among closed edges. Empty
    /// for a radial network.
    pub fn loop_edges(&self) -> Vec<usize> {
        let mut sets = UnionFind::new(self.graph.node_count());
        self.graph
            .edge_references()
            .filter(|edge| self.closed[*edge.weight()])
            .filter(|edge| !sets.union(edge.source().index(), edge.target().index()))
            .map(|edge| *edge.weight())
            .collect()
    }

    /// Nodes with more than one closed incoming edge, as table rows.
    pub fn multi_parent_nodes(&self) -> Vec<usize> {
        self.graph
            .node_indices()
            .filter(|&node| {
                self.graph
                    .edges_directed(node, Direction::Incoming)
                    .filter(|edge| self.is_closed(edge.id()))
                    .count()
                    > 1
            })
            .map(|node| self.graph[node])
            .collect()
    }

    /// Node rows reachable from `start` over closed edges, `start` included.
    pub fn downstream(&self, start: NodeIndex) -> Vec<usize> {
        let closed = EdgeFiltered::from_fn(&self.graph, |edge: EdgeReference<'_, usize>| {
            self.closed[*edge.weight()]
        });
        let mut dfs = Dfs::new(&closed, start);
        let mut rows = Vec::new();
        while let Some(node) = dfs.next(&closed) {
            rows.push(self.graph[node]);
        }
        rows
    }

    /// Source of the closed edge feeding `node`.
    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph
            .edges_directed(node, Direction::Incoming)
            .find(|edge| self.is_closed(edge.id()))
            .map(|edge| edge.source())
    }

    /// Walk towards the source, nearest ancestor first. Bounded by the node
    /// count so a malformed loop cannot spin forever.
    pub fn ancestors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut current = node;
        (0..self.graph.node_count()).map_while(move |_| {
            let parent = self.parent(current)?;
            current = parent;
            Some(parent)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Construction, EdgeKind, NodeType};

    fn node(id: &str) -> NetworkNode {
        NetworkNode {
            node_id: id.into(),
            node_type: NodeType::Junction,
            entity_id: None,
            feeder_id: Some("FDR-0001".into()),
            substation_id: Some("SUB-001".into()),
            latitude: 33.4,
            longitude: -112.0,
            voltage_kv: 12.47,
            rated_kva: None,
            phases: 3,
        }
    }

    fn edge(id: &str, from: &str, to: &str, status: SwitchState) -> NetworkEdge {
        NetworkEdge {
            edge_id: id.into(),
            from_node_id: from.into(),
            to_node_id: to.into(),
            feeder_id: None,
            substation_id: None,
            edge_kind: EdgeKind::Primary,
            construction: Construction::Overhead,
            conductor_type: "477_ACSR".into(),
            length_miles: 0.1,
            length_ft: 528.0,
            r1_ohm_per_mile: 0.306,
            x1_ohm_per_mile: 0.627,
            r0_ohm_per_mile: 0.592,
            x0_ohm_per_mile: 1.461,
            rated_amps: 730.0,
            phases: 3,
            status,
        }
    }

    fn chain() -> (Vec<NetworkNode>, Vec<NetworkEdge>) {
        let nodes = ["A", "B", "C", "D"].into_iter().map(node).collect();
        let edges = vec![
            edge("E1", "A", "B", SwitchState::Closed),
            edge("E2", "B", "C", SwitchState::Closed),
            edge("E3", "B", "D", SwitchState::Closed),
        ];
        (nodes, edges)
    }

    #[test]
    fn radial_chain_has_no_loops() {
        let (nodes, edges) = chain();
        let graph = NetworkGraph::new(&nodes, &edges);
        assert!(graph.loop_edges().is_empty());
        assert!(graph.multi_parent_nodes().is_empty());
        let b = graph.index("B").unwrap();
        let mut below = graph.downstream(b);
        below.sort_unstable();
        assert_eq!(below, vec![1, 2, 3]);
    }

    #[test]
    fn closed_loop_is_reported_and_open_tie_is_not() {
        let (nodes, mut edges) = chain();
        edges.push(edge("E4", "C", "D", SwitchState::Open));
        assert!(NetworkGraph::new(&nodes, &edges).loop_edges().is_empty());
        edges[3].status = SwitchState::Closed;
        let graph = NetworkGraph::new(&nodes, &edges);
        assert_eq!(graph.loop_edges(), vec![3]);
        assert_eq!(graph.multi_parent_nodes(), vec![3]);
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let (nodes, edges) = chain();
        let graph = NetworkGraph::new(&nodes, &edges);
        let d = graph.index("D").unwrap();
        let path: Vec<usize> = graph.ancestors(d).map(|n| graph.row(n)).collect();
        assert_eq!(path, vec![1, 0]);
    }

    #[test]
    fn unknown_endpoints_are_dangling() {
        let (nodes, mut edges) = chain();
        edges.push(edge("E9", "C", "Z", SwitchState::Closed));
        let graph = NetworkGraph::new(&nodes, &edges);
        assert_eq!(graph.dangling_edges(), &[3]);
    }
}
