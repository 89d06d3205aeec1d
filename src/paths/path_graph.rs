use eframe::egui::Color32;
use egui_graphs::Graph;
use petgraph::{Directed, csr::DefaultIx, graph::NodeIndex, prelude::StableGraph};

use crate::{
    paths::path_tree::{PathTree, PathTreeHop},
    render::hop_graph::NodeRole,
};

/// Text shown for a depth no run ever resolved.
pub const UNRESOLVED_HOP_TEXT: &str = "timeout or unknown node";

#[derive(Debug, Clone)]
pub enum PathNodeInfo {
    Target,
    Hop(PathTreeHop),
}

/// A vertex of the path-tree graph: a target root or one hop depth towards it.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub target: String,
    pub info: PathNodeInfo,
}

impl PathNode {
    fn target(target: &str) -> Self {
        Self {
            target: target.to_string(),
            info: PathNodeInfo::Target,
        }
    }

    fn hop(target: &str, hop: &PathTreeHop) -> Self {
        Self {
            target: target.to_string(),
            info: PathNodeInfo::Hop(hop.clone()),
        }
    }

    pub fn label(&self) -> String {
        match &self.info {
            PathNodeInfo::Target => self.target.clone(),
            PathNodeInfo::Hop(hop) => format!("Hop {}: {}", hop.hop_number, describe_hop(hop)),
        }
    }

    pub fn color(&self) -> Color32 {
        match &self.info {
            PathNodeInfo::Target => NodeRole::Destination.fill(),
            PathNodeInfo::Hop(hop) if hop.is_unresolved() => NodeRole::Timeout.fill(),
            PathNodeInfo::Hop(_) => NodeRole::Relay.fill(),
        }
    }
}

/// Hostnames when known, otherwise IPs, otherwise the unresolved marker.
pub fn describe_hop(hop: &PathTreeHop) -> String {
    if !hop.hostnames.is_empty() {
        hop.hostnames.iter().cloned().collect::<Vec<_>>().join(", ")
    } else if !hop.ips.is_empty() {
        hop.ips.iter().cloned().collect::<Vec<_>>().join(", ")
    } else {
        UNRESOLVED_HOP_TEXT.to_string()
    }
}

/// Links a node to the next depth of the same target.
#[derive(Debug, Clone, Default)]
pub struct PathEdge;

/// The path tree as a directed graph: each target is a root followed by its hop depths in
/// ascending order.
pub struct PathGraph {
    pub graph: Graph<PathNode, PathEdge, Directed, DefaultIx>,
}

impl Default for PathGraph {
    fn default() -> Self {
        Self::build_new(&PathTree::default())
    }
}

impl PathGraph {
    /// Builds the plain petgraph form, separate from the egui wrapper so it can be inspected
    /// without a UI.
    pub fn build_stable(tree: &PathTree) -> StableGraph<PathNode, PathEdge, Directed, DefaultIx> {
        let mut graph = StableGraph::default();
        for (target, hops) in tree.iter() {
            let mut prev_index = graph.add_node(PathNode::target(target));
            for hop in hops {
                let index = graph.add_node(PathNode::hop(target, hop));
                graph.add_edge(prev_index, index, PathEdge);
                prev_index = index;
            }
        }
        graph
    }

    pub fn build_new(tree: &PathTree) -> Self {
        let stable = Self::build_stable(tree);
        let mut graph: Graph<PathNode, PathEdge, Directed, DefaultIx> = egui_graphs::to_graph(&stable);

        let node_indices: Vec<NodeIndex> = graph.nodes_iter().map(|(index, _)| index).collect();
        for index in node_indices {
            let Some(node) = graph.node_mut(index) else {
                continue;
            };
            let label = node.payload().label();
            let color = node.payload().color();
            node.set_label(label);
            node.set_color(color);
        }

        Self { graph }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::hop::{HopRecord, TimeoutSentinel, TracerouteRun};
    use crate::paths::path_tree::build_path_tree;

    #[test]
    fn test_stable_graph_chains_hops_per_target() {
        let runs = vec![
            TracerouteRun {
                target: "a.example".into(),
                command: "traceroute a.example".into(),
                hops: vec![
                    HopRecord::new(1, "10.0.0.1", "gw", [Some("1"), None, None]),
                    HopRecord::new(2, "*", "*", [None, None, None]),
                    HopRecord::new(3, "1.2.3.4", "a.example", [Some("9"), None, None]),
                ],
            },
            TracerouteRun {
                target: "b.example".into(),
                command: "traceroute b.example".into(),
                hops: vec![HopRecord::new(1, "10.0.0.1", "gw", [Some("1"), None, None])],
            },
        ];
        let tree = build_path_tree(&runs, &TimeoutSentinel::default());
        let graph = PathGraph::build_stable(&tree);

        // 2 roots + 3 + 1 hops, one edge per hop
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 4);

        let labels: Vec<String> = graph.node_weights().map(PathNode::label).collect();
        assert!(labels.contains(&"Hop 2: timeout or unknown node".to_string()));
        assert!(labels.contains(&"Hop 1: gw".to_string()));

        let first_hop_targets: Vec<&str> = graph
            .node_weights()
            .filter(|n| matches!(&n.info, PathNodeInfo::Hop(h) if h.hop_number == 1))
            .map(|n| n.target.as_str())
            .collect();
        assert_eq!(first_hop_targets.len(), 2);
        assert_ne!(first_hop_targets[0], first_hop_targets[1]);
    }

    #[test]
    fn test_describe_hop_prefers_hostnames() {
        let mut hop = PathTreeHop::new(4);
        assert_eq!(describe_hop(&hop), UNRESOLVED_HOP_TEXT);
        hop.ips.insert("10.0.0.9".into());
        assert_eq!(describe_hop(&hop), "10.0.0.9");
        hop.hostnames.insert("core".into());
        assert_eq!(describe_hop(&hop), "core");
    }
}
