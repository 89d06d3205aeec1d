/*!
Aggregation of historical traceroute runs into a per-target hop tree.

This module defines:
- `PathTreeHop`: everything ever observed at one hop depth towards a target.
- `PathTree`: target -> hops ordered by depth.
- `build_path_tree`: folds an unordered collection of runs into a `PathTree`.

The tree is rebuilt from the full run set on every request, it is never patched in place.
*/

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::network::{
    command::extract_target,
    hop::{HopRecord, TimeoutSentinel, TracerouteRun, UNKNOWN_NODE_LABEL},
};

/// Hostnames and IPs seen at one hop depth across all runs to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTreeHop {
    pub hop_number: u32,
    #[serde(rename = "nodes", default)]
    pub hostnames: BTreeSet<String>,
    #[serde(default)]
    pub ips: BTreeSet<String>,
}

impl PathTreeHop {
    pub fn new(hop_number: u32) -> Self {
        Self {
            hop_number,
            ..Default::default()
        }
    }

    /// No run ever resolved this depth; shown as "timeout or unknown node".
    pub fn is_unresolved(&self) -> bool {
        self.hostnames.is_empty() && self.ips.is_empty()
    }

    fn absorb(&mut self, other: PathTreeHop) {
        self.hostnames.extend(other.hostnames);
        self.ips.extend(other.ips);
    }

    fn observe(&mut self, hop: &HopRecord, sentinel: &TimeoutSentinel) {
        let hostname = hop.hostname.trim();
        if !hostname.is_empty() && hostname != "*" && hostname != UNKNOWN_NODE_LABEL {
            self.hostnames.insert(hostname.to_string());
        }
        let ip = hop.ip.trim();
        if !ip.is_empty() && ip != "*" && !ip.eq_ignore_ascii_case("N/A") && !sentinel.matches(ip) {
            self.ips.insert(ip.to_string());
        }
    }
}

/// Per-target hop tree, targets and hops both in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathTree {
    paths: BTreeMap<String, Vec<PathTreeHop>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathTreeStats {
    pub targets: usize,
    pub hops: usize,
    pub ips: usize,
}

impl PathTree {
    /// Normalizes a tree that arrived precomputed: hops are sorted and repeated depths merged.
    pub fn from_raw(raw: BTreeMap<String, Vec<PathTreeHop>>) -> Self {
        let paths = raw
            .into_iter()
            .map(|(target, hops)| {
                let mut by_depth: BTreeMap<u32, PathTreeHop> = BTreeMap::new();
                for hop in hops {
                    by_depth
                        .entry(hop.hop_number)
                        .or_insert_with(|| PathTreeHop::new(hop.hop_number))
                        .absorb(hop);
                }
                (target, by_depth.into_values().collect())
            })
            .collect();
        Self { paths }
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    #[cfg(test)]
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub fn hops(&self, target: &str) -> Option<&[PathTreeHop]> {
        self.paths.get(target).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathTreeHop])> {
        self.paths.iter().map(|(t, hops)| (t.as_str(), hops.as_slice()))
    }

    pub fn stats(&self) -> PathTreeStats {
        PathTreeStats {
            targets: self.paths.len(),
            hops: self.paths.values().map(Vec::len).sum(),
            ips: self
                .paths
                .values()
                .flat_map(|hops| hops.iter().map(|h| h.ips.len()))
                .sum(),
        }
    }
}

/// Folds traceroute runs into one hop tree per target.
///
/// Every depth any run reached is emitted, even when nothing was resolved there. Hostname and
/// IP sets make the result independent of run order and of repeated identical runs.
pub fn build_path_tree<'a, I>(runs: I, sentinel: &TimeoutSentinel) -> PathTree
where
    I: IntoIterator<Item = &'a TracerouteRun>,
{
    let mut grouped: BTreeMap<String, BTreeMap<u32, PathTreeHop>> = BTreeMap::new();

    for run in runs {
        let target = if run.target.trim().is_empty() {
            extract_target(&run.command)
        } else {
            run.target.trim().to_string()
        };
        let depths = grouped.entry(target).or_default();
        for hop in &run.hops {
            if hop.hop_index == 0 {
                debug!(command = %run.command, "skipping hop without a usable depth");
                continue;
            }
            depths
                .entry(hop.hop_index)
                .or_insert_with(|| PathTreeHop::new(hop.hop_index))
                .observe(hop, sentinel);
        }
    }

    PathTree {
        paths: grouped
            .into_iter()
            .map(|(target, depths)| (target, depths.into_values().collect()))
            .collect(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PathsEnvelope {
    #[serde(default)]
    pub paths: BTreeMap<String, Vec<PathTreeHop>>,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::network::hop::DEFAULT_TIMEOUT_SENTINEL;

    fn run(target: &str, hops: Vec<HopRecord>) -> TracerouteRun {
        TracerouteRun {
            target: target.to_string(),
            command: format!("traceroute {target}"),
            hops,
        }
    }

    fn names(hop: &PathTreeHop) -> Vec<&str> {
        hop.hostnames.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_two_runs_merge_hostnames() {
        let a = run(
            "example.com",
            vec![
                HopRecord::new(1, "192.168.1.1", "gw", [Some("1"), None, None]),
                HopRecord::new(2, "10.0.0.1", "r1", [Some("5"), None, None]),
            ],
        );
        let b = run(
            "example.com",
            vec![
                HopRecord::new(1, "192.168.1.1", "gw", [Some("1"), None, None]),
                HopRecord::new(2, "10.0.0.2", "r2", [Some("6"), None, None]),
            ],
        );
        let tree = build_path_tree([&a, &b], &TimeoutSentinel::default());
        let hops = tree.hops("example.com").expect("target missing");
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[1].hop_number, 2);
        assert_eq!(names(&hops[1]), vec!["r1", "r2"]);
        assert_eq!(hops[1].ips.len(), 2);
        assert_eq!(names(&hops[0]), vec!["gw"]);
    }

    #[test]
    fn test_unresolved_depth_is_kept() {
        let r = run(
            "example.com",
            vec![
                HopRecord::new(1, "192.168.1.1", "gw", [Some("1"), None, None]),
                HopRecord::new(2, DEFAULT_TIMEOUT_SENTINEL, "*", [None, None, None]),
                HopRecord::new(3, "N/A", UNKNOWN_NODE_LABEL, [None, None, None]),
                HopRecord::new(4, "93.184.216.34", "example.com", [Some("20"), None, None]),
            ],
        );
        let tree = build_path_tree([&r], &TimeoutSentinel::default());
        let hops = tree.hops("example.com").unwrap();
        let depths: Vec<u32> = hops.iter().map(|h| h.hop_number).collect();
        assert_eq!(depths, vec![1, 2, 3, 4]);
        assert!(hops[1].is_unresolved());
        assert!(hops[2].is_unresolved());
        assert!(!hops[3].is_unresolved());
    }

    #[test]
    fn test_hops_are_sorted_and_zero_depth_skipped() {
        let r = run(
            "t",
            vec![
                HopRecord::new(3, "3.3.3.3", "c", [Some("1"), None, None]),
                HopRecord::new(0, "9.9.9.9", "junk", [Some("1"), None, None]),
                HopRecord::new(1, "1.1.1.1", "a", [Some("1"), None, None]),
            ],
        );
        let tree = build_path_tree([&r], &TimeoutSentinel::default());
        let depths: Vec<u32> = tree.hops("t").unwrap().iter().map(|h| h.hop_number).collect();
        assert_eq!(depths, vec![1, 3]);
    }

    #[test]
    fn test_target_falls_back_to_command() {
        let r = TracerouteRun {
            target: String::new(),
            command: "traceroute -n 8.8.8.8".into(),
            hops: vec![HopRecord::new(1, "10.0.0.1", "*", [Some("1"), None, None])],
        };
        let tree = build_path_tree([&r], &TimeoutSentinel::default());
        assert_eq!(tree.targets().collect::<Vec<_>>(), vec!["8.8.8.8"]);
    }

    #[test]
    fn test_precomputed_tree_is_normalized() {
        let json = include_str!("../../test_data/paths_response.json");
        let envelope: PathsEnvelope = serde_json::from_str(json).expect("Failed to deserialize paths");
        let tree = PathTree::from_raw(envelope.paths);
        let depths: Vec<u32> = tree.hops("example.com").unwrap().iter().map(|h| h.hop_number).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        assert_eq!(
            tree.stats(),
            PathTreeStats {
                targets: 2,
                hops: 4,
                ips: 3
            }
        );
    }

    #[test]
    fn test_serialization_uses_wire_names() {
        let r = run("t", vec![HopRecord::new(1, "1.1.1.1", "a", [Some("1"), None, None])]);
        let tree = build_path_tree([&r], &TimeoutSentinel::default());
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "t": [ { "hop_number": 1, "nodes": ["a"], "ips": ["1.1.1.1"] } ] })
        );
    }

    fn arb_hop() -> impl Strategy<Value = HopRecord> {
        (
            1u32..6,
            prop::sample::select(vec!["10.0.0.1", "10.0.0.2", "*", "", DEFAULT_TIMEOUT_SENTINEL]),
            prop::sample::select(vec!["r1", "r2", "edge", "*", ""]),
            prop::option::of(prop::sample::select(vec!["1.5", "none", "12"])),
        )
            .prop_map(|(depth, ip, host, rtt)| HopRecord::new(depth, ip, host, [rtt, None, None]))
    }

    fn arb_run() -> impl Strategy<Value = TracerouteRun> {
        (
            prop::sample::select(vec!["a.example", "b.example"]),
            prop::collection::vec(arb_hop(), 0..6),
        )
            .prop_map(|(target, hops)| run(target, hops))
    }

    proptest! {
        #[test]
        fn test_order_independent(runs in prop::collection::vec(arb_run(), 0..8), seed in any::<u64>()) {
            let sentinel = TimeoutSentinel::default();
            let expected = build_path_tree(&runs, &sentinel);

            let mut shuffled = runs.clone();
            if !shuffled.is_empty() {
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
            }
            if seed % 2 == 0 {
                shuffled.reverse();
            }
            prop_assert_eq!(build_path_tree(&shuffled, &sentinel), expected);
        }

        #[test]
        fn test_duplicate_runs_are_idempotent(runs in prop::collection::vec(arb_run(), 1..6)) {
            let sentinel = TimeoutSentinel::default();
            let once = build_path_tree(&runs, &sentinel);
            let twice = build_path_tree(runs.iter().chain(runs.iter()), &sentinel);
            prop_assert_eq!(twice, once);
        }
    }
}
