use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Marker the backend writes into the `ip` field of a hop that never answered.
pub const DEFAULT_TIMEOUT_SENTINEL: &str = "Таймаут";

/// Label used for hops whose hostname could not be resolved.
pub const UNKNOWN_NODE_LABEL: &str = "unknown node";

/// The textual marker identifying a timed-out hop in the `ip` field.
///
/// The backend localizes this marker, so it is carried as configuration instead of being
/// compared against a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeoutSentinel(String);

impl TimeoutSentinel {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, value: &str) -> bool {
        !self.0.is_empty() && value.trim() == self.0
    }
}

impl Default for TimeoutSentinel {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SENTINEL)
    }
}

impl Display for TimeoutSentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One reply line at one traceroute depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopRecord {
    /// 1-based distance from the source. 0 means the backend sent something unparseable.
    #[serde(rename = "hop", default, deserialize_with = "deserialize_hop_index")]
    pub hop_index: u32,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub ip: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub hostname: String,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt1: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt2: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt3: Option<String>,
}

impl HopRecord {
    pub fn new(hop_index: u32, ip: &str, hostname: &str, rtts: [Option<&str>; 3]) -> Self {
        let [rtt1, rtt2, rtt3] = rtts.map(|r| r.map(str::to_string));
        Self {
            hop_index,
            ip: ip.to_string(),
            hostname: hostname.to_string(),
            rtt1,
            rtt2,
            rtt3,
        }
    }

    pub fn rtts(&self) -> [Option<&str>; 3] {
        [self.rtt1.as_deref(), self.rtt2.as_deref(), self.rtt3.as_deref()]
    }

    /// RTT samples that carry an actual value, trimmed.
    pub fn rtt_samples(&self) -> impl Iterator<Item = &str> {
        self.rtts()
            .into_iter()
            .map(normalize_field)
            .filter(|rtt| !is_empty_sample(rtt))
    }

    pub fn has_no_rtts(&self) -> bool {
        self.rtt_samples().next().is_none()
    }

    /// Hostname, unless the router left it unresolved.
    pub fn resolved_hostname(&self) -> Option<&str> {
        let hostname = self.hostname.trim();
        if hostname.is_empty() || hostname == "*" {
            None
        } else {
            Some(hostname)
        }
    }

    /// Hostname for tooltips and titles, with the unknown-node fallback.
    pub fn display_name(&self) -> &str {
        self.resolved_hostname().unwrap_or(UNKNOWN_NODE_LABEL)
    }

    /// Short label for the node: hostname, then ip, then "N/A".
    pub fn short_label(&self) -> &str {
        match self.resolved_hostname() {
            Some(hostname) => hostname,
            None => {
                let ip = self.ip.trim();
                if ip.is_empty() { "N/A" } else { ip }
            }
        }
    }

    /// Backfills the timeout marker on stored hops that lost it.
    ///
    /// A hop without samples whose ip is empty or "N/A" is rewritten to carry the sentinel,
    /// and gets a "*" hostname when it has none.
    pub fn normalize_stored(mut self, sentinel: &TimeoutSentinel) -> Self {
        let ip = self.ip.trim();
        if self.has_no_rtts() && (ip.is_empty() || ip.eq_ignore_ascii_case("N/A")) {
            self.ip = sentinel.as_str().to_string();
            if self.hostname.trim().is_empty() {
                self.hostname = "*".to_string();
            }
        }
        self
    }
}

/// Decides whether `hop` represents a depth that timed out.
///
/// True when the ip carries the timeout sentinel, when all three RTTs are empty, or when the
/// hostname is "*" and all three RTTs are empty. One populated RTT is enough to make an
/// anonymous hop reachable.
pub fn is_timeout(hop: &HopRecord, sentinel: &TimeoutSentinel) -> bool {
    let no_rtts = hop.has_no_rtts();
    let ip_timeout = sentinel.matches(&hop.ip);
    let host_star = hop.hostname.trim() == "*";
    ip_timeout || no_rtts || (host_star && no_rtts)
}

/// True for RTT strings that mean "no sample".
pub fn is_empty_sample(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("undefined")
}

fn normalize_field(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or("")
}

/// Result of one executed traceroute command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteRun {
    pub target: String,
    pub command: String,
    #[serde(deserialize_with = "deserialize_hop_list")]
    pub hops: Vec<HopRecord>,
}

impl TracerouteRun {
    pub fn new(command: &str, hops: Vec<HopRecord>) -> Self {
        Self {
            target: crate::network::command::extract_target(command),
            command: command.to_string(),
            hops,
        }
    }
}

/// Decodes a hop list element by element.
///
/// An element that is not a usable hop keeps its place as an empty hop numbered by its
/// position, so it is drawn as an unknown node instead of taking the whole run down.
pub fn hops_from_values(values: Vec<serde_json::Value>) -> Vec<HopRecord> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| match HopRecord::deserialize(value) {
            Ok(hop) => hop,
            Err(e) => {
                let hop_index = position as u32 + 1;
                warn!(hop_index, error = %e, "malformed hop, keeping a placeholder");
                HopRecord {
                    hop_index,
                    ..Default::default()
                }
            }
        })
        .collect()
}

/// Accepts a hop array or null; see `hops_from_values`.
pub(crate) fn deserialize_hop_list<'de, D>(deserializer: D) -> Result<Vec<HopRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(hops_from_values(values.unwrap_or_default()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexibleValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl FlexibleValue {
    fn into_string(self) -> String {
        match self {
            FlexibleValue::Text(s) => s,
            FlexibleValue::Integer(i) => i.to_string(),
            FlexibleValue::Float(f) => f.to_string(),
        }
    }
}

/// Accepts strings, numbers or null.
pub(crate) fn deserialize_flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<FlexibleValue>::deserialize(deserializer)?;
    Ok(value.map(FlexibleValue::into_string))
}

fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_flexible_string(deserializer)?.unwrap_or_default())
}

fn deserialize_hop_index<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    // The backend sends hop numbers as strings; garbage degrades to 0 rather than failing the run.
    let raw = deserialize_flexible_string(deserializer)?;
    Ok(raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u32)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel() -> TimeoutSentinel {
        TimeoutSentinel::default()
    }

    #[test]
    fn test_null_rtts_with_star_ip_is_timeout() {
        let hop = HopRecord::new(4, "*", "*", [None, None, None]);
        assert!(is_timeout(&hop, &sentinel()));
    }

    #[test]
    fn test_single_rtt_with_unresolved_ip_is_reachable() {
        for rtts in [
            [Some("12.5"), None, None],
            [None, Some("3"), None],
            [Some("none"), Some(""), Some("0.8")],
        ] {
            let hop = HopRecord::new(2, "*", "*", rtts);
            assert!(!is_timeout(&hop, &sentinel()), "{rtts:?} should be reachable");
        }
        let hop = HopRecord::new(2, "", "", [Some("1.0"), None, None]);
        assert!(!is_timeout(&hop, &sentinel()));
    }

    #[test]
    fn test_empty_equivalent_rtts() {
        let hop = HopRecord::new(
            1,
            "10.0.0.1",
            "gw.local",
            [Some(" NULL "), Some("Undefined"), Some("  ")],
        );
        assert!(is_timeout(&hop, &sentinel()));
    }

    #[test]
    fn test_sentinel_ip_overrides_resolved_hostname() {
        let hop = HopRecord::new(
            5,
            DEFAULT_TIMEOUT_SENTINEL,
            "core1.example.net",
            [Some("10.1"), Some("10.2"), None],
        );
        assert!(is_timeout(&hop, &sentinel()));
    }

    #[test]
    fn test_configurable_sentinel() {
        let custom = TimeoutSentinel::new("Timeout");
        let hop = HopRecord::new(3, "Timeout", "r3", [Some("4.2"), None, None]);
        assert!(is_timeout(&hop, &custom));
        assert!(!is_timeout(&hop, &sentinel()));
    }

    #[test]
    fn test_hop_deserialization_accepts_mixed_shapes() {
        let json = r#"[
            {"hop": "1", "ip": "192.168.1.1", "hostname": "router.lan", "rtt1": "0.512", "rtt2": 0.6, "rtt3": null},
            {"hop": 2, "ip": null, "hostname": "*"},
            {"hop": "x", "ip": "*", "hostname": "*", "rtt1": "None"}
        ]"#;
        let hops: Vec<HopRecord> = serde_json::from_str(json).expect("Failed to deserialize hops");
        assert_eq!(hops[0].hop_index, 1);
        assert_eq!(hops[0].rtt2.as_deref(), Some("0.6"));
        assert_eq!(hops[0].rtt3, None);
        assert_eq!(hops[1].hop_index, 2);
        assert_eq!(hops[1].ip, "");
        assert_eq!(hops[2].hop_index, 0);
        assert!(is_timeout(&hops[2], &sentinel()));
    }

    #[test]
    fn test_malformed_hops_keep_their_place() {
        let values: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"hop": "1", "ip": "192.168.1.1", "hostname": "gw", "rtt1": "1.0"},
                {"hop": "2", "ip": ["10.0.0.2"], "hostname": "r2", "rtt1": "5.0"},
                "garbage",
                {"hop": "4", "ip": "10.0.0.4", "hostname": "r4", "rtt1": true}
            ]"#,
        )
        .expect("Failed to parse fixture");
        let hops = hops_from_values(values);

        assert_eq!(hops.len(), 4);
        assert_eq!(hops[0].hostname, "gw");
        let indices: Vec<u32> = hops.iter().map(|h| h.hop_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        for hop in &hops[1..] {
            assert_eq!(hop.short_label(), "N/A");
            assert_eq!(hop.display_name(), UNKNOWN_NODE_LABEL);
        }
    }

    #[test]
    fn test_stored_run_with_malformed_hop() {
        let run: TracerouteRun = serde_json::from_str(
            r#"{"command": "traceroute example.com", "target": "example.com",
                "hops": [{"hop": "1", "ip": "10.0.0.1", "hostname": "gw", "rtt1": "1"}, 42]}"#,
        )
        .expect("Failed to deserialize run");
        assert_eq!(run.hops.len(), 2);
        assert_eq!(run.hops[1].hop_index, 2);

        let empty: TracerouteRun = serde_json::from_str(r#"{"command": "ping x", "hops": null}"#).unwrap();
        assert!(empty.hops.is_empty());
    }

    #[test]
    fn test_normalize_stored_backfills_sentinel() {
        let hop = HopRecord::new(7, "N/A", "", [None, None, None]).normalize_stored(&sentinel());
        assert_eq!(hop.ip, DEFAULT_TIMEOUT_SENTINEL);
        assert_eq!(hop.hostname, "*");

        let kept = HopRecord::new(7, "", "edge", [Some("9"), None, None]).normalize_stored(&sentinel());
        assert_eq!(kept.ip, "");
        assert_eq!(kept.hostname, "edge");
    }

    #[test]
    fn test_labels_fall_back() {
        let anonymous = HopRecord::new(3, "", "*", [Some("1"), None, None]);
        assert_eq!(anonymous.short_label(), "N/A");
        assert_eq!(anonymous.display_name(), UNKNOWN_NODE_LABEL);
        let ip_only = HopRecord::new(3, "8.8.8.8", "*", [Some("1"), None, None]);
        assert_eq!(ip_only.short_label(), "8.8.8.8");
    }
}
