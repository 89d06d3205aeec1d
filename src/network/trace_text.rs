use std::net::Ipv4Addr;

use crate::network::hop::{HopRecord, TimeoutSentinel, is_empty_sample, is_timeout};

/// Rebuilds a plausible `traceroute` stdout for a stored run, so historic entries show raw
/// text next to their graph.
pub fn render_traceroute_text(command: &str, hops: &[HopRecord], sentinel: &TimeoutSentinel) -> String {
    let numeric = command
        .split_whitespace()
        .skip(1)
        .any(|arg| arg == "-n");
    let dest = command.split_whitespace().last().unwrap_or("");

    let header_ip = if is_ipv4(dest) {
        dest.to_string()
    } else {
        hops.iter()
            .map(|h| h.ip.trim())
            .find(|ip| is_ipv4(ip))
            .unwrap_or(dest)
            .to_string()
    };

    let mut lines = vec![format!(
        "traceroute to {dest} ({header_ip}), 30 hops max, 60 byte packets"
    )];

    for hop in hops {
        if is_timeout(hop, sentinel) {
            lines.push(format!("{}  * * *", hop.hop_index));
            continue;
        }
        let samples: Vec<String> = hop
            .rtts()
            .into_iter()
            .map(|rtt| match rtt.map(str::trim) {
                Some(rtt) if !is_empty_sample(rtt) => format!("{rtt} ms"),
                _ => "*".to_string(),
            })
            .collect();

        let ip = hop.ip.trim();
        let hostname = hop.hostname.trim();
        let base = if numeric {
            let shown = [ip, hostname].into_iter().find(|s| !s.is_empty()).unwrap_or("*");
            format!("{}  {}", hop.hop_index, shown)
        } else {
            match hop.resolved_hostname() {
                Some(name) if !ip.is_empty() => format!("{}  {} ({})", hop.hop_index, name, ip),
                Some(name) => format!("{}  {}", hop.hop_index, name),
                None if !ip.is_empty() => format!("{}  {}", hop.hop_index, ip),
                None => format!("{}  *", hop.hop_index),
            }
        };
        lines.push(format!("{}  {}", base, samples.join("  ")));
    }

    lines.join("\n")
}

fn is_ipv4(value: &str) -> bool {
    value.parse::<Ipv4Addr>().is_ok()
}
