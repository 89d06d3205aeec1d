/*!
Diagnostic commands and the structured results the backend returns for them.

This module defines:
- `CommandType`: the family a command belongs to, which decides how its result is shown.
- `CommandResponse`: the wire shape of an executed command.
- `ParsedData`: the typed interpretation of `parsed_data` for the command type.
- Input validation for single commands and batch target lists.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::network::hop::{HopRecord, deserialize_flexible_string, deserialize_hop_list, hops_from_values};

/// Characters that never appear in a legitimate diagnostic command.
const FORBIDDEN_CHARS: &[char] = &[';', '&', '|', '`', '$', '<', '>'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,
    #[error("command is too long ({len} > {max} characters)")]
    TooLong { len: usize, max: usize },
    #[error("command not allowed, allowed commands: {}", .allowed.join(", "))]
    NotAllowed { allowed: Vec<String> },
    #[error("command contains forbidden characters")]
    ForbiddenCharacters,
    #[error("no targets provided for batch traceroute")]
    NoTargets,
    #[error("too many targets ({count} > {max})")]
    TooManyTargets { count: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Traceroute,
    Ping,
    #[serde(alias = "nmap")]
    Scan,
    Dns,
    Netstat,
    #[default]
    #[serde(other)]
    Other,
}

impl CommandType {
    /// Classifies a command line by its program name.
    pub fn detect(command: &str) -> Self {
        let program = command.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
        match program.as_str() {
            "traceroute" | "tracert" | "tracepath" => CommandType::Traceroute,
            "ping" => CommandType::Ping,
            "nmap" => CommandType::Scan,
            "dig" | "nslookup" | "whois" | "host" => CommandType::Dns,
            "netstat" | "ss" => CommandType::Netstat,
            _ => CommandType::Other,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            CommandType::Traceroute => "Traceroute",
            CommandType::Ping => "Ping results",
            CommandType::Scan => "Nmap results",
            CommandType::Dns => "DNS results",
            CommandType::Netstat => "Netstat results",
            CommandType::Other => "Command output",
        }
    }
}

/// Ping summary as parsed by the backend. Values are kept as text, the backend mixes numbers
/// and strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub packets_transmitted: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub packets_received: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub packet_loss: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub time_ms: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt_min: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt_avg: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub rtt_max: Option<String>,
}

impl PingStats {
    /// (label, value) rows in display order.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let value = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        vec![
            ("Packets sent", value(&self.packets_transmitted)),
            ("Packets received", value(&self.packets_received)),
            ("Packets lost", value(&self.packet_loss)),
            ("Execution time", format!("{} ms", value(&self.time_ms))),
            (
                "RTT min/avg/max",
                format!(
                    "{}/{}/{} ms",
                    value(&self.rtt_min),
                    value(&self.rtt_avg),
                    value(&self.rtt_max)
                ),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawText {
    #[serde(default)]
    pub raw_output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedData {
    Hops(Vec<HopRecord>),
    Ping(PingStats),
    Raw(RawText),
}

/// Wire shape returned by the backend for an executed command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub command_type: Option<CommandType>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub raw_stdout: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub raw_stderr: Option<String>,
    #[serde(default)]
    pub returncode: Option<i32>,
    #[serde(default)]
    pub parsed_data: Option<serde_json::Value>,
}

/// A command response with its `parsed_data` interpreted for the command type.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub command: String,
    pub command_type: CommandType,
    pub parsed: Option<ParsedData>,
    pub raw_stdout: String,
    pub raw_stderr: String,
}

impl CommandOutcome {
    pub fn from_response(response: CommandResponse) -> Self {
        let command_type = response
            .command_type
            .unwrap_or_else(|| CommandType::detect(&response.command));
        let parsed = response
            .parsed_data
            .filter(|value| !value.is_null())
            .and_then(|value| interpret_parsed_data(command_type, value));
        Self {
            command: response.command,
            command_type,
            parsed,
            raw_stdout: response.raw_stdout.unwrap_or_default(),
            raw_stderr: response.raw_stderr.unwrap_or_default(),
        }
    }

    pub fn target(&self) -> String {
        extract_target(&self.command)
    }
}

fn interpret_parsed_data(command_type: CommandType, value: serde_json::Value) -> Option<ParsedData> {
    let parsed = match command_type {
        CommandType::Traceroute => serde_json::from_value::<Vec<serde_json::Value>>(value)
            .map(|values| ParsedData::Hops(hops_from_values(values))),
        CommandType::Ping => serde_json::from_value::<PingStats>(value).map(ParsedData::Ping),
        CommandType::Scan | CommandType::Dns | CommandType::Netstat => {
            serde_json::from_value::<RawText>(value).map(ParsedData::Raw)
        }
        CommandType::Other => return None,
    };
    match parsed {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(?command_type, error = %e, "parsed data has an unexpected shape");
            None
        }
    }
}

/// The destination of a command is its last token; single-token commands have none.
pub fn extract_target(command: &str) -> String {
    let parts: Vec<&str> = command.split_whitespace().collect();
    if parts.len() > 1 {
        parts[parts.len() - 1].to_string()
    } else {
        "unknown".to_string()
    }
}

/// Rules a command must satisfy before it is sent to the backend.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    pub allowed_prefixes: Vec<String>,
    pub max_len: usize,
    pub max_batch_targets: usize,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            allowed_prefixes: ["traceroute", "tracert", "ping", "nmap", "dig", "nslookup", "whois"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_len: 1024,
            max_batch_targets: 50,
        }
    }
}

impl CommandPolicy {
    /// Returns the trimmed command if it may be executed.
    pub fn validate(&self, command: &str) -> Result<String, CommandError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(CommandError::Empty);
        }
        let len = command.chars().count();
        if len > self.max_len {
            return Err(CommandError::TooLong { len, max: self.max_len });
        }
        if command.contains(FORBIDDEN_CHARS) {
            return Err(CommandError::ForbiddenCharacters);
        }
        if !self.allowed_prefixes.is_empty()
            && !self.allowed_prefixes.iter().any(|prefix| command.starts_with(prefix.as_str()))
        {
            return Err(CommandError::NotAllowed {
                allowed: self.allowed_prefixes.clone(),
            });
        }
        Ok(command.to_string())
    }

    /// Splits a free-form list of IPs/domains separated by whitespace, commas or semicolons.
    pub fn parse_targets(&self, raw: &str) -> Result<Vec<String>, CommandError> {
        let targets: Vec<String> = raw
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if targets.is_empty() {
            return Err(CommandError::NoTargets);
        }
        if targets.len() > self.max_batch_targets {
            return Err(CommandError::TooManyTargets {
                count: targets.len(),
                max: self.max_batch_targets,
            });
        }
        Ok(targets)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u32>,
}

impl BatchOptions {
    /// Only positive limits are forwarded; zero means "backend default".
    pub fn new(numeric: bool, max_hops: u32, wait_ms: u32) -> Self {
        Self {
            numeric: numeric.then_some(true),
            max_hops: (max_hops > 0).then_some(max_hops),
            wait_ms: (wait_ms > 0).then_some(wait_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    pub targets: Vec<String>,
    pub options: BatchOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub returncode: Option<i32>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub raw_stdout: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_string")]
    pub raw_stderr: Option<String>,
    /// `null` for targets whose output could not be parsed.
    #[serde(default, deserialize_with = "deserialize_hop_list")]
    pub hops: Vec<HopRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub results: Vec<BatchResult>,
}

impl BatchResponse {
    /// Concatenated raw output, one section per target.
    pub fn combined_output(&self) -> String {
        let total = self.results.len();
        self.results
            .iter()
            .enumerate()
            .map(|(idx, result)| {
                let code = result
                    .returncode
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let head = format!(
                    "=== [{}/{}] {} — {} (code {}) ===",
                    idx + 1,
                    total,
                    result.target,
                    result.command,
                    code
                );
                let stdout = result.raw_stdout.as_deref().unwrap_or("");
                let body = if stdout.trim().is_empty() {
                    result.raw_stderr.as_deref().unwrap_or("")
                } else {
                    stdout
                };
                format!("{head}\n{body}").trim().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The single run worth drawing, if the batch had exactly one target with hops.
    pub fn single_run(&self) -> Option<&BatchResult> {
        match self.results.as_slice() {
            [only] if !only.hops.is_empty() => Some(only),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_target() {
        assert_eq!(extract_target("traceroute -n example.com"), "example.com");
        assert_eq!(extract_target("  traceroute   8.8.8.8 "), "8.8.8.8");
        assert_eq!(extract_target("netstat"), "unknown");
    }

    #[test]
    fn test_detect_command_type() {
        assert_eq!(CommandType::detect("tracert example.com"), CommandType::Traceroute);
        assert_eq!(CommandType::detect("ping -c 4 example.com"), CommandType::Ping);
        assert_eq!(CommandType::detect("nmap -sn 10.0.0.0/24"), CommandType::Scan);
        assert_eq!(CommandType::detect("dig example.com"), CommandType::Dns);
        assert_eq!(CommandType::detect("uptime"), CommandType::Other);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let policy = CommandPolicy::default();
        assert_eq!(policy.validate("   "), Err(CommandError::Empty));
        assert!(matches!(
            policy.validate(&format!("traceroute {}", "a".repeat(1100))),
            Err(CommandError::TooLong { max: 1024, .. })
        ));
        assert_eq!(
            policy.validate("traceroute example.com; rm -rf /"),
            Err(CommandError::ForbiddenCharacters)
        );
        assert!(matches!(policy.validate("ls -la"), Err(CommandError::NotAllowed { .. })));
        assert_eq!(policy.validate("  traceroute example.com ").as_deref(), Ok("traceroute example.com"));
    }

    #[test]
    fn test_parse_targets() {
        let policy = CommandPolicy::default();
        let targets = policy.parse_targets("8.8.8.8, example.com;\n1.1.1.1\tgoogle.com").unwrap();
        assert_eq!(targets, vec!["8.8.8.8", "example.com", "1.1.1.1", "google.com"]);
        assert_eq!(policy.parse_targets(" ,; \n"), Err(CommandError::NoTargets));

        let many = (0..51).map(|i| format!("10.0.0.{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(
            policy.parse_targets(&many),
            Err(CommandError::TooManyTargets { count: 51, max: 50 })
        );
    }

    #[test]
    fn test_batch_options_skip_non_positive() {
        let options = BatchOptions::new(false, 0, 250);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json, serde_json::json!({ "wait_ms": 250 }));
    }

    #[test]
    fn test_outcome_interprets_traceroute_response() {
        let json = include_str!("../../test_data/traceroute_response.json");
        let response: CommandResponse = serde_json::from_str(json).expect("Failed to deserialize response");
        let outcome = CommandOutcome::from_response(response);
        assert_eq!(outcome.command_type, CommandType::Traceroute);
        assert_eq!(outcome.target(), "example.com");
        match outcome.parsed {
            Some(ParsedData::Hops(hops)) => assert_eq!(hops.len(), 5),
            other => panic!("expected hops, got {other:?}"),
        }
    }

    #[test]
    fn test_outcome_with_malformed_parsed_data() {
        let response = CommandResponse {
            command: "ping -c 4 example.com".into(),
            command_type: Some(CommandType::Ping),
            parsed_data: Some(serde_json::json!([1, 2, 3])),
            ..Default::default()
        };
        let outcome = CommandOutcome::from_response(response);
        assert_eq!(outcome.parsed, None);
    }

    #[test]
    fn test_outcome_keeps_malformed_hops() {
        let response = CommandResponse {
            command: "traceroute example.com".into(),
            command_type: Some(CommandType::Traceroute),
            parsed_data: Some(serde_json::json!([
                {"hop": "1", "ip": "192.168.1.1", "hostname": "gw", "rtt1": "1.0", "rtt2": null, "rtt3": null},
                {"hop": "2", "ip": ["10.0.0.2"], "hostname": "r2", "rtt1": "5.0", "rtt2": null, "rtt3": null},
                {"hop": "3", "ip": "93.184.216.34", "hostname": "example.com", "rtt1": "20.0", "rtt2": null, "rtt3": null}
            ])),
            ..Default::default()
        };
        let outcome = CommandOutcome::from_response(response);
        let Some(ParsedData::Hops(hops)) = outcome.parsed else {
            panic!("expected hops, got {:?}", outcome.parsed);
        };
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[1].hop_index, 2);
        assert_eq!(hops[1].short_label(), "N/A");
        assert_eq!(hops[2].hostname, "example.com");

        let response = CommandResponse {
            command: "traceroute example.com".into(),
            command_type: Some(CommandType::Traceroute),
            parsed_data: Some(serde_json::json!([
                {"hop": "1", "ip": "10.0.0.1", "hostname": "gw", "rtt1": true},
                "garbage"
            ])),
            ..Default::default()
        };
        match CommandOutcome::from_response(response).parsed {
            Some(ParsedData::Hops(hops)) => assert_eq!(hops.len(), 2),
            other => panic!("expected hops, got {other:?}"),
        }
    }

    #[test]
    fn test_nmap_alias_and_unknown_type() {
        let response: CommandResponse =
            serde_json::from_str(r#"{"command": "nmap -sn host", "command_type": "nmap", "parsed_data": {"raw_output": "Host is up"}}"#)
                .unwrap();
        let outcome = CommandOutcome::from_response(response);
        assert_eq!(outcome.command_type, CommandType::Scan);
        assert_eq!(
            outcome.parsed,
            Some(ParsedData::Raw(RawText { raw_output: "Host is up".into() }))
        );

        let response: CommandResponse =
            serde_json::from_str(r#"{"command": "uptime", "command_type": "weird"}"#).unwrap();
        assert_eq!(response.command_type, Some(CommandType::Other));
    }

    #[test]
    fn test_batch_combined_output() {
        let response = BatchResponse {
            count: 2,
            results: vec![
                BatchResult {
                    target: "a.example".into(),
                    command: "traceroute a.example".into(),
                    returncode: Some(0),
                    raw_stdout: Some("1  gw (10.0.0.1)  1 ms".into()),
                    ..Default::default()
                },
                BatchResult {
                    target: "b.example".into(),
                    command: "traceroute b.example".into(),
                    returncode: Some(1),
                    raw_stderr: Some("unknown host".into()),
                    ..Default::default()
                },
            ],
        };
        let combined = response.combined_output();
        assert!(combined.starts_with("=== [1/2] a.example — traceroute a.example (code 0) ===\n1  gw"));
        assert!(combined.ends_with("=== [2/2] b.example — traceroute b.example (code 1) ===\nunknown host"));
        assert!(response.single_run().is_none());
    }

    #[test]
    fn test_batch_result_with_null_hops() {
        let response: BatchResponse = serde_json::from_str(
            r#"{"count": 1, "results": [{"target": "x", "command": "traceroute x", "returncode": 2, "raw_stdout": "", "raw_stderr": "Name or service not known", "hops": null}]}"#,
        )
        .expect("Failed to deserialize batch");
        assert!(response.results[0].hops.is_empty());
        assert!(response.single_run().is_none());

        let response: BatchResponse = serde_json::from_str(
            r#"{"count": 1, "results": [{"target": "x", "command": "traceroute x", "hops": [{"hop": "1", "ip": "10.0.0.1", "hostname": "gw", "rtt1": "1"}, "garbage"]}]}"#,
        )
        .expect("Failed to deserialize batch");
        assert_eq!(response.results[0].hops.len(), 2);
        assert!(response.single_run().is_some());
    }
}
