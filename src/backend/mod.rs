/*!
Access to the diagnostics backend.

This module defines:
- `BackendError`: transport and decoding failures, with the backend's own message when it sent one.
- `DiagnosticsBackend`: an async trait covering command execution, the history store, the
  path aggregate and the backend host's network summary.
- `BackendStatus`: what the last health check said about the backend.

`http::HttpBackend` is the production implementation; the GUI only sees the trait.
*/

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    network::{
        command::{BatchRequest, BatchResponse, CommandResponse},
        history::HistoryItem,
        hop::TracerouteRun,
    },
    paths::path_tree::PathTree,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend could not be reached or the exchange broke off.
    #[error("connection error: {0}")]
    Transport(String),
    /// Non-success status; `message` is the backend's error text when it supplied one.
    #[error("{message}")]
    Status { code: u16, message: String },
    /// A success response whose body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Network summary of the machine the backend runs on. The text fields are raw command
/// output and may be multi-line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    pub hostname: String,
    pub external_ip: String,
    pub default_route: String,
    pub ip_addresses: String,
    pub timestamp: String,
}

/// Backend health as seen by the last network summary request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendStatus {
    #[default]
    Unknown,
    Online(NetworkInfo),
    /// Reachable, but it answered with an error status.
    Degraded(String),
    Offline(String),
}

impl BackendStatus {
    pub fn from_result(result: BackendResult<NetworkInfo>) -> Self {
        match result {
            Ok(info) => Self::Online(info),
            Err(BackendError::Status { message, .. }) => Self::Degraded(message),
            Err(e) => Self::Offline(e.to_string()),
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Self::Unknown => "⏳ Checking...",
            Self::Online(_) => "✅ Working normally",
            Self::Degraded(_) => "⚠️ Connection problems",
            Self::Offline(_) => "❌ Connection error",
        }
    }

    /// The failure text, if the check failed.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Degraded(message) | Self::Offline(message) => Some(message),
            Self::Unknown | Self::Online(_) => None,
        }
    }
}

#[async_trait]
pub trait DiagnosticsBackend: Send + Sync {
    async fn run_command(&self, command: &str) -> BackendResult<CommandResponse>;

    async fn batch_traceroute(&self, request: &BatchRequest) -> BackendResult<BatchResponse>;

    async fn list_history(&self) -> BackendResult<Vec<HistoryItem>>;

    /// A stored traceroute with its hops, timeout markers backfilled.
    async fn get_history_item(&self, id: i64) -> BackendResult<TracerouteRun>;

    async fn delete_history_item(&self, id: i64) -> BackendResult<()>;

    async fn clear_history(&self) -> BackendResult<()>;

    /// The per-target path aggregate, normalized.
    async fn list_paths(&self) -> BackendResult<PathTree>;

    async fn network_info(&self) -> BackendResult<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_network_info_result() {
        let info: NetworkInfo = serde_json::from_str(
            r#"{"hostname": "diag-01", "external_ip": "Unknown", "default_route": "default via 192.168.1.1 dev eth0", "ip_addresses": "IP INFO", "timestamp": "2024-05-01T12:00:00"}"#,
        )
        .expect("Failed to deserialize network info");
        let status = BackendStatus::from_result(Ok(info.clone()));
        assert_eq!(status, BackendStatus::Online(info));
        assert_eq!(status.summary(), "✅ Working normally");
        assert_eq!(status.detail(), None);

        let status = BackendStatus::from_result(Err(BackendError::Status {
            code: 500,
            message: "HTTP 500 Internal Server Error".into(),
        }));
        assert_eq!(status.summary(), "⚠️ Connection problems");
        assert_eq!(status.detail(), Some("HTTP 500 Internal Server Error"));

        let status = BackendStatus::from_result(Err(BackendError::Transport("connection refused".into())));
        assert_eq!(status.summary(), "❌ Connection error");
        assert_eq!(status.detail(), Some("connection error: connection refused"));
    }

    #[test]
    fn test_network_info_tolerates_missing_fields() {
        let info: NetworkInfo = serde_json::from_str(r#"{"hostname": "diag-01"}"#).expect("Failed to deserialize");
        assert_eq!(info.hostname, "diag-01");
        assert!(info.external_ip.is_empty());
    }
}
