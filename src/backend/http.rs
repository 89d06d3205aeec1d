use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    backend::{BackendError, BackendResult, DiagnosticsBackend, NetworkInfo},
    network::{
        command::{BatchRequest, BatchResponse, CommandResponse},
        history::{HistoryEnvelope, HistoryItem},
        hop::{TimeoutSentinel, TracerouteRun},
    },
    paths::path_tree::{PathTree, PathsEnvelope},
};

/// Talks to the diagnostics web service over its JSON API.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    sentinel: TimeoutSentinel,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, sentinel: TimeoutSentinel) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sentinel,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> BackendResult<T> {
        debug!(path, "GET");
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> BackendResult<T>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(resp).await
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    warn!(error = %e, "backend request failed");
    BackendError::Transport(e.to_string())
}

async fn decode<T: DeserializeOwned>(resp: Response) -> BackendResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = error_message(status.as_u16(), status.canonical_reason(), &body);
        warn!(code = status.as_u16(), %message, "backend returned an error");
        return Err(BackendError::Status {
            code: status.as_u16(),
            message,
        });
    }
    resp.json::<T>().await.map_err(|e| {
        warn!(error = %e, "failed to decode backend response");
        BackendError::Decode(e.to_string())
    })
}

/// The `error` field of a JSON error body, else the status line.
fn error_message(code: u16, reason: Option<&str>, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) if !error.trim().is_empty() => error,
        _ => format!("HTTP {} {}", code, reason.unwrap_or("")).trim_end().to_string(),
    }
}

#[async_trait]
impl DiagnosticsBackend for HttpBackend {
    async fn run_command(&self, command: &str) -> BackendResult<CommandResponse> {
        self.post("/api/run_command", &serde_json::json!({ "command": command }))
            .await
    }

    async fn batch_traceroute(&self, request: &BatchRequest) -> BackendResult<BatchResponse> {
        self.post("/api/batch_traceroute", request).await
    }

    async fn list_history(&self) -> BackendResult<Vec<HistoryItem>> {
        let envelope: HistoryEnvelope = self.get("/api/history").await?;
        Ok(envelope.history)
    }

    async fn get_history_item(&self, id: i64) -> BackendResult<TracerouteRun> {
        let mut run: TracerouteRun = self.get(&format!("/api/history/{id}")).await?;
        run.hops = run
            .hops
            .into_iter()
            .map(|hop| hop.normalize_stored(&self.sentinel))
            .collect();
        Ok(run)
    }

    async fn delete_history_item(&self, id: i64) -> BackendResult<()> {
        debug!(id, "DELETE history item");
        let resp = self
            .client
            .delete(self.url(&format!("/api/history/{id}")))
            .send()
            .await
            .map_err(transport_error)?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }

    async fn clear_history(&self) -> BackendResult<()> {
        let _: serde_json::Value = self.post("/api/clear_history", &serde_json::json!({})).await?;
        Ok(())
    }

    async fn list_paths(&self) -> BackendResult<PathTree> {
        let envelope: PathsEnvelope = self.get("/api/paths").await?;
        Ok(PathTree::from_raw(envelope.paths))
    }

    async fn network_info(&self) -> BackendResult<NetworkInfo> {
        self.get("/api/network_info").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_backend_text() {
        assert_eq!(
            error_message(403, Some("Forbidden"), r#"{"error": "Command not allowed", "allowed_commands": ["ping"]}"#),
            "Command not allowed"
        );
        assert_eq!(error_message(502, Some("Bad Gateway"), "<html>"), "HTTP 502 Bad Gateway");
        assert_eq!(error_message(599, None, ""), "HTTP 599");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let backend = HttpBackend::new(
            "http://127.0.0.1:5000/",
            Duration::from_secs(5),
            TimeoutSentinel::default(),
        )
        .expect("Failed to build client");
        assert_eq!(backend.url("/api/paths"), "http://127.0.0.1:5000/api/paths");
    }
}
