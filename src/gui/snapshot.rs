use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::render::view_state::{ActiveView, ViewState, clamp_zoom};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot: {0}")]
    Format(#[from] serde_json::Error),
}

/// Session state that survives a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    #[serde(default)]
    pub last_command: String,
    #[serde(default = "default_zoom", alias = "zoomLevel")]
    pub zoom_scale: f32,
    #[serde(default, alias = "currentView")]
    pub active_view: ActiveView,
    #[serde(default)]
    pub timestamp: String,
}

fn default_zoom() -> f32 {
    1.0
}

impl ClientSnapshot {
    pub fn capture(last_command: &str, view_state: &ViewState, at: SystemTime) -> Self {
        Self {
            last_command: last_command.to_string(),
            zoom_scale: view_state.zoom_scale,
            active_view: view_state.active_view,
            timestamp: humantime::format_rfc3339_millis(at).to_string(),
        }
    }

    /// The view state this snapshot describes, with the zoom brought back into range.
    pub fn view_state(&self) -> ViewState {
        ViewState {
            zoom_scale: clamp_zoom(self.zoom_scale),
            active_view: self.active_view,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_error = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_error)?;
        debug!(path = %path.display(), "saved session snapshot");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Startup restore: a missing or unreadable snapshot yields `None`.
    pub fn restore(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match Self::load(path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "ignoring saved session");
                None
            }
        }
    }
}
