/*!
Export of the current view to a file.

Path trees and history go out as pretty JSON, the main view's raw output as plain text.
File names carry the export date, e.g. `network-paths-2024-05-01.json`.
*/

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{network::history::HistoryItem, paths::path_tree::PathTree};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Paths,
    History,
    Output,
}

impl ExportKind {
    pub fn file_name(&self, at: SystemTime) -> String {
        let date = export_date(at);
        match self {
            ExportKind::Paths => format!("network-paths-{date}.json"),
            ExportKind::History => format!("network-history-{date}.json"),
            ExportKind::Output => format!("network-output-{date}.txt"),
        }
    }
}

/// `YYYY-MM-DD` in UTC.
fn export_date(at: SystemTime) -> String {
    let stamp = humantime::format_rfc3339_seconds(at).to_string();
    stamp.split('T').next().unwrap_or(&stamp).to_string()
}

/// Directory exports land in: the user's downloads folder, else the working directory.
pub fn default_export_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn export_paths(tree: &PathTree, dir: &Path, at: SystemTime) -> Result<PathBuf, ExportError> {
    if tree.is_empty() {
        return Err(ExportError::Empty);
    }
    write_json(tree, dir, ExportKind::Paths.file_name(at))
}

pub fn export_history(items: &[HistoryItem], dir: &Path, at: SystemTime) -> Result<PathBuf, ExportError> {
    if items.is_empty() {
        return Err(ExportError::Empty);
    }
    write_json(&items, dir, ExportKind::History.file_name(at))
}

pub fn export_output(text: &str, dir: &Path, at: SystemTime) -> Result<PathBuf, ExportError> {
    if text.trim().is_empty() {
        return Err(ExportError::Empty);
    }
    write_file(text.as_bytes(), dir, ExportKind::Output.file_name(at))
}

fn write_json<T: Serialize + ?Sized>(value: &T, dir: &Path, name: String) -> Result<PathBuf, ExportError> {
    let json = serde_json::to_string_pretty(value)?;
    write_file(json.as_bytes(), dir, name)
}

fn write_file(bytes: &[u8], dir: &Path, name: String) -> Result<PathBuf, ExportError> {
    let path = dir.join(name);
    fs::write(&path, bytes).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "exported");
    Ok(path)
}
