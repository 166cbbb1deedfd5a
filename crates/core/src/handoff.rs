use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::store;

/// Analysis request handed off across a UI boundary: a trigger surface
/// writes it, the surface owning the controller consumes it on startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnalysis {
    #[serde(rename = "videoId")]
    pub video_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub timestamp: u64,
}

impl PendingAnalysis {
    pub fn new(video_id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

pub async fn save_pending(pending: &PendingAnalysis) -> std::io::Result<()> {
    save_pending_at(&store::pending_path(), pending).await
}

/// Read and remove the pending record so it triggers at most once.
pub async fn take_pending() -> Option<PendingAnalysis> {
    take_pending_at(&store::pending_path()).await
}

pub async fn clear_pending() {
    let _ = tokio::fs::remove_file(store::pending_path()).await;
}

pub async fn save_pending_at(path: &Path, pending: &PendingAnalysis) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string(pending).map_err(std::io::Error::other)?;
    tokio::fs::write(path, json).await
}

pub async fn take_pending_at(path: &Path) -> Option<PendingAnalysis> {
    let json = tokio::fs::read_to_string(path).await.ok()?;
    // Remove before acting on it; a record that double-triggers is worse
    // than one that is lost.
    let _ = tokio::fs::remove_file(path).await;

    match serde_json::from_str::<PendingAnalysis>(&json) {
        Ok(pending) => Some(pending),
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed pending-analysis record");
            None
        }
    }
}
