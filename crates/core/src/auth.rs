use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::store;

/// Credential plus the base URL it was issued against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(rename = "apiBaseUrl")]
    pub api_base_url: String,
}

/// Supplies bearer tokens to the session controller. The controller only
/// ever calls `get_token`; the setters belong to the auth surface.
#[async_trait]
pub trait TokenGateway: Send + Sync {
    async fn get_token(&self) -> Option<String>;
    async fn set_token(&self, token: String, api_base_url: String);
    async fn clear_token(&self);
}

enum StoreCommand {
    Set(StoredToken),
    Clear,
    Get(oneshot::Sender<Option<StoredToken>>),
}

/// Two-tier token storage: a process-local cache for fast reads and a
/// persisted tier owned by a store task, reached over a message channel so
/// foreground and background observers converge on the same credential
/// without sharing memory. Failures to sync the persisted tier are logged
/// and the local tier keeps serving.
pub struct SyncedTokenGateway {
    local: RwLock<Option<StoredToken>>,
    store_tx: mpsc::UnboundedSender<StoreCommand>,
}

impl SyncedTokenGateway {
    /// Requires a running tokio runtime (the store task is spawned here).
    pub fn new() -> Self {
        Self::with_store_path(store::token_path())
    }

    pub fn with_store_path(path: PathBuf) -> Self {
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_store(path, store_rx));
        Self {
            local: RwLock::new(None),
            store_tx,
        }
    }

    async fn global_token(&self) -> Option<StoredToken> {
        let (tx, rx) = oneshot::channel();
        if self.store_tx.send(StoreCommand::Get(tx)).is_err() {
            tracing::warn!("token store task is gone, serving local tier only");
            return None;
        }
        rx.await.ok().flatten()
    }
}

#[async_trait]
impl TokenGateway for SyncedTokenGateway {
    async fn get_token(&self) -> Option<String> {
        if let Some(stored) = self.local.read().await.as_ref() {
            return Some(stored.token.clone());
        }

        // Cold start: pull from the persisted tier and backfill the cache.
        let stored = self.global_token().await?;
        let token = stored.token.clone();
        *self.local.write().await = Some(stored);
        Some(token)
    }

    async fn set_token(&self, token: String, api_base_url: String) {
        let stored = StoredToken {
            token,
            api_base_url,
        };
        *self.local.write().await = Some(stored.clone());
        if self.store_tx.send(StoreCommand::Set(stored)).is_err() {
            tracing::warn!("failed to sync token to the persisted tier");
        }
    }

    async fn clear_token(&self) {
        *self.local.write().await = None;
        if self.store_tx.send(StoreCommand::Clear).is_err() {
            tracing::warn!("failed to clear token in the persisted tier");
        }
    }
}

/// Owns the persisted tier. All file errors are non-fatal.
async fn run_store(path: PathBuf, mut rx: mpsc::UnboundedReceiver<StoreCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            StoreCommand::Set(stored) => {
                if let Some(parent) = path.parent() {
                    let _ = tokio::fs::create_dir_all(parent).await;
                }
                match serde_json::to_string(&stored) {
                    Ok(json) => {
                        if let Err(e) = tokio::fs::write(&path, json).await {
                            tracing::warn!(error = %e, "could not persist token");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "could not serialize token"),
                }
            }
            StoreCommand::Clear => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(error = %e, "could not remove persisted token");
                    }
                }
            }
            StoreCommand::Get(reply) => {
                let stored = match tokio::fs::read_to_string(&path).await {
                    Ok(json) => serde_json::from_str::<StoredToken>(&json).ok(),
                    Err(_) => None,
                };
                let _ = reply.send(stored);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> PathBuf {
        std::env::temp_dir()
            .join("comlens-test")
            .join(format!("token-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let gateway = SyncedTokenGateway::with_store_path(temp_store());
        assert_eq!(gateway.get_token().await, None);
        gateway
            .set_token("tok_123".to_string(), "https://api.example".to_string())
            .await;
        assert_eq!(gateway.get_token().await, Some("tok_123".to_string()));
    }

    #[tokio::test]
    async fn persisted_tier_is_visible_to_a_fresh_gateway() {
        let path = temp_store();
        let writer = SyncedTokenGateway::with_store_path(path.clone());
        writer
            .set_token("tok_shared".to_string(), "https://api.example".to_string())
            .await;
        // Let the store task flush the write.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let reader = SyncedTokenGateway::with_store_path(path);
        assert_eq!(reader.get_token().await, Some("tok_shared".to_string()));
    }

    #[tokio::test]
    async fn clear_removes_both_tiers() {
        let path = temp_store();
        let gateway = SyncedTokenGateway::with_store_path(path.clone());
        gateway
            .set_token("tok_gone".to_string(), "https://api.example".to_string())
            .await;
        gateway.clear_token().await;
        assert_eq!(gateway.get_token().await, None);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let fresh = SyncedTokenGateway::with_store_path(path);
        assert_eq!(fresh.get_token().await, None);
    }

    #[tokio::test]
    async fn unwritable_store_is_non_fatal() {
        // A directory path cannot be written as a file; the local tier
        // still serves.
        let gateway = SyncedTokenGateway::with_store_path(std::env::temp_dir());
        gateway
            .set_token("tok_local".to_string(), "https://api.example".to_string())
            .await;
        assert_eq!(gateway.get_token().await, Some("tok_local".to_string()));
    }
}
