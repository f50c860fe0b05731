//! The twin directory — resolving twin ids to their on-chain records.
//!
//! The directory is read-mostly: the only mutation is a one-shot
//! "publish my relay/e2e key" during client startup (see
//! [`crate::direct::BaseClient`] reconciliation).

mod cache;
mod proxy;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DirectoryError;
use crate::identity::Identity;

pub use cache::CachedTwinDb;
pub use proxy::ProxyTwinDb;

/// A twin's on-chain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twin {
    pub id: u32,
    /// The 32-byte account public key used for signature verification.
    pub public_key: Vec<u8>,
    /// Hostname of the relay the twin is reachable behind, if published.
    pub relay: Option<String>,
    /// The twin's secp256k1 public key for end-to-end encryption; empty
    /// when the twin has not published one.
    pub e2e_key: Vec<u8>,
}

/// Read-through access to twin records, plus the single startup write.
///
/// Implementations must be safe to share across tasks. Callers treat
/// lookup failures as transient and may retry; a verification failure
/// against a cached record should be followed by an invalidating re-fetch
/// (see [`CachedTwinDb::invalidate`]).
#[async_trait]
pub trait TwinDb: Send + Sync {
    /// Fetch the record of the given twin.
    async fn get(&self, id: u32) -> Result<Twin, DirectoryError>;

    /// Resolve which twin id owns the given account public key.
    async fn get_by_public_key(&self, public_key: &[u8]) -> Result<u32, DirectoryError>;

    /// Publish our own relay hostname and e2e public key. `e2e_key` is
    /// empty when encryption is disabled.
    async fn update_self(
        &self,
        identity: &Identity,
        relay: &str,
        e2e_key: &[u8],
    ) -> Result<(), DirectoryError>;
}

/// A static, fully in-memory directory.
///
/// Useful for tests and closed deployments where the set of twins is known
/// up front.
#[derive(Default)]
pub struct InMemoryTwinDb {
    twins: RwLock<HashMap<u32, Twin>>,
}

impl InMemoryTwinDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, twin: Twin) {
        self.twins.write().await.insert(twin.id, twin);
    }
}

#[async_trait]
impl TwinDb for InMemoryTwinDb {
    async fn get(&self, id: u32) -> Result<Twin, DirectoryError> {
        self.twins
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::TwinNotFound(id))
    }

    async fn get_by_public_key(&self, public_key: &[u8]) -> Result<u32, DirectoryError> {
        self.twins
            .read()
            .await
            .values()
            .find(|twin| twin.public_key == public_key)
            .map(|twin| twin.id)
            .ok_or(DirectoryError::TwinNotFoundByKey)
    }

    async fn update_self(
        &self,
        identity: &Identity,
        relay: &str,
        e2e_key: &[u8],
    ) -> Result<(), DirectoryError> {
        let public_key = identity.public_key();
        let mut twins = self.twins.write().await;
        let twin = twins
            .values_mut()
            .find(|twin| twin.public_key == public_key)
            .ok_or(DirectoryError::TwinNotFoundByKey)?;
        twin.relay = Some(relay.to_string());
        twin.e2e_key = e2e_key.to_vec();
        Ok(())
    }
}
