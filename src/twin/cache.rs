//! Read-through caching decorator for a [`TwinDb`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DirectoryError;
use crate::identity::Identity;

use super::{Twin, TwinDb};

/// Caches twin records without expiry.
///
/// Records only change when a twin migrates relays or rotates its e2e key,
/// so a non-expiring cache is the default. After a signature verification
/// failure that may be caused by a stale key, call [`invalidate`] and
/// re-fetch.
///
/// [`invalidate`]: CachedTwinDb::invalidate
pub struct CachedTwinDb {
    inner: Arc<dyn TwinDb>,
    cache: RwLock<HashMap<u32, Twin>>,
}

impl CachedTwinDb {
    pub fn new(inner: Arc<dyn TwinDb>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drop the cached record for `id`, forcing the next `get` through to
    /// the backend.
    pub async fn invalidate(&self, id: u32) {
        self.cache.write().await.remove(&id);
    }
}

#[async_trait]
impl TwinDb for CachedTwinDb {
    async fn get(&self, id: u32) -> Result<Twin, DirectoryError> {
        if let Some(twin) = self.cache.read().await.get(&id) {
            return Ok(twin.clone());
        }

        let twin = self.inner.get(id).await?;
        self.cache.write().await.insert(id, twin.clone());
        Ok(twin)
    }

    async fn get_by_public_key(&self, public_key: &[u8]) -> Result<u32, DirectoryError> {
        self.inner.get_by_public_key(public_key).await
    }

    async fn update_self(
        &self,
        identity: &Identity,
        relay: &str,
        e2e_key: &[u8],
    ) -> Result<(), DirectoryError> {
        self.inner.update_self(identity, relay, e2e_key).await?;
        // our own record changed; drop everything rather than track which
        // id it maps to
        self.cache.write().await.clear();
        Ok(())
    }
}
