//! High-level client construction.
//!
//! The builder carries the full client configuration: mnemonic, key type,
//! relay URL, optional session, encryption switch, and the chain
//! connection providing the twin directory. Identity and configuration
//! errors are fatal; nothing partially initializes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::direct::{AsyncClient, BaseClient, DirectClient, ResponseHandler};
use crate::envelope::DEFAULT_TTL;
use crate::error::SdkError;
use crate::identity::{self, Identity, KeyType};
use crate::network;
use crate::relay::Reader;
use crate::twin::{CachedTwinDb, ProxyTwinDb, TwinDb};

/// Builder for the direct relay clients.
pub struct ClientBuilder {
    mnemonic: String,
    key_type: KeyType,
    relay_url: String,
    session: Option<String>,
    enable_encryption: bool,
    twin_db: Option<Arc<dyn TwinDb>>,
    ttl: Duration,
}

impl ClientBuilder {
    pub fn new(mnemonic: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            key_type,
            relay_url: network::MAIN_RELAY_URL.into(),
            session: None,
            enable_encryption: false,
            twin_db: None,
            ttl: DEFAULT_TTL,
        }
    }

    /// The relay to connect to (a `wss://` URL). Defaults to the main
    /// network relay.
    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    /// Name this connection, allowing multiple sessions per twin.
    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Derive an e2e key and encrypt payloads for destinations that
    /// published one.
    pub fn enable_encryption(mut self, enable: bool) -> Self {
        self.enable_encryption = enable;
        self
    }

    /// The chain connection providing the twin directory. Defaults to the
    /// main-network grid proxy behind a read-through cache.
    pub fn twin_db(mut self, twin_db: Arc<dyn TwinDb>) -> Self {
        self.twin_db = Some(twin_db);
        self
    }

    /// Default per-call deadline, also sent as envelope expiration.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn base(self, cancel: &CancellationToken) -> Result<(BaseClient, Reader), SdkError> {
        let identity = Arc::new(Identity::from_mnemonic(self.key_type, &self.mnemonic)?);

        let secure_key = if self.enable_encryption {
            Some(identity::derive_secure_key(&self.mnemonic)?)
        } else {
            None
        };

        let twin_db = self.twin_db.unwrap_or_else(|| {
            Arc::new(CachedTwinDb::new(Arc::new(ProxyTwinDb::new(
                network::main_proxy_url(),
            ))))
        });

        BaseClient::connect(
            identity,
            twin_db,
            &self.relay_url,
            self.session,
            secure_key,
            self.ttl,
            cancel.clone(),
        )
        .await
    }

    /// Connect and return the correlated request/response client.
    pub async fn connect(self, cancel: &CancellationToken) -> Result<DirectClient, SdkError> {
        let (base, reader) = self.base(cancel).await?;
        Ok(DirectClient::start(base, reader, cancel.clone()))
    }

    /// Connect and return the fire-and-forget client; every verified
    /// response is handed to `listener`.
    pub async fn connect_listener(
        self,
        cancel: &CancellationToken,
        listener: ResponseHandler,
    ) -> Result<AsyncClient, SdkError> {
        let (base, reader) = self.base(cancel).await?;
        Ok(AsyncClient::start(base, reader, cancel.clone(), listener))
    }
}
