//! # RMB SDK
//!
//! A Rust SDK for the Reliable Message Bus (RMB) — the authenticated,
//! end-to-end encryptable request/response layer grid twins use to talk to
//! each other through a relay.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Identity** — mnemonic-derived signing keys (ed25519/sr25519) and the
//!    secp256k1 key used for end-to-end encryption
//! 2. **Twin directory** — resolving twin ids to their on-chain records
//! 3. **Envelope codec** — challenge construction, signatures, AES-GCM
//!    payload encryption, and the frozen protobuf wire format
//! 4. **Relay transport** — a persistent websocket connection with
//!    authenticated handshake and reconnection
//! 5. **Dispatchers** — the peer-mediated [`peer::RpcClient`] and
//!    [`peer::Router`] over a local broker, and the [`direct::DirectClient`]
//!    / [`direct::AsyncClient`] that speak the relay protocol themselves
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use rmb_sdk::prelude::*;
//!
//! let cancel = CancellationToken::new();
//! let client = ClientBuilder::new(mnemonic, KeyType::Sr25519)
//!     .relay_url("wss://relay.grid.tf")
//!     .enable_encryption(true)
//!     .connect(&cancel)
//!     .await?;
//!
//! let version: String = client.call(&cancel, 7, "zos.system.version", &()).await?;
//! ```

// ── Layer 1: Identity ────────────────────────────────────────────────────────

/// Signing identities, signature/verifier sum types, SS58 addresses.
pub mod identity;

/// Unified SDK error types.
pub mod error;

/// Known relay/proxy endpoints per grid network.
pub mod network;

// ── Layer 2: Twin directory ──────────────────────────────────────────────────

/// Twin records and the chain-backed directory.
pub mod twin;

// ── Layer 3: Envelope codec ──────────────────────────────────────────────────

/// Envelope wire format, challenge, signatures, payload encryption.
pub mod envelope;

// ── Layer 4: Relay transport ─────────────────────────────────────────────────

/// The persistent relay connection and its auth token.
pub mod relay;

// ── Layer 5: Dispatchers ─────────────────────────────────────────────────────

/// Peer-mediated RPC client and server router over a local broker.
pub mod peer;

/// Clients that talk to the relay directly.
pub mod direct;

/// High-level client construction.
pub mod client;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    pub use tokio_util::sync::CancellationToken;

    // Identity
    pub use crate::identity::{Identity, KeyType, Signature, Verifier};

    // Errors
    pub use crate::error::{
        BrokerError, DirectoryError, EnvelopeError, HandlerError, IdentityError, RemoteError,
        SdkError, WsError,
    };

    // Twin directory
    pub use crate::twin::{CachedTwinDb, InMemoryTwinDb, ProxyTwinDb, Twin, TwinDb};

    // Envelope
    pub use crate::envelope::{Address, Envelope, MessageKind, Payload, DEFAULT_SCHEMA, DEFAULT_TTL};

    // Transport
    pub use crate::relay::{Connection, Reader, Writer};

    // Dispatchers
    pub use crate::direct::{AsyncClient, DirectClient, ResponseHandler};
    pub use crate::peer::{
        logger_middleware, Broker, RedisBroker, RequestCtx, Router, RpcClient, SubRouter,
    };

    // Construction
    pub use crate::client::ClientBuilder;

    // Network
    pub use crate::network::{DEV_RELAY_URL, MAIN_RELAY_URL, QA_RELAY_URL, TEST_RELAY_URL};
}
