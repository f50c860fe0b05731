//! JSON records exchanged with the relay-peer daemon over the local broker.
//!
//! Field names are the daemon's contract (`ver`, `ref`, `cmd`, …); `dat`
//! always carries base64-encoded JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Well-known outbound queue the relay-peer daemon consumes.
pub const SYSTEM_LOCAL_QUEUE: &str = "msgbus.system.local";

/// Prefix under which servers receive their topics (`msgbus.<topic>`).
pub const TOPIC_QUEUE_PREFIX: &str = "msgbus.";

/// An outgoing request pushed to [`SYSTEM_LOCAL_QUEUE`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Request {
    #[serde(rename = "ver")]
    pub version: u32,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "exp")]
    pub expiration: u64,
    #[serde(rename = "dat")]
    pub data: String,
    #[serde(rename = "dst")]
    pub destinations: Vec<u32>,
    #[serde(rename = "ret")]
    pub reply_to: String,
    #[serde(rename = "shm")]
    pub schema: String,
    #[serde(rename = "now")]
    pub epoch: i64,
}

/// An inbound request a server pulls from its `msgbus.<topic>` queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Incoming {
    #[serde(rename = "ver")]
    pub version: u32,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "exp")]
    pub expiration: u64,
    #[serde(rename = "dat")]
    pub data: String,
    #[serde(rename = "src")]
    pub source: String,
    #[serde(rename = "ret")]
    pub reply_to: String,
    #[serde(rename = "shm")]
    pub schema: String,
    #[serde(rename = "now")]
    pub epoch: i64,
}

/// The error body mirrored between responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

/// A response a server pushes to the caller's reply queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutgoingResponse {
    #[serde(rename = "ver")]
    pub version: u32,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "dat")]
    pub data: String,
    #[serde(rename = "dst")]
    pub destination: String,
    #[serde(rename = "shm")]
    pub schema: String,
    #[serde(rename = "now")]
    pub epoch: i64,
    #[serde(rename = "err", skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// A response popped from the caller's reply queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IncomingResponse {
    #[serde(rename = "ver")]
    pub version: u32,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "dat")]
    pub data: String,
    #[serde(rename = "src", default)]
    pub source: String,
    #[serde(rename = "shm")]
    pub schema: String,
    #[serde(rename = "now")]
    pub epoch: i64,
    #[serde(rename = "err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Incoming {
    /// The base64-decoded payload.
    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }

    /// The source twin id, parsed from the `src` field
    /// (`"<twin>"` or `"<twin>:<connection>"`).
    ///
    /// An unparseable source is logged and treated as twin 0, matching the
    /// daemon's tolerance for malformed peers.
    pub fn source_twin(&self) -> u32 {
        let twin = self
            .source
            .split(':')
            .next()
            .and_then(|part| part.parse().ok());
        match twin {
            Some(twin) => twin,
            None => {
                tracing::error!(src = %self.source, "failed to extract twin source from message");
                0
            }
        }
    }
}
