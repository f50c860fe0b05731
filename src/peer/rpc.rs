//! Peer-mediated synchronous RPC client.
//!
//! A colocated relay-peer daemon does the signing, encryption and relay
//! plumbing; this client only correlates requests to responses through a
//! per-call reply queue on the local broker.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::envelope::{DEFAULT_SCHEMA, DEFAULT_TTL};
use crate::error::{EnvelopeError, RemoteError, SdkError};
use crate::peer::broker::{Broker, RedisBroker};
use crate::peer::wire::{self, IncomingResponse, Request};

/// How long a single reply-queue poll blocks before re-checking
/// cancellation.
const POLL_TIMEOUT_SECS: u64 = 5;

/// RPC client talking to the local relay-peer daemon.
pub struct RpcClient {
    broker: Arc<dyn Broker>,
    ttl: Duration,
}

impl RpcClient {
    /// Connect to the redis instance shared with the relay-peer daemon.
    pub async fn connect(redis_address: &str) -> Result<Self, SdkError> {
        let broker = RedisBroker::connect(redis_address).await?;
        Ok(Self::with_broker(Arc::new(broker)))
    }

    /// Build the client over an existing broker.
    pub fn with_broker(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set the per-call deadline, which is also sent as the request's
    /// expiration.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Call `command` on the given twin and decode its JSON reply.
    ///
    /// Blocks until the reply arrives, the ttl expires, or `cancel` fires
    /// (observed within one polling interval).
    pub async fn call<T, R>(
        &self,
        cancel: &CancellationToken,
        twin: u32,
        command: &str,
        data: &T,
    ) -> Result<R, SdkError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(data)?;
        let reply_to = Uuid::new_v4().to_string();

        let request = Request {
            version: 1,
            reference: String::new(),
            command: command.into(),
            expiration: self.ttl.as_secs(),
            data: BASE64.encode(payload),
            destinations: vec![twin],
            reply_to: reply_to.clone(),
            schema: DEFAULT_SCHEMA.into(),
            epoch: chrono::Utc::now().timestamp(),
        };

        self.broker
            .rpush(wire::SYSTEM_LOCAL_QUEUE, serde_json::to_vec(&request)?)
            .await?;

        let response = self.wait_for_reply(cancel, &reply_to).await?;

        if let Some(error) = response.error {
            return Err(RemoteError {
                code: error.code,
                message: error.message,
            }
            .into());
        }

        if response.schema != DEFAULT_SCHEMA {
            return Err(EnvelopeError::SchemaMismatch {
                got: response.schema,
                want: DEFAULT_SCHEMA.into(),
            }
            .into());
        }

        if response.data.is_empty() {
            return Err(SdkError::Other("no response body was returned".into()));
        }

        let body = BASE64
            .decode(&response.data)
            .map_err(|e| SdkError::Other(format!("invalid data body encoding: {e}")))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn wait_for_reply(
        &self,
        cancel: &CancellationToken,
        reply_to: &str,
    ) -> Result<IncomingResponse, SdkError> {
        let deadline = tokio::time::Instant::now() + self.ttl;
        let queues = vec![reply_to.to_string()];
        let mut consumer = self.broker.consumer().await?;

        loop {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(SdkError::DeadlineExceeded);
            }

            // block at most one polling interval, never past the deadline
            let poll = POLL_TIMEOUT_SECS.min(remaining.as_secs().max(1));
            let popped = tokio::select! {
                _ = cancel.cancelled() => return Err(SdkError::Cancelled),
                result = consumer.blpop(&queues, poll) => result?,
            };

            if let Some((_, raw)) = popped {
                return Ok(serde_json::from_slice(&raw)?);
            }
            // timeout, just try again immediately
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::broker::mem::MemBroker;
    use crate::peer::wire::{ErrorBody, OutgoingResponse};

    /// A fake relay-peer daemon: answers the next request on the system
    /// queue using `respond`.
    async fn answer_next<F>(broker: MemBroker, respond: F)
    where
        F: FnOnce(Request) -> OutgoingResponse + Send + 'static,
    {
        let mut consumer = broker.consumer().await.unwrap();
        let queues = vec![wire::SYSTEM_LOCAL_QUEUE.to_string()];
        let (_, raw) = consumer.blpop(&queues, 5).await.unwrap().unwrap();
        let request: Request = serde_json::from_slice(&raw).unwrap();
        let reply_to = request.reply_to.clone();
        let response = respond(request);
        broker
            .lpush(&reply_to, serde_json::to_vec(&response).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn call_decodes_reply() {
        let broker = MemBroker::new();
        let client = RpcClient::with_broker(Arc::new(broker.clone()));

        tokio::spawn(answer_next(broker.clone(), |request| {
            assert_eq!(request.command, "calculator.add");
            assert_eq!(request.destinations, vec![7]);
            let payload: Vec<f64> =
                serde_json::from_slice(&BASE64.decode(&request.data).unwrap()).unwrap();
            let sum: f64 = payload.iter().sum();
            OutgoingResponse {
                version: request.version,
                reference: request.reference,
                data: BASE64.encode(serde_json::to_vec(&sum).unwrap()),
                destination: "42".into(),
                schema: DEFAULT_SCHEMA.into(),
                epoch: 0,
                error: None,
            }
        }));

        let cancel = CancellationToken::new();
        let out: f64 = client
            .call(&cancel, 7, "calculator.add", &[10.0, 20.0])
            .await
            .unwrap();
        assert_eq!(out, 30.0);
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let broker = MemBroker::new();
        let client = RpcClient::with_broker(Arc::new(broker.clone()));

        tokio::spawn(answer_next(broker.clone(), |request| OutgoingResponse {
            version: request.version,
            reference: request.reference,
            destination: "42".into(),
            schema: DEFAULT_SCHEMA.into(),
            error: Some(ErrorBody {
                code: 255,
                message: "function not found".into(),
            }),
            ..Default::default()
        }));

        let cancel = CancellationToken::new();
        let result: Result<f64, _> = client.call(&cancel, 7, "no.such.cmd", &()).await;
        match result {
            Err(SdkError::Remote(remote)) => {
                assert_eq!(remote.code, 255);
                assert_eq!(remote.message, "function not found");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn schema_mismatch_is_rejected() {
        let broker = MemBroker::new();
        let client = RpcClient::with_broker(Arc::new(broker.clone()));

        tokio::spawn(answer_next(broker.clone(), |request| OutgoingResponse {
            reference: request.reference,
            data: BASE64.encode(b"30"),
            schema: "text/plain".into(),
            ..Default::default()
        }));

        let cancel = CancellationToken::new();
        let result: Result<f64, _> = client.call(&cancel, 7, "calculator.add", &()).await;
        assert!(matches!(
            result,
            Err(SdkError::Envelope(EnvelopeError::SchemaMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn cancellation_unblocks_within_poll_interval() {
        let broker = MemBroker::new();
        let client = RpcClient::with_broker(Arc::new(broker));

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let result: Result<f64, _> = client.call(&cancel, 7, "never.answered", &()).await;
        assert!(matches!(result, Err(SdkError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(POLL_TIMEOUT_SECS + 1));
    }

    #[tokio::test]
    async fn ttl_expiry_gives_deadline_exceeded() {
        let broker = MemBroker::new();
        let client =
            RpcClient::with_broker(Arc::new(broker)).with_ttl(Duration::from_millis(200));

        let cancel = CancellationToken::new();
        let result: Result<f64, _> = client.call(&cancel, 7, "never.answered", &()).await;
        assert!(matches!(result, Err(SdkError::DeadlineExceeded)));
    }
}
