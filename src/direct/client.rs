//! Correlated request/response client over the relay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, MessageKind, Ping};
use crate::error::SdkError;
use crate::relay::Reader;

use super::base::BaseClient;

/// Client that speaks the relay protocol itself and correlates responses
/// to requests by envelope uid.
///
/// A single background task decodes incoming frames and wakes the waiting
/// caller; envelopes nobody waits for are dropped.
pub struct DirectClient {
    base: Arc<BaseClient>,
    responses: Arc<Mutex<HashMap<String, oneshot::Sender<Envelope>>>>,
}

impl DirectClient {
    pub(crate) fn start(base: BaseClient, mut reader: Reader, cancel: CancellationToken) -> Self {
        let client = Self {
            base: Arc::new(base),
            responses: Arc::new(Mutex::new(HashMap::new())),
        };

        let responses = Arc::clone(&client.responses);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => return,
                    frame = reader.recv() => match frame {
                        Some(frame) => frame,
                        None => return,
                    },
                };

                let env = match Envelope::decode(frame.as_slice()) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::error!("invalid message payload: {e}");
                        continue;
                    }
                };

                if let Some(waiter) = responses.lock().await.remove(&env.uid) {
                    // the waiter may have timed out already; drop then
                    let _ = waiter.send(env);
                }
            }
        });

        client
    }

    /// Call `command` on the given twin and decode its JSON reply.
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
        let request = self
            .base
            .make_request(twin, command, payload, self.base.ttl)
            .await?;

        let response = self.request(cancel, request, self.base.ttl).await?;
        let output = self.base.handle_response(&response).await?;
        Ok(serde_json::from_slice(&output)?)
    }

    /// Application-level ping. The transport already keeps the connection
    /// alive; this is for explicitly probing end-to-end reachability.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), SdkError> {
        let request = Envelope {
            uid: uuid::Uuid::new_v4().to_string(),
            source: Some(self.base.source.clone()),
            message: Some(MessageKind::Ping(Ping {})),
            ..Default::default()
        };

        let response = self.request(cancel, request, self.base.ttl).await?;
        match response.message {
            Some(MessageKind::Pong(_)) => Ok(()),
            _ => Err(SdkError::Other("expected a pong response".into())),
        }
    }

    /// Send an envelope and wait for the correlated reply.
    async fn request(
        &self,
        cancel: &CancellationToken,
        request: Envelope,
        ttl: Duration,
    ) -> Result<Envelope, SdkError> {
        let uid = request.uid.clone();
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.responses.lock().await.insert(uid.clone(), waiter_tx);

        let result = self
            .send_and_wait(cancel, request.encode_to_vec(), waiter_rx, ttl)
            .await;
        if result.is_err() {
            self.responses.lock().await.remove(&uid);
        }
        result
    }

    async fn send_and_wait(
        &self,
        cancel: &CancellationToken,
        frame: Vec<u8>,
        waiter: oneshot::Receiver<Envelope>,
        ttl: Duration,
    ) -> Result<Envelope, SdkError> {
        self.base.push(cancel, frame).await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(SdkError::Cancelled),
            _ = tokio::time::sleep(ttl) => Err(SdkError::DeadlineExceeded),
            response = waiter => {
                response.map_err(|_| SdkError::Other("no response received".into()))
            }
        }
    }
}
