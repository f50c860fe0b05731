//! Fire-and-forget client with a response listener.

use std::sync::Arc;

use prost::Message as _;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::error::SdkError;
use crate::relay::Reader;

use super::base::BaseClient;

/// Callback invoked with each verified response payload.
///
/// Runs synchronously on the receive task; offload long-running work.
pub type ResponseHandler =
    Box<dyn Fn(Vec<u8>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// Client that publishes requests and delivers every decoded response to a
/// user-supplied listener instead of correlating them.
pub struct AsyncClient {
    base: Arc<BaseClient>,
}

impl AsyncClient {
    pub(crate) fn start(
        base: BaseClient,
        mut reader: Reader,
        cancel: CancellationToken,
        listener: ResponseHandler,
    ) -> Self {
        let client = Self {
            base: Arc::new(base),
        };

        let base = Arc::clone(&client.base);
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

                // envelope-level failures are recovered locally: log and
                // drop, the listener only ever sees verified payloads
                match base.handle_response(&env).await {
                    Ok(output) => {
                        if let Err(e) = listener(output) {
                            tracing::error!("error while performing listener action: {e}");
                        }
                    }
                    Err(e) => tracing::error!("error while reading response: {e}"),
                }
            }
        });

        client
    }

    /// Build, sign and enqueue a request; returns once the envelope is on
    /// the writer channel.
    pub async fn send<T>(
        &self,
        cancel: &CancellationToken,
        twin: u32,
        command: &str,
        data: &T,
    ) -> Result<(), SdkError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(data)?;
        let request = self
            .base
            .make_request(twin, command, payload, self.base.ttl)
            .await?;
        self.base.push(cancel, request.encode_to_vec()).await
    }
}
