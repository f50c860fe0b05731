//! Shared plumbing for the direct relay clients.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::envelope::{
    self, crypto, Address, Envelope, MessageKind, Payload, Request, DEFAULT_SCHEMA,
};
use crate::error::{EnvelopeError, RemoteError, SdkError, WsError};
use crate::identity::{self, Identity};
use crate::relay::{Connection, Reader, Writer};
use crate::twin::TwinDb;

/// Identity, directory and transport shared by [`super::DirectClient`] and
/// [`super::AsyncClient`].
pub(crate) struct BaseClient {
    pub source: Address,
    pub identity: Arc<Identity>,
    pub twin_db: Arc<dyn TwinDb>,
    pub secure_key: Option<k256::SecretKey>,
    pub writer: Writer,
    pub ttl: Duration,
}

impl BaseClient {
    /// Resolve our own twin, reconcile the on-chain relay/e2e key, and
    /// start the relay connection.
    pub async fn connect(
        identity: Arc<Identity>,
        twin_db: Arc<dyn TwinDb>,
        relay_url: &str,
        session: Option<String>,
        secure_key: Option<k256::SecretKey>,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, Reader), SdkError> {
        let twin_id = twin_db.get_by_public_key(&identity.public_key()).await?;
        let twin = twin_db.get(twin_id).await?;

        let parsed = url::Url::parse(relay_url)
            .map_err(|e| SdkError::Other(format!("failed to parse url '{relay_url}': {e}")))?;
        let hostname = parsed
            .host_str()
            .ok_or_else(|| SdkError::Other(format!("relay url '{relay_url}' has no host")))?
            .to_string();

        let public_key = secure_key
            .as_ref()
            .map(identity::secure_public_key)
            .unwrap_or_default();

        // other twins discover us through this record; publish before the
        // first envelope goes out
        if twin.e2e_key != public_key || twin.relay.as_deref() != Some(hostname.as_str()) {
            tracing::info!("twin relay/public key didn't match, updating on chain ...");
            twin_db
                .update_self(&identity, &hostname, &public_key)
                .await?;
        }

        let source = Address {
            twin: twin_id,
            connection: session.clone(),
        };
        let connection = Connection::new(Arc::clone(&identity), relay_url, session, twin_id);
        let (reader, writer) = connection.start(cancel);

        Ok((
            Self {
                source,
                identity,
                twin_db,
                secure_key,
                writer,
                ttl,
            },
            reader,
        ))
    }

    /// Build and sign a request envelope for `twin`.
    ///
    /// The payload is encrypted when the destination advertises an e2e key
    /// and encryption is enabled locally; plain otherwise.
    pub async fn make_request(
        &self,
        twin: u32,
        command: &str,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> Result<Envelope, SdkError> {
        let destination = self.twin_db.get(twin).await?;

        let mut env = Envelope {
            uid: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
            expiration: ttl.as_secs(),
            source: Some(self.source.clone()),
            destination: Some(Address {
                twin,
                connection: None,
            }),
            message: Some(MessageKind::Request(Request {
                command: command.into(),
            })),
            schema: Some(DEFAULT_SCHEMA.into()),
            federation: destination.relay.clone(),
            ..Default::default()
        };

        env.payload = match &self.secure_key {
            Some(secret) if !destination.e2e_key.is_empty() => Some(Payload::Cipher(
                crypto::encrypt(secret, &destination.e2e_key, &payload)?,
            )),
            _ => Some(Payload::Plain(payload)),
        };

        envelope::sign(&mut env, &self.identity);
        Ok(env)
    }

    /// Validate a received envelope and extract its payload.
    pub async fn handle_response(&self, env: &Envelope) -> Result<Vec<u8>, SdkError> {
        let Some(source) = env.source.as_ref() else {
            // an envelope with no source twin can only be the relay
            // reporting a framing error
            if let Some(error) = env.error() {
                return Err(EnvelopeError::Relay(error.message.clone()).into());
            }
            return Err(EnvelopeError::Malformed("received an invalid envelope".into()).into());
        };

        envelope::verify_signature(self.twin_db.as_ref(), env).await?;

        if let Some(error) = env.error() {
            return Err(RemoteError {
                code: error.code,
                message: error.message.clone(),
            }
            .into());
        }

        if env.response().is_none() {
            return Err(EnvelopeError::UnexpectedKind.into());
        }

        if env.schema.as_deref() != Some(DEFAULT_SCHEMA) {
            return Err(EnvelopeError::SchemaMismatch {
                got: env.schema.clone().unwrap_or_default(),
                want: DEFAULT_SCHEMA.into(),
            }
            .into());
        }

        match &env.payload {
            Some(Payload::Cipher(cipher)) => {
                let twin = self.twin_db.get(source.twin).await?;
                if twin.e2e_key.is_empty() {
                    return Err(EnvelopeError::BadCipher("bad twin pk".into()).into());
                }
                let Some(secret) = &self.secure_key else {
                    return Err(
                        EnvelopeError::BadCipher("encryption is not enabled".into()).into()
                    );
                };
                Ok(crypto::decrypt(secret, &twin.e2e_key, cipher)?)
            }
            Some(Payload::Plain(plain)) => Ok(plain.clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Enqueue an encoded envelope on the relay connection.
    pub async fn push(&self, cancel: &CancellationToken, frame: Vec<u8>) -> Result<(), SdkError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SdkError::Cancelled),
            sent = self.writer.send(frame) => sent.map_err(|_| WsError::Disconnected.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{derive_secure_key, secure_public_key, KeyType};
    use crate::twin::{InMemoryTwinDb, Twin};
    use tokio::sync::mpsc;

    const ALICE: &str =
        "garage dad improve reunion girl saddle theory know label reason fantasy deputy";
    const BOB: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    struct Peer {
        identity: Arc<Identity>,
        secure_key: k256::SecretKey,
    }

    fn peer(mnemonic: &str) -> Peer {
        Peer {
            identity: Arc::new(Identity::from_mnemonic(KeyType::Sr25519, mnemonic).unwrap()),
            secure_key: derive_secure_key(mnemonic).unwrap(),
        }
    }

    fn base_for(
        peer: &Peer,
        twin: u32,
        twin_db: Arc<InMemoryTwinDb>,
        encrypted: bool,
    ) -> BaseClient {
        let (writer, _reader) = mpsc::channel(8);
        BaseClient {
            source: Address {
                twin,
                connection: None,
            },
            identity: Arc::clone(&peer.identity),
            twin_db,
            secure_key: encrypted.then(|| peer.secure_key.clone()),
            writer,
            ttl: Duration::from_secs(300),
        }
    }

    async fn twin_of(peer: &Peer, id: u32, publish_e2e: bool) -> Twin {
        Twin {
            id,
            public_key: peer.identity.public_key().to_vec(),
            relay: Some("relay.grid.tf".into()),
            e2e_key: if publish_e2e {
                secure_public_key(&peer.secure_key)
            } else {
                Vec::new()
            },
        }
    }

    #[tokio::test]
    async fn make_request_encrypts_when_destination_has_key() {
        let alice = peer(ALICE);
        let bob = peer(BOB);

        let db = Arc::new(InMemoryTwinDb::new());
        db.insert(twin_of(&alice, 1171, true).await).await;
        db.insert(twin_of(&bob, 10, true).await).await;

        let base = base_for(&alice, 1171, Arc::clone(&db), true);
        let env = base
            .make_request(10, "cmd", b"my data".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(env.cipher().is_some());
        assert_eq!(env.federation.as_deref(), Some("relay.grid.tf"));
        envelope::verify_signature(db.as_ref(), &env).await.unwrap();
    }

    #[tokio::test]
    async fn make_request_falls_back_to_plain() {
        let alice = peer(ALICE);
        let bob = peer(BOB);

        let db = Arc::new(InMemoryTwinDb::new());
        db.insert(twin_of(&alice, 1171, true).await).await;
        db.insert(twin_of(&bob, 10, false).await).await;

        let base = base_for(&alice, 1171, Arc::clone(&db), true);
        let env = base
            .make_request(10, "cmd", b"my data".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(env.plain(), Some(&b"my data"[..]));
    }

    #[tokio::test]
    async fn response_round_trip_encrypted() {
        let alice = peer(ALICE);
        let bob = peer(BOB);

        let db = Arc::new(InMemoryTwinDb::new());
        db.insert(twin_of(&alice, 1171, true).await).await;
        db.insert(twin_of(&bob, 10, true).await).await;

        // bob answers alice with an encrypted response envelope
        let mut response = Envelope {
            uid: "resp-1".into(),
            timestamp: chrono::Utc::now().timestamp() as u64,
            expiration: 300,
            source: Some(Address {
                twin: 10,
                connection: None,
            }),
            destination: Some(Address {
                twin: 1171,
                connection: None,
            }),
            message: Some(MessageKind::Response(Default::default())),
            schema: Some(DEFAULT_SCHEMA.into()),
            payload: Some(Payload::Cipher(
                crypto::encrypt(
                    &bob.secure_key,
                    &secure_public_key(&alice.secure_key),
                    b"\"pong\"",
                )
                .unwrap(),
            )),
            ..Default::default()
        };
        envelope::sign(&mut response, &bob.identity);

        let base = base_for(&alice, 1171, Arc::clone(&db), true);
        let output = base.handle_response(&response).await.unwrap();
        assert_eq!(output, b"\"pong\"");
    }

    #[tokio::test]
    async fn cipher_from_twin_without_key_is_rejected() {
        let alice = peer(ALICE);
        let bob = peer(BOB);

        let db = Arc::new(InMemoryTwinDb::new());
        db.insert(twin_of(&alice, 1171, true).await).await;
        // bob's record has no published e2e key
        db.insert(twin_of(&bob, 10, false).await).await;

        let mut response = Envelope {
            uid: "resp-1".into(),
            timestamp: chrono::Utc::now().timestamp() as u64,
            expiration: 300,
            source: Some(Address {
                twin: 10,
                connection: None,
            }),
            destination: Some(Address {
                twin: 1171,
                connection: None,
            }),
            message: Some(MessageKind::Response(Default::default())),
            schema: Some(DEFAULT_SCHEMA.into()),
            payload: Some(Payload::Cipher(vec![0u8; 40])),
            ..Default::default()
        };
        envelope::sign(&mut response, &bob.identity);

        let base = base_for(&alice, 1171, Arc::clone(&db), true);
        let result = base.handle_response(&response).await;
        assert!(
            matches!(result, Err(SdkError::Envelope(EnvelopeError::BadCipher(message))) if message == "bad twin pk")
        );
    }

    #[tokio::test]
    async fn connect_reconciles_twin_record() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _ws = tokio_tungstenite::accept_async(socket).await;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                });
            }
        });

        let alice = peer(ALICE);
        let db = Arc::new(InMemoryTwinDb::new());
        // stored record has no relay and no e2e key yet
        db.insert(Twin {
            id: 1171,
            public_key: alice.identity.public_key().to_vec(),
            relay: None,
            e2e_key: Vec::new(),
        })
        .await;

        let cancel = CancellationToken::new();
        let (base, _reader) = BaseClient::connect(
            Arc::clone(&alice.identity),
            Arc::clone(&db) as Arc<dyn TwinDb>,
            &format!("ws://{addr}"),
            None,
            Some(alice.secure_key.clone()),
            Duration::from_secs(300),
            cancel.clone(),
        )
        .await
        .unwrap();

        assert_eq!(base.source.twin, 1171);

        let twin = db.get(1171).await.unwrap();
        assert_eq!(twin.relay.as_deref(), Some("127.0.0.1"));
        assert_eq!(twin.e2e_key, secure_public_key(&alice.secure_key));

        cancel.cancel();
        server.abort();
    }

    #[tokio::test]
    async fn sourceless_error_envelope_is_a_relay_error() {
        let alice = peer(ALICE);
        let db = Arc::new(InMemoryTwinDb::new());
        let base = base_for(&alice, 1171, db, false);

        let env = Envelope {
            uid: "err-1".into(),
            message: Some(MessageKind::Error(crate::envelope::wire::Error {
                code: 4,
                message: "destination unreachable".into(),
            })),
            ..Default::default()
        };

        let result = base.handle_response(&env).await;
        assert!(
            matches!(result, Err(SdkError::Envelope(EnvelopeError::Relay(message))) if message == "destination unreachable")
        );
    }

    #[tokio::test]
    async fn sourceless_non_error_is_malformed() {
        let alice = peer(ALICE);
        let db = Arc::new(InMemoryTwinDb::new());
        let base = base_for(&alice, 1171, db, false);

        let env = Envelope {
            uid: "bad-1".into(),
            message: Some(MessageKind::Response(Default::default())),
            ..Default::default()
        };

        let result = base.handle_response(&env).await;
        assert!(matches!(
            result,
            Err(SdkError::Envelope(EnvelopeError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn non_response_kind_is_rejected() {
        let alice = peer(ALICE);
        let db = Arc::new(InMemoryTwinDb::new());
        db.insert(twin_of(&alice, 1171, false).await).await;

        let mut env = Envelope {
            uid: "req-1".into(),
            source: Some(Address {
                twin: 1171,
                connection: None,
            }),
            message: Some(MessageKind::Request(Request {
                command: "cmd".into(),
            })),
            payload: Some(Payload::Plain(b"x".to_vec())),
            ..Default::default()
        };
        envelope::sign(&mut env, &alice.identity);

        let base = base_for(&alice, 1171, db, false);
        let result = base.handle_response(&env).await;
        assert!(matches!(
            result,
            Err(SdkError::Envelope(EnvelopeError::UnexpectedKind))
        ));
    }
}
