//! The local key/value broker the peer-mediated path runs over.
//!
//! The protocol needs exactly three list operations — `RPUSH`, `LPUSH` and
//! `BLPOP` — so the broker sits behind a small trait. Production uses
//! redis (the same instance the relay-peer daemon is attached to); tests
//! use the in-memory implementation below.

use async_trait::async_trait;

use crate::error::BrokerError;

/// Minimal blocking list-queue service.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append to the tail of `queue`.
    async fn rpush(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Prepend to the head of `queue` (used for replies).
    async fn lpush(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// A dedicated consumer for blocking pops. Blocking operations must not
    /// share a connection with pushes.
    async fn consumer(&self) -> Result<Box<dyn BrokerConsumer>, BrokerError>;
}

/// One blocking-pop stream over the broker.
#[async_trait]
pub trait BrokerConsumer: Send {
    /// Pop from the head of the first non-empty queue, waiting up to
    /// `timeout_secs`. `None` on timeout.
    async fn blpop(
        &mut self,
        queues: &[String],
        timeout_secs: u64,
    ) -> Result<Option<(String, Vec<u8>)>, BrokerError>;
}

/// Broker over a redis instance.
pub struct RedisBroker {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
}

impl RedisBroker {
    /// Connect to the redis instance at `address`
    /// (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(address: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(address)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { client, manager })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn rpush(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("RPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn lpush(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(queue)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn consumer(&self) -> Result<Box<dyn BrokerConsumer>, BrokerError> {
        // a fresh connection per consumer: BLPOP parks the whole pipe
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(Box::new(RedisConsumer { conn }))
    }
}

struct RedisConsumer {
    conn: redis::aio::MultiplexedConnection,
}

#[async_trait]
impl BrokerConsumer for RedisConsumer {
    async fn blpop(
        &mut self,
        queues: &[String],
        timeout_secs: u64,
    ) -> Result<Option<(String, Vec<u8>)>, BrokerError> {
        let hit: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(queues)
            .arg(timeout_secs)
            .query_async(&mut self.conn)
            .await?;
        Ok(hit)
    }
}
