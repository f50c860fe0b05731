//! Server router for the peer-mediated path.
//!
//! Handlers live in a trie keyed by dot-separated topic components. Each
//! node owns an ordered middleware list and a map of leaf handlers;
//! dispatch descends the trie running parent middleware before child
//! middleware before the leaf.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::future::BoxFuture;
use futures_util::FutureExt as _;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{HandlerError, SdkError};
use crate::peer::broker::{Broker, RedisBroker};
use crate::peer::wire::{self, ErrorBody, Incoming, OutgoingResponse};

const NUM_WORKERS: usize = 5;
const POP_TIMEOUT_SECS: u64 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Context handed to handlers and middleware.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    /// Source twin id parsed from the incoming record.
    pub twin: u32,
    /// The full incoming record.
    pub message: Incoming,
}

type HandlerFn =
    Arc<dyn Fn(RequestCtx, Vec<u8>) -> BoxFuture<'static, Result<serde_json::Value, HandlerError>> + Send + Sync>;

type MiddlewareFn =
    Arc<dyn Fn(RequestCtx, Vec<u8>) -> BoxFuture<'static, Result<RequestCtx, HandlerError>> + Send + Sync>;

/// The stock logging middleware.
pub fn logger_middleware(
    ctx: RequestCtx,
    payload: Vec<u8>,
) -> BoxFuture<'static, Result<RequestCtx, HandlerError>> {
    Box::pin(async move {
        tracing::debug!(
            twin = %ctx.message.source,
            command = %ctx.message.command,
            body_size = payload.len(),
            "call"
        );
        Ok(ctx)
    })
}

/// One node of the topic trie.
#[derive(Default)]
pub struct SubRouter {
    handlers: HashMap<String, HandlerFn>,
    sub: HashMap<String, SubRouter>,
    middleware: Vec<MiddlewareFn>,
}

impl SubRouter {
    fn new() -> Self {
        Self::default()
    }

    /// Register a handler at a dotted topic, materializing intermediate
    /// nodes.
    ///
    /// Panics if the topic is already registered — duplicate registration
    /// is a programmer error at startup.
    pub fn with_handler<F, Fut>(&mut self, topic: &str, handler: F)
    where
        F: Fn(RequestCtx, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
    {
        match topic.split_once('.') {
            Some((prefix, rest)) => self.subroute(prefix).with_handler(rest, handler),
            None => {
                if self.handlers.contains_key(topic) {
                    panic!("handler already registered for topic '{topic}'");
                }
                self.handlers.insert(
                    topic.to_string(),
                    Arc::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
                );
            }
        }
    }

    /// The child router under `prefix` (`prefix` must not contain `'.'`),
    /// created on first use. Handlers registered on the child are visible
    /// at `prefix.<leaf>`.
    pub fn subroute(&mut self, prefix: &str) -> &mut SubRouter {
        if prefix.contains('.') {
            panic!("invalid subrouter prefix, must not contain '.'");
        }
        self.sub.entry(prefix.to_string()).or_insert_with(SubRouter::new)
    }

    /// Append to this node's middleware. Parent middleware runs before
    /// child middleware before the leaf handler.
    pub fn use_middleware<F, Fut>(&mut self, middleware: F)
    where
        F: Fn(RequestCtx, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<RequestCtx, HandlerError>> + Send + 'static,
    {
        self.middleware
            .push(Arc::new(move |ctx, payload| Box::pin(middleware(ctx, payload))));
    }

    fn topics(&self, prefix: &str, out: &mut Vec<String>) {
        for topic in self.handlers.keys() {
            if prefix.is_empty() {
                out.push(topic.clone());
            } else {
                out.push(format!("{prefix}.{topic}"));
            }
        }
        for (name, sub) in &self.sub {
            let child = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            sub.topics(&child, out);
        }
    }

    async fn dispatch(
        &self,
        mut ctx: RequestCtx,
        payload: Vec<u8>,
    ) -> Result<serde_json::Value, HandlerError> {
        let route = ctx.message.command.clone();

        let mut node = self;
        for middleware in &node.middleware {
            ctx = middleware(ctx, payload.clone()).await?;
        }

        let mut rest = route.as_str();
        loop {
            match rest.split_once('.') {
                None => {
                    let handler = node.handlers.get(rest).ok_or(HandlerError::FunctionNotFound)?;
                    let call = handler(ctx, payload);
                    return match AssertUnwindSafe(call).catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => Err(HandlerError::Panic(panic_message(panic))),
                    };
                }
                Some((head, tail)) => {
                    node = node.sub.get(head).ok_or(HandlerError::FunctionNotFound)?;
                    for middleware in &node.middleware {
                        ctx = middleware(ctx, payload.clone()).await?;
                    }
                    rest = tail;
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A runnable router: the topic trie plus the broker it serves over.
pub struct Router {
    broker: Arc<dyn Broker>,
    root: SubRouter,
}

impl Router {
    /// Connect to the redis instance shared with the relay-peer daemon.
    pub async fn connect(redis_address: &str) -> Result<Self, SdkError> {
        let broker = RedisBroker::connect(redis_address).await?;
        Ok(Self::with_broker(Arc::new(broker)))
    }

    /// Build the router over an existing broker.
    pub fn with_broker(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            root: SubRouter::new(),
        }
    }

    pub fn with_handler<F, Fut>(&mut self, topic: &str, handler: F)
    where
        F: Fn(RequestCtx, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, HandlerError>> + Send + 'static,
    {
        self.root.with_handler(topic, handler);
    }

    pub fn subroute(&mut self, prefix: &str) -> &mut SubRouter {
        self.root.subroute(prefix)
    }

    pub fn use_middleware<F, Fut>(&mut self, middleware: F)
    where
        F: Fn(RequestCtx, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<RequestCtx, HandlerError>> + Send + 'static,
    {
        self.root.use_middleware(middleware);
    }

    /// Full dotted names of every registered handler.
    pub fn handlers(&self) -> Vec<String> {
        let mut topics = Vec::new();
        self.root.topics("", &mut topics);
        topics
    }

    /// Serve until cancellation or an unrecoverable broker error.
    ///
    /// A fixed pool of workers drains a bounded queue fed by the broker
    /// puller; transient broker errors retry after a short delay.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SdkError> {
        let queues: Vec<String> = self
            .handlers()
            .into_iter()
            .map(|topic| format!("{}{topic}", wire::TOPIC_QUEUE_PREFIX))
            .collect();
        if queues.is_empty() {
            return Err(SdkError::Other("no handlers registered".into()));
        }

        let router = Arc::new(self);
        let (jobs_tx, jobs_rx) = mpsc::channel::<Incoming>(NUM_WORKERS);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        for _ in 0..NUM_WORKERS {
            let router = Arc::clone(&router);
            let jobs = Arc::clone(&jobs_rx);
            let cancel = cancel.clone();
            tokio::spawn(async move { router.worker(cancel, jobs).await });
        }

        let mut consumer = router.broker.consumer().await?;
        loop {
            let popped = tokio::select! {
                _ = cancel.cancelled() => return Err(SdkError::Cancelled),
                result = consumer.blpop(&queues, POP_TIMEOUT_SECS) => result,
            };

            let raw = match popped {
                Ok(Some((_, raw))) => raw,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(
                        "failed to read from system local messagebus, retry in 2 seconds: {e}"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SdkError::Cancelled),
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                    // the connection may be gone, take a fresh one
                    match router.broker.consumer().await {
                        Ok(fresh) => consumer = fresh,
                        Err(e) => tracing::error!("failed to reconnect to messagebus: {e}"),
                    }
                    continue;
                }
            };

            let message: Incoming = match serde_json::from_slice(&raw) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!("failed to unmarshal message: {e}");
                    continue;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(SdkError::Cancelled),
                sent = jobs_tx.send(message) => {
                    if sent.is_err() {
                        return Err(SdkError::Cancelled);
                    }
                }
            }
        }
    }

    async fn worker(&self, cancel: CancellationToken, jobs: Arc<Mutex<mpsc::Receiver<Incoming>>>) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return,
                message = async {
                    let mut jobs = jobs.lock().await;
                    jobs.recv().await
                } => match message {
                    Some(message) => message,
                    None => return,
                },
            };

            let payload = match message.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("err while parsing payload reply: {e}");
                    Vec::new()
                }
            };

            let ctx = RequestCtx {
                twin: message.source_twin(),
                message: message.clone(),
            };

            let result = self.root.dispatch(ctx, payload).await;

            let mut response = OutgoingResponse {
                version: message.version,
                reference: message.reference.clone(),
                data: String::new(),
                destination: message.source.clone(),
                schema: message.schema.clone(),
                epoch: chrono::Utc::now().timestamp(),
                error: None,
            };

            let data = match result {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(
                        twin = %message.source,
                        handler = %message.command,
                        "error while handling job: {error}"
                    );
                    response.error = Some(ErrorBody {
                        code: 255,
                        message: error.to_string(),
                    });
                    serde_json::Value::Null
                }
            };

            if let Err(e) = self.send_reply(&message.reply_to, response, &data).await {
                tracing::error!("err while sending reply: {e}");
            }
        }
    }

    /// Serialize, base64-encode and push a reply. Failures are the
    /// caller's to log; replies are never retried.
    async fn send_reply(
        &self,
        reply_to: &str,
        mut response: OutgoingResponse,
        data: &serde_json::Value,
    ) -> Result<(), SdkError> {
        response.data = BASE64.encode(serde_json::to_vec(data)?);

        tracing::debug!(id = %response.reference, to = %response.destination, "pushing response");

        self.broker
            .lpush(reply_to, serde_json::to_vec(&response)?)
            .await?;
        Ok(())
    }
}
