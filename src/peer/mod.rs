//! The peer-mediated path: a local relay-peer daemon does the signing,
//! encryption and relay plumbing; clients and servers talk to it through
//! list queues on a shared local broker.

pub mod broker;
pub mod rpc;
pub mod router;
pub mod wire;

pub use broker::{Broker, BrokerConsumer, RedisBroker};
pub use router::{logger_middleware, RequestCtx, Router, SubRouter};
pub use rpc::RpcClient;
pub use wire::{Incoming, IncomingResponse, OutgoingResponse, SYSTEM_LOCAL_QUEUE};
