//! The frozen protobuf envelope contract.
//!
//! The schema is fixed by the external relay protocol; the structs below
//! are hand-written against it with `prost` field attributes (no build
//! step). Field tags must never change.

/// The unit of transmission between twins.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Globally unique id of this envelope.
    #[prost(string, tag = "1")]
    pub uid: ::prost::alloc::string::String,
    #[prost(string, optional, tag = "2")]
    pub tags: ::core::option::Option<::prost::alloc::string::String>,
    /// Seconds since epoch at build time.
    #[prost(uint64, tag = "3")]
    pub timestamp: u64,
    /// TTL in seconds, relative to `timestamp`. The relay drops expired
    /// envelopes.
    #[prost(uint64, tag = "4")]
    pub expiration: u64,
    #[prost(message, optional, tag = "5")]
    pub source: ::core::option::Option<Address>,
    #[prost(message, optional, tag = "6")]
    pub destination: ::core::option::Option<Address>,
    #[prost(oneof = "MessageKind", tags = "7, 8, 9, 14, 15")]
    pub message: ::core::option::Option<MessageKind>,
    #[prost(string, optional, tag = "10")]
    pub schema: ::core::option::Option<::prost::alloc::string::String>,
    /// Hostname of the relay the destination lives behind.
    #[prost(string, optional, tag = "11")]
    pub federation: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(oneof = "Payload", tags = "12, 13")]
    pub payload: ::core::option::Option<Payload>,
    /// Scheme tag byte followed by the raw signature.
    #[prost(bytes = "vec", optional, tag = "16")]
    pub signature: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

/// A twin address; `connection` names a session within the twin.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(uint32, tag = "1")]
    pub twin: u32,
    #[prost(string, optional, tag = "2")]
    pub connection: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(string, tag = "1")]
    pub command: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Pong {}

/// What the envelope carries: a request, a response, an error, or an
/// application-level keepalive.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum MessageKind {
    #[prost(message, tag = "7")]
    Request(Request),
    #[prost(message, tag = "8")]
    Response(Response),
    #[prost(message, tag = "9")]
    Error(Error),
    #[prost(message, tag = "14")]
    Ping(Ping),
    #[prost(message, tag = "15")]
    Pong(Pong),
}

/// The payload body; mutually exclusive with an `Error` message.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum Payload {
    #[prost(bytes, tag = "12")]
    Plain(::prost::alloc::vec::Vec<u8>),
    #[prost(bytes, tag = "13")]
    Cipher(::prost::alloc::vec::Vec<u8>),
}

impl Envelope {
    pub fn request(&self) -> Option<&Request> {
        match &self.message {
            Some(MessageKind::Request(request)) => Some(request),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match &self.message {
            Some(MessageKind::Response(response)) => Some(response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.message {
            Some(MessageKind::Error(error)) => Some(error),
            _ => None,
        }
    }

    pub fn plain(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(Payload::Plain(data)) => Some(data),
            _ => None,
        }
    }

    pub fn cipher(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(Payload::Cipher(data)) => Some(data),
            _ => None,
        }
    }

    /// The payload bytes as carried on the wire — plain contents or the
    /// ciphertext, whichever is present.
    pub fn payload_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(Payload::Plain(data)) | Some(Payload::Cipher(data)) => Some(data),
            None => None,
        }
    }
}
