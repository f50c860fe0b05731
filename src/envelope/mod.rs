//! Envelope codec — building, signing, verifying and encrypting the unit
//! of transmission.

pub mod challenge;
pub mod crypto;
pub mod wire;

use std::time::Duration;

use crate::error::{EnvelopeError, SdkError};
use crate::identity::{Identity, KeyType, Verifier};
use crate::twin::TwinDb;

pub use wire::{Address, Envelope, MessageKind, Payload, Ping, Pong, Request, Response};

/// The stock payload schema.
pub const DEFAULT_SCHEMA: &str = "application/json";

/// Default envelope TTL when the caller sets no deadline.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Sign the envelope with the given identity, attaching the prefixed
/// signature. Must be called after every signed field is final.
pub fn sign(env: &mut Envelope, identity: &Identity) {
    let digest = challenge::challenge(env);
    env.signature = Some(identity.sign(&digest).to_prefixed_bytes());
}

/// Verify that the envelope's source produced its signature.
///
/// Resolves the source twin, picks the scheme from the signature tag byte,
/// and checks the recomputed challenge.
pub async fn verify_signature(twin_db: &dyn TwinDb, env: &Envelope) -> Result<(), SdkError> {
    let source = env
        .source
        .as_ref()
        .ok_or_else(|| EnvelopeError::Malformed("missing source".into()))?;

    let twin = twin_db.get(source.twin).await?;

    let signature = env
        .signature
        .as_deref()
        .filter(|sig| !sig.is_empty())
        .ok_or_else(|| EnvelopeError::Malformed("missing signature".into()))?;

    let key_type = KeyType::from_prefix(signature[0])
        .ok_or(EnvelopeError::UnknownSignaturePrefix(signature[0]))?;
    let verifier =
        Verifier::new(key_type, &twin.public_key).ok_or(EnvelopeError::BadSignature)?;

    let digest = challenge::challenge(env);
    if !verifier.verify(&digest, &signature[1..]) {
        return Err(EnvelopeError::BadSignature.into());
    }

    Ok(())
}
