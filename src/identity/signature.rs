//! Signature and verifier sum types.
//!
//! On the wire a signature is a byte string whose first byte tags the
//! scheme (`'e'` ed25519, `'s'` sr25519) followed by the 64 raw signature
//! bytes. In memory both sides are modeled as tagged variants.

use ed25519_dalek::Verifier as _;

use super::{KeyType, SIGNING_CONTEXT};

/// A signature produced by an [`super::Identity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Ed25519([u8; 64]),
    Sr25519([u8; 64]),
}

impl Signature {
    pub fn key_type(&self) -> KeyType {
        match self {
            Signature::Ed25519(_) => KeyType::Ed25519,
            Signature::Sr25519(_) => KeyType::Sr25519,
        }
    }

    /// The raw 64 signature bytes, without the scheme tag.
    pub fn raw(&self) -> &[u8] {
        match self {
            Signature::Ed25519(bytes) | Signature::Sr25519(bytes) => bytes,
        }
    }

    /// The wire form: scheme tag byte followed by the raw signature.
    pub fn to_prefixed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.push(self.key_type().prefix());
        out.extend_from_slice(self.raw());
        out
    }
}

/// A verifying key for one of the two schemes.
///
/// Construction fails (returns `None`) when the public key bytes are not a
/// valid key for the scheme — e.g. a stale or corrupt directory record.
#[derive(Debug, Clone)]
pub enum Verifier {
    Ed25519(ed25519_dalek::VerifyingKey),
    Sr25519(schnorrkel::PublicKey),
}

impl Verifier {
    pub fn new(key_type: KeyType, public_key: &[u8]) -> Option<Self> {
        match key_type {
            KeyType::Ed25519 => {
                let bytes: [u8; 32] = public_key.try_into().ok()?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes).ok()?;
                Some(Verifier::Ed25519(key))
            }
            KeyType::Sr25519 => {
                let key = schnorrkel::PublicKey::from_bytes(public_key).ok()?;
                Some(Verifier::Sr25519(key))
            }
        }
    }

    /// Verify `sig` (raw bytes, no scheme tag) over `msg`.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        match self {
            Verifier::Ed25519(key) => {
                let Ok(sig) = ed25519_dalek::Signature::from_slice(sig) else {
                    return false;
                };
                key.verify(msg, &sig).is_ok()
            }
            Verifier::Sr25519(key) => {
                let Ok(sig) = schnorrkel::Signature::from_bytes(sig) else {
                    return false;
                };
                let ctx = schnorrkel::signing_context(SIGNING_CONTEXT);
                key.verify(ctx.bytes(msg), &sig).is_ok()
            }
        }
    }
}
