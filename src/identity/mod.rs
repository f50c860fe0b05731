//! Signing identities derived from BIP-39 mnemonics.
//!
//! Two schemes exist and the set is closed, so identities, signatures and
//! verifiers are sum types rather than trait objects. Identity keys follow
//! the substrate derivation (seed from entropy); the separate secp256k1 key
//! used for end-to-end encryption is derived from the *standard* BIP-39
//! seed of the same phrase — both conventions are part of the wire contract.

pub mod signature;
pub mod ss58;

use ed25519_dalek::Signer as _;
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use schnorrkel::{ExpansionMode, MiniSecretKey};

use crate::error::IdentityError;

pub use signature::{Signature, Verifier};

/// The sr25519 signing context label. All substrate-compatible peers sign
/// under this Merlin transcript label.
pub const SIGNING_CONTEXT: &[u8] = b"substrate";

/// The supported signing schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    Sr25519,
}

impl KeyType {
    /// The single-byte signature tag carried on the wire.
    pub fn prefix(&self) -> u8 {
        match self {
            KeyType::Ed25519 => b'e',
            KeyType::Sr25519 => b's',
        }
    }

    /// Resolve a wire signature tag back to its scheme.
    pub fn from_prefix(prefix: u8) -> Option<KeyType> {
        match prefix {
            b'e' => Some(KeyType::Ed25519),
            b's' => Some(KeyType::Sr25519),
            _ => None,
        }
    }
}

impl std::str::FromStr for KeyType {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" => Ok(KeyType::Ed25519),
            "sr25519" => Ok(KeyType::Sr25519),
            other => Err(IdentityError::UnknownKeyType(other.to_string())),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Ed25519 => write!(f, "ed25519"),
            KeyType::Sr25519 => write!(f, "sr25519"),
        }
    }
}

/// A twin's signing identity.
#[derive(Clone)]
pub enum Identity {
    Ed25519(ed25519_dalek::SigningKey),
    Sr25519(Box<schnorrkel::Keypair>),
}

impl Identity {
    /// Derive an identity from a BIP-39 phrase using the substrate seed
    /// derivation (the on-chain account keys use this, not the standard
    /// BIP-39 seed).
    pub fn from_mnemonic(key_type: KeyType, mnemonic: &str) -> Result<Self, IdentityError> {
        let parsed = bip39::Mnemonic::parse_normalized(mnemonic)
            .map_err(|e| IdentityError::BadMnemonic(e.to_string()))?;
        let seed = substrate_bip39::seed_from_entropy(&parsed.to_entropy(), "")
            .map_err(|e| IdentityError::CreationFailed(format!("bad entropy: {e:?}")))?;

        match key_type {
            KeyType::Ed25519 => {
                let mut secret = [0u8; 32];
                secret.copy_from_slice(&seed[..32]);
                Ok(Identity::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &secret,
                )))
            }
            KeyType::Sr25519 => {
                let mini = MiniSecretKey::from_bytes(&seed[..32])
                    .map_err(|e| IdentityError::CreationFailed(e.to_string()))?;
                Ok(Identity::Sr25519(Box::new(
                    mini.expand_to_keypair(ExpansionMode::Ed25519),
                )))
            }
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Identity::Ed25519(_) => KeyType::Ed25519,
            Identity::Sr25519(_) => KeyType::Sr25519,
        }
    }

    /// The 32-byte public key, as stored in the twin's on-chain account.
    pub fn public_key(&self) -> [u8; 32] {
        match self {
            Identity::Ed25519(key) => key.verifying_key().to_bytes(),
            Identity::Sr25519(pair) => pair.public.to_bytes(),
        }
    }

    /// The SS58 account address (substrate format).
    pub fn address(&self) -> String {
        ss58::encode(&self.public_key())
    }

    /// Sign arbitrary bytes with the identity's native scheme.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        match self {
            Identity::Ed25519(key) => Signature::Ed25519(key.sign(msg).to_bytes()),
            Identity::Sr25519(pair) => {
                let ctx = schnorrkel::signing_context(SIGNING_CONTEXT);
                Signature::Sr25519(pair.sign(ctx.bytes(msg)).to_bytes())
            }
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("key_type", &self.key_type())
            .field("address", &self.address())
            .finish()
    }
}

/// Derive the secp256k1 private key used for end-to-end encryption.
///
/// Takes the standard 64-byte BIP-39 seed of the phrase and uses its first
/// 32 bytes as the scalar. Reusing the mnemonic keeps a single recovery
/// secret; domain separation comes from the distinct key algorithm. The raw
/// truncation (no HKDF) is required for cross-node interop.
pub fn derive_secure_key(mnemonic: &str) -> Result<k256::SecretKey, IdentityError> {
    let parsed = bip39::Mnemonic::parse_normalized(mnemonic)
        .map_err(|e| IdentityError::BadMnemonic(e.to_string()))?;
    let seed = parsed.to_seed("");
    k256::SecretKey::from_slice(&seed[..32])
        .map_err(|e| IdentityError::CreationFailed(format!("bad secp256k1 scalar: {e}")))
}

/// The 33-byte compressed public key published to the twin's on-chain record.
pub fn secure_public_key(secret: &k256::SecretKey) -> Vec<u8> {
    secret.public_key().to_encoded_point(true).as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const MNEMONIC: &str =
        "garage dad improve reunion girl saddle theory know label reason fantasy deputy";
    const ADDRESS: &str = "5CtwsdH1ggRAgCv2GVfBviWywHzwsYJvhPWhmShpx2DGnb6B";

    #[test]
    fn key_type_from_str() {
        assert_eq!(KeyType::from_str("ed25519").unwrap(), KeyType::Ed25519);
        assert_eq!(KeyType::from_str("sr25519").unwrap(), KeyType::Sr25519);
        assert!(matches!(
            KeyType::from_str("rsa"),
            Err(IdentityError::UnknownKeyType(_))
        ));
    }

    #[test]
    fn bad_mnemonic_rejected() {
        let result = Identity::from_mnemonic(KeyType::Sr25519, "not a valid phrase");
        assert!(matches!(result, Err(IdentityError::BadMnemonic(_))));
    }

    #[test]
    fn sr25519_address_matches_substrate() {
        let identity = Identity::from_mnemonic(KeyType::Sr25519, MNEMONIC).unwrap();
        assert_eq!(identity.address(), ADDRESS);
    }

    #[test]
    fn sign_and_verify_sr25519() {
        let identity = Identity::from_mnemonic(KeyType::Sr25519, MNEMONIC).unwrap();
        let msg = b"my data";
        let sig = identity.sign(msg);

        let verifier = Verifier::new(KeyType::Sr25519, &identity.public_key()).unwrap();
        assert!(verifier.verify(msg, sig.raw()));
        assert!(!verifier.verify(b"my datA", sig.raw()));

        let mut corrupted = sig.raw().to_vec();
        corrupted[0] ^= 1;
        assert!(!verifier.verify(msg, &corrupted));
    }

    #[test]
    fn sign_and_verify_ed25519() {
        let identity = Identity::from_mnemonic(KeyType::Ed25519, MNEMONIC).unwrap();
        let msg = b"my data";
        let sig = identity.sign(msg);

        let verifier = Verifier::new(KeyType::Ed25519, &identity.public_key()).unwrap();
        assert!(verifier.verify(msg, sig.raw()));
        assert!(!verifier.verify(b"my datA", sig.raw()));

        let mut corrupted = sig.raw().to_vec();
        corrupted[63] ^= 1;
        assert!(!verifier.verify(msg, &corrupted));
    }

    #[test]
    fn prefixed_signature_round_trip() {
        let identity = Identity::from_mnemonic(KeyType::Sr25519, MNEMONIC).unwrap();
        let wire = identity.sign(b"payload").to_prefixed_bytes();
        assert_eq!(wire.len(), 65);
        assert_eq!(wire[0], b's');
        assert_eq!(KeyType::from_prefix(wire[0]), Some(KeyType::Sr25519));
        assert_eq!(KeyType::from_prefix(b'x'), None);
    }

    #[test]
    fn secure_key_is_stable_and_compressed() {
        let secret = derive_secure_key(MNEMONIC).unwrap();
        let again = derive_secure_key(MNEMONIC).unwrap();
        assert_eq!(secret.to_bytes(), again.to_bytes());

        let public = secure_public_key(&secret);
        assert_eq!(public.len(), 33);
        assert!(public[0] == 0x02 || public[0] == 0x03);
    }
}
