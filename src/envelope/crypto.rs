//! End-to-end payload encryption.
//!
//! The symmetric key is SHA-256 of the ECDH shared point's x-coordinate
//! (secp256k1). Ciphertext framing is `nonce || AES-256-GCM(plaintext)`
//! with an empty AAD — callers must not rely on associated data.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use k256::ecdh::diffie_hellman;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::EnvelopeError;

/// AES-GCM nonce length prepended to every ciphertext.
pub const NONCE_SIZE: usize = 12;

fn shared_key(secret: &SecretKey, public_key: &[u8]) -> Result<[u8; 32], EnvelopeError> {
    let remote = PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| EnvelopeError::BadCipher("could not parse twin public key".into()))?;
    let shared = diffie_hellman(secret.to_nonzero_scalar(), remote.as_affine());
    Ok(Sha256::digest(shared.raw_secret_bytes()).into())
}

fn aead(key: &[u8; 32]) -> Result<Aes256Gcm, EnvelopeError> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| EnvelopeError::BadCipher("failed to create AEAD".into()))
}

/// Encrypt `plaintext` for the twin owning `public_key`.
pub fn encrypt(
    secret: &SecretKey,
    public_key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = aead(&shared_key(secret, public_key)?)?;

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| EnvelopeError::BadCipher("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a ciphertext produced by the twin owning `public_key`.
pub fn decrypt(
    secret: &SecretKey,
    public_key: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    if data.len() < NONCE_SIZE {
        return Err(EnvelopeError::BadCipher("invalid cipher".into()));
    }

    let cipher = aead(&shared_key(secret, public_key)?)?;
    cipher
        .decrypt(Nonce::from_slice(&data[..NONCE_SIZE]), &data[NONCE_SIZE..])
        .map_err(|_| EnvelopeError::BadCipher("could not decrypt message".into()))
}
