//! SS58 account address encoding (substrate format 42).

use blake2::{Blake2b512, Digest};

const CHECKSUM_PREIMAGE: &[u8] = b"SS58PRE";
const SUBSTRATE_FORMAT: u8 = 42;

/// Encode a 32-byte account public key as an SS58 address.
pub fn encode(public_key: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(35);
    data.push(SUBSTRATE_FORMAT);
    data.extend_from_slice(public_key);

    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREIMAGE);
    hasher.update(&data);
    let checksum = hasher.finalize();
    data.extend_from_slice(&checksum[..2]);

    bs58::encode(data).into_string()
}

/// Decode an SS58 address back to the account public key.
///
/// Returns `None` on malformed input, a foreign network format, or a
/// checksum mismatch.
pub fn decode(address: &str) -> Option<[u8; 32]> {
    let data = bs58::decode(address).into_vec().ok()?;
    if data.len() != 35 || data[0] != SUBSTRATE_FORMAT {
        return None;
    }

    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREIMAGE);
    hasher.update(&data[..33]);
    let checksum = hasher.finalize();
    if data[33..] != checksum[..2] {
        return None;
    }

    data[1..33].try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = [7u8; 32];
        let address = encode(&key);
        assert_eq!(decode(&address), Some(key));
    }

    #[test]
    fn rejects_tampered_address() {
        let mut address = encode(&[7u8; 32]);
        // flip one character; either invalid base58 or checksum mismatch
        let replacement = if address.ends_with('a') { 'b' } else { 'a' };
        address.pop();
        address.push(replacement);
        assert_eq!(decode(&address), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode("not-an-address"), None);
        assert_eq!(decode(""), None);
    }
}
