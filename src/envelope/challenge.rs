//! Canonical challenge construction.
//!
//! The challenge is the byte string every signature covers. Its rendering
//! order is part of the wire contract and must match the peer
//! implementations byte-for-byte: uid, tags, timestamp, expiration, source
//! address, destination address, the message-kind block, the raw payload
//! bytes (ciphertext is hashed as-is), then the federation hostname.

use md5::{Digest, Md5};

use super::wire::{Address, Envelope, MessageKind};

/// Compute the challenge digest for an envelope.
pub fn challenge(env: &Envelope) -> Vec<u8> {
    Md5::digest(render(env)).to_vec()
}

fn render(env: &Envelope) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(env.uid.as_bytes());
    if let Some(tags) = &env.tags {
        out.extend_from_slice(tags.as_bytes());
    }
    out.extend_from_slice(env.timestamp.to_string().as_bytes());
    out.extend_from_slice(env.expiration.to_string().as_bytes());
    render_address(&mut out, env.source.as_ref());
    render_address(&mut out, env.destination.as_ref());

    match &env.message {
        Some(MessageKind::Request(request)) => {
            out.extend_from_slice(b"request");
            out.extend_from_slice(request.command.as_bytes());
            if let Some(schema) = &env.schema {
                out.extend_from_slice(schema.as_bytes());
            }
        }
        Some(MessageKind::Response(_)) => out.extend_from_slice(b"response"),
        Some(MessageKind::Error(error)) => {
            out.extend_from_slice(b"error");
            out.extend_from_slice(error.code.to_string().as_bytes());
            out.extend_from_slice(error.message.as_bytes());
        }
        _ => {}
    }

    if let Some(payload) = env.payload_bytes() {
        out.extend_from_slice(payload);
    }

    if let Some(federation) = &env.federation {
        out.extend_from_slice(federation.as_bytes());
    }

    out
}

fn render_address(out: &mut Vec<u8>, address: Option<&Address>) {
    let Some(address) = address else {
        return;
    };
    out.extend_from_slice(address.twin.to_string().as_bytes());
    if let Some(connection) = &address.connection {
        out.extend_from_slice(connection.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::wire::{Payload, Request};

    fn sample() -> Envelope {
        Envelope {
            uid: "uid".into(),
            timestamp: 100,
            expiration: 200,
            source: Some(Address {
                twin: 1171,
                connection: None,
            }),
            destination: Some(Address {
                twin: 10,
                connection: None,
            }),
            message: Some(MessageKind::Request(Request {
                command: "cmd".into(),
            })),
            schema: Some("application/json".into()),
            payload: Some(Payload::Plain(b"my data".to_vec())),
            ..Default::default()
        }
    }

    #[test]
    fn request_rendering_is_canonical() {
        let rendered = render(&sample());
        assert_eq!(
            rendered,
            b"uid100200117110requestcmdapplication/jsonmy data".to_vec()
        );
    }

    #[test]
    fn connection_and_federation_participate() {
        let mut env = sample();
        env.source.as_mut().unwrap().connection = Some("sess".into());
        env.federation = Some("relay.grid.tf".into());
        assert_eq!(
            render(&env),
            b"uid1002001171sess10requestcmdapplication/jsonmy datarelay.grid.tf".to_vec()
        );
    }

    #[test]
    fn error_rendering() {
        let mut env = sample();
        env.message = Some(MessageKind::Error(super::super::wire::Error {
            code: 255,
            message: "boom".into(),
        }));
        env.payload = None;
        assert_eq!(render(&env), b"uid100200117110error255boom".to_vec());
    }

    #[test]
    fn ciphertext_is_hashed_verbatim() {
        let mut env = sample();
        env.payload = Some(Payload::Cipher(vec![0xde, 0xad]));
        let mut expected = b"uid100200117110requestcmdapplication/json".to_vec();
        expected.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(render(&env), expected);
    }

    #[test]
    fn challenge_changes_with_any_signed_field() {
        let base = challenge(&sample());

        let mut env = sample();
        env.uid = "uid2".into();
        assert_ne!(challenge(&env), base);

        let mut env = sample();
        env.expiration = 201;
        assert_ne!(challenge(&env), base);

        let mut env = sample();
        env.destination.as_mut().unwrap().twin = 11;
        assert_ne!(challenge(&env), base);

        let mut env = sample();
        env.payload = Some(Payload::Plain(b"my datA".to_vec()));
        assert_ne!(challenge(&env), base);

        assert_eq!(challenge(&sample()), base);
    }
}
