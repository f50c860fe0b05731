//! Relay connection auth token.
//!
//! The relay authenticates clients with a short-lived JWT carried as the
//! connection URL's query string. The signature segment is the prefixed
//! identity signature over the signing input, so the relay can verify it
//! against the twin's on-chain key; the `alg` header value is fixed by the
//! relay contract.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::json;

use crate::identity::Identity;

/// Lifetime of a connection token. Only covers the handshake; the session
/// itself stays up as long as the socket does.
pub const TOKEN_TTL_SECS: i64 = 60;

/// Build the signed connection token for the given twin/session.
pub fn connection_token(identity: &Identity, twin: u32, session: Option<&str>) -> String {
    let header = json!({"alg": "RS512", "typ": "JWT"});

    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "sub": twin,
        "iat": now,
        "exp": now + TOKEN_TTL_SECS,
    });
    if let Some(sid) = session {
        claims["sid"] = json!(sid);
    }

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    );
    let signature = identity.sign(signing_input.as_bytes()).to_prefixed_bytes();

    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature))
}
