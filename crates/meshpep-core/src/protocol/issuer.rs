//! Credential Issuer payloads.
//!
//! `POST /token/valid {service_id} -> {token, expires_in}`.

use serde::{Deserialize, Serialize};

/// Default issuance path.
pub const VALID_TOKEN_PATH: &str = "/token/valid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub service_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Seconds until expiry. Informational; nothing is cached.
    #[serde(default)]
    pub expires_in: i64,
}

impl TokenResponse {
    /// Parse an issuer response body. `None` when the body is unparseable or
    /// the token is empty, i.e. no usable credential was obtained.
    pub fn usable(body: &[u8]) -> Option<Self> {
        let resp: TokenResponse = serde_json::from_slice(body).ok()?;
        if resp.token.is_empty() {
            return None;
        }
        Some(resp)
    }
}
