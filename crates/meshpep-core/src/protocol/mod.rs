//! Protocol modules (credential + collaborator payloads + denial envelope).
//!
//! - `token`: structural bearer-token decoding (three base64url segments).
//! - `issuer`: Credential Issuer request/response bodies.
//! - `pdp`: Policy Decision Service evaluation request/response bodies.
//! - `deny`: stable JSON envelope for synthesized 401/403/503 responses.
//!
//! All decoders are panic-free: malformed input is reported as an error
//! value.

pub mod deny;
pub mod issuer;
pub mod pdp;
pub mod token;
