//! Bearer credential decoding (structural only, panic-free).
//!
//! A token is three dot-separated base64url segments: header, payload,
//! signature. Only the payload is decoded; the signature is carried through
//! untouched and never verified here. Decode failures are validation errors
//! and are reported as such, never as a security verdict.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a credential could not be turned into usable claims.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("expected 3 segments, found {0}")]
    Segments(usize),
    #[error("empty {0} segment")]
    EmptySegment(&'static str),
    #[error("payload is not base64url: {0}")]
    Base64(String),
    #[error("payload is not a claim set: {0}")]
    Json(String),
    #[error("sub claim missing or empty")]
    MissingSubject,
    #[error("expired at {exp}")]
    Expired { exp: u64 },
    #[error("not valid before {nbf}")]
    NotYetValid { nbf: u64 },
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
}

impl TokenError {
    /// True when the token could not be decoded at all (as opposed to a
    /// decoded token failing a claim check).
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            TokenError::Segments(_)
                | TokenError::EmptySegment(_)
                | TokenError::Base64(_)
                | TokenError::Json(_)
        )
    }
}

/// Borrowed view of the three token segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    /// May be empty (unsigned tokens); never inspected.
    pub signature: &'a str,
}

/// Split a raw token into its segments.
pub fn split_token(raw: &str) -> Result<Token<'_>, TokenError> {
    let mut parts = raw.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Segments(raw.split('.').count()));
    };

    if header.is_empty() {
        return Err(TokenError::EmptySegment("header"));
    }
    if payload.is_empty() {
        return Err(TokenError::EmptySegment("payload"));
    }

    Ok(Token {
        header,
        payload,
        signature,
    })
}

/// Audience claim (string or array of strings).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Check if the audience contains a specific value.
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }
}

/// Claims of interest. Anything else in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Principal id.
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    /// Expiry, unix seconds.
    #[serde(default)]
    pub exp: Option<u64>,
    /// Issued-at, unix seconds.
    #[serde(default)]
    pub iat: Option<u64>,
    /// Not-before, unix seconds.
    #[serde(default)]
    pub nbf: Option<u64>,
}

impl Claims {
    /// The `sub` claim, if present and non-empty.
    pub fn subject(&self) -> Result<&str, TokenError> {
        match self.sub.as_deref() {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(TokenError::MissingSubject),
        }
    }

    /// Validate `exp`/`nbf` against `now` with `leeway` seconds of skew.
    /// Absent claims are not enforced.
    pub fn check_time(&self, now: u64, leeway: u64) -> Result<(), TokenError> {
        if let Some(exp) = self.exp {
            if now >= exp.saturating_add(leeway) {
                return Err(TokenError::Expired { exp });
            }
        }
        if let Some(nbf) = self.nbf {
            if nbf > now.saturating_add(leeway) {
                return Err(TokenError::NotYetValid { nbf });
            }
        }
        Ok(())
    }

    pub fn check_issuer(&self, expected: &str) -> Result<(), TokenError> {
        if self.iss.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(TokenError::IssuerMismatch)
        }
    }

    pub fn check_audience(&self, expected: &str) -> Result<(), TokenError> {
        match &self.aud {
            Some(aud) if aud.contains(expected) => Ok(()),
            _ => Err(TokenError::AudienceMismatch),
        }
    }
}

/// Split `raw` and decode its payload segment into [`Claims`].
pub fn decode_claims(raw: &str) -> Result<Claims, TokenError> {
    let token = split_token(raw)?;

    // JWTs are unpadded, but tolerate producers that pad anyway.
    let bytes = URL_SAFE_NO_PAD
        .decode(token.payload.trim_end_matches('='))
        .map_err(|e| TokenError::Base64(e.to_string()))?;

    // Go through Value so that arrays and scalars are rejected instead of
    // being accepted positionally by the derived visitor.
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(TokenError::Json("payload must be a JSON object".into()));
    }

    Claims::deserialize(value).map_err(|e| TokenError::Json(e.to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn seg(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    fn token(payload: &str) -> String {
        format!("{}.{}.sig", seg(r#"{"alg":"RS256","typ":"JWT"}"#), seg(payload))
    }

    #[test]
    fn decodes_registered_claims() {
        let raw = token(
            r#"{"sub":"service-a","iss":"jwt-vending-service","aud":["service-mesh"],"exp":2000,"iat":1000,"nbf":1000}"#,
        );
        let claims = decode_claims(&raw).unwrap();
        assert_eq!(claims.subject().unwrap(), "service-a");
        assert_eq!(claims.iss.as_deref(), Some("jwt-vending-service"));
        assert!(claims.aud.as_ref().unwrap().contains("service-mesh"));
        assert_eq!(claims.exp, Some(2000));
    }

    #[test]
    fn padded_payload_is_tolerated() {
        let raw = format!("h.{}==.s", seg(r#"{"sub":"x"}"#));
        assert_eq!(decode_claims(&raw).unwrap().sub.as_deref(), Some("x"));
    }

    #[test]
    fn segment_count_is_enforced() {
        assert_eq!(split_token("a.b"), Err(TokenError::Segments(2)));
        assert_eq!(split_token("a.b.c.d"), Err(TokenError::Segments(4)));
        assert_eq!(split_token(".b.c"), Err(TokenError::EmptySegment("header")));
        assert!(split_token("a.b.").is_ok());
    }

    #[test]
    fn non_object_payload_is_an_encoding_error() {
        let err = decode_claims(&token("[]")).unwrap_err();
        assert!(matches!(err, TokenError::Json(_)));
        assert!(err.is_encoding());
    }

    #[test]
    fn missing_subject() {
        let claims = decode_claims(&token(r#"{"sub":""}"#)).unwrap();
        assert_eq!(claims.subject(), Err(TokenError::MissingSubject));
        assert!(!TokenError::MissingSubject.is_encoding());
    }

    #[test]
    fn time_checks_honour_leeway() {
        let claims = Claims {
            exp: Some(100),
            nbf: Some(50),
            ..Claims::default()
        };
        assert!(claims.check_time(99, 0).is_ok());
        assert_eq!(claims.check_time(100, 0), Err(TokenError::Expired { exp: 100 }));
        assert!(claims.check_time(100, 10).is_ok());
        assert_eq!(claims.check_time(30, 10), Err(TokenError::NotYetValid { nbf: 50 }));
    }

    #[test]
    fn issuer_and_audience_checks() {
        let claims = Claims {
            iss: Some("jwt-vending-service".into()),
            aud: Some(Audience::Single("service-mesh".into())),
            ..Claims::default()
        };
        assert!(claims.check_issuer("jwt-vending-service").is_ok());
        assert_eq!(claims.check_issuer("other"), Err(TokenError::IssuerMismatch));
        assert!(claims.check_audience("service-mesh").is_ok());
        assert_eq!(claims.check_audience("x"), Err(TokenError::AudienceMismatch));
    }
}
