//! Credential decoding vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meshpep_core::protocol::token::{decode_claims, TokenError};

mod vector_loader;
use vector_loader::{load, TokenVector};

fn kind(e: &TokenError) -> &'static str {
    match e {
        TokenError::Segments(_) | TokenError::EmptySegment(_) => "segments",
        TokenError::Base64(_) => "base64",
        TokenError::Json(_) => "json",
        _ => "claim",
    }
}

#[test]
fn token_vectors() {
    let files = [
        "token_ok.json",
        "token_extra_claims.json",
        "token_two_segments.json",
        "token_bad_base64.json",
        "token_payload_not_json.json",
        "token_payload_array.json",
        "token_bad_exp_type.json",
    ];

    for f in files {
        let v: TokenVector = load(f);
        let res = decode_claims(&v.token.raw());

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert!(e.is_encoding(), "vector={}", v.description);
            assert_eq!(kind(&e), err.kind, "vector={}", v.description);
            continue;
        }

        let claims = res.expect("expected claims");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(
            claims.subject().unwrap(),
            ex["sub"].as_str().unwrap(),
            "vector={}",
            v.description
        );
        if let Some(iss) = ex.get("iss") {
            assert_eq!(claims.iss.as_deref(), iss.as_str(), "vector={}", v.description);
        }
        if let Some(aud) = ex.get("aud") {
            assert!(
                claims.aud.as_ref().unwrap().contains(aud.as_str().unwrap()),
                "vector={}",
                v.description
            );
        }
        if let Some(exp) = ex.get("exp") {
            assert_eq!(claims.exp, exp.as_u64(), "vector={}", v.description);
        }
    }
}
