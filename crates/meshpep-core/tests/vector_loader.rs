//! JSON test vector loader shared by token/PDP tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::fs;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

const DEFAULT_HEADER: &str = r#"{"alg":"RS256","typ":"JWT"}"#;

#[derive(Debug, Deserialize)]
pub struct TokenVector {
    pub description: String,
    pub token: TokenData,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct PdpVector {
    pub description: String,
    pub body: String,
    #[serde(default)]
    pub expect: Option<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenData {
    pub encoding: String,
    pub data: String,
}

impl TokenData {
    /// Materialize the raw bearer string.
    pub fn raw(&self) -> String {
        match self.encoding.as_str() {
            "raw" => self.data.clone(),
            "json" => format!(
                "{}.{}.c2ln",
                URL_SAFE_NO_PAD.encode(DEFAULT_HEADER),
                URL_SAFE_NO_PAD.encode(&self.data)
            ),
            other => panic!("unsupported encoding: {other}"),
        }
    }
}

pub fn load<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
