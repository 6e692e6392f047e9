//! Sidecar config loader (strict parsing).

pub mod schema;

use std::fs;

use meshpep_core::error::{PepError, Result};

pub use schema::{
    CalloutConfig, ClaimsConfig, EgressConfig, IngressConfig, IssuanceFailure, PrincipalSource,
    RoleKind, SidecarConfig, SidecarSection,
};

pub fn load_from_file(path: &str) -> Result<SidecarConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PepError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<SidecarConfig> {
    let cfg: SidecarConfig =
        serde_yaml::from_str(s).map_err(|e| PepError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
