use std::collections::BTreeMap;
use std::net::SocketAddr;

use meshpep_core::error::{PepError, Result};
use meshpep_core::protocol::{issuer, pdp};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarConfig {
    pub version: u32,

    #[serde(default)]
    pub sidecar: SidecarSection,

    pub role: RoleKind,

    #[serde(default)]
    pub egress: Option<EgressConfig>,

    #[serde(default)]
    pub ingress: Option<IngressConfig>,
}

impl SidecarConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PepError::UnsupportedVersion);
        }

        self.sidecar.validate()?;

        match self.role {
            RoleKind::Egress => {
                let egress = self
                    .egress
                    .as_ref()
                    .ok_or_else(|| {
                        PepError::Config("role is egress but the egress section is missing".into())
                    })?;
                egress.validate(&self.sidecar)?;
            }
            RoleKind::Ingress => {
                let ingress = self
                    .ingress
                    .as_ref()
                    .ok_or_else(|| {
                        PepError::Config(
                            "role is ingress but the ingress section is missing".into(),
                        )
                    })?;
                ingress.validate(&self.sidecar)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Egress,
    Ingress,
}

impl RoleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleKind::Egress => "egress",
            RoleKind::Ingress => "ingress",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SidecarSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_admin_listen")]
    pub admin_listen: String,

    /// Local service the admitted request is forwarded to.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Cluster name -> base URL.
    #[serde(default)]
    pub clusters: BTreeMap<String, String>,
}

impl Default for SidecarSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin_listen: default_admin_listen(),
            upstream: default_upstream(),
            clusters: BTreeMap::new(),
        }
    }
}

impl SidecarSection {
    pub fn validate(&self) -> Result<()> {
        parse_addr("sidecar.listen", &self.listen)?;
        parse_addr("sidecar.admin_listen", &self.admin_listen)?;
        check_url("sidecar.upstream", &self.upstream)?;
        for (name, url) in &self.clusters {
            if name.is_empty() {
                return Err(PepError::Config("sidecar.clusters: empty cluster name".into()));
            }
            check_url(&format!("sidecar.clusters.{name}"), url)?;
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_addr("sidecar.listen", &self.listen)
    }

    pub fn admin_addr(&self) -> Result<SocketAddr> {
        parse_addr("sidecar.admin_listen", &self.admin_listen)
    }
}

fn parse_addr(field: &str, raw: &str) -> Result<SocketAddr> {
    raw.parse()
        .map_err(|_| PepError::Config(format!("{field} must be a valid socket address: {raw}")))
}

fn check_url(field: &str, raw: &str) -> Result<()> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(())
    } else {
        Err(PepError::Config(format!("{field} must be an http(s) URL: {raw}")))
    }
}

fn default_listen() -> String {
    "0.0.0.0:10000".into()
}
fn default_admin_listen() -> String {
    "127.0.0.1:9901".into()
}
fn default_upstream() -> String {
    "http://127.0.0.1:8080".into()
}

/// Where an out-of-band call goes and how long the host waits for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalloutConfig {
    pub cluster: String,
    pub authority: String,
    pub path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl CalloutConfig {
    fn validate(&self, field: &str, sidecar: &SidecarSection) -> Result<()> {
        if !(1..=60000).contains(&self.timeout_ms) {
            return Err(PepError::Config(format!(
                "{field}.timeout_ms must be between 1 and 60000"
            )));
        }
        if !self.path.starts_with('/') {
            return Err(PepError::Config(format!("{field}.path must start with '/'")));
        }
        if self.authority.is_empty() {
            return Err(PepError::Config(format!("{field}.authority must not be empty")));
        }
        if !sidecar.clusters.contains_key(&self.cluster) {
            return Err(PepError::Config(format!(
                "{field}.cluster '{}' is not declared in sidecar.clusters",
                self.cluster
            )));
        }
        Ok(())
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Behavior when no credential could be obtained for an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuanceFailure {
    /// Forward the request unmodified; the receiving side rejects it.
    #[default]
    FailOpen,
    /// Terminate with 503.
    FailClosed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EgressConfig {
    /// Identity sent to the issuer.
    pub service_id: String,

    /// `host`, `host:port` or `host:*`.
    pub targets: Vec<String>,

    #[serde(default = "default_destination_header")]
    pub destination_header: String,

    #[serde(default = "default_issuer")]
    pub issuer: CalloutConfig,

    #[serde(default)]
    pub issuance_failure: IssuanceFailure,
}

impl EgressConfig {
    fn validate(&self, sidecar: &SidecarSection) -> Result<()> {
        if self.service_id.is_empty() {
            return Err(PepError::Config("egress.service_id must not be empty".into()));
        }
        if self.targets.is_empty() {
            return Err(PepError::Config("egress.targets must not be empty".into()));
        }
        crate::filters::targets::compile_targets(&self.targets)?;
        if self.destination_header.is_empty() {
            return Err(PepError::Config("egress.destination_header must not be empty".into()));
        }
        self.issuer.validate("egress.issuer", sidecar)
    }
}

fn default_destination_header() -> String {
    ":authority".into()
}

fn default_issuer() -> CalloutConfig {
    CalloutConfig {
        cluster: "jwt-vending-service".into(),
        authority: "jwt-vending-service:8081".into(),
        path: issuer::VALID_TOKEN_PATH.into(),
        timeout_ms: default_timeout_ms(),
    }
}

/// Where the ingress filter takes the principal from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalSource {
    #[default]
    TokenSubject,
    /// Trust a caller-supplied header, falling back to `sub`. Not a security
    /// boundary: any caller can set the header.
    IdentityHeader,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    #[serde(default)]
    pub principal_source: PrincipalSource,

    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    #[serde(default = "default_resource_param")]
    pub resource_param: String,

    #[serde(default = "default_resource")]
    pub default_resource: String,

    #[serde(default = "default_action")]
    pub action: String,

    #[serde(default = "default_pdp")]
    pub pdp: CalloutConfig,

    #[serde(default)]
    pub claims: ClaimsConfig,
}

impl IngressConfig {
    fn validate(&self, sidecar: &SidecarSection) -> Result<()> {
        if self.identity_header.is_empty() {
            return Err(PepError::Config("ingress.identity_header must not be empty".into()));
        }
        if self.resource_param.is_empty() {
            return Err(PepError::Config("ingress.resource_param must not be empty".into()));
        }
        if self.default_resource.is_empty() || self.action.is_empty() {
            return Err(PepError::Config(
                "ingress.default_resource and ingress.action must not be empty".into(),
            ));
        }
        if self.claims.leeway_secs > 3600 {
            return Err(PepError::Config("ingress.claims.leeway_secs must be at most 3600".into()));
        }
        self.pdp.validate("ingress.pdp", sidecar)
    }
}

fn default_identity_header() -> String {
    "x-service-id".into()
}
fn default_resource_param() -> String {
    "asset".into()
}
fn default_resource() -> String {
    "default-asset".into()
}
fn default_action() -> String {
    "call".into()
}

fn default_pdp() -> CalloutConfig {
    CalloutConfig {
        cluster: "sgnl-pdp-service".into(),
        authority: "sgnl-pdp-service:8082".into(),
        path: pdp::EVALUATIONS_PATH.into(),
        timeout_ms: default_timeout_ms(),
    }
}

/// Optional structural claim checks. All off by default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimsConfig {
    #[serde(default)]
    pub enforce_time: bool,
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            enforce_time: false,
            leeway_secs: default_leeway_secs(),
            issuer: None,
            audience: None,
        }
    }
}

fn default_leeway_secs() -> u64 {
    60
}
