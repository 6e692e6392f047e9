//! Egress target compilation and matching.
//!
//! Entries are `host`, `host:port`, or `host:*`. Matching is on the request
//! authority and is case-insensitive on the host part.

use meshpep_core::error::{PepError, Result};

/// Port part of a compiled target rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRule {
    /// `host`: matches only an authority without a port.
    Absent,
    /// `host:*`
    Any,
    Exact(u16),
}

/// Compiled target rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRule {
    /// Lowercased host.
    pub host: String,
    pub port: PortRule,
}

pub fn compile_targets(raw: &[String]) -> Result<Vec<TargetRule>> {
    let mut out = Vec::with_capacity(raw.len());
    for s in raw {
        let (host, port) = match s.rsplit_once(':') {
            None => (s.as_str(), PortRule::Absent),
            Some((host, "*")) => (host, PortRule::Any),
            Some((host, p)) => {
                let port: u16 = p.parse().map_err(|_| {
                    PepError::Config(format!(
                        "invalid egress target port: {s} (expected host:port or host:*)"
                    ))
                })?;
                (host, PortRule::Exact(port))
            }
        };
        if host.is_empty() || host.contains(['/', ' ', '*']) {
            return Err(PepError::Config(format!("invalid egress target host: {s}")));
        }
        out.push(TargetRule {
            host: host.to_ascii_lowercase(),
            port,
        });
    }
    Ok(out)
}

pub fn is_target(rules: &[TargetRule], authority: &str) -> bool {
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => match p.parse::<u16>() {
            Ok(p) => (h, Some(p)),
            Err(_) => return false,
        },
        None => (authority, None),
    };
    rules.iter().any(|r| {
        if !r.host.eq_ignore_ascii_case(host) {
            return false;
        }
        match (r.port, port) {
            (PortRule::Any, _) => true,
            (PortRule::Absent, None) => true,
            (PortRule::Exact(want), Some(got)) => want == got,
            _ => false,
        }
    })
}
