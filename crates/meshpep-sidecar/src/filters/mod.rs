//! The two enforcement roles.

pub mod egress;
pub mod ingress;
pub mod targets;

use std::sync::Arc;

use meshpep_core::error::{PepError, Result};

use crate::config::{RoleKind, SidecarConfig};
use crate::interceptor::RoleFactory;
use crate::runtime::FilterFactory;

pub use egress::EgressRole;
pub use ingress::IngressRole;

/// Build the filter factory for the role selected in `cfg`.
pub fn build_factory(cfg: &SidecarConfig) -> Result<Arc<dyn FilterFactory>> {
    tracing::debug!(role = cfg.role.as_str(), "building filter factory");
    match cfg.role {
        RoleKind::Egress => {
            let egress = cfg
                .egress
                .as_ref()
                .ok_or_else(|| PepError::Config("egress section missing".into()))?;
            Ok(Arc::new(RoleFactory::new(EgressRole::new(egress)?)))
        }
        RoleKind::Ingress => {
            let ingress = cfg
                .ingress
                .as_ref()
                .ok_or_else(|| PepError::Config("ingress section missing".into()))?;
            Ok(Arc::new(RoleFactory::new(IngressRole::new(ingress))))
        }
    }
}
