//! meshpep sidecar
//!
//! - proxy listener: every request runs through the configured filter
//! - admin listener: /healthz, /readyz, /metrics
//! - config path from `MESHPEP_CONFIG` (default `meshpep.yaml`)

use meshpep_core::error::{PepError, Result};
use tracing_subscriber::{fmt, EnvFilter};

use meshpep_sidecar::{app_state::SidecarState, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(code = e.code().as_str(), error = %e, "meshpep-sidecar failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let path = std::env::var("MESHPEP_CONFIG").unwrap_or_else(|_| "meshpep.yaml".to_string());
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.sidecar.listen_addr()?;
    let admin = cfg.sidecar.admin_addr()?;

    let state = SidecarState::new(cfg)?;
    let app = router::build_router(state.clone());
    let admin_app = router::build_admin_router(state.clone());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| PepError::Internal(format!("bind {listen} failed: {e}")))?;
    let admin_listener = tokio::net::TcpListener::bind(admin)
        .await
        .map_err(|e| PepError::Internal(format!("bind {admin} failed: {e}")))?;

    tracing::info!(
        %listen,
        %admin,
        role = state.factory().role(),
        config = %path,
        "meshpep-sidecar starting"
    );

    tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, admin_app).await {
            tracing::error!(error = %e, "admin listener failed");
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| PepError::Internal(format!("server failed: {e}")))
}

async fn shutdown_signal(state: SidecarState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    state.set_draining();
    tracing::info!("signal received, draining");
}
