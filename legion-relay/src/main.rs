/**
 * LEGION RELAY - Point d'entrée du serveur relais
 *
 * RÔLE : Charge la config, initialise les logs, construit l'état partagé
 * (présence + hubs) et sert le routeur HTTP/WebSocket jusqu'à Ctrl-C.
 *
 * ARCHITECTURE : robots et clients se connectent tous ici (seul point stable
 * derrière les NAT), le relais fait le fan-out par (canal, robot).
 */

use anyhow::{Context, Result};
use legion_relay::config::load_config;
use legion_relay::http::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("legion_relay=info,tower_http=warn")),
        )
        .init();

    let cfg = load_config().await;
    let addr = cfg.bind_addr();
    info!(
        "[relay] online TTL {}s, mjpeg {} fps (max {})",
        cfg.presence.online_ttl_secs, cfg.stream.default_fps, cfg.stream.max_fps
    );

    let app = build_router(AppState::new(cfg));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[relay] listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("[relay] stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[relay] cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
