/*!
Test Harness pour le relais Legion

Facilite l'écriture de tests bout-en-bout avec:
- Démarrage du routeur complet sur 127.0.0.1:0
- Connexion de robots / clients simulés par (canal, robot)
- Appels HTTP JSON et attente de conditions sur l'état du relais
*/

use crate::ws_peer::WsPeer;
use anyhow::{anyhow, Result};
use legion_relay::http::{build_router, AppState};
use legion_relay::{ChannelKind, RelayConfig, Role, SharedRelay};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Délai par défaut des attentes
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Harness de test complet : un relais réel + client HTTP
pub struct TestHarness {
    pub addr: SocketAddr,
    pub relay: SharedRelay,
    http: reqwest::Client,
    server: JoinHandle<()>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestHarness {
    /// Démarre un relais avec la config par défaut
    pub async fn start() -> Result<Self> {
        Self::start_with(RelayConfig::default()).await
    }

    pub async fn start_with(config: RelayConfig) -> Result<Self> {
        init_tracing();

        let state = AppState::new(config);
        let relay = state.relay.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_router(state);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("❌ [HARNESS] relay stopped: {}", e);
            }
        });
        tracing::info!("🚀 [HARNESS] relay listening on {}", addr);

        Ok(Self {
            addr,
            relay,
            http: reqwest::Client::new(),
            server,
        })
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, kind: ChannelKind, role: Role, robot_id: &str) -> String {
        format!("ws://{}/ws/{}/{}/{}", self.addr, kind, role, robot_id)
    }

    /// Connecte un robot (producteur) et attend qu'il soit enregistré dans le hub
    pub async fn connect_robot(&self, kind: ChannelKind, robot_id: &str) -> Result<WsPeer> {
        let peer = WsPeer::connect(&self.ws_url(kind, Role::Robot, robot_id)).await?;
        let relay = self.relay.clone();
        let id = robot_id.to_string();
        self.wait_for(move || relay.counts(kind, &id).producers > 0).await?;
        // le slot singleton (commande) peut déjà être occupé : laisser le remplacement se faire
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(peer)
    }

    /// Connecte un client (consommateur) et attend son enregistrement
    pub async fn connect_client(&self, kind: ChannelKind, robot_id: &str) -> Result<WsPeer> {
        let before = self.relay.counts(kind, robot_id).consumers;
        let peer = WsPeer::connect(&self.ws_url(kind, Role::Client, robot_id)).await?;
        let relay = self.relay.clone();
        let id = robot_id.to_string();
        self.wait_for(move || relay.counts(kind, &id).consumers > before)
            .await?;
        Ok(peer)
    }

    /// Attend qu'une condition sur l'état du relais devienne vraie
    pub async fn wait_for<F>(&self, mut cond: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < DEFAULT_WAIT {
            if cond() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow!("condition not met within {:?}", DEFAULT_WAIT))
    }

    pub async fn get_json(&self, path: &str) -> Result<(u16, Value)> {
        let resp = self.http.get(self.http_url(path)).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<(u16, Value)> {
        let resp = self.http.post(self.http_url(path)).json(body).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    /// POST avec un corps brut (JSON invalide, vide...)
    pub async fn post_raw(&self, path: &str, body: &'static str) -> Result<(u16, Value)> {
        let resp = self.http.post(self.http_url(path)).body(body).send().await?;
        let status = resp.status().as_u16();
        Ok((status, resp.json().await?))
    }

    /// Ouvre une réponse en streaming (MJPEG) sans la consommer
    pub async fn open_stream(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self.http.get(self.http_url(path)).send().await?)
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}
