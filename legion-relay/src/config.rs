use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::presence::DEFAULT_ONLINE_TTL_SECS;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConf,
    pub presence: PresenceConf,
    pub stream: StreamConf,
    pub cors: Option<CorsConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PresenceConf {
    pub online_ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConf {
    pub default_fps: u32,
    pub max_fps: u32,
    pub boundary: String,     // ex: "frame" => --frame\r\n...
    pub consumer_buffer: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CorsConf {
    /// Empty list means any origin.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 5000 }
    }
}

impl Default for PresenceConf {
    fn default() -> Self {
        Self { online_ttl_secs: DEFAULT_ONLINE_TTL_SECS }
    }
}

impl Default for StreamConf {
    fn default() -> Self {
        Self {
            default_fps: 8,
            max_fps: 30,
            boundary: "frame".into(),
            consumer_buffer: 64,
        }
    }
}

impl StreamConf {
    /// Requested fps clamped to `1..=max_fps`, default when absent.
    pub fn effective_fps(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_fps)
            .clamp(1, self.max_fps.max(1))
    }
}

impl RelayConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// `PORT` wins over the file, as on the hosting platforms the relay is deployed to.
    pub fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(e) => warn!("[config] ignoring invalid PORT={port:?}: {e}"),
            }
        }
    }
}

pub fn parse_config(txt: &str) -> Result<RelayConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(RelayConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config_from(path: &Path) -> RelayConfig {
    if !path.exists() {
        info!("[config] no {}, using default config", path.display());
        return RelayConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("[config] cannot read {}: {e}", path.display());
            return RelayConfig::default();
        }
    };
    parse_config(&txt).unwrap_or_else(|e| {
        warn!("[config] invalid config {}: {e}", path.display());
        RelayConfig::default()
    })
}

pub async fn load_config() -> RelayConfig {
    let path = std::env::var("LEGION_RELAY_CONFIG").unwrap_or_else(|_| "relay.yaml".into());
    let mut cfg = load_config_from(Path::new(&path)).await;
    cfg.apply_env();
    cfg
}
