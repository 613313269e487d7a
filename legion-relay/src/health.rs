use serde::Serialize;
use std::time::Instant;

use crate::relay::{ChannelStats, Relay};

#[derive(Debug, Serialize)]
pub struct RelayHealth {
    pub uptime_seconds: u64,
    pub robots_tracked: usize,
    pub robots_online: usize,
    pub channels: Vec<ChannelStats>,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, relay: &Relay) -> RelayHealth {
        RelayHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            robots_tracked: relay.presence().len(),
            robots_online: relay.presence().online_count(),
            channels: relay.channel_stats(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            if let Some(kb) = parse_vm_rss_kb(&status) {
                return (kb as f32) / 1024.0; // KB -> MB
            }
        }
    }

    // Pas de /proc : valeur indicative
    0.0
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::payload::{ChannelKind, Payload};

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tlegion-relay\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\n";
        assert_eq!(parse_vm_rss_kb(status), Some(2048));
        assert_eq!(parse_vm_rss_kb("Name:\tx\n"), None);
    }

    #[test]
    fn test_health_counts() {
        let relay = Relay::new(&RelayConfig::default());
        relay.producer_message(ChannelKind::Video, "r1", Payload::binary(vec![1u8]));
        relay.presence().touch_at("r0", None, 0);

        let health = HealthTracker::new().get_health(&relay);
        assert_eq!(health.robots_tracked, 2);
        assert_eq!(health.robots_online, 1);
        assert_eq!(health.channels.len(), 4);
        assert!(health.memory_usage_mb >= 0.0);
    }
}
