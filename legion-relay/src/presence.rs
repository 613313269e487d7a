/**
 * PRESENCE REGISTRY - Suivi "online" des robots
 *
 * RÔLE : Dernier contact (unix secondes) + type déclaré par robot.
 * Mis à jour par /api/robots/register et par tout trafic robot sur les canaux.
 *
 * RÈGLES :
 * - online ⇔ now - last_seen <= TTL (30s par défaut), calculé à la lecture.
 * - Aucun balayage en tâche de fond, aucun effacement : un robot hors ligne
 *   reste listé comme offline.
 * - L'ordre de listing est l'ordre du premier contact.
 */

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;

pub const DEFAULT_ONLINE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotRecord {
    pub id: String,
    pub declared_type: Option<String>,
    pub last_seen_at: i64,
}

/// Listing entry as exposed on `GET /api/robots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotView {
    pub uuid: String,
    #[serde(rename = "type")]
    pub robot_type: Option<String>,
    pub last_seen: i64,
    pub online: bool,
}

#[derive(Default)]
struct PresenceInner {
    order: Vec<String>,
    records: HashMap<String, RobotRecord>,
}

pub struct PresenceRegistry {
    ttl_secs: i64,
    inner: Mutex<PresenceInner>,
}

pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl PresenceRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
            inner: Mutex::new(PresenceInner::default()),
        }
    }

    pub fn touch(&self, id: &str, declared_type: Option<&str>) {
        self.touch_at(id, declared_type, now_unix());
    }

    /// Upsert with an explicit clock; an empty or missing type keeps the stored one.
    pub fn touch_at(&self, id: &str, declared_type: Option<&str>, now: i64) {
        let declared_type = declared_type.map(str::trim).filter(|t| !t.is_empty());
        let mut inner = self.inner.lock();
        let PresenceInner { order, records } = &mut *inner;
        let record = records.entry(id.to_string()).or_insert_with(|| {
            order.push(id.to_string());
            RobotRecord {
                id: id.to_string(),
                declared_type: None,
                last_seen_at: now,
            }
        });
        if let Some(t) = declared_type {
            record.declared_type = Some(t.to_string());
        }
        record.last_seen_at = now;
    }

    pub fn is_online_at(&self, record: &RobotRecord, now: i64) -> bool {
        now - record.last_seen_at <= self.ttl_secs
    }

    pub fn get(&self, id: &str) -> Option<RobotRecord> {
        self.inner.lock().records.get(id).cloned()
    }

    pub fn list(&self, online_only: bool) -> Vec<RobotView> {
        self.list_at(online_only, now_unix())
    }

    pub fn list_at(&self, online_only: bool, now: i64) -> Vec<RobotView> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .map(|r| RobotView {
                uuid: r.id.clone(),
                robot_type: r.declared_type.clone(),
                last_seen: r.last_seen_at,
                online: self.is_online_at(r, now),
            })
            .filter(|v| !online_only || v.online)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn online_count(&self) -> usize {
        let now = now_unix();
        let inner = self.inner.lock();
        inner
            .records
            .values()
            .filter(|r| self.is_online_at(r, now))
            .count()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ONLINE_TTL_SECS)
    }
}
