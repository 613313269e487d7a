/**
 * CHANNEL HUB - Moteur de diffusion par (canal, robot)
 *
 * RÔLE : Tient les connexions producteur/consommateur d'un robot sur un canal,
 * le cache de la dernière frame + son numéro de séquence, et fait le fan-out.
 *
 * CONCURRENCE :
 * - Un Mutex par hub : register / accept+cache+fan-out / prune sont sérialisés.
 * - Les envois sont non bloquants (Connection::send), donc le fan-out se fait
 *   sous le verrou : un client tardif ne peut pas lire une séquence plus récente
 *   que la frame qu'il reçoit.
 * - Deux hubs différents (autre canal ou autre robot) ne partagent rien.
 *
 * CYCLE DE VIE : créé paresseusement par HubSet au premier usage, jamais évincé.
 */

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::{ConnectionId, ConnectionRef};
use crate::error::SendError;
use crate::payload::{ChannelKind, ChannelPolicy, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubRole {
    Producer,
    Consumer,
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Consumers that were alive but had no room for this payload.
    pub dropped: usize,
    /// Consumers removed because their connection is closed.
    pub pruned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Not stream data for this channel (text frame on a binary-only channel).
    Ignored,
    Forwarded {
        /// New sequence number, for caching channels only.
        sequence: Option<u64>,
        report: BroadcastReport,
    },
}

impl Accepted {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Accepted::Forwarded { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No producer registered: the payload is dropped, not queued.
    NoProducer,
    Failed(SendError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubCounts {
    pub producers: usize,
    pub consumers: usize,
}

#[derive(Default)]
struct HubInner {
    producers: Vec<ConnectionRef>,
    consumers: Vec<ConnectionRef>,
    latest: Option<Payload>,
    sequence: u64,
}

pub struct ChannelHub {
    kind: ChannelKind,
    robot_id: String,
    policy: ChannelPolicy,
    inner: Mutex<HubInner>,
}

impl ChannelHub {
    pub fn new(kind: ChannelKind, robot_id: impl Into<String>) -> Self {
        Self {
            kind,
            robot_id: robot_id.into(),
            policy: kind.policy(),
            inner: Mutex::new(HubInner::default()),
        }
    }

    pub fn register_producer(&self, conn: ConnectionRef) {
        let mut inner = self.inner.lock();
        if self.policy.singleton_producer {
            // L'ancienne connexion n'est pas fermée : le transport s'en charge
            if let Some(old) = inner.producers.first() {
                if old.id() != conn.id() {
                    info!(
                        "[{}] producer {} replaces {} for robot {}",
                        self.kind,
                        conn.id(),
                        old.id(),
                        self.robot_id
                    );
                }
            }
            inner.producers.clear();
            inner.producers.push(conn);
        } else if !inner.producers.iter().any(|p| p.id() == conn.id()) {
            inner.producers.push(conn);
        }
    }

    pub fn register_consumer(&self, conn: ConnectionRef) {
        let mut inner = self.inner.lock();
        if inner.consumers.iter().any(|c| c.id() == conn.id()) {
            return;
        }
        // Replay sous le même verrou que le fan-out : la frame en cache arrive avant toute autre
        if self.policy.caches_latest {
            if let Some(latest) = inner.latest.as_ref().filter(|p| !p.is_empty()) {
                match conn.send(latest) {
                    Ok(()) => {}
                    Err(SendError::Full) => {
                        debug!("[{}] replay dropped for {} (buffer full)", self.kind, conn.id());
                    }
                    Err(SendError::Closed) => {
                        debug!("[{}] consumer {} closed before replay", self.kind, conn.id());
                        return;
                    }
                }
            }
        }
        inner.consumers.push(conn);
    }

    /// Idempotent: unknown ids are ignored.
    ///
    /// On a singleton channel the slot is only cleared if `conn_id` is the
    /// current producer, so a superseded connection closing late does not evict
    /// its replacement.
    pub fn unregister(&self, conn_id: ConnectionId, role: HubRole) -> bool {
        let mut inner = self.inner.lock();
        let set = match role {
            HubRole::Producer => &mut inner.producers,
            HubRole::Consumer => &mut inner.consumers,
        };
        let before = set.len();
        set.retain(|c| c.id() != conn_id);
        before != set.len()
    }

    pub fn accept_from_producer(&self, payload: Payload) -> Accepted {
        if self.policy.binary_only && !payload.is_binary() {
            return Accepted::Ignored;
        }
        let mut inner = self.inner.lock();
        let sequence = if self.policy.caches_latest {
            inner.sequence = inner.sequence.wrapping_add(1);
            let seq = inner.sequence;
            inner.latest = Some(payload.clone());
            Some(seq)
        } else {
            None
        };
        let report = self.fan_out(&mut inner, &payload);
        Accepted::Forwarded { sequence, report }
    }

    /// Best-effort fan-out to every consumer; closed connections are pruned afterwards.
    pub fn broadcast(&self, payload: &Payload) -> BroadcastReport {
        let mut inner = self.inner.lock();
        self.fan_out(&mut inner, payload)
    }

    fn fan_out(&self, inner: &mut HubInner, payload: &Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();
        for consumer in inner.consumers.iter() {
            match consumer.send(payload) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Full) => report.dropped += 1,
                Err(SendError::Closed) => dead.push(consumer.id()),
            }
        }
        if !dead.is_empty() {
            inner.consumers.retain(|c| !dead.contains(&c.id()));
            report.pruned = dead.len();
            debug!(
                "[{}] pruned {} dead consumer(s) for robot {}",
                self.kind, report.pruned, self.robot_id
            );
        }
        if report.dropped > 0 {
            debug!(
                "[{}] dropped payload for {} slow consumer(s) of robot {}",
                self.kind, report.dropped, self.robot_id
            );
        }
        report
    }

    /// Reverse path: consumer → producer(s). No-op when nobody is registered.
    pub fn deliver_to_producer(&self, payload: &Payload) -> Delivery {
        let mut inner = self.inner.lock();
        if inner.producers.is_empty() {
            return Delivery::NoProducer;
        }
        let mut outcome = Delivery::Delivered;
        let mut dead = Vec::new();
        for producer in inner.producers.iter() {
            if let Err(e) = producer.send(payload) {
                if e == SendError::Closed {
                    dead.push(producer.id());
                }
                outcome = Delivery::Failed(e);
            }
        }
        if !dead.is_empty() {
            inner.producers.retain(|p| !dead.contains(&p.id()));
        }
        outcome
    }

    /// Latest cached payload with its sequence, read together.
    pub fn snapshot(&self) -> Option<(Payload, u64)> {
        let inner = self.inner.lock();
        inner.latest.clone().map(|p| (p, inner.sequence))
    }

    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    pub fn counts(&self) -> HubCounts {
        let inner = self.inner.lock();
        HubCounts {
            producers: inner.producers.len(),
            consumers: inner.consumers.len(),
        }
    }
}

/// All hubs of one channel kind, keyed by robot id.
pub struct HubSet {
    kind: ChannelKind,
    hubs: RwLock<HashMap<String, Arc<ChannelHub>>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubSetStats {
    pub hubs: usize,
    pub producers: usize,
    pub consumers: usize,
}

impl HubSet {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            hubs: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the hub for `robot_id`.
    pub fn hub(&self, robot_id: &str) -> Arc<ChannelHub> {
        if let Some(hub) = self.hubs.read().get(robot_id) {
            return hub.clone();
        }
        let mut hubs = self.hubs.write();
        hubs.entry(robot_id.to_string())
            .or_insert_with(|| {
                debug!("[{}] creating hub for robot {}", self.kind, robot_id);
                Arc::new(ChannelHub::new(self.kind, robot_id))
            })
            .clone()
    }

    pub fn get(&self, robot_id: &str) -> Option<Arc<ChannelHub>> {
        self.hubs.read().get(robot_id).cloned()
    }

    pub fn register_producer(&self, robot_id: &str, conn: ConnectionRef) {
        self.hub(robot_id).register_producer(conn);
    }

    pub fn register_consumer(&self, robot_id: &str, conn: ConnectionRef) {
        self.hub(robot_id).register_consumer(conn);
    }

    pub fn unregister(&self, robot_id: &str, conn_id: ConnectionId, role: HubRole) -> bool {
        self.get(robot_id)
            .map(|hub| hub.unregister(conn_id, role))
            .unwrap_or(false)
    }

    pub fn accept_from_producer(&self, robot_id: &str, payload: Payload) -> Accepted {
        self.hub(robot_id).accept_from_producer(payload)
    }

    pub fn broadcast(&self, robot_id: &str, payload: &Payload) -> BroadcastReport {
        self.get(robot_id)
            .map(|hub| hub.broadcast(payload))
            .unwrap_or_default()
    }

    pub fn deliver_to_producer(&self, robot_id: &str, payload: &Payload) -> Delivery {
        self.get(robot_id)
            .map(|hub| hub.deliver_to_producer(payload))
            .unwrap_or(Delivery::NoProducer)
    }

    pub fn snapshot(&self, robot_id: &str) -> Option<(Payload, u64)> {
        self.get(robot_id).and_then(|hub| hub.snapshot())
    }

    pub fn counts(&self, robot_id: &str) -> HubCounts {
        self.get(robot_id).map(|hub| hub.counts()).unwrap_or_default()
    }

    pub fn stats(&self) -> HubSetStats {
        let hubs = self.hubs.read();
        hubs.values().fold(
            HubSetStats { hubs: hubs.len(), ..Default::default() },
            |mut acc, hub| {
                let counts = hub.counts();
                acc.producers += counts.producers;
                acc.consumers += counts.consumers;
                acc
            },
        )
    }
}
