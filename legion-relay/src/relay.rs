/**
 * RELAY - Liaison canaux ↔ hubs + présence
 *
 * RÔLE : Objet racine possédé explicitement (pas d'état global) et partagé
 * par Arc avec tous les handlers de connexion.
 *
 * FLUX :
 * - robot → producer_message → hub (cache + fan-out) + touch présence
 * - client → consumer_connected → hub (replay du cache) puis flux live
 * - client commande → consumer_message → robot (direct, pas de broadcast)
 * - robot commande (acks) → broadcast vers les clients commande
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::RelayConfig;
use crate::connection::{ConnectionId, ConnectionRef};
use crate::error::ApiError;
use crate::hub::{Accepted, Delivery, HubCounts, HubRole, HubSet, HubSetStats};
use crate::payload::{ChannelKind, Payload};
use crate::presence::PresenceRegistry;

/// Body of `POST /api/robots/register`.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub uuid: Option<Value>,
    #[serde(default, rename = "type")]
    pub robot_type: Option<Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub ok: bool,
    pub uuid: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientRegisterRequest {
    #[serde(default)]
    pub client_id: Option<Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ClientRegisterResponse {
    pub ok: bool,
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
    pub channel: ChannelKind,
    pub hubs: usize,
    pub producers: usize,
    pub consumers: usize,
}

// JSON lâche : "abc" => abc, 42 => 42, null => ""
fn loose_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

pub struct Relay {
    presence: PresenceRegistry,
    video: HubSet,
    thermal: HubSet,
    command: HubSet,
    telemetry: HubSet,
    consumer_buffer: usize,
}

pub type SharedRelay = Arc<Relay>;

impl Relay {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            presence: PresenceRegistry::new(config.presence.online_ttl_secs),
            video: HubSet::new(ChannelKind::Video),
            thermal: HubSet::new(ChannelKind::Thermal),
            command: HubSet::new(ChannelKind::Command),
            telemetry: HubSet::new(ChannelKind::Telemetry),
            consumer_buffer: config.stream.consumer_buffer,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn hubs(&self, kind: ChannelKind) -> &HubSet {
        match kind {
            ChannelKind::Video => &self.video,
            ChannelKind::Thermal => &self.thermal,
            ChannelKind::Command => &self.command,
            ChannelKind::Telemetry => &self.telemetry,
        }
    }

    /// Queue depth for per-connection writers.
    pub fn consumer_buffer(&self) -> usize {
        self.consumer_buffer
    }

    pub fn register_robot(&self, req: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let uuid = loose_string(req.uuid.as_ref());
        if uuid.is_empty() {
            return Err(ApiError::bad_request("uuid is required"));
        }
        let robot_type = loose_string(req.robot_type.as_ref());
        self.presence.touch(&uuid, Some(robot_type.as_str()));
        debug!("[relay] robot registered: {uuid} (type: {robot_type:?})");
        Ok(RegisterResponse { ok: true, uuid })
    }

    pub fn register_client(
        &self,
        req: &ClientRegisterRequest,
    ) -> Result<ClientRegisterResponse, ApiError> {
        let client_id = loose_string(req.client_id.as_ref());
        if client_id.is_empty() {
            return Err(ApiError::bad_request("client_id is required"));
        }
        Ok(ClientRegisterResponse { ok: true, client_id })
    }

    pub fn producer_connected(&self, kind: ChannelKind, robot_id: &str, conn: ConnectionRef) {
        self.hubs(kind).register_producer(robot_id, conn);
        self.presence.touch(robot_id, None);
    }

    pub fn producer_message(&self, kind: ChannelKind, robot_id: &str, payload: Payload) -> Accepted {
        let outcome = self.hubs(kind).accept_from_producer(robot_id, payload);
        if outcome.is_accepted() {
            self.presence.touch(robot_id, None);
        }
        outcome
    }

    pub fn producer_disconnected(&self, kind: ChannelKind, robot_id: &str, conn_id: ConnectionId) {
        self.hubs(kind).unregister(robot_id, conn_id, HubRole::Producer);
    }

    pub fn consumer_connected(&self, kind: ChannelKind, robot_id: &str, conn: ConnectionRef) {
        self.hubs(kind).register_consumer(robot_id, conn);
    }

    /// Inbound frame from a client. Only the command channel routes it (to the robot);
    /// elsewhere clients are read just to notice closure.
    pub fn consumer_message(&self, kind: ChannelKind, robot_id: &str, payload: Payload) -> Option<Delivery> {
        if !kind.policy().consumer_to_producer {
            return None;
        }
        let delivery = self.hubs(kind).deliver_to_producer(robot_id, &payload);
        if delivery == Delivery::NoProducer {
            debug!("[relay] {kind} for {robot_id} dropped: robot not connected");
        }
        Some(delivery)
    }

    pub fn consumer_disconnected(&self, kind: ChannelKind, robot_id: &str, conn_id: ConnectionId) {
        self.hubs(kind).unregister(robot_id, conn_id, HubRole::Consumer);
    }

    pub fn snapshot(&self, kind: ChannelKind, robot_id: &str) -> Option<(Payload, u64)> {
        self.hubs(kind).snapshot(robot_id)
    }

    pub fn counts(&self, kind: ChannelKind, robot_id: &str) -> HubCounts {
        self.hubs(kind).counts(robot_id)
    }

    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        ChannelKind::ALL
            .iter()
            .map(|&kind| {
                let HubSetStats { hubs, producers, consumers } = self.hubs(kind).stats();
                ChannelStats { channel: kind, hubs, producers, consumers }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChannelConnection, Connection};
    use serde_json::json;

    fn relay() -> Relay {
        Relay::new(&RelayConfig::default())
    }

    fn register(body: Value) -> RegisterRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_register_robot() {
        let relay = relay();
        let resp = relay
            .register_robot(&register(json!({"uuid": "  robot-1 ", "type": "rover"})))
            .unwrap();
        assert_eq!(resp, RegisterResponse { ok: true, uuid: "robot-1".into() });
        let record = relay.presence().get("robot-1").unwrap();
        assert_eq!(record.declared_type.as_deref(), Some("rover"));
    }

    #[test]
    fn test_register_robot_requires_uuid() {
        let relay = relay();
        for body in [json!({}), json!({"uuid": ""}), json!({"uuid": "   "}), json!({"uuid": null})] {
            let err = relay.register_robot(&register(body)).unwrap_err();
            assert_eq!(err.to_string(), "uuid is required");
        }
        assert!(relay.presence().is_empty());
    }

    #[test]
    fn test_register_robot_numeric_uuid() {
        let relay = relay();
        let resp = relay.register_robot(&register(json!({"uuid": 42}))).unwrap();
        assert_eq!(resp.uuid, "42");
    }

    #[test]
    fn test_register_client() {
        let relay = relay();
        let req: ClientRegisterRequest = serde_json::from_value(json!({"client_id": "web-1"})).unwrap();
        assert_eq!(relay.register_client(&req).unwrap().client_id, "web-1");
        assert!(relay.register_client(&ClientRegisterRequest::default()).is_err());
    }

    #[test]
    fn test_every_channel_touches_presence() {
        for kind in ChannelKind::ALL {
            let relay = relay();
            let payload = Payload::binary(vec![1u8, 2]);
            assert!(relay.producer_message(kind, "r1", payload).is_accepted());
            assert!(relay.presence().get("r1").is_some(), "{kind}");
        }
    }

    #[test]
    fn test_ignored_text_does_not_touch_presence() {
        let relay = relay();
        let outcome = relay.producer_message(ChannelKind::Video, "r1", Payload::text("ping"));
        assert_eq!(outcome, Accepted::Ignored);
        assert!(relay.presence().get("r1").is_none());
    }

    #[test]
    fn test_producer_connect_touches_presence() {
        let relay = relay();
        let (conn, _rx) = ChannelConnection::new(4);
        relay.producer_connected(ChannelKind::Video, "r1", conn);
        assert!(relay.presence().get("r1").is_some());
        assert_eq!(relay.counts(ChannelKind::Video, "r1").producers, 1);
    }

    #[test]
    fn test_command_round_trip() {
        let relay = relay();
        let (robot, mut robot_rx) = ChannelConnection::new(8);
        let (client, mut client_rx) = ChannelConnection::new(8);
        relay.producer_connected(ChannelKind::Command, "r1", robot.clone());
        relay.consumer_connected(ChannelKind::Command, "r1", client.clone());

        let stop = Payload::text(r#"{"command":"STOP"}"#);
        assert_eq!(
            relay.consumer_message(ChannelKind::Command, "r1", stop.clone()),
            Some(Delivery::Delivered)
        );
        assert_eq!(robot_rx.try_recv().unwrap(), stop);
        // la commande n'est pas rediffusée aux clients
        assert!(client_rx.try_recv().is_err());

        let ack = Payload::text(r#"{"ack":"STOP"}"#);
        relay.producer_message(ChannelKind::Command, "r1", ack.clone());
        assert_eq!(client_rx.try_recv().unwrap(), ack);

        relay.producer_disconnected(ChannelKind::Command, "r1", robot.id());
        relay.consumer_disconnected(ChannelKind::Command, "r1", client.id());
        assert_eq!(relay.counts(ChannelKind::Command, "r1"), HubCounts::default());
    }

    #[test]
    fn test_command_to_absent_robot_is_silent() {
        let relay = relay();
        let stop = Payload::text(r#"{"command":"STOP"}"#);
        assert_eq!(
            relay.consumer_message(ChannelKind::Command, "ghost", stop),
            Some(Delivery::NoProducer)
        );
        assert!(relay.snapshot(ChannelKind::Command, "ghost").is_none());
    }

    #[test]
    fn test_client_messages_ignored_outside_command() {
        let relay = relay();
        let (robot, mut robot_rx) = ChannelConnection::new(8);
        relay.producer_connected(ChannelKind::Video, "r1", robot);
        assert_eq!(relay.consumer_message(ChannelKind::Video, "r1", Payload::text("hi")), None);
        assert!(robot_rx.try_recv().is_err());
    }

    #[test]
    fn test_channels_are_isolated() {
        let relay = relay();
        let (client, mut rx) = ChannelConnection::new(8);
        relay.consumer_connected(ChannelKind::Thermal, "r1", client);
        relay.producer_message(ChannelKind::Video, "r1", Payload::binary(vec![9u8]));
        assert!(rx.try_recv().is_err());
        assert!(relay.snapshot(ChannelKind::Thermal, "r1").is_none());
        assert!(relay.snapshot(ChannelKind::Video, "r1").is_some());
    }

    #[test]
    fn test_channel_stats() {
        let relay = relay();
        let (c, _rx) = ChannelConnection::new(8);
        relay.consumer_connected(ChannelKind::Telemetry, "r1", c);
        let stats = relay.channel_stats();
        assert_eq!(stats.len(), 4);
        let telemetry = stats.iter().find(|s| s.channel == ChannelKind::Telemetry).unwrap();
        assert_eq!((telemetry.hubs, telemetry.consumers), (1, 1));
    }
}
