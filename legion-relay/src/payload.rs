/**
 * PAYLOADS & CANAUX - Vocabulaire partagé du relais
 *
 * RÔLE : Variante taguée Binary/Text posée à la frontière de réception WebSocket,
 * et politique de chaque type de canal (cache, filtrage, cardinalité producteur).
 *
 * TABLE DES POLITIQUES :
 * | canal     | producteur | cache | filtre binaire |
 * |-----------|------------|-------|----------------|
 * | video     | multiple   | oui   | oui            |
 * | thermal   | multiple   | oui   | oui            |
 * | telemetry | multiple   | non   | non            |
 * | command   | singleton  | non   | non            |
 */

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseSegmentError;

/// One frame received from or sent to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Bytes),
    Text(String),
}

impl Payload {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Payload::Binary(data.into())
    }

    pub fn text(data: impl Into<String>) -> Self {
        Payload::Text(data.into())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Binary(b) => b,
            Payload::Text(t) => t.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Video,
    Thermal,
    Command,
    Telemetry,
}

/// Direction and caching behaviour bound to a channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPolicy {
    /// Keep the latest producer payload and replay it to late joiners.
    pub caches_latest: bool,
    /// Only binary frames count as data; text frames are dropped.
    pub binary_only: bool,
    /// A new producer replaces the previous one instead of joining a set.
    pub singleton_producer: bool,
    /// Consumers may push payloads back to the producer.
    pub consumer_to_producer: bool,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Video,
        ChannelKind::Thermal,
        ChannelKind::Command,
        ChannelKind::Telemetry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Video => "video",
            ChannelKind::Thermal => "thermal",
            ChannelKind::Command => "command",
            ChannelKind::Telemetry => "telemetry",
        }
    }

    pub fn policy(self) -> ChannelPolicy {
        match self {
            ChannelKind::Video | ChannelKind::Thermal => ChannelPolicy {
                caches_latest: true,
                binary_only: true,
                singleton_producer: false,
                consumer_to_producer: false,
            },
            ChannelKind::Telemetry => ChannelPolicy {
                caches_latest: false,
                binary_only: false,
                singleton_producer: false,
                consumer_to_producer: false,
            },
            ChannelKind::Command => ChannelPolicy {
                caches_latest: false,
                binary_only: false,
                singleton_producer: true,
                consumer_to_producer: true,
            },
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ChannelKind::Video),
            "thermal" => Ok(ChannelKind::Thermal),
            "command" => Ok(ChannelKind::Command),
            "telemetry" => Ok(ChannelKind::Telemetry),
            other => Err(ParseSegmentError { what: "channel", value: other.to_string() }),
        }
    }
}

/// Which side of a channel a connection speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The robot end: producer of video/thermal/telemetry, target of commands.
    Robot,
    /// A viewing/controlling client: consumer of the robot's stream.
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Robot => "robot",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "robot" => Ok(Role::Robot),
            "client" => Ok(Role::Client),
            other => Err(ParseSegmentError { what: "role", value: other.to_string() }),
        }
    }
}
