//! Legion relay: brokers live robot media and command streams to viewing clients.
//!
//! Robots and clients both dial in; the relay keeps one [`hub::ChannelHub`] per
//! (channel kind, robot id), caches the latest video/thermal frame for late
//! joiners and the MJPEG fallback, and tracks robot presence as a side effect
//! of robot traffic.

pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod http;
pub mod hub;
pub mod payload;
pub mod polling;
pub mod presence;
pub mod relay;
pub mod ws;

pub use config::RelayConfig;
pub use connection::{ChannelConnection, Connection, ConnectionId, ConnectionRef};
pub use error::{ApiError, SendError};
pub use http::{build_router, AppState};
pub use hub::{Accepted, BroadcastReport, ChannelHub, Delivery, HubRole, HubSet};
pub use payload::{ChannelKind, Payload, Role};
pub use presence::{PresenceRegistry, RobotRecord, RobotView};
pub use relay::{Relay, SharedRelay};
