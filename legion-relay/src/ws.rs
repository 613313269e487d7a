//! WebSocket entry points: `/ws/{channel}/{role}/{robot_id}`.
//!
//! Each socket is split into a reader loop (this task) and a writer task that
//! drains the connection's queue, so hub fan-out never waits on a socket.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tracing::{debug, info};

use crate::connection::{ChannelConnection, Connection};
use crate::error::ApiError;
use crate::http::AppState;
use crate::payload::{ChannelKind, Payload, Role};
use crate::relay::SharedRelay;

const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// GET /ws/{channel}/{role}/{robot_id}
pub async fn ws_handler(
    State(app): State<AppState>,
    Path((channel, role, robot_id)): Path<(String, String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let kind: ChannelKind = channel.parse()?;
    let role: Role = role.parse()?;
    let relay = app.relay.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, relay, kind, role, robot_id)))
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Binary(bytes) => Message::Binary(bytes),
        Payload::Text(text) => Message::Text(text.into()),
    }
}

pub async fn handle_socket(
    socket: WebSocket,
    relay: SharedRelay,
    kind: ChannelKind,
    role: Role,
    robot_id: String,
) {
    info!("[ws] {kind} {role} connected: {robot_id}");
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbox) = ChannelConnection::new(relay.consumer_buffer());
    let conn_id = conn.id();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = outbox.recv().await {
            if sink.send(to_message(payload)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    match role {
        Role::Robot => relay.producer_connected(kind, &robot_id, conn.clone()),
        Role::Client => relay.consumer_connected(kind, &robot_id, conn.clone()),
    }

    while let Some(msg) = stream.next().await {
        let payload = match msg {
            Ok(Message::Binary(bytes)) => Payload::Binary(bytes),
            Ok(Message::Text(text)) => Payload::Text(text.as_str().to_owned()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                debug!("[ws] {kind} {role} {robot_id} receive error: {e}");
                break;
            }
        };
        match role {
            Role::Robot => {
                relay.producer_message(kind, &robot_id, payload);
            }
            Role::Client => {
                relay.consumer_message(kind, &robot_id, payload);
            }
        }
    }

    match role {
        Role::Robot => relay.producer_disconnected(kind, &robot_id, conn_id),
        Role::Client => relay.consumer_disconnected(kind, &robot_id, conn_id),
    }
    // la file se vide, puis le writer envoie le close
    conn.close();
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        debug!("[ws] {kind} {role} {robot_id} writer did not drain in time");
        writer.abort();
    }
    info!("[ws] {kind} {role} disconnected: {robot_id}");
}

