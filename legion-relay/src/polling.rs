//! Pull-based multipart stream over a hub's cached frame.
//!
//! Each session ticks at `1/fps`, reads `(payload, sequence)` from the hub and
//! emits a boundary frame only when the sequence moved since its last emission.
//! A quiet producer means a quiet stream; stale frames are never repeated.

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::hub::ChannelHub;

pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

pub fn encode_frame(boundary: &str, data: &[u8]) -> Bytes {
    let header = format!(
        "--{boundary}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        data.len()
    );
    let mut buf = BytesMut::with_capacity(header.len() + data.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

struct PollSession {
    hub: Arc<ChannelHub>,
    ticker: Interval,
    boundary: String,
    last_sequence: Option<u64>,
}

impl PollSession {
    async fn next_frame(&mut self) -> Bytes {
        loop {
            self.ticker.tick().await;
            if let Some((payload, sequence)) = self.hub.snapshot() {
                if self.last_sequence == Some(sequence) {
                    continue;
                }
                self.last_sequence = Some(sequence);
                // frame vide : séquence consommée, rien à émettre
                if !payload.is_empty() {
                    return encode_frame(&self.boundary, payload.as_bytes());
                }
            }
        }
    }
}

/// Infinite frame stream; ends only when the consumer drops it.
pub fn poll_stream(
    hub: Arc<ChannelHub>,
    fps: u32,
    boundary: impl Into<String>,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let session = PollSession {
        hub,
        ticker,
        boundary: boundary.into(),
        last_sequence: None,
    };
    futures::stream::unfold(session, |mut session| async move {
        let frame = session.next_frame().await;
        Some((frame, session))
    })
}
