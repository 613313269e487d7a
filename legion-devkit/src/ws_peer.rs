/*!
Pair WebSocket simulé (robot ou client) pour tests sans matériel.

Enveloppe un client tokio-tungstenite et expose des envois/réceptions typés
(`legion_relay::Payload`) avec timeout.
*/

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use legion_relay::Payload;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CLOSE_WAIT: Duration = Duration::from_secs(2);

pub struct WsPeer {
    url: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsPeer {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _resp) = connect_async(url)
            .await
            .map_err(|e| anyhow!("connect {url}: {e}"))?;
        tracing::debug!("🔌 [PEER] connected to {}", url);
        Ok(Self { url: url.to_string(), stream })
    }

    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.stream.send(Message::Binary(data.into())).await?;
        Ok(())
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Prochain payload, `None` si rien n'arrive avant `timeout`.
    /// Une fermeture côté serveur est une erreur.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Payload>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            };
            match next {
                Some(Ok(Message::Binary(data))) => return Ok(Some(Payload::Binary(data))),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Payload::Text(text.as_str().to_owned())))
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(anyhow!("connection {} closed", self.url))
                }
                Some(Ok(_)) => continue, // ping/pong
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Comme `recv_timeout` mais exige un payload.
    pub async fn expect(&mut self, timeout: Duration) -> Result<Payload> {
        self.recv_timeout(timeout)
            .await?
            .ok_or_else(|| anyhow!("no payload on {} within {:?}", self.url, timeout))
    }

    /// Vérifie qu'aucun payload n'arrive pendant `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match self.recv_timeout(window).await? {
            None => Ok(()),
            Some(p) => Err(anyhow!("unexpected payload on {}: {:?}", self.url, p)),
        }
    }

    /// Ferme la connexion et exige que le serveur réponde au close.
    /// Une coupure TCP sans handshake est une erreur.
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        let url = self.url;
        let mut stream = self.stream;
        let handshake = async {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(anyhow!("close on {url}: {e}")),
                }
            }
        };
        tokio::time::timeout(CLOSE_WAIT, handshake)
            .await
            .map_err(|_| anyhow!("no close reply on {url} within {CLOSE_WAIT:?}"))?
    }
}
