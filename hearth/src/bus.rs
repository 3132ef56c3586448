//! The external pub/sub channel that decouples the ingestion pipeline from
//! the broadcast Hub. Backed by a Redis-compatible server in the reference
//! deployment; the interface is intentionally minimal (`publish`,
//! `subscribe`) so a different broker could stand in without touching the
//! pipeline or the Hub.

use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("redis connection failed: {0}")]
    Connect(#[from] redis::RedisError),
}

/// A connected handle to the live-logs topic. Cheap to clone -- `publish`
/// reuses one auto-reconnecting connection manager.
#[derive(Clone)]
pub struct Bus {
    client: Client,
    conn: ConnectionManager,
    topic: String,
}

impl Bus {
    /// Connect to `redis_url` and verify it is reachable. Failure here is
    /// fatal at startup -- the caller is expected to exit the process
    /// non-zero.
    pub async fn connect(redis_url: &str, topic: impl Into<String>) -> Result<Self, BusError> {
        let client = Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            client,
            conn,
            topic: topic.into(),
        })
    }

    /// Best-effort publish. Errors are the caller's responsibility to log
    /// and swallow -- a failed publish never blocks or panics the pipeline.
    pub async fn publish(&self, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(&self.topic, payload).await?;
        Ok(())
    }

    /// Subscribe to the topic, returning a stream of raw message payloads.
    /// The returned stream ends only if the subscription task's connection
    /// is lost; the caller (the Hub's forwarding task) is expected to log
    /// and exit, relying on a supervisor to restart the process.
    pub async fn subscribe(&self) -> Result<ReceiverStream<Vec<u8>>, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.topic).await?;

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload = msg.get_payload_bytes().to_vec();
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }
}
