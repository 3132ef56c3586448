//! A viewer's persistent bidirectional channel: a read pump that only
//! watches for liveness and peer-close, and a write pump that drives
//! periodic pings and drains the session's outbound queue. Tearing down
//! either pump tears down the whole session.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tracing::{debug, warn};

use crate::hub::{Hub, SessionId};

/// Liveness parameters matching the original websocket hub's ping/pong
/// contract.
pub const READ_FRAME_LIMIT: usize = 512;
pub const PONG_WAIT: Duration = Duration::from_secs(60);
pub const PING_PERIOD: Duration = Duration::from_secs(54); // pongWait * 9 / 10
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Drive one viewer session end to end: register with the Hub, run both
/// pumps, and unregister exactly once however the session ends.
pub async fn run_session<T>(socket: T, hub: Hub)
where
    T: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error> + Send + 'static,
{
    let (id, rx, handle) = hub.register().await;
    debug!(session_id = id, "viewer session registered");

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sink, rx));
    let mut read_task = tokio::spawn(read_pump(stream));

    // Whichever pump exits first takes the other down with it -- a half-open
    // socket is otherwise shared between the split halves and wouldn't
    // actually close just because one side stopped using it.
    tokio::select! {
        _ = &mut write_task => { read_task.abort(); }
        _ = &mut read_task => { write_task.abort(); }
    }

    handle.unregister().await;
    debug!(session_id = id, "viewer session unregistered");
}

/// Incoming data is discarded -- the channel is server-to-client only.
/// The only frames this loop cares about are pongs (liveness) and the
/// peer closing or erroring.
async fn read_pump<S>(mut stream: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match timeout(PONG_WAIT, stream.next()).await {
            Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(err))) => {
                warn!(%err, "viewer read error");
                break;
            }
            Err(_) => {
                warn!("viewer pong deadline exceeded");
                break;
            }
        }
    }
}

async fn write_pump<Si>(mut sink: Si, mut rx: mpsc::Receiver<Vec<u8>>)
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ticker = interval(PING_PERIOD);
    ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            biased;
            maybe_msg = rx.recv() => {
                match maybe_msg {
                    Some(first) => {
                        let combined = drain_coalesced(first, &mut rx);
                        if !send_with_deadline(&mut sink, text_message(combined)).await {
                            break;
                        }
                    }
                    None => {
                        let _ = send_with_deadline(&mut sink, Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !send_with_deadline(&mut sink, Message::Ping(Vec::new().into())).await {
                    break;
                }
            }
        }
    }
}

/// Appends any messages already sitting in the queue to `first`, separated
/// by `\n`, so one websocket frame can carry a burst of log entries.
fn drain_coalesced(first: Vec<u8>, rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
    let mut combined = first;
    while let Ok(next) = rx.try_recv() {
        combined.push(b'\n');
        combined.extend_from_slice(&next);
    }
    combined
}

fn text_message(bytes: Vec<u8>) -> Message {
    Message::Text(String::from_utf8_lossy(&bytes).into_owned().into())
}

async fn send_with_deadline<Si>(sink: &mut Si, message: Message) -> bool
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    match timeout(WRITE_WAIT, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(%err, "viewer write error");
            false
        }
        Err(_) => {
            warn!("viewer write deadline exceeded");
            false
        }
    }
}

/// Identifies a live session for logging; re-exported so callers don't need
/// to reach into `crate::hub` just to log an id.
pub type ViewerId = SessionId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_coalesced_joins_queued_messages_with_newline() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.try_send(b"second".to_vec()).unwrap();
        tx.try_send(b"third".to_vec()).unwrap();

        let combined = drain_coalesced(b"first".to_vec(), &mut rx);
        assert_eq!(combined, b"first\nsecond\nthird".to_vec());
    }

    #[test]
    fn drain_coalesced_returns_first_alone_when_queue_empty() {
        let (_tx, mut rx) = mpsc::channel::<Vec<u8>>(8);
        let combined = drain_coalesced(b"only".to_vec(), &mut rx);
        assert_eq!(combined, b"only".to_vec());
    }

    #[test]
    fn text_message_wraps_bytes_as_text_frame() {
        let msg = text_message(b"{\"a\":1}".to_vec());
        match msg {
            Message::Text(t) => assert_eq!(t, "{\"a\":1}"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}
