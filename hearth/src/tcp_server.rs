//! Raw TCP ingestion front-end. One task per connection; each task owns a
//! growing line buffer and hands completed lines to the pipeline without
//! ever blocking on a slow producer upstream.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const MAX_LINE_BYTES: usize = 1024 * 1024;
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

pub async fn run(
    addr: SocketAddr,
    pipeline: Pipeline,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tcp ingestion listening");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let pipeline = pipeline.clone();
                        let conn_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, pipeline, conn_shutdown).await;
                        });
                    }
                    Err(err) => warn!(%err, "tcp accept error"),
                }
            }
        }
    }

    info!("tcp listener draining, {:?} grace period", SHUTDOWN_DRAIN);
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
    Ok(())
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    pipeline: Pipeline,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(%peer, "tcp connection accepted");
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);

    loop {
        if let Some(line) = split_line(&mut buf) {
            pipeline.ingest(line);
            continue;
        }

        if buf.len() >= MAX_LINE_BYTES {
            warn!(%peer, "line exceeded max length, dropping connection");
            break;
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            read = stream.read_buf(&mut buf) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(%peer, %err, "tcp read error");
                        break;
                    }
                }
            }
        }
    }

    debug!(%peer, "tcp connection closed");
}

/// Pulls one newline-delimited line out of `buf`, leaving any remainder (the
/// start of the next line) in place. Strips a trailing `\r` for CRLF input.
fn split_line(buf: &mut BytesMut) -> Option<Vec<u8>> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let mut line = buf.split_to(pos + 1);
    line.truncate(line.len() - 1); // drop '\n'
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    Some(line.to_vec())
}
