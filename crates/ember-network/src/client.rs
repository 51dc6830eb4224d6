//! Outbound wire protocol delivery.

use ember_core::error::NetworkError;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{instrument, warn};

use crate::node::Node;
use crate::protocol::Message;

/// Open a connection to `addr`, write `message`'s frame, and close.
///
/// On dial or write failure, evicts `addr` from `node`'s known-nodes set
/// — a crude peer liveness policy: an address this node cannot currently
/// reach is not worth retrying on the next broadcast.
#[instrument(skip(node, message), fields(command = ?std::mem::discriminant(message)))]
pub async fn send(node: &Node, addr: &str, message: &Message) -> Result<(), NetworkError> {
    let frame = message.encode()?;
    match TcpStream::connect(addr).await {
        Ok(mut stream) => {
            if let Err(e) = stream.write_all(&frame).await {
                warn!(%addr, error = %e, "write failed, evicting peer");
                node.remove_known_node(addr);
                return Err(NetworkError::Io(e.to_string()));
            }
            let _ = stream.shutdown().await;
            Ok(())
        }
        Err(e) => {
            warn!(%addr, error = %e, "dial failed, evicting peer");
            node.remove_known_node(addr);
            Err(NetworkError::Io(e.to_string()))
        }
    }
}

/// Broadcast `message` to every currently known peer, ignoring individual
/// delivery failures (each one already evicts its own dead peer).
pub async fn broadcast(node: &Node, message: &Message) {
    for addr in node.known_nodes() {
        let _ = send(node, &addr, message).await;
    }
}

/// Broadcast to every known peer except `exclude`.
pub async fn broadcast_except(node: &Node, exclude: &str, message: &Message) {
    for addr in node.known_nodes() {
        if addr == exclude {
            continue;
        }
        let _ = send(node, &addr, message).await;
    }
}

/// Deliver a single frame to `addr` without a [`Node`] to track peer
/// liveness against. Used by one-shot callers (the CLI's `send` command)
/// that have no persistent known-nodes set to evict from.
pub async fn send_once(addr: &str, message: &Message) -> Result<(), NetworkError> {
    let frame = message.encode()?;
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    stream
        .write_all(&frame)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    let _ = stream.shutdown().await;
    Ok(())
}
