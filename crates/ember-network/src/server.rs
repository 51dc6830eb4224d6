//! The inbound half of the peer protocol: accept connections, read one
//! frame per connection to EOF (mirroring [`crate::client::send`], which
//! writes and shuts down), decode it, and dispatch to a handler.
//!
//! Each accepted connection is handled on its own task; handlers share
//! the [`Node`] and serialize their mutations through its internal locks.
//! No operation here otherwise carries a deadline; a bounded read guards
//! against a peer that opens a connection and never writes.

use std::sync::Arc;
use std::time::Duration;

use ember_core::error::NetworkError;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, instrument, warn};

use crate::miner;
use crate::node::Node;
use crate::protocol::Message;

/// Bounded read deadline on an inbound connection: generous enough for a
/// block frame on a slow link, short enough that a peer which opens a
/// socket and never writes cannot pin a task indefinitely.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind `node`'s listen address and serve inbound peer connections until
/// the process is asked to stop. Runs the startup handshake with the seed
/// node first (a no-op on the seed itself).
pub async fn serve(node: Arc<Node>) -> Result<(), NetworkError> {
    crate::handlers::handshake_with_seed(&node).await.ok();

    let listener = TcpListener::bind(&node.address)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    info!(address = %node.address, "listening for peers");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(&node, stream).await {
                debug!(%peer_addr, error = %e, "connection handler failed");
            }
        });
    }
}

/// Read one frame to EOF, decode it, dispatch it, and — if the node is a
/// configured miner — give the miner a chance to run afterward (message
/// handling may have just grown the mempool past its threshold).
#[instrument(skip(node, stream))]
async fn handle_connection(node: &Arc<Node>, mut stream: TcpStream) -> Result<(), NetworkError> {
    let mut buf = Vec::new();
    tokio::time::timeout(READ_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .map_err(|_| NetworkError::Io("read deadline exceeded".to_string()))?
        .map_err(|e| NetworkError::Io(e.to_string()))?;

    let message = Message::decode(&buf)?;
    crate::handlers::handle(node, message)
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;

    miner::mine_while_eligible(Arc::clone(node))
        .await
        .map_err(|e| NetworkError::Io(e.to_string()))?;
    Ok(())
}
