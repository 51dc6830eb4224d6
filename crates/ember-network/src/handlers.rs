//! Per-command handlers implementing the peer state machine.

use ember_core::constants::SEED_NODE;
use ember_core::error::EmberError;
use ember_store::UtxoIndex;
use tracing::{info, warn};

use crate::client::send;
use crate::node::Node;
use crate::protocol::{
    AddrPayload, BlockPayload, GetBlocksPayload, GetDataPayload, InvKind, InvPayload, Message,
    TxPayload, VersionPayload, PROTOCOL_VERSION,
};

/// Dispatch one decoded message to its handler.
pub async fn handle(node: &Node, message: Message) -> Result<(), EmberError> {
    match message {
        Message::Version(p) => handle_version(node, p).await,
        Message::GetBlocks(p) => handle_getblocks(node, p).await,
        Message::Inv(p) => handle_inv(node, p).await,
        Message::GetData(p) => handle_getdata(node, p).await,
        Message::Block(p) => handle_block(node, *p).await,
        Message::Tx(p) => handle_tx(node, *p).await,
        Message::Addr(p) => handle_addr(node, p).await,
    }
}

/// The version handshake a non-primary node sends on startup to the
/// seed, and that either side may send unsolicited afterward.
pub fn our_version(node: &Node) -> Result<Message, EmberError> {
    Ok(Message::Version(VersionPayload {
        version: PROTOCOL_VERSION,
        best_height: node.chain.get_best_height()?,
        from_addr: node.address.clone(),
    }))
}

async fn handle_version(node: &Node, remote: VersionPayload) -> Result<(), EmberError> {
    node.add_known_node(&remote.from_addr);
    let local_height = node.chain.get_best_height()?;

    if remote.best_height > local_height {
        let msg = Message::GetBlocks(GetBlocksPayload {
            from_addr: node.address.clone(),
        });
        send(node, &remote.from_addr, &msg).await.ok();
    } else if remote.best_height < local_height {
        let msg = our_version(node)?;
        send(node, &remote.from_addr, &msg).await.ok();
    }
    Ok(())
}

async fn handle_getblocks(node: &Node, remote: GetBlocksPayload) -> Result<(), EmberError> {
    let hashes = node.chain.get_block_hashes()?;
    let msg = Message::Inv(InvPayload {
        from_addr: node.address.clone(),
        kind: InvKind::Block,
        items: hashes,
    });
    send(node, &remote.from_addr, &msg).await.ok();
    Ok(())
}

async fn handle_inv(node: &Node, remote: InvPayload) -> Result<(), EmberError> {
    match remote.kind {
        InvKind::Block => {
            node.set_blocks_in_transit(remote.items.clone());
            if let Some(first) = remote.items.first().copied() {
                let msg = Message::GetData(GetDataPayload {
                    from_addr: node.address.clone(),
                    kind: InvKind::Block,
                    id: first,
                });
                send(node, &remote.from_addr, &msg).await.ok();
                node.remove_block_in_transit(&first);
            }
        }
        InvKind::Tx => {
            for id in &remote.items {
                if !node.mempool.contains(id) {
                    let msg = Message::GetData(GetDataPayload {
                        from_addr: node.address.clone(),
                        kind: InvKind::Tx,
                        id: *id,
                    });
                    send(node, &remote.from_addr, &msg).await.ok();
                }
            }
        }
    }
    Ok(())
}

async fn handle_getdata(node: &Node, remote: GetDataPayload) -> Result<(), EmberError> {
    match remote.kind {
        InvKind::Block => match node.chain.get_block(&remote.id) {
            Ok(block) => {
                let msg = Message::Block(Box::new(BlockPayload {
                    from_addr: node.address.clone(),
                    block,
                }));
                send(node, &remote.from_addr, &msg).await.ok();
            }
            Err(_) => warn!(id = %remote.id, "getdata requested unknown block, dropping"),
        },
        InvKind::Tx => {
            if let Some(transaction) = node.mempool.get(&remote.id) {
                let msg = Message::Tx(Box::new(TxPayload {
                    from_addr: node.address.clone(),
                    transaction,
                }));
                send(node, &remote.from_addr, &msg).await.ok();
            } else {
                warn!(id = %remote.id, "getdata requested unknown transaction, dropping");
            }
        }
    }
    Ok(())
}

async fn handle_block(node: &Node, remote: BlockPayload) -> Result<(), EmberError> {
    let hash = remote.block.hash;
    node.chain.add_block(&remote.block)?;
    info!(%hash, height = remote.block.height, "received block from peer");

    if let Some(next) = node.take_next_block_in_transit() {
        let msg = Message::GetData(GetDataPayload {
            from_addr: node.address.clone(),
            kind: InvKind::Block,
            id: next,
        });
        send(node, &remote.from_addr, &msg).await.ok();
    } else {
        UtxoIndex(&node.chain).reindex()?;
    }
    Ok(())
}

async fn handle_tx(node: &Node, remote: TxPayload) -> Result<(), EmberError> {
    let tx = remote.transaction;
    node.mempool.insert(tx.clone());

    if node.is_primary() {
        let msg = Message::Inv(InvPayload {
            from_addr: node.address.clone(),
            kind: InvKind::Tx,
            items: vec![tx.id],
        });
        crate::client::broadcast_except(node, &remote.from_addr, &msg).await;
    }
    Ok(())
}

async fn handle_addr(node: &Node, remote: AddrPayload) -> Result<(), EmberError> {
    for addr in &remote.addr_list {
        node.add_known_node(addr);
    }
    request_blocks(node).await;
    Ok(())
}

/// Send `getblocks` to every known node, e.g. after learning of new peers.
pub async fn request_blocks(node: &Node) {
    let msg = Message::GetBlocks(GetBlocksPayload {
        from_addr: node.address.clone(),
    });
    for addr in node.known_nodes() {
        let _ = send(node, &addr, &msg).await;
    }
}

/// The handshake a non-primary node performs on startup: announce our
/// version to the seed node.
pub async fn handshake_with_seed(node: &Node) -> Result<(), EmberError> {
    if node.is_primary() {
        return Ok(());
    }
    let msg = our_version(node)?;
    Ok(send(node, SEED_NODE, &msg).await?)
}
