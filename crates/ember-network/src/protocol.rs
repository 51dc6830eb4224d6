//! The wire frame and message bodies of the peer protocol.
//!
//! A frame is a fixed 12-byte ASCII command name, right-padded with NUL,
//! followed by the message body in the same canonical `bincode` encoding
//! used for on-disk storage. There is no length prefix: a connection
//! carries exactly one message and the sender closes after writing it
//! (see [`crate::client::send`]), so the reader consumes the socket to
//! EOF.

use ember_core::constants::COMMAND_LEN;
use ember_core::error::NetworkError;
use ember_core::types::{Block, Hash256, Transaction};

const CMD_VERSION: &str = "version";
const CMD_ADDR: &str = "addr";
const CMD_INV: &str = "inv";
const CMD_GETBLOCKS: &str = "getblocks";
const CMD_GETDATA: &str = "getdata";
const CMD_BLOCK: &str = "block";
const CMD_TX: &str = "tx";

/// This protocol's version number, carried in every handshake.
pub const PROTOCOL_VERSION: u64 = 1;

/// What an `inv`/`getdata` message's payload refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum InvKind {
    Block,
    Tx,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct VersionPayload {
    pub version: u64,
    pub best_height: u64,
    pub from_addr: String,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct AddrPayload {
    pub addr_list: Vec<String>,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct InvPayload {
    pub from_addr: String,
    pub kind: InvKind,
    pub items: Vec<Hash256>,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct GetBlocksPayload {
    pub from_addr: String,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct GetDataPayload {
    pub from_addr: String,
    pub kind: InvKind,
    pub id: Hash256,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct BlockPayload {
    pub from_addr: String,
    pub block: Block,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
pub struct TxPayload {
    pub from_addr: String,
    pub transaction: Transaction,
}

/// One frame's worth of wire protocol message.
#[derive(Debug, Clone)]
pub enum Message {
    Version(VersionPayload),
    Addr(AddrPayload),
    Inv(InvPayload),
    GetBlocks(GetBlocksPayload),
    GetData(GetDataPayload),
    Block(Box<BlockPayload>),
    Tx(Box<TxPayload>),
}

impl Message {
    fn command(&self) -> &'static str {
        match self {
            Message::Version(_) => CMD_VERSION,
            Message::Addr(_) => CMD_ADDR,
            Message::Inv(_) => CMD_INV,
            Message::GetBlocks(_) => CMD_GETBLOCKS,
            Message::GetData(_) => CMD_GETDATA,
            Message::Block(_) => CMD_BLOCK,
            Message::Tx(_) => CMD_TX,
        }
    }

    /// `from_addr` carried by every message variant: the sender's own
    /// listen address, used by handlers to address a reply.
    pub fn from_addr(&self) -> &str {
        match self {
            Message::Version(p) => &p.from_addr,
            Message::Inv(p) => &p.from_addr,
            Message::GetBlocks(p) => &p.from_addr,
            Message::GetData(p) => &p.from_addr,
            Message::Block(p) => &p.from_addr,
            Message::Tx(p) => &p.from_addr,
            Message::Addr(_) => "",
        }
    }

    /// Encode the 12-byte command prefix followed by the canonically
    /// encoded body.
    pub fn encode(&self) -> Result<Vec<u8>, NetworkError> {
        let mut frame = command_bytes(self.command());
        let body = match self {
            Message::Version(p) => bincode::encode_to_vec(p, bincode::config::standard()),
            Message::Addr(p) => bincode::encode_to_vec(p, bincode::config::standard()),
            Message::Inv(p) => bincode::encode_to_vec(p, bincode::config::standard()),
            Message::GetBlocks(p) => bincode::encode_to_vec(p, bincode::config::standard()),
            Message::GetData(p) => bincode::encode_to_vec(p, bincode::config::standard()),
            Message::Block(p) => bincode::encode_to_vec(p.as_ref(), bincode::config::standard()),
            Message::Tx(p) => bincode::encode_to_vec(p.as_ref(), bincode::config::standard()),
        }
        .map_err(|e| NetworkError::Malformed(e.to_string()))?;
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Split a frame into its command and decode the body under that
    /// command's payload type.
    pub fn decode(frame: &[u8]) -> Result<Self, NetworkError> {
        if frame.len() < COMMAND_LEN {
            return Err(NetworkError::Malformed(format!(
                "frame shorter than the {COMMAND_LEN}-byte command prefix"
            )));
        }
        let command = decode_command(&frame[..COMMAND_LEN]);
        let body = &frame[COMMAND_LEN..];
        let cfg = bincode::config::standard();

        match command.as_str() {
            CMD_VERSION => Ok(Message::Version(decode_body(body, cfg)?)),
            CMD_ADDR => Ok(Message::Addr(decode_body(body, cfg)?)),
            CMD_INV => Ok(Message::Inv(decode_body(body, cfg)?)),
            CMD_GETBLOCKS => Ok(Message::GetBlocks(decode_body(body, cfg)?)),
            CMD_GETDATA => Ok(Message::GetData(decode_body(body, cfg)?)),
            CMD_BLOCK => Ok(Message::Block(Box::new(decode_body(body, cfg)?))),
            CMD_TX => Ok(Message::Tx(Box::new(decode_body(body, cfg)?))),
            other => Err(NetworkError::UnknownCommand(other.to_string())),
        }
    }
}

fn decode_body<T>(body: &[u8], cfg: bincode::config::Configuration) -> Result<T, NetworkError>
where
    T: bincode::Decode<()>,
{
    bincode::decode_from_slice(body, cfg)
        .map(|(value, _)| value)
        .map_err(|e| NetworkError::Malformed(e.to_string()))
}

fn command_bytes(name: &str) -> Vec<u8> {
    assert!(name.len() <= COMMAND_LEN, "command name exceeds the fixed frame width");
    let mut bytes = vec![0u8; COMMAND_LEN];
    bytes[..name.len()].copy_from_slice(name.as_bytes());
    bytes
}

fn decode_command(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
