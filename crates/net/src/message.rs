//! Wire messages and framing.
//!
//! Every message travels as a 2-byte little-endian length followed by that
//! many payload bytes; the payload is the canonical encoding of a tagged
//! [`Message`] variant. A frame that does not decode closes the session.

use basalt_codec::{Decode, Decoder, Encode, Encoder};
use basalt_types::{Address, Block, Transaction, H256};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{NetError, Result};

/// Identity a peer advertises: where to reach it and who it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    /// Endpoint accepting incoming connections.
    pub endpoint: SocketAddr,
    /// The peer's account address.
    pub address: Address,
}

impl Encode for PeerInfo {
    fn encode(&self, enc: &mut Encoder) {
        encode_endpoint(&self.endpoint, enc);
        enc.write(&self.address);
    }
}

impl Decode for PeerInfo {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        Ok(Self {
            endpoint: decode_endpoint(dec)?,
            address: dec.read()?,
        })
    }
}

fn encode_endpoint(endpoint: &SocketAddr, enc: &mut Encoder) {
    enc.write_bytes(endpoint.to_string().as_bytes());
}

fn decode_endpoint(dec: &mut Decoder<'_>) -> basalt_codec::Result<SocketAddr> {
    let text = String::from_utf8(dec.read_bytes()?).map_err(|e| {
        basalt_codec::Error::InvalidValue {
            type_name: "SocketAddr",
            reason: e.to_string(),
        }
    })?;
    text.parse().map_err(|_| basalt_codec::Error::InvalidValue {
        type_name: "SocketAddr",
        reason: format!("unparseable endpoint {text:?}"),
    })
}

/// The peer protocol vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// First message in both directions after the transport connects.
    Handshake {
        /// The sender's account address.
        address: Address,
        /// The sender's current top block.
        top_block: Block,
        /// Port the sender accepts connections on, when it does.
        public_port: Option<u16>,
    },
    /// Keep-alive probe.
    Ping,
    /// Keep-alive answer.
    Pong,
    /// Gossip of a pending transaction.
    Transaction(Transaction),
    /// Gossip of a block, or the answer to a `GetBlock`.
    Block(Block),
    /// Block lookup by hash.
    GetBlock(H256),
    /// Negative answer to a `GetBlock`.
    BlockNotFound(H256),
    /// Request for chain tip and peer set.
    GetInfo,
    /// Answer to `GetInfo`.
    Info {
        /// The responder's top block hash.
        top_hash: H256,
        /// Endpoints of the responder's peers.
        peers: Vec<SocketAddr>,
    },
    /// Iterative address lookup request.
    Lookup {
        /// Address being searched for.
        target: Address,
        /// Maximum number of peers to return.
        alpha: u8,
    },
    /// Answer to a `Lookup` for the same target.
    LookupResult {
        /// Address that was searched for.
        target: Address,
        /// Up to `alpha` closest peers by XOR distance.
        peers: Vec<PeerInfo>,
    },
    /// Orderly session end.
    Close,
}

impl Message {
    const TAG_HANDSHAKE: u8 = 0;
    const TAG_PING: u8 = 1;
    const TAG_PONG: u8 = 2;
    const TAG_TRANSACTION: u8 = 3;
    const TAG_BLOCK: u8 = 4;
    const TAG_GET_BLOCK: u8 = 5;
    const TAG_BLOCK_NOT_FOUND: u8 = 6;
    const TAG_GET_INFO: u8 = 7;
    const TAG_INFO: u8 = 8;
    const TAG_LOOKUP: u8 = 9;
    const TAG_LOOKUP_RESULT: u8 = 10;
    const TAG_CLOSE: u8 = 11;
}

impl Encode for Message {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::Handshake {
                address,
                top_block,
                public_port,
            } => {
                enc.write_u8(Self::TAG_HANDSHAKE);
                enc.write(address);
                enc.write(top_block);
                enc.write(public_port);
            }
            Self::Ping => enc.write_u8(Self::TAG_PING),
            Self::Pong => enc.write_u8(Self::TAG_PONG),
            Self::Transaction(tx) => {
                enc.write_u8(Self::TAG_TRANSACTION);
                enc.write(tx);
            }
            Self::Block(block) => {
                enc.write_u8(Self::TAG_BLOCK);
                enc.write(block);
            }
            Self::GetBlock(hash) => {
                enc.write_u8(Self::TAG_GET_BLOCK);
                enc.write(hash);
            }
            Self::BlockNotFound(hash) => {
                enc.write_u8(Self::TAG_BLOCK_NOT_FOUND);
                enc.write(hash);
            }
            Self::GetInfo => enc.write_u8(Self::TAG_GET_INFO),
            Self::Info { top_hash, peers } => {
                enc.write_u8(Self::TAG_INFO);
                enc.write(top_hash);
                enc.write_u32(peers.len() as u32);
                for endpoint in peers {
                    encode_endpoint(endpoint, enc);
                }
            }
            Self::Lookup { target, alpha } => {
                enc.write_u8(Self::TAG_LOOKUP);
                enc.write(target);
                enc.write_u8(*alpha);
            }
            Self::LookupResult { target, peers } => {
                enc.write_u8(Self::TAG_LOOKUP_RESULT);
                enc.write(target);
                enc.write_u32(peers.len() as u32);
                for peer in peers {
                    enc.write(peer);
                }
            }
            Self::Close => enc.write_u8(Self::TAG_CLOSE),
        }
    }
}

impl Decode for Message {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        match dec.read_u8()? {
            Self::TAG_HANDSHAKE => Ok(Self::Handshake {
                address: dec.read()?,
                top_block: dec.read()?,
                public_port: dec.read()?,
            }),
            Self::TAG_PING => Ok(Self::Ping),
            Self::TAG_PONG => Ok(Self::Pong),
            Self::TAG_TRANSACTION => Ok(Self::Transaction(dec.read()?)),
            Self::TAG_BLOCK => Ok(Self::Block(dec.read()?)),
            Self::TAG_GET_BLOCK => Ok(Self::GetBlock(dec.read()?)),
            Self::TAG_BLOCK_NOT_FOUND => Ok(Self::BlockNotFound(dec.read()?)),
            Self::TAG_GET_INFO => Ok(Self::GetInfo),
            Self::TAG_INFO => {
                let top_hash = dec.read()?;
                let count = dec.read_u32()?;
                let mut peers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    peers.push(decode_endpoint(dec)?);
                }
                Ok(Self::Info { top_hash, peers })
            }
            Self::TAG_LOOKUP => Ok(Self::Lookup {
                target: dec.read()?,
                alpha: dec.read_u8()?,
            }),
            Self::TAG_LOOKUP_RESULT => {
                let target = dec.read()?;
                let count = dec.read_u32()?;
                let mut peers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    peers.push(dec.read()?);
                }
                Ok(Self::LookupResult { target, peers })
            }
            Self::TAG_CLOSE => Ok(Self::Close),
            tag => Err(basalt_codec::Error::InvalidTag {
                tag,
                type_name: "Message",
            }),
        }
    }
}

/// Writes one framed message: `u16` little-endian length, then payload.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let payload = basalt_codec::to_bytes(msg);
    let len = u16::try_from(payload.len()).map_err(|_| NetError::Oversized {
        size: payload.len(),
    })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed message.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Message> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes).await?;
    let len = u16::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(basalt_codec::from_bytes(&payload)?)
}

/// XOR distance between two addresses, compared bytewise from the most
/// significant end.
pub fn xor_distance(a: &Address, b: &Address) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a.as_bytes()[i] ^ b.as_bytes()[i];
    }
    out
}
