//! Client and contract account state.

use crate::{Balance, H256};
use basalt_codec::{Decode, Decoder, Encode, Encoder};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The state of one account.
///
/// Client accounts come into existence lazily on first credit; contract
/// accounts only through a successful contract-creation transaction.
/// Contract storage is kept by the state manager, keyed separately, so the
/// account record itself stays cheap to copy and persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Account {
    /// An externally owned account.
    Client {
        /// Spendable balance.
        balance: Balance,
        /// Monotonically increasing transaction counter.
        nonce: u64,
        /// Hashes of the transactions that touched this account, in order.
        tx_hashes: Vec<H256>,
    },
    /// A contract account.
    Contract {
        /// Balance held by the contract.
        balance: Balance,
        /// Runtime bytecode.
        code: Bytes,
        /// Serialized ABI blob, opaque to the node.
        abi: Bytes,
    },
}

impl Account {
    /// A fresh client account with zero balance.
    pub fn new_client() -> Self {
        Self::Client {
            balance: Balance::zero(),
            nonce: 0,
            tx_hashes: Vec::new(),
        }
    }

    /// A fresh contract account with zero balance.
    pub fn new_contract(code: impl Into<Bytes>, abi: impl Into<Bytes>) -> Self {
        Self::Contract {
            balance: Balance::zero(),
            code: code.into(),
            abi: abi.into(),
        }
    }

    /// The account balance, whichever the variant.
    pub fn balance(&self) -> &Balance {
        match self {
            Self::Client { balance, .. } | Self::Contract { balance, .. } => balance,
        }
    }

    /// Replaces the balance.
    pub fn set_balance(&mut self, new_balance: Balance) {
        match self {
            Self::Client { balance, .. } | Self::Contract { balance, .. } => {
                *balance = new_balance;
            }
        }
    }

    /// Whether this is a contract account.
    pub fn is_contract(&self) -> bool {
        matches!(self, Self::Contract { .. })
    }

    /// The contract code; empty for client accounts.
    pub fn code(&self) -> &[u8] {
        match self {
            Self::Client { .. } => &[],
            Self::Contract { code, .. } => code,
        }
    }
}

impl Encode for Account {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::Client {
                balance,
                nonce,
                tx_hashes,
            } => {
                enc.write_u8(0);
                enc.write(balance);
                enc.write_u64(*nonce);
                enc.write_u32(tx_hashes.len() as u32);
                for hash in tx_hashes {
                    enc.write(hash);
                }
            }
            Self::Contract { balance, code, abi } => {
                enc.write_u8(1);
                enc.write(balance);
                enc.write_bytes(code);
                enc.write_bytes(abi);
            }
        }
    }
}

impl Decode for Account {
    fn decode(dec: &mut Decoder<'_>) -> basalt_codec::Result<Self> {
        match dec.read_u8()? {
            0 => {
                let balance = dec.read()?;
                let nonce = dec.read_u64()?;
                let count = dec.read_u32()?;
                let mut tx_hashes = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    tx_hashes.push(dec.read()?);
                }
                Ok(Self::Client {
                    balance,
                    nonce,
                    tx_hashes,
                })
            }
            1 => Ok(Self::Contract {
                balance: dec.read()?,
                code: Bytes::from(dec.read_bytes()?),
                abi: Bytes::from(dec.read_bytes()?),
            }),
            tag => Err(basalt_codec::Error::InvalidTag {
                tag,
                type_name: "Account",
            }),
        }
    }
}
