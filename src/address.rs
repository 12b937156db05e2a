//! Addresses on EVM and non-EVM chains
//!
//! LayerZero identifies remote contracts, DVNs and libraries by `bytes32`.
//! EVM addresses are left-padded into that form; Solana accounts and
//! programs already are 32 bytes and are written in base58.

use crate::error::{BridgeError, BridgeResult};

use ethers::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Contract or account address on any supported chain.
///
/// Identity is the `bytes32` form, so an EVM address and its left-padded
/// 32-byte spelling compare equal.
#[derive(Clone, Copy)]
pub enum ChainAddress {
    Evm(Address),
    /// 32-byte account, displayed in base58
    Bytes32([u8; 32]),
}

impl ChainAddress {
    pub fn to_bytes32(&self) -> [u8; 32] {
        match self {
            ChainAddress::Evm(address) => {
                let mut out = [0u8; 32];
                out[12..].copy_from_slice(address.as_bytes());
                out
            }
            ChainAddress::Bytes32(bytes) => *bytes,
        }
    }
}

impl From<Address> for ChainAddress {
    fn from(address: Address) -> Self {
        ChainAddress::Evm(address)
    }
}

impl FromStr for ChainAddress {
    type Err = BridgeError;

    /// `0x` hex of 20 or 32 bytes, or base58 of 32 bytes
    fn from_str(s: &str) -> BridgeResult<Self> {
        let raw = match s.strip_prefix("0x") {
            Some(digits) => hex::decode(digits).map_err(|e| e.to_string()),
            None => bs58::decode(s).into_vec().map_err(|e| e.to_string()),
        }
        .map_err(|e| BridgeError::Config(format!("Invalid address '{}': {}", s, e)))?;

        match (s.starts_with("0x"), raw.len()) {
            (true, 20) => Ok(ChainAddress::Evm(Address::from_slice(&raw))),
            (_, 32) => {
                let mut out = [0u8; 32];
                out.copy_from_slice(&raw);
                Ok(ChainAddress::Bytes32(out))
            }
            (_, len) => Err(BridgeError::Config(format!(
                "Invalid address '{}': {} bytes",
                s, len
            ))),
        }
    }
}

impl PartialEq for ChainAddress {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes32() == other.to_bytes32()
    }
}

impl Eq for ChainAddress {}

impl Hash for ChainAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes32().hash(state);
    }
}

impl PartialOrd for ChainAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChainAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes32().cmp(&other.to_bytes32())
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainAddress::Evm(address) => write!(f, "{:?}", address),
            ChainAddress::Bytes32(bytes) => f.write_str(&bs58::encode(bytes).into_string()),
        }
    }
}

impl fmt::Debug for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for ChainAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChainAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
