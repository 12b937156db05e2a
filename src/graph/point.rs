//! Pathway endpoints

use crate::address::ChainAddress;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// How a contract on a chain is identified before resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Locator {
    /// Deployment name looked up in the deployment registry
    Named(String),
    /// Literal contract address, EVM or 32-byte
    Literal(ChainAddress),
}

/// One side of a pathway as declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointPoint {
    pub eid: u32,
    pub locator: Locator,
}

impl EndpointPoint {
    pub fn named(eid: u32, contract_name: impl Into<String>) -> Self {
        Self {
            eid,
            locator: Locator::Named(contract_name.into()),
        }
    }

    pub fn literal(eid: u32, address: impl Into<ChainAddress>) -> Self {
        Self {
            eid,
            locator: Locator::Literal(address.into()),
        }
    }
}

impl fmt::Display for EndpointPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Locator::Named(name) => write!(f, "{}@{}", name, self.eid),
            Locator::Literal(address) => write!(f, "{}@{}", address, self.eid),
        }
    }
}

/// An endpoint after registry resolution.
///
/// Identity is `(eid, address)`; the contract name is carried for display and
/// for the configuration artifact only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPoint {
    pub eid: u32,
    pub address: ChainAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
}

impl ResolvedPoint {
    pub fn new(eid: u32, address: impl Into<ChainAddress>, contract_name: Option<String>) -> Self {
        Self {
            eid,
            address: address.into(),
            contract_name,
        }
    }

    fn key(&self) -> (u32, ChainAddress) {
        (self.eid, self.address)
    }
}

impl PartialEq for ResolvedPoint {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ResolvedPoint {}

impl Hash for ResolvedPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for ResolvedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResolvedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ResolvedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contract_name {
            Some(name) => write!(f, "{}({})@{}", name, self.address, self.eid),
            None => write!(f, "{}@{}", self.address, self.eid),
        }
    }
}
