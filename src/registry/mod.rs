//! Endpoint and deployment resolution
//!
//! The registry answers two questions: where the messaging endpoint of an eid
//! lives, and where a named contract was deployed on it.

mod deployments;

pub use deployments::DeploymentRegistry;

use crate::address::ChainAddress;
use crate::error::BridgeResult;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::Address;

/// A deployed contract
#[derive(Debug, Clone)]
pub struct Deployment {
    pub address: Address,
    /// Absent for inline address overrides
    pub abi: Option<Abi>,
}

/// Resolves endpoint ids to endpoint and deployment addresses
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait EndpointRegistry: Send + Sync {
    /// Messaging endpoint address for `eid`; a program id on non-EVM chains
    async fn resolve_endpoint(&self, eid: u32) -> BridgeResult<ChainAddress>;

    /// Deployment of `contract_name` on `eid`
    async fn resolve_deployment(&self, eid: u32, contract_name: &str) -> BridgeResult<Deployment>;
}
