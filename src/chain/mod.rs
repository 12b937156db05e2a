//! Chain module - RPC access to the configured networks
//!
//! Providers are created lazily the first time a network is used, so a
//! transfer between two networks never dials the others.

pub mod provider;

pub use provider::{ChainProvider, GasPrice};

use crate::config::{ChainKind, Settings};
use crate::error::{BridgeError, BridgeResult};

use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Holds one provider per network, keyed by network name
pub struct NetworkManager {
    settings: Arc<Settings>,
    providers: DashMap<String, Arc<ChainProvider>>,
}

impl NetworkManager {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            providers: DashMap::new(),
        }
    }

    /// Get or create the provider for a network
    pub fn get_provider(&self, network: &str) -> BridgeResult<Arc<ChainProvider>> {
        if let Some(provider) = self.providers.get(network) {
            return Ok(provider.clone());
        }

        let config = self.settings.network(network)?.clone();
        if config.kind != ChainKind::Evm {
            return Err(BridgeError::Config(format!(
                "network {} is not an EVM chain and cannot be used as a transfer source",
                network
            )));
        }
        info!(
            "Connecting to {} (eid {}, chain ID {})",
            network, config.eid, config.chain_id
        );

        let provider = Arc::new(ChainProvider::new(network, config)?);
        Ok(self
            .providers
            .entry(network.to_string())
            .or_insert(provider)
            .clone())
    }
}
