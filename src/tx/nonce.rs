//! Nonce management for the signing account
//!
//! Nonces are tracked locally per chain so an approval and the send that
//! follows it never race for the same slot.

use crate::chain::ChainProvider;
use crate::error::{BridgeError, BridgeResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-chain nonce state
struct ChainNonceState {
    /// Next nonce to hand out
    current: u64,
}

/// Manages nonces across multiple chains
pub struct NonceManager {
    wallet_address: Address,
    chain_state: DashMap<u64, Arc<Mutex<ChainNonceState>>>,
}

impl NonceManager {
    pub fn new(wallet_address: Address) -> Self {
        Self {
            wallet_address,
            chain_state: DashMap::new(),
        }
    }

    /// Initialize nonce for a chain from its pending transaction count
    pub async fn init_chain(&self, provider: &ChainProvider) -> BridgeResult<()> {
        let chain_id = provider.chain_id();
        if self.chain_state.contains_key(&chain_id) {
            return Ok(());
        }

        let on_chain_nonce = self.fetch_nonce(provider).await?;
        self.chain_state
            .entry(chain_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(ChainNonceState {
                    current: on_chain_nonce,
                }))
            });
        debug!("Initialized nonce for chain {}: {}", chain_id, on_chain_nonce);

        Ok(())
    }

    /// Get the next nonce for a chain
    pub async fn get_nonce(&self, chain_id: u64) -> BridgeResult<u64> {
        let state = self.state(chain_id)?;
        let mut state = state.lock().await;
        let nonce = state.current;
        state.current += 1;

        debug!("Allocated nonce {} for chain {}", nonce, chain_id);
        Ok(nonce)
    }

    /// Release a nonce whose transaction never reached the mempool
    pub async fn release_nonce(&self, chain_id: u64, nonce: u64) -> BridgeResult<()> {
        let state = self.state(chain_id)?;
        let mut state = state.lock().await;

        // Only the most recent allocation can be handed back
        if state.current == nonce + 1 {
            state.current = nonce;
        }
        Ok(())
    }

    /// Sync with on-chain state, never moving backwards
    pub async fn sync(&self, provider: &ChainProvider) -> BridgeResult<()> {
        let chain_id = provider.chain_id();
        let on_chain_nonce = self.fetch_nonce(provider).await?;

        let state = self.state(chain_id)?;
        let mut state = state.lock().await;
        if on_chain_nonce > state.current {
            warn!(
                "Nonce gap detected on chain {}: local {}, chain {}",
                chain_id, state.current, on_chain_nonce
            );
            state.current = on_chain_nonce;
        }

        Ok(())
    }

    fn state(&self, chain_id: u64) -> BridgeResult<Arc<Mutex<ChainNonceState>>> {
        self.chain_state
            .get(&chain_id)
            .map(|s| s.clone())
            .ok_or(BridgeError::Nonce {
                chain_id,
                message: "Chain not initialized".to_string(),
            })
    }

    async fn fetch_nonce(&self, provider: &ChainProvider) -> BridgeResult<u64> {
        let nonce = provider.get_transaction_count(self.wallet_address).await?;
        Ok(nonce.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(chain_id: u64, next: u64) -> NonceManager {
        let manager = NonceManager::new(Address::zero());
        manager
            .chain_state
            .insert(chain_id, Arc::new(Mutex::new(ChainNonceState { current: next })));
        manager
    }

    #[tokio::test]
    async fn test_allocate_and_release() {
        let manager = seeded(1, 7);
        assert_eq!(manager.get_nonce(1).await.unwrap(), 7);
        assert_eq!(manager.get_nonce(1).await.unwrap(), 8);

        // An older nonce cannot be released once a later one is out
        manager.release_nonce(1, 7).await.unwrap();
        assert_eq!(manager.get_nonce(1).await.unwrap(), 9);

        manager.release_nonce(1, 9).await.unwrap();
        assert_eq!(manager.get_nonce(1).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_uninitialized_chain() {
        let manager = NonceManager::new(Address::zero());
        assert!(matches!(
            manager.get_nonce(5).await,
            Err(BridgeError::Nonce { chain_id: 5, .. })
        ));
    }
}
