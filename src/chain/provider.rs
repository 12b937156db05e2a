//! Chain provider with multi-RPC support and automatic failover

use crate::config::{GasPriceStrategy, NetworkConfig};
use crate::error::{BridgeError, BridgeResult};

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network name from configuration
    name: String,
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(name: &str, config: NetworkConfig) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {}: {}", name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::ChainConnection {
                chain_id: config.chain_id,
                message: format!("No valid RPC providers for {}", name),
            });
        }

        Ok(Self {
            name: name.to_string(),
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.name, next);
    }

    fn connection_error(&self, message: impl Into<String>) -> BridgeError {
        BridgeError::ChainConnection {
            chain_id: self.config.chain_id,
            message: message.into(),
        }
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> BridgeResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number from {}: {}", self.name, e);
                    self.failover();
                }
            }
        }

        Err(self.connection_error("All providers failed"))
    }

    /// Execute a read-only call.
    ///
    /// Transport failures fail over to the next provider; a revert is returned
    /// as a contract error without trying other providers.
    pub async fn call(&self, tx: &TypedTransaction) -> BridgeResult<Bytes> {
        let mut last_error = None;
        for _ in 0..self.http_providers.len() {
            match self.http().call(tx, None).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    let message = e.to_string();
                    if is_revert(&message) {
                        return Err(BridgeError::Contract(message));
                    }
                    warn!("eth_call failed on {}: {}", self.name, message);
                    last_error = Some(message);
                    self.failover();
                }
            }
        }

        Err(self.connection_error(
            last_error.unwrap_or_else(|| "All providers failed eth_call".to_string()),
        ))
    }

    /// Get transaction receipt
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> BridgeResult<Option<TransactionReceipt>> {
        self.http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| self.connection_error(e.to_string()))
    }

    /// Get native balance of an account
    pub async fn get_balance(&self, account: Address) -> BridgeResult<U256> {
        self.http()
            .get_balance(account, None)
            .await
            .map_err(|e| self.connection_error(e.to_string()))
    }

    /// Get the pending transaction count of an account
    pub async fn get_transaction_count(&self, account: Address) -> BridgeResult<U256> {
        self.http()
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| BridgeError::Nonce {
                chain_id: self.config.chain_id,
                message: e.to_string(),
            })
    }

    /// Estimate gas for a transaction.
    ///
    /// The raw node message is kept so callers can classify reverts.
    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> BridgeResult<U256> {
        self.http()
            .estimate_gas(tx, None)
            .await
            .map_err(|e| BridgeError::GasEstimation(e.to_string()))
    }

    /// Broadcast a signed transaction
    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, String> {
        self.http()
            .send_raw_transaction(raw)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(|e| e.to_string())
    }

    /// Get current gas price based on chain strategy
    pub async fn get_gas_price(&self) -> BridgeResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy | GasPriceStrategy::Arbitrum => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| BridgeError::GasEstimation(e.to_string()))?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 | GasPriceStrategy::Optimism => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    /// Estimate EIP-1559 fees
    async fn estimate_eip1559_fees(&self) -> BridgeResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| BridgeError::GasEstimation(e.to_string()))?
            .ok_or_else(|| BridgeError::GasEstimation("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| BridgeError::GasEstimation("No base fee in block".to_string()))?;

        Ok(eip1559_fees(base_fee, self.config.max_gas_price_gwei))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    pub fn eid(&self) -> u32 {
        self.config.eid
    }

    pub fn confirmation_blocks(&self) -> u64 {
        self.config.confirmation_blocks
    }
}

/// Max fee = 2 * base fee + 2 gwei priority, capped at the configured maximum
fn eip1559_fees(base_fee: U256, max_gas_price_gwei: u64) -> (U256, U256) {
    let priority_fee = U256::from(2_000_000_000u64);
    let max_fee = base_fee * 2 + priority_fee;
    let cap = U256::from(max_gas_price_gwei) * U256::from(1_000_000_000u64);
    let max_fee = std::cmp::min(max_fee, cap);
    (max_fee, std::cmp::min(priority_fee, max_fee))
}

/// Whether a node error message reports an EVM revert rather than a transport failure
pub fn is_revert(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("execution reverted") || lower.contains("revert")
}

/// Gas price types
#[derive(Debug, Clone, PartialEq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}
