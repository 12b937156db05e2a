//! Gas estimation and buffering for different chain types

use crate::chain::{ChainProvider, GasPrice};
use crate::config::TransferConfig;
use crate::error::BridgeResult;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use tracing::debug;

/// Gas estimator for transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit_buffer_percent: u64, gas_price_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
            gas_price_buffer_percent,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(
            config.gas_limit_buffer_percent,
            config.gas_price_buffer_percent,
        )
    }

    /// Estimate the gas limit for `tx` and add the configured buffer
    pub async fn estimate_gas_limit(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
    ) -> BridgeResult<U256> {
        let estimate = provider.estimate_gas(tx).await?;
        let limit = self.buffer_gas_limit(estimate);
        debug!(
            "Gas limit on {}: estimate {}, with buffer {}",
            provider.name(),
            estimate,
            limit
        );
        Ok(limit)
    }

    pub fn buffer_gas_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Get buffered gas price for a chain
    pub async fn get_gas_price(&self, provider: &ChainProvider) -> BridgeResult<GasPrice> {
        let gas_price = provider.get_gas_price().await?;
        let buffered = self.buffer_gas_price(gas_price);
        debug!("Gas price for {}: {:?}", provider.name(), buffered);
        Ok(buffered)
    }

    pub fn buffer_gas_price(&self, gas_price: GasPrice) -> GasPrice {
        match gas_price {
            GasPrice::Legacy(price) => {
                let buffer = price * self.gas_price_buffer_percent / 100;
                GasPrice::Legacy(price + buffer)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let fee_buffer = max_fee_per_gas * self.gas_price_buffer_percent / 100;
                let priority_buffer =
                    max_priority_fee_per_gas * self.gas_price_buffer_percent / 100;
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee_per_gas + fee_buffer,
                    max_priority_fee_per_gas: max_priority_fee_per_gas + priority_buffer,
                }
            }
        }
    }

    /// Calculate worst-case cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> U256 {
        match gas_price {
            GasPrice::Legacy(price) => gas_limit.saturating_mul(*price),
            GasPrice::Eip1559 { max_fee_per_gas, .. } => gas_limit.saturating_mul(*max_fee_per_gas),
        }
    }

    /// Attached value plus worst-case gas, saturating at `U256::MAX`
    pub fn max_cost(value: U256, gas_limit: U256, gas_price: &GasPrice) -> U256 {
        value.saturating_add(Self::calculate_cost(gas_limit, gas_price))
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(20, 10)
    }
}
