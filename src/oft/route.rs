//! The OFT contract on the source network, as seen by a transfer

use super::abi;
use super::types::{FeeQuote, SendParam};
use crate::chain::ChainProvider;
use crate::config::{NetworkConfig, TokenVariant};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::EndpointRegistry;
use crate::tx::TransactionSender;

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// Contract calls a transfer makes against the source-chain OFT and its token
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait OftRoute: Send + Sync {
    fn variant(&self) -> TokenVariant;

    /// Source endpoint id
    fn eid(&self) -> u32;

    /// OFT (or adapter) address; the spender for adapter approvals
    fn address(&self) -> Address;

    /// Account that signs the transfer
    fn operator(&self) -> Address;

    /// ERC-20 wrapped by an adapter
    async fn inner_token(&self) -> BridgeResult<Address>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address)
        -> BridgeResult<U256>;

    /// Approve and wait for inclusion
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> BridgeResult<H256>;

    async fn balance_of(&self, token: Address, owner: Address) -> BridgeResult<U256>;

    async fn quote_send(&self, param: &SendParam) -> BridgeResult<FeeQuote>;

    /// Submit `send` with `value` attached and wait for inclusion
    async fn send(
        &self,
        param: &SendParam,
        fee: &FeeQuote,
        refund: Address,
        value: U256,
    ) -> BridgeResult<H256>;
}

/// OFT route over JSON-RPC
pub struct EvmOftRoute {
    network: String,
    eid: u32,
    variant: TokenVariant,
    address: Address,
    provider: Arc<ChainProvider>,
    sender: Arc<TransactionSender>,
}

impl EvmOftRoute {
    /// Resolve the network's OFT deployment through the registry
    pub async fn resolve(
        network: &str,
        config: &NetworkConfig,
        registry: &dyn EndpointRegistry,
        provider: Arc<ChainProvider>,
        sender: Arc<TransactionSender>,
    ) -> BridgeResult<Self> {
        let deployment = registry
            .resolve_deployment(config.eid, &config.oft_contract)
            .await?;
        if let Some(ref contract_abi) = deployment.abi {
            check_abi(&config.oft_contract, config.token_variant, contract_abi)?;
        }

        info!(
            "Resolved {} on {} at {:?} ({:?} variant)",
            config.oft_contract, network, deployment.address, config.token_variant
        );

        Ok(Self {
            network: network.to_string(),
            eid: config.eid,
            variant: config.token_variant,
            address: deployment.address,
            provider,
            sender,
        })
    }

    async fn read(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.operator())
            .to(to)
            .data(data)
            .into();
        self.provider.call(&tx).await
    }
}

/// Reject deployments whose ABI cannot serve the configured variant
fn check_abi(contract: &str, variant: TokenVariant, contract_abi: &Abi) -> BridgeResult<()> {
    let mut required = vec!["quoteSend", "send"];
    if variant == TokenVariant::Adapter {
        required.push("token");
    }

    match required.into_iter().find(|name| contract_abi.function(name).is_err()) {
        Some(missing) => Err(BridgeError::Config(format!(
            "Deployment {} has no {}() function ({:?} variant)",
            contract, missing, variant
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl OftRoute for EvmOftRoute {
    fn variant(&self) -> TokenVariant {
        self.variant
    }

    fn eid(&self) -> u32 {
        self.eid
    }

    fn address(&self) -> Address {
        self.address
    }

    fn operator(&self) -> Address {
        self.sender.address()
    }

    async fn inner_token(&self) -> BridgeResult<Address> {
        let result = self.read(self.address, abi::encode_token()).await?;
        abi::decode_address(&result)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> BridgeResult<U256> {
        let result = self
            .read(token, abi::encode_allowance(owner, spender))
            .await?;
        abi::decode_uint(&result)
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> BridgeResult<H256> {
        debug!("Approving {} of {:?} to {:?} on {}", amount, token, spender, self.network);
        let receipt = self
            .sender
            .submit(
                &self.provider,
                token,
                abi::encode_approve(spender, amount),
                U256::zero(),
            )
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> BridgeResult<U256> {
        let result = self.read(token, abi::encode_balance_of(owner)).await?;
        abi::decode_uint(&result)
    }

    async fn quote_send(&self, param: &SendParam) -> BridgeResult<FeeQuote> {
        let result = self
            .read(self.address, abi::encode_quote_send(param, false))
            .await?;
        abi::decode_fee_quote(&result)
    }

    async fn send(
        &self,
        param: &SendParam,
        fee: &FeeQuote,
        refund: Address,
        value: U256,
    ) -> BridgeResult<H256> {
        let receipt = self
            .sender
            .submit(
                &self.provider,
                self.address,
                abi::encode_send(param, fee, refund),
                value,
            )
            .await?;
        Ok(receipt.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::parse_abi;

    #[test]
    fn test_check_abi_by_variant() {
        let oft = parse_abi(&[
            "function quoteSend(uint32 dstEid, bool payInLzToken) view returns (uint256)",
            "function send(uint32 dstEid, address refund) payable returns (bytes32)",
        ])
        .unwrap();
        assert!(check_abi("MyOFT", TokenVariant::Native, &oft).is_ok());

        let err = check_abi("MyOFT", TokenVariant::Adapter, &oft).unwrap_err();
        assert!(matches!(err, BridgeError::Config(ref msg) if msg.contains("token()")));

        let adapter = parse_abi(&[
            "function quoteSend(uint32 dstEid, bool payInLzToken) view returns (uint256)",
            "function send(uint32 dstEid, address refund) payable returns (bytes32)",
            "function token() view returns (address)",
        ])
        .unwrap();
        assert!(check_abi("MyOFTAdapter", TokenVariant::Adapter, &adapter).is_ok());
    }
}
