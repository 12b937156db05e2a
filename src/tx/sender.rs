//! Transaction sender: signs, submits and waits for inclusion
//!
//! Submissions are never retried. A transaction that fails to reach the
//! mempool hands its nonce back and surfaces the node's error to the caller.

use super::gas::GasEstimator;
use super::nonce::NonceManager;
use crate::chain::{ChainProvider, GasPrice};
use crate::config::{OperatorConfig, TransferConfig};
use crate::error::{BridgeError, BridgeResult};

use ethers::prelude::*;
use ethers::signers::coins_bip39::English;
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How a node rejected a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    InsufficientFunds,
    NonceTooLow,
    Rejected(String),
}

/// Classify a raw node error from estimation or broadcast
pub fn classify_send_error(message: &str) -> SendFailure {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        SendFailure::InsufficientFunds
    } else if lower.contains("nonce too low") {
        SendFailure::NonceTooLow
    } else {
        SendFailure::Rejected(message.to_string())
    }
}

/// Transaction sender bound to one operator wallet
pub struct TransactionSender {
    nonce_manager: NonceManager,
    gas_estimator: GasEstimator,
    wallet: LocalWallet,
    send_timeout: Duration,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl TransactionSender {
    pub fn new(wallet: LocalWallet, config: &TransferConfig) -> Self {
        info!("Transaction sender initialized with wallet: {:?}", wallet.address());

        Self {
            nonce_manager: NonceManager::new(wallet.address()),
            gas_estimator: GasEstimator::from_config(config),
            wallet,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
        }
    }

    /// Load the operator wallet from a private key or mnemonic env var
    pub fn load_wallet(operator: &OperatorConfig) -> BridgeResult<LocalWallet> {
        if let Ok(key) = std::env::var(&operator.private_key_env) {
            return key
                .trim()
                .parse::<LocalWallet>()
                .map_err(|e| BridgeError::Wallet(format!("Invalid private key: {}", e)));
        }

        if let Ok(phrase) = std::env::var(&operator.mnemonic_env) {
            return MnemonicBuilder::<English>::default()
                .phrase(phrase.trim())
                .index(operator.mnemonic_index)
                .and_then(|builder| builder.build())
                .map_err(|e| BridgeError::Wallet(format!("Invalid mnemonic: {}", e)));
        }

        Err(BridgeError::Wallet(format!(
            "No wallet configured. Set {} or {}",
            operator.private_key_env, operator.mnemonic_env
        )))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Sign and submit a call, then wait until it is included.
    ///
    /// Returns the receipt of a successful transaction; a reverted one is
    /// reported as `SubmissionRejected`.
    pub async fn submit(
        &self,
        provider: &ChainProvider,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> BridgeResult<TransactionReceipt> {
        let chain_id = provider.chain_id();
        self.nonce_manager.init_chain(provider).await?;

        let estimate_request: TypedTransaction = TransactionRequest::new()
            .from(self.address())
            .to(to)
            .data(data.clone())
            .value(value)
            .into();
        let gas_limit = match self
            .gas_estimator
            .estimate_gas_limit(provider, &estimate_request)
            .await
        {
            Ok(limit) => limit,
            // No gas limit yet, so only the value is known to be needed
            Err(BridgeError::GasEstimation(message)) => {
                return Err(self.rejection(provider, &message, value).await)
            }
            Err(e) => return Err(e),
        };
        let gas_price = self.gas_estimator.get_gas_price(provider).await?;

        let nonce = self.nonce_manager.get_nonce(chain_id).await?;
        let max_cost = GasEstimator::max_cost(value, gas_limit, &gas_price);
        let tx = build_tx(to, data, value, nonce, gas_limit, &gas_price);

        let tx_hash = match self.send(provider, &tx, max_cost).await {
            Ok(hash) => hash,
            Err(e) if may_be_pending(&e) => {
                warn!(
                    "Broadcast on {} timed out; nonce {} stays allocated",
                    provider.name(),
                    nonce
                );
                return Err(e);
            }
            Err(e) => {
                self.nonce_manager.release_nonce(chain_id, nonce).await?;
                return Err(e);
            }
        };
        info!("Transaction sent on {}: {:?} (nonce {})", provider.name(), tx_hash, nonce);

        let receipt = self.wait_for_receipt(provider, tx_hash).await?;
        if receipt.status == Some(U64::zero()) {
            return Err(BridgeError::SubmissionRejected(format!(
                "transaction {:?} reverted",
                tx_hash
            )));
        }

        Ok(receipt)
    }

    async fn send(
        &self,
        provider: &ChainProvider,
        tx: &TypedTransaction,
        max_cost: U256,
    ) -> BridgeResult<H256> {
        let wallet = self.wallet.clone().with_chain_id(provider.chain_id());
        let signature = wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| BridgeError::Wallet(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        match timeout(self.send_timeout, provider.send_raw_transaction(raw)).await {
            Ok(Ok(hash)) => Ok(hash),
            Ok(Err(message)) => Err(self.rejection(provider, &message, max_cost).await),
            Err(_) => Err(BridgeError::Timeout {
                operation: format!("send transaction on {}", provider.name()),
            }),
        }
    }

    /// Map a node error to the bridge error the caller sees
    async fn rejection(&self, provider: &ChainProvider, message: &str, need: U256) -> BridgeError {
        match classify_send_error(message) {
            SendFailure::InsufficientFunds => {
                let have = match provider.get_balance(self.address()).await {
                    Ok(balance) => Some(balance),
                    Err(e) => {
                        warn!("Balance read on {} failed: {}", provider.name(), e);
                        None
                    }
                };
                BridgeError::InsufficientBalance {
                    eid: provider.eid(),
                    have,
                    need,
                }
            }
            SendFailure::NonceTooLow => {
                warn!("Nonce too low on {}, syncing", provider.name());
                if let Err(e) = self.nonce_manager.sync(provider).await {
                    warn!("Nonce sync failed: {}", e);
                }
                BridgeError::Nonce {
                    chain_id: provider.chain_id(),
                    message: message.to_string(),
                }
            }
            SendFailure::Rejected(raw) => BridgeError::SubmissionRejected(raw),
        }
    }

    /// Poll for the receipt until the receipt timeout elapses
    async fn wait_for_receipt(
        &self,
        provider: &ChainProvider,
        tx_hash: H256,
    ) -> BridgeResult<TransactionReceipt> {
        let poll = async {
            loop {
                match provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => debug!("Receipt poll for {:?} failed: {}", tx_hash, e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let receipt = timeout(self.receipt_timeout, poll)
            .await
            .map_err(|_| BridgeError::Timeout {
                operation: format!("receipt of {:?}", tx_hash),
            })?;

        self.wait_for_confirmations(provider, &receipt).await?;
        Ok(receipt)
    }

    /// Wait until the including block is `confirmation_blocks` deep
    async fn wait_for_confirmations(
        &self,
        provider: &ChainProvider,
        receipt: &TransactionReceipt,
    ) -> BridgeResult<()> {
        let depth = provider.confirmation_blocks();
        let included = match receipt.block_number {
            Some(block) if depth > 1 => block.as_u64(),
            _ => return Ok(()),
        };
        let target = included + depth - 1;

        let wait = async {
            loop {
                match provider.get_block_number().await {
                    Ok(head) if head >= target => return,
                    Ok(head) => debug!("Block {} of {} on {}", head, target, provider.name()),
                    Err(e) => debug!("Block number poll failed: {}", e),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        timeout(self.receipt_timeout, wait)
            .await
            .map_err(|_| BridgeError::Timeout {
                operation: format!("{} confirmations of {:?}", depth, receipt.transaction_hash),
            })
    }
}

/// A broadcast that timed out may still have reached the mempool
fn may_be_pending(error: &BridgeError) -> bool {
    matches!(error, BridgeError::Timeout { .. })
}

/// Build a signed-ready transaction for the chain's gas price model
fn build_tx(
    to: Address,
    data: Bytes,
    value: U256,
    nonce: u64,
    gas_limit: U256,
    gas_price: &GasPrice,
) -> TypedTransaction {
    match gas_price {
        GasPrice::Legacy(price) => TransactionRequest::new()
            .to(to)
            .data(data)
            .value(value)
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(*price)
            .into(),
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .to(to)
            .data(data)
            .value(value)
            .nonce(nonce)
            .gas(gas_limit)
            .max_fee_per_gas(*max_fee_per_gas)
            .max_priority_fee_per_gas(*max_priority_fee_per_gas)
            .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::config::Settings;

    const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const HARDHAT_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn operator(private_key_env: &str, mnemonic_env: &str) -> OperatorConfig {
        OperatorConfig {
            private_key_env: private_key_env.to_string(),
            mnemonic_env: mnemonic_env.to_string(),
            mnemonic_index: 0,
        }
    }

    #[test]
    fn test_classify_send_error() {
        assert_eq!(
            classify_send_error("insufficient funds for gas * price + value"),
            SendFailure::InsufficientFunds
        );
        assert_eq!(
            classify_send_error("nonce too low: next nonce 5, tx nonce 4"),
            SendFailure::NonceTooLow
        );
        assert_eq!(
            classify_send_error("execution reverted: LZ_InsufficientFee"),
            SendFailure::Rejected("execution reverted: LZ_InsufficientFee".to_string())
        );
    }

    #[test]
    fn test_load_wallet_from_private_key() {
        std::env::set_var("OFT_TEST_PK_ONLY", HARDHAT_KEY);
        let wallet =
            TransactionSender::load_wallet(&operator("OFT_TEST_PK_ONLY", "OFT_TEST_UNSET_M1"))
                .unwrap();
        assert_eq!(wallet.address(), HARDHAT_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn test_load_wallet_from_mnemonic() {
        std::env::set_var("OFT_TEST_MNEMONIC_ONLY", HARDHAT_MNEMONIC);
        let wallet = TransactionSender::load_wallet(&operator(
            "OFT_TEST_UNSET_PK1",
            "OFT_TEST_MNEMONIC_ONLY",
        ))
        .unwrap();
        assert_eq!(wallet.address(), HARDHAT_ADDRESS.parse::<Address>().unwrap());
    }

    #[test]
    fn test_no_wallet_configured() {
        let err = TransactionSender::load_wallet(&operator("OFT_TEST_UNSET_PK2", "OFT_TEST_UNSET_M2"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Wallet(_)));
    }

    #[test]
    fn test_only_timeouts_keep_the_nonce() {
        assert!(may_be_pending(&BridgeError::Timeout {
            operation: "send transaction on sepolia".into(),
        }));
        assert!(!may_be_pending(&BridgeError::SubmissionRejected(
            "replacement transaction underpriced".into()
        )));
        assert!(!may_be_pending(&BridgeError::Wallet("signing failed".into())));
    }

    #[tokio::test]
    async fn test_insufficient_funds_without_balance() {
        let settings = Settings::from_toml_str(
            &SAMPLE.replace("https://rpc.sepolia.org/", "http://127.0.0.1:1"),
        )
        .unwrap();
        let provider =
            ChainProvider::new("sepolia", settings.network("sepolia").unwrap().clone()).unwrap();
        let wallet: LocalWallet = HARDHAT_KEY.parse().unwrap();
        let sender = TransactionSender::new(wallet, &TransferConfig::default());

        let err = sender
            .rejection(
                &provider,
                "insufficient funds for gas * price + value",
                U256::from(7),
            )
            .await;
        assert!(matches!(
            err,
            BridgeError::InsufficientBalance {
                eid: 40161,
                have: None,
                need,
            } if need == U256::from(7)
        ));

        let err = sender
            .rejection(&provider, "execution reverted", U256::from(7))
            .await;
        assert!(matches!(err, BridgeError::SubmissionRejected(ref raw) if raw == "execution reverted"));
    }

    #[test]
    fn test_build_tx_by_gas_model() {
        let to = Address::from_low_u64_be(9);
        let legacy = build_tx(
            to,
            Bytes::from(vec![1, 2]),
            U256::from(5),
            3,
            U256::from(100_000),
            &GasPrice::Legacy(U256::from(7)),
        );
        assert!(matches!(legacy, TypedTransaction::Legacy(_)));
        assert_eq!(legacy.value(), Some(&U256::from(5)));
        assert_eq!(legacy.nonce(), Some(&U256::from(3)));

        let dynamic = build_tx(
            to,
            Bytes::default(),
            U256::zero(),
            4,
            U256::from(100_000),
            &GasPrice::Eip1559 {
                max_fee_per_gas: U256::from(10),
                max_priority_fee_per_gas: U256::from(1),
            },
        );
        assert!(matches!(dynamic, TypedTransaction::Eip1559(_)));
        assert_eq!(dynamic.gas(), Some(&U256::from(100_000)));
    }
}
