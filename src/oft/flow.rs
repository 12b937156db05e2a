//! Quote-then-send state machine
//!
//! ```text
//! RESOLVE_ROUTE -> (APPROVE_ALLOWANCE) -> QUOTE -> SUBMIT -> CONFIRMED
//! ```
//!
//! Every stage is recorded as it is entered. A failure carries the stage it
//! happened in and nothing after it runs. Cross-chain delivery is not tracked.

use super::locks::{AllowanceKey, AllowanceLocks};
use super::route::OftRoute;
use super::types::{FeeQuote, Recipient, SendParam, TransferReceipt, TransferRequest, TransferStage};
use crate::config::{TokenVariant, TransferConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::graph::ConnectionGraph;
use crate::options::ExecutorOptions;
use crate::registry::EndpointRegistry;

use chrono::Utc;
use ethers::types::{Address, Bytes, H256, U256, U512};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A transfer failure and the stage it happened in
#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: TransferStage,
    #[source]
    pub error: BridgeError,
}

impl StageError {
    pub fn new(stage: TransferStage, error: BridgeError) -> Self {
        Self { stage, error }
    }
}

/// Result of the QUOTE stage
#[derive(Debug, Clone)]
pub struct QuotedTransfer {
    pub param: SendParam,
    pub quote: FeeQuote,
}

/// Runs transfers out of one source network
pub struct QuoteSendFlow {
    source_network: String,
    route: Arc<dyn OftRoute>,
    registry: Arc<dyn EndpointRegistry>,
    graph: Option<Arc<ConnectionGraph>>,
    locks: Arc<AllowanceLocks>,
    config: TransferConfig,
}

/// Per-transfer bookkeeping
struct Progress {
    stages: Vec<TransferStage>,
}

impl Progress {
    fn enter(&mut self, stage: TransferStage) {
        debug!("Entering {}", stage);
        self.stages.push(stage);
    }

    fn current(&self) -> TransferStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(TransferStage::ResolveRoute)
    }

    fn fail(&self, error: BridgeError) -> StageError {
        StageError::new(self.current(), error)
    }
}

impl QuoteSendFlow {
    pub fn new(
        source_network: impl Into<String>,
        route: Arc<dyn OftRoute>,
        registry: Arc<dyn EndpointRegistry>,
        locks: Arc<AllowanceLocks>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source_network: source_network.into(),
            route,
            registry,
            graph: None,
            locks,
            config,
        }
    }

    /// Require a declared pathway for every destination
    pub fn with_graph(mut self, graph: Arc<ConnectionGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Run RESOLVE_ROUTE and QUOTE only
    pub async fn quote(&self, request: &TransferRequest) -> Result<QuotedTransfer, StageError> {
        let mut progress = Progress { stages: Vec::new() };

        progress.enter(TransferStage::ResolveRoute);
        progress.enter(TransferStage::Quote);
        self.quote_stage(request)
            .await
            .map_err(|e| progress.fail(e))
    }

    /// Run the whole transfer
    pub async fn execute(&self, request: &TransferRequest) -> Result<TransferReceipt, StageError> {
        let transfer_id = Uuid::new_v4();
        let span = info_span!(
            "transfer",
            %transfer_id,
            network = %self.source_network,
            dst_eid = request.destination_eid
        );

        self.run(transfer_id, request).instrument(span).await
    }

    async fn run(
        &self,
        transfer_id: Uuid,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, StageError> {
        let mut progress = Progress { stages: Vec::new() };
        let operator = self.route.operator();

        progress.enter(TransferStage::ResolveRoute);
        let token = self.resolve_token().await.map_err(|e| progress.fail(e))?;
        info!(
            "Transferring {} from {} ({:?} variant, token {:?})",
            request.amount,
            self.source_network,
            self.route.variant(),
            token
        );

        // Held from the allowance check until `send` is included
        let (_allowance_guard, approval_tx) = if self.route.variant() == TokenVariant::Adapter {
            progress.enter(TransferStage::ApproveAllowance);
            let key = AllowanceKey {
                signer: operator,
                token,
                spender: self.route.address(),
            };
            let guard = self.locks.acquire(key).await;
            let approval_tx = self
                .approve_stage(token, operator, request.amount)
                .await
                .map_err(|e| progress.fail(e))?;
            (Some(guard), approval_tx)
        } else {
            (None, None)
        };

        progress.enter(TransferStage::Quote);
        let quoted = self
            .quote_stage(request)
            .await
            .map_err(|e| progress.fail(e))?;

        progress.enter(TransferStage::Submit);
        let tx_hash = self
            .submit_stage(request, &quoted, token, operator)
            .await
            .map_err(|e| progress.fail(e))?;

        progress.enter(TransferStage::Confirmed);
        info!("Transfer confirmed on source chain: {:?}", tx_hash);

        Ok(TransferReceipt {
            transfer_id,
            source_network: self.source_network.clone(),
            destination_eid: request.destination_eid,
            tx_hash,
            approval_tx,
            quote: quoted.quote,
            min_amount_ld: quoted.param.min_amount_ld,
            stages: progress.stages,
            submitted_at: Utc::now(),
        })
    }

    /// Token whose balance the transfer spends
    async fn resolve_token(&self) -> BridgeResult<Address> {
        match self.route.variant() {
            TokenVariant::Native => Ok(self.route.address()),
            TokenVariant::Adapter => self.route.inner_token().await,
        }
    }

    /// Approve exactly `amount` when the current allowance is short
    async fn approve_stage(
        &self,
        token: Address,
        operator: Address,
        amount: U256,
    ) -> BridgeResult<Option<H256>> {
        let spender = self.route.address();
        let allowance = self.route.allowance(token, operator, spender).await?;
        if allowance >= amount {
            debug!("Allowance {} covers {}, skipping approval", allowance, amount);
            return Ok(None);
        }

        info!("Allowance {} below {}, approving", allowance, amount);
        match self.route.approve(token, spender, amount).await {
            Ok(tx_hash) => Ok(Some(tx_hash)),
            Err(BridgeError::SubmissionRejected(raw)) => {
                Err(BridgeError::AllowanceApprovalFailed(raw))
            }
            Err(e) => Err(e),
        }
    }

    async fn quote_stage(&self, request: &TransferRequest) -> BridgeResult<QuotedTransfer> {
        self.check_routable(request.destination_eid).await?;

        let recipient = request
            .recipient
            .unwrap_or_else(|| Recipient::from(self.route.operator()));
        let min_amount_ld = self.min_amount(request)?;
        let mut extra_options =
            ExecutorOptions::new().lz_receive(u128::from(self.config.min_receive_gas), 0);
        if let (false, Some(gas)) = (request.compose_msg.is_empty(), request.compose_gas) {
            extra_options = extra_options.lz_compose(0, u128::from(gas), 0);
        }
        let extra_options = extra_options.to_bytes();

        let param = SendParam {
            dst_eid: request.destination_eid,
            to: *recipient.as_bytes(),
            amount_ld: request.amount,
            min_amount_ld,
            extra_options: Bytes::from(extra_options),
            compose_msg: request.compose_msg.clone(),
            oft_cmd: request.oft_cmd.clone(),
        };

        let quote = self.route.quote_send(&param).await?;
        info!(
            "Quoted native fee {} (lz token fee {}) to eid {}",
            quote.native_fee, quote.lz_token_fee, request.destination_eid
        );

        Ok(QuotedTransfer { param, quote })
    }

    /// The destination needs a declared pathway (when a graph is loaded) and a
    /// resolvable endpoint
    async fn check_routable(&self, dst_eid: u32) -> BridgeResult<()> {
        if let Some(graph) = &self.graph {
            let source = graph
                .contract(self.route.eid(), self.route.address())
                .ok_or_else(|| BridgeError::UnroutableDestination {
                    eid: dst_eid,
                    reason: format!(
                        "source OFT {:?}@{} is not part of the connection graph",
                        self.route.address(),
                        self.route.eid()
                    ),
                })?;
            if graph.route_to(source, dst_eid).is_none() {
                return Err(BridgeError::UnroutableDestination {
                    eid: dst_eid,
                    reason: format!("no pathway declared from {}", source),
                });
            }
        }

        match self.registry.resolve_endpoint(dst_eid).await {
            Ok(endpoint) => {
                debug!("Destination endpoint for eid {}: {}", dst_eid, endpoint);
                Ok(())
            }
            Err(BridgeError::UnresolvedNetwork(reason)) => {
                Err(BridgeError::UnroutableDestination { eid: dst_eid, reason })
            }
            Err(e) => Err(e),
        }
    }

    fn min_amount(&self, request: &TransferRequest) -> BridgeResult<U256> {
        let min_amount = match (request.min_amount, self.config.slippage_bps) {
            (Some(min_amount), _) => min_amount,
            (None, Some(bps)) => apply_slippage(request.amount, bps)?,
            (None, None) => request.amount,
        };

        if min_amount > request.amount {
            return Err(BridgeError::Config(format!(
                "Minimum amount {} exceeds amount {}",
                min_amount, request.amount
            )));
        }
        Ok(min_amount)
    }

    async fn submit_stage(
        &self,
        request: &TransferRequest,
        quoted: &QuotedTransfer,
        token: Address,
        operator: Address,
    ) -> BridgeResult<H256> {
        let quoted_fee = quoted.quote.native_fee;
        let attached = request.native_value.unwrap_or(quoted_fee);
        if attached < quoted_fee {
            return Err(BridgeError::InsufficientFee {
                attached,
                quoted: quoted_fee,
            });
        }

        let balance = self.route.balance_of(token, operator).await?;
        if balance < request.amount {
            return Err(BridgeError::InsufficientBalance {
                eid: self.route.eid(),
                have: Some(balance),
                need: request.amount,
            });
        }

        let refund = request.refund_address.unwrap_or(operator);
        if attached > quoted_fee {
            warn!(
                "Attaching {} above the quoted fee {}; excess is refunded to {:?}",
                attached, quoted_fee, refund
            );
        }

        self.route
            .send(&quoted.param, &quoted.quote, refund, attached)
            .await
    }
}

/// `amount * (10_000 - bps) / 10_000`, rounded down, for any `amount`
fn apply_slippage(amount: U256, bps: u16) -> BridgeResult<U256> {
    let kept = U256::from(10_000u64.saturating_sub(u64::from(bps)));
    U256::try_from(amount.full_mul(kept) / U512::from(10_000u64))
        .map_err(|_| BridgeError::Config(format!("Slippage of {} bps overflows {}", bps, amount)))
}
