//! Quote-then-send transfers of an omnichain fungible token
//!
//! A transfer leaves the source network through its OFT deployment. On the
//! native variant the OFT holds balances itself; on the adapter variant it
//! wraps an existing ERC-20 and needs an allowance before it can lock tokens.

pub mod abi;
mod flow;
mod locks;
mod route;
pub mod types;

pub use flow::{QuoteSendFlow, QuotedTransfer, StageError};
pub use locks::AllowanceLocks;
pub use route::EvmOftRoute;
pub use types::{Recipient, TransferRequest, TransferStage};
