//! Error types for the OFT bridge

use ethers::types::U256;
use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate pathway {from} -> {to}")]
    DuplicatePathway { from: String, to: String },

    #[error("Insufficient DVN quorum on pathway {from_eid} -> {to_eid}: {reason}")]
    InsufficientDvnQuorum {
        from_eid: u32,
        to_eid: u32,
        reason: String,
    },

    #[error("Invalid security config on pathway {from_eid} -> {to_eid}: {reason}")]
    InvalidSecurityConfig {
        from_eid: u32,
        to_eid: u32,
        reason: String,
    },

    #[error("Invalid enforced option: {0}")]
    InvalidOption(String),

    #[error("Malformed options blob: {0}")]
    MalformedOptions(String),

    #[error("Unknown DVN '{name}' on eid {eid}")]
    UnknownDvn { eid: u32, name: String },

    #[error("Unknown enforced option set '{0}'")]
    UnknownOptionSet(String),

    #[error("Destination eid {eid} is not routable: {reason}")]
    UnroutableDestination { eid: u32, reason: String },

    #[error("Unresolved network: {0}")]
    UnresolvedNetwork(String),

    /// `have` is `None` when the balance could not be read
    #[error("Insufficient balance on eid {eid}: have {}, need {need}", or_unknown(.have))]
    InsufficientBalance {
        eid: u32,
        have: Option<U256>,
        need: U256,
    },

    #[error("Insufficient fee: attached {attached}, quoted {quoted}")]
    InsufficientFee { attached: U256, quoted: U256 },

    #[error("Allowance approval failed: {0}")]
    AllowanceApprovalFailed(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Nonce error for chain {chain_id}: {message}")]
    Nonce { chain_id: u64, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

/// Coarse grouping used for reporting and exit handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Routing,
    Funds,
    Submission,
    Infrastructure,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::Config(_)
            | BridgeError::DuplicatePathway { .. }
            | BridgeError::InsufficientDvnQuorum { .. }
            | BridgeError::InvalidSecurityConfig { .. }
            | BridgeError::InvalidOption(_)
            | BridgeError::MalformedOptions(_)
            | BridgeError::UnknownDvn { .. }
            | BridgeError::UnknownOptionSet(_) => ErrorCategory::Configuration,
            BridgeError::UnroutableDestination { .. } | BridgeError::UnresolvedNetwork(_) => {
                ErrorCategory::Routing
            }
            BridgeError::InsufficientBalance { .. }
            | BridgeError::InsufficientFee { .. }
            | BridgeError::AllowanceApprovalFailed(_) => ErrorCategory::Funds,
            BridgeError::SubmissionRejected(_) => ErrorCategory::Submission,
            BridgeError::ChainConnection { .. }
            | BridgeError::Nonce { .. }
            | BridgeError::GasEstimation(_)
            | BridgeError::Wallet(_)
            | BridgeError::Contract(_)
            | BridgeError::Timeout { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// Check if the failure is transient (RPC level). Callers decide whether to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::ChainConnection { .. } | BridgeError::Timeout { .. }
        )
    }
}

fn or_unknown(amount: &Option<U256>) -> String {
    amount.map_or_else(|| "unknown".to_string(), |amount| amount.to_string())
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = BridgeError::DuplicatePathway {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = BridgeError::InsufficientFee {
            attached: U256::from(40),
            quoted: U256::from(50),
        };
        assert_eq!(err.category(), ErrorCategory::Funds);
        assert_eq!(err.to_string(), "Insufficient fee: attached 40, quoted 50");

        let err = BridgeError::InsufficientBalance {
            eid: 40161,
            have: None,
            need: U256::from(7),
        };
        assert_eq!(err.category(), ErrorCategory::Funds);
        assert_eq!(
            err.to_string(),
            "Insufficient balance on eid 40161: have unknown, need 7"
        );

        let err = BridgeError::UnresolvedNetwork("eid 7".into());
        assert_eq!(err.category(), ErrorCategory::Routing);
        assert!(!err.is_transient());
    }
}
