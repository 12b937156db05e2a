//! Enforced executor options
//!
//! Enforced options are the destination-side gas and native value floors the
//! messaging protocol attaches to every incoming message of a given type,
//! regardless of what the sender asked for.

mod codec;

pub use codec::{decode, encode, encode_for_message_type, ExecutorOptions};

use crate::error::{BridgeError, BridgeResult};

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// OFT message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain token transfer (`SEND`)
    Standard,
    /// Transfer followed by a compose call (`SEND_AND_CALL`)
    Composed,
}

impl MessageType {
    pub fn as_u16(self) -> u16 {
        match self {
            MessageType::Standard => 1,
            MessageType::Composed => 2,
        }
    }

    pub fn from_u16(value: u16) -> BridgeResult<Self> {
        match value {
            1 => Ok(MessageType::Standard),
            2 => Ok(MessageType::Composed),
            other => Err(BridgeError::MalformedOptions(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

/// Executor option kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[serde(alias = "lz_receive")]
    Receive,
    #[serde(alias = "lz_compose")]
    Compose,
}

impl OptionKind {
    /// Executor option type discriminant
    pub fn discriminant(self) -> u8 {
        match self {
            OptionKind::Receive => 1,
            OptionKind::Compose => 3,
        }
    }

    pub fn from_discriminant(value: u8) -> BridgeResult<Self> {
        match value {
            1 => Ok(OptionKind::Receive),
            3 => Ok(OptionKind::Compose),
            other => Err(BridgeError::MalformedOptions(format!(
                "unsupported executor option type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Receive => write!(f, "lzReceive"),
            OptionKind::Compose => write!(f, "lzCompose"),
        }
    }
}

/// A single enforced gas/value floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcedOption {
    pub message_type: MessageType,
    pub kind: OptionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compose_index: Option<u16>,
    pub gas_limit: u128,
    pub native_value: u128,
}

impl EnforcedOption {
    pub fn receive(message_type: MessageType, gas_limit: u128, native_value: u128) -> Self {
        Self {
            message_type,
            kind: OptionKind::Receive,
            compose_index: None,
            gas_limit,
            native_value,
        }
    }

    pub fn compose(
        message_type: MessageType,
        compose_index: u16,
        gas_limit: u128,
        native_value: u128,
    ) -> Self {
        Self {
            message_type,
            kind: OptionKind::Compose,
            compose_index: Some(compose_index),
            gas_limit,
            native_value,
        }
    }

    /// Build an option from unbounded configuration values, narrowing them to
    /// the protocol widths.
    pub fn try_new(
        message_type: MessageType,
        kind: OptionKind,
        compose_index: Option<u64>,
        gas_limit: U256,
        native_value: U256,
    ) -> BridgeResult<Self> {
        let gas_limit = narrow_u128(gas_limit, "gas limit")?;
        let native_value = narrow_u128(native_value, "native value")?;

        let option = match (kind, compose_index) {
            (OptionKind::Receive, None) => Self::receive(message_type, gas_limit, native_value),
            (OptionKind::Compose, Some(index)) => {
                Self::compose(message_type, narrow_u16(index)?, gas_limit, native_value)
            }
            (kind, index) => Self {
                message_type,
                kind,
                compose_index: index.map(narrow_u16).transpose()?,
                gas_limit,
                native_value,
            },
        };
        option.validate()?;
        Ok(option)
    }

    /// Check the compose index is present exactly for compose options
    pub fn validate(&self) -> BridgeResult<()> {
        match (self.kind, self.compose_index) {
            (OptionKind::Receive, Some(index)) => Err(BridgeError::InvalidOption(format!(
                "lzReceive option for {:?} carries compose index {}",
                self.message_type, index
            ))),
            (OptionKind::Compose, None) => Err(BridgeError::InvalidOption(format!(
                "lzCompose option for {:?} has no compose index",
                self.message_type
            ))),
            _ => Ok(()),
        }
    }

    /// Ordering key: message type, then kind, then compose index
    pub(crate) fn canonical_cmp(&self, other: &Self) -> Ordering {
        (self.message_type, self.kind, self.compose_index).cmp(&(
            other.message_type,
            other.kind,
            other.compose_index,
        ))
    }
}

fn narrow_u16(index: u64) -> BridgeResult<u16> {
    u16::try_from(index)
        .map_err(|_| BridgeError::InvalidOption(format!("compose index {} exceeds u16", index)))
}

fn narrow_u128(value: U256, what: &str) -> BridgeResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(BridgeError::InvalidOption(format!(
            "{} {} exceeds u128",
            what, value
        )));
    }
    Ok(value.as_u128())
}

/// Validate and sort options into canonical order
pub fn canonicalize(options: &[EnforcedOption]) -> BridgeResult<Vec<EnforcedOption>> {
    for option in options {
        option.validate()?;
    }
    let mut sorted = options.to_vec();
    sorted.sort_by(|a, b| a.canonical_cmp(b));
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_rejects_misplaced_index() {
        let err = EnforcedOption::try_new(
            MessageType::Standard,
            OptionKind::Receive,
            Some(0),
            U256::from(185_000),
            U256::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOption(_)));

        let err = EnforcedOption::try_new(
            MessageType::Composed,
            OptionKind::Compose,
            None,
            U256::from(340_000),
            U256::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOption(_)));
    }

    #[test]
    fn test_try_new_rejects_overwide_values() {
        let too_wide = U256::from(u128::MAX) + U256::one();
        let err = EnforcedOption::try_new(
            MessageType::Standard,
            OptionKind::Receive,
            None,
            too_wide,
            U256::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOption(_)));

        let err = EnforcedOption::try_new(
            MessageType::Composed,
            OptionKind::Compose,
            Some(70_000),
            U256::from(1),
            U256::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidOption(_)));

        let max = EnforcedOption::try_new(
            MessageType::Standard,
            OptionKind::Receive,
            None,
            U256::from(u128::MAX),
            U256::zero(),
        )
        .unwrap();
        assert_eq!(max.gas_limit, u128::MAX);
    }

    #[test]
    fn test_canonical_order() {
        let options = vec![
            EnforcedOption::compose(MessageType::Composed, 1, 10, 0),
            EnforcedOption::receive(MessageType::Composed, 20, 0),
            EnforcedOption::compose(MessageType::Composed, 0, 30, 0),
            EnforcedOption::receive(MessageType::Standard, 40, 0),
        ];
        let sorted = canonicalize(&options).unwrap();
        let gas: Vec<u128> = sorted.iter().map(|o| o.gas_limit).collect();
        assert_eq!(gas, vec![40, 20, 30, 10]);
    }
}
