//! Transfer data types

use crate::address::ChainAddress;
use crate::error::{BridgeError, BridgeResult};

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// `SendParam` as accepted by `quoteSend` and `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendParam {
    pub dst_eid: u32,
    pub to: [u8; 32],
    pub amount_ld: U256,
    pub min_amount_ld: U256,
    pub extra_options: Bytes,
    pub compose_msg: Bytes,
    pub oft_cmd: Bytes,
}

/// `MessagingFee` returned by `quoteSend`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub native_fee: U256,
    pub lz_token_fee: U256,
}

/// Destination-side recipient as the 32-byte value the OFT expects
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Recipient(pub [u8; 32]);

impl Recipient {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<Address> for Recipient {
    /// Left-pads a 20-byte EVM address
    fn from(address: Address) -> Self {
        Self(ChainAddress::from(address).to_bytes32())
    }
}

impl From<ChainAddress> for Recipient {
    fn from(address: ChainAddress) -> Self {
        Self(address.to_bytes32())
    }
}

impl FromStr for Recipient {
    type Err = BridgeError;

    /// Accepts a 20-byte EVM address, a raw 32-byte hex value (`0x` optional)
    /// or a base58 32-byte account such as a Solana wallet
    fn from_str(s: &str) -> BridgeResult<Self> {
        let digits = s.trim_start_matches("0x");
        match hex::decode(digits) {
            Ok(raw) if raw.len() == 20 => Ok(Address::from_slice(&raw).into()),
            Ok(raw) if raw.len() == 32 => {
                let mut out = [0u8; 32];
                out.copy_from_slice(&raw);
                Ok(Self(out))
            }
            Ok(raw) if s.starts_with("0x") => Err(BridgeError::Config(format!(
                "Invalid recipient {}: expected 20 or 32 bytes, got {}",
                s,
                raw.len()
            ))),
            _ => s
                .parse::<ChainAddress>()
                .map(Self::from)
                .map_err(|_| {
                    BridgeError::Config(format!(
                        "Invalid recipient {}: expected EVM hex or a base58 32-byte account",
                        s
                    ))
                }),
        }
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Recipient(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// What the operator asks for
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub destination_eid: u32,
    /// Defaults to the operator address
    pub recipient: Option<Recipient>,
    pub amount: U256,
    /// Overrides the configured slippage tolerance
    pub min_amount: Option<U256>,
    /// Native value to attach; defaults to the quoted fee
    pub native_value: Option<U256>,
    /// Defaults to the operator address
    pub refund_address: Option<Address>,
    pub compose_msg: Bytes,
    /// Per-call gas for the compose call, added on top of enforced options
    pub compose_gas: Option<u64>,
    pub oft_cmd: Bytes,
}

impl TransferRequest {
    pub fn new(destination_eid: u32, amount: U256) -> Self {
        Self {
            destination_eid,
            recipient: None,
            amount,
            min_amount: None,
            native_value: None,
            refund_address: None,
            compose_msg: Bytes::default(),
            compose_gas: None,
            oft_cmd: Bytes::default(),
        }
    }
}

/// Stages of the quote-then-send state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStage {
    ResolveRoute,
    ApproveAllowance,
    Quote,
    Submit,
    Confirmed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::ResolveRoute => "RESOLVE_ROUTE",
            TransferStage::ApproveAllowance => "APPROVE_ALLOWANCE",
            TransferStage::Quote => "QUOTE",
            TransferStage::Submit => "SUBMIT",
            TransferStage::Confirmed => "CONFIRMED",
        };
        f.write_str(name)
    }
}

/// Outcome of a confirmed transfer on the source chain
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_id: Uuid,
    pub source_network: String,
    pub destination_eid: u32,
    pub tx_hash: H256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_tx: Option<H256>,
    pub quote: FeeQuote,
    pub min_amount_ld: U256,
    pub stages: Vec<TransferStage>,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_padding() {
        let address: Address = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        let recipient = Recipient::from(address);
        assert_eq!(&recipient.0[..12], &[0u8; 12]);
        assert_eq!(recipient.0[31], 0xff);

        let parsed: Recipient = "0x00000000000000000000000000000000000000ff".parse().unwrap();
        assert_eq!(parsed, recipient);
    }

    #[test]
    fn test_recipient_raw_32_bytes() {
        let raw = format!("0x{}", "ab".repeat(32));
        let recipient: Recipient = raw.parse().unwrap();
        assert_eq!(recipient.0, [0xab; 32]);
        assert_eq!(recipient.to_string(), raw);

        assert!("0x1234".parse::<Recipient>().is_err());
        assert!("not-hex".parse::<Recipient>().is_err());
    }

    #[test]
    fn test_recipient_base58_account() {
        let wallet = "HwpzV5qt9QzYRuWkHqTRuhbqtaMhapSNuriS5oMynkny";
        let recipient: Recipient = wallet.parse().unwrap();
        let expected: ChainAddress = wallet.parse().unwrap();
        assert_eq!(recipient.0, expected.to_bytes32());
        assert_ne!(&recipient.0[..12], &[0u8; 12]);

        // base58 that does not decode to 32 bytes
        assert!("HwpzV5qt9QzYRuWk".parse::<Recipient>().is_err());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(TransferStage::ApproveAllowance.to_string(), "APPROVE_ALLOWANCE");
        assert_eq!(
            serde_json::to_string(&TransferStage::ResolveRoute).unwrap(),
            "\"RESOLVE_ROUTE\""
        );
    }
}
