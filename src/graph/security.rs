//! Per-pathway security stack

use crate::address::ChainAddress;
use crate::error::{BridgeError, BridgeResult};

use serde::Serialize;
use std::collections::BTreeSet;

/// Default executor message size cap used by the send library
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 10_000;

/// Verifier quorum. Addresses are kept sorted and unique, as the ULN expects.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvnSet {
    #[serde(rename = "requiredDVNs")]
    pub required: BTreeSet<ChainAddress>,
    #[serde(rename = "optionalDVNs")]
    pub optional: BTreeSet<ChainAddress>,
    #[serde(rename = "optionalDVNThreshold")]
    pub optional_threshold: u8,
}

impl DvnSet {
    pub fn new(
        required: impl IntoIterator<Item = ChainAddress>,
        optional: impl IntoIterator<Item = ChainAddress>,
        optional_threshold: u8,
    ) -> Self {
        Self {
            required: required.into_iter().collect(),
            optional: optional.into_iter().collect(),
            optional_threshold,
        }
    }
}

/// Libraries, executor and verifier quorum for one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionalSecurityConfig {
    pub send_library: ChainAddress,
    pub receive_library: ChainAddress,
    pub grace_period: u64,
    pub confirmations: u64,
    #[serde(flatten)]
    pub dvns: DvnSet,
    pub executor: ChainAddress,
    pub max_message_size: u32,
}

impl DirectionalSecurityConfig {
    /// Check the quorum and executor constraints for the `from_eid -> to_eid` pathway
    pub fn validate(&self, from_eid: u32, to_eid: u32) -> BridgeResult<()> {
        let dvns = &self.dvns;

        if dvns.required.is_empty() {
            return Err(BridgeError::InsufficientDvnQuorum {
                from_eid,
                to_eid,
                reason: "no required DVNs".to_string(),
            });
        }

        if dvns.optional_threshold as usize > dvns.optional.len() {
            return Err(BridgeError::InsufficientDvnQuorum {
                from_eid,
                to_eid,
                reason: format!(
                    "optional threshold {} exceeds {} optional DVNs",
                    dvns.optional_threshold,
                    dvns.optional.len()
                ),
            });
        }

        if !dvns.optional.is_empty() && dvns.optional_threshold == 0 {
            return Err(BridgeError::InvalidSecurityConfig {
                from_eid,
                to_eid,
                reason: "optional DVNs configured with a zero threshold".to_string(),
            });
        }

        if let Some(overlap) = dvns.required.intersection(&dvns.optional).next() {
            return Err(BridgeError::InvalidSecurityConfig {
                from_eid,
                to_eid,
                reason: format!("DVN {} is both required and optional", overlap),
            });
        }

        if self.max_message_size == 0 {
            return Err(BridgeError::InvalidSecurityConfig {
                from_eid,
                to_eid,
                reason: "max message size must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn addr(n: u64) -> ChainAddress {
        Address::from_low_u64_be(n).into()
    }

    fn config(dvns: DvnSet) -> DirectionalSecurityConfig {
        DirectionalSecurityConfig {
            send_library: addr(1),
            receive_library: addr(2),
            grace_period: 0,
            confirmations: 15,
            dvns,
            executor: addr(3),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    #[test]
    fn test_empty_required_fails_regardless_of_optional() {
        for (optional, threshold) in [(vec![], 0u8), (vec![addr(10), addr(11)], 1), (vec![addr(10)], 1)] {
            let err = config(DvnSet::new(vec![], optional, threshold))
                .validate(1, 2)
                .unwrap_err();
            assert!(matches!(err, BridgeError::InsufficientDvnQuorum { .. }));
        }
    }

    #[test]
    fn test_threshold_bounded_by_optional() {
        let err = config(DvnSet::new(vec![addr(10)], vec![addr(11)], 2))
            .validate(1, 2)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientDvnQuorum { .. }));

        assert!(config(DvnSet::new(vec![addr(10)], vec![addr(11), addr(12)], 2))
            .validate(1, 2)
            .is_ok());
    }

    #[test]
    fn test_overlap_and_message_size() {
        let err = config(DvnSet::new(vec![addr(10)], vec![addr(10)], 1))
            .validate(1, 2)
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidSecurityConfig { .. }));

        let mut zero = config(DvnSet::new(vec![addr(10)], vec![], 0));
        zero.max_message_size = 0;
        assert!(matches!(
            zero.validate(1, 2),
            Err(BridgeError::InvalidSecurityConfig { .. })
        ));
    }

    #[test]
    fn test_dvns_sorted_and_deduplicated() {
        let set = DvnSet::new(vec![addr(3), addr(1), addr(3)], vec![], 0);
        let required: Vec<ChainAddress> = set.required.into_iter().collect();
        assert_eq!(required, vec![addr(1), addr(3)]);
    }
}
