//! Registry backed by network config and a hardhat-deploy style directory
//!
//! Deployment files live at `<dir>/<network name>/<ContractName>.json` and
//! carry at least `address` and `abi`.

use super::{Deployment, EndpointRegistry};
use crate::address::ChainAddress;
use crate::config::{parse_address, parse_chain_address, NetworkConfig, Settings};
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Deserialize)]
struct DeploymentFile {
    address: Address,
    #[serde(default)]
    abi: Option<Abi>,
}

/// Static registry built from settings
pub struct DeploymentRegistry {
    /// eid -> (network name, config)
    networks: HashMap<u32, (String, NetworkConfig)>,
    dir: PathBuf,
}

impl DeploymentRegistry {
    pub fn new(settings: &Settings) -> Self {
        let networks = settings
            .networks
            .iter()
            .map(|(name, network)| (network.eid, (name.clone(), network.clone())))
            .collect();

        Self {
            networks,
            dir: settings.deployments.dir.clone(),
        }
    }

    fn network(&self, eid: u32) -> BridgeResult<&(String, NetworkConfig)> {
        self.networks
            .get(&eid)
            .ok_or_else(|| BridgeError::UnresolvedNetwork(format!("no network with eid {}", eid)))
    }
}

#[async_trait]
impl EndpointRegistry for DeploymentRegistry {
    async fn resolve_endpoint(&self, eid: u32) -> BridgeResult<ChainAddress> {
        let (name, network) = self.network(eid)?;
        let address = network.endpoint_address.as_deref().ok_or_else(|| {
            BridgeError::UnresolvedNetwork(format!("network {} has no endpoint address", name))
        })?;
        parse_chain_address(address, "endpoint")
            .map_err(|e| BridgeError::UnresolvedNetwork(format!("network {}: {}", name, e)))
    }

    async fn resolve_deployment(&self, eid: u32, contract_name: &str) -> BridgeResult<Deployment> {
        let (name, network) = self.network(eid)?;

        if let Some(address) = network.deployments.get(contract_name) {
            let address = parse_address(address, contract_name)?;
            return Ok(Deployment { address, abi: None });
        }

        let path = self.dir.join(name).join(format!("{}.json", contract_name));
        debug!("Reading deployment {} from {:?}", contract_name, path);

        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            BridgeError::UnresolvedNetwork(format!(
                "no deployment of {} on {} ({:?}): {}",
                contract_name, name, path, e
            ))
        })?;
        let file: DeploymentFile = serde_json::from_str(&contents).map_err(|e| {
            BridgeError::UnresolvedNetwork(format!("invalid deployment file {:?}: {}", path, e))
        })?;

        Ok(Deployment {
            address: file.address,
            abi: file.abi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;

    fn settings_with_dir(dir: &std::path::Path) -> Settings {
        let mut settings = Settings::from_toml_str(SAMPLE).unwrap();
        settings.deployments.dir = dir.to_path_buf();
        settings
    }

    #[tokio::test]
    async fn test_inline_and_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeploymentRegistry::new(&settings_with_dir(dir.path()));

        let deployment = registry
            .resolve_deployment(40161, "AlloOFTUpgradeable")
            .await
            .unwrap();
        assert_eq!(deployment.address, Address::from_low_u64_be(0xa1));
        assert!(deployment.abi.is_none());

        let endpoint = registry.resolve_endpoint(40245).await.unwrap();
        let expected: Address = "0x6EDCE65403992e310A62460808c4b910D972f10f".parse().unwrap();
        assert_eq!(endpoint, ChainAddress::from(expected));

        assert!(matches!(
            registry.resolve_endpoint(30101).await,
            Err(BridgeError::UnresolvedNetwork(_))
        ));
    }

    #[tokio::test]
    async fn test_solana_endpoint_program() {
        let input = format!(
            "{}\n{}",
            SAMPLE,
            r#"
[networks.solana-testnet]
eid = 40168
kind = "solana"
endpoint_address = "76y77prsiCMvXMjuoZ5VRrhG5qYBrUMYTE5WgHqgjEn6"
"#
        );
        let registry = DeploymentRegistry::new(&Settings::from_toml_str(&input).unwrap());

        let endpoint = registry.resolve_endpoint(40168).await.unwrap();
        assert!(matches!(endpoint, ChainAddress::Bytes32(_)));
        assert_eq!(endpoint.to_string(), "76y77prsiCMvXMjuoZ5VRrhG5qYBrUMYTE5WgHqgjEn6");
    }

    #[tokio::test]
    async fn test_reads_deployment_file() {
        let dir = tempfile::tempdir().unwrap();
        let network_dir = dir.path().join("sepolia");
        std::fs::create_dir_all(&network_dir).unwrap();
        std::fs::write(
            network_dir.join("AlloOFTAdapter.json"),
            r#"{
                "address": "0x00000000000000000000000000000000000000c3",
                "abi": [{"type":"function","name":"token","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}],
                "transactionHash": "0x00"
            }"#,
        )
        .unwrap();

        let registry = DeploymentRegistry::new(&settings_with_dir(dir.path()));
        let deployment = registry
            .resolve_deployment(40161, "AlloOFTAdapter")
            .await
            .unwrap();
        assert_eq!(deployment.address, Address::from_low_u64_be(0xc3));
        assert!(deployment.abi.unwrap().function("token").is_ok());

        let err = registry
            .resolve_deployment(40245, "AlloOFTAdapter")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnresolvedNetwork(_)));
    }
}
