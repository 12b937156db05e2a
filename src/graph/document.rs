//! Declarative graph document consumed by deployment and governance tooling

use super::{ConnectionGraph, DirectionalSecurityConfig, ResolvedPoint};
use crate::error::{BridgeError, BridgeResult};
use crate::options::{encode_for_message_type, EnforcedOption, MessageType};

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    pub contracts: Vec<ContractEntry>,
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractEntry {
    pub contract: ResolvedPoint,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEntry {
    pub from: ResolvedPoint,
    pub to: ResolvedPoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<DirectionalSecurityConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enforced_options: Vec<EnforcedOption>,
    /// msgType -> type-3 options blob, as passed to `setEnforcedOptions`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub encoded_enforced_options: BTreeMap<u16, String>,
}

impl GraphDocument {
    pub fn from_graph(graph: &ConnectionGraph) -> BridgeResult<Self> {
        let contracts = graph
            .contracts()
            .map(|c| ContractEntry { contract: c.clone() })
            .collect();

        let mut connections = Vec::with_capacity(graph.len());
        for pathway in graph.pathways() {
            let mut encoded = BTreeMap::new();
            for message_type in [MessageType::Standard, MessageType::Composed] {
                if let Some(blob) = encode_for_message_type(&pathway.enforced_options, message_type)? {
                    encoded.insert(message_type.as_u16(), format!("0x{}", hex::encode(blob)));
                }
            }

            connections.push(ConnectionEntry {
                from: pathway.from.clone(),
                to: pathway.to.clone(),
                config: pathway.security.clone(),
                enforced_options: pathway.enforced_options.clone(),
                encoded_enforced_options: encoded,
            });
        }

        Ok(Self {
            contracts,
            connections,
        })
    }

    pub fn to_json_pretty(&self) -> BridgeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize graph: {}", e)))
    }
}
