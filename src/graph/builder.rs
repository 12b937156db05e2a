//! Turns configuration declarations into pathway declarations
//!
//! A pair `(a, b)` expands into `a -> b` and `b -> a`, each configured with
//! addresses from its own `from` network stack: libraries, executor and DVNs
//! are all set on the sending side's OApp.

use super::{
    ConnectionGraph, DirectionalSecurityConfig, DvnSet, EndpointPoint, PathwayDeclaration,
};
use crate::address::ChainAddress;
use crate::config::{
    parse_chain_address, ChainKind, PairConfig, PointConfig, SecurityDecl, Settings, StackConfig,
};
use crate::error::{BridgeError, BridgeResult};
use crate::options::EnforcedOption;
use crate::registry::EndpointRegistry;

use tracing::{debug, info};

/// Declarations ready for resolution
#[derive(Debug, Clone, Default)]
pub struct GraphDeclarations {
    pub contracts: Vec<EndpointPoint>,
    pub pathways: Vec<PathwayDeclaration>,
}

impl GraphDeclarations {
    /// Expand the `[graph]` section of the settings
    pub fn from_settings(settings: &Settings) -> BridgeResult<Self> {
        let mut declarations = Self::default();

        for point in &settings.graph.contracts {
            declarations.add_contract(endpoint_point(settings, point)?);
        }

        for pair in &settings.graph.pairs {
            let [forward, reverse] = expand_pair(settings, pair)?;
            declarations.add_contract(forward.from.clone());
            declarations.add_contract(forward.to.clone());
            declarations.pathways.push(forward);
            declarations.pathways.push(reverse);
        }

        for pathway in &settings.graph.pathways {
            let from = endpoint_point(settings, &pathway.from)?;
            let to = endpoint_point(settings, &pathway.to)?;

            let security = pathway
                .security
                .as_ref()
                .map(|decl| security_from_decl(settings, &pathway.from.network, decl))
                .transpose()?;
            let enforced_options = match &pathway.enforced_options {
                Some(set) => settings.option_set(set)?,
                None => Vec::new(),
            };

            declarations.add_contract(from.clone());
            declarations.add_contract(to.clone());
            declarations.pathways.push(PathwayDeclaration {
                from,
                to,
                security,
                enforced_options,
            });
        }

        debug!(
            "Expanded {} pathway declarations over {} contracts",
            declarations.pathways.len(),
            declarations.contracts.len()
        );
        Ok(declarations)
    }

    fn add_contract(&mut self, point: EndpointPoint) {
        if !self.contracts.contains(&point) {
            self.contracts.push(point);
        }
    }

    /// Resolve endpoints and build the graph
    pub async fn resolve(self, registry: &dyn EndpointRegistry) -> BridgeResult<ConnectionGraph> {
        let graph = ConnectionGraph::resolve(registry, self.contracts, self.pathways).await?;
        for pathway in graph.pathways() {
            if graph.pathway(&pathway.to, &pathway.from).is_none() {
                debug!("Pathway {} -> {} has no reverse direction", pathway.from, pathway.to);
            }
        }
        info!(
            "Connection graph ready: {} contracts, {} pathways",
            graph.contracts().count(),
            graph.len()
        );
        Ok(graph)
    }
}

fn endpoint_point(settings: &Settings, point: &PointConfig) -> BridgeResult<EndpointPoint> {
    let network = settings.network(&point.network)?;
    match (&point.contract, &point.address) {
        (Some(name), None) => Ok(EndpointPoint::named(network.eid, name.clone())),
        (None, Some(address)) => Ok(EndpointPoint::literal(
            network.eid,
            parse_chain_address(address, "contract")?,
        )),
        (None, None) if network.kind != ChainKind::Evm => Err(BridgeError::Config(format!(
            "contract on {} needs a literal address",
            point.network
        ))),
        (None, None) => Ok(EndpointPoint::named(network.eid, network.oft_contract.clone())),
        (Some(_), Some(_)) => Err(BridgeError::Config(format!(
            "contract on {} declares both a name and an address",
            point.network
        ))),
    }
}

fn expand_pair(settings: &Settings, pair: &PairConfig) -> BridgeResult<[PathwayDeclaration; 2]> {
    let a = endpoint_point(settings, &pair.a)?;
    let b = endpoint_point(settings, &pair.b)?;

    let [options_ab, options_ba] = match &pair.enforced_options {
        Some([ab, ba]) => [settings.option_set(ab)?, settings.option_set(ba)?],
        None => [Vec::new(), Vec::new()],
    };

    let direction = |from_network: &str,
                     from: EndpointPoint,
                     to: EndpointPoint,
                     confirmations: u64,
                     enforced_options: Vec<EnforcedOption>|
     -> BridgeResult<PathwayDeclaration> {
        let decl = SecurityDecl {
            confirmations,
            required_dvns: pair.required_dvns.clone(),
            optional_dvns: pair.optional_dvns.clone(),
            optional_dvn_threshold: pair.optional_dvn_threshold,
            send_library: None,
            receive_library: None,
            executor: None,
            grace_period: None,
            max_message_size: None,
        };
        Ok(PathwayDeclaration {
            from,
            to,
            security: Some(security_from_decl(settings, from_network, &decl)?),
            enforced_options,
        })
    };

    Ok([
        direction(&pair.a.network, a.clone(), b.clone(), pair.confirmations[0], options_ab)?,
        direction(&pair.b.network, b, a, pair.confirmations[1], options_ba)?,
    ])
}

fn security_from_decl(
    settings: &Settings,
    from_network: &str,
    decl: &SecurityDecl,
) -> BridgeResult<DirectionalSecurityConfig> {
    let network = settings.network(from_network)?;
    let stack = network.stack.as_ref();

    let send_library = stack_address(
        decl.send_library.as_ref(),
        stack.map(|s| &s.send_library),
        from_network,
        "send library",
    )?;
    let receive_library = stack_address(
        decl.receive_library.as_ref(),
        stack.map(|s| &s.receive_library),
        from_network,
        "receive library",
    )?;
    let executor = stack_address(
        decl.executor.as_ref(),
        stack.map(|s| &s.executor),
        from_network,
        "executor",
    )?;

    let required = resolve_dvns(network.eid, stack, &decl.required_dvns)?;
    let optional = resolve_dvns(network.eid, stack, &decl.optional_dvns)?;

    Ok(DirectionalSecurityConfig {
        send_library,
        receive_library,
        grace_period: decl
            .grace_period
            .or_else(|| stack.map(|s| s.grace_period))
            .unwrap_or(0),
        confirmations: decl.confirmations,
        dvns: DvnSet::new(required, optional, decl.optional_dvn_threshold),
        executor,
        max_message_size: decl
            .max_message_size
            .or_else(|| stack.map(|s| s.max_message_size))
            .unwrap_or(super::DEFAULT_MAX_MESSAGE_SIZE),
    })
}

/// Explicit value wins over the network stack
fn stack_address(
    explicit: Option<&String>,
    from_stack: Option<&String>,
    network: &str,
    what: &str,
) -> BridgeResult<ChainAddress> {
    let value = explicit.or(from_stack).ok_or_else(|| {
        BridgeError::Config(format!("network {} has no {} configured", network, what))
    })?;
    parse_chain_address(value, what)
}

/// DVN entries are either names from the stack's DVN table or literal addresses.
/// A stack name wins over a base58 literal of the same spelling.
fn resolve_dvns(
    eid: u32,
    stack: Option<&StackConfig>,
    names: &[String],
) -> BridgeResult<Vec<ChainAddress>> {
    names
        .iter()
        .map(|name| {
            if name.starts_with("0x") {
                return parse_chain_address(name, "DVN");
            }
            match stack.and_then(|s| s.dvns.get(name)) {
                Some(address) => parse_chain_address(address, name),
                None => name.parse::<ChainAddress>().map_err(|_| BridgeError::UnknownDvn {
                    eid,
                    name: name.clone(),
                }),
            }
        })
        .collect()
}
