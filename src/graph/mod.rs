//! Connection graph: directional pathways between OFT deployments
//!
//! The graph is built once from declarations and never mutated afterwards.
//! Construction validates every pathway eagerly; any configuration error
//! aborts the build and no partial graph is returned.

pub mod builder;
pub mod document;
pub mod point;
pub mod security;

pub use builder::GraphDeclarations;
pub use document::GraphDocument;
pub use point::{EndpointPoint, Locator, ResolvedPoint};
pub use security::{DirectionalSecurityConfig, DvnSet, DEFAULT_MAX_MESSAGE_SIZE};

use crate::address::ChainAddress;
use crate::error::{BridgeError, BridgeResult};
use crate::options::{canonicalize, EnforcedOption};
use crate::registry::EndpointRegistry;

use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A pathway as declared, before endpoint resolution
#[derive(Debug, Clone)]
pub struct PathwayDeclaration {
    pub from: EndpointPoint,
    pub to: EndpointPoint,
    /// `None` means the protocol defaults apply
    pub security: Option<DirectionalSecurityConfig>,
    pub enforced_options: Vec<EnforcedOption>,
}

/// A resolved, validated directional pathway
#[derive(Debug, Clone, PartialEq)]
pub struct Pathway {
    pub from: ResolvedPoint,
    pub to: ResolvedPoint,
    pub security: Option<DirectionalSecurityConfig>,
    /// Canonically ordered
    pub enforced_options: Vec<EnforcedOption>,
}

type PathwayKey = (ResolvedPoint, ResolvedPoint);

/// Immutable set of directional pathways
#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    contracts: BTreeSet<ResolvedPoint>,
    pathways: BTreeMap<PathwayKey, Pathway>,
}

impl ConnectionGraph {
    /// Build a graph from resolved pathways
    pub fn build(pathways: Vec<Pathway>) -> BridgeResult<Self> {
        let mut graph = Self::default();

        for mut pathway in pathways {
            if let Some(ref security) = pathway.security {
                security.validate(pathway.from.eid, pathway.to.eid)?;
            }
            pathway.enforced_options = canonicalize(&pathway.enforced_options)?;

            let key = (pathway.from.clone(), pathway.to.clone());
            if graph.pathways.contains_key(&key) {
                return Err(BridgeError::DuplicatePathway {
                    from: pathway.from.to_string(),
                    to: pathway.to.to_string(),
                });
            }

            graph.contracts.insert(pathway.from.clone());
            graph.contracts.insert(pathway.to.clone());
            graph.pathways.insert(key, pathway);
        }

        debug!(
            "Built connection graph with {} contracts and {} pathways",
            graph.contracts.len(),
            graph.pathways.len()
        );
        Ok(graph)
    }

    /// Resolve declared endpoints through the registry, then build.
    ///
    /// Each distinct endpoint is resolved once.
    pub async fn resolve(
        registry: &dyn EndpointRegistry,
        contracts: Vec<EndpointPoint>,
        declarations: Vec<PathwayDeclaration>,
    ) -> BridgeResult<Self> {
        let mut unique: Vec<EndpointPoint> = Vec::new();
        for point in contracts
            .iter()
            .chain(declarations.iter().flat_map(|d| [&d.from, &d.to]))
        {
            if !unique.contains(point) {
                unique.push(point.clone());
            }
        }

        let resolved = try_join_all(unique.iter().map(|p| resolve_point(registry, p))).await?;
        let lookup: HashMap<&EndpointPoint, ResolvedPoint> =
            unique.iter().zip(resolved).collect();

        let contracts: Vec<ResolvedPoint> = contracts.iter().map(|p| lookup[p].clone()).collect();
        let pathways = declarations
            .into_iter()
            .map(|d| Pathway {
                from: lookup[&d.from].clone(),
                to: lookup[&d.to].clone(),
                security: d.security,
                enforced_options: d.enforced_options,
            })
            .collect();

        // contracts outside every pathway are still listed
        let mut graph = Self::build(pathways)?;
        graph.contracts.extend(contracts);
        Ok(graph)
    }

    /// Look up the pathway for exactly `from -> to`
    pub fn pathway(&self, from: &ResolvedPoint, to: &ResolvedPoint) -> Option<&Pathway> {
        self.pathways.get(&(from.clone(), to.clone()))
    }

    /// All pathways leaving `from`
    pub fn pathways_from(&self, from: &ResolvedPoint) -> impl Iterator<Item = &Pathway> + '_ {
        let from = from.clone();
        self.pathways.values().filter(move |p| p.from == from)
    }

    /// The pathway leaving `from` towards any contract on `dst_eid`
    pub fn route_to(&self, from: &ResolvedPoint, dst_eid: u32) -> Option<&Pathway> {
        self.pathways_from(from).find(|p| p.to.eid == dst_eid)
    }

    /// Find a contract by eid and address
    pub fn contract(&self, eid: u32, address: impl Into<ChainAddress>) -> Option<&ResolvedPoint> {
        let address = address.into();
        self.contracts
            .iter()
            .find(|c| c.eid == eid && c.address == address)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ResolvedPoint> {
        self.contracts.iter()
    }

    pub fn pathways(&self) -> impl Iterator<Item = &Pathway> {
        self.pathways.values()
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }
}

async fn resolve_point(
    registry: &dyn EndpointRegistry,
    point: &EndpointPoint,
) -> BridgeResult<ResolvedPoint> {
    match &point.locator {
        Locator::Named(name) => {
            let deployment = registry.resolve_deployment(point.eid, name).await?;
            Ok(ResolvedPoint::new(point.eid, deployment.address, Some(name.clone())))
        }
        Locator::Literal(address) => Ok(ResolvedPoint::new(point.eid, *address, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MessageType;
    use crate::registry::{Deployment, MockEndpointRegistry};
    use ethers::types::Address;

    fn addr(n: u64) -> ChainAddress {
        Address::from_low_u64_be(n).into()
    }

    fn point(eid: u32, n: u64) -> ResolvedPoint {
        ResolvedPoint::new(eid, addr(n), None)
    }

    fn pathway(from: ResolvedPoint, to: ResolvedPoint) -> Pathway {
        Pathway {
            from,
            to,
            security: None,
            enforced_options: vec![],
        }
    }

    fn security(required: Vec<ChainAddress>) -> DirectionalSecurityConfig {
        DirectionalSecurityConfig {
            send_library: addr(100),
            receive_library: addr(101),
            grace_period: 0,
            confirmations: 15,
            dvns: DvnSet::new(required, vec![], 0),
            executor: addr(102),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    #[test]
    fn test_duplicate_pathway_rejected() {
        let a = point(1, 1);
        let b = point(2, 2);
        let err = ConnectionGraph::build(vec![
            pathway(a.clone(), b.clone()),
            pathway(a.clone(), b.clone()),
        ])
        .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicatePathway { .. }));
    }

    #[test]
    fn test_directionality() {
        let a = point(1, 1);
        let b = point(2, 2);
        let graph = ConnectionGraph::build(vec![pathway(a.clone(), b.clone())]).unwrap();

        assert!(graph.pathway(&a, &b).is_some());
        assert!(graph.pathway(&b, &a).is_none());
        assert!(graph.route_to(&a, 2).is_some());
        assert!(graph.route_to(&b, 1).is_none());
        assert_eq!(graph.contracts().count(), 2);
    }

    #[test]
    fn test_route_outlives_lookup_key() {
        let graph = ConnectionGraph::build(vec![pathway(point(1, 1), point(2, 2))]).unwrap();

        let found = {
            let from = point(1, 1);
            graph.route_to(&from, 2)
        };
        assert_eq!(found.map(|p| p.to.eid), Some(2));

        let leaving: Vec<&Pathway> = {
            let from = point(1, 1);
            graph.pathways_from(&from).collect()
        };
        assert_eq!(leaving.len(), 1);
    }

    #[test]
    fn test_reverse_direction_is_independent() {
        let a = point(1, 1);
        let b = point(2, 2);
        let mut forward = pathway(a.clone(), b.clone());
        forward.security = Some(security(vec![addr(9)]));
        let reverse = pathway(b.clone(), a.clone());

        let graph = ConnectionGraph::build(vec![forward, reverse]).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.pathway(&a, &b).unwrap().security.is_some());
        assert!(graph.pathway(&b, &a).unwrap().security.is_none());
    }

    #[test]
    fn test_empty_required_dvns_aborts_build() {
        let mut p = pathway(point(1, 1), point(2, 2));
        p.security = Some(security(vec![]));
        let err = ConnectionGraph::build(vec![p]).unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientDvnQuorum { .. }));
    }

    #[test]
    fn test_options_stored_canonically() {
        let mut p = pathway(point(1, 1), point(2, 2));
        p.enforced_options = vec![
            EnforcedOption::compose(MessageType::Composed, 0, 340_000, 0),
            EnforcedOption::receive(MessageType::Standard, 185_000, 0),
        ];
        let graph = ConnectionGraph::build(vec![p]).unwrap();
        let stored = &graph.pathways().next().unwrap().enforced_options;
        assert_eq!(stored[0].message_type, MessageType::Standard);
    }

    #[tokio::test]
    async fn test_resolve_collapses_names_with_same_address() {
        let mut registry = MockEndpointRegistry::new();
        registry
            .expect_resolve_deployment()
            .returning(|eid, _name| {
                Box::pin(async move {
                    Ok(Deployment {
                        address: Address::from_low_u64_be(eid as u64),
                        abi: None,
                    })
                })
            });

        let named = EndpointPoint::named(1, "AlloOFTUpgradeable");
        let alias = EndpointPoint::named(1, "AlloOFT");
        let remote = EndpointPoint::literal(2, addr(2));

        let err = ConnectionGraph::resolve(
            &registry,
            vec![],
            vec![
                PathwayDeclaration {
                    from: named,
                    to: remote.clone(),
                    security: None,
                    enforced_options: vec![],
                },
                PathwayDeclaration {
                    from: alias,
                    to: remote,
                    security: None,
                    enforced_options: vec![],
                },
            ],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::DuplicatePathway { .. }));
    }

    #[tokio::test]
    async fn test_resolve_propagates_registry_failure() {
        let mut registry = MockEndpointRegistry::new();
        registry
            .expect_resolve_deployment()
            .returning(|eid, name| {
                let message = format!("no deployment {} on eid {}", name, eid);
                Box::pin(async move { Err(BridgeError::UnresolvedNetwork(message)) })
            });

        let err = ConnectionGraph::resolve(
            &registry,
            vec![EndpointPoint::named(7, "AlloOFT")],
            vec![],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BridgeError::UnresolvedNetwork(_)));
    }
}
