//! Operator command line

use crate::chain::NetworkManager;
use crate::config::{parse_address, parse_u256, Settings, CONFIG_ENV};
use crate::error::BridgeError;
use crate::graph::{GraphDeclarations, GraphDocument};
use crate::oft::{
    AllowanceLocks, EvmOftRoute, QuoteSendFlow, QuotedTransfer, Recipient, StageError,
    TransferRequest, TransferStage,
};
use crate::options::{canonicalize, decode, encode, encode_for_message_type, MessageType};
use crate::registry::{DeploymentRegistry, EndpointRegistry};
use crate::tx::TransactionSender;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::types::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "oft-bridge", version)]
#[command(about = "Configure OFT pathways and send tokens across chains")]
pub struct Cli {
    /// Configuration file (default: config/default.toml)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Source network for transfers
    #[arg(short, long, global = true, env = "OFT_BRIDGE_NETWORK")]
    pub network: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Quote and send tokens to another network
    Send(TransferArgs),

    /// Quote the native fee of a transfer without sending
    Quote(TransferArgs),

    /// Build the connection graph and print its configuration document
    Graph {
        /// Write the document to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show a named enforced option set and its encoded blobs, or decode a blob
    Options {
        /// Option set name from the configuration
        #[arg(long, required_unless_present = "decode", conflicts_with = "decode")]
        set: Option<String>,

        /// Combined options blob to decode, as printed under `combined` (hex)
        #[arg(long)]
        decode: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Token amount in local decimals
    #[arg(long)]
    pub amount: String,

    /// Destination network name
    #[arg(long)]
    pub to_network: String,

    /// Recipient: EVM address, 32-byte hex or base58 account; defaults to the sender
    #[arg(long)]
    pub to: Option<String>,

    /// Minimum amount to receive; defaults to the configured slippage tolerance
    #[arg(long)]
    pub min_amount: Option<String>,

    /// Native value to attach; defaults to the quoted fee
    #[arg(long)]
    pub value: Option<String>,

    /// Refund address for excess fee; defaults to the sender
    #[arg(long)]
    pub refund: Option<String>,

    /// Compose message forwarded to the destination (hex)
    #[arg(long)]
    pub compose_msg: Option<String>,

    /// Per-call gas for the compose call
    #[arg(long, requires = "compose_msg")]
    pub compose_gas: Option<u64>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = Arc::new(Settings::load(cli.config.as_deref())?);

    match &cli.command {
        Command::Send(args) => {
            let network = source_network(&cli)?;
            let (flow, request) = prepare_transfer(settings.clone(), network, args).await?;
            let receipt = flow.execute(&request).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Command::Quote(args) => {
            let network = source_network(&cli)?;
            let (flow, request) = prepare_transfer(settings.clone(), network, args).await?;
            let quoted = flow.quote(&request).await?;
            println!("{}", serde_json::to_string_pretty(&quote_summary(&settings, &quoted))?);
        }
        Command::Graph { output } => {
            let registry = DeploymentRegistry::new(&settings);
            let graph = GraphDeclarations::from_settings(&settings)?
                .resolve(&registry)
                .await?;
            if graph.is_empty() {
                warn!("No pathways declared; the document lists contracts only");
            }
            let document = GraphDocument::from_graph(&graph)?.to_json_pretty()?;

            match output {
                Some(path) => {
                    std::fs::write(path, document)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Wrote {} pathways to {:?}", graph.len(), path);
                }
                None => println!("{}", document),
            }
        }
        Command::Options {
            decode: Some(blob), ..
        } => {
            let raw = hex::decode(blob.trim_start_matches("0x")).context("Invalid options hex")?;
            let options = decode(&raw)?;
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Command::Options { set, .. } => {
            let set = set.as_deref().context("An option set name is required (--set)")?;
            let options = canonicalize(&settings.option_set(set)?)?;

            let mut per_message_type = BTreeMap::new();
            for message_type in [MessageType::Standard, MessageType::Composed] {
                if let Some(blob) = encode_for_message_type(&options, message_type)? {
                    per_message_type.insert(message_type.as_u16(), format!("0x{}", hex::encode(blob)));
                }
            }

            let output = serde_json::json!({
                "set": set,
                "options": options,
                "encoded": per_message_type,
                "combined": format!("0x{}", hex::encode(encode(&options)?)),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn quote_summary(settings: &Settings, quoted: &QuotedTransfer) -> serde_json::Value {
    let dst_network = settings
        .network_by_eid(quoted.param.dst_eid)
        .map(|(name, _)| name.as_str());

    serde_json::json!({
        "dstEid": quoted.param.dst_eid,
        "dstNetwork": dst_network,
        "to": format!("0x{}", hex::encode(quoted.param.to)),
        "amountLD": quoted.param.amount_ld.to_string(),
        "minAmountLD": quoted.param.min_amount_ld.to_string(),
        "extraOptions": quoted.param.extra_options,
        "nativeFee": quoted.quote.native_fee.to_string(),
        "lzTokenFee": quoted.quote.lz_token_fee.to_string(),
    })
}

fn source_network(cli: &Cli) -> Result<&str> {
    cli.network
        .as_deref()
        .context("A source network is required (--network or OFT_BRIDGE_NETWORK)")
}

/// Wire up the route for `network` and translate the arguments into a request.
///
/// Anything that fails here fails the RESOLVE_ROUTE stage.
async fn prepare_transfer(
    settings: Arc<Settings>,
    network: &str,
    args: &TransferArgs,
) -> Result<(QuoteSendFlow, TransferRequest), StageError> {
    let resolve = |e: BridgeError| StageError::new(TransferStage::ResolveRoute, e);

    let network_config = settings.network(network).map_err(resolve)?;
    let request = transfer_request(&settings, args).map_err(resolve)?;

    let registry: Arc<dyn EndpointRegistry> = Arc::new(DeploymentRegistry::new(&settings));
    let networks = NetworkManager::new(settings.clone());
    let provider = networks.get_provider(network).map_err(resolve)?;

    let wallet = TransactionSender::load_wallet(&settings.operator).map_err(resolve)?;
    let sender = Arc::new(TransactionSender::new(wallet, &settings.transfer));

    let route = EvmOftRoute::resolve(network, network_config, registry.as_ref(), provider, sender)
        .await
        .map_err(resolve)?;

    let mut flow = QuoteSendFlow::new(
        network,
        Arc::new(route),
        registry.clone(),
        Arc::new(AllowanceLocks::new()),
        settings.transfer.clone(),
    );

    if has_graph(&settings) {
        let graph = GraphDeclarations::from_settings(&settings)
            .map_err(resolve)?
            .resolve(registry.as_ref())
            .await
            .map_err(resolve)?;
        flow = flow.with_graph(Arc::new(graph));
    }

    Ok((flow, request))
}

fn has_graph(settings: &Settings) -> bool {
    !settings.graph.pairs.is_empty() || !settings.graph.pathways.is_empty()
}

fn transfer_request(settings: &Settings, args: &TransferArgs) -> Result<TransferRequest, BridgeError> {
    let destination = settings.network(&args.to_network)?;

    let mut request = TransferRequest::new(destination.eid, parse_u256(&args.amount)?);
    request.recipient = args.to.as_deref().map(str::parse::<Recipient>).transpose()?;
    request.min_amount = args.min_amount.as_deref().map(parse_u256).transpose()?;
    request.native_value = args.value.as_deref().map(parse_u256).transpose()?;
    request.refund_address = args
        .refund
        .as_deref()
        .map(|refund| parse_address(refund, "refund"))
        .transpose()?;
    if let Some(compose_msg) = &args.compose_msg {
        let raw = hex::decode(compose_msg.trim_start_matches("0x"))
            .map_err(|e| BridgeError::Config(format!("Invalid compose message: {}", e)))?;
        request.compose_msg = Bytes::from(raw);
    }
    request.compose_gas = args.compose_gas;

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::oft::types::{FeeQuote, SendParam};
    use ethers::types::{Address, U256};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_send() {
        let cli = parse(&[
            "oft-bridge",
            "--network",
            "sepolia",
            "send",
            "--amount",
            "1000",
            "--to-network",
            "base-sepolia",
            "--value",
            "0x10",
        ]);
        assert_eq!(cli.network.as_deref(), Some("sepolia"));
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.amount, "1000");
                assert_eq!(args.to_network, "base-sepolia");
                assert_eq!(args.value.as_deref(), Some("0x10"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["oft-bridge", "options", "--set", "evm", "--log-json"]);
        assert!(cli.log_json);
        assert!(matches!(
            cli.command,
            Command::Options { ref set, decode: None } if set.as_deref() == Some("evm")
        ));
    }

    #[test]
    fn test_options_set_or_decode() {
        let cli = parse(&["oft-bridge", "options", "--decode", "0x0003"]);
        assert!(matches!(
            cli.command,
            Command::Options { set: None, decode: Some(ref blob) } if blob == "0x0003"
        ));

        assert!(Cli::try_parse_from(["oft-bridge", "options"]).is_err());
        assert!(
            Cli::try_parse_from(["oft-bridge", "options", "--set", "evm", "--decode", "0x0003"])
                .is_err()
        );
    }

    #[test]
    fn test_compose_gas_requires_message() {
        assert!(Cli::try_parse_from([
            "oft-bridge",
            "quote",
            "--amount",
            "1",
            "--to-network",
            "sepolia",
            "--compose-gas",
            "1000",
        ])
        .is_err());
    }

    #[test]
    fn test_transfer_request_from_args() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        let args = TransferArgs {
            amount: "250".to_string(),
            to_network: "base-sepolia".to_string(),
            to: Some("0x00000000000000000000000000000000000000aa".to_string()),
            min_amount: Some("200".to_string()),
            value: None,
            refund: Some("0x00000000000000000000000000000000000000bb".to_string()),
            compose_msg: None,
            compose_gas: None,
        };

        let request = transfer_request(&settings, &args).unwrap();
        assert_eq!(request.destination_eid, 40245);
        assert_eq!(request.amount, U256::from(250));
        assert_eq!(request.min_amount, Some(U256::from(200)));
        assert_eq!(request.native_value, None);
        assert_eq!(request.refund_address, Some(Address::from_low_u64_be(0xbb)));
        assert_eq!(
            request.recipient,
            Some(Recipient::from(Address::from_low_u64_be(0xaa)))
        );

        let unknown = TransferArgs {
            to_network: "mainnet".to_string(),
            ..args
        };
        assert!(matches!(
            transfer_request(&settings, &unknown),
            Err(BridgeError::UnresolvedNetwork(_))
        ));
    }

    #[test]
    fn test_quote_summary_names_destination() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        let quoted = QuotedTransfer {
            param: SendParam {
                dst_eid: 40245,
                to: Recipient::from(Address::from_low_u64_be(0xaa)).0,
                amount_ld: U256::from(1000),
                min_amount_ld: U256::from(995),
                extra_options: Bytes::from(vec![0x00, 0x03]),
                compose_msg: Bytes::new(),
                oft_cmd: Bytes::new(),
            },
            quote: FeeQuote {
                native_fee: U256::from(50),
                lz_token_fee: U256::zero(),
            },
        };

        let summary = quote_summary(&settings, &quoted);
        assert_eq!(summary["dstEid"], 40245);
        assert_eq!(summary["dstNetwork"], "base-sepolia");
        assert_eq!(summary["minAmountLD"], "995");
        assert_eq!(summary["nativeFee"], "50");
        assert_eq!(
            summary["to"],
            "0x00000000000000000000000000000000000000000000000000000000000000aa"
        );

        let unknown = QuotedTransfer {
            param: SendParam {
                dst_eid: 30999,
                ..quoted.param.clone()
            },
            ..quoted
        };
        assert!(quote_summary(&settings, &unknown)["dstNetwork"].is_null());
    }
}
