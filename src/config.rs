//! Configuration management for the OFT bridge
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::address::ChainAddress;
use crate::error::{BridgeError, BridgeResult};
use crate::options::{EnforcedOption, MessageType, OptionKind};

use anyhow::{Context, Result};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable holding the config file path
pub const CONFIG_ENV: &str = "OFT_BRIDGE_CONFIG";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub deployments: DeploymentsConfig,
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub option_sets: HashMap<String, Vec<OptionDecl>>,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    #[serde(default = "default_mnemonic_env")]
    pub mnemonic_env: String,
    #[serde(default)]
    pub mnemonic_index: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
            mnemonic_env: default_mnemonic_env(),
            mnemonic_index: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    /// Per-call lzReceive gas requested in `extraOptions`
    #[serde(default = "default_min_receive_gas")]
    pub min_receive_gas: u64,
    /// Tolerated shortfall of the received amount, in basis points
    #[serde(default)]
    pub slippage_bps: Option<u16>,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_gas_limit_buffer_percent")]
    pub gas_limit_buffer_percent: u64,
    #[serde(default = "default_gas_price_buffer_percent")]
    pub gas_price_buffer_percent: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            min_receive_gas: default_min_receive_gas(),
            slippage_bps: None,
            send_timeout_secs: default_send_timeout_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            gas_limit_buffer_percent: default_gas_limit_buffer_percent(),
            gas_price_buffer_percent: default_gas_price_buffer_percent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentsConfig {
    #[serde(default = "default_deployments_dir")]
    pub dir: PathBuf,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            dir: default_deployments_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Messaging endpoint id
    pub eid: u32,
    #[serde(default)]
    pub kind: ChainKind,
    /// EVM chain id used for signing
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub endpoint_address: Option<String>,
    #[serde(default)]
    pub token_variant: TokenVariant,
    /// Deployment name of the OFT; unused on non-EVM networks
    #[serde(default)]
    pub oft_contract: String,
    #[serde(default)]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,
    /// Inline deployment addresses, checked before the deployments directory
    #[serde(default)]
    pub deployments: HashMap<String, String>,
    #[serde(default)]
    pub stack: Option<StackConfig>,
}

/// Chain family of a network. Only EVM networks can be a transfer source;
/// other kinds appear in the graph as remote peers with literal addresses.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    #[default]
    Evm,
    Solana,
}

/// Whether the source deployment holds balances itself or wraps an existing token
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenVariant {
    #[default]
    Native,
    Adapter,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    #[default]
    Eip1559,
    Arbitrum,
    Optimism,
}

/// Message library, executor and verifier addresses on one chain
#[derive(Debug, Clone, Deserialize)]
pub struct StackConfig {
    pub send_library: String,
    pub receive_library: String,
    pub executor: String,
    /// DVN name -> address
    #[serde(default)]
    pub dvns: HashMap<String, String>,
    #[serde(default)]
    pub grace_period: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u32,
}

/// An enforced option as written in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OptionDecl {
    pub msg_type: MessageType,
    pub kind: OptionKind,
    #[serde(default)]
    pub index: Option<u64>,
    pub gas: ConfigUint,
    #[serde(default)]
    pub value: ConfigUint,
}

impl OptionDecl {
    pub fn to_option(&self) -> BridgeResult<EnforcedOption> {
        EnforcedOption::try_new(
            self.msg_type,
            self.kind,
            self.index,
            self.gas.to_u256()?,
            self.value.to_u256()?,
        )
    }
}

/// Unsigned integer given either as a TOML integer or as a decimal/hex string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfigUint {
    Int(u64),
    Text(String),
}

impl Default for ConfigUint {
    fn default() -> Self {
        ConfigUint::Int(0)
    }
}

impl ConfigUint {
    pub fn to_u256(&self) -> BridgeResult<U256> {
        match self {
            ConfigUint::Int(value) => Ok(U256::from(*value)),
            ConfigUint::Text(text) => parse_u256(text),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub contracts: Vec<PointConfig>,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub pathways: Vec<PathwayConfig>,
}

/// Contract on a network, by deployment name or literal address
#[derive(Debug, Clone, Deserialize)]
pub struct PointConfig {
    pub network: String,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Bidirectional pathway declaration
#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub a: PointConfig,
    pub b: PointConfig,
    pub required_dvns: Vec<String>,
    #[serde(default)]
    pub optional_dvns: Vec<String>,
    #[serde(default)]
    pub optional_dvn_threshold: u8,
    /// `[a -> b, b -> a]`
    pub confirmations: [u64; 2],
    /// Option set names, `[a -> b, b -> a]`
    #[serde(default)]
    pub enforced_options: Option<[String; 2]>,
}

/// Single directional pathway declaration
#[derive(Debug, Clone, Deserialize)]
pub struct PathwayConfig {
    pub from: PointConfig,
    pub to: PointConfig,
    #[serde(default)]
    pub security: Option<SecurityDecl>,
    /// Option set name
    #[serde(default)]
    pub enforced_options: Option<String>,
}

/// Security stack overrides; unset fields come from the `from` network's stack
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityDecl {
    pub confirmations: u64,
    pub required_dvns: Vec<String>,
    #[serde(default)]
    pub optional_dvns: Vec<String>,
    #[serde(default)]
    pub optional_dvn_threshold: u8,
    #[serde(default)]
    pub send_library: Option<String>,
    #[serde(default)]
    pub receive_library: Option<String>,
    #[serde(default)]
    pub executor: Option<String>,
    #[serde(default)]
    pub grace_period: Option<u64>,
    #[serde(default)]
    pub max_message_size: Option<u32>,
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

fn default_mnemonic_env() -> String {
    "MNEMONIC".to_string()
}

fn default_min_receive_gas() -> u64 {
    65_000
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_receipt_timeout_secs() -> u64 {
    180
}

fn default_receipt_poll_interval_ms() -> u64 {
    1_000
}

fn default_gas_limit_buffer_percent() -> u64 {
    20
}

fn default_gas_price_buffer_percent() -> u64 {
    10
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_max_gas_price_gwei() -> u64 {
    200
}

fn default_confirmation_blocks() -> u64 {
    1
}

fn default_max_message_size() -> u32 {
    crate::graph::DEFAULT_MAX_MESSAGE_SIZE
}

impl Settings {
    /// Load settings from `path`, or from `OFT_BRIDGE_CONFIG`, or `config/default.toml`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            anyhow::bail!("At least one network must be configured");
        }

        let mut eids = HashMap::new();
        for (name, network) in &self.networks {
            if network.kind == ChainKind::Evm {
                if network.rpc_urls.is_empty() {
                    tracing::warn!("Network {} has no RPC URLs configured - transfers will fail", name);
                }
                if network.oft_contract.is_empty() {
                    anyhow::bail!("Network {} has no OFT contract name", name);
                }
                if network.chain_id == 0 {
                    anyhow::bail!("Network {} has no chain_id", name);
                }
            }
            if let Some(other) = eids.insert(network.eid, name) {
                anyhow::bail!(
                    "Networks {} and {} share endpoint id {}",
                    other,
                    name,
                    network.eid
                );
            }
        }

        if let Some(bps) = self.transfer.slippage_bps {
            if bps > 10_000 {
                anyhow::bail!("slippage_bps {} exceeds 10000", bps);
            }
        }

        Ok(())
    }

    /// Get network config by name
    pub fn network(&self, name: &str) -> BridgeResult<&NetworkConfig> {
        self.networks
            .get(name)
            .ok_or_else(|| BridgeError::UnresolvedNetwork(format!("unknown network '{}'", name)))
    }

    /// Get network name and config by endpoint id
    pub fn network_by_eid(&self, eid: u32) -> Option<(&String, &NetworkConfig)> {
        self.networks.iter().find(|(_, n)| n.eid == eid)
    }

    /// Resolve a named option set into validated options
    pub fn option_set(&self, name: &str) -> BridgeResult<Vec<EnforcedOption>> {
        self.option_sets
            .get(name)
            .ok_or_else(|| BridgeError::UnknownOptionSet(name.to_string()))?
            .iter()
            .map(OptionDecl::to_option)
            .collect()
    }
}

/// Parse a hex address, naming the field in the error
pub fn parse_address(value: &str, what: &str) -> BridgeResult<Address> {
    value
        .parse::<Address>()
        .map_err(|e| BridgeError::Config(format!("Invalid {} address '{}': {}", what, value, e)))
}

/// Parse an EVM hex or base58 32-byte address, naming the field in the error
pub fn parse_chain_address(value: &str, what: &str) -> BridgeResult<ChainAddress> {
    value.parse::<ChainAddress>().map_err(|e| match e {
        BridgeError::Config(reason) => BridgeError::Config(format!("{}: {}", what, reason)),
        other => other,
    })
}

/// Parse a decimal or `0x`-prefixed hex unsigned integer
pub fn parse_u256(value: &str) -> BridgeResult<U256> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(value).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| BridgeError::Config(format!("Invalid integer '{}': {}", value, e)))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r#"
[transfer]
min_receive_gas = 65000

[networks.sepolia]
eid = 40161
chain_id = 11155111
rpc_urls = ["https://rpc.sepolia.org/"]
endpoint_address = "0x6EDCE65403992e310A62460808c4b910D972f10f"
oft_contract = "AlloOFTUpgradeable"

[networks.sepolia.deployments]
AlloOFTUpgradeable = "0x00000000000000000000000000000000000000a1"

[networks.sepolia.stack]
send_library = "0xcc1ae8Cf5D3904Cef3360A9532B477529b177cCE"
receive_library = "0xdAf00F5eE2158dD58E0d3857851c432E34A3A851"
executor = "0x718B92b5CB0a5552039B593faF724D182A881eDA"

[networks.sepolia.stack.dvns]
"LayerZero Labs" = "0x8eebf8b423B73bFCa51a1Db4B7354AA0bFCA9193"

[networks.base-sepolia]
eid = 40245
chain_id = 84532
rpc_urls = ["https://sepolia.base.org"]
endpoint_address = "0x6EDCE65403992e310A62460808c4b910D972f10f"
oft_contract = "AlloOFTUpgradeable"

[networks.base-sepolia.deployments]
AlloOFTUpgradeable = "0x00000000000000000000000000000000000000b2"

[networks.base-sepolia.stack]
send_library = "0xC1868e054425D378095A003EcbA3823a5D0135C9"
receive_library = "0x12523de19dc41c91F7d2093E0CFbB76b17012C8d"
executor = "0x8A3D588D9f6AC041476b094f97FF94ec30169d3D"

[networks.base-sepolia.stack.dvns]
"LayerZero Labs" = "0xe1a12515F9AB2764b887bF60B923Ca494EBbB2d6"

[option_sets]
evm = [
    { msg_type = "standard", kind = "receive", gas = 185000, value = 0 },
    { msg_type = "composed", kind = "receive", gas = 185000, value = 0 },
    { msg_type = "composed", kind = "compose", index = 0, gas = 340000, value = 0 },
]

[[graph.pairs]]
a = { network = "sepolia", contract = "AlloOFTUpgradeable" }
b = { network = "base-sepolia", contract = "AlloOFTUpgradeable" }
required_dvns = ["LayerZero Labs"]
confirmations = [15, 20]
enforced_options = ["evm", "evm"]
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("OFT_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${OFT_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_parse_sample() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.networks.len(), 2);
        assert_eq!(settings.transfer.min_receive_gas, 65_000);
        assert_eq!(settings.transfer.gas_limit_buffer_percent, 20);

        let sepolia = settings.network("sepolia").unwrap();
        assert_eq!(sepolia.token_variant, TokenVariant::Native);
        assert_eq!(sepolia.gas_price_strategy, GasPriceStrategy::Eip1559);
        assert_eq!(settings.network_by_eid(40245).unwrap().0, "base-sepolia");

        let evm = settings.option_set("evm").unwrap();
        assert_eq!(evm.len(), 3);
        assert_eq!(evm[2].compose_index, Some(0));
        assert!(matches!(
            settings.option_set("solana"),
            Err(BridgeError::UnknownOptionSet(_))
        ));
    }

    #[test]
    fn test_network_kinds() {
        let input = format!(
            "{}\n[networks.solana-testnet]\neid = 40168\nkind = \"solana\"\n",
            SAMPLE
        );
        let settings = Settings::from_toml_str(&input).unwrap();
        let solana = settings.network("solana-testnet").unwrap();
        assert_eq!(solana.kind, ChainKind::Solana);
        assert!(solana.rpc_urls.is_empty());
        assert_eq!(settings.network("sepolia").unwrap().kind, ChainKind::Evm);

        // an EVM network still needs its chain id and contract
        let input = format!(
            "{}\n{}",
            SAMPLE,
            r#"
[networks.local]
eid = 7
rpc_urls = ["http://localhost:8545"]
oft_contract = "OFT"
"#
        );
        assert!(Settings::from_toml_str(&input).is_err());
    }

    #[test]
    fn test_duplicate_eid_rejected() {
        let input = r#"
[networks.a]
eid = 1
chain_id = 1
rpc_urls = ["http://localhost:8545"]
oft_contract = "OFT"

[networks.b]
eid = 1
chain_id = 2
rpc_urls = ["http://localhost:8546"]
oft_contract = "OFT"
"#;
        assert!(Settings::from_toml_str(input).is_err());
    }

    #[test]
    fn test_string_amounts() {
        let decl: OptionDecl = toml::from_str(
            r#"
msg_type = "standard"
kind = "lz_receive"
gas = "0xffffffffffffffffffffffffffffffffff"
"#,
        )
        .unwrap();
        assert!(matches!(decl.to_option(), Err(BridgeError::InvalidOption(_))));

        assert_eq!(parse_u256("2500000").unwrap(), U256::from(2_500_000u64));
        assert!(parse_u256("abc").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert!(settings.network("sepolia").is_ok());
        assert!(Settings::load(Some(Path::new("/nonexistent/oft.toml"))).is_err());
    }
}
