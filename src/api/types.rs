// Configuration types
//
// Defaults point at the mainnet-fork deployment the factories were published to.

use std::path::PathBuf;
use std::str::FromStr;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

fn address(hex: &str) -> Address {
    Address::from_str(hex).unwrap_or_default()
}

/// Addresses of the external contracts the client talks to.
///
/// `None` (or the zero address) means "not deployed on this network".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    /// Factory creating one PaymentSplitter per deployment
    pub splitter_factory: Option<Address>,

    /// Shared PaymentSplitter used when no factory is configured
    pub default_splitter: Address,

    /// Morpho compounder strategy factory
    pub morpho_factory: Option<Address>,

    /// Vault the Morpho compounder deposits into
    pub morpho_compounder_vault: Address,

    /// Sky compounder strategy factory
    pub sky_factory: Option<Address>,

    /// Tokenized strategy implementation passed to the compounder factories
    pub tokenized_strategy: Address,

    /// Aave vault proxy deployer
    pub aave_vault_deployer: Option<Address>,

    /// Registry listing every strategy a user deployed
    pub strategy_registry: Option<Address>,
}

/// Treat the zero address as "not configured"
pub fn configured(address: Option<Address>) -> Option<Address> {
    address.filter(|a| !a.is_zero())
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self {
            splitter_factory: Some(address("0x7FA9385bE102ac3EAc297483Dd6233D62b3e1496")),
            default_splitter: address("0xc4AE01295cfAE3DA96b044F1a4284A93837a644C"),
            morpho_factory: Some(address("0xD09f14DD0a0ec20CAC1eD7b2Fd5A68f440C5903D")),
            morpho_compounder_vault: Address::zero(),
            sky_factory: Some(address("0x925E81cA08220cc31554981E5baeE6B57270cbEb")),
            tokenized_strategy: address("0x7De92dC71F857fd9AB2Abf76F7AfC71394FD8B22"),
            aave_vault_deployer: Some(address("0x8901773847fF722b9AD70848B0BfF5103f97309F")),
            strategy_registry: Some(address("0xeD1b3CE69885027814C9046F4d9BC1C69E9Df4f3")),
        }
    }
}

/// An ERC-20 the Aave flow can deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub address: Address,
    pub decimals: u32,
}

impl AssetConfig {
    pub fn new(symbol: &str, hex: &str, decimals: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            address: address(hex),
            decimals,
        }
    }

    /// One whole token in base units; the activation deposit for a new vault
    pub fn one_unit(&self) -> U256 {
        U256::exp10(self.decimals as usize)
    }
}

pub fn default_assets() -> Vec<AssetConfig> {
    vec![
        AssetConfig::new("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
        AssetConfig::new("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18),
        AssetConfig::new("USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
    ]
}

/// Complete client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    /// Chain the contracts live on
    pub chain_id: u64,

    /// HTTP RPC endpoint
    pub rpc_url: String,

    /// Prefix for generated strategy names
    pub app_name: String,

    pub contracts: ContractAddresses,

    /// Assets accepted by the Aave flow; the first one is the default
    pub assets: Vec<AssetConfig>,

    /// Directory holding the strategy cache
    pub storage_dir: PathBuf,

    /// Dashboard refresh interval in seconds
    pub refresh_interval_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            app_name: "ImpactVault".to_string(),
            contracts: ContractAddresses::default(),
            assets: default_assets(),
            storage_dir: PathBuf::from("."),
            refresh_interval_secs: 10,
        }
    }
}

impl DeployConfig {
    /// Look up an asset by symbol (case-insensitive)
    pub fn asset(&self, symbol: &str) -> Option<&AssetConfig> {
        self.assets.iter().find(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn default_asset(&self) -> Option<&AssetConfig> {
        self.assets.first()
    }

    /// Configured contracts that can emit logs in a deployment receipt
    /// without being the deployed strategy
    pub fn auxiliary_contracts(&self) -> Vec<Address> {
        let contracts = &self.contracts;
        self.assets
            .iter()
            .map(|a| a.address)
            .chain([
                contracts.default_splitter,
                contracts.morpho_compounder_vault,
                contracts.tokenized_strategy,
            ])
            .filter(|a| !a.is_zero())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses_parse() {
        let contracts = ContractAddresses::default();
        assert!(!contracts.default_splitter.is_zero());
        assert!(configured(contracts.splitter_factory).is_some());
        assert!(contracts.morpho_compounder_vault.is_zero());
    }

    #[test]
    fn test_zero_address_is_unconfigured() {
        assert_eq!(configured(Some(Address::zero())), None);
        assert_eq!(configured(None), None);
        let a = Address::from_low_u64_be(5);
        assert_eq!(configured(Some(a)), Some(a));
    }

    #[test]
    fn test_asset_lookup_and_activation_amount() {
        let config = DeployConfig::default();
        let usdc = config.asset("usdc").unwrap();
        assert_eq!(usdc.one_unit(), U256::from(1_000_000u64));
        assert_eq!(config.asset("DAI").unwrap().one_unit(), U256::exp10(18));
        assert!(config.asset("WBTC").is_none());
        assert_eq!(config.default_asset().unwrap().symbol, "USDC");
    }
}
