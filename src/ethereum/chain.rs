// Chain-specific configurations
//
// Networks the splitter and strategy factories are deployed on, with the block
// explorer endpoints used for links and contract verification.

use std::collections::HashMap;

/// Chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,

    /// Chain name
    pub name: String,

    /// Average block time in seconds
    pub block_time: u64,

    /// Native currency symbol
    pub currency_symbol: String,

    /// Block explorer web URL
    pub explorer_url: String,

    /// Etherscan-compatible verification API, if the chain has one
    pub explorer_api_url: Option<String>,
}

impl ChainConfig {
    /// Create a new chain configuration
    pub fn new(
        chain_id: u64,
        name: &str,
        block_time: u64,
        currency_symbol: &str,
        explorer_url: &str,
        explorer_api_url: Option<&str>,
    ) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            block_time,
            currency_symbol: currency_symbol.to_string(),
            explorer_url: explorer_url.to_string(),
            explorer_api_url: explorer_api_url.map(str::to_string),
        }
    }

    /// Ethereum Mainnet (also used for mainnet forks)
    pub fn ethereum() -> Self {
        Self::new(1, "Ethereum Mainnet", 12, "ETH", "https://etherscan.io", Some("https://api.etherscan.io/api"))
    }

    /// Tenderly virtual testnet forked from mainnet
    pub fn tenderly_vnet() -> Self {
        Self::new(8, "Tenderly Virtual TestNet", 1, "ETH", "https://dashboard.tenderly.co/explorer/vnet/8", None)
    }

    pub fn sepolia() -> Self {
        Self::new(
            11155111,
            "Sepolia",
            12,
            "ETH",
            "https://sepolia.etherscan.io",
            Some("https://api-sepolia.etherscan.io/api"),
        )
    }

    pub fn base() -> Self {
        Self::new(8453, "Base", 2, "ETH", "https://basescan.org", Some("https://api.basescan.org/api"))
    }

    pub fn base_sepolia() -> Self {
        Self::new(
            84532,
            "Base Sepolia",
            2,
            "ETH",
            "https://sepolia.basescan.org",
            Some("https://api-sepolia.basescan.org/api"),
        )
    }

    /// Explorer link for an address
    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_url, address)
    }

    /// Explorer link for a transaction
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

/// Chain registry for looking up chain configurations
pub struct ChainRegistry {
    /// Map of chain ID to chain configuration
    configs: HashMap<u64, ChainConfig>,
}

impl ChainRegistry {
    /// Create a new chain registry with the supported chains
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        for config in [
            ChainConfig::ethereum(),
            ChainConfig::tenderly_vnet(),
            ChainConfig::sepolia(),
            ChainConfig::base(),
            ChainConfig::base_sepolia(),
        ] {
            configs.insert(config.chain_id, config);
        }

        Self { configs }
    }

    /// Get chain configuration by chain ID
    pub fn get_config(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.configs.get(&chain_id)
    }

    /// Supported chains ordered by chain ID
    pub fn chains(&self) -> Vec<&ChainConfig> {
        let mut chains: Vec<_> = self.configs.values().collect();
        chains.sort_by_key(|c| c.chain_id);
        chains
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}
