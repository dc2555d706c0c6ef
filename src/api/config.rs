// Configuration for the Kinetic client
//
// Configuration is a JSON file; `KINETIC_*` environment variables override
// individual values on top of it.

use crate::api::types::DeployConfig;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_RPC_URL: &str = "KINETIC_RPC_URL";
pub const ENV_CHAIN_ID: &str = "KINETIC_CHAIN_ID";
pub const ENV_APP_NAME: &str = "KINETIC_APP_NAME";
pub const ENV_STORAGE_DIR: &str = "KINETIC_STORAGE_DIR";
pub const ENV_SPLITTER_FACTORY: &str = "KINETIC_SPLITTER_FACTORY";
pub const ENV_DEFAULT_SPLITTER: &str = "KINETIC_DEFAULT_SPLITTER";
pub const ENV_MORPHO_FACTORY: &str = "KINETIC_MORPHO_FACTORY";
pub const ENV_MORPHO_VAULT: &str = "KINETIC_MORPHO_VAULT";
pub const ENV_SKY_FACTORY: &str = "KINETIC_SKY_FACTORY";
pub const ENV_AAVE_DEPLOYER: &str = "KINETIC_AAVE_DEPLOYER";
pub const ENV_STRATEGY_REGISTRY: &str = "KINETIC_STRATEGY_REGISTRY";

/// Largest decimals value whose whole unit still fits in a uint256
pub const MAX_ASSET_DECIMALS: u32 = 77;

/// Configuration manager for the Kinetic client
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<DeployConfig> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&config_str)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Self::validate(&config).with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the client cannot work with
    pub fn validate(config: &DeployConfig) -> Result<()> {
        for asset in &config.assets {
            if asset.decimals > MAX_ASSET_DECIMALS {
                bail!(
                    "Asset {} has {} decimals; at most {} are supported",
                    asset.symbol,
                    asset.decimals,
                    MAX_ASSET_DECIMALS
                );
            }
        }
        Ok(())
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &DeployConfig, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Create a builder for configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Apply `KINETIC_*` variables from the process environment to `base`
    pub fn from_env(base: DeployConfig) -> Result<DeployConfig> {
        Self::apply_overrides(base, |key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides(base: DeployConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<DeployConfig> {
        let mut builder = ConfigBuilder { config: base };
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var(ENV_RPC_URL) {
            builder = builder.rpc_url(url);
        }
        if let Some(chain_id) = var(ENV_CHAIN_ID) {
            builder = builder.chain_id(chain_id.trim().parse().with_context(|| format!("{} is not a number", ENV_CHAIN_ID))?);
        }
        if let Some(name) = var(ENV_APP_NAME) {
            builder = builder.app_name(name);
        }
        if let Some(dir) = var(ENV_STORAGE_DIR) {
            builder = builder.storage_dir(dir);
        }
        if let Some(value) = var(ENV_SPLITTER_FACTORY) {
            builder = builder.splitter_factory(Some(env_address(ENV_SPLITTER_FACTORY, &value)?));
        }
        if let Some(value) = var(ENV_DEFAULT_SPLITTER) {
            builder = builder.default_splitter(env_address(ENV_DEFAULT_SPLITTER, &value)?);
        }
        if let Some(value) = var(ENV_MORPHO_FACTORY) {
            builder.config.contracts.morpho_factory = Some(env_address(ENV_MORPHO_FACTORY, &value)?);
        }
        if let Some(value) = var(ENV_MORPHO_VAULT) {
            builder.config.contracts.morpho_compounder_vault = env_address(ENV_MORPHO_VAULT, &value)?;
        }
        if let Some(value) = var(ENV_SKY_FACTORY) {
            builder.config.contracts.sky_factory = Some(env_address(ENV_SKY_FACTORY, &value)?);
        }
        if let Some(value) = var(ENV_AAVE_DEPLOYER) {
            builder.config.contracts.aave_vault_deployer = Some(env_address(ENV_AAVE_DEPLOYER, &value)?);
        }
        if let Some(value) = var(ENV_STRATEGY_REGISTRY) {
            builder.config.contracts.strategy_registry = Some(env_address(ENV_STRATEGY_REGISTRY, &value)?);
        }

        let config = builder.build();
        Self::validate(&config)?;
        Ok(config)
    }
}

fn env_address(key: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("{} is not an address: {}", key, value))
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: DeployConfig,
}

impl ConfigBuilder {
    pub fn chain_id(mut self, value: u64) -> Self {
        self.config.chain_id = value;
        self
    }

    pub fn rpc_url(mut self, value: impl Into<String>) -> Self {
        self.config.rpc_url = value.into();
        self
    }

    /// Set the prefix of generated strategy names
    pub fn app_name(mut self, value: impl Into<String>) -> Self {
        self.config.app_name = value.into();
        self
    }

    pub fn storage_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = value.into();
        self
    }

    /// `None` or the zero address disables per-deployment splitters
    pub fn splitter_factory(mut self, value: Option<Address>) -> Self {
        self.config.contracts.splitter_factory = value;
        self
    }

    pub fn default_splitter(mut self, value: Address) -> Self {
        self.config.contracts.default_splitter = value;
        self
    }

    pub fn refresh_interval_secs(mut self, value: u64) -> Self {
        self.config.refresh_interval_secs = value;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DeployConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_config_builder() {
        let config = ConfigManager::builder()
            .chain_id(8)
            .app_name("Kinetic")
            .splitter_factory(None)
            .build();

        assert_eq!(config.chain_id, 8);
        assert_eq!(config.app_name, "Kinetic");
        assert!(config.contracts.splitter_factory.is_none());
        assert_eq!(config.refresh_interval_secs, 10);
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.json");

        let config = ConfigManager::builder()
            .rpc_url("https://rpc.example")
            .refresh_interval_secs(30)
            .build();

        ConfigManager::save_to_file(&config, &file_path)?;
        let loaded_config = ConfigManager::load_from_file(&file_path)?;

        assert_eq!(loaded_config.rpc_url, config.rpc_url);
        assert_eq!(loaded_config.refresh_interval_secs, 30);
        assert_eq!(loaded_config.contracts, config.contracts);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.json");
        fs::write(&file_path, r#"{"appName": "Custom"}"#)?;

        let config = ConfigManager::load_from_file(&file_path)?;
        assert_eq!(config.app_name, "Custom");
        assert_eq!(config.assets.len(), 3);
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_RPC_URL, "https://vnet.example"),
            (ENV_CHAIN_ID, "8"),
            (ENV_SPLITTER_FACTORY, "0x0000000000000000000000000000000000000000"),
            (ENV_APP_NAME, ""),
        ]);
        let config = ConfigManager::apply_overrides(DeployConfig::default(), |k| vars.get(k).map(|v| v.to_string()))?;

        assert_eq!(config.rpc_url, "https://vnet.example");
        assert_eq!(config.chain_id, 8);
        assert_eq!(config.contracts.splitter_factory, Some(Address::zero()));
        assert_eq!(config.app_name, "ImpactVault");

        let bad = ConfigManager::apply_overrides(DeployConfig::default(), |k| {
            (k == ENV_SKY_FACTORY).then(|| "nope".to_string())
        });
        assert!(bad.is_err());
        Ok(())
    }

    #[test]
    fn test_env_file_configures_client() -> Result<()> {
        let dir = tempdir()?;
        let env_path = dir.path().join(".env");
        // the line deploy_splitter_factory prints, plus typical .env noise
        fs::write(
            &env_path,
            format!(
                "# local fork\nPRIVATE_KEY=0xabc\n{}=0x1111111111111111111111111111111111111111\n{}=\"http://localhost:8545\"\n",
                ENV_SPLITTER_FACTORY, ENV_RPC_URL
            ),
        )?;

        let vars = dotenv::from_path_iter(&env_path)?.collect::<Result<HashMap<String, String>, _>>()?;
        let config = ConfigManager::apply_overrides(DeployConfig::default(), |k| vars.get(k).cloned())?;

        assert_eq!(config.contracts.splitter_factory, Some(Address::repeat_byte(0x11)));
        assert_eq!(config.rpc_url, "http://localhost:8545");
        Ok(())
    }

    #[test]
    fn test_oversized_decimals_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.json");
        fs::write(
            &file_path,
            r#"{"assets": [{"symbol": "BIG", "address": "0x1111111111111111111111111111111111111111", "decimals": 78}]}"#,
        )?;

        let err = ConfigManager::load_from_file(&file_path).unwrap_err();
        assert!(format!("{:#}", err).contains("78 decimals"));

        fs::write(
            &file_path,
            r#"{"assets": [{"symbol": "MAX", "address": "0x1111111111111111111111111111111111111111", "decimals": 77}]}"#,
        )?;
        let config = ConfigManager::load_from_file(&file_path)?;
        assert_eq!(config.assets[0].one_unit(), ethers::types::U256::exp10(77));
        Ok(())
    }
}
