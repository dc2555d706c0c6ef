// Deployment orchestration
//
// One run validates the recipients, deploys (or reuses) a payment splitter,
// runs the Aave approval sequence when needed, deploys the strategy and
// records it in the cache. The record is written under the transaction hash
// as soon as the deployment is broadcast and updated once it resolves. Any
// failure halts the run and returns the step state to `Idle`; transactions
// already confirmed are not rolled back.

use chrono::Utc;
use ethers::types::{Address, H256, U256};
use kinetic_common::{Protocol, Recipient, Strategy, StrategyAddress};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::allocation::{validate_recipients, ValidationError};
use crate::api::{configured, AssetConfig, DeployConfig};
use crate::error::DeployError;
use crate::ethereum::ChainClient;
use crate::resolver::ResolverChain;
use crate::steps::{plan, ApprovalStep, SplitterOutcome, SplitterStep, StrategyStep};
use crate::store::{StorageBackend, StrategyStore};

/// Progress of a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployStep {
    Idle,
    DeployingSplitter,
    DeployingStrategy,
    Complete,
}

impl DeployStep {
    pub fn label(&self) -> &'static str {
        match self {
            DeployStep::Idle => "idle",
            DeployStep::DeployingSplitter => "deploying splitter",
            DeployStep::DeployingStrategy => "deploying strategy",
            DeployStep::Complete => "complete",
        }
    }
}

/// How yield reaches the recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionMode {
    /// Route through a payment splitter paying every recipient
    Splitter,
    /// Pay the first recipient directly
    Direct,
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub protocol: Protocol,
    pub recipients: Vec<Recipient>,
    pub mode: DistributionMode,
    /// Asset symbol for Aave; the configured default when `None`
    pub asset: Option<String>,
    /// Strategy name; generated when `None`
    pub name: Option<String>,
}

impl DeployRequest {
    pub fn new(protocol: Protocol, recipients: Vec<Recipient>) -> Self {
        Self {
            protocol,
            recipients,
            mode: DistributionMode::Splitter,
            asset: None,
            name: None,
        }
    }

    pub fn direct(mut self) -> Self {
        self.mode = DistributionMode::Direct;
        self
    }

    pub fn with_asset(mut self, symbol: impl Into<String>) -> Self {
        self.asset = Some(symbol.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    /// The record written to the cache
    pub strategy: Strategy,
    /// `None` in direct mode
    pub splitter: Option<SplitterOutcome>,
    pub strategy_tx: H256,
    /// Non-blocking notices for the user
    pub warnings: Vec<String>,
}

impl DeploymentOutcome {
    /// The strategy address is still the transaction hash
    pub fn needs_recovery(&self) -> bool {
        !self.strategy.address.is_valid()
    }
}

pub struct Orchestrator<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    config: &'a DeployConfig,
    resolvers: ResolverChain<'a>,
    step: DeployStep,
    history: Vec<DeployStep>,
}

impl<'a, C: ChainClient + ?Sized> Orchestrator<'a, C> {
    pub fn new(client: &'a C, config: &'a DeployConfig) -> Self {
        Self {
            client,
            config,
            resolvers: ResolverChain::standard(client),
            step: DeployStep::Idle,
            history: vec![DeployStep::Idle],
        }
    }

    /// Replace the address resolvers
    pub fn with_resolvers(mut self, resolvers: ResolverChain<'a>) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn step(&self) -> DeployStep {
        self.step
    }

    /// Steps entered during the last run, starting at `Idle`
    pub fn history(&self) -> &[DeployStep] {
        &self.history
    }

    fn transition(&mut self, next: DeployStep) {
        if self.step != next {
            info!("Deployment step: {} -> {}", self.step.label(), next.label());
        }
        self.step = next;
        self.history.push(next);
    }

    /// Run a full deployment and cache the resulting strategy
    pub async fn deploy<B: StorageBackend>(
        &mut self,
        request: DeployRequest,
        store: &mut StrategyStore<B>,
    ) -> Result<DeploymentOutcome, DeployError> {
        self.step = DeployStep::Idle;
        self.history = vec![DeployStep::Idle];

        let result = self.run(request, store).await;
        if let Err(e) = &result {
            error!("Deployment failed: {}", e);
            self.transition(DeployStep::Idle);
        }
        result
    }

    async fn run<B: StorageBackend>(
        &mut self,
        request: DeployRequest,
        store: &mut StrategyStore<B>,
    ) -> Result<DeploymentOutcome, DeployError> {
        validate_recipients(&request.recipients)?;

        let protocol = request.protocol;
        let mode = match protocol {
            Protocol::Aave => DistributionMode::Splitter,
            _ => request.mode,
        };
        let asset = match protocol {
            Protocol::Aave => Some(self.resolve_asset(request.asset.as_deref())?),
            _ => None,
        };
        let config = self.config;
        let sender = self.client.sender();
        let contracts = &config.contracts;

        // Configuration problems surface before anything is sent
        plan(protocol, "", Address::zero(), sender, contracts, asset.as_ref())?;

        let name = request.name.clone().unwrap_or_else(|| {
            format!("{}-{}-{}", config.app_name, protocol, Utc::now().timestamp_millis())
        });
        let mut warnings = Vec::new();

        let (beneficiary, splitter, recipients) = match mode {
            DistributionMode::Splitter => {
                let step = SplitterStep::new(self.client, contracts.splitter_factory, contracts.default_splitter);
                if step.creates_splitter() {
                    self.transition(DeployStep::DeployingSplitter);
                }
                let outcome = step.deploy(&request.recipients).await?;
                if outcome.degraded {
                    warnings.push(format!(
                        "Splitter address could not be read back; using default splitter {:?}",
                        outcome.address
                    ));
                }
                (outcome.address, Some(outcome.clone()), vec![Recipient::splitter(outcome.address)])
            }
            DistributionMode::Direct => {
                let first = &request.recipients[0];
                let beneficiary = first.parsed_address().ok_or_else(|| ValidationError::InvalidAddress {
                    name: first.name.clone(),
                    address: first.address.clone(),
                })?;
                let others = request.recipients.len() - 1;
                if others > 0 {
                    let message = format!(
                        "Direct mode pays only {}; {} other recipient(s) will receive nothing",
                        first.name, others
                    );
                    warn!("{}", message);
                    warnings.push(message);
                }
                (beneficiary, None, vec![first.clone()])
            }
        };

        self.transition(DeployStep::DeployingStrategy);

        let mut total_deposited = U256::zero();
        if let Some(asset) = &asset {
            let spender = configured(contracts.aave_vault_deployer).ok_or(DeployError::NotConfigured("Aave vault deployer"))?;
            total_deposited = asset.one_unit();
            ApprovalStep::new(self.client)
                .approve(asset.address, spender, total_deposited)
                .await?;
        }
        let mut ignore = vec![beneficiary];
        ignore.extend(config.auxiliary_contracts());

        let deployment_plan = plan(protocol, &name, beneficiary, sender, contracts, asset.as_ref())?;
        let known = store.valid_addresses();
        let step = StrategyStep::new(self.client, &self.resolvers);
        let tx_hash = step.send(&deployment_plan).await?;

        // Cached under the hash before waiting so an interrupted wait loses nothing
        let pending = Strategy {
            address: StrategyAddress::Pending(tx_hash),
            protocol,
            name: name.clone(),
            total_deposited,
            yield_generated: U256::zero(),
            recipients,
        };
        store.add_strategy(pending.clone())?;

        let deployment = match step.confirm(&deployment_plan, tx_hash, &known, &ignore).await {
            Ok(deployment) => deployment,
            Err(e @ DeployError::Unconfirmed { .. }) => {
                warn!("Keeping pending record for {:?}", tx_hash);
                return Err(e);
            }
            Err(e) => {
                store.remove_strategy(&StrategyAddress::Pending(tx_hash))?;
                return Err(e);
            }
        };

        let strategy = match deployment.address.address() {
            Some(address) => store.resolve_pending(tx_hash, address)?.clone(),
            None => {
                warnings.push(format!(
                    "Strategy address not resolved yet; recorded under transaction {:?}",
                    tx_hash
                ));
                pending
            }
        };

        self.transition(DeployStep::Complete);
        info!("Deployed {} at {}", name, deployment.address);

        Ok(DeploymentOutcome {
            strategy,
            splitter,
            strategy_tx: deployment.tx_hash,
            warnings,
        })
    }

    fn resolve_asset(&self, symbol: Option<&str>) -> Result<AssetConfig, DeployError> {
        let asset = match symbol {
            Some(symbol) => self.config.asset(symbol),
            None => self.config.default_asset(),
        };
        asset
            .cloned()
            .ok_or_else(|| DeployError::UnknownAsset(symbol.unwrap_or("default").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use crate::testing::MockChainClient;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    fn config_without_factory() -> DeployConfig {
        let mut config = DeployConfig::default();
        config.contracts.splitter_factory = None;
        config
    }

    #[tokio::test]
    async fn test_default_splitter_skips_splitter_step() {
        let config = config_without_factory();
        let client = MockChainClient::new(Address::from_low_u64_be(0xa));
        let mut store = StrategyStore::open(MemoryBackend::new()).unwrap();
        let mut orchestrator = Orchestrator::new(&client, &config).with_resolvers(ResolverChain::new());

        let request = DeployRequest::new(
            Protocol::Sky,
            vec![Recipient::new(A, "X", 50), Recipient::new(B, "Y", 50)],
        )
        .with_name("fixed");
        let outcome = orchestrator.deploy(request, &mut store).await.unwrap();

        assert_eq!(
            orchestrator.history(),
            &[DeployStep::Idle, DeployStep::DeployingStrategy, DeployStep::Complete]
        );
        assert_eq!(outcome.splitter.as_ref().unwrap().address, config.contracts.default_splitter);
        assert!(outcome.needs_recovery());
        assert_eq!(outcome.strategy.name, "fixed");
    }

    #[tokio::test]
    async fn test_generated_name_has_prefix() {
        let config = config_without_factory();
        let client = MockChainClient::new(Address::from_low_u64_be(0xa));
        let mut store = StrategyStore::open(MemoryBackend::new()).unwrap();
        let mut orchestrator = Orchestrator::new(&client, &config).with_resolvers(ResolverChain::new());

        let outcome = orchestrator
            .deploy(DeployRequest::new(Protocol::Morpho, vec![Recipient::new(A, "X", 100)]), &mut store)
            .await
            .unwrap();

        let suffix = outcome.strategy.name.strip_prefix("ImpactVault-Morpho-").unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_asset_sends_nothing() {
        let config = config_without_factory();
        let client = MockChainClient::new(Address::from_low_u64_be(0xa));
        let mut store = StrategyStore::open(MemoryBackend::new()).unwrap();
        let mut orchestrator = Orchestrator::new(&client, &config);

        let request = DeployRequest::new(Protocol::Aave, vec![Recipient::new(A, "X", 100)]).with_asset("WBTC");
        let err = orchestrator.deploy(request, &mut store).await.unwrap_err();

        assert!(matches!(err, DeployError::UnknownAsset(_)));
        assert_eq!(client.request_count(), 0);
        assert_eq!(orchestrator.step(), DeployStep::Idle);
    }
}
