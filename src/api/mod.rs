// Kinetic API Module
//
// This module provides a unified interface over the deployment client. It
// ties a chain connection, the configuration and the strategy cache together
// and is what the `kinetic` binary drives.

mod config;
mod report;
mod types;

pub use config::*;
pub use report::*;
pub use types::*;

use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use kinetic_common::{Strategy, StrategyAddress};
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::aggregate::{AggregatedData, AggregationReader};
use crate::allowance::{Allowance, AllowanceChecker};
use crate::error::DeployError;
use crate::ethereum::ChainClient;
use crate::index::StrategyIndex;
use crate::orchestrator::{DeployRequest, DeploymentOutcome, Orchestrator};
use crate::resolver::{reconcile, Reconciliation, ResolveContext, ResolverChain};
use crate::splitter::{SplitterReader, SplitterSummary};
use crate::steps::resolution_target;
use crate::store::{StorageBackend, StoreError, StrategyStore};
use crate::vault::{VaultPosition, VaultReader};

/// Main API for the Kinetic client
///
/// # Examples
///
/// ```
/// use kinetic_yield::api::{DeployConfig, Kinetic};
/// use kinetic_yield::store::{MemoryBackend, StrategyStore};
/// use kinetic_yield::testing::MockChainClient;
/// use ethers::types::Address;
///
/// let client = MockChainClient::new(Address::zero());
/// let store = StrategyStore::open(MemoryBackend::new()).unwrap();
/// let kinetic = Kinetic::new(&client, DeployConfig::default(), store);
/// assert!(kinetic.strategies().is_empty());
/// ```
pub struct Kinetic<'a, C: ChainClient + ?Sized, B: StorageBackend> {
    client: &'a C,
    config: DeployConfig,
    store: StrategyStore<B>,
}

impl<'a, C: ChainClient + ?Sized, B: StorageBackend> Kinetic<'a, C, B> {
    pub fn new(client: &'a C, config: DeployConfig, store: StrategyStore<B>) -> Self {
        Self { client, config, store }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn store(&self) -> &StrategyStore<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StrategyStore<B> {
        &mut self.store
    }

    pub fn strategies(&self) -> &[Strategy] {
        self.store.strategies()
    }

    /// Deploy a strategy and cache it
    pub async fn deploy(&mut self, request: DeployRequest) -> Result<DeploymentOutcome, DeployError> {
        Orchestrator::new(self.client, &self.config)
            .deploy(request, &mut self.store)
            .await
    }

    /// Read every cached strategy once
    pub async fn dashboard(&self) -> AggregatedData {
        AggregationReader::new(self.client).read(self.store.strategies()).await
    }

    /// Refresh the dashboard on the configured interval until `shutdown` fires
    pub async fn watch_dashboard(&self, sink: impl FnMut(AggregatedData), shutdown: watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.refresh_interval_secs.max(1));
        AggregationReader::new(self.client)
            .watch(|| self.store.strategies().to_vec(), period, sink, shutdown)
            .await
    }

    /// Replace the cache with what the registry, the strategy factories and
    /// the Aave vault deployer list for the connected account
    pub async fn sync_from_chain(&mut self) -> Result<usize, DeployError> {
        let strategies = StrategyIndex::new(self.client, &self.config.contracts)
            .user_strategies(self.client.sender(), self.store.strategies())
            .await?;

        let count = strategies.len();
        self.store.sync_strategies(strategies)?;
        Ok(count)
    }

    /// Try to resolve every pending record from its deployment receipt.
    /// Returns how many records were promoted.
    pub async fn reconcile_pending(&mut self) -> Result<usize, DeployError> {
        let pending: Vec<(H256, Strategy)> = self
            .store
            .strategies()
            .iter()
            .filter_map(|s| s.address.pending_hash().map(|hash| (hash, s.clone())))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let resolvers = ResolverChain::standard(self.client);
        let sender = self.client.sender();
        let mut promoted = 0;

        for (tx_hash, strategy) in pending {
            let receipt = match self.client.wait_for_receipt(tx_hash).await {
                Ok(Some(receipt)) => receipt,
                Ok(None) => {
                    debug!("{:?} has no receipt yet", tx_hash);
                    continue;
                }
                Err(e) => {
                    debug!("Receipt lookup for {:?} failed: {}", tx_hash, e);
                    continue;
                }
            };
            let target = resolution_target(strategy.protocol, &self.config.contracts)?;
            let known = self.store.valid_addresses();
            let mut ignore: Vec<Address> = strategy.recipients.iter().filter_map(|r| r.parsed_address()).collect();
            ignore.extend(self.config.auxiliary_contracts());

            let ctx = ResolveContext {
                tx_hash,
                receipt: &receipt,
                factory: target.factory,
                sender,
                creation_event: target.creation_event,
                address_topic: target.address_topic,
                lookup: target.lookup,
                known: &known,
                ignore: &ignore,
            };
            let found = resolvers.resolve(&ctx).await;

            if let Reconciliation::Confirmed(address) = reconcile(&StrategyAddress::Pending(tx_hash), found) {
                self.store.recover_strategy(tx_hash, &to_checksum(&address, None))?;
                promoted += 1;
            }
        }

        info!("Reconciled {} pending strategies", promoted);
        Ok(promoted)
    }

    /// Promote a pending record by hand
    pub fn recover(&mut self, tx_hash: H256, address: &str) -> Result<&Strategy, DeployError> {
        Ok(self.store.recover_strategy(tx_hash, address)?)
    }

    pub fn clear_invalid(&mut self) -> Result<usize, DeployError> {
        Ok(self.store.clear_invalid_strategies()?)
    }

    pub fn remove(&mut self, address: &StrategyAddress) -> Result<Strategy, DeployError> {
        Ok(self.store.remove_strategy(address)?)
    }

    /// `payee`'s position in `splitter`; ETH when `token` is `None`
    pub async fn splitter_summary(
        &self,
        splitter: Address,
        payee: Address,
        token: Option<Address>,
    ) -> Result<SplitterSummary, DeployError> {
        SplitterReader::new(self.client).summary(splitter, payee, token).await
    }

    pub async fn splitter_payees(&self, splitter: Address) -> Vec<Address> {
        SplitterReader::new(self.client).payees(splitter).await
    }

    /// Release the connected account's share from `splitter`
    pub async fn claim(&self, splitter: Address, token: Option<Address>) -> Result<H256, DeployError> {
        SplitterReader::new(self.client)
            .claim(splitter, self.client.sender(), token)
            .await
    }

    /// The connected account's holding in `strategy`
    pub async fn position(&self, strategy: Address) -> Result<VaultPosition, DeployError> {
        VaultReader::new(self.client).position(strategy, self.client.sender()).await
    }

    /// Deposit `amount` base units of the strategy's asset and add it to the
    /// cached principal
    pub async fn deposit(&mut self, strategy: Address, amount: U256) -> Result<H256, DeployError> {
        let sender = self.client.sender();
        let tx_hash = VaultReader::new(self.client).deposit(strategy, amount, sender).await?;
        match self.store.record_deposit(strategy, amount) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => warn!("{:?} is not cached; principal not tracked", strategy),
            Err(e) => return Err(e.into()),
        }
        Ok(tx_hash)
    }

    /// Withdraw `amount` base units to the connected account and take it off
    /// the cached principal
    pub async fn withdraw(&mut self, strategy: Address, amount: U256) -> Result<H256, DeployError> {
        let sender = self.client.sender();
        let tx_hash = VaultReader::new(self.client).withdraw(strategy, amount, sender, sender).await?;
        match self.store.record_withdrawal(strategy, amount) {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => warn!("{:?} is not cached; principal not tracked", strategy),
            Err(e) => return Err(e.into()),
        }
        Ok(tx_hash)
    }

    /// Allowances the Aave vault deployer holds on every configured asset
    pub async fn allowances(&self) -> Result<Vec<Allowance>, DeployError> {
        let spender = configured(self.config.contracts.aave_vault_deployer)
            .ok_or(DeployError::NotConfigured("Aave vault deployer"))?;
        Ok(AllowanceChecker::new(self.client)
            .check(&self.config.assets, self.client.sender(), spender)
            .await)
    }
}
