// Strategy deployment
//
// `resolution_target` and `plan` are the only code that branches on the
// protocol: which contract to call, with what arguments, and how the new
// address shows up afterwards. `StrategyStep` submits the plan and resolves
// the address.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use kinetic_common::{Protocol, StrategyAddress};
use log::info;

use crate::api::{configured, AssetConfig, ContractAddresses};
use crate::error::DeployError;
use crate::ethereum::contracts::{
    event_topic, ContractCall, CREATE_MORPHO_STRATEGY, CREATE_SKY_STRATEGY, DEPLOY_VAULT, GET_USER_STRATEGIES,
    GET_USER_VAULTS, STRATEGY_DEPLOY_EVENT, VAULT_DEPLOYED_EVENT,
};
use crate::ethereum::ChainClient;
use crate::resolver::{reconcile, ResolveContext, ResolverChain};
use crate::submitter::TransactionSubmitter;

/// Fee fraction handed to new Aave vaults: 1e18 = 100% to the beneficiary
pub fn full_fee() -> U256 {
    U256::exp10(18)
}

/// Where a protocol's deployments happen and how their address shows up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionTarget {
    pub factory: Address,
    pub creation_event: H256,
    /// Index of the creation event topic carrying the new address
    pub address_topic: usize,
    /// Per-user listing function on the factory
    pub lookup: &'static str,
}

/// How to deploy one strategy and find its address afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub protocol: Protocol,
    pub call: ContractCall,
    pub target: ResolutionTarget,
}

fn require(address: Option<Address>, what: &'static str) -> Result<Address, DeployError> {
    configured(address).ok_or(DeployError::NotConfigured(what))
}

/// Deployment contract and address lookup for `protocol`
pub fn resolution_target(protocol: Protocol, contracts: &ContractAddresses) -> Result<ResolutionTarget, DeployError> {
    let target = match protocol {
        Protocol::Morpho => ResolutionTarget {
            factory: require(contracts.morpho_factory, "Morpho strategy factory")?,
            creation_event: event_topic(STRATEGY_DEPLOY_EVENT),
            address_topic: 3,
            lookup: GET_USER_STRATEGIES,
        },
        Protocol::Sky => ResolutionTarget {
            factory: require(contracts.sky_factory, "Sky strategy factory")?,
            creation_event: event_topic(STRATEGY_DEPLOY_EVENT),
            address_topic: 3,
            lookup: GET_USER_STRATEGIES,
        },
        Protocol::Aave => ResolutionTarget {
            factory: require(contracts.aave_vault_deployer, "Aave vault deployer")?,
            creation_event: event_topic(VAULT_DEPLOYED_EVENT),
            address_topic: 1,
            lookup: GET_USER_VAULTS,
        },
    };
    Ok(target)
}

/// Build the deployment call for `protocol`.
///
/// `beneficiary` receives the yield (a splitter or a single recipient).
/// `asset` is only read for Aave.
pub fn plan(
    protocol: Protocol,
    name: &str,
    beneficiary: Address,
    sender: Address,
    contracts: &ContractAddresses,
    asset: Option<&AssetConfig>,
) -> Result<DeploymentPlan, DeployError> {
    let target = resolution_target(protocol, contracts)?;

    let call = match protocol {
        Protocol::Morpho => ContractCall::new(
            target.factory,
            CREATE_MORPHO_STRATEGY,
            &[
                Token::Address(contracts.morpho_compounder_vault),
                Token::String(name.to_string()),
                Token::Address(sender),
                Token::Address(sender),
                Token::Address(sender),
                Token::Address(beneficiary),
                Token::Bool(false),
                Token::Address(contracts.tokenized_strategy),
            ],
        ),
        Protocol::Sky => ContractCall::new(
            target.factory,
            CREATE_SKY_STRATEGY,
            &[
                Token::String(name.to_string()),
                Token::Address(sender),
                Token::Address(sender),
                Token::Address(sender),
                Token::Address(beneficiary),
                Token::Bool(false),
                Token::Address(contracts.tokenized_strategy),
            ],
        ),
        Protocol::Aave => {
            let asset = asset.ok_or_else(|| DeployError::UnknownAsset("no asset selected".to_string()))?;
            ContractCall::new(
                target.factory,
                DEPLOY_VAULT,
                &[
                    Token::Address(asset.address),
                    Token::Address(sender),
                    Token::Uint(full_fee()),
                ],
            )
        }
    };

    Ok(DeploymentPlan { protocol, call, target })
}

/// A confirmed strategy deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDeployment {
    /// Resolved address, or the transaction hash when resolution failed
    pub address: StrategyAddress,
    pub tx_hash: H256,
}

pub struct StrategyStep<'a, 'r, C: ChainClient + ?Sized> {
    client: &'a C,
    resolvers: &'a ResolverChain<'r>,
}

impl<'a, 'r, C: ChainClient + ?Sized> StrategyStep<'a, 'r, C> {
    pub fn new(client: &'a C, resolvers: &'a ResolverChain<'r>) -> Self {
        Self { client, resolvers }
    }

    /// Broadcast the deployment call and return its hash right away
    pub async fn send(&self, plan: &DeploymentPlan) -> Result<H256, DeployError> {
        info!("Deploying {} strategy via {:?}", plan.protocol, plan.call.to);
        TransactionSubmitter::new(self.client).send(&plan.call).await
    }

    /// Wait for `tx_hash` and resolve the deployed address.
    ///
    /// `known` lists addresses already cached so a factory list lookup cannot
    /// pick an older deployment; `ignore` lists contracts whose logs are not
    /// the new strategy.
    pub async fn confirm(
        &self,
        plan: &DeploymentPlan,
        tx_hash: H256,
        known: &[Address],
        ignore: &[Address],
    ) -> Result<StrategyDeployment, DeployError> {
        let target = plan.target;
        let submission = TransactionSubmitter::new(self.client)
            .confirm(plan.call.function, tx_hash)
            .await?;

        let ctx = ResolveContext {
            tx_hash: submission.tx_hash,
            receipt: &submission.receipt,
            factory: target.factory,
            sender: self.client.sender(),
            creation_event: target.creation_event,
            address_topic: target.address_topic,
            lookup: target.lookup,
            known,
            ignore,
        };
        let found = self.resolvers.resolve(&ctx).await;
        let address = reconcile(&StrategyAddress::Pending(submission.tx_hash), found).into_address(submission.tx_hash);

        Ok(StrategyDeployment {
            address,
            tx_hash: submission.tx_hash,
        })
    }

    /// Send `plan`, wait for it and resolve the deployed address
    pub async fn deploy(
        &self,
        plan: DeploymentPlan,
        known: &[Address],
        ignore: &[Address],
    ) -> Result<StrategyDeployment, DeployError> {
        let tx_hash = self.send(&plan).await?;
        self.confirm(&plan, tx_hash, known, ignore).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::default_assets;
    use crate::resolver::EventLogResolver;
    use crate::testing::{address_topic, log, MockChainClient};
    use ethers::abi::{self, ParamType};

    fn contracts() -> ContractAddresses {
        ContractAddresses::default()
    }

    #[test]
    fn test_morpho_plan_arguments() {
        let sender = Address::from_low_u64_be(0xa);
        let splitter = Address::from_low_u64_be(0xb);
        let plan = plan(Protocol::Morpho, "ImpactVault-Morpho-1", splitter, sender, &contracts(), None).unwrap();

        assert_eq!(Some(plan.call.to), contracts().morpho_factory);
        let args = abi::decode(
            &[
                ParamType::Address,
                ParamType::String,
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Address,
                ParamType::Bool,
                ParamType::Address,
            ],
            &plan.call.data[4..],
        )
        .unwrap();
        assert_eq!(args[1], Token::String("ImpactVault-Morpho-1".into()));
        assert_eq!(args[2], Token::Address(sender));
        assert_eq!(args[5], Token::Address(splitter));
        assert_eq!(args[6], Token::Bool(false));
    }

    #[test]
    fn test_aave_plan_uses_full_fee() {
        let assets = default_assets();
        let sender = Address::from_low_u64_be(0xa);
        let plan = plan(Protocol::Aave, "n", Address::zero(), sender, &contracts(), Some(&assets[0])).unwrap();

        let args = abi::decode(&[ParamType::Address, ParamType::Address, ParamType::Uint(256)], &plan.call.data[4..]).unwrap();
        assert_eq!(args[0], Token::Address(assets[0].address));
        assert_eq!(args[1], Token::Address(sender));
        assert_eq!(args[2], Token::Uint(U256::exp10(18)));
        assert_eq!(plan.target.lookup, GET_USER_VAULTS);
    }

    #[test]
    fn test_missing_factory_is_not_configured() {
        let mut contracts = contracts();
        contracts.sky_factory = Some(Address::zero());
        let err = plan(Protocol::Sky, "n", Address::zero(), Address::zero(), &contracts, None).unwrap_err();
        assert!(matches!(err, DeployError::NotConfigured(_)));

        let err = plan(Protocol::Aave, "n", Address::zero(), Address::zero(), &ContractAddresses::default(), None)
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownAsset(_)));
    }

    #[tokio::test]
    async fn test_unresolved_address_keeps_hash() {
        let client = MockChainClient::new(Address::from_low_u64_be(0xa));
        let resolvers = ResolverChain::new().with(EventLogResolver);
        let plan = plan(Protocol::Sky, "n", Address::zero(), client.sender(), &contracts(), None).unwrap();

        let deployment = StrategyStep::new(&client, &resolvers).deploy(plan, &[], &[]).await.unwrap();
        assert_eq!(deployment.address, StrategyAddress::Pending(deployment.tx_hash));
    }

    #[tokio::test]
    async fn test_event_resolves_address() {
        let client = MockChainClient::new(Address::from_low_u64_be(0xa));
        let factory = contracts().sky_factory.unwrap();
        let strategy = Address::from_low_u64_be(0x77);
        client.receipt_logs_at(
            0,
            vec![log(
                factory,
                vec![
                    event_topic(STRATEGY_DEPLOY_EVENT),
                    address_topic(client.sender()),
                    address_topic(Address::zero()),
                    address_topic(strategy),
                ],
            )],
        );

        let resolvers = ResolverChain::new().with(EventLogResolver);
        let plan = plan(Protocol::Sky, "n", Address::zero(), client.sender(), &contracts(), None).unwrap();
        let deployment = StrategyStep::new(&client, &resolvers).deploy(plan, &[], &[]).await.unwrap();
        assert_eq!(deployment.address, StrategyAddress::Confirmed(strategy));
    }
}
