// On-chain strategy enumeration
//
// A user's strategies are listed in three places: the deployer registry,
// the Morpho and Sky factories' `getUserStrategies`, and the Aave proxy
// deployer's `getUserVaults`. Together they are authoritative and replace
// the local cache on sync. A listing that cannot be read aborts the sync so
// the cache is never replaced by a partial view.

use std::collections::HashSet;

use ethers::abi::Token;
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use kinetic_common::{Protocol, Recipient, Strategy, StrategyAddress};
use log::{debug, info, warn};

use crate::api::{configured, ContractAddresses};
use crate::error::DeployError;
use crate::ethereum::contracts::{
    decode_address_list, decode_registry_entries, encode_call, RegistryEntry, GET_USER_STRATEGIES, GET_USER_VAULTS,
};
use crate::ethereum::ChainClient;

/// Recipient label for strategies listed by the registry
pub const REGISTRY_RECIPIENT_NAME: &str = "Payment Splitter (Public Goods)";

/// Recipient label for Aave vaults, whose fee goes wholly to the deployer's beneficiary
pub const VAULT_RECIPIENT_NAME: &str = "Public Goods (100% fee)";

/// One contract listing strategies per user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Registry,
    Factory(Protocol),
    VaultDeployer,
}

pub struct StrategyIndex<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    contracts: &'a ContractAddresses,
}

impl<'a, C: ChainClient + ?Sized> StrategyIndex<'a, C> {
    pub fn new(client: &'a C, contracts: &'a ContractAddresses) -> Self {
        Self { client, contracts }
    }

    fn sources(&self) -> Vec<(Source, Address, &'static str)> {
        let contracts = self.contracts;
        [
            (Source::Registry, contracts.strategy_registry, GET_USER_STRATEGIES),
            (Source::Factory(Protocol::Morpho), contracts.morpho_factory, GET_USER_STRATEGIES),
            (Source::Factory(Protocol::Sky), contracts.sky_factory, GET_USER_STRATEGIES),
            (Source::VaultDeployer, contracts.aave_vault_deployer, GET_USER_VAULTS),
        ]
        .into_iter()
        .filter_map(|(source, address, lookup)| configured(address).map(|a| (source, a, lookup)))
        .collect()
    }

    /// Every strategy `user` deployed, registry entries first.
    ///
    /// Addresses that are already in `cached` keep the cached record so
    /// names, deposits and recipients survive a sync.
    pub async fn user_strategies(&self, user: Address, cached: &[Strategy]) -> Result<Vec<Strategy>, DeployError> {
        let sources = self.sources();
        if sources.is_empty() {
            return Err(DeployError::NotConfigured("strategy registry or factories"));
        }

        let calls = sources
            .iter()
            .map(|(_, contract, lookup)| (*contract, encode_call(lookup, &[Token::Address(user)])))
            .collect();
        let responses = self.client.batch_call(calls).await;

        let mut seen = HashSet::new();
        let mut strategies = Vec::new();
        for ((source, contract, lookup), response) in sources.into_iter().zip(responses) {
            let data = response.map_err(|e| {
                warn!("{} on {:?} failed: {}", lookup, contract, e);
                DeployError::from(e)
            })?;

            let listed: Vec<Strategy> = match source {
                Source::Registry => decode_registry_entries(&data)?
                    .into_iter()
                    .map(|entry| self.from_registry(entry))
                    .collect(),
                Source::Factory(protocol) => decode_address_list(&data)?
                    .into_iter()
                    .map(|address| self.from_factory(protocol, address, user))
                    .collect(),
                Source::VaultDeployer => decode_address_list(&data)?
                    .into_iter()
                    .map(|address| self.from_factory(Protocol::Aave, address, user))
                    .collect(),
            };
            debug!("{:?} lists {} strategies for {:?}", source, listed.len(), user);

            for strategy in listed {
                if !seen.insert(strategy.address.clone()) {
                    continue;
                }
                let kept = cached
                    .iter()
                    .find(|c| c.address == strategy.address)
                    .cloned()
                    .unwrap_or(strategy);
                strategies.push(kept);
            }
        }

        info!("Found {} strategies on chain for {:?}", strategies.len(), user);
        Ok(strategies)
    }

    fn from_registry(&self, entry: RegistryEntry) -> Strategy {
        // the registry only deploys compounders: 0 = Morpho, 1 = Sky
        let protocol = match entry.protocol {
            0 => Protocol::Morpho,
            1 => Protocol::Sky,
            other => {
                warn!("Unknown registry protocol {} for {:?}, treating as Sky", other, entry.strategy_address);
                Protocol::Sky
            }
        };
        let recipient = if entry.donation_recipient.is_zero() {
            self.contracts.default_splitter
        } else {
            entry.donation_recipient
        };

        fresh(
            entry.strategy_address,
            protocol,
            entry.name,
            Recipient {
                name: REGISTRY_RECIPIENT_NAME.to_string(),
                ..Recipient::splitter(recipient)
            },
        )
    }

    fn from_factory(&self, protocol: Protocol, address: Address, user: Address) -> Strategy {
        let label = short_address(address);
        match protocol {
            Protocol::Aave => fresh(
                address,
                protocol,
                format!("Aave Vault {}", label),
                Recipient {
                    name: VAULT_RECIPIENT_NAME.to_string(),
                    ..Recipient::splitter(user)
                },
            ),
            _ => fresh(
                address,
                protocol,
                format!("{} Strategy {}", protocol, label),
                Recipient {
                    name: REGISTRY_RECIPIENT_NAME.to_string(),
                    ..Recipient::splitter(self.contracts.default_splitter)
                },
            ),
        }
    }
}

fn fresh(address: Address, protocol: Protocol, name: String, recipient: Recipient) -> Strategy {
    Strategy {
        address: StrategyAddress::Confirmed(address),
        protocol,
        name,
        total_deposited: U256::zero(),
        yield_generated: U256::zero(),
        recipients: vec![recipient],
    }
}

/// `0x1234...abcd`
fn short_address(address: Address) -> String {
    let checksum = to_checksum(&address, None);
    format!("{}...{}", &checksum[..6], &checksum[checksum.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::contracts::encode_registry_entries;
    use crate::testing::MockChainClient;
    use ethers::abi;

    fn registry_only() -> ContractAddresses {
        ContractAddresses {
            strategy_registry: Some(Address::from_low_u64_be(0xe)),
            morpho_factory: None,
            sky_factory: None,
            aave_vault_deployer: None,
            default_splitter: Address::from_low_u64_be(0xd),
            ..ContractAddresses::default()
        }
    }

    fn address_list(addresses: &[Address]) -> Vec<u8> {
        abi::encode(&[Token::Array(addresses.iter().copied().map(Token::Address).collect())])
    }

    #[tokio::test]
    async fn test_maps_registry_entries() {
        let contracts = registry_only();
        let registry = contracts.strategy_registry.unwrap();
        let default_splitter = contracts.default_splitter;
        let user = Address::from_low_u64_be(0xa);
        let client = MockChainClient::new(user);
        client.on_call(
            registry,
            GET_USER_STRATEGIES,
            encode_registry_entries(&[
                RegistryEntry {
                    strategy_address: Address::repeat_byte(0x11),
                    protocol: 0,
                    name: "m".into(),
                    donation_recipient: Address::zero(),
                },
                RegistryEntry {
                    strategy_address: Address::repeat_byte(0x22),
                    protocol: 1,
                    name: "s".into(),
                    donation_recipient: Address::repeat_byte(0x33),
                },
            ]),
        );

        let strategies = StrategyIndex::new(&client, &contracts)
            .user_strategies(user, &[])
            .await
            .unwrap();

        assert_eq!(strategies.len(), 2);
        assert_eq!(strategies[0].protocol, Protocol::Morpho);
        assert_eq!(strategies[0].recipients[0].parsed_address(), Some(default_splitter));
        assert_eq!(strategies[0].recipients[0].name, REGISTRY_RECIPIENT_NAME);
        assert_eq!(strategies[1].protocol, Protocol::Sky);
        assert_eq!(strategies[1].recipients[0].parsed_address(), Some(Address::repeat_byte(0x33)));
        assert!(strategies.iter().all(|s| s.total_deposited.is_zero()));
    }

    #[tokio::test]
    async fn test_merges_factories_and_vault_deployer() {
        let contracts = ContractAddresses::default();
        let user = Address::from_low_u64_be(0xa);
        let client = MockChainClient::new(user);
        let registered = Address::repeat_byte(0x11);
        let sky = Address::repeat_byte(0x22);
        let vault = Address::repeat_byte(0x33);

        client.on_call(
            contracts.strategy_registry.unwrap(),
            GET_USER_STRATEGIES,
            encode_registry_entries(&[RegistryEntry {
                strategy_address: registered,
                protocol: 1,
                name: "registered".into(),
                donation_recipient: Address::zero(),
            }]),
        );
        client.on_call(contracts.morpho_factory.unwrap(), GET_USER_STRATEGIES, address_list(&[]));
        // the registry entry is also listed by the factory it went through
        client.on_call(contracts.sky_factory.unwrap(), GET_USER_STRATEGIES, address_list(&[registered, sky]));
        client.on_call(contracts.aave_vault_deployer.unwrap(), GET_USER_VAULTS, address_list(&[vault]));

        let mut cached = fresh(vault, Protocol::Aave, "my vault".into(), Recipient::splitter(Address::repeat_byte(0x44)));
        cached.total_deposited = U256::exp10(6);

        let strategies = StrategyIndex::new(&client, &contracts)
            .user_strategies(user, &[cached.clone()])
            .await
            .unwrap();

        let addresses: Vec<_> = strategies.iter().map(|s| s.address.address().unwrap()).collect();
        assert_eq!(addresses, vec![registered, sky, vault]);
        assert_eq!(strategies[0].name, "registered");
        assert_eq!(strategies[1].protocol, Protocol::Sky);
        assert!(strategies[1].name.starts_with("Sky Strategy 0x2222"));
        assert_eq!(strategies[2], cached);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let contracts = registry_only();
        let client = MockChainClient::new(Address::zero());
        let result = StrategyIndex::new(&client, &contracts)
            .user_strategies(Address::zero(), &[])
            .await;
        assert!(matches!(result, Err(DeployError::Reverted(_))));

        let nothing = ContractAddresses {
            strategy_registry: None,
            ..registry_only()
        };
        let result = StrategyIndex::new(&client, &nothing)
            .user_strategies(Address::zero(), &[])
            .await;
        assert!(matches!(result, Err(DeployError::NotConfigured(_))));
    }

    #[test]
    fn test_short_address() {
        assert_eq!(short_address(Address::repeat_byte(0x22)), "0x2222...2222");
    }
}
