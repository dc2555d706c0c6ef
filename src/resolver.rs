// Strategy address resolution
//
// A confirmed deployment does not hand back the new contract address
// directly. Resolvers try to recover it from the receipt or from the
// factory's per-user list; when none succeeds the record keeps the
// transaction hash until it is reconciled later.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, TransactionReceipt, H256};
use kinetic_common::StrategyAddress;
use log::{debug, info, warn};

use crate::ethereum::contracts::{decode_address_list, decode_registry_entries, encode_call};
use crate::ethereum::ChainClient;

/// Everything a resolver may look at for one deployment
pub struct ResolveContext<'a> {
    pub tx_hash: H256,
    pub receipt: &'a TransactionReceipt,
    /// Contract the deployment call was sent to
    pub factory: Address,
    pub sender: Address,
    /// Topic 0 of the factory's creation event
    pub creation_event: H256,
    /// Index of the topic carrying the new address
    pub address_topic: usize,
    /// Per-user listing function on the factory, e.g. `getUserVaults(address)`
    pub lookup: &'static str,
    /// Addresses already cached locally
    pub known: &'a [Address],
    /// Contracts that emit logs during deployment but are not the result (assets, splitters)
    pub ignore: &'a [Address],
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<Address>;
}

/// Reads the address out of the factory's creation event
pub struct EventLogResolver;

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

#[async_trait]
impl AddressResolver for EventLogResolver {
    fn name(&self) -> &'static str {
        "event-log"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<Address> {
        ctx.receipt
            .logs
            .iter()
            .filter(|log| log.address == ctx.factory)
            .find(|log| log.topics.first() == Some(&ctx.creation_event))
            .and_then(|log| log.topics.get(ctx.address_topic))
            .map(topic_address)
            .filter(|a| !a.is_zero())
    }
}

/// Last resort: the created contract, or the first log emitter that is not
/// the factory, an ignored contract or an already cached strategy
pub struct LogEmitterResolver;

#[async_trait]
impl AddressResolver for LogEmitterResolver {
    fn name(&self) -> &'static str {
        "log-emitter"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<Address> {
        if let Some(created) = ctx.receipt.contract_address {
            return Some(created);
        }
        let guess = ctx
            .receipt
            .logs
            .iter()
            .map(|log| log.address)
            .find(|emitter| *emitter != ctx.factory && !ctx.ignore.contains(emitter) && !ctx.known.contains(emitter));
        if let Some(address) = guess {
            debug!("No creation event in {:?}, guessing log emitter {:?}", ctx.tx_hash, address);
        }
        guess
    }
}

/// Reads the factory's per-user list and takes the newest unknown entry
pub struct FactoryListResolver<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> FactoryListResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<'a, C: ChainClient + ?Sized> AddressResolver for FactoryListResolver<'a, C> {
    fn name(&self) -> &'static str {
        "factory-list"
    }

    async fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<Address> {
        let data = match self
            .client
            .call(ctx.factory, encode_call(ctx.lookup, &[Token::Address(ctx.sender)]))
            .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!("{} lookup on {:?} failed: {}", ctx.lookup, ctx.factory, e);
                return None;
            }
        };

        // The registry returns full entries, plain factories return address[]
        let listed = decode_registry_entries(&data)
            .map(|entries| entries.into_iter().map(|e| e.strategy_address).collect::<Vec<_>>())
            .or_else(|_| decode_address_list(&data));

        match listed {
            Ok(addresses) => addresses.into_iter().rev().find(|a| !ctx.known.contains(a)),
            Err(e) => {
                warn!("Unreadable {} response: {}", ctx.lookup, e);
                None
            }
        }
    }
}

/// Tries each resolver in order
#[derive(Default)]
pub struct ResolverChain<'a> {
    resolvers: Vec<Box<dyn AddressResolver + 'a>>,
}

impl<'a> ResolverChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation event, then the factory list, then the log emitter guess
    pub fn standard<C: ChainClient + ?Sized>(client: &'a C) -> Self {
        Self::new()
            .with(EventLogResolver)
            .with(FactoryListResolver::new(client))
            .with(LogEmitterResolver)
    }

    pub fn with(mut self, resolver: impl AddressResolver + 'a) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub async fn resolve(&self, ctx: &ResolveContext<'_>) -> Option<Address> {
        for resolver in &self.resolvers {
            if let Some(address) = resolver.resolve(ctx).await {
                info!("Resolved {:?} via {}", address, resolver.name());
                return Some(address);
            }
        }
        warn!("Could not resolve the address deployed in {:?}", ctx.tx_hash);
        None
    }
}

/// Outcome of matching a cached record against a lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Confirmed(Address),
    StillPending,
}

/// Decide what a record's address becomes given a lookup result.
///
/// A confirmed record never changes. Anything else is promoted only when a
/// non-zero address was found.
pub fn reconcile(current: &StrategyAddress, found: Option<Address>) -> Reconciliation {
    match (current, found) {
        (StrategyAddress::Confirmed(address), _) => Reconciliation::Confirmed(*address),
        (_, Some(address)) if !address.is_zero() => Reconciliation::Confirmed(address),
        _ => Reconciliation::StillPending,
    }
}

impl Reconciliation {
    /// Address to store for a deployment sent in `tx_hash`
    pub fn into_address(self, tx_hash: H256) -> StrategyAddress {
        match self {
            Reconciliation::Confirmed(address) => StrategyAddress::Confirmed(address),
            Reconciliation::StillPending => StrategyAddress::Pending(tx_hash),
        }
    }
}
