// Portfolio aggregation
//
// One refresh issues a single concurrent batch of `totalAssets()` reads over
// every cached strategy with a resolved address. A failed read contributes
// zero instead of failing the whole refresh.

use std::time::Duration;

use ethers::types::{Address, U256};
use kinetic_common::Strategy;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::ethereum::contracts::{decode_uint, encode_call, TOTAL_ASSETS};
use crate::ethereum::ChainClient;

/// Default interval between dashboard refreshes
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(10);

/// Yield earned so far, never negative
pub fn compute_yield(current: U256, deposited: U256) -> U256 {
    current.saturating_sub(deposited)
}

/// One strategy's live position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPosition {
    pub address: Address,
    pub name: String,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub deposited: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub current_assets: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub yield_generated: U256,
    /// The read failed and the position counts as zero
    pub read_failed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedData {
    #[serde(with = "kinetic_common::decimal_u256")]
    pub total_assets: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub total_yield: U256,
    pub strategies: Vec<StrategyPosition>,
    /// Reads that failed this refresh
    pub failed_reads: usize,
    /// Records skipped because their address is unresolved
    pub skipped: usize,
}

/// Fold per-strategy reads into totals
pub fn aggregate(positions: Vec<StrategyPosition>, skipped: usize) -> AggregatedData {
    let total_assets = positions
        .iter()
        .fold(U256::zero(), |acc, p| acc.saturating_add(p.current_assets));
    let total_yield = positions
        .iter()
        .fold(U256::zero(), |acc, p| acc.saturating_add(p.yield_generated));
    let failed_reads = positions.iter().filter(|p| p.read_failed).count();

    AggregatedData {
        total_assets,
        total_yield,
        strategies: positions,
        failed_reads,
        skipped,
    }
}

pub struct AggregationReader<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> AggregationReader<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Read every resolved strategy once
    pub async fn read(&self, strategies: &[Strategy]) -> AggregatedData {
        let readable: Vec<(Address, &Strategy)> = strategies
            .iter()
            .filter_map(|s| s.address.address().map(|a| (a, s)))
            .collect();
        let skipped = strategies.len() - readable.len();
        if skipped > 0 {
            debug!("Skipping {} unresolved strategies", skipped);
        }

        let calls = readable
            .iter()
            .map(|(address, _)| (*address, encode_call(TOTAL_ASSETS, &[])))
            .collect();
        let results = self.client.batch_call(calls).await;

        let positions = readable
            .into_iter()
            .zip(results)
            .map(|((address, strategy), result)| {
                let current = result.map_err(|e| e.to_string()).and_then(|data| decode_uint(&data).map_err(|e| e.to_string()));
                match current {
                    Ok(current_assets) => StrategyPosition {
                        address,
                        name: strategy.name.clone(),
                        deposited: strategy.total_deposited,
                        current_assets,
                        yield_generated: compute_yield(current_assets, strategy.total_deposited),
                        read_failed: false,
                    },
                    Err(e) => {
                        warn!("totalAssets() failed for {:?}: {}", address, e);
                        StrategyPosition {
                            address,
                            name: strategy.name.clone(),
                            deposited: strategy.total_deposited,
                            current_assets: U256::zero(),
                            yield_generated: U256::zero(),
                            read_failed: true,
                        }
                    }
                }
            })
            .collect();

        aggregate(positions, skipped)
    }

    /// Refresh every `period` and hand each snapshot to `sink` until
    /// `shutdown` turns true or its sender is dropped.
    pub async fn watch<F>(
        &self,
        mut source: impl FnMut() -> Vec<Strategy>,
        period: Duration,
        mut sink: F,
        mut shutdown: watch::Receiver<bool>,
    ) where
        F: FnMut(AggregatedData),
    {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let strategies = source();
                    sink(self.read(&strategies).await);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Aggregation watch stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainClient;
    use ethers::abi::{self, Token};
    use kinetic_common::{Protocol, StrategyAddress};

    fn strategy(address: StrategyAddress, deposited: u64) -> Strategy {
        Strategy {
            address,
            protocol: Protocol::Aave,
            name: "s".to_string(),
            total_deposited: U256::from(deposited),
            yield_generated: U256::zero(),
            recipients: vec![],
        }
    }

    fn uint(value: u64) -> Vec<u8> {
        abi::encode(&[Token::Uint(U256::from(value))])
    }

    #[test]
    fn test_yield_floor() {
        assert_eq!(compute_yield(U256::from(90), U256::from(100)), U256::zero());
        assert_eq!(compute_yield(U256::from(150), U256::from(100)), U256::from(50));
    }

    #[test]
    fn test_empty_aggregate() {
        let data = aggregate(vec![], 0);
        assert_eq!(data.total_assets, U256::zero());
        assert_eq!(data.total_yield, U256::zero());
    }

    #[tokio::test]
    async fn test_read_skips_invalid_and_zeroes_failures() {
        let client = MockChainClient::new(Address::zero());
        let ok = Address::from_low_u64_be(1);
        let broken = Address::from_low_u64_be(2);
        client.on_call(ok, TOTAL_ASSETS, uint(1_500_000));
        client.fail_call(broken, TOTAL_ASSETS, "execution reverted");

        let strategies = vec![
            strategy(ok.into(), 1_000_000),
            strategy(broken.into(), 10),
            strategy(StrategyAddress::Invalid("bad".into()), 0),
        ];
        let data = AggregationReader::new(&client).read(&strategies).await;

        assert_eq!(client.reads().len(), 2);
        assert_eq!(data.skipped, 1);
        assert_eq!(data.failed_reads, 1);
        assert_eq!(data.total_assets, U256::from(1_500_000));
        assert_eq!(data.total_yield, U256::from(500_000));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let client = MockChainClient::new(Address::zero());
        let (tx, rx) = watch::channel(false);
        let mut snapshots = 0;

        let reader = AggregationReader::new(&client);
        let run = reader.watch(
            Vec::new,
            Duration::from_millis(5),
            |_| {
                snapshots += 1;
            },
            rx,
        );
        let stop = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(run, stop);

        assert!(snapshots >= 1);
    }
}
