use ethers::abi::{self, Token};
use ethers::types::{Address, U256};
use kinetic_yield::api::{DeployConfig, Kinetic, ReportFormatter};
use kinetic_yield::ethereum::contracts::TOTAL_ASSETS;
use kinetic_yield::store::{MemoryBackend, StrategyStore};
use kinetic_yield::testing::MockChainClient;
use kinetic_yield::{Protocol, Strategy, StrategyAddress};

fn uint(value: u64) -> Vec<u8> {
    abi::encode(&[Token::Uint(U256::from(value))])
}

fn record(address: StrategyAddress, name: &str, deposited: u64) -> Strategy {
    Strategy {
        address,
        protocol: Protocol::Aave,
        name: name.to_string(),
        total_deposited: U256::from(deposited),
        yield_generated: U256::zero(),
        recipients: vec![],
    }
}

fn portfolio(client: &MockChainClient) -> Kinetic<'_, MockChainClient, MemoryBackend> {
    let mut store = StrategyStore::open(MemoryBackend::new()).unwrap();
    store
        .add_strategy(record(Address::repeat_byte(1).into(), "growing", 1_000_000))
        .unwrap();
    store
        .add_strategy(record(Address::repeat_byte(2).into(), "losing", 1_000_000))
        .unwrap();
    store
        .add_strategy(record(Address::repeat_byte(3).into(), "unreachable", 1_000_000))
        .unwrap();
    store
        .add_strategy(record(StrategyAddress::Invalid("bad".into()), "bad", 1_000_000))
        .unwrap();

    client.on_call(Address::repeat_byte(1), TOTAL_ASSETS, uint(1_250_000));
    client.on_call(Address::repeat_byte(2), TOTAL_ASSETS, uint(900_000));
    client.fail_call(Address::repeat_byte(3), TOTAL_ASSETS, "connection refused");

    Kinetic::new(client, DeployConfig::default(), store)
}

#[tokio::test]
async fn test_dashboard_totals() {
    let client = MockChainClient::new(Address::zero());
    let kinetic = portfolio(&client);

    let data = kinetic.dashboard().await;

    assert_eq!(data.total_assets, U256::from(2_150_000u64));
    assert_eq!(data.total_yield, U256::from(250_000u64));
    assert_eq!(data.failed_reads, 1);
    assert_eq!(data.skipped, 1);
    assert_eq!(data.strategies.len(), 3);
    // one batch: a read per resolved record
    assert_eq!(client.reads().len(), 3);

    let text = ReportFormatter::to_text(&data, 6);
    assert!(text.contains("2.15"));
    assert!(text.contains("growing"));
}

#[tokio::test]
async fn test_empty_portfolio_reads_nothing() {
    let client = MockChainClient::new(Address::zero());
    let kinetic = Kinetic::new(
        &client,
        DeployConfig::default(),
        StrategyStore::open(MemoryBackend::new()).unwrap(),
    );

    let data = kinetic.dashboard().await;
    assert_eq!(data.total_assets, U256::zero());
    assert_eq!(data.total_yield, U256::zero());
    assert!(data.strategies.is_empty());
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn test_watch_stops_on_shutdown() {
    let client = MockChainClient::new(Address::zero());
    let kinetic = portfolio(&client);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let mut snapshots = Vec::new();
    kinetic
        .watch_dashboard(
            |data| {
                snapshots.push(data);
                let _ = tx.send(true);
            },
            rx,
        )
        .await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].total_assets, U256::from(2_150_000u64));
}

#[test]
fn test_json_report_uses_decimal_strings() {
    let data = kinetic_yield::aggregate::aggregate(vec![], 2);
    let json = ReportFormatter::to_json(&data).unwrap();
    assert!(json.contains("\"totalAssets\": \"0\""));
    assert!(json.contains("\"skipped\": 2"));
}
