// Kinetic CLI
//
// Deploys yield strategies, shows the dashboard and manages the local
// strategy cache.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::signers::Signer;
use ethers::types::{Address, H256, U256};
use kinetic_yield::api::{ConfigManager, DeployConfig, Kinetic, ReportFormat, ReportFormatter};
use kinetic_yield::ethereum::chain::ChainRegistry;
use kinetic_yield::ethereum::{parse_wallet, EthereumConnector};
use kinetic_yield::orchestrator::DeployRequest;
use kinetic_yield::store::{JsonFileBackend, StrategyStore};
use kinetic_common::parse_base_units;
use kinetic_yield::{DeployError, Protocol, Recipient, StrategyAddress};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Account read on behalf of when no signing key is needed
    #[arg(long, global = true, env = "KINETIC_ACCOUNT")]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a strategy routing its yield to the given recipients
    Deploy {
        /// Morpho, Sky or Aave
        #[arg(long, short)]
        protocol: String,

        /// Recipient as ADDRESS:PERCENTAGE[:NAME]; repeat for each recipient
        #[arg(long = "recipient", short, required = true)]
        recipients: Vec<String>,

        /// Pay the first recipient directly instead of deploying a splitter
        #[arg(long)]
        direct: bool,

        /// Asset for Aave vaults (USDC, DAI, USDT)
        #[arg(long)]
        asset: Option<String>,

        /// Strategy name (generated when omitted)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show assets and yield of every cached strategy
    Dashboard {
        /// Keep refreshing until interrupted
        #[arg(long, short)]
        watch: bool,

        /// Output format (text, json)
        #[arg(long, short, default_value = "text")]
        format: String,

        /// Output file (optional)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Decimals used to render amounts
        #[arg(long, default_value_t = 6)]
        decimals: u32,
    },

    /// Manage the local strategy cache
    Strategies {
        #[command(subcommand)]
        action: StrategyCommand,
    },

    /// Show a payee's position in a payment splitter
    Splitter {
        /// Splitter address (defaults to the configured default splitter)
        #[arg(long, short)]
        address: Option<String>,

        /// Payee (defaults to the connected account)
        #[arg(long)]
        payee: Option<String>,

        /// ERC-20 token; ETH when omitted
        #[arg(long, short)]
        token: Option<String>,

        /// List the splitter's payees as well
        #[arg(long)]
        payees: bool,

        #[arg(long, default_value_t = 18)]
        decimals: u32,
    },

    /// Show the connected account's position in a strategy
    Position {
        /// Strategy or vault address
        address: String,
    },

    /// Deposit into a strategy; approves the asset first
    Deposit {
        /// Strategy or vault address
        address: String,

        /// Amount in whole tokens, e.g. 1.5
        amount: String,
    },

    /// Withdraw from a strategy to the connected account
    Withdraw {
        /// Strategy or vault address
        address: String,

        /// Amount in whole tokens, e.g. 1.5
        amount: String,
    },

    /// Release the connected account's payment from a splitter
    Claim {
        #[arg(long, short)]
        address: Option<String>,

        /// ERC-20 token; ETH when omitted
        #[arg(long, short)]
        token: Option<String>,
    },

    /// Show allowances granted to the Aave vault deployer
    Allowance {
        /// Amount each allowance must cover, in whole tokens
        #[arg(long, default_value = "1")]
        amount: String,
    },

    /// Inspect or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum StrategyCommand {
    /// List cached strategies
    List,

    /// Replace the cache with what the registry and factories list on chain
    Sync,

    /// Resolve pending records from their deployment receipts
    Reconcile,

    /// Drop records without a resolved contract address
    ClearInvalid,

    /// Attach a contract address to a pending record
    Recover {
        /// Deployment transaction hash the record was saved under
        #[arg(long)]
        tx_hash: String,

        /// Contract address of the deployed strategy
        #[arg(long)]
        address: String,
    },

    /// Remove a record
    Remove {
        /// Contract address or transaction hash of the record
        address: String,
    },
}

impl Commands {
    /// Commands that submit transactions
    fn needs_signer(&self) -> bool {
        matches!(
            self,
            Commands::Deploy { .. } | Commands::Claim { .. } | Commands::Deposit { .. } | Commands::Withdraw { .. }
        )
    }

    /// Read commands that act for a specific account
    fn needs_account(&self) -> bool {
        match self {
            Commands::Strategies { action } => matches!(action, StrategyCommand::Sync | StrategyCommand::Reconcile),
            Commands::Splitter { payee, .. } => payee.is_none(),
            Commands::Position { .. } | Commands::Allowance { .. } => true,
            _ => false,
        }
    }
}

impl StrategyCommand {
    /// Only touches the local cache
    fn is_local(&self) -> bool {
        matches!(
            self,
            StrategyCommand::List | StrategyCommand::ClearInvalid | StrategyCommand::Recover { .. } | StrategyCommand::Remove { .. }
        )
    }
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write the default configuration to a file
    Init {
        #[arg(default_value = "kinetic.json")]
        path: PathBuf,
    },

    /// List supported chains
    Chains,
}

fn load_config(path: Option<&PathBuf>) -> Result<DeployConfig> {
    let base = match path {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => DeployConfig::default(),
    };
    ConfigManager::from_env(base)
}

fn parse_recipient(raw: &str) -> Result<Recipient> {
    let mut parts = raw.splitn(3, ':');
    let address = parts.next().unwrap_or_default().trim();
    let percentage = parts
        .next()
        .ok_or_else(|| anyhow!("Recipient {} is missing a percentage", raw))?
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid percentage in {}", raw))?;
    let name = parts.next().map(str::trim).filter(|n| !n.is_empty()).unwrap_or(address);
    Ok(Recipient::new(address, name, percentage))
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|_| anyhow!("Invalid address: {}", raw))
}

fn parse_tx_hash(raw: &str) -> Result<H256> {
    H256::from_str(raw.trim()).map_err(|_| anyhow!("Invalid transaction hash: {}", raw))
}

fn user_error(error: DeployError) -> anyhow::Error {
    anyhow!(error.user_message())
}

fn check_chain(connector: &EthereumConnector, config: &DeployConfig) {
    if connector.chain_id() != config.chain_id {
        log::warn!(
            "Connected to chain {} but configuration targets chain {}",
            connector.chain_id(),
            config.chain_id
        );
    }
}

async fn connect(config: &DeployConfig) -> Result<EthereumConnector> {
    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set")?;
    let connector = EthereumConnector::connect(&config.rpc_url, &private_key).await?;
    check_chain(&connector, config);
    Ok(connector)
}

/// `--account`, or the address of `PRIVATE_KEY` when only that is set
fn read_account(account: Option<&str>) -> Result<Option<Address>> {
    if let Some(account) = account {
        return parse_address(account).map(Some);
    }
    match std::env::var("PRIVATE_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(Some(parse_wallet(&key)?.address())),
        _ => Ok(None),
    }
}

async fn connect_read_only(config: &DeployConfig, account: Option<Address>) -> Result<EthereumConnector> {
    let connector = EthereumConnector::connect_read_only(&config.rpc_url, account.unwrap_or_default()).await?;
    check_chain(&connector, config);
    Ok(connector)
}

/// Convert whole tokens to base units using the strategy asset's decimals
async fn strategy_amount(kinetic: &Kinetic<'_, EthereumConnector, JsonFileBackend>, strategy: Address, amount: &str) -> Result<U256> {
    let decimals = kinetic
        .position(strategy)
        .await
        .map_err(user_error)?
        .asset_decimals
        .unwrap_or(18);
    Ok(parse_base_units(amount, decimals)?)
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    // Parse command line arguments
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Config { action } => run_config(action, &config),
        Commands::Strategies { action } if action.is_local() => run_local(action, &config),
        command => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(command, cli.account, config))
        }
    }
}

fn run_local(action: StrategyCommand, config: &DeployConfig) -> Result<()> {
    let mut store = StrategyStore::open(JsonFileBackend::new(&config.storage_dir))?;
    match action {
        StrategyCommand::ClearInvalid => {
            let count = store.clear_invalid_strategies()?;
            println!("Removed {} invalid strategies", count);
        }
        StrategyCommand::Recover { tx_hash, address } => {
            let tx_hash = parse_tx_hash(&tx_hash)?;
            let strategy = store.recover_strategy(tx_hash, &address)?;
            println!("Recovered {} at {}", strategy.name, strategy.address);
        }
        StrategyCommand::Remove { address } => {
            let removed = store.remove_strategy(&StrategyAddress::parse(address.trim()))?;
            println!("Removed {}", removed.name);
        }
        _ => print!("{}", ReportFormatter::strategies_to_text(store.strategies())),
    }
    Ok(())
}

fn run_config(action: ConfigCommand, config: &DeployConfig) -> Result<()> {
    match action {
        ConfigCommand::Show => println!("{}", serde_json::to_string_pretty(config)?),
        ConfigCommand::Init { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            ConfigManager::save_to_file(&DeployConfig::default(), &path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommand::Chains => {
            let registry = ChainRegistry::new();
            for chain in registry.chains() {
                println!("{:>6}  {}", chain.chain_id, chain.name);
            }
        }
    }
    Ok(())
}

async fn run(command: Commands, account: Option<String>, config: DeployConfig) -> Result<()> {
    let connector = if command.needs_signer() {
        connect(&config).await?
    } else {
        let account = read_account(account.as_deref())?;
        if account.is_none() && command.needs_account() {
            bail!("Set --account (or KINETIC_ACCOUNT) or PRIVATE_KEY to choose the account to read");
        }
        connect_read_only(&config, account).await?
    };
    let store = StrategyStore::open(JsonFileBackend::new(&config.storage_dir))?;
    let default_splitter = config.contracts.default_splitter;
    let mut kinetic = Kinetic::new(&connector, config, store);

    match command {
        Commands::Deploy { protocol, recipients, direct, asset, name } => {
            let protocol = Protocol::from_str(&protocol).map_err(|e| user_error(DeployError::UnsupportedProtocol(e.to_string())))?;
            let recipients = recipients.iter().map(|r| parse_recipient(r)).collect::<Result<Vec<_>>>()?;

            let mut request = DeployRequest::new(protocol, recipients);
            if direct {
                request = request.direct();
            }
            if let Some(asset) = asset {
                request = request.with_asset(asset);
            }
            if let Some(name) = name {
                request = request.with_name(name);
            }

            let outcome = kinetic.deploy(request).await.map_err(user_error)?;
            for warning in &outcome.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("Deployed {} at {}", outcome.strategy.name, outcome.strategy.address);
            if let Some(splitter) = &outcome.splitter {
                println!("Yield routed to splitter {:?}", splitter.address);
            }
            if outcome.needs_recovery() {
                println!(
                    "Address not resolved yet; run `kinetic strategies reconcile` or `recover --tx-hash {:?}`",
                    outcome.strategy_tx
                );
            }
        }

        Commands::Dashboard { watch, format, output, decimals } => {
            let format = match format.as_str() {
                "json" => ReportFormat::Json,
                "text" => ReportFormat::Text,
                other => bail!("Unsupported format: {}", other),
            };

            if watch {
                let (tx, rx) = tokio::sync::watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = tx.send(true);
                    }
                });
                kinetic
                    .watch_dashboard(|data| println!("{}", ReportFormatter::to_text(&data, decimals)), rx)
                    .await;
                return Ok(());
            }

            let data = kinetic.dashboard().await;
            match output {
                Some(path) => {
                    ReportFormatter::save_to_file(&data, decimals, &path, format)?;
                    println!("Report saved to {}", path.display());
                }
                None => match format {
                    ReportFormat::Json => println!("{}", ReportFormatter::to_json(&data)?),
                    ReportFormat::Text => print!("{}", ReportFormatter::to_text(&data, decimals)),
                },
            }
        }

        Commands::Strategies { action } => match action {
            StrategyCommand::List => print!("{}", ReportFormatter::strategies_to_text(kinetic.strategies())),
            StrategyCommand::Sync => {
                let count = kinetic.sync_from_chain().await.map_err(user_error)?;
                println!("Synced {} strategies from chain", count);
            }
            StrategyCommand::Reconcile => {
                let count = kinetic.reconcile_pending().await.map_err(user_error)?;
                println!("Resolved {} pending strategies", count);
            }
            StrategyCommand::ClearInvalid => {
                let count = kinetic.clear_invalid().map_err(user_error)?;
                println!("Removed {} invalid strategies", count);
            }
            StrategyCommand::Recover { tx_hash, address } => {
                let tx_hash = parse_tx_hash(&tx_hash)?;
                let strategy = kinetic.recover(tx_hash, &address).map_err(user_error)?;
                println!("Recovered {} at {}", strategy.name, strategy.address);
            }
            StrategyCommand::Remove { address } => {
                let removed = kinetic.remove(&StrategyAddress::parse(address.trim())).map_err(user_error)?;
                println!("Removed {}", removed.name);
            }
        },

        Commands::Splitter { address, payee, token, payees, decimals } => {
            let splitter = address.as_deref().map(parse_address).transpose()?.unwrap_or(default_splitter);
            let payee = match payee {
                Some(payee) => parse_address(&payee)?,
                None => kinetic_yield::ChainClient::sender(&connector),
            };
            let token = token.as_deref().map(parse_address).transpose()?;

            let summary = kinetic.splitter_summary(splitter, payee, token).await.map_err(user_error)?;
            print!("{}", ReportFormatter::splitter_to_text(&summary, decimals));
            if payees {
                for payee in kinetic.splitter_payees(splitter).await {
                    println!("  payee {:?}", payee);
                }
            }
        }

        Commands::Position { address } => {
            let strategy = parse_address(&address)?;
            let position = kinetic.position(strategy).await.map_err(user_error)?;
            print!("{}", ReportFormatter::position_to_text(&position));
        }

        Commands::Deposit { address, amount } => {
            let strategy = parse_address(&address)?;
            let amount = strategy_amount(&kinetic, strategy, &amount).await?;
            let tx_hash = kinetic.deposit(strategy, amount).await.map_err(user_error)?;
            println!("Deposited in {:?}", tx_hash);
        }

        Commands::Withdraw { address, amount } => {
            let strategy = parse_address(&address)?;
            let amount = strategy_amount(&kinetic, strategy, &amount).await?;
            let tx_hash = kinetic.withdraw(strategy, amount).await.map_err(user_error)?;
            println!("Withdrawn in {:?}", tx_hash);
        }

        Commands::Claim { address, token } => {
            let splitter = address.as_deref().map(parse_address).transpose()?.unwrap_or(default_splitter);
            let token = token.as_deref().map(parse_address).transpose()?;
            let tx_hash = kinetic.claim(splitter, token).await.map_err(user_error)?;
            println!("Payment released in {:?}", tx_hash);
        }

        Commands::Allowance { amount } => {
            for allowance in kinetic.allowances().await.map_err(user_error)? {
                let decimals = kinetic.config().asset(&allowance.symbol).map(|a| a.decimals).unwrap_or(18);
                let needed = parse_base_units(&amount, decimals)?;
                let status = if allowance.needs_approval(needed) { "needs approval" } else { "ok" };
                println!("{:<5} {:>30}  {}", allowance.symbol, allowance.amount, status);
            }
        }

        Commands::Config { action } => run_config(action, kinetic.config())?,
    }

    Ok(())
}
