// Deploy the recipient splitter factory
//
// Deploys the factory from a compiled artifact, waits for confirmations and
// submits the source to the chain's block explorer. Prints the environment
// line that points the client at the new factory.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use ethers::abi::Abi;
use ethers::contract::ContractFactory;
use ethers::types::Bytes;
use ethers::utils::to_checksum;
use kinetic_yield::api::ENV_SPLITTER_FACTORY;
use kinetic_yield::ethereum::chain::ChainRegistry;
use kinetic_yield::ethereum::etherscan::{EtherscanClient, VerificationRequest, VerificationStatus};
use kinetic_yield::ethereum::EthereumConnector;
use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIRMATIONS: usize = 6;
const STATUS_POLLS: usize = 10;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Compiled contract artifact (JSON with `abi` and `bytecode`)
    #[arg(long, short, default_value = "artifacts/RecipientSplitterFactory.json")]
    artifact: PathBuf,

    /// Compiler build info holding the standard-JSON input, for verification
    #[arg(long)]
    build_info: Option<PathBuf>,

    /// RPC endpoint
    #[arg(long, env = "KINETIC_RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Skip block explorer verification
    #[arg(long)]
    no_verify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    #[serde(default = "default_contract_name")]
    contract_name: String,
    #[serde(default)]
    source_name: Option<String>,
    abi: Abi,
    bytecode: Bytes,
}

fn default_contract_name() -> String {
    "RecipientSplitterFactory".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: serde_json::Value,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let artifact: Artifact = read_json(&args.artifact)?;
    if artifact.bytecode.is_empty() {
        return Err(anyhow!("{} has no bytecode", args.artifact.display()));
    }

    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY must be set")?;
    let connector = EthereumConnector::connect(&args.rpc_url, &private_key).await?;

    println!("Deploying {}...", artifact.contract_name);
    let signer = connector
        .signer_client()
        .ok_or_else(|| anyhow!("Deploying requires a signing connection"))?;
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), signer);
    let (contract, receipt) = factory
        .deploy(())?
        .confirmations(CONFIRMATIONS)
        .send_with_receipt()
        .await
        .context("Factory deployment failed")?;

    let address = to_checksum(&contract.address(), None);
    println!("{} deployed to: {}", artifact.contract_name, address);
    info!(
        "Deployment transaction {:?} confirmed {} times",
        receipt.transaction_hash, CONFIRMATIONS
    );
    if let Some(chain) = ChainRegistry::new().get_config(connector.chain_id()) {
        println!("Transaction: {}", chain.tx_url(&format!("{:?}", receipt.transaction_hash)));
    }

    if !args.no_verify {
        if let Err(e) = verify(&artifact, args.build_info.as_deref(), &address, connector.chain_id()).await {
            warn!("Verification failed: {}", e);
            println!("Verification failed: {}", e);
        }
    }

    println!();
    println!("Deployment complete. Update your environment with:");
    println!("{}={}", ENV_SPLITTER_FACTORY, address);
    Ok(())
}

async fn verify(artifact: &Artifact, build_info: Option<&Path>, address: &str, chain_id: u64) -> Result<()> {
    let registry = ChainRegistry::new();
    let chain = registry
        .get_config(chain_id)
        .ok_or_else(|| anyhow!("Unknown chain {}", chain_id))?;
    let api_url = chain
        .explorer_api_url
        .as_deref()
        .ok_or_else(|| anyhow!("{} has no verification API", chain.name))?;
    let api_key = std::env::var("ETHERSCAN_API_KEY").context("ETHERSCAN_API_KEY must be set")?;
    let build_info: BuildInfo = read_json(build_info.ok_or_else(|| anyhow!("--build-info is required for verification"))?)?;

    let source_name = artifact
        .source_name
        .clone()
        .unwrap_or_else(|| format!("contracts/{}.sol", artifact.contract_name));
    let request = VerificationRequest {
        address: address.to_string(),
        standard_json: serde_json::to_string(&build_info.input)?,
        contract_name: format!("{}:{}", source_name, artifact.contract_name),
        compiler_version: format!("v{}", build_info.solc_long_version),
        constructor_args: String::new(),
    };

    println!("Verifying contract on {}...", chain.name);
    let client = EtherscanClient::new(api_key, api_url)?;
    let guid = client.verify_contract(&request).await?;
    if guid.is_empty() {
        println!("Contract already verified: {}", chain.address_url(address));
        return Ok(());
    }

    for _ in 0..STATUS_POLLS {
        tokio::time::sleep(Duration::from_secs(5)).await;
        match client.check_verification(&guid).await? {
            VerificationStatus::Pending => continue,
            VerificationStatus::Verified | VerificationStatus::AlreadyVerified => {
                println!("Contract verified: {}", chain.address_url(address));
                return Ok(());
            }
            VerificationStatus::Failed(reason) => return Err(anyhow!(reason)),
        }
    }
    Err(anyhow!("Verification still pending after {} polls (guid {})", STATUS_POLLS, guid))
}
