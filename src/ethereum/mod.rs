// Wallet and RPC boundary
//
// Everything the deployment core needs from the network goes through
// `ChainClient`: the connected account, write submission, receipt waits and
// read calls. `EthereumConnector` is the ethers-backed implementation, with
// or without a signing wallet.

pub mod chain;
pub mod contracts;
pub mod etherscan;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, TransactionRequest, H256},
};
use futures::future::join_all;
use log::debug;

use crate::error::ClientError;

/// Connected wallet plus read-only client
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Account that signs write calls
    fn sender(&self) -> Address;

    /// Sign and broadcast a call, returning its transaction hash
    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<H256, ClientError>;

    /// Wait for a transaction to be mined. `None` means it was dropped.
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ClientError>;

    /// Execute a read-only call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError>;

    /// Issue several read calls concurrently; results keep the input order
    async fn batch_call(&self, calls: Vec<(Address, Bytes)>) -> Vec<Result<Bytes, ClientError>> {
        join_all(calls.into_iter().map(|(to, data)| self.call(to, data))).await
    }
}

/// Signing client used by `EthereumConnector`
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Interface to an EVM network through an HTTP RPC endpoint.
///
/// A read-only connector has no wallet: reads work, writes are refused.
pub struct EthereumConnector {
    provider: Provider<Http>,
    signer: Option<Arc<SignerClient>>,
    account: Address,
    chain_id: u64,
}

async fn open_provider(rpc_url: &str) -> Result<(Provider<Http>, u64)> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?
        .interval(Duration::from_millis(1_000));

    let chain_id = provider
        .get_chainid()
        .await
        .context("Failed to fetch chain id")?
        .as_u64();
    Ok((provider, chain_id))
}

/// Parse a hex-encoded private key
pub fn parse_wallet(private_key: &str) -> Result<LocalWallet> {
    LocalWallet::from_str(private_key.trim().trim_start_matches("0x")).context("Invalid private key")
}

impl EthereumConnector {
    /// Connect to `rpc_url` and sign with the hex-encoded `private_key`
    pub async fn connect(rpc_url: &str, private_key: &str) -> Result<Self> {
        let (provider, chain_id) = open_provider(rpc_url).await?;
        let wallet = parse_wallet(private_key)?.with_chain_id(chain_id);
        let account = wallet.address();

        debug!("Connected to chain {} as {:?}", chain_id, account);

        Ok(Self {
            signer: Some(Arc::new(SignerMiddleware::new(provider.clone(), wallet))),
            provider,
            account,
            chain_id,
        })
    }

    /// Connect to `rpc_url` without a wallet; reads are made on behalf of `account`
    pub async fn connect_read_only(rpc_url: &str, account: Address) -> Result<Self> {
        let (provider, chain_id) = open_provider(rpc_url).await?;
        debug!("Connected to chain {} read-only for {:?}", chain_id, account);

        Ok(Self {
            provider,
            signer: None,
            account,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    /// Underlying ethers client, for operations outside `ChainClient`.
    /// `None` on a read-only connection.
    pub fn signer_client(&self) -> Option<Arc<SignerClient>> {
        self.signer.clone()
    }
}

#[async_trait]
impl ChainClient for EthereumConnector {
    fn sender(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<H256, ClientError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ClientError::new("read-only connection cannot sign transactions"))?;
        let tx = TransactionRequest::new().from(self.account).to(to).data(data);
        let pending = signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| ClientError::new(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ClientError> {
        PendingTransaction::new(tx_hash, &self.provider)
            .await
            .map_err(|e| ClientError::new(e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        let tx: TypedTransaction = TransactionRequest::new().from(self.account).to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| ClientError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account 0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_parse_wallet() {
        let wallet = parse_wallet(DEV_KEY).unwrap();
        assert_eq!(
            wallet.address(),
            Address::from_str("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap()
        );
        assert!(parse_wallet("not a key").is_err());
    }

    #[tokio::test]
    async fn test_read_only_connector_refuses_writes() {
        let account = Address::from_low_u64_be(0xa);
        let connector = EthereumConnector {
            provider: Provider::<Http>::try_from("http://localhost:8545").unwrap(),
            signer: None,
            account,
            chain_id: 1,
        };

        assert!(!connector.can_sign());
        assert!(connector.signer_client().is_none());
        assert_eq!(connector.sender(), account);
        let err = connector.send_transaction(Address::zero(), Bytes::new()).await.unwrap_err();
        assert!(err.0.contains("read-only"));
    }
}
