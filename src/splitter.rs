// Payment splitter dashboard
//
// Reads a payee's position in a PaymentSplitter and submits claims. ETH and
// ERC-20 balances use the overloaded `releasable`/`released`/`release`
// functions with and without a token argument.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::ethereum::contracts::{
    decode_address, decode_uint, encode_call, ContractCall, PAYEE, RELEASABLE, RELEASABLE_TOKEN, RELEASE,
    RELEASED, RELEASED_TOKEN, RELEASE_TOKEN, SHARES, TOTAL_RELEASED, TOTAL_SHARES,
};
use crate::ethereum::ChainClient;
use crate::submitter::TransactionSubmitter;

/// Payee indices tried by `SplitterReader::payees`
pub const MAX_PAYEES: u64 = 10;

/// A payee's position in a splitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitterSummary {
    pub splitter: Address,
    pub payee: Address,
    /// ERC-20 token, `None` for ETH
    pub token: Option<Address>,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub total_shares: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub shares: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub releasable: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub released: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub total_released: U256,
}

impl SplitterSummary {
    /// Share of the splitter in hundredths of a percent (`5000` = 50.00%)
    pub fn share_basis_points(&self) -> u64 {
        if self.total_shares.is_zero() {
            return 0;
        }
        (self.shares.saturating_mul(U256::from(10_000u64)) / self.total_shares).low_u64()
    }

    /// Share as a percentage with two decimals
    pub fn share_percentage(&self) -> f64 {
        self.share_basis_points() as f64 / 100.0
    }

    pub fn has_claimable(&self) -> bool {
        !self.releasable.is_zero()
    }
}

pub struct SplitterReader<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> SplitterReader<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    async fn read_uint(&self, splitter: Address, signature: &str, args: &[Token]) -> Result<U256, DeployError> {
        let data = self.client.call(splitter, encode_call(signature, args)).await?;
        decode_uint(&data)
    }

    /// Read `payee`'s position; `token = None` reads the ETH balances
    pub async fn summary(
        &self,
        splitter: Address,
        payee: Address,
        token: Option<Address>,
    ) -> Result<SplitterSummary, DeployError> {
        let account = Token::Address(payee);
        let (releasable, released) = match token {
            Some(token) => {
                let args = [Token::Address(token), account.clone()];
                (
                    self.read_uint(splitter, RELEASABLE_TOKEN, &args).await?,
                    self.read_uint(splitter, RELEASED_TOKEN, &args).await?,
                )
            }
            None => (
                self.read_uint(splitter, RELEASABLE, &[account.clone()]).await?,
                self.read_uint(splitter, RELEASED, &[account.clone()]).await?,
            ),
        };

        let summary = SplitterSummary {
            splitter,
            payee,
            token,
            total_shares: self.read_uint(splitter, TOTAL_SHARES, &[]).await?,
            shares: self.read_uint(splitter, SHARES, &[account]).await?,
            releasable,
            released,
            total_released: self.read_uint(splitter, TOTAL_RELEASED, &[]).await?,
        };
        debug!("Splitter {:?} payee {:?}: {:?}", splitter, payee, summary);
        Ok(summary)
    }

    /// Payees at indices `0..MAX_PAYEES` that answer
    pub async fn payees(&self, splitter: Address) -> Vec<Address> {
        let calls = (0..MAX_PAYEES)
            .map(|i| (splitter, encode_call(PAYEE, &[Token::Uint(U256::from(i))])))
            .collect();

        self.client
            .batch_call(calls)
            .await
            .into_iter()
            .filter_map(|result| result.ok())
            .filter_map(|data| decode_address(&data).ok())
            .collect()
    }

    /// Release `payee`'s pending payment; `token = None` releases ETH
    pub async fn claim(&self, splitter: Address, payee: Address, token: Option<Address>) -> Result<H256, DeployError> {
        let call = match token {
            Some(token) => ContractCall::new(splitter, RELEASE_TOKEN, &[Token::Address(token), Token::Address(payee)]),
            None => ContractCall::new(splitter, RELEASE, &[Token::Address(payee)]),
        };

        let submission = TransactionSubmitter::new(self.client).submit(call).await.map_err(|e| {
            warn!("Claim from {:?} failed: {}", splitter, e);
            e
        })?;
        info!("Released payment for {:?} in {:?}", payee, submission.tx_hash);
        Ok(submission.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainClient;
    use ethers::abi;

    fn uint(value: u64) -> Vec<u8> {
        abi::encode(&[Token::Uint(U256::from(value))])
    }

    #[tokio::test]
    async fn test_eth_summary() {
        let splitter = Address::from_low_u64_be(0x5);
        let payee = Address::from_low_u64_be(0x6);
        let client = MockChainClient::new(payee);
        client.on_call(splitter, TOTAL_SHARES, uint(3));
        client.on_call(splitter, SHARES, uint(1));
        client.on_call(splitter, RELEASABLE, uint(7));
        client.on_call(splitter, RELEASED, uint(2));
        client.on_call(splitter, TOTAL_RELEASED, uint(9));

        let summary = SplitterReader::new(&client).summary(splitter, payee, None).await.unwrap();
        assert_eq!(summary.releasable, U256::from(7));
        assert_eq!(summary.share_basis_points(), 3333);
        assert_eq!(summary.share_percentage(), 33.33);
        assert!(summary.has_claimable());
    }

    #[tokio::test]
    async fn test_token_summary_uses_token_overloads() {
        let splitter = Address::from_low_u64_be(0x5);
        let client = MockChainClient::new(Address::zero());
        client.on_call(splitter, TOTAL_SHARES, uint(100));
        client.on_call(splitter, SHARES, uint(100));
        client.on_call(splitter, RELEASABLE_TOKEN, uint(0));
        client.on_call(splitter, RELEASED_TOKEN, uint(4));
        client.on_call(splitter, TOTAL_RELEASED, uint(4));

        let summary = SplitterReader::new(&client)
            .summary(splitter, Address::zero(), Some(Address::from_low_u64_be(0x7)))
            .await
            .unwrap();
        assert_eq!(summary.share_basis_points(), 10_000);
        assert!(!summary.has_claimable());
    }

    #[tokio::test]
    async fn test_payees_keeps_answering_indices() {
        let splitter = Address::from_low_u64_be(0x5);
        let client = MockChainClient::new(Address::zero());
        client.on_call(splitter, PAYEE, abi::encode(&[Token::Address(Address::from_low_u64_be(0x9))]));

        let payees = SplitterReader::new(&client).payees(splitter).await;
        // the mock answers every index the same way
        assert_eq!(payees.len(), MAX_PAYEES as usize);

        let empty = MockChainClient::new(Address::zero());
        assert!(SplitterReader::new(&empty).payees(splitter).await.is_empty());
    }

    #[tokio::test]
    async fn test_claim_token() {
        let splitter = Address::from_low_u64_be(0x5);
        let client = MockChainClient::new(Address::zero());
        SplitterReader::new(&client)
            .claim(splitter, Address::from_low_u64_be(0x6), Some(Address::from_low_u64_be(0x7)))
            .await
            .unwrap();

        let sent = client.sent();
        assert!(sent[0].is(RELEASE_TOKEN));
        assert_eq!(sent[0].to, splitter);
    }
}
