// ERC-20 approval sequence for the Aave activation deposit
//
// The allowance is reset to zero before the new amount is approved; tokens
// such as USDT refuse to change a non-zero allowance directly.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use log::info;

use crate::error::DeployError;
use crate::ethereum::contracts::{ContractCall, APPROVE};
use crate::ethereum::ChainClient;
use crate::submitter::TransactionSubmitter;

pub struct ApprovalStep<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> ApprovalStep<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// `approve(spender, 0)` then `approve(spender, amount)` on `token`.
    /// Returns both transaction hashes in submission order.
    pub async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<[H256; 2], DeployError> {
        let submitter = TransactionSubmitter::new(self.client);

        info!("Resetting allowance of {:?} on {:?}", spender, token);
        let reset = submitter
            .submit(ContractCall::new(
                token,
                APPROVE,
                &[Token::Address(spender), Token::Uint(U256::zero())],
            ))
            .await?;

        info!("Approving {} base units for {:?}", amount, spender);
        let approval = submitter
            .submit(ContractCall::new(token, APPROVE, &[Token::Address(spender), Token::Uint(amount)]))
            .await?;

        Ok([reset.tx_hash, approval.tx_hash])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::contracts::encode_call;
    use crate::testing::MockChainClient;

    #[tokio::test]
    async fn test_reset_then_approve() {
        let client = MockChainClient::new(Address::from_low_u64_be(1));
        let token = Address::from_low_u64_be(0x20);
        let spender = Address::from_low_u64_be(0x30);

        ApprovalStep::new(&client)
            .approve(token, spender, U256::from(1_000_000u64))
            .await
            .unwrap();

        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|tx| tx.to == token));
        assert_eq!(sent[0].data, encode_call(APPROVE, &[Token::Address(spender), Token::Uint(U256::zero())]));
        assert_eq!(
            sent[1].data,
            encode_call(APPROVE, &[Token::Address(spender), Token::Uint(U256::from(1_000_000u64))])
        );
    }

    #[tokio::test]
    async fn test_failed_reset_stops_sequence() {
        let client = MockChainClient::new(Address::from_low_u64_be(1));
        client.revert_receipt_at(0);

        let err = ApprovalStep::new(&client)
            .approve(Address::from_low_u64_be(0x20), Address::from_low_u64_be(0x30), U256::one())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Reverted(_)));
        assert_eq!(client.sent().len(), 1);
    }
}
