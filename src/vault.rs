// Strategy positions, deposits and withdrawals
//
// Every strategy and Aave vault is an ERC-4626 vault over one asset. Reads
// give an account's shares and what they are worth; writes approve the
// asset and call `deposit`/`withdraw` on the vault.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::ethereum::contracts::{
    decode_address, decode_uint, encode_call, ContractCall, ASSET, BALANCE_OF, CONVERT_TO_ASSETS, DECIMALS, DEPOSIT,
    MAX_DEPOSIT, MAX_WITHDRAW, TOTAL_ASSETS, WITHDRAW,
};
use crate::ethereum::ChainClient;
use crate::steps::ApprovalStep;
use crate::submitter::TransactionSubmitter;

/// An account's holding in one vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultPosition {
    pub vault: Address,
    pub account: Address,
    /// Underlying ERC-20
    pub asset: Address,
    /// Decimals of the asset, when the token reports them
    pub asset_decimals: Option<u32>,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub shares: U256,
    /// Current value of `shares` in asset base units
    #[serde(with = "kinetic_common::decimal_u256")]
    pub assets: U256,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub total_assets: U256,
    /// `None` when the vault does not expose the limit
    pub max_deposit: Option<U256>,
    pub max_withdraw: Option<U256>,
}

pub struct VaultReader<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> VaultReader<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    async fn read_uint(&self, vault: Address, signature: &str, args: &[Token]) -> Result<U256, DeployError> {
        let data = self.client.call(vault, encode_call(signature, args)).await?;
        decode_uint(&data)
    }

    async fn optional_uint(&self, vault: Address, signature: &str, args: &[Token]) -> Option<U256> {
        match self.read_uint(vault, signature, args).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("{} on {:?} unavailable: {}", signature, vault, e);
                None
            }
        }
    }

    /// Underlying asset of `vault`
    pub async fn asset(&self, vault: Address) -> Result<Address, DeployError> {
        let data = self.client.call(vault, encode_call(ASSET, &[])).await?;
        decode_address(&data)
    }

    /// Read `account`'s shares in `vault` and what they are worth
    pub async fn position(&self, vault: Address, account: Address) -> Result<VaultPosition, DeployError> {
        let owner = [Token::Address(account)];
        let asset = self.asset(vault).await?;
        let shares = self.read_uint(vault, BALANCE_OF, &owner).await?;
        let assets = if shares.is_zero() {
            U256::zero()
        } else {
            self.read_uint(vault, CONVERT_TO_ASSETS, &[Token::Uint(shares)]).await?
        };

        let position = VaultPosition {
            vault,
            account,
            asset,
            asset_decimals: self.optional_uint(asset, DECIMALS, &[]).await.map(|d| d.low_u32()),
            shares,
            assets,
            total_assets: self.read_uint(vault, TOTAL_ASSETS, &[]).await?,
            max_deposit: self.optional_uint(vault, MAX_DEPOSIT, &owner).await,
            max_withdraw: self.optional_uint(vault, MAX_WITHDRAW, &owner).await,
        };
        debug!("Vault {:?} account {:?}: {:?}", vault, account, position);
        Ok(position)
    }

    /// Approve `amount` of the vault's asset and deposit it for `receiver`.
    /// Returns the deposit transaction hash.
    pub async fn deposit(&self, vault: Address, amount: U256, receiver: Address) -> Result<H256, DeployError> {
        if amount.is_zero() {
            return Err(DeployError::InvalidAmount("deposit amount must be greater than zero".to_string()));
        }
        let asset = self.asset(vault).await?;
        if let Some(limit) = self.optional_uint(vault, MAX_DEPOSIT, &[Token::Address(receiver)]).await {
            if amount > limit {
                return Err(DeployError::InvalidAmount(format!(
                    "deposit of {} exceeds the vault limit of {}",
                    amount, limit
                )));
            }
        }

        ApprovalStep::new(self.client).approve(asset, vault, amount).await?;

        let call = ContractCall::new(vault, DEPOSIT, &[Token::Uint(amount), Token::Address(receiver)]);
        let submission = TransactionSubmitter::new(self.client).submit(call).await.map_err(|e| {
            warn!("Deposit into {:?} failed: {}", vault, e);
            e
        })?;
        info!("Deposited {} into {:?} in {:?}", amount, vault, submission.tx_hash);
        Ok(submission.tx_hash)
    }

    /// Withdraw `amount` of the asset from `owner`'s shares to `receiver`
    pub async fn withdraw(
        &self,
        vault: Address,
        amount: U256,
        receiver: Address,
        owner: Address,
    ) -> Result<H256, DeployError> {
        if amount.is_zero() {
            return Err(DeployError::InvalidAmount("withdrawal amount must be greater than zero".to_string()));
        }
        if let Some(limit) = self.optional_uint(vault, MAX_WITHDRAW, &[Token::Address(owner)]).await {
            if amount > limit {
                return Err(DeployError::InvalidAmount(format!(
                    "withdrawal of {} exceeds the available {}",
                    amount, limit
                )));
            }
        }

        let call = ContractCall::new(
            vault,
            WITHDRAW,
            &[Token::Uint(amount), Token::Address(receiver), Token::Address(owner)],
        );
        let submission = TransactionSubmitter::new(self.client).submit(call).await.map_err(|e| {
            warn!("Withdrawal from {:?} failed: {}", vault, e);
            e
        })?;
        info!("Withdrew {} from {:?} in {:?}", amount, vault, submission.tx_hash);
        Ok(submission.tx_hash)
    }
}
