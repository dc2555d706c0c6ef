// ERC-20 allowance checks for the Aave flow
//
// An unreadable allowance counts as zero so the caller asks for approval.

use ethers::abi::Token;
use ethers::types::{Address, U256};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::AssetConfig;
use crate::ethereum::contracts::{decode_uint, encode_call, ALLOWANCE};
use crate::ethereum::ChainClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub symbol: String,
    pub token: Address,
    #[serde(with = "kinetic_common::decimal_u256")]
    pub amount: U256,
}

impl Allowance {
    pub fn needs_approval(&self, amount: U256) -> bool {
        self.amount < amount
    }
}

pub struct AllowanceChecker<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> AllowanceChecker<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// `allowance(owner, spender)` for every asset, read concurrently
    pub async fn check(&self, assets: &[AssetConfig], owner: Address, spender: Address) -> Vec<Allowance> {
        let calls = assets
            .iter()
            .map(|asset| {
                (
                    asset.address,
                    encode_call(ALLOWANCE, &[Token::Address(owner), Token::Address(spender)]),
                )
            })
            .collect();
        let results = self.client.batch_call(calls).await;

        assets
            .iter()
            .zip(results)
            .map(|(asset, result)| {
                let amount = match result.map_err(|e| e.to_string()).and_then(|d| decode_uint(&d).map_err(|e| e.to_string())) {
                    Ok(amount) => amount,
                    Err(e) => {
                        warn!("Could not read {} allowance: {}", asset.symbol, e);
                        U256::zero()
                    }
                };
                Allowance {
                    symbol: asset.symbol.clone(),
                    token: asset.address,
                    amount,
                }
            })
            .collect()
    }
}
