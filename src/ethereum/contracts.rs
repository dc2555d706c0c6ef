// Collaborator contract interfaces
//
// The contracts are fixed and external; only their call signatures live here.
// Calls are encoded from the canonical signature so overloaded functions
// (e.g. `releasable(address)` vs `releasable(address,address)`) stay distinct.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{id, keccak256};

use crate::error::DeployError;

// PaymentSplitter factory
pub const CREATE_SPLITTER: &str = "createSplitter(address[],uint256[])";
pub const GET_USER_SPLITTERS: &str = "getUserSplitters(address)";

// Morpho / Sky compounder strategy factories
pub const CREATE_MORPHO_STRATEGY: &str =
    "createStrategy(address,string,address,address,address,address,bool,address)";
pub const CREATE_SKY_STRATEGY: &str = "createStrategy(string,address,address,address,address,bool,address)";
pub const GET_USER_STRATEGIES: &str = "getUserStrategies(address)";
pub const STRATEGY_DEPLOY_EVENT: &str = "StrategyDeploy(address,address,address,string)";

// Aave vault proxy deployer
pub const DEPLOY_VAULT: &str = "deployVault(address,address,uint256)";
pub const GET_USER_VAULTS: &str = "getUserVaults(address)";
pub const VAULT_DEPLOYED_EVENT: &str = "VaultDeployed(address,address,address)";

// ERC-20
pub const APPROVE: &str = "approve(address,uint256)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const DECIMALS: &str = "decimals()";

// ERC-4626 strategy / vault
pub const TOTAL_ASSETS: &str = "totalAssets()";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const ASSET: &str = "asset()";
pub const CONVERT_TO_ASSETS: &str = "convertToAssets(uint256)";
pub const MAX_DEPOSIT: &str = "maxDeposit(address)";
pub const MAX_WITHDRAW: &str = "maxWithdraw(address)";
pub const DEPOSIT: &str = "deposit(uint256,address)";
pub const WITHDRAW: &str = "withdraw(uint256,address,address)";

// PaymentSplitter instance
pub const TOTAL_SHARES: &str = "totalShares()";
pub const SHARES: &str = "shares(address)";
pub const PAYEE: &str = "payee(uint256)";
pub const RELEASABLE: &str = "releasable(address)";
pub const RELEASABLE_TOKEN: &str = "releasable(address,address)";
pub const RELEASED: &str = "released(address)";
pub const RELEASED_TOKEN: &str = "released(address,address)";
pub const TOTAL_RELEASED: &str = "totalReleased()";
pub const RELEASE: &str = "release(address)";
pub const RELEASE_TOKEN: &str = "release(address,address)";

/// A write call ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    /// Canonical signature, kept for logging
    pub function: &'static str,
    pub data: Bytes,
}

impl ContractCall {
    pub fn new(to: Address, function: &'static str, args: &[Token]) -> Self {
        Self {
            to,
            function,
            data: encode_call(function, args),
        }
    }
}

/// 4-byte selector followed by the ABI-encoded arguments
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    data.into()
}

/// Topic hash of an event signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, DeployError> {
    abi::decode(&[ParamType::Uint(256)], data)?
        .pop()
        .and_then(Token::into_uint)
        .ok_or_else(|| DeployError::Decode("expected uint256".to_string()))
}

pub fn decode_address(data: &[u8]) -> Result<Address, DeployError> {
    abi::decode(&[ParamType::Address], data)?
        .pop()
        .and_then(Token::into_address)
        .ok_or_else(|| DeployError::Decode("expected address".to_string()))
}

pub fn decode_address_list(data: &[u8]) -> Result<Vec<Address>, DeployError> {
    let tokens = abi::decode(&[ParamType::Array(Box::new(ParamType::Address))], data)?
        .pop()
        .and_then(Token::into_array)
        .ok_or_else(|| DeployError::Decode("expected address[]".to_string()))?;

    tokens
        .into_iter()
        .map(|t| t.into_address().ok_or_else(|| DeployError::Decode("expected address".to_string())))
        .collect()
}

/// Entry of the Octant V2 deployer registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub strategy_address: Address,
    pub protocol: u8,
    pub name: String,
    pub donation_recipient: Address,
}

/// Tuple layout returned by `getUserStrategies` on the deployer registry
fn registry_entry_type() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::Address,
        ParamType::Uint(8),
        ParamType::String,
        ParamType::Address,
    ])
}

pub fn decode_registry_entries(data: &[u8]) -> Result<Vec<RegistryEntry>, DeployError> {
    let malformed = || DeployError::Decode("malformed registry entry".to_string());

    let entries = abi::decode(&[ParamType::Array(Box::new(registry_entry_type()))], data)?
        .pop()
        .and_then(Token::into_array)
        .ok_or_else(malformed)?;

    entries
        .into_iter()
        .map(|entry| {
            let mut fields = entry.into_tuple().ok_or_else(malformed)?.into_iter();
            let mut next = || fields.next().ok_or_else(malformed);
            let strategy_address = next()?.into_address().ok_or_else(malformed)?;
            let protocol = next()?.into_uint().ok_or_else(malformed)?;
            if protocol > U256::from(u8::MAX) {
                return Err(DeployError::Decode(format!("protocol id {} does not fit uint8", protocol)));
            }
            Ok(RegistryEntry {
                strategy_address,
                protocol: protocol.low_u32() as u8,
                name: next()?.into_string().ok_or_else(malformed)?,
                donation_recipient: next()?.into_address().ok_or_else(malformed)?,
            })
        })
        .collect()
}

/// Encode registry entries the way the deployer registry returns them
pub fn encode_registry_entries(entries: &[RegistryEntry]) -> Bytes {
    let tokens = entries
        .iter()
        .map(|e| {
            Token::Tuple(vec![
                Token::Address(e.strategy_address),
                Token::Uint(U256::from(e.protocol)),
                Token::String(e.name.clone()),
                Token::Address(e.donation_recipient),
            ])
        })
        .collect();
    abi::encode(&[Token::Array(tokens)]).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_selectors() {
        // well-known ERC-20 / ERC-4626 selectors
        assert_eq!(&encode_call(APPROVE, &[Token::Address(Address::zero()), Token::Uint(U256::zero())])[..4], &hex!("095ea7b3"));
        assert_eq!(&encode_call(TOTAL_ASSETS, &[])[..], &hex!("01e1d114"));
        assert_eq!(&encode_call(ALLOWANCE, &[Token::Address(Address::zero()), Token::Address(Address::zero())])[..4], &hex!("dd62ed3e"));
    }

    #[test]
    fn test_overloads_have_distinct_selectors() {
        assert_ne!(id(RELEASABLE), id(RELEASABLE_TOKEN));
        assert_ne!(id(RELEASE), id(RELEASE_TOKEN));
    }

    #[test]
    fn test_decode_address_list() {
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        let data = abi::encode(&[Token::Array(vec![Token::Address(a), Token::Address(b)])]);
        assert_eq!(decode_address_list(&data).unwrap(), vec![a, b]);

        let empty = abi::encode(&[Token::Array(vec![])]);
        assert!(decode_address_list(&empty).unwrap().is_empty());

        assert!(decode_address_list(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_registry_entries_decode() {
        let entries = vec![RegistryEntry {
            strategy_address: Address::from_low_u64_be(10),
            protocol: 1,
            name: "ImpactVault-Sky-1".to_string(),
            donation_recipient: Address::from_low_u64_be(11),
        }];
        let data = encode_registry_entries(&entries);
        assert_eq!(decode_registry_entries(&data).unwrap(), entries);
    }

    #[test]
    fn test_registry_protocol_id_must_fit_uint8() {
        let entry = |protocol: u64| {
            abi::encode(&[Token::Array(vec![Token::Tuple(vec![
                Token::Address(Address::from_low_u64_be(10)),
                Token::Uint(U256::from(protocol)),
                Token::String("s".to_string()),
                Token::Address(Address::zero()),
            ])])])
        };

        assert_eq!(decode_registry_entries(&entry(255)).unwrap()[0].protocol, 255);
        assert!(matches!(decode_registry_entries(&entry(256)), Err(DeployError::Decode(_))));
    }

    #[test]
    fn test_decode_uint() {
        let data = abi::encode(&[Token::Uint(U256::from(42u64))]);
        assert_eq!(decode_uint(&data).unwrap(), U256::from(42u64));
        assert!(matches!(decode_uint(&[]), Err(DeployError::Decode(_))));
    }
}
