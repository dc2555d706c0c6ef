use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::utils::{parse_address, parse_transaction_hash};

/// Errors raised while parsing shared domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unsupported protocol: {0}")]
    UnknownProtocol(String),
}

/// Errors raised while converting user-entered token amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Malformed amount: {0:?}")]
    Malformed(String),
    #[error("Amount does not fit in 256 bits: {0}")]
    Overflow(String),
}

/// Yield protocols a strategy can be deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Morpho compounder (lending-market compounder with a vault reference)
    Morpho,
    /// Sky compounder
    Sky,
    /// Aave ERC-4626 vault deployed behind a proxy
    Aave,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Protocol::Morpho, Protocol::Sky, Protocol::Aave];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Morpho => "Morpho",
            Protocol::Sky => "Sky",
            Protocol::Aave => "Aave",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownProtocol(s.to_string()))
    }
}

/// A yield recipient as entered by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// `0x`-prefixed account address
    pub address: String,
    /// Display label
    pub name: String,
    /// Share of the yield, 0..=100
    pub percentage: u32,
}

impl Recipient {
    pub fn new(address: impl Into<String>, name: impl Into<String>, percentage: u32) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            percentage,
        }
    }

    /// The synthetic recipient recorded for strategies that pay a splitter
    pub fn splitter(address: Address) -> Self {
        Self::new(to_checksum(&address, None), "Payment Splitter", 100)
    }

    pub fn parsed_address(&self) -> Option<Address> {
        parse_address(&self.address)
    }
}

/// On-chain identity of a strategy record.
///
/// A record starts out `Pending` with the deployment transaction hash standing
/// in for the address and becomes `Confirmed` once the contract address is
/// resolved. Anything else read back from storage is kept as `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StrategyAddress {
    Confirmed(Address),
    Pending(H256),
    Invalid(String),
}

impl StrategyAddress {
    pub fn parse(value: &str) -> Self {
        if let Some(address) = parse_address(value) {
            StrategyAddress::Confirmed(address)
        } else if let Some(hash) = parse_transaction_hash(value) {
            StrategyAddress::Pending(hash)
        } else {
            StrategyAddress::Invalid(value.to_string())
        }
    }

    /// Only a resolved 42-character contract address is valid
    pub fn is_valid(&self) -> bool {
        matches!(self, StrategyAddress::Confirmed(_))
    }

    pub fn address(&self) -> Option<Address> {
        match self {
            StrategyAddress::Confirmed(address) => Some(*address),
            _ => None,
        }
    }

    pub fn pending_hash(&self) -> Option<H256> {
        match self {
            StrategyAddress::Pending(hash) => Some(*hash),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyAddress::Confirmed(address) => f.write_str(&to_checksum(address, None)),
            StrategyAddress::Pending(hash) => write!(f, "{:?}", hash),
            StrategyAddress::Invalid(raw) => f.write_str(raw),
        }
    }
}

impl From<Address> for StrategyAddress {
    fn from(address: Address) -> Self {
        StrategyAddress::Confirmed(address)
    }
}

impl Serialize for StrategyAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StrategyAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StrategyAddress::parse(&raw))
    }
}

/// Durable record of a deployed strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub address: StrategyAddress,
    pub protocol: Protocol,
    pub name: String,
    /// Base units deposited at deployment, stored as a decimal string
    #[serde(with = "decimal_u256")]
    pub total_deposited: U256,
    /// Last known yield, stored as a decimal string
    #[serde(with = "decimal_u256")]
    pub yield_generated: U256,
    pub recipients: Vec<Recipient>,
}

/// Serde adapter writing `U256` as a base-10 string
pub mod decimal_u256 {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(U256::zero());
        }
        U256::from_dec_str(&raw).map_err(|e| D::Error::custom(format!("invalid amount {:?}: {:?}", raw, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("morpho".parse::<Protocol>().unwrap(), Protocol::Morpho);
        assert_eq!(" Sky ".parse::<Protocol>().unwrap(), Protocol::Sky);
        assert_eq!(
            "Compound".parse::<Protocol>(),
            Err(ParseError::UnknownProtocol("Compound".to_string()))
        );
    }

    #[test]
    fn test_strategy_address_phases() {
        let confirmed = StrategyAddress::parse("0x00000000000000000000000000000000000000aa");
        assert_eq!(confirmed, StrategyAddress::Confirmed(Address::from_low_u64_be(0xaa)));
        assert!(confirmed.is_valid());

        let pending = StrategyAddress::parse(&format!("{:?}", H256::from_low_u64_be(7)));
        assert_eq!(pending, StrategyAddress::Pending(H256::from_low_u64_be(7)));
        assert!(!pending.is_valid());

        let invalid = StrategyAddress::parse("");
        assert_eq!(invalid, StrategyAddress::Invalid(String::new()));
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_strategy_serializes_decimal_strings() {
        let strategy = Strategy {
            address: StrategyAddress::Confirmed(Address::from_low_u64_be(1)),
            protocol: Protocol::Sky,
            name: "ImpactVault-Sky-1".to_string(),
            total_deposited: U256::from(1_000_000u64),
            yield_generated: U256::zero(),
            recipients: vec![Recipient::splitter(Address::from_low_u64_be(2))],
        };

        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(json["totalDeposited"], "1000000");
        assert_eq!(json["yieldGenerated"], "0");
        assert_eq!(json["protocol"], "Sky");
        assert_eq!(json["address"], "0x0000000000000000000000000000000000000001");
        assert_eq!(json["recipients"][0]["percentage"], 100);

        let back: Strategy = serde_json::from_value(json).unwrap();
        assert_eq!(back, strategy);
    }
}
