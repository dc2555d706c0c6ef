// Error taxonomy for deployments
//
// Lower layers return these classified errors; only the orchestrator and the
// CLI turn them into notifications.

use ethers::types::H256;
use thiserror::Error;

use crate::allocation::ValidationError;
use crate::store::StoreError;

/// Error raised by a wallet/RPC transport, carrying the provider's message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Classified deployment failure
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Invalid recipients: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transaction was rejected by the user")]
    UserRejected,

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Submitted but never confirmed; the hash is kept so the record can be recovered
    #[error("Transaction {tx_hash:?} was not confirmed: {reason}")]
    Unconfirmed { tx_hash: H256, reason: String },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Failed to decode contract response: {0}")]
    Decode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Classify a raw wallet or provider error message
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("user rejected") || lower.contains("user denied") || lower.contains("rejected the request") {
            Self::UserRejected
        } else if lower.contains("insufficient funds") {
            Self::InsufficientFunds(message.to_string())
        } else if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("error sending request")
        {
            Self::Network(message.to_string())
        } else {
            Self::Reverted(message.to_string())
        }
    }

    /// Short message suitable for a notification
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::UserRejected => "Transaction was rejected".to_string(),
            Self::InsufficientFunds(_) => "Insufficient funds for transaction".to_string(),
            Self::Network(_) => "Network error. Please check your connection".to_string(),
            Self::Reverted(reason) => reason.clone(),
            Self::Unconfirmed { tx_hash, .. } => {
                format!("Transaction {:?} was submitted but not confirmed", tx_hash)
            }
            other => other.to_string(),
        }
    }

    /// Hash of a transaction that reached the network, if any
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            Self::Unconfirmed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

impl From<ClientError> for DeployError {
    fn from(error: ClientError) -> Self {
        Self::classify(&error.0)
    }
}

impl From<ethers::abi::Error> for DeployError {
    fn from(error: ethers::abi::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_user_rejection() {
        let err = DeployError::classify("MetaMask Tx Signature: User rejected the request.");
        assert!(matches!(err, DeployError::UserRejected));
        assert_eq!(err.user_message(), "Transaction was rejected");
    }

    #[test]
    fn test_classify_insufficient_funds() {
        let err = DeployError::classify("insufficient funds for gas * price + value");
        assert!(matches!(err, DeployError::InsufficientFunds(_)));
        assert_eq!(err.user_message(), "Insufficient funds for transaction");
    }

    #[test]
    fn test_classify_network() {
        let err = DeployError::classify("(code: -32603) network error: connection refused");
        assert!(matches!(err, DeployError::Network(_)));
        assert_eq!(err.user_message(), "Network error. Please check your connection");
    }

    #[test]
    fn test_classify_revert_keeps_reason() {
        let err = DeployError::classify("execution reverted: ERC20: insufficient allowance");
        assert!(matches!(err, DeployError::Reverted(_)));
        assert_eq!(err.user_message(), "execution reverted: ERC20: insufficient allowance");
    }

    #[test]
    fn test_unconfirmed_carries_hash() {
        let hash = H256::from_low_u64_be(9);
        let err = DeployError::Unconfirmed { tx_hash: hash, reason: "dropped".into() };
        assert_eq!(err.tx_hash(), Some(hash));
        assert_eq!(DeployError::UserRejected.tx_hash(), None);
    }
}
