//! Deploy and monitor DeFi yield strategies whose yield is routed to a set of
//! recipients through an on-chain payment splitter.
//!
//! The deployment flow is `allocation` → `orchestrator` → `steps` (splitter,
//! approval, strategy) → `store`; `aggregate` reads the cached strategies
//! back from chain; `vault` reads and moves an account's position in one
//! strategy.

pub mod aggregate;
pub mod allocation;
pub mod allowance;
pub mod api;
pub mod error;
pub mod ethereum;
pub mod index;
pub mod orchestrator;
pub mod resolver;
pub mod splitter;
pub mod steps;
pub mod store;
pub mod submitter;
pub mod testing;
pub mod vault;

pub use aggregate::{AggregatedData, AggregationReader};
pub use allocation::{validate_recipients, RecipientSet, ValidationError};
pub use api::{ConfigManager, DeployConfig, Kinetic};
pub use error::{ClientError, DeployError};
pub use ethereum::{ChainClient, EthereumConnector};
pub use kinetic_common::{Protocol, Recipient, Strategy, StrategyAddress};
pub use orchestrator::{DeployRequest, DeployStep, DeploymentOutcome, DistributionMode, Orchestrator};
pub use store::{JsonFileBackend, MemoryBackend, StorageBackend, StrategyStore};
pub use vault::{VaultPosition, VaultReader};
