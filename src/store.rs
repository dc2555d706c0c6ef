// Local strategy cache
//
// The cache is the client's view of what it has deployed. It is loaded when
// the store is opened and written back after every mutation. Records are only
// removed by explicit calls (clear / remove / recover) or replaced wholesale
// by `sync_strategies`.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ethers::types::{Address, H256, U256};
use kinetic_common::{Strategy, StrategyAddress};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespaced storage key; also the file stem of the JSON backend
pub const STORAGE_KEY: &str = "kinetic-storage";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Storage is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No strategy recorded for {0}")]
    NotFound(String),

    #[error("Not a contract address: {0}")]
    InvalidAddress(String),
}

/// Where the serialized cache lives
pub trait StorageBackend {
    /// Previously saved state, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<String>, StoreError>;

    fn save(&mut self, contents: &str) -> Result<(), StoreError>;
}

/// JSON file `<dir>/kinetic-storage.json`
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// In-process backend for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    contents: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
        }
    }

    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

impl StorageBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.clone())
    }

    fn save(&mut self, contents: &str) -> Result<(), StoreError> {
        self.contents = Some(contents.to_string());
        Ok(())
    }
}

/// On-disk shape of the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub deployed_strategies: Vec<Strategy>,
}

pub struct StrategyStore<B: StorageBackend> {
    backend: B,
    strategies: Vec<Strategy>,
    selected: Option<Address>,
}

impl<B: StorageBackend> StrategyStore<B> {
    /// Open the store, loading whatever the backend holds
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let strategies = match backend.load()? {
            Some(contents) if !contents.trim().is_empty() => {
                serde_json::from_str::<PersistedState>(&contents)?.deployed_strategies
            }
            _ => Vec::new(),
        };
        debug!("Loaded {} cached strategies", strategies.len());

        Ok(Self {
            backend,
            strategies,
            selected: None,
        })
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let state = PersistedState {
            deployed_strategies: self.strategies.clone(),
        };
        let contents = serde_json::to_string_pretty(&state)?;
        self.backend.save(&contents)
    }

    /// Append a record
    pub fn add_strategy(&mut self, strategy: Strategy) -> Result<(), StoreError> {
        info!("Caching strategy {} ({})", strategy.name, strategy.address);
        self.strategies.push(strategy);
        self.persist()
    }

    /// Replace the cache with an authoritative list.
    ///
    /// The list is de-duplicated by address; the first occurrence wins.
    pub fn sync_strategies(&mut self, strategies: Vec<Strategy>) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let deduped: Vec<Strategy> = strategies
            .into_iter()
            .filter(|s| seen.insert(s.address.clone()))
            .collect();

        info!("Synced {} strategies", deduped.len());
        self.strategies = deduped;
        if let Some(selected) = self.selected {
            if !self.strategies.iter().any(|s| s.address.address() == Some(selected)) {
                self.selected = None;
            }
        }
        self.persist()
    }

    /// Drop every record whose address is not a resolved contract address.
    /// Returns how many were removed.
    pub fn clear_invalid_strategies(&mut self) -> Result<usize, StoreError> {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.address.is_valid());
        let removed = before - self.strategies.len();

        if removed > 0 {
            info!("Cleared {} invalid strategies", removed);
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn remove_strategy(&mut self, address: &StrategyAddress) -> Result<Strategy, StoreError> {
        let index = self
            .strategies
            .iter()
            .position(|s| &s.address == address)
            .ok_or_else(|| StoreError::NotFound(address.to_string()))?;

        let removed = self.strategies.remove(index);
        if removed.address.address().is_some() && removed.address.address() == self.selected {
            self.selected = None;
        }
        self.persist()?;
        Ok(removed)
    }

    /// Promote the pending record placed under `tx_hash` to `address`
    pub fn recover_strategy(&mut self, tx_hash: H256, address: &str) -> Result<&Strategy, StoreError> {
        let resolved = match StrategyAddress::parse(address) {
            StrategyAddress::Confirmed(a) => a,
            _ => return Err(StoreError::InvalidAddress(address.to_string())),
        };
        self.resolve_pending(tx_hash, resolved)
    }

    /// Update the record placed under `tx_hash` in place once its address is known
    pub fn resolve_pending(&mut self, tx_hash: H256, resolved: Address) -> Result<&Strategy, StoreError> {
        let index = self
            .strategies
            .iter()
            .position(|s| s.address.pending_hash() == Some(tx_hash))
            .ok_or_else(|| StoreError::NotFound(format!("{:?}", tx_hash)))?;

        if self.strategies.iter().any(|s| s.address.address() == Some(resolved)) {
            warn!("{:?} is already cached; keeping both records", resolved);
        }

        self.strategies[index].address = StrategyAddress::Confirmed(resolved);
        info!("Resolved {:?} from transaction {:?}", resolved, tx_hash);
        self.persist()?;
        Ok(&self.strategies[index])
    }

    fn position_of(&self, address: Address) -> Result<usize, StoreError> {
        self.strategies
            .iter()
            .position(|s| s.address.address() == Some(address))
            .ok_or_else(|| StoreError::NotFound(format!("{:?}", address)))
    }

    /// Add `amount` to the principal tracked for `address`
    pub fn record_deposit(&mut self, address: Address, amount: U256) -> Result<&Strategy, StoreError> {
        let index = self.position_of(address)?;
        let strategy = &mut self.strategies[index];
        strategy.total_deposited = strategy.total_deposited.saturating_add(amount);
        self.persist()?;
        Ok(&self.strategies[index])
    }

    /// Take `amount` off the principal tracked for `address`, stopping at zero
    pub fn record_withdrawal(&mut self, address: Address, amount: U256) -> Result<&Strategy, StoreError> {
        let index = self.position_of(address)?;
        let strategy = &mut self.strategies[index];
        strategy.total_deposited = strategy.total_deposited.saturating_sub(amount);
        self.persist()?;
        Ok(&self.strategies[index])
    }

    /// Select a cached strategy for display
    pub fn select(&mut self, address: Address) -> Result<&Strategy, StoreError> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.address.address() == Some(address))
            .ok_or_else(|| StoreError::NotFound(format!("{:?}", address)))?;
        self.selected = Some(address);
        Ok(strategy)
    }

    pub fn selected(&self) -> Option<&Strategy> {
        let selected = self.selected?;
        self.strategies.iter().find(|s| s.address.address() == Some(selected))
    }

    pub fn invalid_strategies(&self) -> Vec<&Strategy> {
        self.strategies.iter().filter(|s| !s.address.is_valid()).collect()
    }

    /// Contract addresses of every resolved record, in cache order
    pub fn valid_addresses(&self) -> Vec<Address> {
        self.strategies.iter().filter_map(|s| s.address.address()).collect()
    }
}
