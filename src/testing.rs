// In-memory test doubles
//
// `MockChainClient` scripts the wallet/RPC boundary: read responses are keyed
// by target and function selector, and each write can be made to fail, revert,
// get dropped or emit logs by its position in the send sequence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U64};
use ethers::utils::id;

use crate::error::ClientError;
use crate::ethereum::ChainClient;

/// A write call the mock accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub to: Address,
    pub data: Bytes,
    pub hash: H256,
}

impl SentTransaction {
    pub fn selector(&self) -> [u8; 4] {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&self.data[..4]);
        selector
    }

    /// True when this call targets `signature`
    pub fn is(&self, signature: &str) -> bool {
        self.data.len() >= 4 && self.selector() == id(signature)
    }
}

#[derive(Debug, Clone)]
enum ReceiptPlan {
    Confirm,
    Revert,
    Drop,
    Stall,
}

#[derive(Default)]
struct MockState {
    attempts: usize,
    sent: Vec<SentTransaction>,
    send_failures: HashMap<usize, String>,
    receipt_plans: HashMap<usize, ReceiptPlan>,
    receipt_logs: HashMap<usize, Vec<Log>>,
    receipts: HashMap<H256, Option<TransactionReceipt>>,
    stalled: HashSet<H256>,
    responses: HashMap<(Address, [u8; 4]), Result<Bytes, String>>,
    reads: Vec<(Address, Bytes)>,
}

pub struct MockChainClient {
    sender: Address,
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            state: Mutex::new(MockState::default()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Answer reads of `signature` on `to` with `response`
    pub fn on_call(&self, to: Address, signature: &str, response: impl Into<Bytes>) {
        let response = response.into();
        self.with_state(|s| s.responses.insert((to, id(signature)), Ok(response)));
    }

    /// Make reads of `signature` on `to` fail with `message`
    pub fn fail_call(&self, to: Address, signature: &str, message: &str) {
        self.with_state(|s| s.responses.insert((to, id(signature)), Err(message.to_string())));
    }

    /// Fail the `index`-th send attempt (0-based) with `message`
    pub fn fail_send_at(&self, index: usize, message: &str) {
        self.with_state(|s| s.send_failures.insert(index, message.to_string()));
    }

    pub fn fail_next_send(&self, message: &str) {
        let index = self.with_state(|s| s.attempts);
        self.fail_send_at(index, message);
    }

    /// The `index`-th send is mined but never produces a receipt
    pub fn drop_receipt_at(&self, index: usize) {
        self.with_state(|s| s.receipt_plans.insert(index, ReceiptPlan::Drop));
    }

    pub fn drop_next_receipt(&self) {
        let index = self.with_state(|s| s.attempts);
        self.drop_receipt_at(index);
    }

    /// Waiting on the `index`-th send never completes
    pub fn stall_receipt_at(&self, index: usize) {
        self.with_state(|s| s.receipt_plans.insert(index, ReceiptPlan::Stall));
    }

    /// The `index`-th send is mined with status 0
    pub fn revert_receipt_at(&self, index: usize) {
        self.with_state(|s| s.receipt_plans.insert(index, ReceiptPlan::Revert));
    }

    pub fn revert_next_receipt(&self) {
        let index = self.with_state(|s| s.attempts);
        self.revert_receipt_at(index);
    }

    /// Logs attached to the receipt of the `index`-th send
    pub fn receipt_logs_at(&self, index: usize, logs: Vec<Log>) {
        self.with_state(|s| s.receipt_logs.insert(index, logs));
    }

    /// Writes accepted so far, in order
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.with_state(|s| s.sent.clone())
    }

    /// Reads issued so far, in order
    pub fn reads(&self) -> Vec<(Address, Bytes)> {
        self.with_state(|s| s.reads.clone())
    }

    /// Total network traffic (writes + reads)
    pub fn request_count(&self) -> usize {
        self.with_state(|s| s.attempts + s.reads.len())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn send_transaction(&self, to: Address, data: Bytes) -> Result<H256, ClientError> {
        self.with_state(|s| {
            let index = s.attempts;
            s.attempts += 1;

            if let Some(message) = s.send_failures.remove(&index) {
                return Err(ClientError::new(message));
            }

            let hash = H256::from_low_u64_be(0x1000 + index as u64);
            let receipt = match s.receipt_plans.remove(&index).unwrap_or(ReceiptPlan::Confirm) {
                ReceiptPlan::Drop => None,
                ReceiptPlan::Stall => {
                    s.stalled.insert(hash);
                    None
                }
                plan => Some(TransactionReceipt {
                    transaction_hash: hash,
                    status: Some(if matches!(plan, ReceiptPlan::Revert) { U64::zero() } else { U64::one() }),
                    logs: s.receipt_logs.remove(&index).unwrap_or_default(),
                    ..Default::default()
                }),
            };

            s.receipts.insert(hash, receipt);
            s.sent.push(SentTransaction { to, data, hash });
            Ok(hash)
        })
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ClientError> {
        if self.with_state(|s| s.stalled.contains(&tx_hash)) {
            futures::future::pending::<()>().await;
        }
        self.with_state(|s| {
            s.receipts
                .get(&tx_hash)
                .cloned()
                .ok_or_else(|| ClientError::new(format!("unknown transaction {:?}", tx_hash)))
        })
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ClientError> {
        self.with_state(|s| {
            s.reads.push((to, data.clone()));
            if data.len() < 4 {
                return Err(ClientError::new("execution reverted"));
            }
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&data[..4]);
            match s.responses.get(&(to, selector)) {
                Some(Ok(bytes)) => Ok(bytes.clone()),
                Some(Err(message)) => Err(ClientError::new(message.clone())),
                None => Err(ClientError::new("execution reverted")),
            }
        })
    }
}

/// Receipt log emitted by `emitter` with the given topics
pub fn log(emitter: Address, topics: Vec<H256>) -> Log {
    Log {
        address: emitter,
        topics,
        ..Default::default()
    }
}

/// Left-pad an address into a 32-byte topic
pub fn address_topic(address: Address) -> H256 {
    H256::from(address)
}
