// Transaction submission
//
// Sends one contract call through the connected wallet, waits for it to be
// mined and classifies any failure. There is no retry; the caller decides
// whether to offer the action again.

use ethers::types::{TransactionReceipt, H256, U64};
use log::{debug, info, warn};

use crate::error::DeployError;
use crate::ethereum::contracts::ContractCall;
use crate::ethereum::ChainClient;

/// A confirmed transaction
#[derive(Debug, Clone)]
pub struct Submission {
    pub tx_hash: H256,
    pub receipt: TransactionReceipt,
}

pub struct TransactionSubmitter<'a, C: ChainClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ChainClient + ?Sized> TransactionSubmitter<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Broadcast `call` without waiting for it to be mined
    pub async fn send(&self, call: &ContractCall) -> Result<H256, DeployError> {
        info!("Submitting {} to {:?}", call.function, call.to);

        let tx_hash = self
            .client
            .send_transaction(call.to, call.data.clone())
            .await
            .map_err(DeployError::from)?;
        info!("{} broadcast as {:?}", call.function, tx_hash);
        Ok(tx_hash)
    }

    /// Wait for `tx_hash` to be mined and check its status.
    ///
    /// A transaction that was broadcast but never confirmed comes back as
    /// `DeployError::Unconfirmed` with its hash so the caller can keep a
    /// pending record.
    pub async fn confirm(&self, function: &str, tx_hash: H256) -> Result<Submission, DeployError> {
        let receipt = match self.client.wait_for_receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                warn!("Transaction {:?} was dropped", tx_hash);
                return Err(DeployError::Unconfirmed {
                    tx_hash,
                    reason: "dropped before confirmation".to_string(),
                });
            }
            Err(e) => {
                warn!("Lost track of {:?}: {}", tx_hash, e);
                return Err(DeployError::Unconfirmed { tx_hash, reason: e.to_string() });
            }
        };

        if receipt.status == Some(U64::zero()) {
            return Err(DeployError::Reverted(format!(
                "{} reverted in transaction {:?}",
                function, tx_hash
            )));
        }

        debug!("{} confirmed in {:?}", function, tx_hash);
        Ok(Submission { tx_hash, receipt })
    }

    /// Submit `call` and wait for its receipt
    pub async fn submit(&self, call: ContractCall) -> Result<Submission, DeployError> {
        let tx_hash = self.send(&call).await?;
        let submission = self.confirm(call.function, tx_hash).await?;
        info!("{} confirmed in {:?}", call.function, tx_hash);
        Ok(submission)
    }
}
