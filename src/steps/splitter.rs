// Payment splitter deployment
//
// With a factory configured, every deployment gets its own splitter created
// from the recipient set. Without one, all strategies pay the shared default
// splitter.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use kinetic_common::Recipient;
use log::{debug, info, warn};

use crate::allocation::ValidationError;
use crate::error::DeployError;
use crate::ethereum::contracts::{decode_address_list, encode_call, ContractCall, CREATE_SPLITTER, GET_USER_SPLITTERS};
use crate::ethereum::ChainClient;
use crate::submitter::TransactionSubmitter;

/// Result of the splitter step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterOutcome {
    pub address: Address,
    /// Creation transaction, `None` when the default splitter was used
    pub tx_hash: Option<H256>,
    /// A splitter was created but its address could not be read back
    pub degraded: bool,
}

pub struct SplitterStep<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    factory: Option<Address>,
    default_splitter: Address,
}

impl<'a, C: ChainClient + ?Sized> SplitterStep<'a, C> {
    pub fn new(client: &'a C, factory: Option<Address>, default_splitter: Address) -> Self {
        Self {
            client,
            factory: factory.filter(|f| !f.is_zero()),
            default_splitter,
        }
    }

    /// True when `deploy` will submit a transaction
    pub fn creates_splitter(&self) -> bool {
        self.factory.is_some()
    }

    /// Create a splitter paying `recipients` pro rata to their percentages
    pub async fn deploy(&self, recipients: &[Recipient]) -> Result<SplitterOutcome, DeployError> {
        let factory = match self.factory {
            Some(factory) => factory,
            None => {
                info!("No splitter factory configured, using default splitter {:?}", self.default_splitter);
                return Ok(self.fallback(None, false));
            }
        };

        let (payees, shares) = split_arguments(recipients)?;
        let call = ContractCall::new(
            factory,
            CREATE_SPLITTER,
            &[Token::Array(payees), Token::Array(shares)],
        );
        let submission = TransactionSubmitter::new(self.client).submit(call).await?;

        let sender = self.client.sender();
        let lookup = self
            .client
            .call(factory, encode_call(GET_USER_SPLITTERS, &[Token::Address(sender)]))
            .await
            .map_err(DeployError::from)
            .and_then(|data| decode_address_list(&data));

        match lookup {
            Ok(splitters) => match splitters.last() {
                Some(address) => {
                    info!("Splitter deployed at {:?}", address);
                    Ok(SplitterOutcome {
                        address: *address,
                        tx_hash: Some(submission.tx_hash),
                        degraded: false,
                    })
                }
                None => {
                    warn!(
                        "Splitter created in {:?} but the factory lists none for {:?}",
                        submission.tx_hash, sender
                    );
                    Ok(self.fallback(Some(submission.tx_hash), true))
                }
            },
            Err(e) => {
                warn!("Could not read splitters for {:?}: {}", sender, e);
                Ok(self.fallback(Some(submission.tx_hash), true))
            }
        }
    }

    fn fallback(&self, tx_hash: Option<H256>, degraded: bool) -> SplitterOutcome {
        SplitterOutcome {
            address: self.default_splitter,
            tx_hash,
            degraded,
        }
    }
}

fn split_arguments(recipients: &[Recipient]) -> Result<(Vec<Token>, Vec<Token>), ValidationError> {
    let mut payees = Vec::with_capacity(recipients.len());
    let mut shares = Vec::with_capacity(recipients.len());

    for recipient in recipients {
        let address = recipient.parsed_address().ok_or_else(|| ValidationError::InvalidAddress {
            name: recipient.name.clone(),
            address: recipient.address.clone(),
        })?;
        payees.push(Token::Address(address));
        shares.push(Token::Uint(U256::from(recipient.percentage)));
    }
    debug!("Splitter payees: {}", payees.len());

    Ok((payees, shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainClient;
    use ethers::abi;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    fn recipients() -> Vec<Recipient> {
        vec![Recipient::new(A, "X", 60), Recipient::new(B, "Y", 40)]
    }

    #[tokio::test]
    async fn test_without_factory_uses_default() {
        let client = MockChainClient::new(Address::from_low_u64_be(1));
        let default = Address::from_low_u64_be(0xd);

        let outcome = SplitterStep::new(&client, Some(Address::zero()), default)
            .deploy(&recipients())
            .await
            .unwrap();

        assert_eq!(outcome, SplitterOutcome { address: default, tx_hash: None, degraded: false });
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_creates_and_reads_last_splitter() {
        let sender = Address::from_low_u64_be(1);
        let factory = Address::from_low_u64_be(0xf);
        let client = MockChainClient::new(sender);
        let list = abi::encode(&[Token::Array(vec![
            Token::Address(Address::from_low_u64_be(0x10)),
            Token::Address(Address::from_low_u64_be(0x11)),
        ])]);
        client.on_call(factory, GET_USER_SPLITTERS, list);

        let outcome = SplitterStep::new(&client, Some(factory), Address::from_low_u64_be(0xd))
            .deploy(&recipients())
            .await
            .unwrap();

        assert_eq!(outcome.address, Address::from_low_u64_be(0x11));
        assert!(!outcome.degraded);

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is(CREATE_SPLITTER));
        let args = abi::decode(
            &[
                abi::ParamType::Array(Box::new(abi::ParamType::Address)),
                abi::ParamType::Array(Box::new(abi::ParamType::Uint(256))),
            ],
            &sent[0].data[4..],
        )
        .unwrap();
        assert_eq!(
            args[1],
            Token::Array(vec![Token::Uint(U256::from(60)), Token::Uint(U256::from(40))])
        );
    }

    #[tokio::test]
    async fn test_empty_lookup_is_degraded() {
        let factory = Address::from_low_u64_be(0xf);
        let default = Address::from_low_u64_be(0xd);
        let client = MockChainClient::new(Address::from_low_u64_be(1));
        client.on_call(factory, GET_USER_SPLITTERS, abi::encode(&[Token::Array(vec![])]));

        let outcome = SplitterStep::new(&client, Some(factory), default)
            .deploy(&recipients())
            .await
            .unwrap();

        assert_eq!(outcome.address, default);
        assert!(outcome.degraded);
        assert_eq!(outcome.tx_hash, Some(client.sent()[0].hash));
    }
}
