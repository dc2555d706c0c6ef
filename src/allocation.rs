// Recipient allocation validation
//
// A recipient set is deployable when it is non-empty, every address is
// `0x` + 40 hex characters, every percentage is positive and the
// percentages sum to exactly 100.

use kinetic_common::{is_valid_address, Recipient};
use thiserror::Error;

/// Total allocation a deployable set must reach
pub const FULL_ALLOCATION: u32 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("At least one recipient is required")]
    Empty,

    #[error("Invalid address for {name}: {address}")]
    InvalidAddress { name: String, address: String },

    #[error("Recipient name is required")]
    MissingName,

    #[error("Percentage for {name} must be greater than 0")]
    NonPositivePercentage { name: String },

    #[error("Total allocation must equal 100% (currently {total}%)")]
    TotalMismatch { total: u32 },

    #[error("Cannot exceed 100% allocation. Currently at {current}%")]
    ExceedsTotal { current: u32 },
}

fn check_recipient(recipient: &Recipient) -> Result<(), ValidationError> {
    if !is_valid_address(&recipient.address) {
        return Err(ValidationError::InvalidAddress {
            name: recipient.name.clone(),
            address: recipient.address.clone(),
        });
    }
    if recipient.percentage == 0 {
        return Err(ValidationError::NonPositivePercentage {
            name: recipient.name.clone(),
        });
    }
    Ok(())
}

/// Sum of percentages, saturating so oversized input cannot wrap back to 100
pub fn total_percentage(recipients: &[Recipient]) -> u32 {
    recipients.iter().fold(0u32, |acc, r| acc.saturating_add(r.percentage))
}

/// Validate a complete recipient set before submission
pub fn validate_recipients(recipients: &[Recipient]) -> Result<(), ValidationError> {
    if recipients.is_empty() {
        return Err(ValidationError::Empty);
    }

    for recipient in recipients {
        check_recipient(recipient)?;
    }

    let total = total_percentage(recipients);
    if total != FULL_ALLOCATION {
        return Err(ValidationError::TotalMismatch { total });
    }

    Ok(())
}

/// Recipient list under construction; additions are checked as they happen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    recipients: Vec<Recipient>,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipient, refusing entries that are malformed or would push the
    /// running total over 100%. The set is unchanged on error.
    pub fn try_add(&mut self, recipient: Recipient) -> Result<(), ValidationError> {
        if recipient.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        check_recipient(&recipient)?;

        let current = self.total();
        if current.saturating_add(recipient.percentage) > FULL_ALLOCATION {
            return Err(ValidationError::ExceedsTotal { current });
        }

        self.recipients.push(recipient);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Recipient> {
        if index < self.recipients.len() {
            Some(self.recipients.remove(index))
        } else {
            None
        }
    }

    pub fn total(&self) -> u32 {
        total_percentage(&self.recipients)
    }

    pub fn is_complete(&self) -> bool {
        validate_recipients(&self.recipients).is_ok()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_recipients(&self.recipients)
    }

    pub fn as_slice(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn into_vec(self) -> Vec<Recipient> {
        self.recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0x1111111111111111111111111111111111111111";
    const B: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn test_valid_split() {
        let recipients = vec![Recipient::new(A, "X", 60), Recipient::new(B, "Y", 40)];
        assert!(validate_recipients(&recipients).is_ok());
    }

    #[test]
    fn test_empty_set_rejected() {
        assert_eq!(validate_recipients(&[]), Err(ValidationError::Empty));
    }

    #[test]
    fn test_sum_must_be_100() {
        let recipients = vec![Recipient::new(A, "X", 60), Recipient::new(B, "Y", 30)];
        let err = validate_recipients(&recipients).unwrap_err();
        assert_eq!(err, ValidationError::TotalMismatch { total: 90 });
        assert!(err.to_string().contains("must equal 100%"));
    }

    #[test]
    fn test_malformed_address_rejected() {
        let recipients = vec![Recipient::new("0x1234", "X", 100)];
        assert!(matches!(
            validate_recipients(&recipients),
            Err(ValidationError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_zero_percentage_rejected() {
        let recipients = vec![Recipient::new(A, "X", 100), Recipient::new(B, "Y", 0)];
        assert_eq!(
            validate_recipients(&recipients),
            Err(ValidationError::NonPositivePercentage { name: "Y".into() })
        );
    }

    #[test]
    fn test_incremental_add_blocks_overflow() {
        let mut set = RecipientSet::new();
        set.try_add(Recipient::new(A, "X", 70)).unwrap();

        let err = set.try_add(Recipient::new(B, "Y", 40)).unwrap_err();
        assert_eq!(err, ValidationError::ExceedsTotal { current: 70 });
        assert_eq!(set.as_slice().len(), 1);
        assert!(!set.is_complete());

        set.try_add(Recipient::new(B, "Y", 30)).unwrap();
        assert_eq!(set.total(), 100);
        assert!(set.is_complete());
    }

    #[test]
    fn test_incremental_add_requires_name() {
        let mut set = RecipientSet::new();
        assert_eq!(set.try_add(Recipient::new(A, "  ", 10)), Err(ValidationError::MissingName));
    }

    #[test]
    fn test_remove() {
        let mut set = RecipientSet::new();
        set.try_add(Recipient::new(A, "X", 50)).unwrap();
        assert_eq!(set.remove(3), None);
        assert_eq!(set.remove(0).unwrap().name, "X");
        assert_eq!(set.total(), 0);
    }
}
