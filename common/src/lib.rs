pub mod types;
pub mod utils;

pub use types::*;
pub use utils::{format_address, format_base_units, is_transaction_hash, is_valid_address, parse_base_units};

/// Length of a `0x`-prefixed contract address string
pub const ADDRESS_STRING_LEN: usize = 42;

/// Length of a `0x`-prefixed transaction hash string
pub const TX_HASH_STRING_LEN: usize = 66;
