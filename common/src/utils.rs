use ethers::types::{Address, H256, U256};

use crate::types::AmountError;

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    match value.strip_prefix("0x") {
        Some(rest) => rest.len() == digits && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// True iff `value` is `0x` followed by exactly 40 hex characters
pub fn is_valid_address(value: &str) -> bool {
    is_prefixed_hex(value, 40)
}

/// True iff `value` has the shape of a transaction hash (`0x` + 64 hex characters)
pub fn is_transaction_hash(value: &str) -> bool {
    is_prefixed_hex(value, 64)
}

/// Parse a strictly formatted address string
pub fn parse_address(value: &str) -> Option<Address> {
    if !is_valid_address(value) {
        return None;
    }
    hex::decode(&value[2..]).ok().map(|bytes| Address::from_slice(&bytes))
}

/// Parse a strictly formatted transaction hash string
pub fn parse_transaction_hash(value: &str) -> Option<H256> {
    if !is_transaction_hash(value) {
        return None;
    }
    hex::decode(&value[2..]).ok().map(|bytes| H256::from_slice(&bytes))
}

/// Shorten an address for display: `0x1234...abcd`
pub fn format_address(address: &str) -> String {
    if address.len() <= 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Convert a decimal string such as `"1.5"` into base units of a token with
/// `decimals` decimal places. Fraction digits beyond `decimals` are truncated.
pub fn parse_base_units(value: &str, decimals: u32) -> Result<U256, AmountError> {
    let value = value.trim();
    let (int_part, frac_part) = match value.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (value, ""),
    };

    let valid = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part) {
        return Err(AmountError::Malformed(value.to_string()));
    }

    let mut digits = if int_part.is_empty() { "0".to_string() } else { int_part.to_string() };
    let frac: String = frac_part.chars().take(decimals as usize).collect();
    digits.push_str(&format!("{:0<width$}", frac, width = decimals as usize));

    U256::from_dec_str(&digits).map_err(|_| AmountError::Overflow(value.to_string()))
}

/// Render base units with `decimals` decimal places, trailing zeros trimmed
pub fn format_base_units(amount: U256, decimals: u32) -> String {
    let raw = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return raw;
    }

    let padded = format!("{:0>width$}", raw, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_format() {
        assert!(is_valid_address("0x7FA9385bE102ac3EAc297483Dd6233D62b3e1496"));
        assert!(!is_valid_address("7FA9385bE102ac3EAc297483Dd6233D62b3e1496"));
        assert!(!is_valid_address("0x7FA9385bE102ac3EAc297483Dd6233D62b3e149"));
        assert!(!is_valid_address("0x7FA9385bE102ac3EAc297483Dd6233D62b3e149g"));
        assert!(!is_valid_address(
            "0x1111111111111111111111111111111111111111111111111111111111111111"
        ));
    }

    #[test]
    fn test_parse_address_roundtrip() {
        let address = parse_address("0x00000000000000000000000000000000000000aa").unwrap();
        assert_eq!(address, Address::from_low_u64_be(0xaa));
        assert!(parse_address("0xnope").is_none());
    }

    #[test]
    fn test_format_address() {
        assert_eq!(
            format_address("0xc4AE01295cfAE3DA96b044F1a4284A93837a644C"),
            "0xc4AE...644C"
        );
        assert_eq!(format_address(""), "");
    }

    #[test]
    fn test_parse_base_units() {
        assert_eq!(parse_base_units("1", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_base_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_base_units(".25", 2).unwrap(), U256::from(25u64));
        // extra precision is truncated
        assert_eq!(parse_base_units("0.1234567", 6).unwrap(), U256::from(123_456u64));
        assert!(parse_base_units("abc", 6).is_err());
        assert!(parse_base_units("", 6).is_err());
    }

    #[test]
    fn test_format_base_units() {
        assert_eq!(format_base_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_base_units(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_base_units(U256::from(42u64), 6), "0.000042");
        assert_eq!(format_base_units(U256::from(7u64), 0), "7");
    }
}
