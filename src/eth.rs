//! Small EVM value helpers shared by the service layer and the CLI

use crate::chain::ChainClient;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Zero-address sentinel stored for accounts that have no address yet
pub const ADDRESS_PLACEHOLDER: &str = "0x";

/// Strict `0x` + 40 hex digits check. No checksum validation.
pub fn is_valid_ethereum_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Parse an address and return its EIP-55 checksummed form
pub fn fix_safe_address(address: &str) -> Result<String> {
    parse_address(address).map(|a| a.to_checksum(None))
}

pub fn parse_address(address: &str) -> Result<Address> {
    if !is_valid_ethereum_address(address) {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Address::from_str(address).map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
}

/// Extract the address held in the low 20 bytes of a 32-byte hex word
pub fn hex_to_address(word: &str) -> Result<Address> {
    let low = match word.strip_prefix("0x").and_then(|hex| hex.get(24..)) {
        Some(low) if word.len() == 66 && word.is_ascii() => low,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "expected a 32-byte hex word, got {}",
                word
            )))
        }
    };
    parse_address(&format!("0x{}", low))
}

/// Decimal string of the address read as an unsigned 256-bit integer
pub fn address_to_uint256(address: &Address) -> String {
    U256::from_be_slice(address.as_slice()).to_string()
}

/// Inverse of [`address_to_uint256`]; values wider than 160 bits are rejected
pub fn uint256_to_address(value: &str) -> Result<Address> {
    let value = U256::from_str(value)
        .map_err(|e| Error::InvalidArgument(format!("not a uint256: {}: {}", value, e)))?;
    if value.bit_len() > 160 {
        return Err(Error::InvalidArgument(format!(
            "{} does not fit in an address",
            value
        )));
    }
    let bytes = value.to_be_bytes::<32>();
    Ok(Address::from_slice(&bytes[12..]))
}

/// 32-byte word holding a unix timestamp ten years from `now`
pub fn expiry_time_hex(now: DateTime<Utc>) -> String {
    let expiry = now + chrono::Duration::days(10 * 365);
    timestamp_word(expiry.timestamp().max(0) as u64)
}

/// 32-byte word holding timestamp zero
pub fn expired_time_hex() -> String {
    timestamp_word(0)
}

fn timestamp_word(seconds: u64) -> String {
    format!("0x{:064x}", seconds)
}

/// Human-readable timestamp of a block, or `-` if the block is unknown
pub async fn block_time(client: &dyn ChainClient, block_number: u64) -> Result<String> {
    let formatted = client
        .block_timestamp(block_number)
        .await?
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0))
        .map(|dt| dt.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    Ok(formatted)
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }

    let fraction = format!("{:0>width$}", remainder, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use chrono::TimeZone;

    #[test]
    fn test_address_pattern() {
        assert!(is_valid_ethereum_address(
            "0x169874fA8A472fB54aE31D500d57c0c7D5143815"
        ));
        assert!(!is_valid_ethereum_address("0x"));
        assert!(!is_valid_ethereum_address(
            "169874fA8A472fB54aE31D500d57c0c7D5143815"
        ));
        assert!(!is_valid_ethereum_address(
            "0x169874fA8A472fB54aE31D500d57c0c7D514381z"
        ));
    }

    #[test]
    fn test_fix_safe_address_checksums() {
        let fixed = fix_safe_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        assert_eq!(fixed, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }

    #[test]
    fn test_hex_word_to_address() {
        let word = "0x000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266";
        assert_eq!(
            hex_to_address(word).unwrap(),
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert!(hex_to_address("0x1234").is_err());
    }

    #[test]
    fn test_hex_to_address_rejects_non_ascii_word() {
        // 66 bytes long, but not 66 characters
        let word = format!("0xa{}", "\u{20ac}".repeat(21));
        assert_eq!(word.len(), 66);
        assert!(matches!(
            hex_to_address(&word),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_uint256_address_conversion() {
        let addr = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let as_int = address_to_uint256(&addr);
        assert_eq!(uint256_to_address(&as_int).unwrap(), addr);

        let too_wide = (U256::from(1u8) << 200usize).to_string();
        assert!(uint256_to_address(&too_wide).is_err());
    }

    #[test]
    fn test_expiry_words() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let word = expiry_time_hex(now);
        assert_eq!(word.len(), 66);
        let seconds = u64::from_str_radix(&word[2..], 16).unwrap();
        assert_eq!(seconds, (now + chrono::Duration::days(3650)).timestamp() as u64);

        assert_eq!(expired_time_hex(), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(
            format_units(U256::from(1_500_000_000_000_000_000u128), 18),
            "1.5"
        );
        assert_eq!(format_units(U256::from(2_000_000u64), 6), "2");
    }
}
