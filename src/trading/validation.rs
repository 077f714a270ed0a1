//! Input validation, run before any external call

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref BASE58: Regex = Regex::new(r"^[1-9A-HJ-NP-Za-km-z]+$").expect("valid base58 regex");
}

const MIN_MINT_LEN: usize = 32;
const MAX_MINT_LEN: usize = 44;

/// Check a token mint address: base58 alphabet, 32..=44 chars
pub fn validate_mint(mint: &str, field: &str) -> Result<()> {
    if mint.len() < MIN_MINT_LEN || mint.len() > MAX_MINT_LEN {
        return Err(Error::validation(
            field,
            format!("address length {} outside {}..={}", mint.len(), MIN_MINT_LEN, MAX_MINT_LEN),
        ));
    }
    if !BASE58.is_match(mint) {
        return Err(Error::validation(field, "address is not base58"));
    }
    Ok(())
}

/// Check a trade amount against configured bounds (inclusive)
pub fn validate_amount(amount: f64, min: f64, max: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation("amount", format!("{} is not a positive amount", amount)));
    }
    if amount < min || amount > max {
        return Err(Error::validation(
            "amount",
            format!("{} outside [{}, {}]", amount, min, max),
        ));
    }
    Ok(())
}

pub fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(Error::validation("price", format!("{} is not a positive price", price)));
    }
    Ok(())
}

pub fn validate_position_limit(open: usize, max: usize) -> Result<()> {
    if open >= max {
        return Err(Error::PositionLimitReached { open, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_mint() {
        assert!(validate_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "mint").is_ok());
        assert!(validate_mint("short", "mint").is_err());
        // '0', 'O', 'I' and 'l' are outside the alphabet
        assert!(validate_mint("0PjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "mint").is_err());
        assert!(validate_mint("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1vEPjFWdd5", "mint").is_err());
    }

    #[test]
    fn test_validate_amount_bounds_inclusive() {
        assert!(validate_amount(0.1, 0.1, 10000.0).is_ok());
        assert!(validate_amount(10000.0, 0.1, 10000.0).is_ok());
        assert!(validate_amount(0.09, 0.1, 10000.0).is_err());
        assert!(validate_amount(f64::NAN, 0.1, 10000.0).is_err());
        assert!(validate_amount(-5.0, 0.1, 10000.0).unwrap_err().is_validation());
    }

    #[test]
    fn test_validate_price() {
        assert!(validate_price(0.0001).is_ok());
        assert!(validate_price(0.0).is_err());
        assert!(validate_price(f64::INFINITY).is_err());
    }

    #[test]
    fn test_position_limit() {
        assert!(validate_position_limit(2, 3).is_ok());
        assert!(matches!(
            validate_position_limit(3, 3),
            Err(Error::PositionLimitReached { open: 3, max: 3 })
        ));
    }
}
