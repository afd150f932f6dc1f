//! Input validation helpers for values arriving from the CLI or environment.

use num_bigint::{BigInt, BigUint};

use crate::{CoreError, IndexRange, TableName};

/// Parse a decimal index. Negative values are a range error rather than a
/// parse error so callers see one failure kind for bad bounds.
pub fn parse_index(raw: &str, field: &str) -> Result<BigUint, CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Range(format!("{field} is empty")));
    }
    let signed: BigInt = trimmed
        .parse()
        .map_err(|e| CoreError::Range(format!("{field} {trimmed:?} is not an integer: {e}")))?;
    signed
        .to_biguint()
        .ok_or_else(|| CoreError::Range(format!("{field} must not be negative (got {signed})")))
}

/// Parse and validate a `[min, max)` pair.
pub fn parse_index_range(min: &str, max: &str) -> Result<IndexRange, CoreError> {
    IndexRange::new(parse_index(min, "min index")?, parse_index(max, "max index")?)
}

/// Validate a table name using the same rules as `TableName::new`.
pub fn validate_table_name(s: &str) -> Result<TableName, CoreError> {
    TableName::new(s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounds_beyond_u64() {
        let r = parse_index_range("0", "340282366920938463463374607431768211456").unwrap();
        assert_eq!(r.start(), &BigUint::from(0u32));
        assert_eq!(r.end(), &(BigUint::from(1u32) << 128u32));
    }

    #[test]
    fn negative_and_garbage_are_range_errors() {
        assert!(matches!(parse_index("-1", "min"), Err(CoreError::Range(_))));
        assert!(matches!(parse_index("ten", "min"), Err(CoreError::Range(_))));
        assert!(matches!(parse_index("  ", "min"), Err(CoreError::Range(_))));
        assert!(matches!(parse_index_range("-5", "10"), Err(CoreError::Range(_))));
    }

    #[test]
    fn inverted_range_rejected() {
        assert!(parse_index_range("10", "10").is_err());
        assert!(parse_index_range("11", "10").is_err());
        assert!(parse_index_range(" 3 ", "4").is_ok());
    }

    #[test]
    fn table_validation_delegates() {
        assert!(validate_table_name("hashes").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("bad-name").is_err());
    }
}
