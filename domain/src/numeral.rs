//! Numeral conversion between non-negative big integers and strings over an
//! arbitrary alphabet.
//!
//! Zero encodes to the alphabet's first symbol. Every other value is written
//! most-significant digit first with no leading first-symbol, so each index maps
//! to exactly one string and length never decreases as the index grows. A
//! single-symbol alphabet has no positional form and falls back to a unary tally.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};

use crate::{Alphabet, CoreError};

/// Largest radix `BigUint::to_radix_be` accepts.
const MAX_NATIVE_RADIX: usize = 256;

/// Encode `value` as a string over `alphabet`.
pub fn encode(value: &BigUint, alphabet: &Alphabet) -> Result<String, CoreError> {
    let base = alphabet.len();
    let symbols = alphabet.symbols();
    if base == 0 {
        return Err(CoreError::InvalidAlphabet(
            "must have at least one symbol".into(),
        ));
    }
    if base == 1 {
        let count = value.to_usize().ok_or_else(|| {
            CoreError::Range(format!("unary encoding of {value} is too long"))
        })?;
        return Ok(std::iter::repeat(symbols[0]).take(count).collect());
    }
    if value.is_zero() {
        return Ok(symbols[0].to_string());
    }

    if base <= MAX_NATIVE_RADIX {
        // Most-significant first, no leading zero digits for a non-zero value.
        let digits = value.to_radix_be(base as u32);
        return Ok(digits.iter().map(|d| symbols[*d as usize]).collect());
    }

    let radix = BigUint::from(base);
    let mut rest = value.clone();
    let mut reversed = Vec::new();
    while !rest.is_zero() {
        let (quotient, digit) = rest.div_rem(&radix);
        let digit = digit
            .to_usize()
            .ok_or_else(|| CoreError::Range(format!("digit {digit} exceeds base {base}")))?;
        reversed.push(symbols[digit]);
        rest = quotient;
    }
    Ok(reversed.into_iter().rev().collect())
}

/// Recover the index `text` was encoded from. Strings `encode` never produces
/// (empty, leading first-symbol, foreign symbols) are rejected.
pub fn decode(text: &str, alphabet: &Alphabet) -> Result<BigUint, CoreError> {
    let base = alphabet.len();
    let symbols = alphabet.symbols();
    if base == 0 {
        return Err(CoreError::InvalidAlphabet(
            "must have at least one symbol".into(),
        ));
    }
    if base == 1 {
        if let Some(c) = text.chars().find(|c| *c != symbols[0]) {
            return Err(CoreError::InvalidEncoding(format!(
                "symbol {c:?} is not in the alphabet"
            )));
        }
        return Ok(BigUint::from(text.chars().count()));
    }

    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return Err(CoreError::InvalidEncoding("empty string".into()));
    };
    if first == symbols[0] && chars.next().is_some() {
        return Err(CoreError::InvalidEncoding(format!(
            "leading {first:?} is only valid for index 0"
        )));
    }

    let radix = BigUint::from(base);
    let mut value = BigUint::zero();
    for c in text.chars() {
        let digit = alphabet.digit_of(c).ok_or_else(|| {
            CoreError::InvalidEncoding(format!("symbol {c:?} is not in the alphabet"))
        })?;
        value = value * &radix + BigUint::from(digit);
    }
    Ok(value)
}
