use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::ReaderError;
use crate::value::Value;

// The `0[0-9]+` alternative deliberately captures nothing: tokens like `08`
// must fail as malformed integers instead of leaking into the float grammar.
static INT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([-+]?)(?:(0)|([1-9][0-9]*)|0[xX]([0-9A-Fa-f]+)|0([0-7]+)|([1-9][0-9]?)[rR]([0-9A-Za-z]+)|0[0-9]+)(N)?$",
    )
    .unwrap()
});

static RATIO_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-+]?[0-9]+)/([0-9]+)$").unwrap());

static FLOAT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-+]?[0-9]+(\.[0-9]*)?([eE][-+]?[0-9]+)?)(M)?$").unwrap());

/// Match a token against the integer, ratio, and float grammars in that
/// order. `Ok(None)` means no grammar accepted the token; the caller reports
/// the invalid-number error.
pub(crate) fn match_number(token: &str) -> Result<Option<Value>, ReaderError> {
    if let Some(caps) = INT_PATTERN.captures(token) {
        return match_integer(token, &caps);
    }
    if let Some(caps) = RATIO_PATTERN.captures(token) {
        return match_ratio(token, &caps).map(Some);
    }
    if let Some(caps) = FLOAT_PATTERN.captures(token) {
        return match_float(token, &caps).map(Some);
    }
    Ok(None)
}

fn match_integer(token: &str, caps: &Captures<'_>) -> Result<Option<Value>, ReaderError> {
    // The bare-zero alternative wins before the sign applies, so `-0`, `+0`
    // and `0` all land here.
    if caps.get(2).is_some() {
        return Ok(Some(Value::int(0)));
    }
    let (digits, radix) = if let Some(m) = caps.get(3) {
        (m.as_str(), 10)
    } else if let Some(m) = caps.get(4) {
        (m.as_str(), 16)
    } else if let Some(m) = caps.get(5) {
        (m.as_str(), 8)
    } else if let (Some(prefix), Some(digits)) = (caps.get(6), caps.get(7)) {
        let radix = prefix
            .as_str()
            .parse::<u32>()
            .map_err(|_| invalid_number(token))?;
        if !(2..=36).contains(&radix) {
            return Err(invalid_number(token));
        }
        (digits.as_str(), radix)
    } else {
        // Leading-zero decimal: matched by the dead alternative.
        return Ok(None);
    };
    let magnitude = i64::from_str_radix(digits, radix).map_err(|_| invalid_number(token))?;
    let value = if caps.get(1).map(|m| m.as_str()) == Some("-") {
        -magnitude
    } else {
        magnitude
    };
    Ok(Some(Value::int(value)))
}

fn match_ratio(token: &str, caps: &Captures<'_>) -> Result<Value, ReaderError> {
    let numer: i64 = caps[1].parse().map_err(|_| invalid_number(token))?;
    let denom: i64 = caps[2].parse().map_err(|_| invalid_number(token))?;
    if denom == 0 {
        return Err(ReaderError::lexical(format!("Divide by zero: {}", token)));
    }
    Ok(Value::ratio(numer, denom))
}

fn match_float(token: &str, caps: &Captures<'_>) -> Result<Value, ReaderError> {
    let value: f64 = caps[1].parse().map_err(|_| invalid_number(token))?;
    Ok(Value::float(value))
}

fn invalid_number(token: &str) -> ReaderError {
    ReaderError::lexical(format!("Invalid number format: {}", token))
}
