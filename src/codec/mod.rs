//! Delta codec for time-series execution logs.
//!
//! Successive field values are encoded as short variable-length tokens over a
//! 186-character alphabet (`-` is reserved as the sign prefix). A field that
//! matches its expected default delta encodes to the empty token, so a line of
//! near-identical records collapses to almost nothing.

pub mod record;

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::Decimal;

pub use record::RecordCodec;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty token")]
    Empty,
    #[error("unknown character {0:?} in token")]
    UnknownChar(char),
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// Token alphabet: 186 printable one-byte characters. Order matters; the
/// position of a character is its digit value.
const CHARS: &str = "0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[\\]^_`abcdefghijklmnopqrstuvwxyz{|}~!\"#$%&'()*+,./\u{a1}\u{a2}\u{a3}\u{a4}\u{a5}\u{a6}\u{a7}\u{a8}\u{a9}\u{aa}\u{ab}\u{ac}\u{ae}\u{af}\u{b0}\u{b1}\u{b2}\u{b3}\u{b4}\u{b5}\u{b6}\u{b7}\u{b8}\u{b9}\u{ba}\u{bb}\u{bc}\u{bd}\u{be}\u{bf}\u{c0}\u{c1}\u{c2}\u{c3}\u{c4}\u{c5}\u{c6}\u{c7}\u{c8}\u{c9}\u{ca}\u{cb}\u{cc}\u{cd}\u{ce}\u{cf}\u{d0}\u{d1}\u{d2}\u{d3}\u{d4}\u{d5}\u{d6}\u{d7}\u{d8}\u{d9}\u{da}\u{db}\u{dc}\u{dd}\u{de}\u{df}\u{e0}\u{e1}\u{e2}\u{e3}\u{e4}\u{e5}\u{e6}\u{e7}\u{e8}\u{e9}\u{ea}\u{eb}\u{ec}\u{ed}\u{ee}\u{ef}\u{f0}\u{f1}\u{f2}\u{f3}\u{f4}\u{f5}\u{f6}\u{f7}\u{f8}\u{f9}\u{fa}\u{fb}\u{fc}\u{fd}\u{fe}\u{ff}";

fn digits() -> &'static Vec<char> {
    static DIGITS: OnceLock<Vec<char>> = OnceLock::new();
    DIGITS.get_or_init(|| CHARS.chars().collect())
}

/// Digit value of a character, pre-computed for the one-byte range.
fn digit_of(c: char) -> Result<i128, CodecError> {
    static INDEX: OnceLock<[i16; 256]> = OnceLock::new();
    let index = INDEX.get_or_init(|| {
        let mut table = [-1i16; 256];
        for (i, c) in CHARS.chars().enumerate() {
            table[c as usize] = i as i16;
        }
        table
    });

    let code = c as usize;
    if code < 256 && index[code] >= 0 {
        Ok(index[code] as i128)
    } else {
        Err(CodecError::UnknownChar(c))
    }
}

fn base() -> i128 {
    digits().len() as i128
}

/// Encode a signed integer as a base-186 token.
///
/// Wide enough for a rust_decimal 96-bit mantissa.
pub fn encode_num(value: i128) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let negative = value < 0;
    let mut rest = value.unsigned_abs();
    let base = base() as u128;
    let digits = digits();

    let mut token = String::new();
    while rest != 0 {
        token.push(digits[(rest % base) as usize]);
        rest /= base;
    }
    if negative {
        format!("-{token}")
    } else {
        token
    }
}

/// Decode a base-186 token back to a signed integer.
pub fn decode_num(token: &str) -> Result<i128, CodecError> {
    let (negative, body) = match token.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, token),
    };
    if body.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut result: i128 = 0;
    let mut multiplier: i128 = 1;
    for c in body.chars() {
        result += digit_of(c)? * multiplier;
        multiplier *= base();
    }
    Ok(if negative { -result } else { result })
}

/// Single-character encoding for small non-negative integers (0..186).
pub fn encode_int(value: u32) -> Result<char, CodecError> {
    digits()
        .get(value as usize)
        .copied()
        .ok_or_else(|| CodecError::OutOfRange(value.to_string()))
}

/// Inverse of [`encode_int`].
pub fn decode_int(c: char) -> Result<u32, CodecError> {
    digit_of(c).map(|d| d as u32)
}

/// Delta-encode an integer against its predecessor. The expected delta
/// (`default`) encodes to the empty token.
pub fn encode_delta(current: i64, previous: i64, default: i64) -> String {
    let diff = current - previous;
    if diff == default {
        String::new()
    } else {
        encode_num(diff as i128)
    }
}

/// Inverse of [`encode_delta`].
pub fn decode_delta(token: &str, previous: i64, default: i64) -> Result<i64, CodecError> {
    if token.is_empty() {
        Ok(previous + default)
    } else {
        Ok(previous + decode_diff_i64(token)?)
    }
}

/// Delta-encode a timestamp in milliseconds against its predecessor.
pub fn encode_time_delta(
    current: DateTime<Utc>,
    previous: DateTime<Utc>,
    default_ms: i64,
) -> String {
    encode_delta(
        current.timestamp_millis(),
        previous.timestamp_millis(),
        default_ms,
    )
}

/// Inverse of [`encode_time_delta`].
pub fn decode_time_delta(
    token: &str,
    previous: DateTime<Utc>,
    default_ms: i64,
) -> Result<DateTime<Utc>, CodecError> {
    if token.is_empty() {
        Ok(previous + Duration::milliseconds(default_ms))
    } else {
        Ok(previous + Duration::milliseconds(decode_diff_i64(token)?))
    }
}

/// Delta-encode the integral part of a decimal, leaving the fractional part
/// to be carried separately.
pub fn encode_integral_delta(current: &Decimal, previous: &Decimal, default: i64) -> String {
    encode_delta(current.int_part(), previous.int_part(), default)
}

/// Inverse of [`encode_integral_delta`].
pub fn decode_integral_delta(
    token: &str,
    previous: &Decimal,
    default: i64,
) -> Result<Decimal, CodecError> {
    if token.is_empty() {
        Ok(*previous + Decimal::from(default))
    } else {
        Ok(*previous + Decimal::from(decode_diff_i64(token)?))
    }
}

/// Decode a token that must fit an i64 delta. The i128 intermediate exists
/// for decimal mantissas only; a wider delta token is malformed.
fn decode_diff_i64(token: &str) -> Result<i64, CodecError> {
    i64::try_from(decode_num(token)?).map_err(|_| CodecError::OutOfRange(token.to_string()))
}

/// Encode the minimal diff needed to reconstruct `current` given `previous`:
/// empty when equal, otherwise one scale character followed by the mantissa
/// token. Arbitrary representable scale and precision round-trip exactly.
pub fn encode_diff(current: &Decimal, previous: &Decimal) -> Result<String, CodecError> {
    if current == previous {
        return Ok(String::new());
    }
    let scale = encode_int(current.scale())?;
    Ok(format!("{scale}{}", encode_num(current.mantissa())))
}

/// Inverse of [`encode_diff`].
pub fn decode_diff(token: &str, previous: &Decimal) -> Result<Decimal, CodecError> {
    let mut chars = token.chars();
    let Some(head) = chars.next() else {
        return Ok(*previous);
    };
    let scale = decode_int(head)?;
    let mantissa = decode_num(chars.as_str())?;
    Decimal::from_mantissa_scale(mantissa, scale)
        .map_err(|e| CodecError::OutOfRange(e.to_string()))
}

/// Bounded diff variant: the value is carried as a plain decimal string
/// scaled by a fixed coefficient that keeps the token width small for
/// markets whose prices share a known maximum.
pub fn encode_diff_scaled(current: &Decimal, previous: &Decimal, coefficient: &Decimal) -> String {
    if current == previous {
        String::new()
    } else {
        Decimal::new(current.inner() * coefficient.inner()).to_canonical_string()
    }
}

/// Inverse of [`encode_diff_scaled`].
pub fn decode_diff_scaled(
    token: &str,
    previous: &Decimal,
    coefficient: &Decimal,
) -> Result<Decimal, CodecError> {
    if token.is_empty() {
        return Ok(*previous);
    }
    let value =
        Decimal::from_str_canonical(token).map_err(|e| CodecError::OutOfRange(e.to_string()))?;
    Ok(Decimal::new(value.inner() / coefficient.inner()))
}

/// String diff: empty when unchanged, otherwise the full new string.
pub fn encode_diff_str<'a>(current: &'a str, previous: &str) -> &'a str {
    if current == previous {
        ""
    } else {
        current
    }
}

/// Inverse of [`encode_diff_str`].
pub fn decode_diff_str<'a>(token: &'a str, previous: &'a str) -> &'a str {
    if token.is_empty() {
        previous
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_num_round_trip() {
        for v in [
            0i128,
            1,
            -1,
            185,
            186,
            -186,
            34_587,
            i64::MAX as i128,
            i64::MIN as i128,
            79_228_162_514_264_337_593_543_950_335, // 96-bit mantissa maximum
            -79_228_162_514_264_337_593_543_950_335,
        ] {
            assert_eq!(decode_num(&encode_num(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_num_zero_is_single_char() {
        assert_eq!(encode_num(0), "0");
    }

    #[test]
    fn test_num_rejects_unknown_char() {
        assert!(matches!(decode_num(" "), Err(CodecError::UnknownChar(' '))));
        assert!(matches!(decode_num("-"), Err(CodecError::Empty)));
    }

    #[test]
    fn test_int_single_char_range() {
        for v in [0u32, 9, 42, 185] {
            let c = encode_int(v).unwrap();
            assert_eq!(decode_int(c).unwrap(), v);
        }
        assert!(encode_int(186).is_err());
    }

    #[test]
    fn test_delta_increase() {
        let encoded = encode_delta(10, 9, 0);
        assert_eq!(decode_delta(&encoded, 9, 0).unwrap(), 10);
    }

    #[test]
    fn test_delta_decrease() {
        let encoded = encode_delta(8, 9, 0);
        assert_eq!(decode_delta(&encoded, 9, 0).unwrap(), 8);
    }

    #[test]
    fn test_delta_same_with_nonzero_default() {
        let encoded = encode_delta(5, 5, 1);
        assert!(!encoded.is_empty());
        assert_eq!(decode_delta(&encoded, 5, 1).unwrap(), 5);
    }

    #[test]
    fn test_delta_default_is_empty() {
        let encoded = encode_delta(5, 5, 0);
        assert_eq!(encoded, "");
        assert_eq!(decode_delta(&encoded, 5, 0).unwrap(), 5);
    }

    #[test]
    fn test_delta_zero_crossing() {
        let encoded = encode_delta(-3, 4, 0);
        assert_eq!(decode_delta(&encoded, 4, 0).unwrap(), -3);
    }

    #[test]
    fn test_delta_rejects_diff_beyond_i64() {
        let token = encode_num(i128::from(i64::MAX) + 1);
        assert!(matches!(
            decode_delta(&token, 0, 0),
            Err(CodecError::OutOfRange(_))
        ));

        let t = Utc.with_ymd_and_hms(2020, 12, 15, 10, 0, 0).unwrap();
        assert!(decode_time_delta(&token, t, 0).is_err());
        assert!(decode_integral_delta(&token, &Decimal::ZERO, 0).is_err());
    }

    #[test]
    fn test_time_delta_round_trip() {
        let previous = Utc.with_ymd_and_hms(2020, 12, 15, 10, 0, 0).unwrap();
        let current = previous + Duration::milliseconds(300);

        let encoded = encode_time_delta(current, previous, 0);
        assert_eq!(decode_time_delta(&encoded, previous, 0).unwrap(), current);

        let backwards = encode_time_delta(previous, current, 0);
        assert_eq!(decode_time_delta(&backwards, current, 0).unwrap(), previous);
    }

    #[test]
    fn test_time_delta_default_is_empty() {
        let t = Utc.with_ymd_and_hms(2020, 12, 15, 10, 0, 0).unwrap();
        let encoded = encode_time_delta(t, t, 0);
        assert_eq!(encoded, "");
        assert_eq!(decode_time_delta(&encoded, t, 0).unwrap(), t);
    }

    #[test]
    fn test_integral_delta_round_trip() {
        let one = Decimal::from(1);
        let two = Decimal::from(2);

        let encoded = encode_integral_delta(&one, &Decimal::ZERO, 0);
        assert_eq!(decode_integral_delta(&encoded, &Decimal::ZERO, 0).unwrap(), one);

        let encoded = encode_integral_delta(&one, &two, 0);
        assert_eq!(decode_integral_delta(&encoded, &two, 0).unwrap(), one);
    }

    #[test]
    fn test_integral_delta_default_is_empty() {
        let one = Decimal::from(1);
        let encoded = encode_integral_delta(&one, &one, 0);
        assert_eq!(encoded, "");
        assert_eq!(decode_integral_delta(&encoded, &one, 0).unwrap(), one);
    }

    #[test]
    fn test_diff_round_trip() {
        for (current, previous) in [
            ("1", "0"),
            ("1", "2"),
            ("3.33", "13.4"),
            ("-0.5", "0.5"),
            ("0.1234567890123456789012345678", "0"), // maximum precision
            ("79228162514264337593543950335", "0"),  // maximum magnitude
        ] {
            let current = Decimal::from_str_canonical(current).unwrap();
            let previous = Decimal::from_str_canonical(previous).unwrap();
            let encoded = encode_diff(&current, &previous).unwrap();
            assert_eq!(decode_diff(&encoded, &previous).unwrap(), current);
        }
    }

    #[test]
    fn test_diff_same_is_empty() {
        let one = Decimal::from(1);
        let encoded = encode_diff(&one, &one).unwrap();
        assert_eq!(encoded, "");
        assert_eq!(decode_diff(&encoded, &one).unwrap(), one);
    }

    #[test]
    fn test_diff_scaled_round_trip() {
        let hundred = Decimal::from(100);
        let one = Decimal::from(1);

        let encoded = encode_diff_scaled(&one, &Decimal::ZERO, &hundred);
        assert_eq!(decode_diff_scaled(&encoded, &Decimal::ZERO, &hundred).unwrap(), one);

        let same = encode_diff_scaled(&one, &one, &hundred);
        assert_eq!(same, "");
        assert_eq!(decode_diff_scaled(&same, &one, &hundred).unwrap(), one);
    }

    #[test]
    fn test_diff_str() {
        assert_eq!(encode_diff_str("current", "previous"), "current");
        assert_eq!(decode_diff_str("current", "previous"), "current");
        assert_eq!(encode_diff_str("current", "current"), "");
        assert_eq!(decode_diff_str("", "current"), "current");
    }
}
