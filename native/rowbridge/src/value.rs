/// Decoded column values
///
/// A `DecodedValue` is what the transport hands over for one column of one row,
/// already parsed out of wire bytes. `Decimal` is an arbitrary-precision number
/// stored as an unscaled big integer plus a base-ten scale.
use std::cmp::Ordering;
use std::fmt;

use bytes::Bytes;
use chrono::NaiveDateTime;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::{DriverError, Result};

/// Largest digit count a rescaled `Decimal` may reach.
pub const MAX_DECIMAL_DIGITS: u64 = 1_000_000;

/// Kind tag of a `DecodedValue`, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Decimal,
    Real,
    Text,
    Binary,
    Timestamp,
    Tag,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Null,
    Integer(i64),
    Decimal(Decimal),
    Real(f64),
    Text(String),
    Binary(Bytes),
    Timestamp(NaiveDateTime),
    /// Short symbolic string such as a language code.
    Tag(String),
    /// Homogeneous, one level deep. Build through [`DecodedValue::array`].
    Array(Vec<DecodedValue>),
}

impl DecodedValue {
    /// Build an array value, checking that every non-null element shares one
    /// scalar kind.
    pub fn array(elements: Vec<DecodedValue>) -> Result<Self> {
        let mut element_kind: Option<ValueKind> = None;
        for element in &elements {
            match element.kind() {
                ValueKind::Null => {}
                ValueKind::Array => {
                    return Err(DriverError::bad_argument("arrays cannot be nested"));
                }
                kind => match element_kind {
                    None => element_kind = Some(kind),
                    Some(seen) if seen == kind => {}
                    Some(seen) => {
                        return Err(DriverError::bad_argument(format!(
                            "array mixes {seen:?} and {kind:?} elements"
                        )));
                    }
                },
            }
        }
        Ok(DecodedValue::Array(elements))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            DecodedValue::Null => ValueKind::Null,
            DecodedValue::Integer(_) => ValueKind::Integer,
            DecodedValue::Decimal(_) => ValueKind::Decimal,
            DecodedValue::Real(_) => ValueKind::Real,
            DecodedValue::Text(_) => ValueKind::Text,
            DecodedValue::Binary(_) => ValueKind::Binary,
            DecodedValue::Timestamp(_) => ValueKind::Timestamp,
            DecodedValue::Tag(_) => ValueKind::Tag,
            DecodedValue::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DecodedValue::Null)
    }

    /// Kind shared by the elements of an array value, `None` for non-arrays
    /// and for arrays holding only nulls.
    pub fn element_kind(&self) -> Option<ValueKind> {
        match self {
            DecodedValue::Array(elements) => elements
                .iter()
                .map(DecodedValue::kind)
                .find(|kind| *kind != ValueKind::Null),
            _ => None,
        }
    }
}

impl From<i64> for DecodedValue {
    fn from(v: i64) -> Self {
        DecodedValue::Integer(v)
    }
}

impl From<i32> for DecodedValue {
    fn from(v: i32) -> Self {
        DecodedValue::Integer(i64::from(v))
    }
}

impl From<f64> for DecodedValue {
    fn from(v: f64) -> Self {
        DecodedValue::Real(v)
    }
}

impl From<&str> for DecodedValue {
    fn from(v: &str) -> Self {
        DecodedValue::Text(v.to_string())
    }
}

impl From<String> for DecodedValue {
    fn from(v: String) -> Self {
        DecodedValue::Text(v)
    }
}

impl From<Vec<u8>> for DecodedValue {
    fn from(v: Vec<u8>) -> Self {
        DecodedValue::Binary(Bytes::from(v))
    }
}

impl From<Decimal> for DecodedValue {
    fn from(v: Decimal) -> Self {
        DecodedValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for DecodedValue {
    fn from(v: NaiveDateTime) -> Self {
        DecodedValue::Timestamp(v)
    }
}

impl<T: Into<DecodedValue>> From<Option<T>> for DecodedValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(DecodedValue::Null, Into::into)
    }
}
/// Arbitrary-precision decimal: `unscaled * 10^-scale`.
///
/// A negative scale carries trailing zeros without storing them, so `1e300`
/// is one digit. Equality is structural: `1.0` and `1.00` are different values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    scale: i32,
}

fn pow10(exp: u32) -> BigInt {
    BigInt::from(10u32).pow(exp)
}

/// Upper bound on the decimal digit count of `v`.
fn max_digits(v: &BigInt) -> u64 {
    v.bits() * 30_103 / 100_000 + 1
}

/// Low 64 bits of `v` in two's complement.
fn low_i64(v: &BigInt) -> i64 {
    let fill = if v.sign() == Sign::Minus { 0xFF } else { 0 };
    let mut word = [fill; 8];
    for (slot, byte) in word.iter_mut().zip(v.to_signed_bytes_le()) {
        *slot = byte;
    }
    i64::from_le_bytes(word)
}

impl Decimal {
    pub fn new(unscaled: impl Into<BigInt>, scale: i32) -> Self {
        Decimal {
            unscaled: unscaled.into(),
            scale,
        }
    }

    pub fn zero() -> Self {
        Decimal::new(BigInt::zero(), 0)
    }

    pub fn from_i64(v: i64) -> Self {
        Decimal::new(v, 0)
    }

    /// Exact decimal form of the shortest text that round-trips `v`.
    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        Decimal::parse(&format!("{v:?}"))
    }

    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }

    /// Parse `[+-]digits[.digits][(e|E)[+-]digits]`.
    ///
    /// Surrounding whitespace is not accepted; callers trim first. Fails only on
    /// malformed text or an exponent that pushes the scale outside `i32`.
    pub fn parse(text: &str) -> Option<Self> {
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match body.find(|c: char| c == 'e' || c == 'E') {
            Some(at) => (&body[..at], Some(&body[at + 1..])),
            None => (body, None),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let exponent: i64 = match exponent {
            None => 0,
            Some(rest) if rest.is_empty() || rest.len() > 11 => return None,
            Some(rest) => rest.parse().ok()?,
        };
        let scale = i64::try_from(fraction.len()).ok()?.checked_sub(exponent)?;
        let scale = i32::try_from(scale).ok()?;

        let digits = format!("{whole}{fraction}");
        let mut unscaled = BigInt::parse_bytes(digits.as_bytes(), 10)?;
        if negative {
            unscaled = -unscaled;
        }
        Some(Decimal { unscaled, scale })
    }

    /// Change the scale, rounding half to even when digits are dropped.
    ///
    /// Returns `None` only when the result would need more than
    /// [`MAX_DECIMAL_DIGITS`] digits.
    pub fn rescale(&self, scale: i32) -> Option<Self> {
        let diff = i64::from(scale) - i64::from(self.scale);
        if diff >= 0 {
            if self.unscaled.is_zero() {
                return Some(Decimal::new(BigInt::zero(), scale));
            }
            if max_digits(&self.unscaled).saturating_add(diff.unsigned_abs()) > MAX_DECIMAL_DIGITS {
                return None;
            }
            let factor = pow10(u32::try_from(diff).ok()?);
            return Some(Decimal::new(&self.unscaled * factor, scale));
        }

        let dropped = diff.unsigned_abs();
        // Every kept digit would be zero and the rest is below half a unit
        if dropped > max_digits(&self.unscaled) {
            return Some(Decimal::new(BigInt::zero(), scale));
        }
        let divisor = pow10(u32::try_from(dropped).ok()?);
        let mut quotient = &self.unscaled / &divisor;
        let remainder = &self.unscaled % &divisor;
        let twice = remainder.magnitude() * 2u32;
        let odd = !(&quotient % 2u32).is_zero();
        match twice.cmp(divisor.magnitude()) {
            Ordering::Greater => quotient += self.unscaled.signum(),
            Ordering::Equal if odd => quotient += self.unscaled.signum(),
            _ => {}
        }
        Some(Decimal::new(quotient, scale))
    }

    /// Integral part truncated toward zero, or `None` if it does not fit an `i64`.
    pub fn trunc_i64(&self) -> Option<i64> {
        if self.unscaled.is_zero() {
            return Some(0);
        }
        // 10^19 already exceeds i64::MAX
        if self.scale < -18 {
            return None;
        }
        self.whole().to_i64()
    }

    /// Low 64 bits of the integral part truncated toward zero.
    pub fn trunc_wrapping(&self) -> i64 {
        // 10^64 is a multiple of 2^64
        if self.scale <= -64 {
            return 0;
        }
        low_i64(&self.whole())
    }

    /// Callers bound the negative scale before calling.
    fn whole(&self) -> BigInt {
        let exp = self.scale.unsigned_abs();
        if self.scale <= 0 {
            &self.unscaled * pow10(exp)
        } else if u64::from(exp) > max_digits(&self.unscaled) {
            BigInt::zero()
        } else {
            &self.unscaled / pow10(exp)
        }
    }

    /// `unscaledEexponent` form, compact whatever the scale.
    pub fn to_exponent_string(&self) -> String {
        format!("{}E{}", self.unscaled, -i64::from(self.scale))
    }

    pub fn to_f64(&self) -> f64 {
        self.to_exponent_string().parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Decimal {
    /// Plain notation: no exponent, exactly `scale` fractional digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.magnitude().to_string();
        let sign = if self.unscaled.sign() == Sign::Minus { "-" } else { "" };
        if self.scale <= 0 {
            let zeros = if self.unscaled.is_zero() {
                0
            } else {
                self.scale.unsigned_abs() as usize
            };
            return write!(f, "{sign}{digits}{}", "0".repeat(zeros));
        }
        let scale = self.scale.unsigned_abs() as usize;
        let padded = if digits.len() <= scale {
            format!("{}{digits}", "0".repeat(scale + 1 - digits.len()))
        } else {
            digits
        };
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{whole}.{fraction}")
    }
}
