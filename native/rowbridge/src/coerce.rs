/// Value coercion from decoded column values to caller-requested shapes
///
/// Every conversion is a match over (source kind, target kind). A null source
/// never fails: it yields the target's zero or empty value and sets `was_null`.
/// Integral narrowing follows two's-complement truncation unless the caller opts
/// into `CoercionMode::Strict`.
use std::io::Cursor;

use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::cursor::ResultCursor;
use crate::error::{DriverError, Result};
use crate::metadata::{ResultMetadata, SqlType};
use crate::transport::MaterializedRows;
use crate::value::{DecodedValue, Decimal, ValueKind};

/// Representation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    CharacterStream,
    Bytes,
    BinaryStream,
    Date,
    Time,
    Timestamp,
    Uuid,
    Array,
    Object,
}

/// How integral narrowing treats values outside the target range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercionMode {
    /// Keep the low-order bits of the value, as a primitive cast would.
    #[default]
    Truncate,
    /// Raise `NumericOverflow` instead of changing the value.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    CharacterStream(Cursor<String>),
    Bytes(Bytes),
    BinaryStream(Cursor<Bytes>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Uuid(Uuid),
    Array(ArrayElements),
    Object(DecodedValue),
}

/// Result of a successful coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct Coercion {
    pub value: Coerced,
    pub was_null: bool,
}

/// Coerce with the default truncating mode.
pub fn coerce(value: &DecodedValue, target: TargetKind) -> Result<Coercion> {
    coerce_with(value, target, CoercionMode::default())
}

pub fn coerce_with(value: &DecodedValue, target: TargetKind, mode: CoercionMode) -> Result<Coercion> {
    let coerced = match target {
        TargetKind::Boolean => Coerced::Boolean(to_boolean(value)?),
        TargetKind::Byte => Coerced::Byte(to_byte(value, mode)?),
        TargetKind::Short => Coerced::Short(to_short(value, mode)?),
        TargetKind::Int => Coerced::Int(to_int(value, mode)?),
        TargetKind::Long => Coerced::Long(to_long(value, mode)?),
        TargetKind::Float => Coerced::Float(to_float(value)?),
        TargetKind::Double => Coerced::Double(to_double(value)?),
        TargetKind::Decimal => Coerced::Decimal(to_decimal(value)?),
        TargetKind::String => Coerced::String(to_text(value, target)?),
        TargetKind::CharacterStream => {
            Coerced::CharacterStream(Cursor::new(to_text(value, target)?))
        }
        TargetKind::Bytes => Coerced::Bytes(to_bytes(value, target)?),
        TargetKind::BinaryStream => Coerced::BinaryStream(Cursor::new(to_bytes(value, target)?)),
        TargetKind::Date => Coerced::Date(to_date(value)?),
        TargetKind::Time => Coerced::Time(to_time(value)?),
        TargetKind::Timestamp => Coerced::Timestamp(to_timestamp(value)?),
        TargetKind::Uuid => Coerced::Uuid(to_uuid(value)?),
        TargetKind::Array => Coerced::Array(to_array(value)?),
        TargetKind::Object => Coerced::Object(value.clone()),
    };
    Ok(Coercion {
        value: coerced,
        was_null: value.is_null(),
    })
}

/// Coerce to a decimal rounded half-to-even at `scale` fractional digits.
pub fn coerce_scaled(value: &DecodedValue, scale: i32) -> Result<Coercion> {
    Ok(Coercion {
        value: Coerced::Decimal(to_decimal_scaled(value, scale)?),
        was_null: value.is_null(),
    })
}

pub fn to_boolean(value: &DecodedValue) -> Result<bool> {
    match value {
        DecodedValue::Null => Ok(false),
        DecodedValue::Integer(v) => Ok(*v != 0),
        DecodedValue::Decimal(v) => Ok(!v.is_zero()),
        DecodedValue::Real(v) => Ok(*v != 0.0),
        DecodedValue::Text(text) => {
            let trimmed = text.trim();
            Ok(!(trimmed.is_empty() || trimmed == "0" || trimmed.eq_ignore_ascii_case("false")))
        }
        other => Err(DriverError::class_cast(other.kind(), TargetKind::Boolean)),
    }
}

pub fn to_byte(value: &DecodedValue, mode: CoercionMode) -> Result<i8> {
    Ok(integral(value, TargetKind::Byte, mode)? as i8)
}

pub fn to_short(value: &DecodedValue, mode: CoercionMode) -> Result<i16> {
    Ok(integral(value, TargetKind::Short, mode)? as i16)
}

pub fn to_int(value: &DecodedValue, mode: CoercionMode) -> Result<i32> {
    Ok(integral(value, TargetKind::Int, mode)? as i32)
}

pub fn to_long(value: &DecodedValue, mode: CoercionMode) -> Result<i64> {
    integral(value, TargetKind::Long, mode)
}

/// Inclusive range of an integral target.
fn integral_bounds(target: TargetKind) -> (i128, i128) {
    match target {
        TargetKind::Byte => (i128::from(i8::MIN), i128::from(i8::MAX)),
        TargetKind::Short => (i128::from(i16::MIN), i128::from(i16::MAX)),
        TargetKind::Int => (i128::from(i32::MIN), i128::from(i32::MAX)),
        _ => (i128::from(i64::MIN), i128::from(i64::MAX)),
    }
}

/// Keep the low-order bits of `v` that fit the target width.
fn wrap_to(v: i128, target: TargetKind) -> i64 {
    match target {
        TargetKind::Byte => i64::from(v as i8),
        TargetKind::Short => i64::from(v as i16),
        TargetKind::Int => i64::from(v as i32),
        _ => v as i64,
    }
}

fn narrow(v: i128, target: TargetKind, mode: CoercionMode) -> Result<i64> {
    let (min, max) = integral_bounds(target);
    if mode == CoercionMode::Strict && !(min..=max).contains(&v) {
        return Err(DriverError::NumericOverflow {
            value: v.to_string(),
            target,
        });
    }
    Ok(wrap_to(v, target))
}

/// Text uses the integer grammar of the target width, so out-of-range text is
/// a parse failure rather than a truncation.
fn parse_integral(text: &str, target: TargetKind) -> Option<i64> {
    let trimmed = text.trim();
    match target {
        TargetKind::Byte => trimmed.parse::<i8>().ok().map(i64::from),
        TargetKind::Short => trimmed.parse::<i16>().ok().map(i64::from),
        TargetKind::Int => trimmed.parse::<i32>().ok().map(i64::from),
        _ => trimmed.parse::<i64>().ok(),
    }
}

fn integral(value: &DecodedValue, target: TargetKind, mode: CoercionMode) -> Result<i64> {
    match value {
        DecodedValue::Null => Ok(0),
        DecodedValue::Integer(v) => narrow(i128::from(*v), target, mode),
        DecodedValue::Decimal(v) => match mode {
            CoercionMode::Truncate => Ok(wrap_to(i128::from(v.trunc_wrapping()), target)),
            CoercionMode::Strict => match v.trunc_i64() {
                Some(whole) => narrow(i128::from(whole), target, mode),
                None => Err(DriverError::NumericOverflow {
                    value: v.to_exponent_string(),
                    target,
                }),
            },
        },
        DecodedValue::Real(v) => {
            if mode == CoercionMode::Strict {
                let (min, max) = integral_bounds(target);
                let truncated = v.trunc();
                if v.is_nan() || truncated < min as f64 || truncated >= (max + 1) as f64 {
                    return Err(DriverError::NumericOverflow {
                        value: format!("{v:?}"),
                        target,
                    });
                }
            }
            // `as` saturates at the i64 range and maps NaN to zero
            Ok(wrap_to(i128::from(*v as i64), target))
        }
        DecodedValue::Text(text) | DecodedValue::Tag(text) => parse_integral(text, target)
            .ok_or_else(|| DriverError::class_cast(value.kind(), target)),
        other => Err(DriverError::class_cast(other.kind(), target)),
    }
}

pub fn to_float(value: &DecodedValue) -> Result<f32> {
    match value {
        DecodedValue::Text(text) | DecodedValue::Tag(text) => text
            .trim()
            .parse::<f32>()
            .map_err(|_| DriverError::class_cast(value.kind(), TargetKind::Float)),
        other => real(other, TargetKind::Float).map(|v| v as f32),
    }
}

pub fn to_double(value: &DecodedValue) -> Result<f64> {
    real(value, TargetKind::Double)
}

fn real(value: &DecodedValue, target: TargetKind) -> Result<f64> {
    match value {
        DecodedValue::Null => Ok(0.0),
        DecodedValue::Integer(v) => Ok(*v as f64),
        DecodedValue::Decimal(v) => Ok(v.to_f64()),
        DecodedValue::Real(v) => Ok(*v),
        DecodedValue::Text(text) | DecodedValue::Tag(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| DriverError::class_cast(value.kind(), target)),
        other => Err(DriverError::class_cast(other.kind(), target)),
    }
}

pub fn to_decimal(value: &DecodedValue) -> Result<Decimal> {
    let cast = || DriverError::class_cast(value.kind(), TargetKind::Decimal);
    match value {
        DecodedValue::Null => Ok(Decimal::zero()),
        DecodedValue::Integer(v) => Ok(Decimal::from_i64(*v)),
        DecodedValue::Decimal(v) => Ok(v.clone()),
        DecodedValue::Real(v) => Decimal::from_f64(*v).ok_or_else(cast),
        DecodedValue::Text(text) | DecodedValue::Tag(text) => {
            Decimal::parse(text.trim()).ok_or_else(cast)
        }
        _ => Err(cast()),
    }
}

pub fn to_decimal_scaled(value: &DecodedValue, scale: i32) -> Result<Decimal> {
    if scale < 0 {
        return Err(DriverError::bad_argument(format!("invalid decimal scale {scale}")));
    }
    let decimal = to_decimal(value)?;
    decimal
        .rescale(scale)
        .ok_or_else(|| DriverError::NumericOverflow {
            value: decimal.to_exponent_string(),
            target: TargetKind::Decimal,
        })
}

/// Canonical text of a real number: shortest round-trip form, integral values
/// keep a trailing `.0`.
pub fn render_real(v: f64) -> String {
    format!("{v:?}")
}

pub fn render_timestamp(v: &NaiveDateTime) -> String {
    v.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Textual rendering used by the string and character-stream targets.
pub fn to_text(value: &DecodedValue, target: TargetKind) -> Result<String> {
    match value {
        DecodedValue::Null => Ok(String::new()),
        DecodedValue::Integer(v) => Ok(v.to_string()),
        DecodedValue::Decimal(v) => Ok(v.to_string()),
        DecodedValue::Real(v) => Ok(render_real(*v)),
        DecodedValue::Text(text) | DecodedValue::Tag(text) => Ok(text.clone()),
        DecodedValue::Binary(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DecodedValue::Timestamp(v) => Ok(render_timestamp(v)),
        DecodedValue::Array(_) => Err(DriverError::class_cast(ValueKind::Array, target)),
    }
}

pub fn to_bytes(value: &DecodedValue, target: TargetKind) -> Result<Bytes> {
    match value {
        DecodedValue::Null => Ok(Bytes::new()),
        DecodedValue::Binary(bytes) => Ok(bytes.clone()),
        other => Err(DriverError::class_cast(other.kind(), target)),
    }
}

/// Placeholder returned for a null temporal column.
fn epoch() -> NaiveDateTime {
    NaiveDateTime::default()
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.time()))
}

pub fn to_timestamp(value: &DecodedValue) -> Result<NaiveDateTime> {
    match value {
        DecodedValue::Null => Ok(epoch()),
        DecodedValue::Timestamp(v) => Ok(*v),
        DecodedValue::Text(text) => parse_timestamp(text)
            .ok_or_else(|| DriverError::class_cast(ValueKind::Text, TargetKind::Timestamp)),
        other => Err(DriverError::class_cast(other.kind(), TargetKind::Timestamp)),
    }
}

pub fn to_date(value: &DecodedValue) -> Result<NaiveDate> {
    match value {
        DecodedValue::Null => Ok(epoch().date()),
        DecodedValue::Timestamp(v) => Ok(v.date()),
        DecodedValue::Text(text) => parse_timestamp(text)
            .map(|ts| ts.date())
            .ok_or_else(|| DriverError::class_cast(ValueKind::Text, TargetKind::Date)),
        other => Err(DriverError::class_cast(other.kind(), TargetKind::Date)),
    }
}

pub fn to_time(value: &DecodedValue) -> Result<NaiveTime> {
    match value {
        DecodedValue::Null => Ok(NaiveTime::MIN),
        DecodedValue::Timestamp(v) => Ok(v.time()),
        DecodedValue::Text(text) => parse_time(text)
            .ok_or_else(|| DriverError::class_cast(ValueKind::Text, TargetKind::Time)),
        other => Err(DriverError::class_cast(other.kind(), TargetKind::Time)),
    }
}

pub fn to_uuid(value: &DecodedValue) -> Result<Uuid> {
    let cast = || DriverError::class_cast(value.kind(), TargetKind::Uuid);
    match value {
        DecodedValue::Null => Ok(Uuid::nil()),
        DecodedValue::Text(text) | DecodedValue::Tag(text) => {
            Uuid::parse_str(text.trim()).map_err(|_| cast())
        }
        DecodedValue::Binary(bytes) => Uuid::from_slice(bytes).map_err(|_| cast()),
        _ => Err(cast()),
    }
}

pub fn to_array(value: &DecodedValue) -> Result<ArrayElements> {
    match value {
        DecodedValue::Null => Ok(ArrayElements::new(Vec::new())),
        DecodedValue::Array(elements) => Ok(ArrayElements::new(elements.clone())),
        other => Err(DriverError::class_cast(other.kind(), TargetKind::Array)),
    }
}

/// Elements of an array value paired with their 1-based ordinal.
///
/// A sub-range taken with `slice` keeps the ordinals of the full array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayElements {
    elements: Vec<DecodedValue>,
    /// Ordinal of `elements[0]`, minus one.
    offset: usize,
    element_kind: Option<ValueKind>,
    next: usize,
}

impl ArrayElements {
    fn new(elements: Vec<DecodedValue>) -> Self {
        let element_kind = elements
            .iter()
            .map(DecodedValue::kind)
            .find(|kind| *kind != ValueKind::Null);
        ArrayElements {
            elements,
            offset: 0,
            element_kind,
            next: 0,
        }
    }

    /// Kind shared by the non-null elements, `None` when every element is null.
    pub fn base_kind(&self) -> Option<ValueKind> {
        self.element_kind
    }

    /// Column type describing one element.
    pub fn base_type(&self) -> SqlType {
        SqlType::for_value_kind(self.element_kind.unwrap_or(ValueKind::Text))
    }

    pub fn base_type_name(&self) -> String {
        self.base_type().type_name()
    }

    /// Up to `count` elements starting at the 1-based `index`.
    ///
    /// `index` must name an element of this array, whatever has already been
    /// iterated; `count` is clamped to the elements that remain from there.
    pub fn slice(&self, index: usize, count: usize) -> Result<ArrayElements> {
        let len = self.elements.len();
        if index == 0 || index > len {
            return Err(DriverError::bad_argument(format!(
                "array index {index} out of range 1..={len}"
            )));
        }
        let start = index - 1;
        let end = start + count.min(len - start);
        Ok(ArrayElements {
            elements: self.elements[start..end].to_vec(),
            offset: self.offset + start,
            element_kind: self.element_kind,
            next: 0,
        })
    }

    /// Walk the remaining elements with the ordinary cursor API.
    ///
    /// The cursor has two columns: `INDEX` (the ordinal) and `VALUE`.
    pub fn into_cursor(self) -> ResultCursor {
        let metadata = ResultMetadata::for_array(self.element_kind);
        let rows = self
            .map(|(ordinal, element)| {
                let ordinal = i64::try_from(ordinal).unwrap_or(i64::MAX);
                vec![DecodedValue::Integer(ordinal), element]
            })
            .collect();
        ResultCursor::new(metadata, Box::new(MaterializedRows::new(rows)))
    }

    /// `slice` followed by `into_cursor`.
    pub fn into_cursor_range(self, index: usize, count: usize) -> Result<ResultCursor> {
        Ok(self.slice(index, count)?.into_cursor())
    }
}

impl Iterator for ArrayElements {
    type Item = (usize, DecodedValue);

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.elements.get(self.next)?.clone();
        self.next += 1;
        Some((self.offset + self.next, element))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.elements.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ArrayElements {}
