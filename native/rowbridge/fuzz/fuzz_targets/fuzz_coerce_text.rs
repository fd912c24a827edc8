#![no_main]
//! Structured coercion fuzzing
//!
//! Feeds arbitrary text and bytes through every coercion target in both
//! narrowing modes. Coercion may fail, but must never panic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rowbridge::{coerce_scaled, coerce_with, CoercionMode, DecodedValue, TargetKind};

#[derive(Debug, Arbitrary)]
enum Source<'a> {
    Text(&'a str),
    Tag(&'a str),
    Binary(&'a [u8]),
    Integer(i64),
    Real(f64),
}

#[derive(Debug, Arbitrary)]
struct CoerceInput<'a> {
    source: Source<'a>,
    strict: bool,
    scale: i32,
}

const TARGETS: [TargetKind; 18] = [
    TargetKind::Boolean,
    TargetKind::Byte,
    TargetKind::Short,
    TargetKind::Int,
    TargetKind::Long,
    TargetKind::Float,
    TargetKind::Double,
    TargetKind::Decimal,
    TargetKind::String,
    TargetKind::CharacterStream,
    TargetKind::Bytes,
    TargetKind::BinaryStream,
    TargetKind::Date,
    TargetKind::Time,
    TargetKind::Timestamp,
    TargetKind::Uuid,
    TargetKind::Array,
    TargetKind::Object,
];

fuzz_target!(|input: CoerceInput<'_>| {
    let value = match input.source {
        Source::Text(text) => DecodedValue::Text(text.to_string()),
        Source::Tag(text) => DecodedValue::Tag(text.to_string()),
        Source::Binary(bytes) => DecodedValue::from(bytes.to_vec()),
        Source::Integer(v) => DecodedValue::Integer(v),
        Source::Real(v) => DecodedValue::Real(v),
    };
    let mode = if input.strict {
        CoercionMode::Strict
    } else {
        CoercionMode::Truncate
    };
    for target in TARGETS {
        let _ = coerce_with(&value, target, mode);
    }
    let _ = coerce_scaled(&value, input.scale);
});
