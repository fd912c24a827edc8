#![no_main]
//! Fuzz test for decimal parsing and rescaling
//!
//! Any text that parses must render back to the same value and survive
//! rescaling to an arbitrary scale without panicking.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rowbridge::Decimal;

#[derive(Debug, Arbitrary)]
struct DecimalInput<'a> {
    text: &'a str,
    scale: i16,
}

fuzz_target!(|input: DecimalInput<'_>| {
    let Some(decimal) = Decimal::parse(input.text) else {
        return;
    };
    let _ = decimal.rescale(i32::from(input.scale));
    let _ = decimal.trunc_i64();
    let _ = decimal.trunc_wrapping();
    let _ = decimal.to_f64();

    // Plain rendering spells out every zero implied by the scale
    match decimal.scale() {
        0..=4096 => assert_eq!(Decimal::parse(&decimal.to_string()), Some(decimal)),
        -4096..=-1 => assert_eq!(Decimal::parse(&decimal.to_string()), decimal.rescale(0)),
        _ => {}
    }
});
