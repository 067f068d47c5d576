//! Volume arithmetic
//!
//! Exchange volumes carry eight fractional digits. Every volume update goes
//! through [`add_rounded`] so that a fully traded order lands on exactly zero.

use rust_decimal::Decimal;

/// 10^8, the scale of the smallest volume increment.
const SCALE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Half of one scaled unit.
const HALF: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Adds `a` and `b` and rounds the sum to the nearest 1e-8, half up.
///
/// `None` if the scaled sum does not fit in a `Decimal`.
pub fn add_rounded(a: Decimal, b: Decimal) -> Option<Decimal> {
    let scaled = a.checked_add(b)?.checked_mul(SCALE)?.checked_add(HALF)?;
    scaled.floor().checked_div(SCALE).map(|d| d.normalize())
}
