use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places kept by the waterfall engine for contribution and
/// allocation amounts.
pub const INTERNAL_SCALE: u32 = 9;

/// Decimal places for ledger-facing amounts.
pub const CENT_SCALE: u32 = 2;

/// Decimal places kept for allocation ratios in canonical form.
pub const RATIO_SCALE: u32 = 6;

/// Default engine tolerance (1e-6).
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Largest pooled total a waterfall run accepts (1e28).
///
/// Every intermediate amount in a run is bounded by the pool, so keeping the
/// pool under this limit leaves headroom below `Decimal::MAX`.
pub const MAX_POOL: Decimal = Decimal::from_parts(268_435_456, 1_042_612_833, 542_101_086, false, 0);

/// Round to cents, half away from zero.
#[inline]
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round to the engine's internal precision.
#[inline]
pub fn round_internal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(INTERNAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a ratio to its canonical precision.
#[inline]
pub fn round_ratio(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a boundary `f64` into a decimal.
///
/// Returns `None` for NaN and infinities.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64(value)
}

/// Sum that clamps at `Decimal::MAX` instead of overflowing.
pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}
