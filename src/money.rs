use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Errors produced when converting amounts for the payment gateway.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount is out of range for minor-unit conversion")]
    OutOfRange,
}

const MINOR_UNITS_PER_MAJOR: Decimal = Decimal::ONE_HUNDRED;

/// Converts a major-unit amount (e.g. rupees) into integer minor units
/// (e.g. paise), rounding half-up at zero decimal places.
///
/// Both single charges and bundle charges go through this conversion so
/// the amount sent to the gateway is bit-exact with locally stored totals.
/// Amounts that cannot be represented as an `i64` after rounding are
/// rejected rather than truncated.
pub fn to_minor_units(amount: Decimal) -> Result<i64, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative);
    }

    let minor = amount
        .checked_mul(MINOR_UNITS_PER_MAJOR)
        .ok_or(MoneyError::OutOfRange)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    minor.to_i64().ok_or(MoneyError::OutOfRange)
}

/// Computes `unit_price * quantity` in decimal arithmetic.
///
/// All order totals are derived through this helper; floating-point
/// multiplication would drift by fractions of a paisa on common prices.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}
