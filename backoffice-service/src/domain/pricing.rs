//! Tax-inclusive pricing for invoice lines.

use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Result of pricing one invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePrice {
    pub price_with_tax: Decimal,
    pub subtotal: Decimal,
}

/// Round a monetary value to 2 decimals, midpoint away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Normalize a tax percentage reference to a fraction.
///
/// Percentages are stored either as a fraction (0.19) or a whole percent
/// (19); anything above 1 is divided by 100. No reference means no tax.
pub fn normalize_rate(percentage: Option<Decimal>) -> Decimal {
    match percentage {
        Some(p) if p > Decimal::ONE => p / Decimal::ONE_HUNDRED,
        Some(p) => p,
        None => Decimal::ZERO,
    }
}

/// Compute the tax-inclusive unit price and line subtotal.
///
/// Every create path (single, bulk, inline invoice details) prices lines
/// through this function so the derived columns cannot drift.
pub fn price_line(
    amount: Decimal,
    price_without_tax: Decimal,
    percentage: Option<Decimal>,
) -> Result<LinePrice, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Amount must be a positive number, got {}",
            amount
        )));
    }
    if price_without_tax < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price without tax must not be negative, got {}",
            price_without_tax
        )));
    }

    let rate = normalize_rate(percentage);
    let price_with_tax = round2(price_without_tax * (Decimal::ONE + rate));
    let subtotal = round2(amount * price_with_tax);

    Ok(LinePrice {
        price_with_tax,
        subtotal,
    })
}
