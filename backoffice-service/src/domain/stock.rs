//! Stock rules: keep product on-hand quantity consistent with invoice lines.

use rust_decimal::Decimal;
use service_core::error::AppError;

use crate::models::{InvoiceKind, Product};

/// Tolerance for the purchase price drift warning.
const PRICE_DRIFT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 0.01

/// Outcome of applying a line to a product's stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub new_amount: Decimal,
    /// Non-fatal condition the caller should surface, e.g. purchase price
    /// drift against the catalog.
    pub warning: Option<String>,
}

/// Stock effect of creating a line against `product`.
///
/// Sales (`FV`) consume stock and fail when not enough is on hand;
/// purchases (`FC`) add stock without an upper bound. Purchases whose
/// declared cost drifts from the catalog price return a warning instead of
/// failing, recommending a distinct product so cost history stays intact.
pub fn take_for_line(
    product: &Product,
    kind: InvoiceKind,
    amount: Decimal,
    declared_price_buy: Option<Decimal>,
) -> Result<StockChange, AppError> {
    if !product.is_active {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Product '{}' is inactive",
            product.name
        )));
    }

    match kind {
        InvoiceKind::Sale => {
            if product.amount < amount {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Insufficient stock for product '{}': requested {}, available {}",
                    product.name,
                    amount,
                    product.amount
                )));
            }
            Ok(StockChange {
                new_amount: product.amount - amount,
                warning: None,
            })
        }
        InvoiceKind::Purchase => {
            let warning = declared_price_buy.and_then(|declared| {
                let drift = (declared - product.price_buy).abs();
                (drift > PRICE_DRIFT_TOLERANCE).then(|| {
                    format!(
                        "Declared purchase price {} differs from catalog price {} for product '{}'; \
                         create a distinct product to keep cost history intact",
                        declared, product.price_buy, product.name
                    )
                })
            });
            Ok(StockChange {
                new_amount: product.amount + amount,
                warning,
            })
        }
    }
}

/// Stock effect of deleting a line against `product`.
///
/// The reversal mirrors the create: deleting a sale line restocks, deleting
/// a purchase line removes the quantity it added and is blocked if stock
/// would go negative.
pub fn restore_for_line(
    product: &Product,
    kind: InvoiceKind,
    amount: Decimal,
) -> Result<Decimal, AppError> {
    match kind {
        InvoiceKind::Sale => Ok(product.amount + amount),
        InvoiceKind::Purchase => {
            let remaining = product.amount - amount;
            if remaining < Decimal::ZERO {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Deleting this line would leave product '{}' with negative stock ({})",
                    product.name,
                    remaining
                )));
            }
            Ok(remaining)
        }
    }
}
