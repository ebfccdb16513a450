//! Invoice-level monetary aggregates.

use rust_decimal::Decimal;

use crate::domain::pricing::round2;
use crate::models::{Invoice, InvoiceDetail};

/// The three stored aggregates of an invoice.
///
/// `subtotal_with_tax` is the tax portion of the invoice
/// (Σ (price_with_tax − price_without_tax) × amount), not a second subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_without_tax: Decimal,
    pub subtotal_with_tax: Decimal,
    pub total: Decimal,
}

impl InvoiceTotals {
    pub const ZERO: InvoiceTotals = InvoiceTotals {
        subtotal_without_tax: Decimal::ZERO,
        subtotal_with_tax: Decimal::ZERO,
        total: Decimal::ZERO,
    };

    pub fn from_invoice(invoice: &Invoice) -> Self {
        InvoiceTotals {
            subtotal_without_tax: invoice.subtotal_without_tax,
            subtotal_with_tax: invoice.subtotal_with_tax,
            total: invoice.total,
        }
    }
}

/// A line counts toward the aggregates unless it is deleted or carries a
/// negative price or amount.
fn counts(detail: &InvoiceDetail) -> bool {
    detail.deleted_utc.is_none()
        && detail.amount >= Decimal::ZERO
        && detail.price_without_tax >= Decimal::ZERO
        && detail.price_with_tax >= Decimal::ZERO
}

/// Recompute the aggregates from the full set of an invoice's lines.
pub fn recompute(details: &[InvoiceDetail]) -> InvoiceTotals {
    let mut subtotal_without_tax = Decimal::ZERO;
    let mut subtotal_with_tax = Decimal::ZERO;
    let mut total = Decimal::ZERO;

    for detail in details.iter().filter(|d| counts(d)) {
        subtotal_without_tax += detail.price_without_tax * detail.amount;
        subtotal_with_tax += (detail.price_with_tax - detail.price_without_tax) * detail.amount;
        total += detail.price_with_tax * detail.amount;
    }

    InvoiceTotals {
        subtotal_without_tax: round2(subtotal_without_tax),
        subtotal_with_tax: round2(subtotal_with_tax),
        total: round2(total),
    }
}

/// Additive variant for the bulk-create path: fold freshly inserted lines
/// into already-stored aggregates instead of recomputing from scratch.
pub fn add_lines(current: InvoiceTotals, added: &[InvoiceDetail]) -> InvoiceTotals {
    let delta = recompute(added);
    InvoiceTotals {
        subtotal_without_tax: round2(current.subtotal_without_tax + delta.subtotal_without_tax),
        subtotal_with_tax: round2(current.subtotal_with_tax + delta.subtotal_with_tax),
        total: round2(current.total + delta.total),
    }
}
