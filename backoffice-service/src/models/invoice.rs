//! Invoice model for backoffice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::CreateInvoiceDetail;

/// Invoice kind, derived from the invoice type code.
///
/// `FV` is a sales invoice: it reduces product stock and occupies
/// accommodations. `FC` is a purchase invoice: it increases stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Sale,
    Purchase,
}

impl InvoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Sale => "FV",
            InvoiceKind::Purchase => "FC",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "FV" => Some(InvoiceKind::Sale),
            "FC" => Some(InvoiceKind::Purchase),
            _ => None,
        }
    }
}

/// Invoice document.
///
/// The monetary aggregates are owned by the totals recomputation in the
/// database layer; `subtotal_with_tax` holds the tax portion of the invoice,
/// not a second subtotal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub code: String,
    pub invoice_type_id: Uuid,
    /// Invoice type code (`FV` or `FC`), joined from invoice_types.
    pub type_code: String,
    pub invoice_electronic: bool,
    pub subtotal_without_tax: Decimal,
    pub subtotal_with_tax: Decimal,
    pub total: Decimal,
    pub cash: Decimal,
    pub transfer: Decimal,
    pub pay_type_id: Option<Uuid>,
    pub paid_type_id: Option<Uuid>,
    pub observations: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub user_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn kind(&self) -> Option<InvoiceKind> {
        InvoiceKind::from_code(&self.type_code)
    }
}

/// Input for creating an invoice, optionally with inline details.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub invoice_type_id: Uuid,
    pub user_id: Uuid,
    pub employee_id: Option<Uuid>,
    pub invoice_electronic: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pay_type_id: Option<Uuid>,
    pub paid_type_id: Option<Uuid>,
    pub observations: Option<String>,
    pub details: Vec<CreateInvoiceDetail>,
}

/// Input for patching an invoice. Does not touch details or totals.
///
/// Absent fields are left unchanged; clearing a stored value back to null
/// is not supported through this input.
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub pay_type_id: Option<Uuid>,
    pub paid_type_id: Option<Uuid>,
    pub invoice_electronic: Option<bool>,
    pub observations: Option<String>,
    pub cash: Option<Decimal>,
    pub transfer: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_codes() {
        assert_eq!(InvoiceKind::from_code("FV"), Some(InvoiceKind::Sale));
        assert_eq!(InvoiceKind::from_code("FC"), Some(InvoiceKind::Purchase));
        assert_eq!(InvoiceKind::from_code("XX"), None);
    }

    #[test]
    fn kind_round_trips_through_code() {
        for kind in [InvoiceKind::Sale, InvoiceKind::Purchase] {
            assert_eq!(InvoiceKind::from_code(kind.as_str()), Some(kind));
        }
    }
}
