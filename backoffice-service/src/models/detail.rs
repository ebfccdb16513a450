//! Invoice detail (line item) model for backoffice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// One line of an invoice. References exactly one of product, accommodation
/// or excursion. Never mutated after creation; removed by delete only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceDetail {
    pub detail_id: Uuid,
    pub invoice_id: Uuid,
    pub product_id: Option<Uuid>,
    pub accommodation_id: Option<Uuid>,
    pub excursion_id: Option<Uuid>,
    pub taxe_type_id: Option<Uuid>,
    pub amount: Decimal,
    /// Historical cost at the time the line was written. Informational.
    pub price_buy: Option<Decimal>,
    pub price_without_tax: Decimal,
    pub price_with_tax: Decimal,
    pub subtotal: Decimal,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

/// The single entity a detail line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailRef {
    Product(Uuid),
    Accommodation(Uuid),
    Excursion(Uuid),
}

/// Input for creating an invoice detail.
#[derive(Debug, Clone)]
pub struct CreateInvoiceDetail {
    pub product_id: Option<Uuid>,
    pub accommodation_id: Option<Uuid>,
    pub excursion_id: Option<Uuid>,
    pub taxe_type_id: Option<Uuid>,
    pub amount: Decimal,
    pub price_without_tax: Decimal,
    pub price_buy: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl CreateInvoiceDetail {
    /// Resolve the single referenced entity. A payload naming zero or more
    /// than one of product/accommodation/excursion is rejected.
    pub fn reference(&self) -> Result<DetailRef, AppError> {
        let refs = [
            self.product_id.map(DetailRef::Product),
            self.accommodation_id.map(DetailRef::Accommodation),
            self.excursion_id.map(DetailRef::Excursion),
        ];
        let mut found = refs.into_iter().flatten();

        let first = found.next().ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Detail must reference a product, accommodation or excursion"
            ))
        })?;
        if found.next().is_some() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Detail must reference exactly one of product, accommodation or excursion"
            )));
        }
        Ok(first)
    }

    /// Check the optional stay window. Both dates present requires
    /// `start_date < end_date`.
    pub fn validate_dates(&self) -> Result<(), AppError> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Start date {} must be before end date {}",
                    start,
                    end
                )));
            }
        }
        Ok(())
    }
}
