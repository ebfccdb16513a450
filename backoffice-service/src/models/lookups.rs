//! Lookup-table models for backoffice-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tax percentage reference. `percentage` is stored either as a fraction
/// (0.19) or a whole percent (19); the pricing calculator normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxeType {
    pub taxe_type_id: Uuid,
    pub name: String,
    pub percentage: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Invoice type: code `FV` (sale) or `FC` (purchase).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceType {
    pub invoice_type_id: Uuid,
    pub code: String,
    pub name: String,
}

/// Customer record, owned by the out-of-scope user service. Only the fields
/// the invoice engine needs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub is_active: bool,
}
