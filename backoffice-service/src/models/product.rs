//! Product model for backoffice-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog product with on-hand stock.
///
/// `amount` is kept consistent with the sum of sale/purchase quantities
/// recorded in invoice details and must never go negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub amount: Decimal,
    pub price_buy: Decimal,
    pub price_sale: Decimal,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}
