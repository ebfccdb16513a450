//! Excursion model for backoffice-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Day-excursion offering. Referenced by invoice details; booking a line
/// against an excursion has no side effects beyond the line itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Excursion {
    pub excursion_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}
