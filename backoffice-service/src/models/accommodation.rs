//! Accommodation model for backoffice-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lodging unit. `state_type` holds the occupancy state label
/// ("Disponible", "Ocupado", "Mantenimiento", "Fuera de Servicio");
/// a null state means the unit was never initialized.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Accommodation {
    pub accommodation_id: Uuid,
    pub name: String,
    pub state_type: Option<String>,
    pub created_utc: DateTime<Utc>,
}
