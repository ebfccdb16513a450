//! Occupancy gate for accommodations.
//!
//! The state vocabulary is a closed enum keyed by the Spanish labels the
//! rest of the platform stores; only "Disponible" admits a new line.

use service_core::error::AppError;

/// Accommodation occupancy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyState {
    Available,
    Occupied,
    Maintenance,
    OutOfService,
}

impl OccupancyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyState::Available => "Disponible",
            OccupancyState::Occupied => "Ocupado",
            OccupancyState::Maintenance => "Mantenimiento",
            OccupancyState::OutOfService => "Fuera de Servicio",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "Disponible" => Some(OccupancyState::Available),
            "Ocupado" => Some(OccupancyState::Occupied),
            "Mantenimiento" => Some(OccupancyState::Maintenance),
            "Fuera de Servicio" => Some(OccupancyState::OutOfService),
            _ => None,
        }
    }
}

/// Gate an attach: only an available unit can take a new line, and a
/// successful attach occupies it.
///
/// A unit with no state at all was never initialized and is reported as
/// missing rather than unavailable.
pub fn attach(state_type: Option<&str>, name: &str) -> Result<OccupancyState, AppError> {
    let label = state_type.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!(
            "Accommodation '{}' has no occupancy state",
            name
        ))
    })?;

    match OccupancyState::from_label(label) {
        Some(OccupancyState::Available) => Ok(OccupancyState::Occupied),
        Some(OccupancyState::Occupied) => Err(AppError::Conflict(anyhow::anyhow!(
            "Accommodation '{}' is occupied",
            name
        ))),
        Some(OccupancyState::Maintenance) => Err(AppError::Conflict(anyhow::anyhow!(
            "Accommodation '{}' is in maintenance",
            name
        ))),
        Some(OccupancyState::OutOfService) => Err(AppError::Conflict(anyhow::anyhow!(
            "Accommodation '{}' is out of service",
            name
        ))),
        None => Err(AppError::Conflict(anyhow::anyhow!(
            "Accommodation '{}' is not available",
            name
        ))),
    }
}

/// A detach always frees the unit. No reference counting: single-occupancy
/// semantics are enforced by the state machine, not per date range.
pub fn detach() -> OccupancyState {
    OccupancyState::Available
}
