//! Pure business rules for the invoice line-item engine.
//!
//! Everything here is side-effect free; the database layer loads the rows,
//! applies these rules and persists the outcome inside one transaction.

pub mod occupancy;
pub mod pricing;
pub mod stock;
pub mod totals;
