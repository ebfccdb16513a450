//! Backoffice Service - Hotel invoicing, stock and occupancy as a microservice.

pub mod config;
pub mod domain;
pub mod http;
pub mod models;
pub mod services;
pub mod startup;
