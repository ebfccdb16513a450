//! HTTP API for backoffice-service.

pub mod invoices;

use crate::startup::AppState;
use axum::routing::{delete, get, post};
use axum::Router;

/// Invoice API routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invoices", post(invoices::create_invoice))
        .route(
            "/invoices/:invoice_id",
            get(invoices::get_invoice)
                .patch(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route(
            "/invoices/invoice/:invoice_id/details",
            post(invoices::create_detail),
        )
        .route(
            "/invoices/invoice/:invoice_id/details/bulk",
            post(invoices::create_details_bulk),
        )
        .route(
            "/invoices/details/:detail_id",
            delete(invoices::delete_detail),
        )
}
