//! Invoice and detail handlers.
//!
//! Handlers validate the payload, delegate to the database service (one
//! transaction per operation) and emit domain events only after the commit
//! returned. Stock warnings surfaced by the pricing path are passed through
//! to the caller instead of failing the request.

use crate::models::{CreateInvoice, CreateInvoiceDetail, Invoice, InvoiceDetail, UpdateInvoice};
use crate::services::metrics::{DETAILS_TOTAL, ERRORS_TOTAL, INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use crate::services::DomainEvent;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn error_label(err: &AppError) -> &'static str {
    match err {
        AppError::ValidationError(_) => "validation",
        AppError::BadRequest(_) => "bad_request",
        AppError::NotFound(_) => "not_found",
        AppError::Conflict(_) => "conflict",
        AppError::ServiceUnavailable => "unavailable",
        AppError::DatabaseError(_) => "database",
        _ => "internal",
    }
}

fn track(err: AppError) -> AppError {
    ERRORS_TOTAL.with_label_values(&[error_label(&err)]).inc();
    err
}

fn record_amount(type_code: &str, amount: Decimal) {
    INVOICE_AMOUNT_TOTAL
        .with_label_values(&[type_code])
        .inc_by(amount.to_f64().unwrap_or(0.0));
}

// -----------------------------------------------------------------------------
// Payloads
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateDetailRequest {
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

impl From<CreateDetailRequest> for CreateInvoiceDetail {
    fn from(req: CreateDetailRequest) -> Self {
        CreateInvoiceDetail {
            product_id: req.product_id,
            accommodation_id: req.accommodation_id,
            excursion_id: req.excursion_id,
            taxe_type_id: req.taxe_type_id,
            amount: req.amount,
            price_without_tax: req.price_without_tax,
            price_buy: req.price_buy,
            start_date: req.start_date,
            end_date: req.end_date,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub invoice_type_id: Uuid,
    pub user_id: Uuid,
    pub employee_id: Option<Uuid>,
    #[serde(default)]
    pub invoice_electronic: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub pay_type_id: Option<Uuid>,
    pub paid_type_id: Option<Uuid>,
    #[validate(length(max = 2000, message = "Observations too long"))]
    pub observations: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub details: Vec<CreateDetailRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    pub pay_type_id: Option<Uuid>,
    pub paid_type_id: Option<Uuid>,
    pub invoice_electronic: Option<bool>,
    #[validate(length(max = 2000, message = "Observations too long"))]
    pub observations: Option<String>,
    pub cash: Option<Decimal>,
    pub transfer: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDetailsBulkRequest {
    #[validate(length(min = 1, message = "At least one detail is required"))]
    #[validate(nested)]
    pub details: Vec<CreateDetailRequest>,
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice: Invoice,
    pub details: Vec<InvoiceDetail>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub invoice: Invoice,
    pub detail: InvoiceDetail,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedInvoiceResponse {
    pub invoice_id: Uuid,
    pub code: String,
}

// -----------------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------------

/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate().map_err(|e| track(e.into()))?;

    let input = CreateInvoice {
        invoice_type_id: payload.invoice_type_id,
        user_id: payload.user_id,
        employee_id: payload.employee_id,
        invoice_electronic: payload.invoice_electronic,
        start_date: payload.start_date,
        end_date: payload.end_date,
        pay_type_id: payload.pay_type_id,
        paid_type_id: payload.paid_type_id,
        observations: payload.observations,
        details: payload.details.into_iter().map(Into::into).collect(),
    };

    let (invoice, details, warnings) =
        state.db.create_invoice(&input).await.map_err(track)?;

    INVOICES_TOTAL
        .with_label_values(&[&invoice.type_code, "created"])
        .inc();
    if !details.is_empty() {
        DETAILS_TOTAL
            .with_label_values(&[&invoice.type_code, "created"])
            .inc_by(details.len() as f64);
    }
    record_amount(&invoice.type_code, invoice.total);

    state.events.emit(DomainEvent::InvoiceCreated {
        invoice_id: invoice.invoice_id,
        code: invoice.code.clone(),
        details_count: details.len(),
    });

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse {
            invoice,
            details,
            warnings,
        }),
    ))
}

/// GET /invoices/:invoice_id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await
        .map_err(track)?
        .ok_or_else(|| track(AppError::NotFound(anyhow::anyhow!("Invoice not found"))))?;
    let details = state.db.get_details(invoice_id).await.map_err(track)?;

    Ok(Json(InvoiceResponse {
        invoice,
        details,
        warnings: Vec::new(),
    }))
}

/// PATCH /invoices/:invoice_id
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    payload.validate().map_err(|e| track(e.into()))?;

    let input = UpdateInvoice {
        pay_type_id: payload.pay_type_id,
        paid_type_id: payload.paid_type_id,
        invoice_electronic: payload.invoice_electronic,
        observations: payload.observations,
        cash: payload.cash,
        transfer: payload.transfer,
    };

    let invoice = state
        .db
        .update_invoice(invoice_id, &input)
        .await
        .map_err(track)?
        .ok_or_else(|| track(AppError::NotFound(anyhow::anyhow!("Invoice not found"))))?;
    let details = state.db.get_details(invoice_id).await.map_err(track)?;

    Ok(Json(InvoiceResponse {
        invoice,
        details,
        warnings: Vec::new(),
    }))
}

/// DELETE /invoices/:invoice_id
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<DeletedInvoiceResponse>, AppError> {
    let (invoice, has_products) = state.db.delete_invoice(invoice_id).await.map_err(track)?;

    INVOICES_TOTAL
        .with_label_values(&[&invoice.type_code, "deleted"])
        .inc();

    state.events.emit(DomainEvent::InvoiceDeleted {
        invoice_id: invoice.invoice_id,
        code: invoice.code.clone(),
        has_products,
    });

    Ok(Json(DeletedInvoiceResponse {
        invoice_id: invoice.invoice_id,
        code: invoice.code,
    }))
}

/// POST /invoices/invoice/:invoice_id/details
pub async fn create_detail(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<CreateDetailRequest>,
) -> Result<(StatusCode, Json<DetailResponse>), AppError> {
    payload.validate().map_err(|e| track(e.into()))?;

    let input: CreateInvoiceDetail = payload.into();
    let (invoice, detail, warnings) = state
        .db
        .add_detail(invoice_id, &input)
        .await
        .map_err(track)?;

    DETAILS_TOTAL
        .with_label_values(&[&invoice.type_code, "created"])
        .inc();
    record_amount(&invoice.type_code, detail.subtotal);

    state.events.emit(DomainEvent::DetailsCreated {
        invoice_id: invoice.invoice_id,
        code: invoice.code.clone(),
        is_product: detail.product_id.is_some(),
        details_count: 1,
    });

    Ok((
        StatusCode::CREATED,
        Json(DetailResponse {
            invoice,
            detail,
            warnings,
        }),
    ))
}

/// POST /invoices/invoice/:invoice_id/details/bulk
pub async fn create_details_bulk(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<CreateDetailsBulkRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate().map_err(|e| track(e.into()))?;

    let inputs: Vec<CreateInvoiceDetail> =
        payload.details.into_iter().map(Into::into).collect();
    let (invoice, details, warnings) = state
        .db
        .add_details_bulk(invoice_id, &inputs)
        .await
        .map_err(track)?;

    DETAILS_TOTAL
        .with_label_values(&[&invoice.type_code, "created"])
        .inc_by(details.len() as f64);
    let added: Decimal = details.iter().map(|d| d.subtotal).sum();
    record_amount(&invoice.type_code, added);

    state.events.emit(DomainEvent::DetailsCreated {
        invoice_id: invoice.invoice_id,
        code: invoice.code.clone(),
        is_product: details.iter().any(|d| d.product_id.is_some()),
        details_count: details.len(),
    });

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse {
            invoice,
            details,
            warnings,
        }),
    ))
}

/// DELETE /invoices/details/:detail_id
pub async fn delete_detail(
    State(state): State<AppState>,
    Path(detail_id): Path<Uuid>,
) -> Result<Json<DetailResponse>, AppError> {
    let (invoice, detail) = state.db.delete_detail(detail_id).await.map_err(track)?;

    DETAILS_TOTAL
        .with_label_values(&[&invoice.type_code, "deleted"])
        .inc();

    state.events.emit(DomainEvent::DetailDeleted {
        invoice_id: invoice.invoice_id,
        code: invoice.code.clone(),
        is_product: detail.product_id.is_some(),
    });

    Ok(Json(DetailResponse {
        invoice,
        detail,
        warnings: Vec::new(),
    }))
}
