//! Database service for backoffice-service.
//!
//! All multi-entity mutations (detail create/delete, bulk create, invoice
//! create/delete) run inside a single transaction. Rows whose values feed a
//! read-then-write update (products, accommodations, the invoice itself, the
//! invoice type sequence) are locked with `SELECT ... FOR UPDATE` so two
//! concurrent sales cannot both consume the last unit of stock.

use crate::domain::{occupancy, pricing, stock, totals};
use crate::domain::totals::InvoiceTotals;
use crate::models::{
    Accommodation, CreateInvoice, CreateInvoiceDetail, DetailRef, Invoice, InvoiceDetail,
    InvoiceKind, InvoiceType, Product, TaxeType, UpdateInvoice, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = r#"
    i.invoice_id, i.code, i.invoice_type_id, t.code AS type_code, i.invoice_electronic,
    i.subtotal_without_tax, i.subtotal_with_tax, i.total, i.cash, i.transfer,
    i.pay_type_id, i.paid_type_id, i.observations, i.start_date, i.end_date,
    i.user_id, i.employee_id, i.created_utc, i.deleted_utc
"#;

const DETAIL_COLUMNS: &str = r#"
    detail_id, invoice_id, product_id, accommodation_id, excursion_id, taxe_type_id,
    amount, price_buy, price_without_tax, price_with_tax, subtotal,
    start_date, end_date, created_utc, deleted_utc
"#;

/// Compute the next sequential invoice code for a type, zero-padded.
fn next_code(type_code: &str, last: Option<&str>) -> Result<String, AppError> {
    let next = match last {
        Some(code) => {
            let suffix = code
                .rsplit('-')
                .next()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Malformed invoice code '{}' for type '{}'",
                        code,
                        type_code
                    ))
                })?;
            suffix + 1
        }
        None => 1,
    };
    Ok(format!("{}-{:06}", type_code, next))
}

/// Resolve the invoice kind or report the row as corrupt.
fn kind_of(invoice: &Invoice) -> Result<InvoiceKind, AppError> {
    invoice.kind().ok_or_else(|| {
        AppError::DatabaseError(anyhow::anyhow!(
            "Invoice {} has unknown type code '{}'",
            invoice.invoice_id,
            invoice.type_code
        ))
    })
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "backoffice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get a non-deleted invoice by ID.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices i
            JOIN invoice_types t ON t.invoice_type_id = i.invoice_type_id
            WHERE i.invoice_id = $1 AND i.deleted_utc IS NULL
            "#,
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get the non-deleted details of an invoice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_details(&self, invoice_id: Uuid) -> Result<Vec<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_details"])
            .start_timer();

        let details = sqlx::query_as::<_, InvoiceDetail>(&format!(
            r#"
            SELECT {DETAIL_COLUMNS}
            FROM invoice_details
            WHERE invoice_id = $1 AND deleted_utc IS NULL
            ORDER BY created_utc
            "#,
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get details: {}", e)))?;

        timer.observe_duration();

        Ok(details)
    }

    // -------------------------------------------------------------------------
    // Invoice Lifecycle
    // -------------------------------------------------------------------------

    /// Create an invoice, numbering it within its type sequence, and price
    /// any inline details through the same per-line logic as the detail
    /// endpoints. One transaction.
    #[instrument(skip(self, input), fields(invoice_type_id = %input.invoice_type_id, user_id = %input.user_id))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
    ) -> Result<(Invoice, Vec<InvoiceDetail>, Vec<String>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Lock the invoice type row: it serializes code assignment per type.
        let invoice_type = sqlx::query_as::<_, InvoiceType>(
            r#"
            SELECT invoice_type_id, code, name
            FROM invoice_types
            WHERE invoice_type_id = $1
            FOR UPDATE
            "#,
        )
        .bind(input.invoice_type_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice type: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice type not found")))?;

        let kind = InvoiceKind::from_code(&invoice_type.code).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Invoice type '{}' has unknown code '{}'",
                invoice_type.name,
                invoice_type.code
            ))
        })?;

        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, name, is_active FROM users WHERE user_id = $1",
        )
        .bind(input.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get user: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

        if !user.is_active {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "User '{}' is inactive",
                user.name
            )));
        }

        if let Some(pay_type_id) = input.pay_type_id {
            Self::require_lookup(&mut tx, "pay_types", "pay_type_id", pay_type_id, "Pay type")
                .await?;
        }
        if let Some(paid_type_id) = input.paid_type_id {
            Self::require_lookup(
                &mut tx,
                "paid_types",
                "paid_type_id",
                paid_type_id,
                "Paid type",
            )
            .await?;
        }

        // Length-first ordering keeps the lookup correct once a sequence
        // outgrows the six-digit padding.
        let last_code: Option<String> = sqlx::query_scalar(
            r#"
            SELECT code FROM invoices
            WHERE invoice_type_id = $1
            ORDER BY length(code) DESC, code DESC
            LIMIT 1
            "#,
        )
        .bind(input.invoice_type_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to read last code: {}", e)))?;

        let code = next_code(&invoice_type.code, last_code.as_deref())?;

        let invoice_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, code, invoice_type_id, invoice_electronic,
                pay_type_id, paid_type_id, observations, start_date, end_date,
                user_id, employee_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice_id)
        .bind(&code)
        .bind(input.invoice_type_id)
        .bind(input.invoice_electronic)
        .bind(input.pay_type_id)
        .bind(input.paid_type_id)
        .bind(&input.observations)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.user_id)
        .bind(input.employee_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        let mut invoice = Self::load_invoice_in_tx(&mut tx, invoice_id, false)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!("Invoice vanished after insert"))
            })?;

        let mut details = Vec::with_capacity(input.details.len());
        let mut warnings = Vec::new();
        for payload in &input.details {
            let (detail, warning) =
                Self::insert_detail_in_tx(&mut tx, &invoice, kind, payload).await?;
            details.push(detail);
            warnings.extend(warning);
        }

        if !details.is_empty() {
            let aggregates = totals::recompute(&details);
            Self::persist_totals_in_tx(&mut tx, invoice_id, aggregates).await?;
            invoice.subtotal_without_tax = aggregates.subtotal_without_tax;
            invoice.subtotal_with_tax = aggregates.subtotal_with_tax;
            invoice.total = aggregates.total;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            code = %invoice.code,
            details = details.len(),
            "Invoice created"
        );

        Ok((invoice, details, warnings))
    }

    /// Patch invoice header fields. Details and totals are untouched.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices i
            SET pay_type_id = COALESCE($2, i.pay_type_id),
                paid_type_id = COALESCE($3, i.paid_type_id),
                invoice_electronic = COALESCE($4, i.invoice_electronic),
                observations = COALESCE($5, i.observations),
                cash = COALESCE($6, i.cash),
                transfer = COALESCE($7, i.transfer)
            FROM invoice_types t
            WHERE t.invoice_type_id = i.invoice_type_id
              AND i.invoice_id = $1
              AND i.deleted_utc IS NULL
            RETURNING {INVOICE_COLUMNS}
            "#,
        ))
        .bind(invoice_id)
        .bind(input.pay_type_id)
        .bind(input.paid_type_id)
        .bind(input.invoice_electronic)
        .bind(&input.observations)
        .bind(input.cash)
        .bind(input.transfer)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?;

        timer.observe_duration();

        if let Some(ref inv) = invoice {
            info!(invoice_id = %inv.invoice_id, "Invoice updated");
        }

        Ok(invoice)
    }

    /// Delete a whole invoice, reversing the stock effect of every detail
    /// and freeing every referenced accommodation, then hard-deleting the
    /// details and the invoice row. One transaction; a reversal that would
    /// leave negative stock aborts the whole operation.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(Invoice, bool), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Soft-deleted invoices can still be reconciled, so no deleted filter.
        let invoice = Self::load_invoice_in_tx(&mut tx, invoice_id, true)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let kind = kind_of(&invoice)?;

        // Stock reconciliation covers every remaining detail row, soft-deleted
        // included.
        let details = sqlx::query_as::<_, InvoiceDetail>(&format!(
            r#"
            SELECT {DETAIL_COLUMNS}
            FROM invoice_details
            WHERE invoice_id = $1
            ORDER BY created_utc
            "#,
        ))
        .bind(invoice_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load details: {}", e)))?;

        for detail in &details {
            if let Some(product_id) = detail.product_id {
                if let Some(product) =
                    Self::lock_product_in_tx(&mut tx, product_id).await?
                {
                    let new_amount = stock::restore_for_line(&product, kind, detail.amount)?;
                    Self::set_product_amount_in_tx(&mut tx, product_id, new_amount).await?;
                }
            }
            if let Some(accommodation_id) = detail.accommodation_id {
                Self::free_accommodation_in_tx(&mut tx, accommodation_id).await?;
            }
        }

        sqlx::query("DELETE FROM invoice_details WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete details: {}", e))
            })?;

        sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        let has_products = details.iter().any(|d| d.product_id.is_some());
        info!(
            invoice_id = %invoice.invoice_id,
            code = %invoice.code,
            details = details.len(),
            "Invoice deleted"
        );

        Ok((invoice, has_products))
    }

    // -------------------------------------------------------------------------
    // Detail Orchestration
    // -------------------------------------------------------------------------

    /// Create a single detail and fully recompute the invoice aggregates.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn add_detail(
        &self,
        invoice_id: Uuid,
        input: &CreateInvoiceDetail,
    ) -> Result<(Invoice, InvoiceDetail, Vec<String>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_detail"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut invoice = Self::load_invoice_in_tx(&mut tx, invoice_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let kind = kind_of(&invoice)?;

        let (detail, warning) = Self::insert_detail_in_tx(&mut tx, &invoice, kind, input).await?;

        let details = Self::load_live_details_in_tx(&mut tx, invoice_id).await?;
        let aggregates = totals::recompute(&details);
        Self::persist_totals_in_tx(&mut tx, invoice_id, aggregates).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        invoice.subtotal_without_tax = aggregates.subtotal_without_tax;
        invoice.subtotal_with_tax = aggregates.subtotal_with_tax;
        invoice.total = aggregates.total;

        info!(
            invoice_id = %invoice_id,
            detail_id = %detail.detail_id,
            subtotal = %detail.subtotal,
            "Detail added"
        );

        Ok((invoice, detail, warning.into_iter().collect()))
    }

    /// Create many details atomically. The aggregates are updated additively
    /// from the freshly inserted lines; the invoice row lock taken here keeps
    /// the addition race-free. The first failing line rolls back all of them.
    #[instrument(skip(self, inputs), fields(invoice_id = %invoice_id, count = inputs.len()))]
    pub async fn add_details_bulk(
        &self,
        invoice_id: Uuid,
        inputs: &[CreateInvoiceDetail],
    ) -> Result<(Invoice, Vec<InvoiceDetail>, Vec<String>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_details_bulk"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let mut invoice = Self::load_invoice_in_tx(&mut tx, invoice_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let kind = kind_of(&invoice)?;

        let mut details = Vec::with_capacity(inputs.len());
        let mut warnings = Vec::new();
        for payload in inputs {
            let (detail, warning) =
                Self::insert_detail_in_tx(&mut tx, &invoice, kind, payload).await?;
            details.push(detail);
            warnings.extend(warning);
        }

        let aggregates = totals::add_lines(InvoiceTotals::from_invoice(&invoice), &details);
        Self::persist_totals_in_tx(&mut tx, invoice_id, aggregates).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        invoice.subtotal_without_tax = aggregates.subtotal_without_tax;
        invoice.subtotal_with_tax = aggregates.subtotal_with_tax;
        invoice.total = aggregates.total;

        info!(
            invoice_id = %invoice_id,
            details = details.len(),
            "Details added in bulk"
        );

        Ok((invoice, details, warnings))
    }

    /// Delete one detail, reversing its stock and occupancy effects, then
    /// fully recompute the invoice aggregates.
    #[instrument(skip(self), fields(detail_id = %detail_id))]
    pub async fn delete_detail(&self, detail_id: Uuid) -> Result<(Invoice, InvoiceDetail), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_detail"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let detail = sqlx::query_as::<_, InvoiceDetail>(&format!(
            r#"
            SELECT {DETAIL_COLUMNS}
            FROM invoice_details
            WHERE detail_id = $1 AND deleted_utc IS NULL
            FOR UPDATE
            "#,
        ))
        .bind(detail_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load detail: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice detail not found")))?;

        let mut invoice = Self::load_invoice_in_tx(&mut tx, detail.invoice_id, false)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let kind = kind_of(&invoice)?;

        if let Some(product_id) = detail.product_id {
            let product = Self::lock_product_in_tx(&mut tx, product_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;
            let new_amount = stock::restore_for_line(&product, kind, detail.amount)?;
            Self::set_product_amount_in_tx(&mut tx, product_id, new_amount).await?;
        }

        if let Some(accommodation_id) = detail.accommodation_id {
            Self::free_accommodation_in_tx(&mut tx, accommodation_id).await?;
        }

        sqlx::query("DELETE FROM invoice_details WHERE detail_id = $1")
            .bind(detail_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete detail: {}", e))
            })?;

        let details = Self::load_live_details_in_tx(&mut tx, detail.invoice_id).await?;
        let aggregates = totals::recompute(&details);
        Self::persist_totals_in_tx(&mut tx, detail.invoice_id, aggregates).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        invoice.subtotal_without_tax = aggregates.subtotal_without_tax;
        invoice.subtotal_with_tax = aggregates.subtotal_with_tax;
        invoice.total = aggregates.total;

        info!(
            invoice_id = %invoice.invoice_id,
            detail_id = %detail_id,
            "Detail deleted"
        );

        Ok((invoice, detail))
    }

    // -------------------------------------------------------------------------
    // Transaction helpers
    // -------------------------------------------------------------------------

    async fn load_invoice_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Invoice>, AppError> {
        let deleted_filter = if include_deleted {
            ""
        } else {
            "AND i.deleted_utc IS NULL"
        };
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices i
            JOIN invoice_types t ON t.invoice_type_id = i.invoice_type_id
            WHERE i.invoice_id = $1 {deleted_filter}
            FOR UPDATE OF i
            "#,
        ))
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load invoice: {}", e)))?;

        Ok(invoice)
    }

    async fn load_live_details_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceDetail>, AppError> {
        let details = sqlx::query_as::<_, InvoiceDetail>(&format!(
            r#"
            SELECT {DETAIL_COLUMNS}
            FROM invoice_details
            WHERE invoice_id = $1 AND deleted_utc IS NULL
            ORDER BY created_utc
            "#,
        ))
        .bind(invoice_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load details: {}", e)))?;

        Ok(details)
    }

    async fn lock_product_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, name, amount, price_buy, price_sale, is_active, created_utc
            FROM products
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock product: {}", e)))?;

        Ok(product)
    }

    async fn set_product_amount_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        new_amount: Decimal,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE products SET amount = $2 WHERE product_id = $1")
            .bind(product_id)
            .bind(new_amount)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update stock: {}", e))
            })?;
        Ok(())
    }

    /// Reset an accommodation to "Disponible". A vanished row is skipped
    /// silently so a detail or invoice delete never fails on it.
    async fn free_accommodation_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        accommodation_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE accommodations SET state_type = $2 WHERE accommodation_id = $1")
            .bind(accommodation_id)
            .bind(occupancy::detach().as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to free accommodation: {}", e))
            })?;
        Ok(())
    }

    async fn require_lookup(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        column: &str,
        id: Uuid,
        label: &str,
    ) -> Result<(), AppError> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {table} WHERE {column} = $1)",
        ))
        .bind(id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check {}: {}", table, e))
        })?;

        if !exists {
            return Err(AppError::NotFound(anyhow::anyhow!("{} not found", label)));
        }
        Ok(())
    }

    /// Validate, price and persist one detail line, applying stock and
    /// occupancy side effects inside the caller's transaction.
    async fn insert_detail_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        invoice: &Invoice,
        kind: InvoiceKind,
        input: &CreateInvoiceDetail,
    ) -> Result<(InvoiceDetail, Option<String>), AppError> {
        let reference = input.reference()?;
        input.validate_dates()?;

        let percentage = match input.taxe_type_id {
            Some(taxe_type_id) => {
                let taxe_type = sqlx::query_as::<_, TaxeType>(
                    r#"
                    SELECT taxe_type_id, name, percentage, created_utc
                    FROM taxe_types
                    WHERE taxe_type_id = $1
                    "#,
                )
                .bind(taxe_type_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get tax type: {}", e))
                })?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tax type not found")))?;
                Some(taxe_type.percentage)
            }
            None => None,
        };

        let priced = pricing::price_line(input.amount, input.price_without_tax, percentage)?;

        let mut warning = None;
        match reference {
            DetailRef::Product(product_id) => {
                let product = Self::lock_product_in_tx(tx, product_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;
                let change = stock::take_for_line(&product, kind, input.amount, input.price_buy)?;
                Self::set_product_amount_in_tx(tx, product_id, change.new_amount).await?;
                warning = change.warning;
            }
            DetailRef::Accommodation(accommodation_id) => {
                let accommodation = sqlx::query_as::<_, Accommodation>(
                    r#"
                    SELECT accommodation_id, name, state_type, created_utc
                    FROM accommodations
                    WHERE accommodation_id = $1
                    FOR UPDATE
                    "#,
                )
                .bind(accommodation_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to lock accommodation: {}", e))
                })?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Accommodation not found"))
                })?;

                let next_state =
                    occupancy::attach(accommodation.state_type.as_deref(), &accommodation.name)?;
                sqlx::query(
                    "UPDATE accommodations SET state_type = $2 WHERE accommodation_id = $1",
                )
                .bind(accommodation_id)
                .bind(next_state.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to occupy accommodation: {}",
                        e
                    ))
                })?;
            }
            DetailRef::Excursion(excursion_id) => {
                Self::require_lookup(tx, "excursions", "excursion_id", excursion_id, "Excursion")
                    .await?;
            }
        }

        let detail_id = Uuid::new_v4();
        let detail = sqlx::query_as::<_, InvoiceDetail>(&format!(
            r#"
            INSERT INTO invoice_details (
                detail_id, invoice_id, product_id, accommodation_id, excursion_id,
                taxe_type_id, amount, price_buy, price_without_tax, price_with_tax,
                subtotal, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {DETAIL_COLUMNS}
            "#,
        ))
        .bind(detail_id)
        .bind(invoice.invoice_id)
        .bind(input.product_id)
        .bind(input.accommodation_id)
        .bind(input.excursion_id)
        .bind(input.taxe_type_id)
        .bind(input.amount)
        .bind(input.price_buy)
        .bind(input.price_without_tax)
        .bind(priced.price_with_tax)
        .bind(priced.subtotal)
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert detail: {}", e)))?;

        Ok((detail, warning))
    }

    /// Persist recomputed aggregates onto the invoice row.
    async fn persist_totals_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: Uuid,
        aggregates: InvoiceTotals,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET subtotal_without_tax = $2,
                subtotal_with_tax = $3,
                total = $4
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(aggregates.subtotal_without_tax)
        .bind(aggregates.subtotal_with_tax)
        .bind(aggregates.total)
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to persist totals: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice no longer exists"
            )));
        }
        Ok(())
    }
}
