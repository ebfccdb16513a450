//! Test helper module for backoffice-service integration tests.
//!
//! Each test gets its own PostgreSQL schema so invoice code sequences and
//! stock levels never bleed between tests. Tests are skipped cleanly when
//! no test database is configured.

#![allow(dead_code)]

use backoffice_service::config::{BackofficeConfig, DatabaseConfig};
use backoffice_service::services::{RecordingEventSink, init_metrics};
use backoffice_service::startup::Application;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_backoffice_{}_{}", std::process::id(), counter)
}

/// Parse a decimal out of a JSON response field.
pub fn field_dec(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("Expected decimal string"))
        .expect("Invalid decimal string")
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub pool: PgPool,
    pub events: Arc<RecordingEventSink>,
    schema_name: String,
    base_url: String,
}

impl TestApp {
    /// Spawn a new test application on a random port, or `None` when
    /// TEST_DATABASE_URL is not set.
    pub async fn spawn() -> Option<Self> {
        let Ok(base_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set - skipping integration test");
            return None;
        };

        init_metrics();

        let schema_name = unique_schema_name();

        // Create schema for test isolation
        let setup_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&setup_pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&setup_pool)
            .await
            .expect("Failed to create test schema");

        setup_pool.close().await;

        // Route every connection into the test schema
        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url_with_schema = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = BackofficeConfig {
            common: CoreConfig { port: 0 },
            service_name: "backoffice-service-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: db_url_with_schema.clone(),
                max_connections: 5,
                min_connections: 1,
            },
        };

        let events = Arc::new(RecordingEventSink::default());
        let app = Application::build_with_events(config, events.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&db_url_with_schema)
            .await
            .expect("Failed to connect to test schema");

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the HTTP server to be ready
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        Some(TestApp {
            address,
            port,
            client,
            pool,
            events,
            schema_name,
            base_url,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute POST")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute GET")
    }

    pub async fn patch(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute PATCH")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute DELETE")
    }

    // -------------------------------------------------------------------------
    // Seed helpers
    // -------------------------------------------------------------------------

    /// Insert the FV (sale) and FC (purchase) invoice types.
    pub async fn seed_invoice_types(&self) -> (Uuid, Uuid) {
        let fv = Uuid::new_v4();
        let fc = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO invoice_types (invoice_type_id, code, name) VALUES ($1, 'FV', 'Factura de venta'), ($2, 'FC', 'Factura de compra')",
        )
        .bind(fv)
        .bind(fc)
        .execute(&self.pool)
        .await
        .expect("Failed to seed invoice types");
        (fv, fc)
    }

    pub async fn seed_user(&self, is_active: bool) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (user_id, name, is_active) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(format!("user-{}", id))
            .bind(is_active)
            .execute(&self.pool)
            .await
            .expect("Failed to seed user");
        id
    }

    pub async fn seed_product(&self, name: &str, amount: &str, price_buy: &str) -> Uuid {
        self.seed_product_with_active(name, amount, price_buy, true)
            .await
    }

    pub async fn seed_product_with_active(
        &self,
        name: &str,
        amount: &str,
        price_buy: &str,
        is_active: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO products (product_id, name, amount, price_buy, price_sale, is_active) VALUES ($1, $2, $3, $4, $3, $5)",
        )
        .bind(id)
        .bind(name)
        .bind(dec(amount))
        .bind(dec(price_buy))
        .bind(is_active)
        .execute(&self.pool)
        .await
        .expect("Failed to seed product");
        id
    }

    pub async fn seed_accommodation(&self, name: &str, state_type: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO accommodations (accommodation_id, name, state_type) VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(name)
        .bind(state_type)
        .execute(&self.pool)
        .await
        .expect("Failed to seed accommodation");
        id
    }

    pub async fn seed_excursion(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO excursions (excursion_id, name) VALUES ($1, $2)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .expect("Failed to seed excursion");
        id
    }

    pub async fn seed_taxe_type(&self, name: &str, percentage: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO taxe_types (taxe_type_id, name, percentage) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(dec(percentage))
            .execute(&self.pool)
            .await
            .expect("Failed to seed tax type");
        id
    }

    pub async fn product_amount(&self, product_id: Uuid) -> Decimal {
        sqlx::query_scalar("SELECT amount FROM products WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read product amount")
    }

    pub async fn accommodation_state(&self, accommodation_id: Uuid) -> Option<String> {
        sqlx::query_scalar("SELECT state_type FROM accommodations WHERE accommodation_id = $1")
            .bind(accommodation_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read accommodation state")
    }

    pub async fn detail_count(&self, invoice_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM invoice_details WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count details")
    }

    /// Create an empty invoice and return (invoice_id, code).
    pub async fn create_invoice(&self, invoice_type_id: Uuid, user_id: Uuid) -> (Uuid, String) {
        let response = self
            .post(
                "/invoices",
                &json!({
                    "invoice_type_id": invoice_type_id,
                    "user_id": user_id,
                }),
            )
            .await;
        assert_eq!(response.status(), 201, "Failed to create invoice");
        let body: Value = response.json().await.expect("Invalid JSON");
        let invoice_id = body["invoice"]["invoice_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("Missing invoice_id");
        let code = body["invoice"]["code"]
            .as_str()
            .expect("Missing code")
            .to_string();
        (invoice_id, code)
    }

    /// Cleanup test resources (schema).
    pub async fn cleanup(&self) {
        self.pool.close().await;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
            .ok();

        if let Some(pool) = pool {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }
}
