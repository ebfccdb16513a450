//! Detail (line item) integration tests: pricing, stock, occupancy and
//! reversal on delete.

mod common;

use common::{dec, field_dec, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn product_detail_prices_line_and_decrements_stock() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app.seed_product("Kayak doble", "4", "900.00").await;
    let iva = app.seed_taxe_type("IVA", "19").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "taxe_type_id": iva,
                "amount": "2",
                "price_without_tax": "1200.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(field_dec(&body["detail"]["price_with_tax"]), dec("1428.00"));
    assert_eq!(field_dec(&body["detail"]["subtotal"]), dec("2856.00"));
    assert_eq!(field_dec(&body["invoice"]["subtotal_without_tax"]), dec("2400.00"));
    assert_eq!(field_dec(&body["invoice"]["subtotal_with_tax"]), dec("456.00"));
    assert_eq!(field_dec(&body["invoice"]["total"]), dec("2856.00"));
    assert!(body["warnings"].as_array().unwrap().is_empty());

    assert_eq!(app.product_amount(product).await, dec("2"));

    app.cleanup().await;
}

#[tokio::test]
async fn fractional_tax_rate_prices_the_same_as_percentage() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let excursion = app.seed_excursion("Ruta a caballo").await;
    let iva = app.seed_taxe_type("IVA fraccional", "0.19").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "excursion_id": excursion,
                "taxe_type_id": iva,
                "amount": "1",
                "price_without_tax": "1200.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(field_dec(&body["detail"]["price_with_tax"]), dec("1428.00"));

    app.cleanup().await;
}

#[tokio::test]
async fn sale_beyond_stock_is_rejected_and_rolled_back() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app.seed_product("Sombrilla", "2", "12.00").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "amount": "3",
                "price_without_tax": "20.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 409);

    assert_eq!(app.product_amount(product).await, dec("2"));
    assert_eq!(app.detail_count(invoice_id).await, 0);

    app.cleanup().await;
}

#[tokio::test]
async fn inactive_product_is_rejected() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app
        .seed_product_with_active("Descatalogado", "10", "5.00", false)
        .await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "amount": "1",
                "price_without_tax": "8.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_references_are_not_found() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let excursion = app.seed_excursion("Senderismo").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    // Unknown product
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": Uuid::new_v4(),
                "amount": "1",
                "price_without_tax": "8.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 404);

    // Unknown tax type
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "excursion_id": excursion,
                "taxe_type_id": Uuid::new_v4(),
                "amount": "1",
                "price_without_tax": "8.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 404);

    // Unknown invoice
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", Uuid::new_v4()),
            &json!({
                "excursion_id": excursion,
                "amount": "1",
                "price_without_tax": "8.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn detail_must_reference_exactly_one_entity() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app.seed_product("Mapa", "10", "1.00").await;
    let room = app
        .seed_accommodation("Habitación 1", Some("Disponible"))
        .await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    // No reference at all
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({ "amount": "1", "price_without_tax": "5.00" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Two references
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "accommodation_id": room,
                "amount": "1",
                "price_without_tax": "5.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let excursion = app.seed_excursion("Buceo").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "excursion_id": excursion,
                "amount": "0",
                "price_without_tax": "30.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn stay_window_must_be_ordered() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let room = app
        .seed_accommodation("Habitación 2", Some("Disponible"))
        .await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "accommodation_id": room,
                "amount": "1",
                "price_without_tax": "60.00",
                "start_date": "2026-09-10",
                "end_date": "2026-09-08",
            }),
        )
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(
        app.accommodation_state(room).await.as_deref(),
        Some("Disponible")
    );

    app.cleanup().await;
}

#[tokio::test]
async fn accommodation_detail_occupies_the_unit() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let room = app
        .seed_accommodation("Habitación 7", Some("Disponible"))
        .await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "accommodation_id": room,
                "amount": "2",
                "price_without_tax": "60.00",
                "start_date": "2026-09-08",
                "end_date": "2026-09-10",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    assert_eq!(
        app.accommodation_state(room).await.as_deref(),
        Some("Ocupado")
    );

    // The same unit cannot be taken twice
    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "accommodation_id": room,
                "amount": "1",
                "price_without_tax": "60.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn unavailable_accommodation_states_are_rejected() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    for state in ["Mantenimiento", "Fuera de Servicio"] {
        let room = app
            .seed_accommodation(&format!("Habitación {}", state), Some(state))
            .await;
        let response = app
            .post(
                &format!("/invoices/invoice/{}/details", invoice_id),
                &json!({
                    "accommodation_id": room,
                    "amount": "1",
                    "price_without_tax": "60.00",
                }),
            )
            .await;
        assert_eq!(response.status(), 409, "state {} should conflict", state);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn purchase_detail_increments_stock_and_warns_on_price_drift() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (_, fc) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app.seed_product("Botella de vino", "3", "7.50").await;
    let (invoice_id, _) = app.create_invoice(fc, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "amount": "12",
                "price_without_tax": "7.50",
                "price_buy": "9.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.expect("Invalid JSON");
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("catalog price"));

    assert_eq!(app.product_amount(product).await, dec("15"));

    app.cleanup().await;
}

#[tokio::test]
async fn delete_detail_restocks_and_recomputes_totals() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let product = app.seed_product("Camiseta", "10", "4.00").await;
    let excursion = app.seed_excursion("Visita guiada").await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "product_id": product,
                "amount": "4",
                "price_without_tax": "10.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    let detail_id = body["detail"]["detail_id"].as_str().unwrap().to_string();

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "excursion_id": excursion,
                "amount": "1",
                "price_without_tax": "25.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    assert_eq!(app.product_amount(product).await, dec("6"));

    let response = app
        .delete(&format!("/invoices/details/{}", detail_id))
        .await;
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("Invalid JSON");
    assert_eq!(field_dec(&body["invoice"]["total"]), dec("25.00"));
    assert_eq!(field_dec(&body["invoice"]["subtotal_without_tax"]), dec("25.00"));
    assert_eq!(field_dec(&body["invoice"]["subtotal_with_tax"]), dec("0.00"));

    assert_eq!(app.product_amount(product).await, dec("10"));
    assert_eq!(app.detail_count(invoice_id).await, 1);

    // Deleting the same detail twice fails
    let response = app
        .delete(&format!("/invoices/details/{}", detail_id))
        .await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn delete_accommodation_detail_frees_the_unit() {
    let Some(app) = TestApp::spawn().await else {
        return;
    };
    let (fv, _) = app.seed_invoice_types().await;
    let user = app.seed_user(true).await;
    let room = app
        .seed_accommodation("Habitación 21", Some("Disponible"))
        .await;
    let (invoice_id, _) = app.create_invoice(fv, user).await;

    let response = app
        .post(
            &format!("/invoices/invoice/{}/details", invoice_id),
            &json!({
                "accommodation_id": room,
                "amount": "1",
                "price_without_tax": "80.00",
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("Invalid JSON");
    let detail_id = body["detail"]["detail_id"].as_str().unwrap().to_string();
    assert_eq!(
        app.accommodation_state(room).await.as_deref(),
        Some("Ocupado")
    );

    let response = app
        .delete(&format!("/invoices/details/{}", detail_id))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        app.accommodation_state(room).await.as_deref(),
        Some("Disponible")
    );

    app.cleanup().await;
}
