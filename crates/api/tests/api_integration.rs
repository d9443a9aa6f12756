//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::Collaborators;
use common::CustomerId;
use event_store::InMemoryEventStore;
use futures_util::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (Router, Arc<AppState<InMemoryEventStore>>) {
    let (state, dispatcher) = api::create_state(
        InMemoryEventStore::new(),
        Collaborators::in_memory(),
        &Config::default(),
    );
    dispatcher.spawn();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

#[derive(Clone, Copy)]
enum Caller {
    Anonymous,
    Customer(CustomerId),
    Admin,
}

fn request(method: &str, uri: &str, caller: Caller, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    match caller {
        Caller::Anonymous => {}
        Caller::Customer(id) => builder = builder.header("x-customer-id", id.to_string()),
        Caller::Admin => builder = builder.header("x-role", "admin"),
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn create_product(app: &Router, price: i64, stock: u32) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/admin/products",
            Caller::Admin,
            Some(json!({
                "name": "Trail Runner",
                "brand": "Northpeak",
                "category": "shoes",
                "price": price,
                "stock_quantity": stock,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn register_address(app: &Router, customer: CustomerId) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/addresses",
            Caller::Customer(customer),
            Some(json!({ "label": "12 Harbour Road" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

fn order_body(product_id: &str, quantity: u32, address_id: &str) -> Value {
    json!({
        "line_items": [{ "product_id": product_id, "quantity": quantity }],
        "shipping_address_id": address_id,
        "payment_method": "cod",
    })
}

async fn place(app: &Router, customer: CustomerId, body: Value) -> (StatusCode, Value) {
    send(app, request("POST", "/orders", Caller::Customer(customer), Some(body))).await
}

async fn set_status(app: &Router, order_id: &str, status: &str) -> (StatusCode, Value) {
    send(
        app,
        request(
            "PATCH",
            &format!("/orders/{order_id}/status"),
            Caller::Admin,
            Some(json!({ "status": status })),
        ),
    )
    .await
}

async fn deliver(app: &Router, order_id: &str) {
    for status in ["confirmed", "shipping", "delivered"] {
        let (code, body) = set_status(app, order_id, status).await;
        assert_eq!(code, StatusCode::OK, "{body}");
    }
}

mod observability {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = setup();
        let (status, body) = send(&app, request("GET", "/health", Caller::Anonymous, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = setup();
        let response = app
            .oneshot(request("GET", "/metrics", Caller::Anonymous, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("text/plain"));
    }
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn test_place_order() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 250_000, 5).await;
        let address = register_address(&app, customer).await;

        let (status, order) = place(&app, customer, order_body(&product, 2, &address)).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["status"], "pending");
        assert_eq!(order["subtotal"], 500_000);
        assert_eq!(order["total_amount"], 500_000);
        assert_eq!(order["loyalty_points_earned"], 50);
        assert_eq!(order["status_history"].as_array().unwrap().len(), 1);
        assert_eq!(order["status_history"][0]["status"], "pending");
        assert_eq!(order["line_items"][0]["product"]["brand"], "Northpeak");

        let (_, stock) = send(
            &app,
            request("GET", &format!("/products/{product}"), Caller::Anonymous, None),
        )
        .await;
        assert_eq!(stock["stock_quantity"], 3);
    }

    #[tokio::test]
    async fn test_place_order_requires_identity() {
        let (app, _) = setup();
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/orders",
                Caller::Anonymous,
                Some(order_body(
                    &uuid::Uuid::new_v4().to_string(),
                    1,
                    &uuid::Uuid::new_v4().to_string(),
                )),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "unauthorized");
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_reported_and_stock_kept() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 1_000, 1).await;
        let address = register_address(&app, customer).await;

        let (status, body) = place(&app, customer, order_body(&product, 3, &address)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "insufficient_stock");
        assert_eq!(body["details"]["available"], 1);
        assert_eq!(body["details"]["requested"], 3);

        let (_, stock) = send(
            &app,
            request("GET", &format!("/products/{product}"), Caller::Anonymous, None),
        )
        .await;
        assert_eq!(stock["stock_quantity"], 1);
    }

    #[tokio::test]
    async fn test_unknown_discount_releases_stock() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 1_000, 2).await;
        let address = register_address(&app, customer).await;

        let mut body = order_body(&product, 2, &address);
        body["discount_code"] = json!("NOPE0000");
        let (status, error) = place(&app, customer, body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["details"]["reason"], "not_found");

        let (_, stock) = send(
            &app,
            request("GET", &format!("/products/{product}"), Caller::Anonymous, None),
        )
        .await;
        assert_eq!(stock["stock_quantity"], 2);
    }

    #[tokio::test]
    async fn test_foreign_address_is_forbidden() {
        let (app, _) = setup();
        let owner = CustomerId::new();
        let product = create_product(&app, 1_000, 2).await;
        let address = register_address(&app, owner).await;

        let (status, _) = place(&app, CustomerId::new(), order_body(&product, 1, &address)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_discount_is_applied_and_consumed() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 100_000, 5).await;
        let address = register_address(&app, customer).await;
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Admin,
                Some(json!({ "code": "spring25", "percent": 25, "max_uses": 1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let mut body = order_body(&product, 2, &address);
        body["discount_code"] = json!(" SPRING25 ");
        let (status, order) = place(&app, customer, body.clone()).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["discount_code"], "SPRING25");
        assert_eq!(order["discount_amount"], 50_000);
        assert_eq!(order["total_amount"], 150_000);

        let (status, error) = place(&app, customer, body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["details"]["reason"], "usage_limit_reached");

        let (_, code) = send(
            &app,
            request("GET", "/admin/discounts/SPRING25", Caller::Admin, None),
        )
        .await;
        assert_eq!(code["current_uses"], 1);
    }
}

mod discounts {
    use super::*;

    #[tokio::test]
    async fn test_validate_previews_without_consuming() {
        let (app, _) = setup();
        send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Admin,
                Some(json!({ "code": "SAVE2024", "percent": 15, "max_uses": 1 })),
            ),
        )
        .await;

        for _ in 0..2 {
            let (status, quote) = send(
                &app,
                request(
                    "POST",
                    "/discounts/validate",
                    Caller::Anonymous,
                    Some(json!({ "code": "save2024", "subtotal": 99_999 })),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(quote["code"], "SAVE2024");
            assert_eq!(quote["savings"], 14_999);
            assert_eq!(quote["discounted_total"], 85_000);
        }

        let (_, code) = send(
            &app,
            request("GET", "/admin/discounts/SAVE2024", Caller::Admin, None),
        )
        .await;
        assert_eq!(code["current_uses"], 0);
    }

    #[tokio::test]
    async fn test_inactive_code_is_rejected() {
        let (app, _) = setup();
        send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Admin,
                Some(json!({ "code": "PAUSED01", "percent": 10, "max_uses": 3 })),
            ),
        )
        .await;
        let (status, code) = send(
            &app,
            request(
                "PATCH",
                "/admin/discounts/PAUSED01",
                Caller::Admin,
                Some(json!({ "is_active": false })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(code["is_active"], false);

        let (status, error) = send(
            &app,
            request(
                "POST",
                "/discounts/validate",
                Caller::Anonymous,
                Some(json!({ "code": "PAUSED01", "subtotal": 1_000 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["details"]["reason"], "inactive");
    }

    #[tokio::test]
    async fn test_admin_routes_reject_customers() {
        let (app, _) = setup();
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Customer(CustomerId::new()),
                Some(json!({ "code": "SAVE2024", "percent": 15, "max_uses": 1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");
    }

    #[tokio::test]
    async fn test_create_list_and_delete() {
        let (app, _) = setup();
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Admin,
                Some(json!({ "code": "BADCODE", "percent": 10, "max_uses": 1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(
            &app,
            request(
                "POST",
                "/admin/discounts",
                Caller::Admin,
                Some(json!({ "code": "GONE2024", "percent": 10, "max_uses": 1 })),
            ),
        )
        .await;
        let (_, codes) = send(&app, request("GET", "/admin/discounts", Caller::Admin, None)).await;
        assert_eq!(codes.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            request("DELETE", "/admin/discounts/GONE2024", Caller::Admin, None),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            request("GET", "/admin/discounts/GONE2024", Caller::Admin, None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod status {
    use super::*;

    async fn placed_order(app: &Router, customer: CustomerId) -> String {
        let product = create_product(app, 500_000, 5).await;
        let address = register_address(app, customer).await;
        let (status, order) = place(app, customer, order_body(&product, 1, &address)).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_full_walk_then_cancel_fails() {
        let (app, _) = setup();
        let order_id = placed_order(&app, CustomerId::new()).await;

        let (status, body) = set_status(&app, &order_id, "confirmed").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "confirmed");
        assert_eq!(body["entry"]["status"], "confirmed");
        assert_eq!(body["allowed_next"], json!(["shipping", "cancelled"]));

        set_status(&app, &order_id, "shipping").await;
        set_status(&app, &order_id, "delivered").await;

        let (status, body) = set_status(&app, &order_id, "cancelled").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "invalid_transition");
        assert_eq!(body["details"]["from"], "delivered");
        assert_eq!(body["details"]["allowed"], json!([]));

        let (_, order) = send(
            &app,
            request("GET", &format!("/orders/{order_id}"), Caller::Admin, None),
        )
        .await;
        assert_eq!(order["status"], "delivered");
        assert_eq!(order["status_history"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_skipping_a_state_is_rejected() {
        let (app, _) = setup();
        let order_id = placed_order(&app, CustomerId::new()).await;

        let (status, body) = set_status(&app, &order_id, "shipping").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["details"]["allowed"], json!(["confirmed", "cancelled"]));

        let (status, transitions) = send(
            &app,
            request(
                "GET",
                &format!("/orders/{order_id}/transitions"),
                Caller::Admin,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transitions["status"], "pending");
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let (app, _) = setup();
        let (status, _) = set_status(&app, &uuid::Uuid::new_v4().to_string(), "confirmed").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_update_requires_admin() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let order_id = placed_order(&app, customer).await;

        let (status, _) = send(
            &app,
            request(
                "PATCH",
                &format!("/orders/{order_id}/status"),
                Caller::Customer(customer),
                Some(json!({ "status": "cancelled" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_orders_are_owner_only() {
        let (app, _) = setup();
        let owner = CustomerId::new();
        let order_id = placed_order(&app, owner).await;
        let uri = format!("/orders/{order_id}");

        let (status, _) = send(&app, request("GET", &uri, Caller::Customer(owner), None)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            request("GET", &uri, Caller::Customer(CustomerId::new()), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, orders) = send(&app, request("GET", "/orders", Caller::Customer(owner), None)).await;
        assert_eq!(orders.as_array().unwrap().len(), 1);
        assert_eq!(orders[0]["id"], order_id.as_str());
    }
}

mod loyalty {
    use super::*;

    #[tokio::test]
    async fn test_points_arrive_on_delivery() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 500_000, 5).await;
        let address = register_address(&app, customer).await;
        let (_, order) = place(&app, customer, order_body(&product, 1, &address)).await;
        let order_id = order["id"].as_str().unwrap().to_string();

        let (_, balance) = send(&app, request("GET", "/loyalty", Caller::Customer(customer), None)).await;
        assert_eq!(balance["available"], 0);

        deliver(&app, &order_id).await;

        let (status, balance) =
            send(&app, request("GET", "/loyalty", Caller::Customer(customer), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(balance["available"], 50);
        assert_eq!(balance["delivered_orders"], 1);
        assert_eq!(balance["point_value"], 1000);

        let (status, reconciliation) = send(
            &app,
            request(
                "GET",
                &format!("/admin/loyalty/{customer}/reconcile"),
                Caller::Admin,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reconciliation["consistent"], true);
        assert_eq!(reconciliation["drift"], 0);
    }

    #[tokio::test]
    async fn test_overspend_is_rejected() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 10_000, 5).await;
        let address = register_address(&app, customer).await;

        let mut body = order_body(&product, 1, &address);
        body["loyalty_points_used"] = json!(3);
        let (status, error) = place(&app, customer, body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error["kind"], "insufficient_loyalty_points");
        assert_eq!(error["details"]["current"], 0);
        assert_eq!(error["details"]["requested"], 3);
    }
}

mod purchases {
    use super::*;

    #[tokio::test]
    async fn test_verified_after_delivery() {
        let (app, _) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 1_000, 5).await;
        let address = register_address(&app, customer).await;
        let (_, order) = place(&app, customer, order_body(&product, 1, &address)).await;
        let order_id = order["id"].as_str().unwrap().to_string();
        let uri = format!("/purchases/{product}");

        let (_, before) = send(&app, request("GET", &uri, Caller::Customer(customer), None)).await;
        assert_eq!(before["verified"], false);

        deliver(&app, &order_id).await;

        let (status, after) = send(&app, request("GET", &uri, Caller::Customer(customer), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["verified"], true);
        assert_eq!(after["order_id"], order_id.as_str());
    }
}

mod notifications {
    use super::*;

    #[tokio::test]
    async fn test_status_change_is_streamed_to_owner() {
        let (app, state) = setup();
        let customer = CustomerId::new();
        let product = create_product(&app, 1_000, 5).await;
        let address = register_address(&app, customer).await;
        let (_, order) = place(&app, customer, order_body(&product, 1, &address)).await;
        let order_id = order["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request("GET", "/notifications", Caller::Customer(customer), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.registry.is_connected(customer));

        let mut frames = response.into_body().into_data_stream();
        set_status(&app, &order_id, "confirmed").await;

        let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
            .await
            .expect("no notification within 2s")
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.contains("event: order_status"), "{text}");
        assert!(text.contains("\"status\":\"confirmed\""), "{text}");
        assert!(text.contains(&order_id), "{text}");

        drop(frames);
        assert!(!state.registry.is_connected(customer));
    }

    #[tokio::test]
    async fn test_stream_requires_identity() {
        let (app, _) = setup();
        let (status, _) = send(
            &app,
            request("GET", "/notifications", Caller::Anonymous, None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
