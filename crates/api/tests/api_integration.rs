//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::UserId;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaConfig;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");
            saga::describe_metrics();
            handle
        })
        .clone()
}

fn setup_with_state() -> (axum::Router, Arc<api::MemoryState>) {
    let state = api::create_memory_state(SagaConfig::default().without_backoff());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> axum::Router {
    setup_with_state().0
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn restock(app: &axum::Router, product: &str, quantity: u32) {
    let (status, _) = send(
        app,
        "POST",
        &format!("/inventory/{product}/restock"),
        Some(serde_json::json!({ "quantity": quantity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn order_body(user_id: UserId, items: &[(&str, u32, i64)]) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id.to_string(),
        "items": items
            .iter()
            .map(|(product_id, quantity, price)| serde_json::json!({
                "product_id": product_id,
                "quantity": quantity,
                "unit_price_cents": price,
            }))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_restock_and_get_inventory() {
    let app = setup();

    restock(&app, "SKU-001", 5).await;
    restock(&app, "SKU-001", 3).await;

    let (status, json) = send(&app, "GET", "/inventory/SKU-001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["product_id"], "SKU-001");
    assert_eq!(json["available"], 8);
}

#[tokio::test]
async fn test_get_unknown_inventory_returns_404() {
    let app = setup();
    let (status, json) = send(&app, "GET", "/inventory/NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_restock_zero_is_rejected() {
    let app = setup();
    let (status, _) = send(
        &app,
        "POST",
        "/inventory/SKU-001/restock",
        Some(serde_json::json!({ "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_place_order_confirms() {
    let app = setup();
    restock(&app, "P1", 5).await;
    let user_id = UserId::new();

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(user_id, &[("P1", 3, 1000)])),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "CONFIRMED");
    assert_eq!(json["user_id"], user_id.to_string());
    assert_eq!(json["total_cents"], 3000);
    assert_eq!(json["currency"], "USD");
    assert_eq!(json["items"][0]["line_total_cents"], 3000);
    assert!(json.get("cancellation").is_none());

    let (_, stock) = send(&app, "GET", "/inventory/P1", None).await;
    assert_eq!(stock["available"], 2);
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();
    restock(&app, "P1", 5).await;

    let (_, created) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 1, 250)])),
    )
    .await;
    let order_id = created["id"].as_str().unwrap();

    let (status, json) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], order_id);
    assert_eq!(json["status"], "CONFIRMED");
}

#[tokio::test]
async fn test_insufficient_stock_returns_409_with_order_id() {
    let app = setup();
    restock(&app, "P1", 1).await;

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 2, 1000)])),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["reason"], "insufficient_stock");
    let order_id = json["order_id"].as_str().unwrap();

    let (status, order) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");
    assert_eq!(order["cancellation"]["code"], "insufficient_stock");
    assert_eq!(order["cancellation"]["available"], 1);

    let (_, stock) = send(&app, "GET", "/inventory/P1", None).await;
    assert_eq!(stock["available"], 1);
}

#[tokio::test]
async fn test_unknown_product_returns_404() {
    let app = setup();

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("GHOST", 1, 100)])),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["reason"], "product_not_found");
}

#[tokio::test]
async fn test_payment_declined_returns_402_and_restores_stock() {
    let (app, state) = setup_with_state();
    restock(&app, "P1", 5).await;
    restock(&app, "P2", 5).await;
    state
        .coordinator
        .payment()
        .set_decline(Some("insufficient funds"))
        .await;

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 2, 100), ("P2", 2, 100)])),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["reason"], "payment_declined");
    assert!(json["order_id"].as_str().is_some());

    for product in ["P1", "P2"] {
        let (_, stock) = send(&app, "GET", &format!("/inventory/{product}"), None).await;
        assert_eq!(stock["available"], 5);
    }
}

#[tokio::test]
async fn test_payment_unavailable_returns_503() {
    let (app, state) = setup_with_state();
    restock(&app, "P1", 5).await;
    state.coordinator.payment().fail_next(u32::MAX).await;

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 1, 100)])),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["reason"], "payment_unavailable");
}

#[tokio::test]
async fn test_invalid_requests_return_400() {
    let app = setup();
    restock(&app, "P1", 5).await;

    let (status, _) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 0, 100)])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 1, -5)])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(serde_json::json!({ "user_id": "nope", "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("user_id"));

    let (_, stock) = send(&app, "GET", "/inventory/P1", None).await;
    assert_eq!(stock["available"], 5);
}

#[tokio::test]
async fn test_malformed_bodies_return_400_with_error_body() {
    let app = setup();
    restock(&app, "P1", 5).await;
    let user_id = UserId::new().to_string();

    for quantity in [serde_json::json!(-1), serde_json::json!(1.5)] {
        let (status, json) = send(
            &app,
            "POST",
            "/orders",
            Some(serde_json::json!({
                "user_id": user_id,
                "items": [{ "product_id": "P1", "quantity": quantity, "unit_price_cents": 100 }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    let (status, json) = send(
        &app,
        "POST",
        "/inventory/P1/restock",
        Some(serde_json::json!({ "quantity": -3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (_, stock) = send(&app, "GET", "/inventory/P1", None).await;
    assert_eq!(stock["available"], 5);
}

#[tokio::test]
async fn test_overflowing_total_returns_400() {
    let app = setup();
    restock(&app, "P1", 5).await;

    let (status, json) = send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 3, i64::MAX / 2)])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("overflow"));

    let (_, stock) = send(&app, "GET", "/inventory/P1", None).await;
    assert_eq!(stock["available"], 5);
}

#[tokio::test]
async fn test_get_order_errors() {
    let app = setup();

    let (status, _) = send(&app, "GET", "/orders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/orders/{}", common::OrderId::new()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_orders_by_user() {
    let app = setup();
    restock(&app, "P1", 3).await;
    let user_id = UserId::new();

    send(&app, "POST", "/orders", Some(order_body(user_id, &[("P1", 1, 100)]))).await;
    send(&app, "POST", "/orders", Some(order_body(user_id, &[("P1", 9, 100)]))).await;
    send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 1, 100)])),
    )
    .await;

    let (status, json) = send(&app, "GET", &format!("/orders?user_id={user_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let orders = json.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().all(|o| o["user_id"] == user_id.to_string()));

    let statuses: Vec<_> = orders.iter().map(|o| o["status"].clone()).collect();
    assert!(statuses.contains(&serde_json::json!("CONFIRMED")));
    assert!(statuses.contains(&serde_json::json!("CANCELLED")));
}

#[tokio::test]
async fn test_list_orders_requires_user_id() {
    let app = setup();
    let (status, _) = send(&app, "GET", "/orders", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    restock(&app, "P1", 5).await;
    send(
        &app,
        "POST",
        "/orders",
        Some(order_body(UserId::new(), &[("P1", 1, 100)])),
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_executions_total"));
    assert!(text.contains("inventory_reservations_total"));
}
