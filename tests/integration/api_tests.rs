//! API integration tests against the real router

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use shelfscan_server::{
    api,
    config::ScannerMode,
    scanner::{DeviceFactory, SimulatedDevices},
};

use crate::support::{app_state, test_config, FakeDecoder, FakeDevices, ISBN};

fn app(devices: Arc<dyn DeviceFactory>) -> Router {
    api::create_router(app_state(test_config(), devices))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Scan once and return the issued token
async fn scan_token(app: &Router) -> String {
    let response = app.clone().oneshot(get("/api/v1/scan")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let header_token = response
        .headers()
        .get("x-scan-token")
        .and_then(|value| value.to_str().ok())
        .expect("token header")
        .to_string();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("token cookie")
        .to_string();
    assert!(cookie.starts_with(&format!("scanned_book={}", header_token)));
    assert!(cookie.contains("HttpOnly"));

    let body = body_json(response).await;
    assert_eq!(body["identifier"], ISBN);
    assert!(body["expires_at"].is_string());
    header_token
}

#[tokio::test]
async fn test_health_check() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let response = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_scanner_state() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let body = body_json(app.oneshot(get("/api/v1/ready")).await.unwrap()).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["scanner"], "idle");
}

#[tokio::test]
async fn test_scan_then_verify() {
    let app = app(FakeDevices::new(FakeDecoder::finding(ISBN, 2)));
    let token = scan_token(&app).await;

    let status = body_json(app.clone().oneshot(get("/api/v1/scan/status")).await.unwrap()).await;
    assert_eq!(status["state"], "display_grace");
    assert_eq!(status["result"], ISBN);

    // Header form
    let request = Request::builder()
        .uri(format!("/api/v1/scan/verify/{}", ISBN))
        .header("x-scan-token", &token)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["verified"], true);

    // Cookie form, hyphenated path
    let request = Request::builder()
        .uri("/api/v1/scan/verify/978-6053-60990-2")
        .header(header::COOKIE, format!("scanned_book={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Another item
    let request = Request::builder()
        .uri("/api/v1/scan/verify/9780306406157")
        .header("x-scan-token", &token)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verify_rejects_missing_and_forged_tokens() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/scan/verify/{}", ISBN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let missing = body_json(response).await;

    let request = Request::builder()
        .uri(format!("/api/v1/scan/verify/{}", ISBN))
        .header("x-scan-token", "eyJhbGciOiJIUzI1NiJ9.e30.forged")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let forged = body_json(response).await;

    // No hint about why the token was refused
    assert_eq!(missing["message"], forged["message"]);
    assert_eq!(forged["message"], "Please scan the book again to proceed.");
}

#[tokio::test]
async fn test_scan_timeout() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let response = app.oneshot(get("/api/v1/scan?timeout_secs=1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let body = body_json(response).await;
    assert_eq!(body["error"], "ScanTimeout");
}

#[tokio::test]
async fn test_scan_rejected_while_busy() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let first = tokio::spawn(app.clone().oneshot(get("/api/v1/scan?timeout_secs=1")));
    for _ in 0..100 {
        let status = body_json(app.clone().oneshot(get("/api/v1/scan/status")).await.unwrap()).await;
        if status["state"] == "polling" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let second = app.clone().oneshot(get("/api/v1/scan")).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let cancel = Request::builder()
        .method("POST")
        .uri("/api/v1/scan/cancel")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(cancel).await.unwrap();
    assert_eq!(body_json(response).await["cancelled"], true);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status().as_u16(), 499);
    let body = to_bytes(first.into_body(), 1024).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_cancel_when_idle() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan/cancel")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "cancelled": false }));
}

#[tokio::test]
async fn test_preview_when_idle_ends_empty() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let response = app.oneshot(get("/api/v1/scan/preview")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_write_tag_then_scan_it() {
    let mut config = test_config();
    config.scanner.mode = ScannerMode::Rfid;
    config.simulation.success_rate = 1.0;
    let devices = Arc::new(SimulatedDevices::new(&config.scanner, &config.simulation));
    let app = api::create_router(app_state(config, devices.clone()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan/write")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "text": "9780306406157" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], "9780306406157");
    assert_eq!(devices.identifier(), "9780306406157");

    let response = app.oneshot(get("/api/v1/scan")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["identifier"], "9780306406157");
}

#[tokio::test]
async fn test_write_tag_validation() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan/write")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "text": "" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_write_unsupported_on_camera() {
    let app = app(FakeDevices::new(FakeDecoder::blind()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/scan/write")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "text": ISBN }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "DeviceFailure");
}
