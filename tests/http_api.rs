//! Integration tests for the HTTP surface.
//!
//! Requests go through the full axum router backed by in-memory adapters.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use exchange_broker::adapters::http::app;
use exchange_broker::application::ExchangeBroker;
use exchange_broker::config::AppConfig;

// =============================================================================
// Test Infrastructure
// =============================================================================

fn test_app() -> Router {
    let broker = Arc::new(ExchangeBroker::in_memory(&AppConfig::default()));
    app(broker)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn offer(user: &str, terms: Value) -> Value {
    json!({
        "platform": "telegram",
        "external_user_id": user,
        "display_name": "Ana",
        "group_context": "like4like",
        "message_text": "5 likes for 5 likes?",
        "extracted_terms": terms,
        "video_urls": ["https://videos.example/v/abc"],
        "at": "2026-03-01T10:00:00Z"
    })
}

// =============================================================================
// Offers
// =============================================================================

#[tokio::test]
async fn offer_registers_contact_and_opens_negotiation() {
    let app = test_app();

    let (status, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", json!({"like": 5})))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["platform"], "telegram");
    assert_eq!(body["contact"]["external_user_id"], "u-1");
    assert_eq!(body["contact"]["status"], "responded");
    assert_eq!(body["contact"]["reliability_score"], 50);
    assert!(body["negotiation"]["conversation"].is_object());
    assert_eq!(body["negotiation"]["exchange"]["their_proposal"]["like"], 5);
}

#[tokio::test]
async fn offer_with_invalid_terms_is_bad_request() {
    let app = test_app();

    let (status, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", json!({"like": 0})))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn repeated_offers_reuse_the_contact() {
    let app = test_app();

    let (_, first) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", Value::Null))).await;
    let mut second_offer = offer("u-1", Value::Null);
    second_offer["at"] = json!("2026-03-01T10:05:00Z");
    let (status, second) = send(&app, Method::POST, "/api/offers", Some(second_offer)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["contact"]["id"], second["contact"]["id"]);
}

// =============================================================================
// Exchanges
// =============================================================================

#[tokio::test]
async fn report_for_unknown_exchange_is_not_found() {
    let app = test_app();
    let uri = format!("/api/exchanges/{}/execution", uuid::Uuid::new_v4());

    let (status, body) = send(&app, Method::POST, &uri, Some(json!({"results": {"like": true}}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "EXCHANGE_NOT_FOUND");
}

#[tokio::test]
async fn verification_before_execution_is_conflict() {
    let app = test_app();
    let (_, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", json!({"like": 5})))).await;
    let exchange_id = body["negotiation"]["exchange"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/exchanges/{}/verification", exchange_id),
        Some(json!({"results": {"like": true}, "at": "2026-03-01T11:00:00Z"})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE_TRANSITION");

    let (status, detail) = send(&app, Method::GET, &format!("/api/exchanges/{}", exchange_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!detail["transcript"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn execution_without_profiles_is_unavailable() {
    let app = test_app();
    let (_, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", json!({"like": 5})))).await;
    let contact_id = body["contact"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/contacts/{}/execution", contact_id),
        Some(json!({"at": "2026-03-01T10:01:00Z"})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "NO_CAPACITY_AVAILABLE");
}

// =============================================================================
// Contacts
// =============================================================================

#[tokio::test]
async fn block_and_unblock_round_trip() {
    let app = test_app();
    let (_, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", Value::Null))).await;
    let contact_id = body["contact"]["id"].as_str().unwrap().to_string();

    let (status, blocked) = send(
        &app,
        Method::POST,
        &format!("/api/contacts/{}/block", contact_id),
        Some(json!({"reason": "spam", "at": "2026-03-01T10:02:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocked["status"], "blocked");
    assert_eq!(blocked["block_reason"], "spam");

    let mut late_offer = offer("u-1", Value::Null);
    late_offer["at"] = json!("2026-03-01T10:03:00Z");
    let (status, body) = send(&app, Method::POST, "/api/offers", Some(late_offer)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "CONTACT_BLOCKED");

    let (status, unblocked) = send(
        &app,
        Method::POST,
        &format!("/api/contacts/{}/unblock", contact_id),
        Some(json!({"at": "2026-03-01T10:04:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unblocked["status"], "responded");
}

#[tokio::test]
async fn tags_can_be_added_and_removed() {
    let app = test_app();
    let (_, body) = send(&app, Method::POST, "/api/offers", Some(offer("u-1", Value::Null))).await;
    let contact_id = body["contact"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/contacts/{}/tags", contact_id);

    let (status, tagged) = send(&app, Method::POST, &uri, Some(json!({"tag": "Reliable"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tagged["tags"], json!(["reliable"]));

    let (status, untagged) = send(&app, Method::DELETE, &uri, Some(json!({"tag": "reliable"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(untagged["tags"], json!([]));
}

#[tokio::test]
async fn unknown_contact_is_not_found() {
    let app = test_app();

    let (status, _) = send(&app, Method::GET, &format!("/api/contacts/{}", uuid::Uuid::new_v4()), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relaunch_candidates_start_empty() {
    let app = test_app();
    send(&app, Method::POST, "/api/offers", Some(offer("u-1", Value::Null))).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/contacts/relaunch-candidates?min_score=70&min_exchanges=1",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["candidates"], json!([]));
}

// =============================================================================
// Profiles
// =============================================================================

#[tokio::test]
async fn register_profile_then_fail_health_check_bans_it() {
    let app = test_app();

    let (status, profile) = send(
        &app,
        Method::POST,
        "/api/profiles",
        Some(json!({"handle": "runner-1", "max_daily_actions": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["max_daily_actions"], 20);
    assert_eq!(profile["is_banned"], false);

    let id = profile["id"].as_str().unwrap().to_string();
    let (status, profile) = send(
        &app,
        Method::POST,
        &format!("/api/profiles/{}/health", id),
        Some(json!({"healthy": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_banned"], true);

    let (status, list) = send(&app, Method::GET, "/api/profiles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["profiles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_profile_handle_is_rejected() {
    let app = test_app();
    let body = json!({"handle": "runner-1"});

    send(&app, Method::POST, "/api/profiles", Some(body.clone())).await;
    let (status, _) = send(&app, Method::POST, "/api/profiles", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn releasing_an_unknown_lease_reports_false() {
    let app = test_app();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/profiles/leases/{}/release", uuid::Uuid::new_v4()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], false);
}
