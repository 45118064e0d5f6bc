mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use boxoffice_server::routes::create_routes;
use boxoffice_server::state::AppState;

use common::Venue;

fn app(venue: &Venue) -> Router {
    create_routes(AppState::new(venue.bookings(), venue.check_ins()))
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let venue = Venue::new().await;
    let response = app(&venue)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["x-content-type-options"],
        "nosniff"
    );
}

#[tokio::test]
async fn test_paid_booking_then_confirmation() {
    let venue = Venue::new().await;
    let kind = venue.kind(1_200, None).await;

    let (status, body) = post(
        app(&venue),
        &format!("/occurrences/{}/bookings", venue.occurrence.id),
        json!({
            "buyer_id": Uuid::new_v4(),
            "line_items": [{ "ticket_kind_id": kind.id, "quantity": 2 }],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "payment_required");
    assert_eq!(body["data"]["total_amount"], 2_400);
    let handoff_id = body["data"]["handoff_id"].as_str().unwrap().to_string();

    let (status, body) = post(app(&venue), &format!("/payments/{handoff_id}/confirm"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");
}

#[tokio::test]
async fn test_free_booking_is_created() {
    let venue = Venue::new().await;

    let (status, body) = post(
        app(&venue),
        &format!("/occurrences/{}/bookings", venue.occurrence.id),
        json!({ "buyer_id": Uuid::new_v4() }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["ticket_codes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_booking_violations_are_unprocessable() {
    let venue = Venue::new().await;
    let kind = venue.kind(1_200, Some(1)).await;

    let (status, body) = post(
        app(&venue),
        &format!("/occurrences/{}/bookings", venue.occurrence.id),
        json!({
            "buyer_id": Uuid::new_v4(),
            "line_items": [{ "ticket_kind_id": kind.id, "quantity": 2 }],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(
        body["error"]["details"][kind.id.to_string()][0],
        "insufficient stock, 1 remaining"
    );
}

#[tokio::test]
async fn test_unknown_occurrence_is_404() {
    let venue = Venue::new().await;

    let (status, body) = post(
        app(&venue),
        &format!("/occurrences/{}/bookings", Uuid::new_v4()),
        json!({ "buyer_id": Uuid::new_v4() }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_check_in_round_trip() {
    let venue = Venue::new().await;
    let (_, body) = post(
        app(&venue),
        &format!("/occurrences/{}/bookings", venue.occurrence.id),
        json!({ "buyer_id": Uuid::new_v4() }),
    )
    .await;
    let code = body["data"]["ticket_codes"][0].as_str().unwrap().to_string();
    let uri = format!("/occurrences/{}/check-ins", venue.occurrence.id);

    let (status, body) = post(app(&venue), &uri, json!({ "scanned_code": code })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "admitted");
    assert_eq!(body["data"]["first_check_in"], true);

    let (status, body) = post(
        app(&venue),
        &uri,
        json!({ "scanned_code": code, "method": "self_service" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "MAX_CHECK_INS_REACHED");
    assert_eq!(body["error"]["details"]["reasons"][0], "MAX_CHECK_INS_REACHED");
}
