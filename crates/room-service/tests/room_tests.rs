//! Integration tests for the room endpoints.
//!
//! Runs the real router through `TestRoomServer` backed by
//! `MockVideoService`:
//! - Create / list / get / delete
//! - Join, including capacity enforcement and credential contents
//! - Error body format and status mapping
//! - Request deadline and shutdown cancellation

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use common::jwt::{decode_claims, DEFAULT_CLOCK_SKEW};
use reqwest::{Client, StatusCode};
use room_service::services::video_client::mock::MockVideoService;
use room_test_utils::{
    TestRoomServer, TEST_API_KEY, TEST_API_SECRET, TEST_LIVEKIT_URL, TEST_PUBLIC_BASE_URL,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

async fn spawn() -> Result<(Arc<MockVideoService>, TestRoomServer)> {
    let mock = Arc::new(MockVideoService::new());
    let server = TestRoomServer::spawn(mock.clone()).await?;
    Ok((mock, server))
}

async fn create_room(server: &TestRoomServer, body: Value) -> Result<Value> {
    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    Ok(response.json().await?)
}

async fn join(server: &TestRoomServer, room_id: &str, body: Value) -> Result<reqwest::Response> {
    Ok(Client::new()
        .post(format!("{}/api/v1/rooms/{}/join", server.url(), room_id))
        .json(&body)
        .send()
        .await?)
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

// ============================================================================
// POST /api/v1/rooms
// ============================================================================

#[tokio::test]
async fn test_create_room_returns_201_with_join_url() -> Result<()> {
    let (mock, server) = spawn().await?;

    let body = create_room(&server, json!({"name": "Standup", "max_participants": 6})).await?;

    let id = body["room"]["id"].as_str().unwrap();
    assert_eq!(id.len(), 6);
    assert_eq!(body["room"]["name"], "Standup");
    assert_eq!(body["room"]["max_participants"], 6);
    assert_eq!(body["room"]["active_participants"], 0);
    assert_eq!(body["room"]["is_active"], true);
    assert_eq!(
        body["join_url"],
        format!("{}/room/{}", TEST_PUBLIC_BASE_URL, id)
    );
    assert!(mock.has_room(id));

    Ok(())
}

#[tokio::test]
async fn test_create_room_empty_body_uses_defaults() -> Result<()> {
    let (_mock, server) = spawn().await?;

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await?;
    assert_eq!(body["room"]["max_participants"], 20);
    assert!(body["room"].get("name").is_none());

    Ok(())
}

#[tokio::test]
async fn test_create_room_malformed_json_returns_400() -> Result<()> {
    let (mock, server) = spawn().await?;

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "INVALID_ARGUMENT");
    assert_eq!(mock.create_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_create_room_negative_capacity_returns_400() -> Result<()> {
    let (mock, server) = spawn().await?;

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .json(&json!({"max_participants": -3}))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mock.create_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_create_room_provisioning_failure_returns_502() -> Result<()> {
    let (mock, server) = spawn().await?;
    mock.set_fail_create(true);

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "PROVISIONING_FAILED");
    // No upstream detail leaks into the response
    assert_eq!(body["error"]["message"], "Failed to create room");
    assert!(server.registry().is_empty());

    Ok(())
}

// ============================================================================
// GET /api/v1/rooms, GET /api/v1/rooms/{id}
// ============================================================================

#[tokio::test]
async fn test_list_rooms_returns_cached_rooms() -> Result<()> {
    let (_mock, server) = spawn().await?;

    create_room(&server, json!({})).await?;
    create_room(&server, json!({})).await?;

    let body: Value = Client::new()
        .get(format!("{}/api/v1/rooms", server.url()))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["rooms"].as_array().unwrap().len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_get_room_reports_refreshed_occupancy() -> Result<()> {
    let (mock, server) = spawn().await?;

    let created = create_room(&server, json!({})).await?;
    let id = created["room"]["id"].as_str().unwrap();
    mock.set_participants(id, 4);

    let response = Client::new()
        .get(format!("{}/api/v1/rooms/{}", server.url(), id))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["id"], id);
    assert_eq!(body["active_participants"], 4);
    assert_eq!(mock.list_rooms_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_get_unknown_room_returns_404() -> Result<()> {
    let (_mock, server) = spawn().await?;

    let response = Client::new()
        .get(format!("{}/api/v1/rooms/NOPE00", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn test_get_room_listing_failure_returns_502() -> Result<()> {
    let (mock, server) = spawn().await?;
    mock.set_fail_list_rooms(true);

    let response = Client::new()
        .get(format!("{}/api/v1/rooms/ABC123", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "LOOKUP_FAILED");

    Ok(())
}

// ============================================================================
// POST /api/v1/rooms/{id}/join
// ============================================================================

#[tokio::test]
async fn test_join_room_returns_scoped_credential() -> Result<()> {
    let (_mock, server) = spawn().await?;

    let created = create_room(&server, json!({})).await?;
    let id = created["room"]["id"].as_str().unwrap();

    let response = join(&server, id, json!({"name": "  Alice  "})).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["livekit_url"], TEST_LIVEKIT_URL);
    assert_eq!(body["room"]["id"], id);

    let token = body["token"].as_str().unwrap();
    let claims = decode_claims(token, TEST_API_SECRET.as_bytes(), DEFAULT_CLOCK_SKEW)?;
    assert_eq!(claims.sub, "Alice");
    assert_eq!(claims.iss, TEST_API_KEY);
    assert!(claims.video.is_join_scoped_to(id));
    assert_eq!(claims.exp - claims.iat, 6 * 60 * 60);

    Ok(())
}

#[tokio::test]
async fn test_join_materializes_external_room() -> Result<()> {
    let mock = Arc::new(MockVideoService::new().with_room("EXT777", 3, 1));
    let server = TestRoomServer::spawn(mock.clone()).await?;

    let response = join(&server, "EXT777", json!({"name": "Bob"})).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.registry().cached_room("EXT777").is_some());

    Ok(())
}

#[tokio::test]
async fn test_join_full_room_returns_409() -> Result<()> {
    let (mock, server) = spawn().await?;

    let created = create_room(&server, json!({"max_participants": 2})).await?;
    let id = created["room"]["id"].as_str().unwrap();
    mock.set_participants(id, 2);

    let response = join(&server, id, json!({"name": "Carol"})).await?;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "CONFLICT");
    assert_eq!(body["error"]["message"], "Room is full");

    Ok(())
}

#[tokio::test]
async fn test_join_invalid_names_return_400() -> Result<()> {
    let (mock, server) = spawn().await?;

    let created = create_room(&server, json!({})).await?;
    let id = created["room"]["id"].as_str().unwrap();

    for body in [
        json!({}),
        json!({"name": ""}),
        json!({"name": "   "}),
        json!({"name": "x".repeat(51)}),
    ] {
        let response = join(&server, id, body.clone()).await?;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "Expected 400 for {}",
            body
        );
    }

    // Validation happens before the room is resolved
    assert_eq!(mock.list_participants_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_join_unknown_room_returns_404() -> Result<()> {
    let (_mock, server) = spawn().await?;

    let response = join(&server, "NOPE00", json!({"name": "Dave"})).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

// ============================================================================
// DELETE /api/v1/rooms/{id}
// ============================================================================

#[tokio::test]
async fn test_delete_room_returns_204() -> Result<()> {
    let (mock, server) = spawn().await?;

    let created = create_room(&server, json!({})).await?;
    let id = created["room"]["id"].as_str().unwrap();

    let response = Client::new()
        .delete(format!("{}/api/v1/rooms/{}", server.url(), id))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!mock.has_room(id));

    let response = Client::new()
        .get(format!("{}/api/v1/rooms/{}", server.url(), id))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_delete_room_failure_returns_502_and_keeps_room() -> Result<()> {
    let (mock, server) = spawn().await?;

    let created = create_room(&server, json!({})).await?;
    let id = created["room"]["id"].as_str().unwrap();
    mock.set_fail_delete(true);

    let response = Client::new()
        .delete(format!("{}/api/v1/rooms/{}", server.url(), id))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "DELETION_FAILED");
    assert!(server.registry().cached_room(id).is_some());

    Ok(())
}

// ============================================================================
// Deadlines and shutdown
// ============================================================================

#[tokio::test]
async fn test_slow_video_service_returns_504() -> Result<()> {
    let mock = Arc::new(MockVideoService::new());
    let overrides = HashMap::from([("REQUEST_TIMEOUT_SECONDS".to_string(), "1".to_string())]);
    let server = TestRoomServer::spawn_with_vars(mock.clone(), overrides).await?;
    mock.set_latency(Duration::from_secs(3));

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "DEADLINE_EXCEEDED");
    assert!(server.registry().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_requests_after_shutdown_are_cancelled() -> Result<()> {
    let (mock, server) = spawn().await?;
    server.begin_shutdown();

    let response = Client::new()
        .post(format!("{}/api/v1/rooms", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await?;
    assert_eq!(error_code(&body), "CANCELLED");
    assert_eq!(mock.create_calls(), 0);

    Ok(())
}
