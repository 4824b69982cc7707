// tests/integration/api_client.rs
//! HTTP adapter against a mock workout application

use super::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use workout_sink::models::{SportId, UserId, WorkoutId};
use workout_sink::services::{
    CatalogError, ImportError, SportCatalog, UserDirectory, UserLookupError, WorkoutApiClient,
    WorkoutImporter,
};

fn client_for(server: &MockServer, token: Option<&str>) -> WorkoutApiClient {
    WorkoutApiClient::new(
        &server.uri(),
        token.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

// ============================================
// User Directory
// ============================================

#[tokio::test]
async fn test_resolve_user_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sink/users/alice"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "suspended": false
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("secret"));
    assert_eq!(client.resolve_user("alice").await.unwrap(), UserId(12));
}

#[tokio::test]
async fn test_resolve_user_missing_and_suspended() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sink/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sink/users/carol"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3,
            "suspended": true
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert_eq!(
        client.resolve_user("ghost").await.unwrap_err(),
        UserLookupError::NotFound("ghost".to_string())
    );
    assert_eq!(
        client.resolve_user("carol").await.unwrap_err(),
        UserLookupError::Suspended("carol".to_string())
    );
}

#[tokio::test]
async fn test_resolve_user_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sink/users/alice"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "message": "maintenance"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .resolve_user("alice")
        .await
        .unwrap_err();
    assert_eq!(err, UserLookupError::Unavailable("maintenance".to_string()));
}

// ============================================
// Sport Catalog
// ============================================

#[tokio::test]
async fn test_validate_sport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sports/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sports/42"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sports/7"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    assert!(client.validate_sport(SportId(2)).await.unwrap());
    assert!(!client.validate_sport(SportId(42)).await.unwrap());
    assert!(matches!(
        client.validate_sport(SportId(7)).await,
        Err(CatalogError::Unavailable(_))
    ));
}

// ============================================
// Workout Import
// ============================================

#[tokio::test]
async fn test_import_workout_uploads_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sink/workouts"))
        .and(body_string_contains("name=\"user_id\""))
        .and(body_string_contains("filename=\"ride.gpx\""))
        .and(body_string_contains("<gpx>track</gpx>"))
        .and(body_string_contains("Imported from sink folder"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "workout_id": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("ride.gpx");
    std::fs::write(&file, "<gpx>track</gpx>").unwrap();

    let workout = client_for(&server, None)
        .import_workout(UserId(1), SportId(3), &file)
        .await
        .unwrap();
    assert_eq!(workout, WorkoutId("abc123".to_string()));
}

#[tokio::test]
async fn test_import_workout_rejected_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sink/workouts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "error during gpx processing"
        })))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let file = temp.path().join("broken.gpx");
    std::fs::write(&file, "not xml").unwrap();

    let err = client_for(&server, None)
        .import_workout(UserId(1), SportId(1), &file)
        .await
        .unwrap_err();
    match err {
        ImportError::Rejected(message) => assert_eq!(message, "error during gpx processing"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_import_missing_file_is_io_error() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    let err = client_for(&server, None)
        .import_workout(UserId(1), SportId(1), &temp.path().join("gone.fit"))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Io { .. }));
}

// ============================================
// Health Check
// ============================================

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&server)
        .await;

    assert!(client_for(&server, None).health_check().await.unwrap());
}

#[tokio::test]
async fn test_health_check_unreachable() {
    let client = WorkoutApiClient::new(
        "http://127.0.0.1:9",
        None,
        Duration::from_secs(2),
    )
    .unwrap();
    assert!(client.health_check().await.is_err());
}
