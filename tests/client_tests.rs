//! Room fetcher against a stub HTTP server: detail merging, fallbacks, and
//! the error taxonomy.

mod common;

use std::time::Duration;

use serde_json::json;
use study_rooms::client::RoomApi;
use study_rooms::model::{RoomId, RoomMode, RoomPayload};
use study_rooms::StudyRoomError;

use common::{Reply, StubServer};

const TOKEN: Option<&str> = Some("secret");

fn api(server: &StubServer) -> RoomApi {
    RoomApi::builder(server.base_url.clone())
        .detail_timeout(Duration::from_millis(300))
        .build()
}

fn payload() -> RoomPayload {
    RoomPayload {
        name: "Calculus".into(),
        capacity: 6,
        date: "2024-03-05".into(),
        start_time: "09:00".into(),
        end_time: "10:30".into(),
        mode: RoomMode::Offline,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// list_rooms
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_merges_detail_over_summary() {
    let server = StubServer::start().await;
    server.route(
        "GET",
        "/study_rooms",
        Reply::json(json!([{"room_id": 1, "name": "Summary name", "capacity": 4}])),
    );
    server.route(
        "GET",
        "/study_rooms/1",
        Reply::json(json!({"room_id": 1, "name": "Detail name", "host": "ada"})),
    );

    let rooms = api(&server).list_rooms(TOKEN).await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name.as_deref(), Some("Detail name"));
    assert_eq!(rooms[0].host.as_deref(), Some("ada"));
    assert_eq!(rooms[0].capacity, Some(4));
}

#[tokio::test]
async fn test_list_sends_bearer_token() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::json(json!([])));
    api(&server).list_rooms(TOKEN).await.unwrap();
    let reqs = server.requests();
    assert_eq!(reqs[0].authorization.as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn test_list_accepts_rooms_wrapper() {
    let server = StubServer::start().await;
    server.route(
        "GET",
        "/study_rooms",
        Reply::json(json!({"rooms": [{"room_id": 2, "name": "Wrapped"}]})),
    );
    server.route("GET", "/study_rooms/2", Reply::json(json!({"room": {"room_id": 2}})));
    let rooms = api(&server).list_rooms(TOKEN).await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name.as_deref(), Some("Wrapped"));
}

#[tokio::test]
async fn test_failed_detail_falls_back_to_summary() {
    let server = StubServer::start().await;
    server.route(
        "GET",
        "/study_rooms",
        Reply::json(json!([{"room_id": 1, "name": "A"}, {"room_id": 2, "name": "B"}])),
    );
    server.route("GET", "/study_rooms/1", Reply::empty(500));
    server.route("GET", "/study_rooms/2", Reply::json(json!({"room_id": 2, "name": "B2"})));

    let rooms = api(&server).list_rooms(TOKEN).await.unwrap();
    let names: Vec<_> = rooms.iter().map(|r| r.name.clone().unwrap_or_default()).collect();
    assert_eq!(names, ["A", "B2"]);
}

#[tokio::test]
async fn test_slow_detail_times_out_to_summary() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::json(json!([{"room_id": 1, "name": "A"}])));
    server.route(
        "GET",
        "/study_rooms/1",
        Reply::json(json!({"room_id": 1, "name": "late"})).delayed(Duration::from_secs(2)),
    );

    let rooms = api(&server).list_rooms(TOKEN).await.unwrap();
    assert_eq!(rooms[0].name.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_details_disabled_skips_per_room_requests() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::json(json!([{"room_id": 1}, {"room_id": 2}])));
    let api = RoomApi::builder(server.base_url.clone()).fetch_details(false).build();
    assert_eq!(api.list_rooms(TOKEN).await.unwrap().len(), 2);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_non_object_items_are_skipped() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::json(json!([{"room_id": 1}, "junk", 7])));
    server.route("GET", "/study_rooms/1", Reply::json(json!({})));
    let rooms = api(&server).list_rooms(TOKEN).await.unwrap();
    assert_eq!(rooms.len(), 1);
}

#[tokio::test]
async fn test_html_body_is_non_json() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::html("<!doctype html><p>login</p>"));
    let err = api(&server).list_rooms(TOKEN).await.unwrap_err();
    match err {
        StudyRoomError::NonJson { excerpt, .. } => assert!(excerpt.starts_with("<!doctype")),
        other => panic!("expected NonJson, got {other:?}"),
    }
}

#[tokio::test]
async fn test_truncated_json_is_parse_error() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::raw(200, "application/json", "[{\"room_id\": 1"));
    let err = api(&server).list_rooms(TOKEN).await.unwrap_err();
    assert!(matches!(err, StudyRoomError::JsonParse { .. }), "{err:?}");
}

#[tokio::test]
async fn test_scalar_collection_body_is_parse_error() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::json(json!(42)));
    let err = api(&server).list_rooms(TOKEN).await.unwrap_err();
    match err {
        StudyRoomError::JsonParse { detail, excerpt, .. } => {
            assert!(detail.ends_with("got number"), "{detail}");
            assert_eq!(excerpt, "42");
        }
        other => panic!("expected JsonParse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_http() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms", Reply::empty(500));
    let err = api(&server).list_rooms(TOKEN).await.unwrap_err();
    assert!(matches!(err, StudyRoomError::Http { status: 500, .. }), "{err:?}");
}

#[tokio::test]
async fn test_missing_token_sends_nothing() {
    let server = StubServer::start().await;
    let err = api(&server).list_rooms(None).await.unwrap_err();
    assert!(matches!(err, StudyRoomError::AuthMissing));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_is_connect_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = RoomApi::builder(format!("http://{addr}/api")).build();
    let err = api.list_rooms(TOKEN).await.unwrap_err();
    assert!(matches!(err, StudyRoomError::Connect { .. }), "{err:?}");
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_posts_payload() {
    let server = StubServer::start().await;
    server.route("POST", "/study_rooms", Reply::json(json!({"room_id": 12, "name": "Calculus"})));
    let record = api(&server).create_room(TOKEN, &payload()).await.unwrap();
    assert_eq!(record.key(), Some(RoomId::from(12)));

    let sent: serde_json::Value = serde_json::from_str(&server.requests()[0].body).unwrap();
    assert_eq!(sent["name"], "Calculus");
    assert_eq!(sent["start_time"], "09:00");
}

#[tokio::test]
async fn test_invalid_payload_never_sent() {
    let server = StubServer::start().await;
    let bad = RoomPayload {
        start_time: "9am".into(),
        ..payload()
    };
    let err = api(&server).create_room(TOKEN, &bad).await.unwrap_err();
    assert!(matches!(err, StudyRoomError::Invalid(_)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_rejected_mutation_carries_server_message() {
    let server = StubServer::start().await;
    server.route(
        "PUT",
        "/study_rooms/3",
        Reply::raw(403, "application/json", r#"{"message":"not your room"}"#),
    );
    let err = api(&server)
        .update_room(TOKEN, &RoomId::from(3), &payload())
        .await
        .unwrap_err();
    match err {
        StudyRoomError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "not your room");
        }
        other => panic!("expected Api, got {other:?}"),
    }
}

#[tokio::test]
async fn test_update_with_empty_body_has_no_echo() {
    let server = StubServer::start().await;
    server.route("PUT", "/study_rooms/3", Reply::empty(200));
    let echo = api(&server)
        .update_room(TOKEN, &RoomId::from(3), &payload())
        .await
        .unwrap();
    assert!(echo.is_none());
}

#[tokio::test]
async fn test_delete_hits_room_url() {
    let server = StubServer::start().await;
    server.route("DELETE", "/study_rooms/9", Reply::empty(200));
    api(&server).delete_room(TOKEN, &RoomId::from(9)).await.unwrap();
    assert_eq!(server.count("DELETE", "/study_rooms/9"), 1);
}

#[tokio::test]
async fn test_get_room_unwraps_record() {
    let server = StubServer::start().await;
    server.route("GET", "/study_rooms/5", Reply::json(json!({"room": {"room_id": 5, "name": "Bio"}})));
    let r = api(&server).get_room(TOKEN, &RoomId::from(5)).await.unwrap();
    assert_eq!(r.name.as_deref(), Some("Bio"));
}
