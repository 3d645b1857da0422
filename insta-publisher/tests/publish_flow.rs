//! End-to-end tests of the Instagram client against a mock API.

use insta_publisher::{InstaClient, Session};
use interfaces::{OverlayCard, PostContent, PublishError, Publisher};
use serde_json::json;
use std::path::PathBuf;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn temp_session_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("insta_publisher_tests");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{name}.json"))
}

fn sample_post() -> PostContent {
    PostContent {
        image_url: "https://cdn.example.com/photo.jpg".to_string(),
        caption: "siga: @noticiasbr.ai | Resumo.\n\nFonte: G1\n\n#Geral".to_string(),
        card: OverlayCard {
            opacity: 0.3,
            category_tag: "#GERAL".to_string(),
            headline_lines: vec!["Manchete de teste".to_string()],
            font_px: 52,
        },
    }
}

async fn mount_me(server: &MockServer, id: &str, username: &str) {
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(query_param("access_token", "token-ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "username": username,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_resolves_account_and_caches_session() {
    let server = MockServer::start().await;
    mount_me(&server, "9001", "noticiasbr.ai").await;

    let session_path = temp_session_path("connect_caches");
    std::fs::remove_file(&session_path).ok();

    let client = InstaClient::new(Some("token-ok".to_string()), session_path.clone())
        .with_base_url(server.uri());

    assert!(!client.is_connected().await);
    client.connect().await.unwrap();
    assert!(client.is_connected().await);

    let cached = Session::load(&session_path).expect("session should be cached");
    assert_eq!(cached.account_id, "9001");
    assert_eq!(cached.username, "noticiasbr.ai");

    std::fs::remove_file(&session_path).ok();
}

#[tokio::test]
async fn connect_with_bad_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Invalid OAuth access token." }
        })))
        .mount(&server)
        .await;

    let client = InstaClient::new(
        Some("token-ok".to_string()),
        temp_session_path("bad_token"),
    )
    .with_base_url(server.uri());

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, PublishError::Auth(_)), "got {err:?}");
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn connect_without_token_is_auth_error() {
    let client = InstaClient::new(None, temp_session_path("no_token"));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, PublishError::Auth(_)));
}

#[tokio::test]
async fn stale_session_is_refreshed_on_connect() {
    let server = MockServer::start().await;
    mount_me(&server, "9001", "noticiasbr.ai").await;

    let session_path = temp_session_path("stale_session");
    Session::new("1234".to_string(), "old-account".to_string())
        .save(&session_path)
        .unwrap();

    let client = InstaClient::new(Some("token-ok".to_string()), session_path.clone())
        .with_base_url(server.uri());
    client.connect().await.unwrap();

    let cached = Session::load(&session_path).unwrap();
    assert_eq!(cached.account_id, "9001");

    std::fs::remove_file(&session_path).ok();
}

#[tokio::test]
async fn publish_runs_the_two_step_flow() {
    let server = MockServer::start().await;
    mount_me(&server, "9001", "noticiasbr.ai").await;

    Mock::given(method("POST"))
        .and(path("/9001/media"))
        .and(query_param("access_token", "token-ok"))
        .and(body_partial_json(json!({
            "image_url": "https://cdn.example.com/photo.jpg",
            "overlay": { "opacity": 0.3, "category_tag": "#GERAL" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "container-1" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/9001/media_publish"))
        .and(body_partial_json(json!({ "creation_id": "container-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "media-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let session_path = temp_session_path("two_step");
    std::fs::remove_file(&session_path).ok();
    let client = InstaClient::new(Some("token-ok".to_string()), session_path.clone())
        .with_base_url(server.uri());
    client.connect().await.unwrap();

    let receipt = client.publish(&sample_post()).await.unwrap();
    assert_eq!(receipt.media_id, "media-42");

    std::fs::remove_file(&session_path).ok();
}

#[tokio::test]
async fn publish_without_session_is_rejected() {
    let client = InstaClient::new(
        Some("token-ok".to_string()),
        temp_session_path("no_session_publish"),
    );
    let err = client.publish(&sample_post()).await.unwrap_err();
    assert!(matches!(err, PublishError::NoSession));
}

#[tokio::test]
async fn payload_rejection_is_not_retried() {
    let server = MockServer::start().await;
    mount_me(&server, "9001", "noticiasbr.ai").await;

    Mock::given(method("POST"))
        .and(path("/9001/media"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid image URL" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session_path = temp_session_path("payload_rejected");
    std::fs::remove_file(&session_path).ok();
    let client = InstaClient::new(Some("token-ok".to_string()), session_path.clone())
        .with_base_url(server.uri());
    client.connect().await.unwrap();

    let err = client.publish(&sample_post()).await.unwrap_err();
    assert!(matches!(err, PublishError::Rejected(_)), "got {err:?}");

    std::fs::remove_file(&session_path).ok();
}
