/// Integration tests for the queue server HTTP client against the mock server.
use qs_protocol::{NotificationId, Verdict};
use qs_test_utils::{MockQueueServer, MockResponse, status_failure, status_with_notification};
use queue_client::ClientError;
use queue_client::api::ApiClient;
use queue_client::config::SessionConfig;
use serde_json::json;
use uuid::Uuid;

const ENTRY: &str = "6f1c2a7e-3b9d-4c55-9a0e-2d7f8b61c4e3";

fn client_for(server: &MockQueueServer) -> ApiClient {
    let entry = Uuid::parse_str(ENTRY).unwrap();
    ApiClient::new(&SessionConfig::new(&server.base_url(), entry))
}

#[tokio::test]
async fn fetch_status_hits_entry_path_and_decodes() {
    let server = MockQueueServer::start().await.unwrap();
    server.set_status(MockResponse::ok(status_with_notification("17", false)));

    let status = client_for(&server).fetch_status().await.unwrap();
    assert!(status.success);
    assert_eq!(
        status.pending_notification().map(|n| n.id.clone()),
        Some(NotificationId::new("17"))
    );
    assert_eq!(server.status_entries(), vec![ENTRY.to_owned()]);
}

#[tokio::test]
async fn fetch_status_http_error_is_transport() {
    let server = MockQueueServer::start().await.unwrap();
    server.set_status(MockResponse::with_status(500, json!({"error": "boom"})));

    let err = client_for(&server).fetch_status().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn fetch_status_unsuccessful_body_is_api_error() {
    let server = MockQueueServer::start().await.unwrap();
    server.set_status(MockResponse::ok(status_failure("Queue entry not found")));

    let err = client_for(&server).fetch_status().await.unwrap_err();
    match err {
        ClientError::Api(msg) => assert_eq!(msg, "Queue entry not found"),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_status_unreachable_server_is_transport() {
    let entry = Uuid::parse_str(ENTRY).unwrap();
    // Reserve a port, then free it so nothing listens there.
    let dead = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap()
    };
    let client = ApiClient::new(&SessionConfig::new(&format!("http://{dead}"), entry));
    let err = client.fetch_status().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn respond_posts_id_and_verdict() {
    let server = MockQueueServer::start().await.unwrap();

    let resp = client_for(&server)
        .respond(&NotificationId::new("17"), Verdict::Accepted)
        .await
        .unwrap();
    assert!(resp.success);
    assert_eq!(resp.message.as_deref(), Some("Response recorded."));

    let bodies = server.respond_bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], json!({"notification_id": "17", "response": "accepted"}));
}

#[tokio::test]
async fn respond_rejection_surfaces_server_error_text() {
    let server = MockQueueServer::start().await.unwrap();
    server.queue_respond(MockResponse::with_status(
        400,
        json!({"success": false, "error": "Notification has expired"}),
    ));

    let err = client_for(&server)
        .respond(&NotificationId::new("17"), Verdict::Declined)
        .await
        .unwrap_err();
    match err {
        ClientError::Api(msg) => assert_eq!(msg, "Notification has expired"),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn respond_gateway_error_without_json_is_transport() {
    let server = MockQueueServer::start().await.unwrap();
    server.queue_respond(MockResponse::with_status(502, json!("bad gateway")));

    let err = client_for(&server)
        .respond(&NotificationId::new("17"), Verdict::Accepted)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn push_subscription_includes_entry_uuid() {
    let server = MockQueueServer::start().await.unwrap();
    let subscription = json!({
        "endpoint": "https://push.example.net/send/abc",
        "keys": {"p256dh": "BNc", "auth": "tBH"}
    });

    client_for(&server)
        .register_push_subscription(subscription.clone())
        .await
        .unwrap();

    let bodies = server.subscribe_bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["entry_uuid"], ENTRY);
    assert_eq!(bodies[0]["subscription"], subscription);
}
