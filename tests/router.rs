use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use lamportcast::{server, NodeConfig};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

fn config(process_id: u32, group_size: u32) -> NodeConfig {
    // Peers that never answer; outbound sends just retry in the background
    let peers = (1..=group_size)
        .filter(|p| *p != process_id)
        .map(|p| format!("http://127.0.0.1:{}", 9 + p))
        .collect();
    NodeConfig {
        process_id,
        group_size,
        peers,
        request_timeout_ms: 100,
        ..NodeConfig::default()
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_ack_from_self_is_rejected() {
    let app = server::router(server::start_node(&config(1, 3)).unwrap());

    let ack = json!({ "messageId": { "timestamp": 4, "originProcessId": 2 }, "fromProcessId": 1 });
    let (status, body) = call(&app, Method::POST, "/multicast/ack", Some(ack)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("Malformed"));
}

#[tokio::test]
async fn test_message_from_non_member_is_rejected() {
    let app = server::router(server::start_node(&config(1, 3)).unwrap());

    let msg = json!({ "id": { "timestamp": 1, "originProcessId": 7 }, "payload": "X" });
    let (status, _) = call(&app, Method::POST, "/multicast/message", Some(msg)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_overflowing_timestamp_is_rejected_and_node_keeps_serving() {
    let app = server::router(server::start_node(&config(1, 3)).unwrap());

    let msg = json!({ "id": { "timestamp": u64::MAX, "originProcessId": 2 }, "payload": "X" });
    let (status, _) = call(&app, Method::POST, "/multicast/message", Some(msg)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(&app, Method::GET, "/multicast/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clock"], 0);
    assert_eq!(body["pending"], 0);
}

#[tokio::test]
async fn test_structurally_invalid_json_is_rejected() {
    let app = server::router(server::start_node(&config(1, 3)).unwrap());

    let msg = json!({ "id": { "timestamp": 1 }, "payload": "X" });
    let (status, _) = call(&app, Method::POST, "/multicast/message", Some(msg)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_valid_message_is_pending_until_acked() {
    let app = server::router(server::start_node(&config(1, 3)).unwrap());

    let msg = json!({ "id": { "timestamp": 5, "originProcessId": 2 }, "payload": "X" });
    let (status, _) = call(&app, Method::POST, "/multicast/message", Some(msg)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/multicast/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clock"], 6);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["delivered"], 0);
    assert_eq!(body["head"]["waiting_for"], json!([3]));
    assert_eq!(body["health"]["state"], "healthy");
}

#[tokio::test]
async fn test_single_member_send_is_delivered() {
    let app = server::router(server::start_node(&config(1, 1)).unwrap());

    let (status, id) = call(&app, Method::POST, "/multicast/send", Some(json!({ "payload": "solo" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(id, json!({ "timestamp": 1, "originProcessId": 1 }));

    let mut delivered = Value::Null;
    for _ in 0..50 {
        (_, delivered) = call(&app, Method::GET, "/multicast/delivered", None).await;
        if delivered.as_array().is_some_and(|d| !d.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(delivered, json!([{ "id": id, "payload": "solo" }]));
}
