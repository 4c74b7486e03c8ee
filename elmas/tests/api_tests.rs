//! HTTP API tests driven through the router with `oneshot`

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;
use elmas::ads::{AdSession, SessionStatus};
use elmas::api::handlers::INIT_DATA_HEADER;
use elmas::api::webhook::SECRET_TOKEN_HEADER;
use elmas::bot::commands::MAX_CALLBACK_DATA_BYTES;
use elmas::config::NodeConfig;
use elmas::ElmasNode;
use lib_identity::sign_login_payload;
use lib_storage::{MemoryBackend, StorageBackend};
use lib_types::{ManualClock, SessionId};

const ALICE: i64 = 1001;
const BOB: i64 = 1002;

fn test_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.telegram.bot_token = BOT_TOKEN.to_string();
    config.telegram.admin_ids = vec![9000];
    config.catalog.web_base_url = "https://elmas.example.com".to_string();
    config.storage.in_memory = true;
    config
}

async fn app_with(config: NodeConfig) -> (Router, Arc<ManualClock>, ElmasNode<MemoryBackend>) {
    let clock = Arc::new(ManualClock::new(T0));
    let node = ElmasNode::new(Arc::new(MemoryBackend::new()), clock.clone(), config).unwrap();
    node.manager()
        .catalog()
        .create(new_ad("Spot", 15, reward("0.25", "5")))
        .await
        .unwrap();
    let app = node
        .router()
        .unwrap()
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40_000))));
    (app, clock, node)
}

async fn app() -> (Router, Arc<ManualClock>, ElmasNode<MemoryBackend>) {
    app_with(test_config()).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, init_data: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(INIT_DATA_HEADER, init_data)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str, init_data: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(INIT_DATA_HEADER, init_data)
        .body(Body::empty())
        .unwrap()
}

async fn request_session(app: &Router, init_data: &str) -> String {
    let (status, body) = send(app, post("/api/ad/request", init_data)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "created");
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _, _) = app().await;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_requires_valid_init_data() {
    let (app, _, _) = app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/ad/request")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["outcome"], "unauthenticated");

    let forged = lib_identity::sign_web_app_init_data(
        "999:OTHER-BOT",
        &[("auth_date", &T0.to_string()), ("user", r#"{"id":1001}"#)],
    );
    let (status, _) = send(&app, post("/api/ad/request", &forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_watch_and_claim_flow() {
    let (app, clock, _) = app().await;
    let alice = init_data_for(ALICE, T0);

    let (status, body) = send(&app, post("/api/ad/request", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["required_seconds"], 15);
    assert_eq!(body["reward_currency"], "0.25");
    let sid = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(
        body["watch_url"],
        format!("https://elmas.example.com/webapp/watch.html?sid={sid}")
    );

    let (status, body) = send(&app, post(&format!("/api/ad/{sid}/start"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "started");

    clock.advance(10);
    let (status, body) = send(&app, post(&format!("/api/ad/{sid}/claim"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "too_early");
    assert_eq!(body["remaining_secs"], 5);
    assert!(body["message"].as_str().is_some());

    clock.advance(6);
    let (status, body) = send(&app, post(&format!("/api/ad/{sid}/claim"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "paid");
    assert_eq!(body["balances"]["spendable_balance"], "0.25");
    assert_eq!(body["balances"]["reward_token_balance"], "5");

    let (status, body) = send(&app, post(&format!("/api/ad/{sid}/claim"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "already_paid");
    assert_eq!(body["balances"]["spendable_balance"], "0.25");

    let (status, body) = send(&app, get(&format!("/api/ad/{sid}"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");

    let (status, body) = send(&app, get("/api/me", &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], ALICE);
    assert_eq!(body["ads_today"], 1);
    assert_eq!(body["referral_code"], "ELMAS1001");
    assert_eq!(body["balances"]["reward_token_balance"], "5");
}

#[tokio::test]
async fn test_session_access_errors() {
    let (app, clock, _) = app().await;
    let alice = init_data_for(ALICE, T0);
    let bob = init_data_for(BOB, T0);
    let sid = request_session(&app, &alice).await;
    clock.advance(16);

    let (status, body) = send(&app, post(&format!("/api/ad/{sid}/claim"), &bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "user_mismatch");

    let (status, _) = send(&app, get(&format!("/api/ad/{sid}"), &bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let unknown = "0".repeat(64);
    let (status, body) = send(&app, post(&format!("/api/ad/{unknown}/claim"), &alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["outcome"], "not_found");

    let (status, body) = send(&app, post("/api/ad/not-a-session/claim", &alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["outcome"], "bad_request");
}

#[tokio::test]
async fn test_claim_with_login_payload() {
    let (app, clock, _) = app().await;
    let alice = init_data_for(ALICE, T0);
    let sid = request_session(&app, &alice).await;
    clock.advance(16);

    let claim = |body: String| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/ad/{sid}/claim"))
            .header(INIT_DATA_HEADER, alice.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let (status, _) = send(&app, claim("{not json".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let auth_date = T0.to_string();
    let bob_login = sign_login_payload(BOT_TOKEN, &[("id", "1002"), ("auth_date", &auth_date)]);
    let (status, body) = send(&app, claim(json!({ "login_payload": bob_login }).to_string())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "user_mismatch");

    let alice_login = sign_login_payload(BOT_TOKEN, &[("id", "1001"), ("auth_date", &auth_date)]);
    let (status, body) = send(&app, claim(json!({ "login_payload": alice_login }).to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "paid");
}

#[tokio::test]
async fn test_per_user_rate_limit() {
    let mut config = test_config();
    config.server.rate_limit_per_user = 2;
    let (app, _, node) = app_with(config).await;
    let alice = init_data_for(ALICE, T0);

    for _ in 0..2 {
        let (status, _) = send(&app, get("/api/me", &alice)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app.clone().oneshot(get("/api/me", &alice)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(node.manager().metrics().snapshot().rate_limit_denials, 1);

    // Other users are unaffected
    let (status, _) = send(&app, get("/api/me", &init_data_for(BOB, T0))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_replies_with_send_message() {
    let mut config = test_config();
    config.telegram.webhook_secret = Some("hook-secret".to_string());
    let (app, _, _) = app_with(config).await;

    let update = json!({
        "update_id": 10,
        "message": { "chat": { "id": ALICE }, "from": { "id": ALICE }, "text": "/wallet" }
    });
    let webhook = |secret: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/bot/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_TOKEN_HEADER, secret);
        }
        builder.body(Body::from(update.to_string())).unwrap()
    };

    let response = app.clone().oneshot(webhook(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.clone().oneshot(webhook(Some("wrong"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, webhook(Some("hook-secret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["method"], "sendMessage");
    assert_eq!(body["chat_id"], ALICE);
    assert!(body["text"].as_str().unwrap().contains("TL: 0.00"));

    let watch = json!({
        "update_id": 11,
        "message": { "chat": { "id": ALICE }, "from": { "id": ALICE }, "text": "/watch" }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/bot/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SECRET_TOKEN_HEADER, "hook-secret")
        .body(Body::from(watch.to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["reply_markup"]["inline_keyboard"].as_array().unwrap();
    let callbacks: Vec<&str> = rows
        .iter()
        .filter_map(|row| row[0]["callback_data"].as_str())
        .collect();
    assert_eq!(callbacks.len(), 2);
    for data in callbacks {
        assert!(data.len() <= MAX_CALLBACK_DATA_BYTES, "callback_data is {} bytes", data.len());
    }
}

#[tokio::test]
async fn test_metrics_endpoint_is_admin_only() {
    let (app, _, _) = app().await;
    let alice = init_data_for(ALICE, T0);
    request_session(&app, &alice).await;

    let (status, body) = send(&app, Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["outcome"], "unauthenticated");

    let (status, body) = send(&app, get("/metrics", &alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "forbidden");

    let admin = init_data_for(9000, T0);
    let (status, body) = send(&app, get("/metrics", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions_created"], 1);
}

#[tokio::test]
async fn test_status_read_by_other_user_does_not_expire_session() {
    let (app, clock, node) = app().await;
    let alice = init_data_for(ALICE, T0);
    let bob = init_data_for(BOB, T0);
    let sid = request_session(&app, &alice).await;
    clock.advance(15 + 180 + 1);

    let (status, body) = send(&app, get(&format!("/api/ad/{sid}"), &bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], "user_mismatch");

    let session_id: SessionId = sid.parse().unwrap();
    let raw = node
        .manager()
        .ledger()
        .backend()
        .get(&elmas::store::session_key(&session_id))
        .await
        .unwrap()
        .unwrap();
    let stored: AdSession = elmas::store::decode(&raw).unwrap();
    assert_eq!(stored.status, SessionStatus::Created);
    assert_eq!(node.manager().metrics().snapshot().sessions_expired, 0);

    let (status, body) = send(&app, get(&format!("/api/ad/{sid}"), &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
}
