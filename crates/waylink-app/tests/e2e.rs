// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the complete Waylink pipeline.
//!
//! Each test wires an isolated in-memory database, mock gateway and mock
//! provider through the real webhook router, inbound pipeline, auto-reply
//! engine, and dispatch workers. Tests are independent and
//! order-insensitive.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use waylink_app::{AppService, InboundPipeline};
use waylink_autoreply::AutoReplyEngine;
use waylink_config::model::{
    AutoReplyConfig, DispatchConfig, ReconcilerConfig, WaylinkConfig,
};
use waylink_core::types::{ConnectionState, DeliveryStatus, JobStatus, ReplyMode};
use waylink_core::GatewayApi;
use waylink_dispatch::{spawn_workers, DispatchQueue, TenantRateLimiter};
use waylink_reconciler::Reconciler;
use waylink_storage::queries::{accounts, conversations, jobs, messages, policies};
use waylink_storage::{AutoReplyPolicy, Database};
use waylink_test_utils::{MockGateway, MockProvider, ProviderScript, SendScript};
use waylink_webhook::{router, GateConfig, WebhookState};

struct Harness {
    db: Database,
    gateway: Arc<MockGateway>,
    provider: Arc<MockProvider>,
    service: AppService,
    app: axum::Router,
    shutdown: CancellationToken,
}

fn dispatch_config() -> DispatchConfig {
    DispatchConfig {
        workers: 2,
        max_attempts: 3,
        backoff_base_ms: 1,
        backoff_cap_ms: 10,
        claim_interval_ms: 5,
        ..DispatchConfig::default()
    }
}

async fn harness() -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    let gateway_mock = Arc::new(MockGateway::new());
    let provider = Arc::new(MockProvider::new());
    let gateway: Arc<dyn GatewayApi> = gateway_mock.clone();

    accounts::insert(
        &db,
        &accounts::NewAccount {
            id: "acc-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            name: "Main".to_string(),
            instance_key: "wa-1".to_string(),
            instance_token: Some("instance-secret".to_string()),
            state: ConnectionState::Connected,
        },
    )
    .await
    .unwrap();

    let mut policy = AutoReplyPolicy::default_for("tenant-1");
    policy.enabled = true;
    policy.mode = ReplyMode::Always;
    policies::upsert(&db, &policy).await.unwrap();

    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        gateway.clone(),
        ReconcilerConfig::default(),
    ));
    let engine = Arc::new(AutoReplyEngine::new(
        db.clone(),
        provider.clone(),
        AutoReplyConfig {
            provider_timeout_secs: 5,
        },
    ));
    let queue = DispatchQueue::new(db.clone(), dispatch_config());
    let limiter = Arc::new(TenantRateLimiter::new(&dispatch_config()));

    let pipeline = Arc::new(InboundPipeline::new(
        db.clone(),
        reconciler.clone(),
        engine,
        queue.clone(),
    ));

    let service = AppService::new(
        db.clone(),
        gateway.clone(),
        reconciler,
        queue,
        limiter.clone(),
        &WaylinkConfig::default(),
    );

    let shutdown = CancellationToken::new();
    spawn_workers(
        db.clone(),
        gateway,
        dispatch_config(),
        limiter,
        shutdown.clone(),
    );

    let state = WebhookState {
        db: db.clone(),
        gate: GateConfig::from_config(&waylink_config::model::WebhookConfig::default()),
        sink: pipeline,
        start_time: std::time::Instant::now(),
    };

    Harness {
        db,
        gateway: gateway_mock,
        provider,
        service,
        app: router(state),
        shutdown,
    }
}

fn inbound_request(text: &str) -> Request<Body> {
    let body = serde_json::json!({
        "event": "messages.upsert",
        "instance": "wa-1",
        "apikey": "instance-secret",
        "data": {
            "key": {
                "remoteJid": "15550001111@s.whatsapp.net",
                "fromMe": false,
                "id": uuid_like(text)
            },
            "pushName": "Ada",
            "message": {"conversation": text}
        }
    });
    Request::builder()
        .method("POST")
        .uri("/webhook/wa-1")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Distinct message ids per test input, stable within one.
fn uuid_like(seed: &str) -> String {
    format!("MSG-{:016x}", seed.bytes().fold(0u64, |a, b| a.rotate_left(7) ^ b as u64))
}

async fn wait_until<F, Fut>(mut check: F, what: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "timed out waiting for: {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---- Inbound webhook to delivered auto-reply ----

#[tokio::test]
async fn inbound_message_produces_delivered_auto_reply() {
    let h = harness().await;
    h.provider
        .push(ProviderScript::Reply {
            text: "We are open 9 to 6.".to_string(),
            tokens: 55,
        })
        .await;

    let response = h
        .app
        .clone()
        .oneshot(inbound_request("when are you open?"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The reply flows through the queue to the gateway.
    let gateway = h.gateway.clone();
    wait_until(
        || {
            let gateway = gateway.clone();
            async move { !gateway.sends().await.is_empty() }
        },
        "auto-reply to reach the gateway",
    )
    .await;

    let sends = h.gateway.sends().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].instance_key, "wa-1");
    assert_eq!(sends[0].recipient, "15550001111");
    assert_eq!(sends[0].text, "We are open 9 to 6.");

    // The reply message ends up Sent with its automation record.
    let conversation = conversations::get_or_create(&h.db, "acc-1", "15550001111")
        .await
        .unwrap();
    let db = h.db.clone();
    let conversation_id = conversation.id.clone();
    wait_until(
        || {
            let db = db.clone();
            let conversation_id = conversation_id.clone();
            async move {
                let window = messages::recent_for_conversation(&db, &conversation_id, 10)
                    .await
                    .unwrap();
                window
                    .iter()
                    .any(|m| m.delivery_status == DeliveryStatus::Sent)
            }
        },
        "reply message to be marked sent",
    )
    .await;

    let window = messages::recent_for_conversation(&h.db, &conversation.id, 10)
        .await
        .unwrap();
    let reply = window
        .iter()
        .find(|m| m.delivery_status == DeliveryStatus::Sent)
        .unwrap();
    assert!(reply.automation.is_some());

    // Usage counters recorded the call.
    let stats = h.service.usage_stats("tenant-1").await.unwrap();
    assert_eq!(stats.usage.tokens_today, 55);
    assert_eq!(stats.usage.conversations_today, 1);

    h.shutdown.cancel();
}

// ---- Transient failures below the ceiling still deliver ----

#[tokio::test]
async fn transient_failures_then_success_leaves_job_delivered() {
    let h = harness().await;
    h.gateway.push_send(SendScript::Transient).await;
    h.gateway.push_send(SendScript::Transient).await;

    let (job_id, message_id) = h
        .service
        .send_single("acc-1", "15550002222", "flaky network")
        .await
        .unwrap();

    let db = h.db.clone();
    wait_until(
        || {
            let db = db.clone();
            async move {
                jobs::get(&db, job_id).await.unwrap().unwrap().status == JobStatus::Delivered
            }
        },
        "job to be delivered after retries",
    )
    .await;

    let job = jobs::get(&h.db, job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 2, "two failed attempts before success");
    let message = messages::get(&h.db, &message_id).await.unwrap().unwrap();
    assert_eq!(message.delivery_status, DeliveryStatus::Sent);
    assert_eq!(h.gateway.sends().await.len(), 3);

    h.shutdown.cancel();
}

// ---- Exhausted retries dead-letter, admin retry revives ----

#[tokio::test]
async fn dead_lettered_job_revives_via_admin_retry() {
    let h = harness().await;
    for _ in 0..3 {
        h.gateway.push_send(SendScript::Transient).await;
    }

    let (job_id, message_id) = h
        .service
        .send_single("acc-1", "15550003333", "doomed at first")
        .await
        .unwrap();

    let db = h.db.clone();
    wait_until(
        || {
            let db = db.clone();
            async move {
                jobs::get(&db, job_id).await.unwrap().unwrap().status == JobStatus::DeadLettered
            }
        },
        "job to dead-letter at the attempt ceiling",
    )
    .await;

    let message = messages::get(&h.db, &message_id).await.unwrap().unwrap();
    assert_eq!(message.delivery_status, DeliveryStatus::Failed);
    assert!(message.delivery_error.is_some());

    // Administrative retry: counters reset, next attempt succeeds.
    let revived = h.service.retry_failed("tenant-1").await.unwrap();
    assert_eq!(revived, 1);

    let db = h.db.clone();
    wait_until(
        || {
            let db = db.clone();
            async move {
                jobs::get(&db, job_id).await.unwrap().unwrap().status == JobStatus::Delivered
            }
        },
        "revived job to deliver",
    )
    .await;

    let snapshot = h.service.queue_snapshot("tenant-1").await.unwrap();
    assert_eq!(snapshot.delivered, 1);
    assert_eq!(snapshot.dead_lettered, 0);

    h.shutdown.cancel();
}

// ---- Unauthorized webhooks never touch state ----

#[tokio::test]
async fn unauthorized_webhook_is_fully_ignored() {
    let h = harness().await;

    let body = serde_json::json!({
        "event": "messages.upsert",
        "instance": "wa-1",
        "apikey": "wrong-secret",
        "data": {
            "key": {"remoteJid": "15550009999@s.whatsapp.net", "fromMe": false, "id": "NOPE-1"},
            "message": {"conversation": "should not exist"}
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/webhook/wa-1")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(messages::get(&h.db, "NOPE-1").await.unwrap().is_none());
    assert_eq!(h.provider.call_count().await, 0);

    h.shutdown.cancel();
}
