//! HTTP transports against a mock server, and the dispatcher's handling of real
//! webhook responses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keeper::clock::ManualClock;
use keeper::config::MailConfig;
use keeper::models::PonyStatus;
use keeper::models::pony::Model as PonyModel;
use keeper::notification::{
    DeliveryError, Dispatcher, EmailTransport, HttpMailTransport, HttpWebhookTransport,
    WebhookTransport,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn webhook_pony(url: String) -> PonyModel {
    PonyModel {
        id: Uuid::new_v4(),
        name: "nightly".to_string(),
        passcode_hash: String::new(),
        dark_minute: 5,
        last_hi_time: None,
        status: "normal".to_string(),
        notify_channel: "webhook".to_string(),
        notify_url: url,
        created_at: Utc::now().fixed_offset(),
    }
}

fn http_dispatcher(mail: MailConfig) -> Dispatcher {
    let now: DateTime<Utc> = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Dispatcher::new(
        Arc::new(HttpMailTransport::new(&mail, TIMEOUT).unwrap()),
        Arc::new(HttpWebhookTransport::new(TIMEOUT).unwrap()),
        Arc::new(ManualClock::new(now)),
    )
}

#[tokio::test]
async fn webhook_transport_posts_json_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_json(json!({"text": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpWebhookTransport::new(TIMEOUT).unwrap();
    let body = transport
        .post_json(&format!("{}/hook", server.uri()), &json!({"text": "hello"}))
        .await
        .unwrap();

    assert_eq!(body, "ok");
}

#[tokio::test]
async fn webhook_transport_reports_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
        .mount(&server)
        .await;

    let transport = HttpWebhookTransport::new(TIMEOUT).unwrap();
    let err = transport
        .post_json(&server.uri(), &json!({"text": "hello"}))
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Status { status: 404, ref body } if body == "no_service"));
}

#[tokio::test]
async fn dispatcher_accepts_only_ok_webhook_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accepting"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chatty"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
        .mount(&server)
        .await;

    let dispatcher = http_dispatcher(MailConfig::default());

    let accepted = dispatcher
        .notify(
            &webhook_pony(format!("{}/accepting", server.uri())),
            PonyStatus::Normal,
            PonyStatus::Missing,
        )
        .await;
    let rejected = dispatcher
        .notify(
            &webhook_pony(format!("{}/chatty", server.uri())),
            PonyStatus::Normal,
            PonyStatus::Missing,
        )
        .await;

    assert!(accepted);
    assert!(!rejected);

    let requests = server.received_requests().await.unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(
        payload["text"]
            .as_str()
            .unwrap()
            .starts_with("[nightly] is now missing\n")
    );
}

#[tokio::test]
async fn dispatcher_reports_false_when_webhook_unreachable() {
    // Nothing listens on the discard port.
    let dispatcher = http_dispatcher(MailConfig::default());

    let delivered = dispatcher
        .notify(
            &webhook_pony("http://127.0.0.1:9/hook".to_string()),
            PonyStatus::Init,
            PonyStatus::Normal,
        )
        .await;

    assert!(!delivered);
}

#[tokio::test]
async fn mail_transport_posts_to_relay_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer relay-token"))
        .and(body_json(json!({
            "from": "keeper@example.com",
            "to": "owner@example.com",
            "subject": "[nightly] is now missing",
            "text": "body",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = MailConfig {
        api_url: Some(format!("{}/send", server.uri())),
        api_token: Some("relay-token".to_string()),
        from: "keeper@example.com".to_string(),
    };
    let transport = HttpMailTransport::new(&config, TIMEOUT).unwrap();

    transport
        .send("owner@example.com", "[nightly] is now missing", "body")
        .await
        .unwrap();
}

#[tokio::test]
async fn mail_transport_without_relay_is_not_configured() {
    let transport = HttpMailTransport::new(&MailConfig::default(), TIMEOUT).unwrap();

    let err = transport
        .send("owner@example.com", "subject", "body")
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::NotConfigured));
}

#[tokio::test]
async fn mail_relay_failure_is_reported_as_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dispatcher = http_dispatcher(MailConfig {
        api_url: Some(server.uri()),
        api_token: None,
        from: "keeper@example.com".to_string(),
    });
    let mut pony = webhook_pony(String::new());
    pony.notify_channel = "email".to_string();
    pony.notify_url = "owner@example.com".to_string();

    assert!(
        !dispatcher
            .notify(&pony, PonyStatus::Missing, PonyStatus::Normal)
            .await
    );
}
