use anyhow::Result;
use async_trait::async_trait;
use rulebot::core::engine::{RuleEngine, RulesSource};
use rulebot::core::error::AppError;
use rulebot::core::github::{ClientProvider, FixedClientProvider, OfflineClient, RepoClient};
use rulebot::core::http::PageFetcher;
use rulebot::core::rules::RuleDocument;
use rulebot::core::types::{ErrorCategory, RepoRef};
use rulebot::core::webhook::{
    self, sign_payload, WebhookOptions, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{sync::oneshot, task::JoinHandle};

const SECRET: &str = "hook-secret";

const RULES: &str = r#"
revision: 2
schema-version: 5
owner-ms-alias: docsbot
config: {}
issues:
  opened:
    - labels-add: [needs-triage]
  edited:
    - comment: "$expr:issue.title +* ("
"#;

struct NoPages;

#[async_trait]
impl PageFetcher for NoPages {
    async fn fetch_text(&self, url: &str) -> Result<String, AppError> {
        Err(AppError::new(
            ErrorCategory::UpstreamError,
            format!("offline: {}", url),
        ))
    }
}

/// Refuses every repository, like an installation that lost access.
struct Refusing;

#[async_trait]
impl ClientProvider for Refusing {
    async fn client_for(
        &self,
        _installation_id: Option<u64>,
        repo: &RepoRef,
    ) -> Result<Arc<dyn RepoClient>, AppError> {
        Err(AppError::new(
            ErrorCategory::ForbiddenError,
            format!("installation cannot access {}", repo),
        )
        .with_code("GH-403"))
    }
}

fn options(max_body_bytes: usize) -> WebhookOptions {
    WebhookOptions {
        secret: SECRET.to_string(),
        max_body_bytes,
        verbose_errors: false,
    }
}

fn offline_engine(client: OfflineClient, rules: RulesSource) -> Arc<RuleEngine> {
    let client: Arc<dyn RepoClient> = Arc::new(client);
    Arc::new(RuleEngine::new(
        Arc::new(FixedClientProvider::new(client)),
        Arc::new(NoPages),
        rules,
    ))
}

fn fixed_engine() -> Arc<RuleEngine> {
    let document = Arc::new(RuleDocument::parse(RULES).unwrap());
    offline_engine(
        OfflineClient::new(RepoRef::new("octo", "docs")),
        RulesSource::Fixed(document),
    )
}

async fn spawn_webhook_server(
    engine: Arc<RuleEngine>,
    options: WebhookOptions,
) -> Result<(SocketAddr, JoinHandle<Result<(), AppError>>)> {
    let (addr_tx, addr_rx) = oneshot::channel();
    let bind: SocketAddr = "127.0.0.1:0".parse()?;
    let handle = tokio::spawn(async move {
        webhook::serve_webhook_with_ready_notifier(engine, options, bind, addr_tx).await
    });
    let addr = addr_rx.await.map_err(|_| {
        AppError::new(
            ErrorCategory::InternalError,
            "webhook startup canceled before bind address reported",
        )
    })?;
    Ok((addr, handle))
}

fn issue_delivery(action: &str) -> Value {
    json!({
        "action": action,
        "repository": {"full_name": "octo/docs"},
        "issue": {
            "number": 3,
            "node_id": "I_3",
            "title": "Broken link",
            "body": "",
            "state": "open",
            "user": {"login": "jdoe"},
            "labels": [],
            "assignees": []
        }
    })
}

async fn post_signed(
    client: &reqwest::Client,
    addr: SocketAddr,
    event: &str,
    body: &Value,
) -> Result<reqwest::Response> {
    let bytes = serde_json::to_vec(body)?;
    let signature = sign_payload(SECRET, &bytes)?;
    Ok(client
        .post(format!("http://{}/api/webhook", addr))
        .header(EVENT_HEADER, event)
        .header(DELIVERY_HEADER, "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header(SIGNATURE_HEADER, signature)
        .header("content-type", "application/json")
        .body(bytes)
        .send()
        .await?)
}

#[tokio::test]
async fn webhook_processes_a_signed_delivery() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(64 * 1024)).await?;
    let client = reqwest::Client::new();

    let resp = post_signed(&client, addr, "issues", &issue_delivery("opened")).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["action"], "opened");
    assert_eq!(body["operations"]["labels_added"], json!(["needs-triage"]));

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_rejects_missing_and_wrong_signatures() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(64 * 1024)).await?;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/webhook", addr);
    let payload = serde_json::to_vec(&issue_delivery("opened"))?;

    let resp = client
        .post(&url)
        .header(EVENT_HEADER, "issues")
        .body(payload.clone())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "RULEBOT-WEBHOOK-401");

    let forged = sign_payload("not-the-secret", &payload)?;
    let resp = client
        .post(&url)
        .header(EVENT_HEADER, "issues")
        .header(SIGNATURE_HEADER, forged)
        .body(payload.clone())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(&url)
        .header(EVENT_HEADER, "issues")
        .header(SIGNATURE_HEADER, "sha1=deadbeef")
        .body(payload)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_ignores_unsupported_events() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(64 * 1024)).await?;
    let client = reqwest::Client::new();

    let resp = post_signed(&client, addr, "push", &json!({"ref": "refs/heads/main"})).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body, json!({"status": "ignored", "event": "push"}));

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_reports_rule_failures_as_bad_requests() -> Result<()> {
    let client = OfflineClient::new(RepoRef::new("octo", "docs")).with_rules(
        "revision: 1\nschema-version: 1\nowner-ms-alias: docsbot\nconfig: {}\n",
    );
    let engine = offline_engine(client, RulesSource::Repository);
    let (addr, handle) = spawn_webhook_server(engine, options(64 * 1024)).await?;
    let http = reqwest::Client::new();

    let resp = post_signed(&http, addr, "issues", &issue_delivery("opened")).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "RULE-CFG-002");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("schema out of date"));

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_reports_failed_action_sets() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(64 * 1024)).await?;
    let client = reqwest::Client::new();

    let resp = post_signed(&client, addr, "issues", &issue_delivery("edited")).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert!(body["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("query failed"));

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_hides_forbidden_repository_details() -> Result<()> {
    let engine = Arc::new(RuleEngine::new(
        Arc::new(Refusing),
        Arc::new(NoPages),
        RulesSource::Repository,
    ));
    let (addr, handle) = spawn_webhook_server(engine, options(64 * 1024)).await?;
    let client = reqwest::Client::new();

    let resp = post_signed(&client, addr, "issues", &issue_delivery("opened")).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("upstream access refused"));
    assert!(!message.contains("octo/docs"));

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn webhook_rejects_invalid_json_and_oversized_bodies() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(256)).await?;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/webhook", addr);

    let garbage = b"not json".to_vec();
    let resp = client
        .post(&url)
        .header(EVENT_HEADER, "issues")
        .header(SIGNATURE_HEADER, sign_payload(SECRET, &garbage)?)
        .body(garbage)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let big = json!({"action": "opened", "blob": "a".repeat(1024)});
    let resp = post_signed(&client, addr, "issues", &big).await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "RULEBOT-WEBHOOK-413");

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn health_endpoint_answers() -> Result<()> {
    let (addr, handle) = spawn_webhook_server(fixed_engine(), options(1024)).await?;
    let resp = reqwest::get(format!("http://{}/healthz", addr)).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await?, "ok");
    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn listener_refuses_to_start_without_a_secret() {
    let options = WebhookOptions {
        secret: "  ".to_string(),
        max_body_bytes: 1024,
        verbose_errors: false,
    };
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let err = webhook::serve_webhook(fixed_engine(), options, bind)
        .await
        .unwrap_err();
    assert_eq!(err.code, "RULEBOT-WEBHOOK-000");
}
