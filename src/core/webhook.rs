#![allow(clippy::result_large_err)] // Webhook helpers return AppError for consistent diagnostics.

use crate::core::engine::{Delivery, InvocationOutcome, OutcomeStatus, RuleEngine};
use crate::core::error::{AppError, DefaultErrorReporter, ErrorReporter};
use crate::core::types::{ErrorCategory, EventKind};
use axum::{
    body::{Body, Bytes},
    extract::Extension,
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::util::MapResponseLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use uuid::Uuid;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const ACCESS_DENIED_MESSAGE: &str = "upstream access refused; the repository may not be approved for this app";

/// Listener settings taken from the process configuration.
#[derive(Debug, Clone)]
pub struct WebhookOptions {
    pub secret: String,
    pub max_body_bytes: usize,
    pub verbose_errors: bool,
}

/// State shared across webhook requests.
struct WebhookState {
    engine: Arc<RuleEngine>,
    secret: String,
    verbose_errors: bool,
}

/// Build the webhook router without binding a socket.
pub fn router(engine: Arc<RuleEngine>, options: &WebhookOptions) -> Router {
    let state = Arc::new(WebhookState {
        engine,
        secret: options.secret.clone(),
        verbose_errors: options.verbose_errors,
    });
    Router::new()
        .route("/api/webhook", post(handle_delivery))
        .route("/healthz", get(|| async { "ok" }))
        .layer(Extension(state))
        .layer(RequestBodyLimitLayer::new(options.max_body_bytes))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": {
                        "code": "RULEBOT-WEBHOOK-413",
                        "message": "payload too large"
                    }
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
}

/// Start the webhook listener and block until the service terminates.
pub async fn serve_webhook(
    engine: Arc<RuleEngine>,
    options: WebhookOptions,
    bind: SocketAddr,
) -> Result<(), AppError> {
    serve_webhook_internal(engine, options, bind, None).await
}

/// Start the webhook listener and notify once the bind address is known (test helper).
pub async fn serve_webhook_with_ready_notifier(
    engine: Arc<RuleEngine>,
    options: WebhookOptions,
    bind: SocketAddr,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_webhook_internal(engine, options, bind, Some(ready_notifier)).await
}

async fn serve_webhook_internal(
    engine: Arc<RuleEngine>,
    options: WebhookOptions,
    bind: SocketAddr,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    if options.secret.trim().is_empty() {
        return Err(AppError::new(
            ErrorCategory::ConfigurationError,
            "webhook secret must be set to start the listener",
        )
        .with_code("RULEBOT-WEBHOOK-000"));
    }
    let app = router(engine, &options);
    let listener = TcpListener::bind(bind).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind webhook listener {}: {}", bind, err),
        )
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine webhook listener address: {}", err),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("webhook server listening on {}", local_addr);
    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("webhook server terminated: {}", err),
            )
        })
}

async fn handle_delivery(
    Extension(state): Extension<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, WebhookRejection> {
    let signature = header_str(&headers, SIGNATURE_HEADER).ok_or_else(|| {
        WebhookRejection::unauthorized("missing signature")
    })?;
    verify_signature(&state.secret, &body, signature)?;

    let delivery_id = header_str(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let event_name = header_str(&headers, EVENT_HEADER)
        .ok_or_else(|| WebhookRejection::bad_request("missing event header".to_string()))?;
    let Some(kind) = EventKind::from_header(event_name) else {
        info!(event = event_name, delivery = %delivery_id, "ignoring unsupported event");
        return Ok(Json(json!({
            "status": "ignored",
            "event": event_name,
        })));
    };

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| WebhookRejection::bad_request("invalid JSON payload".to_string()))?;
    if !payload.is_object() {
        return Err(WebhookRejection::bad_request(
            "payload must be a JSON object".to_string(),
        ));
    }

    let delivery = Delivery::new(kind, payload).with_id(delivery_id);
    match state.engine.handle(delivery).await {
        Ok(outcome) => respond(outcome),
        Err(err) => Err(WebhookRejection::from_app_error(err, state.verbose_errors)),
    }
}

fn respond(outcome: InvocationOutcome) -> Result<Json<Value>, WebhookRejection> {
    if outcome.status == OutcomeStatus::Failed {
        let message = outcome
            .failure
            .unwrap_or_else(|| "action-set failed".to_string());
        return Err(WebhookRejection::bad_request(message));
    }
    serde_json::to_value(&outcome)
        .map(Json)
        .map_err(|err| WebhookRejection::internal(AppError::from(anyhow::Error::from(err)), false))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// `sha256=<hex>` signature of `body` under `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|err| {
        AppError::new(
            ErrorCategory::InternalError,
            format!("failed to initialize hmac signer: {}", err),
        )
    })?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<(), WebhookRejection> {
    let digest = header.strip_prefix("sha256=").ok_or_else(|| {
        WebhookRejection::bad_request("signature must use sha256=<hex> format".to_string())
    })?;
    let expected = hex::decode(digest).map_err(|_| {
        WebhookRejection::bad_request("signature digest is not valid hex".to_string())
    })?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookRejection::unauthorized("signature verification failed"))?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| {
        warn!("rejected delivery with invalid signature");
        WebhookRejection::unauthorized("signature verification failed")
    })
}

/// Forbidden, unauthenticated or rate-limited upstream calls.
fn is_access_error(err: &AppError) -> bool {
    matches!(
        err.category,
        ErrorCategory::ForbiddenError | ErrorCategory::AuthenticationError
    ) || err.code == "GH-429"
}

#[derive(Debug)]
pub struct WebhookRejection {
    status: StatusCode,
    code: String,
    message: String,
}

impl WebhookRejection {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "RULEBOT-WEBHOOK-401".to_string(),
            message: message.to_string(),
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "RULEBOT-WEBHOOK-400".to_string(),
            message,
        }
    }

    fn internal(err: AppError, verbose: bool) -> Self {
        DefaultErrorReporter::new().report_error(&err);
        let message = if verbose {
            err.to_string()
        } else {
            "internal server error".to_string()
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "RULEBOT-WEBHOOK-500".to_string(),
            message,
        }
    }

    fn from_app_error(err: AppError, verbose: bool) -> Self {
        if is_access_error(&err) {
            warn!(code = %err.code, "upstream refused access: {}", err);
            return Self {
                status: StatusCode::BAD_REQUEST,
                code: "RULEBOT-WEBHOOK-400".to_string(),
                message: ACCESS_DENIED_MESSAGE.to_string(),
            };
        }
        if err.category.is_rule_failure() || err.category == ErrorCategory::ValidationError {
            warn!(code = %err.code, "delivery rejected: {}", err);
            return Self {
                status: StatusCode::BAD_REQUEST,
                code: err.code.clone(),
                message: err.message,
            };
        }
        Self::internal(err, verbose)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response<Body> {
        let mut resp = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message
            }
        }))
        .into_response();
        *resp.status_mut() = self.status;
        resp
    }
}
