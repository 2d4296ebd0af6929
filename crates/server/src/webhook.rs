//! Webhook surface the messaging platform calls into.
//!
//! - `GET  /api/webhook` — subscription handshake (verify token + challenge)
//! - `POST /api/webhook` — event delivery; always acknowledged with 200 so a
//!   downstream hiccup never provokes a redelivery storm

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nova_agent::AgentRuntime;
use nova_whatsapp::webhook::{verify_handshake, WebhookPayload};

#[derive(Clone)]
pub struct WebhookState {
    runtime: Arc<AgentRuntime>,
    verify_token: Option<String>,
}

pub fn router(runtime: Arc<AgentRuntime>, verify_token: Option<String>) -> Router {
    Router::new()
        .route("/api/webhook", get(verify).post(receive))
        .with_state(WebhookState { runtime, verify_token })
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeliveryAck {
    pub received: bool,
}

pub async fn verify(
    State(webhook): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);

    if verify_handshake(mode, token, webhook.verify_token.as_deref()) {
        let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
        info!(event_name = "ingress.webhook.verified", "webhook subscription verified");
        return (StatusCode::OK, challenge);
    }

    warn!(
        event_name = "ingress.webhook.verify_rejected",
        mode = mode.unwrap_or("missing"),
        "webhook verification rejected"
    );
    (StatusCode::FORBIDDEN, "Forbidden".to_owned())
}

pub async fn receive(State(webhook): State<WebhookState>, body: Bytes) -> Json<DeliveryAck> {
    let correlation_id = Uuid::new_v4();

    // Malformed bodies are acknowledged too: the platform retries otherwise,
    // and a payload we cannot read today will not read better tomorrow.
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            debug!(
                event_name = "ingress.webhook.delivery",
                correlation_id = %correlation_id,
                entries = payload.entry.len(),
                "webhook delivery received"
            );
            webhook.runtime.handle_webhook(&payload).await;
        }
        Err(error) => {
            debug!(
                event_name = "ingress.webhook.unreadable",
                correlation_id = %correlation_id,
                error = %error,
                "ignoring unreadable webhook body"
            );
        }
    }

    Json(DeliveryAck { received: true })
}
