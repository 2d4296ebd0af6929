use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use nova_core::StateHandle;

use crate::bootstrap::MessagingMode;

#[derive(Clone)]
pub struct HealthState {
    state: StateHandle,
    messaging_mode: MessagingMode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub messaging: HealthCheck,
    pub groups: usize,
    pub messages: usize,
    pub checked_at: String,
}

pub fn router(state: StateHandle, messaging_mode: MessagingMode) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { state, messaging_mode })
}

pub async fn health(State(health): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = health.state.snapshot();

    let messaging = match health.messaging_mode {
        MessagingMode::Graph => HealthCheck {
            status: "ready",
            detail: "graph api client configured".to_string(),
        },
        MessagingMode::Unconfigured => HealthCheck {
            status: "degraded",
            detail: "no messaging credentials; live sends will be rejected".to_string(),
        },
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "nova-server runtime initialized".to_string(),
        },
        messaging,
        groups: snapshot.groups.len(),
        messages: snapshot.messages.len(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
