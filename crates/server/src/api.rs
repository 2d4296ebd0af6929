//! Dashboard-facing JSON API.
//!
//! - `GET  /api/state`    — full agent state snapshot
//! - `PUT  /api/persona`  — partial persona update
//! - `GET  /api/groups`   — tracked groups, insertion-ordered
//! - `POST /api/groups`   — join a group (dry-run / invite / direct)
//! - `POST /api/messages` — send (or simulate) an agent message

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use nova_agent::{AgentRuntime, JoinRequest, RuntimeError};
use nova_core::{AgentState, Group, Message, Persona, PersonaUpdate, StateHandle, StoreError};

#[derive(Clone)]
pub struct ApiState {
    state: StateHandle,
    runtime: Arc<AgentRuntime>,
}

pub fn router(state: StateHandle, runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/state", get(state_snapshot))
        .route("/api/persona", put(update_persona))
        .route("/api/groups", get(list_groups).post(join_group))
        .route("/api/messages", post(send_message))
        .with_state(ApiState { state, runtime })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupBody {
    pub group_id: Option<String>,
    pub invite_code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub group_id: String,
    pub content: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// Dry-run joins answer with the draft group; live joins answer with the
/// whole tracked set, matching what the dashboard re-renders.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JoinGroupResponse {
    Draft(Group),
    Joined(Vec<Group>),
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: &'static str,
    pub message: Message,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Uniform failure mapping for this surface: caller mistakes are 4xx, a
/// misbehaving platform is 502, and none of them carry internals.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiFailure {
    BadRequest(String),
    NotFound(String),
    Upstream(String),
}

impl From<RuntimeError> for ApiFailure {
    fn from(error: RuntimeError) -> Self {
        let message = error.to_string();
        match error {
            RuntimeError::Store(StoreError::GroupNotFound { .. }) => Self::NotFound(message),
            RuntimeError::Store(StoreError::InvalidTone { .. }) => Self::BadRequest(message),
            RuntimeError::Api(_) => Self::Upstream(message),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::BadRequest(error) => (StatusCode::BAD_REQUEST, error),
            Self::NotFound(error) => (StatusCode::NOT_FOUND, error),
            Self::Upstream(error) => (StatusCode::BAD_GATEWAY, error),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn state_snapshot(State(api): State<ApiState>) -> Json<AgentState> {
    Json(api.state.snapshot())
}

pub async fn update_persona(
    State(api): State<ApiState>,
    Json(update): Json<PersonaUpdate>,
) -> Result<Json<Persona>, ApiFailure> {
    let correlation_id = Uuid::new_v4();

    let persona = api.state.update_persona(update).map_err(|error| {
        warn!(
            event_name = "api.persona.rejected",
            correlation_id = %correlation_id,
            error = %error,
            "persona update rejected"
        );
        ApiFailure::BadRequest(error.to_string())
    })?;

    info!(
        event_name = "api.persona.updated",
        correlation_id = %correlation_id,
        persona_name = %persona.name,
        "persona updated"
    );
    Ok(Json(persona))
}

pub async fn list_groups(State(api): State<ApiState>) -> Json<Vec<Group>> {
    Json(api.state.snapshot().groups)
}

pub async fn join_group(
    State(api): State<ApiState>,
    Json(body): Json<JoinGroupBody>,
) -> Result<Json<JoinGroupResponse>, ApiFailure> {
    let correlation_id = Uuid::new_v4();
    let request = join_request(body)?;
    let dry_run = matches!(request, JoinRequest::DryRun { .. });

    let group = api.runtime.handle_join(request).await.map_err(|error| {
        warn!(
            event_name = "api.groups.join_failed",
            correlation_id = %correlation_id,
            error = %error,
            "group join failed"
        );
        ApiFailure::from(error)
    })?;

    info!(
        event_name = "api.groups.joined",
        correlation_id = %correlation_id,
        group_id = %group.id,
        dry_run,
        "group registered"
    );

    if dry_run {
        Ok(Json(JoinGroupResponse::Draft(group)))
    } else {
        Ok(Json(JoinGroupResponse::Joined(api.state.snapshot().groups)))
    }
}

/// Maps the wire body onto the tagged join variants. At least one of
/// `groupId`/`inviteCode` must be present; a dry run prefers `groupId` as
/// the draft id and falls back to the invite code.
fn join_request(body: JoinGroupBody) -> Result<JoinRequest, ApiFailure> {
    let JoinGroupBody { group_id, invite_code, name, description, dry_run } = body;

    if dry_run {
        let id = group_id.or(invite_code).ok_or_else(required_join_field)?;
        return Ok(JoinRequest::DryRun { id, name, description });
    }

    if let Some(invite_code) = invite_code {
        return Ok(JoinRequest::Invite { invite_code, name, description });
    }

    let group_id = group_id.ok_or_else(required_join_field)?;
    Ok(JoinRequest::Direct { group_id, name, description })
}

fn required_join_field() -> ApiFailure {
    ApiFailure::BadRequest("groupId or inviteCode is required".to_owned())
}

pub async fn send_message(
    State(api): State<ApiState>,
    Json(body): Json<SendMessageBody>,
) -> Result<Json<SendMessageResponse>, ApiFailure> {
    let correlation_id = Uuid::new_v4();

    if body.group_id.trim().is_empty() || body.content.trim().is_empty() {
        return Err(ApiFailure::BadRequest("groupId and content are required".to_owned()));
    }

    let (status, result) = if body.dry_run {
        ("simulated", api.runtime.simulate_send(&body.group_id, &body.content))
    } else {
        ("sent", api.runtime.handle_manual_send(&body.group_id, &body.content).await)
    };

    let message = result.map_err(|error| {
        warn!(
            event_name = "api.messages.send_failed",
            correlation_id = %correlation_id,
            group_id = %body.group_id,
            error = %error,
            "message send failed"
        );
        ApiFailure::from(error)
    })?;

    info!(
        event_name = "api.messages.sent",
        correlation_id = %correlation_id,
        group_id = %body.group_id,
        message_id = %message.id,
        status,
        "message dispatched"
    );
    Ok(Json(SendMessageResponse { status, message }))
}
