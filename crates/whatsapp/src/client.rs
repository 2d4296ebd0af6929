use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Failure taxonomy for the Graph API. Every variant is non-fatal to the
/// runtime: the caller records disconnection and moves on.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("graph api rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },
    #[error("graph api request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("graph api transport failure: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinGroupRequest {
    pub invite_code: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// What the platform resolved an invite into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupHandle {
    pub group_id: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Outbound seam to the messaging platform. No implicit retry; duplicate
/// calls may duplicate delivery.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn join_group(&self, request: JoinGroupRequest) -> Result<GroupHandle, ApiError>;
    async fn send_message(&self, group_id: &str, content: &str) -> Result<SendReceipt, ApiError>;
}

/// Stand-in used when no Graph credentials are configured. Keeps dry-run
/// flows usable while making every live call an explicit rejection.
#[derive(Default)]
pub struct UnconfiguredClient;

#[async_trait]
impl MessagingClient for UnconfiguredClient {
    async fn join_group(&self, _request: JoinGroupRequest) -> Result<GroupHandle, ApiError> {
        Err(unconfigured())
    }

    async fn send_message(&self, _group_id: &str, _content: &str) -> Result<SendReceipt, ApiError> {
        Err(unconfigured())
    }
}

fn unconfigured() -> ApiError {
    ApiError::Rejected {
        code: 401,
        message: "whatsapp access credentials are not configured".to_owned(),
    }
}

/// Thin adapter over the WhatsApp Graph API. Owns the request timeout and
/// error translation; everything else is a straight HTTP call.
pub struct GraphApiClient {
    http: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    access_token: SecretString,
    timeout_secs: u64,
}

impl GraphApiClient {
    pub fn new(
        api_base: &str,
        phone_number_id: &str,
        access_token: SecretString,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
            phone_number_id: phone_number_id.to_owned(),
            access_token,
            timeout_secs,
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}/{resource}", self.api_base, self.phone_number_id)
    }

    fn classify(&self, error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout { secs: self.timeout_secs }
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl MessagingClient for GraphApiClient {
    async fn join_group(&self, request: JoinGroupRequest) -> Result<GroupHandle, ApiError> {
        let response = self
            .http
            .post(self.endpoint("groups"))
            .bearer_auth(self.access_token.expose_secret())
            .json(&json!({ "invite_code": request.invite_code }))
            .send()
            .await
            .map_err(|error| self.classify(error))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let joined = response
            .json::<JoinResponse>()
            .await
            .map_err(|error| ApiError::Transport(error.to_string()))?;
        debug!(
            event_name = "egress.graph.group_joined",
            group_id = %joined.id,
            "graph api accepted group join"
        );

        Ok(GroupHandle { group_id: joined.id, name: joined.subject.or(request.name) })
    }

    async fn send_message(&self, group_id: &str, content: &str) -> Result<SendReceipt, ApiError> {
        let response = self
            .http
            .post(self.endpoint("messages"))
            .bearer_auth(self.access_token.expose_secret())
            .json(&outbound_text_body(group_id, content))
            .send()
            .await
            .map_err(|error| self.classify(error))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let sent = response
            .json::<SendResponse>()
            .await
            .map_err(|error| ApiError::Transport(error.to_string()))?;
        let message_id = sent
            .messages
            .into_iter()
            .next()
            .map(|entry| entry.id)
            .ok_or_else(|| ApiError::Transport("graph response carried no message id".to_owned()))?;

        Ok(SendReceipt { message_id, timestamp: Utc::now() })
    }
}

/// Graph wire shape for an outbound group text.
fn outbound_text_body(group_id: &str, content: &str) -> serde_json::Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "group",
        "to": group_id,
        "type": "text",
        "text": { "body": content },
    })
}

async fn rejection(response: reqwest::Response) -> ApiError {
    let code = response.status().as_u16();
    let message = match response.json::<GraphErrorEnvelope>().await {
        Ok(envelope) => envelope.error.message,
        Err(_) => "graph api returned an unreadable error body".to_owned(),
    };
    ApiError::Rejected { code, message }
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    id: String,
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}
