use std::sync::Arc;

use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use nova_agent::{AgentRuntime, NoReplyPolicy};
use nova_core::config::{AppConfig, ConfigError};
use nova_core::{Persona, StateHandle};
use nova_whatsapp::client::{GraphApiClient, MessagingClient, UnconfiguredClient};

use crate::{api, health, webhook};

pub struct Application {
    pub config: AppConfig,
    pub state: StateHandle,
    pub runtime: Arc<AgentRuntime>,
    pub messaging_mode: MessagingMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessagingMode {
    Graph,
    Unconfigured,
}

impl MessagingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Unconfigured => "unconfigured",
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let state = StateHandle::new(Persona::named(config.agent.name.as_str()));

    let credentials = config
        .whatsapp
        .access_token
        .as_ref()
        .zip(config.whatsapp.phone_number_id.as_deref());
    let (client, messaging_mode): (Arc<dyn MessagingClient>, MessagingMode) = match credentials {
        Some((access_token, phone_number_id)) => {
            let client = GraphApiClient::new(
                &config.whatsapp.api_base,
                phone_number_id,
                access_token.expose_secret().to_owned().into(),
                config.whatsapp.timeout_secs,
            )
            .map_err(BootstrapError::HttpClient)?;
            (Arc::new(client), MessagingMode::Graph)
        }
        None => (Arc::new(UnconfiguredClient), MessagingMode::Unconfigured),
    };
    info!(
        event_name = "system.bootstrap.messaging_mode",
        correlation_id = "bootstrap",
        messaging_mode = messaging_mode.as_str(),
        "messaging client initialized"
    );

    let runtime = Arc::new(AgentRuntime::new(
        state.clone(),
        client,
        Arc::new(NoReplyPolicy),
        config.agent.name.clone(),
        config.agent.reply_context_depth,
    ));

    Ok(Application { config, state, runtime, messaging_mode })
}

/// One merged router: dashboard API, webhook surface, health.
pub fn router(app: &Application) -> Router {
    let verify_token = app
        .config
        .whatsapp
        .verify_token
        .as_ref()
        .map(|token| token.expose_secret().to_owned());

    api::router(app.state.clone(), app.runtime.clone())
        .merge(webhook::router(app.runtime.clone(), verify_token))
        .merge(health::router(app.state.clone(), app.messaging_mode))
}
