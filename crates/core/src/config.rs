use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub whatsapp: WhatsappConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Display name used as the default outbound message sender.
    pub name: String,
    /// How many trailing messages per group the reply policy gets to see.
    pub reply_context_depth: usize,
}

#[derive(Clone, Debug)]
pub struct WhatsappConfig {
    pub api_base: String,
    pub access_token: Option<SecretString>,
    pub phone_number_id: Option<String>,
    /// Shared secret echoed back during the webhook subscription handshake.
    pub verify_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub agent_name: Option<String>,
    pub api_base: Option<String>,
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub verify_token: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig { name: "Nova".to_string(), reply_context_depth: 20 },
            whatsapp: WhatsappConfig {
                api_base: "https://graph.facebook.com/v19.0".to_string(),
                access_token: None,
                phone_number_id: None,
                verify_token: None,
                timeout_secs: 10,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("nova.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(agent) = patch.agent {
            if let Some(name) = agent.name {
                self.agent.name = name;
            }
            if let Some(reply_context_depth) = agent.reply_context_depth {
                self.agent.reply_context_depth = reply_context_depth;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(api_base) = whatsapp.api_base {
                self.whatsapp.api_base = api_base;
            }
            if let Some(access_token_value) = whatsapp.access_token {
                self.whatsapp.access_token = Some(secret_value(access_token_value));
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
            if let Some(verify_token_value) = whatsapp.verify_token {
                self.whatsapp.verify_token = Some(secret_value(verify_token_value));
            }
            if let Some(timeout_secs) = whatsapp.timeout_secs {
                self.whatsapp.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Bare names are what the original deployment exported; the NOVA_*
        // forms win when both are present.
        if let Some(value) = read_env("NOVA_AGENT_NAME").or_else(|| read_env("AGENT_NAME")) {
            self.agent.name = value;
        }
        if let Some(value) = read_env("NOVA_AGENT_REPLY_CONTEXT_DEPTH") {
            self.agent.reply_context_depth =
                parse_usize("NOVA_AGENT_REPLY_CONTEXT_DEPTH", &value)?;
        }

        let api_base =
            read_env("NOVA_WHATSAPP_API_BASE").or_else(|| read_env("WHATSAPP_GRAPH_API_BASE"));
        if let Some(value) = api_base {
            self.whatsapp.api_base = value;
        }
        let access_token =
            read_env("NOVA_WHATSAPP_ACCESS_TOKEN").or_else(|| read_env("WHATSAPP_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.whatsapp.access_token = Some(secret_value(value));
        }
        let phone_number_id = read_env("NOVA_WHATSAPP_PHONE_NUMBER_ID")
            .or_else(|| read_env("WHATSAPP_PHONE_NUMBER_ID"));
        if let Some(value) = phone_number_id {
            self.whatsapp.phone_number_id = Some(value);
        }
        let verify_token =
            read_env("NOVA_WHATSAPP_VERIFY_TOKEN").or_else(|| read_env("WHATSAPP_VERIFY_TOKEN"));
        if let Some(value) = verify_token {
            self.whatsapp.verify_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("NOVA_WHATSAPP_TIMEOUT_SECS") {
            self.whatsapp.timeout_secs = parse_u64("NOVA_WHATSAPP_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("NOVA_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("NOVA_SERVER_PORT") {
            self.server.port = parse_u16("NOVA_SERVER_PORT", &value)?;
        }

        let log_level = read_env("NOVA_LOGGING_LEVEL").or_else(|| read_env("NOVA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("NOVA_LOGGING_FORMAT").or_else(|| read_env("NOVA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(agent_name) = overrides.agent_name {
            self.agent.name = agent_name;
        }
        if let Some(api_base) = overrides.api_base {
            self.whatsapp.api_base = api_base;
        }
        if let Some(access_token) = overrides.access_token {
            self.whatsapp.access_token = Some(secret_value(access_token));
        }
        if let Some(phone_number_id) = overrides.phone_number_id {
            self.whatsapp.phone_number_id = Some(phone_number_id);
        }
        if let Some(verify_token) = overrides.verify_token {
            self.whatsapp.verify_token = Some(secret_value(verify_token));
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent(&self.agent)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("nova.toml"), PathBuf::from("config/nova.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.name must not be empty".to_string()));
    }

    if agent.reply_context_depth == 0 || agent.reply_context_depth > 500 {
        return Err(ConfigError::Validation(
            "agent.reply_context_depth must be in range 1..=500".to_string(),
        ));
    }

    Ok(())
}

fn validate_whatsapp(whatsapp: &WhatsappConfig) -> Result<(), ConfigError> {
    let api_base = whatsapp.api_base.trim();
    if !api_base.starts_with("http://") && !api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "whatsapp.api_base must start with http:// or https://".to_string(),
        ));
    }

    if whatsapp.timeout_secs == 0 || whatsapp.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "whatsapp.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let has_token = whatsapp
        .access_token
        .as_ref()
        .map(|value| !value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    let has_phone_number = whatsapp
        .phone_number_id
        .as_ref()
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    if has_token && !has_phone_number {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required when whatsapp.access_token is set. Find it under Meta for Developers > WhatsApp > API Setup".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    agent: Option<AgentPatch>,
    whatsapp: Option<WhatsappPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    name: Option<String>,
    reply_context_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsappPatch {
    api_base: Option<String>,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
