//! Configuration management for autopost
//!
//! Configuration comes from a TOML file or from environment variables
//! (`AUTOPOST_*`, plus `OLLAMA_*` for the generator). Every section has
//! defaults, so a file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::approval::ApprovalConfig;
use crate::generator::LlmConfig;
use crate::queue::QueueConfig;
use crate::schedule::ScheduleConfig;
use crate::utils::webhook::WebhookConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`Config`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or malformed
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// A required value is absent
    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue policy
    pub queue: QueueConfig,

    /// Approval timeouts
    pub approval: ApprovalConfig,

    /// Default schedule for batches that do not bring their own
    pub schedule: ScheduleConfig,

    /// LLM generator
    pub generator: LlmConfig,

    /// Publish target webhook
    pub publisher: WebhookConfig,

    /// Operator channel
    pub channel: ChannelConfig,

    /// Attachment catalogue
    pub attachments: AttachmentsConfig,

    /// Control server
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            approval: ApprovalConfig::default(),
            schedule: ScheduleConfig::default(),
            generator: LlmConfig::default(),
            publisher: WebhookConfig::new("http://localhost:9000/publish"),
            channel: ChannelConfig::default(),
            attachments: AttachmentsConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Operator channel kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Terminal prompts on stdin/stdout
    #[default]
    Console,
    /// JSON webhook to an operator bridge
    Webhook,
}

impl ChannelKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Webhook => "webhook",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "webhook" => Ok(Self::Webhook),
            other => Err(format!("unknown channel kind '{other}'")),
        }
    }
}

/// Operator channel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel kind
    pub kind: ChannelKind,

    /// Operator bridge endpoint, required for [`ChannelKind::Webhook`]
    pub webhook: Option<WebhookConfig>,
}

/// Attachment catalogue configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentsConfig {
    /// Directory of image and video files; no catalogue when unset
    pub dir: Option<PathBuf>,
}

/// Control server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Read and parse an environment variable, `None` when unset
fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(name, e.to_string())),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            generator: LlmConfig::from_env(),
            ..Self::default()
        };

        if let Some(max) = env_parse("AUTOPOST_MAX_BATCH_SIZE")? {
            config.queue.max_batch_size = max;
        }
        if let Some(live) = env_parse("AUTOPOST_MAKE_LIVE")? {
            config.queue.make_live = live;
        }
        if let Some(secs) = env_parse("AUTOPOST_APPROVAL_TIMEOUT")? {
            config.approval.approval_timeout_secs = secs;
        }
        if let Some(secs) = env_parse("AUTOPOST_REPLY_TIMEOUT")? {
            config.approval.reply_timeout_secs = secs;
        }

        if let Ok(tz) = std::env::var("AUTOPOST_TIMEZONE") {
            config.schedule.timezone = tz;
        }
        if let Some(hours) = env_parse("AUTOPOST_INTERVAL_HOURS")? {
            config.schedule.interval_hours = hours;
        }

        if let Ok(url) = std::env::var("AUTOPOST_PUBLISH_URL") {
            config.publisher.url = url;
        }
        if let Ok(token) = std::env::var("AUTOPOST_PUBLISH_TOKEN") {
            config.publisher.auth_token = Some(token);
        }

        if let Some(kind) = env_parse("AUTOPOST_CHANNEL")? {
            config.channel.kind = kind;
        }
        if let Ok(url) = std::env::var("AUTOPOST_CHANNEL_URL") {
            let mut webhook = WebhookConfig::new(url);
            webhook.auth_token = std::env::var("AUTOPOST_CHANNEL_TOKEN").ok();
            config.channel.webhook = Some(webhook);
        }

        config.attachments.dir = std::env::var("AUTOPOST_ATTACHMENTS_DIR").ok().map(PathBuf::from);

        if let Some(addr) = env_parse("AUTOPOST_BIND_ADDRESS")? {
            config.server.bind_address = addr;
        }

        if let Ok(level) = std::env::var("AUTOPOST_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("AUTOPOST_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue
            .validate()
            .map_err(|reason| ConfigError::invalid("queue", reason))?;
        self.approval
            .validate()
            .map_err(|reason| ConfigError::invalid("approval", reason))?;
        self.schedule
            .validate()
            .map_err(|e| ConfigError::invalid("schedule", e.to_string()))?;

        let endpoint = url::Url::parse(&self.generator.endpoint)
            .map_err(|e| ConfigError::invalid("generator.endpoint", e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "generator.endpoint",
                "must start with http:// or https://",
            ));
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::invalid("generator.timeout_secs", "must be greater than 0"));
        }

        self.publisher
            .validate()
            .map_err(|reason| ConfigError::invalid("publisher", reason))?;

        match (self.channel.kind, &self.channel.webhook) {
            (ChannelKind::Webhook, None) => {
                return Err(ConfigError::MissingField {
                    field: "channel.webhook".to_string(),
                })
            }
            (_, Some(webhook)) => webhook
                .validate()
                .map_err(|reason| ConfigError::invalid("channel.webhook", reason))?,
            (ChannelKind::Console, None) => {}
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("expected 'text' or 'json', got '{}'", self.logging.format),
            ));
        }

        Ok(())
    }
}
