use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Webhook path must start with '/': {0}")]
    InvalidWebhookPath(String),

    #[error("{0}: username and password must be set together")]
    IncompleteCredentials(&'static str),

    #[error("{0}: timeout_secs must be greater than 0")]
    InvalidTimeout(&'static str),

    #[error("Webhook max_body_bytes must be greater than 0")]
    InvalidBodyLimit,

    #[error("influxdb is enabled but no host is configured")]
    MissingInfluxHost,

    #[error("influxdb is enabled but no database is configured")]
    MissingInfluxDatabase,

    #[error("stathat is enabled but no key is configured")]
    MissingStatHatKey,

    #[error("Invalid stathat URL: {0}")]
    InvalidStatHatUrl(String),
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener receiving webhook deliveries
    pub listener: Listener,
    /// Admin listener for health and readiness checks
    pub admin_listener: Listener,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(flatten)]
    pub backends: BackendsConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.webhook.validate()?;
        self.backends.validate()?;
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub path: String,
    /// Basic auth credentials the provider must present. Unauthenticated when unset.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Deliveries above this size are answered with 413
    pub max_body_bytes: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            path: "/api/sparkpost/webhook".into(),
            username: None,
            password: None,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidWebhookPath(self.path.clone()));
        }
        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }
        check_credentials("webhook", &self.username, &self.password)
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}

/// The two metrics backends. Each one is switched on independently.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct BackendsConfig {
    #[serde(default)]
    pub influxdb: InfluxConfig,
    #[serde(default)]
    pub stathat: StatHatConfig,
}

impl BackendsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.influxdb.validate()?;
        self.stathat.validate()?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct InfluxConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        InfluxConfig {
            enabled: false,
            host: "localhost".into(),
            port: 8086,
            protocol: Protocol::Http,
            database: String::new(),
            username: None,
            password: None,
            timeout_secs: 10,
        }
    }
}

impl InfluxConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.host.is_empty() {
            return Err(ValidationError::MissingInfluxHost);
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.database.is_empty() {
            return Err(ValidationError::MissingInfluxDatabase);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("influxdb"));
        }
        check_credentials("influxdb", &self.username, &self.password)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatHatConfig {
    pub enabled: bool,
    /// EZ key identifying the account
    pub key: String,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for StatHatConfig {
    fn default() -> Self {
        StatHatConfig {
            enabled: false,
            key: String::new(),
            url: "https://api.stathat.com/ez".into(),
            timeout_secs: 10,
        }
    }
}

impl StatHatConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled {
            return Ok(());
        }
        if self.key.is_empty() {
            return Err(ValidationError::MissingStatHatKey);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("stathat"));
        }
        Url::parse(&self.url).map_err(|e| ValidationError::InvalidStatHatUrl(e.to_string()))?;
        Ok(())
    }
}

fn check_credentials(
    section: &'static str,
    username: &Option<String>,
    password: &Option<String>,
) -> Result<(), ValidationError> {
    match (username, password) {
        (Some(_), None) | (None, Some(_)) => Err(ValidationError::IncompleteCredentials(section)),
        _ => Ok(()),
    }
}
