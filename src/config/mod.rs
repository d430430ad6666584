use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::consent::EmailTemplates;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub consent: ConsentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let consent = ConsentConfig::load()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            consent,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Consent-specific settings: the token signing secret, token validity, the
/// consent portal address, and the notification template identifiers.
#[derive(Debug, Clone)]
pub struct ConsentConfig {
    pub token_secret: String,
    pub token_validity_days: u32,
    pub portal_base_url: String,
    pub templates: EmailTemplates,
}

impl ConsentConfig {
    fn load() -> Result<Self, ConfigError> {
        let token_secret =
            env::var("CONSENT_TOKEN_SECRET").map_err(|_| ConfigError::MissingTokenSecret)?;
        if token_secret.trim().is_empty() {
            return Err(ConfigError::MissingTokenSecret);
        }

        let token_validity_days = env::var("CONSENT_TOKEN_VALIDITY_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse::<u32>()
            .ok()
            .filter(|days| *days > 0)
            .ok_or(ConfigError::InvalidValidityDays)?;

        let portal_base_url = env::var("CONSENT_PORTAL_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/".to_string());

        let template = |var: &str, default: &str| {
            env::var(var).unwrap_or_else(|_| default.to_string())
        };

        Ok(Self {
            token_secret,
            token_validity_days,
            portal_base_url,
            templates: EmailTemplates {
                consent_invitation: template("CONSENT_EMAIL_TEMPLATE_ID", "consent-invitation"),
                owner_confirmation: template(
                    "CONSENT_OWNER_CONFIRM_TEMPLATE_ID",
                    "owner-confirmation",
                ),
                installer_confirmation: template(
                    "CONSENT_INSTALLER_CONFIRM_TEMPLATE_ID",
                    "installer-confirmation",
                ),
                installer_not_chosen: template(
                    "CONSENT_INSTALLER_NOT_CHOSEN_TEMPLATE_ID",
                    "installer-not-chosen",
                ),
            },
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingTokenSecret,
    InvalidValidityDays,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingTokenSecret => {
                write!(f, "CONSENT_TOKEN_SECRET must be set to a non-empty value")
            }
            ConfigError::InvalidValidityDays => {
                write!(f, "CONSENT_TOKEN_VALIDITY_DAYS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
