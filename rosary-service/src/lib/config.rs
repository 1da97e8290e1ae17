use std::env;
use std::fmt;

use auth::HashingParams;
use auth::TokenSettings;
use chrono::Duration;
use config::Config as ConfigBuilder;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::domain::user::models::SessionPolicy;
use crate::inbound::http::router::RateLimitPolicy;
use crate::outbound::mail::smtp::SmtpSettings;

/// Application configuration for rosary-service.
///
/// Loaded from configuration files with environment variable overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    pub mail: MailConfig,
}

/// PostgreSQL database configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
}

/// Signing secrets and token lifetimes.
#[derive(Deserialize, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    #[serde(default)]
    pub issuer: Option<String>,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HashingConfig {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
    /// Use minimal costs regardless of the values above
    pub test_mode: bool,
}

impl Default for HashingConfig {
    fn default() -> Self {
        let params = HashingParams::default();
        Self {
            memory_cost_kib: params.memory_cost_kib,
            time_cost: params.time_cost,
            parallelism: params.parallelism,
            test_mode: false,
        }
    }
}

/// Session lifecycle limits.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub max_refresh_tokens: usize,
    pub verification_ttl_minutes: i64,
    pub email_change_ttl_minutes: i64,
    pub password_reset_ttl_minutes: i64,
    pub deletion_grace_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_refresh_tokens: 5,
            verification_ttl_minutes: 60,
            email_change_ttl_minutes: 60,
            password_reset_ttl_minutes: 60,
            deletion_grace_days: 14,
        }
    }
}

/// Per-client request budget. Zero requests turns limiting off.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub period_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 20,
            period_seconds: 10,
        }
    }
}

/// Outbound mail and link targets.
///
/// Without `smtp_host` mails are kept in an in-process outbox instead of sent.
#[derive(Deserialize, Clone)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub starttls: bool,
    pub from_address: String,
    pub api_base_url: String,
    pub frontend_url: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("starttls", &self.starttls)
            .field("from_address", &self.from_address)
            .field("api_base_url", &self.api_base_url)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from files with environment variable overrides.
    ///
    /// # Configuration Priority (highest to lowest)
    /// 1. Environment variables (DATABASE__URL, JWT__ACCESS_SECRET, etc.)
    /// 2. Environment-specific config file (config/{environment}.toml)
    /// 3. Default config file (config/default.toml)
    ///
    /// # Returns
    /// Loaded configuration
    ///
    /// # Errors
    /// Returns an error if a required value is missing or malformed
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let configuration = ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Example: DATABASE__URL=postgres://... overrides database.url
            .add_source(Environment::with_prefix("").separator("__"))
            .build()?;

        configuration.try_deserialize()
    }

    pub fn hashing_params(&self) -> HashingParams {
        if self.hashing.test_mode {
            return HashingParams::relaxed();
        }
        HashingParams {
            memory_cost_kib: self.hashing.memory_cost_kib,
            time_cost: self.hashing.time_cost,
            parallelism: self.hashing.parallelism,
        }
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_secret: self.jwt.access_secret.as_bytes().to_vec(),
            refresh_secret: self.jwt.refresh_secret.as_bytes().to_vec(),
            access_ttl: Duration::seconds(self.jwt.access_ttl_seconds),
            refresh_ttl: Duration::seconds(self.jwt.refresh_ttl_seconds),
            issuer: self.jwt.issuer.clone(),
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            max_refresh_tokens: self.session.max_refresh_tokens,
            verification_ttl: Duration::minutes(self.session.verification_ttl_minutes),
            email_change_ttl: Duration::minutes(self.session.email_change_ttl_minutes),
            password_reset_ttl: Duration::minutes(self.session.password_reset_ttl_minutes),
            deletion_grace: Duration::days(self.session.deletion_grace_days),
            api_base_url: self.mail.api_base_url.trim_end_matches('/').to_string(),
            frontend_url: self.mail.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            requests: self.rate_limit.requests,
            period: std::time::Duration::from_secs(self.rate_limit.period_seconds),
        }
    }

    /// SMTP relay settings, if a relay is configured.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        let host = self.mail.smtp_host.as_ref().filter(|host| !host.is_empty())?;
        Some(SmtpSettings {
            host: host.clone(),
            port: self.mail.smtp_port,
            username: self.mail.smtp_username.clone(),
            password: self.mail.smtp_password.clone(),
            starttls: self.mail.starttls,
            from_address: self.mail.from_address.clone(),
        })
    }
}
