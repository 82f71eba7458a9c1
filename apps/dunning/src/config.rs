//! # Configuration
//!
//! `AppConfig` is read from an optional TOML file and then overridden by
//! environment variables.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [security]
//! api_key = "change-me"
//! rate_limit = 100
//! cors_origins = "https://portal.example.com"
//!
//! [mail]
//! webhook_url = "https://mail.example.com/v1/send"
//! token = "provider-token"
//! from = "billing@example.com"
//! timeout_secs = 10
//! ```
//!
//! ## Environment Overrides
//!
//! - `DUNNING_API_KEY`: bearer token for protected routes
//! - `DUNNING_RATE_LIMIT`: requests per second (0 disables)
//! - `DUNNING_CORS_ORIGINS`: comma-separated origins, or `*`
//! - `DUNNING_MAIL_WEBHOOK`: email provider endpoint
//! - `DUNNING_MAIL_TOKEN`: email provider bearer token
//! - `DUNNING_MAIL_FROM`: sender address

use dunning_core::DunningError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer token required on protected routes. `None` disables auth.
    pub api_key: Option<String>,
    /// Requests per second across all clients. 0 disables rate limiting.
    pub rate_limit: u32,
    /// Comma-separated list of allowed origins, or `*`. `None` means localhost only.
    pub cors_origins: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: 100,
            cors_origins: None,
        }
    }
}

impl SecurityConfig {
    /// The configured API key, ignoring blank values.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Email provider webhook. Without one, reminders are only logged.
    pub webhook_url: Option<String>,
    pub token: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            token: None,
            from: "billing@localhost".to_string(),
            timeout_secs: 10,
        }
    }
}

// =============================================================================
// APP CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub mail: MailConfig,
}

impl AppConfig {
    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, DunningError> {
        toml::from_str(text).map_err(|e| DunningError::InvalidConfig(e.to_string()))
    }

    /// Load from `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, DunningError> {
        let mut config = match path {
            Some(path) => {
                let metadata = std::fs::metadata(path).map_err(|e| {
                    DunningError::InvalidConfig(format!(
                        "Cannot read config '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                if metadata.len() > MAX_CONFIG_FILE_SIZE {
                    return Err(DunningError::InvalidConfig(format!(
                        "Config file size {} bytes exceeds maximum allowed {} bytes",
                        metadata.len(),
                        MAX_CONFIG_FILE_SIZE
                    )));
                }
                let text = std::fs::read_to_string(path)
                    .map_err(|e| DunningError::InvalidConfig(format!("Read config: {}", e)))?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply `DUNNING_*` overrides from `lookup`. Blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("DUNNING_API_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(raw) = get("DUNNING_RATE_LIMIT") {
            match raw.trim().parse() {
                Ok(rps) => self.security.rate_limit = rps,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid DUNNING_RATE_LIMIT"),
            }
        }
        if let Some(origins) = get("DUNNING_CORS_ORIGINS") {
            self.security.cors_origins = Some(origins);
        }
        if let Some(url) = get("DUNNING_MAIL_WEBHOOK") {
            self.mail.webhook_url = Some(url);
        }
        if let Some(token) = get("DUNNING_MAIL_TOKEN") {
            self.mail.token = Some(token);
        }
        if let Some(from) = get("DUNNING_MAIL_FROM") {
            self.mail.from = from;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
