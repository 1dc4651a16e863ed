//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys
//! use `__` as separator, e.g. `SSO__CLIENT_ID` or `FRAMEWORK__VERSION`.
//!
//! See [`SsoConfig`] for the single sign-on settings.

use google_sso::{HostFramework, SsoConfig};
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// PostgreSQL database connection URL. Users are kept in memory when
    /// unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Host framework the SSO layer adapts to.
    #[serde(default)]
    pub framework: HostFramework,

    /// Google single sign-on configuration.
    pub sso: SsoConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Lifetime in minutes of sessions nobody is signed in to, such as a
    /// pending login.
    #[serde(default = "default_anonymous_duration_minutes")]
    pub anonymous_duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    // Two weeks.
    14 * 24 * 60
}

fn default_anonymous_duration_minutes() -> i64 {
    30
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            anonymous_duration_minutes: default_anonymous_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_sso::compat::HOST_API_VERSION;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duration_minutes, 20_160);
        assert_eq!(config.anonymous_duration_minutes, 30);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
    }

    #[test]
    fn server_config_deserializes_with_defaults() {
        let json = r#"{
            "sso": {
                "client_id": "id",
                "client_secret": "secret",
                "redirect_uri": "http://localhost:8000/google_sso/callback/"
            }
        }"#;

        let config: ServerConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.listen_addr, "127.0.0.1:8000");
        assert!(config.database_url.is_none());
        assert_eq!(config.framework.version(), HOST_API_VERSION);
        assert!(config.sso.enabled());
    }
}
