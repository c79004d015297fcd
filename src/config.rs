//! LiveVote Configuration
//!
//! This module provides configuration structures for the LiveVote
//! server and its admin tooling.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides `admin.password`
pub const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";

/// Main LiveVote configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveVoteConfig {
    /// HTTP / WebSocket server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Vote database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Admin access configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Voting round configuration
    #[serde(default)]
    pub voting: VotingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API and WebSocket endpoint
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Take the client address from X-Forwarded-For / X-Real-IP
    /// (only enable behind a reverse proxy that sets these headers)
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

/// Vote database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

/// Admin access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Shared admin password
    #[serde(default)]
    pub password: String,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

/// How voters are told apart for deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// Client network address
    Address,
    /// Per-browser session token
    Session,
}

/// Voting round configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Round length used when the admin does not give one
    #[serde(default = "default_round_secs")]
    pub default_round_secs: u64,

    /// Voter identity source
    #[serde(default = "default_identity")]
    pub identity: IdentitySource,

    /// Contestants seeded into an empty database
    #[serde(default)]
    pub contestants: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("voting.db")
}

fn default_session_ttl_secs() -> u64 {
    12 * 60 * 60
}

fn default_round_secs() -> u64 {
    60
}

fn default_identity() -> IdentitySource {
    IdentitySource::Address
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: false,
            trust_forwarded_for: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            default_round_secs: default_round_secs(),
            identity: default_identity(),
            contestants: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LiveVoteConfig {
    /// Load configuration from a TOML file, applying environment overrides
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: LiveVoteConfig = toml::from_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: LiveVoteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration written by `livevote init`
    pub fn sample(password: &str) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            admin: AdminConfig {
                password: password.to_string(),
                ..AdminConfig::default()
            },
            voting: VotingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(ADMIN_PASSWORD_ENV) {
            if !password.is_empty() {
                tracing::debug!("Admin password taken from {}", ADMIN_PASSWORD_ENV);
                self.admin.password = password;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        if self.admin.password.is_empty() {
            return Err(crate::Error::Config(format!(
                "admin.password cannot be empty (set it in the file or via {})",
                ADMIN_PASSWORD_ENV
            )));
        }

        if self.admin.session_ttl_secs == 0 {
            return Err(crate::Error::Config("admin.session_ttl_secs must be > 0".into()));
        }

        if self.voting.default_round_secs == 0 {
            return Err(crate::Error::Config("voting.default_round_secs must be > 0".into()));
        }

        if self.voting.default_round_secs > crate::round::MAX_ROUND.as_secs() {
            return Err(crate::Error::Config(format!(
                "voting.default_round_secs cannot exceed {}",
                crate::round::MAX_ROUND.as_secs()
            )));
        }

        if self.voting.contestants.iter().any(|name| name.trim().is_empty()) {
            return Err(crate::Error::Config("voting.contestants cannot contain empty names".into()));
        }

        Ok(())
    }

    /// Get the default round length as Duration
    pub fn default_round(&self) -> Duration {
        Duration::from_secs(self.voting.default_round_secs)
    }

    /// Get the admin session lifetime as Duration
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.admin.session_ttl_secs)
    }
}
