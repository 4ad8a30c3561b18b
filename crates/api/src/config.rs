//! Application configuration

use std::env;

/// Value of `DATABASE_URL` that selects the in-process store
pub const MEMORY_DATABASE_URL: &str = "memory";

/// Where call requests and chat messages are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { url: String, max_connections: u32 },
    /// Nothing survives a restart. Local development and tests only.
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub cors_allowed_origin: Option<String>,

    // Database
    pub storage: StorageBackend,
    pub run_migrations: bool,

    // Authentication
    pub jwt_secret: String,

    // Chat
    pub chat_max_message_chars: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let storage = if database_url.trim() == MEMORY_DATABASE_URL {
            StorageBackend::Memory
        } else {
            StorageBackend::Postgres {
                url: database_url,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            }
        };

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .ok()
                .filter(|o| !o.trim().is_empty()),

            // Database
            storage,
            run_migrations: parse_var("RUN_MIGRATIONS", true)?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Chat
            chat_max_message_chars: {
                let max = parse_var("CHAT_MAX_MESSAGE_CHARS", 2000usize)?;
                if max == 0 {
                    return Err(ConfigError::Invalid {
                        var: "CHAT_MAX_MESSAGE_CHARS",
                        value: "0".to_string(),
                    });
                }
                max
            },
        })
    }

    /// In-memory configuration for tests
    pub fn for_testing() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            cors_allowed_origin: None,
            storage: StorageBackend::Memory,
            run_migrations: false,
            jwt_secret: "test-jwt-secret-must-be-at-least-32-characters-long".to_string(),
            chat_max_message_chars: 2000,
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        _ => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
