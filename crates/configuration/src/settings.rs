use serde::Deserialize;

/// The root configuration structure for the entire application.
///
/// Every section falls back to its `Default` impl, so a deployment only needs
/// to set the values it wants to change (typically `database.url` and
/// `auth.jwt_secret`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub api_logging: ApiLoggingSettings,
    pub cache: CacheSettings,
    pub programs: ProgramSettings,
    pub logging: LoggingSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit_bytes: usize,
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres connection string. When empty, `DATABASE_URL` is used.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Bearer token settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HMAC secret used to sign access tokens. Must be at least 32 characters.
    pub jwt_secret: String,
    /// Lifetime of an access token.
    pub token_ttl_minutes: i64,
    pub issuer: String,
    /// Re-read the account on every authenticated request, so deactivation
    /// and role changes apply before the token expires.
    pub check_account_status: bool,
}

/// Controls what the API request logger records.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiLoggingSettings {
    pub enabled: bool,
    pub log_request_body: bool,
    pub log_response_body: bool,
    pub log_headers: bool,
    pub log_query_params: bool,
    /// Bodies longer than this many characters are truncated.
    pub truncate_body_at: usize,
    /// A request is skipped when its path contains any of these.
    pub exclude_paths: Vec<String>,
    pub exclude_methods: Vec<String>,
    /// Record only responses with status 400 and above.
    pub log_only_errors: bool,
    /// Age after which `prune-logs` deletes entries.
    pub retention_days: i64,
    /// Entries buffered between the middleware and the writer task.
    pub channel_capacity: usize,
}

/// HTTP caching headers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
}

/// Holiday program seat limits per participant kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgramSettings {
    pub member_capacity: i64,
    pub mentor_capacity: i64,
}

/// Log output settings for the binaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub directory: Option<String>,
}

// ==============================================================================
// Defaults
// ==============================================================================

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: 60,
            issuer: "clubhouse".to_string(),
            check_account_status: true,
        }
    }
}

impl Default for ApiLoggingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            log_request_body: true,
            log_response_body: true,
            log_headers: true,
            log_query_params: true,
            truncate_body_at: 5000,
            exclude_paths: vec!["/health".to_string(), "/ping".to_string()],
            exclude_methods: Vec::new(),
            log_only_errors: false,
            retention_days: 30,
            channel_capacity: 1024,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            member_capacity: 30,
            mentor_capacity: 5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}
