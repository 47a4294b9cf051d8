//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for wahook-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set. The two webhook secrets default to
/// unset, which makes the webhook endpoints fail closed.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite database URL (default: `"sqlite://wahook.db?mode=rwc"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory for a daily-rolling log file in addition to stdout.
    pub log_dir: Option<String>,

    /// Token the provider echoes back during the `GET /webhook` handshake.
    pub verify_token: Option<String>,

    /// App secret used to check `X-Hub-Signature-256` on `POST /webhook`.
    pub app_secret: Option<String>,

    /// Graph API origin, e.g. `"https://graph.facebook.com"`.
    pub graph_api_base: String,

    /// Graph API version path segment, e.g. `"v21.0"`.
    pub graph_api_version: String,

    /// Access token used for tenants that do not carry their own.
    pub default_access_token: Option<String>,

    /// Send a read receipt for every newly stored inbound message.
    pub mark_as_read: bool,

    /// Capacity of the side-effect queue (auto-replies, read receipts).
    pub outbox_capacity: usize,

    /// Per-tenant real-time channel buffer.
    pub event_buffer: usize,

    /// Bearer token protecting `/admin`; `None` leaves it open.
    pub admin_token: Option<String>,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("WAHOOK_BIND", "0.0.0.0:3000"),
            database_url: env_or("WAHOOK_DATABASE_URL", "sqlite://wahook.db?mode=rwc"),
            log_level: env_or("WAHOOK_LOG", "info"),
            log_json: parse_bool("WAHOOK_LOG_JSON", false),
            log_dir: env_opt("WAHOOK_LOG_DIR"),
            verify_token: env_opt("WAHOOK_VERIFY_TOKEN"),
            app_secret: env_opt("WAHOOK_APP_SECRET"),
            graph_api_base: env_or("WAHOOK_GRAPH_API_BASE", "https://graph.facebook.com"),
            graph_api_version: env_or("WAHOOK_GRAPH_API_VERSION", "v21.0"),
            default_access_token: env_opt("WAHOOK_ACCESS_TOKEN"),
            mark_as_read: parse_bool("WAHOOK_MARK_AS_READ", true),
            outbox_capacity: parse_env("WAHOOK_OUTBOX_CAPACITY", 256),
            event_buffer: parse_env("WAHOOK_EVENT_BUFFER", 64),
            admin_token: env_opt("WAHOOK_ADMIN_TOKEN"),
            cors_allowed_origins: env_opt("WAHOOK_CORS_ORIGINS"),
            enable_swagger: parse_bool("WAHOOK_ENABLE_SWAGGER", true),
        }
    }
}

impl Default for Config {
    /// Defaults without reading the environment; used by tests.
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_owned(),
            database_url: "sqlite::memory:".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            log_dir: None,
            verify_token: None,
            app_secret: None,
            graph_api_base: "https://graph.facebook.com".to_owned(),
            graph_api_version: "v21.0".to_owned(),
            default_access_token: None,
            mark_as_read: false,
            outbox_capacity: 64,
            event_buffer: 16,
            admin_token: None,
            cors_allowed_origins: None,
            enable_swagger: false,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Unset and blank values both count as absent.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
