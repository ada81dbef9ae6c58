//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use crate::moderation::DEFAULT_BANNED_PHRASES;

/// Persona sent as the fixed system message ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a quick-witted roast writer helping people \
answer trolls online. Using the details the user gives you, write a short, cutting comeback \
in the same language the user writes in, drawing on that language's idioms, history and \
internet memes. Keep it clever rather than hateful: no slurs, no threats.";

/// Runtime configuration for jibe-server.
///
/// Every field has a sensible default so the server starts without any
/// environment variables set.  Without an upstream API key the generation
/// endpoint answers "not configured" instead of failing at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://jibe.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS allow-list; wildcard when `None`.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI and the OpenAPI document.
    pub enable_swagger: bool,

    /// Bearer token required by `/admin`.  Admin routes are closed when unset.
    pub admin_token: Option<String>,

    pub llm: LlmConfig,

    /// Case-sensitive substrings rejected by the moderation filter.
    pub banned_phrases: Vec<String>,

    /// Depth of the generation queue.
    pub queue_capacity: usize,

    /// Number of concurrent generation workers.
    pub workers: usize,

    /// Public origin used to build share links (default: `"http://localhost:3000"`).
    pub site_url: String,

    /// Points credited to a referrer per accepted referral; 0 disables the reward.
    pub referral_bonus: i64,
}

/// Upstream (OpenAI-compatible) generation service settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub system_prompt: String,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let banned_phrases = std::env::var("JIBE_BANNED_PHRASES")
            .ok()
            .map(|raw| split_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| DEFAULT_BANNED_PHRASES.iter().map(|s| (*s).to_owned()).collect());

        Self {
            bind_address: env_or("JIBE_BIND", "0.0.0.0:3000"),
            database_url: env_or("JIBE_DATABASE_URL", "sqlite://jibe.db"),
            log_level: env_or("JIBE_LOG", "info"),
            log_json: parse_bool("JIBE_LOG_JSON", false),
            cors_allowed_origins: non_empty_env("JIBE_CORS_ORIGINS"),
            enable_swagger: parse_bool("JIBE_ENABLE_SWAGGER", true),
            admin_token: non_empty_env("JIBE_ADMIN_TOKEN"),
            llm: LlmConfig {
                api_key: non_empty_env("JIBE_LLM_API_KEY").or_else(|| non_empty_env("DEEPSEEK_API_KEY")),
                base_url: env_or("JIBE_LLM_BASE_URL", "https://api.deepseek.com/v1"),
                model: env_or("JIBE_LLM_MODEL", "deepseek-reasoner"),
                timeout: Duration::from_secs(parse_env("JIBE_LLM_TIMEOUT_SECS", 30)),
                system_prompt: env_or("JIBE_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
            },
            banned_phrases,
            queue_capacity: parse_env("JIBE_QUEUE_CAPACITY", 64).max(1),
            workers: parse_env("JIBE_WORKERS", 4).max(1),
            site_url: env_or("JIBE_SITE_URL", "http://localhost:3000"),
            referral_bonus: parse_env("JIBE_REFERRAL_BONUS", 0_i64).max(0),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
