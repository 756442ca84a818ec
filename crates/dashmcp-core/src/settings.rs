//! Process settings with environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. Apply environment variable overrides (invalid values are logged and ignored)
//! 3. [`Settings::validate`] rejects combinations the server cannot run with

use std::time::Duration;

use secrecy::SecretString;

/// Errors raised by [`Settings::validate`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub version: String,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            name: "dashboard-testing-mcp-server".into(),
            version: "1.0.0".into(),
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Upstream dashboard API the tools forward to.
#[derive(Clone)]
pub struct DashboardSettings {
    pub api_url: String,
    pub api_key: SecretString,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for DashboardSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:9090".into(),
            api_key: SecretString::from(String::new()),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Idle age after which a session is evicted.
    pub max_idle_age_ms: u64,
    /// Period of the idle sweep.
    pub cleanup_interval_ms: u64,
    /// Per-session close budget during shutdown.
    pub shutdown_grace_ms: u64,
}

impl SessionSettings {
    pub fn max_idle_age(&self) -> Duration {
        Duration::from_millis(self.max_idle_age_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_idle_age_ms: 30 * 60 * 1000,
            cleanup_interval_ms: 5 * 60 * 1000,
            shutdown_grace_ms: 5_000,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogSettings {
    /// Raise the default log level to debug.
    pub debug: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub dashboard: DashboardSettings,
    pub session: SessionSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        apply_env_overrides(&mut settings);
        settings
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.max_idle_age_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session max idle age must be positive".into(),
            ));
        }
        if self.session.cleanup_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "session cleanup interval must be positive".into(),
            ));
        }
        if !self.dashboard.api_url.starts_with("http://")
            && !self.dashboard.api_url.starts_with("https://")
        {
            return Err(SettingsError::InvalidValue(format!(
                "dashboard API URL must be http(s): {}",
                self.dashboard.api_url
            )));
        }
        Ok(())
    }
}

/// Apply environment variable overrides to settings.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(v) = read_env_u16("PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_string("DASHBOARD_API_URL") {
        settings.dashboard.api_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = read_env_string("DASHBOARD_API_KEY") {
        settings.dashboard.api_key = SecretString::from(v);
    }
    if let Some(v) = read_env_u64("DASHBOARD_TIMEOUT_SECS", 1, 3600) {
        settings.dashboard.request_timeout_secs = v;
    }
    if let Some(v) = read_env_u64("SESSION_MAX_AGE_MS", 1000, 7 * 24 * 3_600_000) {
        settings.session.max_idle_age_ms = v;
    }
    if let Some(v) = read_env_u64("SESSION_CLEANUP_INTERVAL_MS", 1000, 24 * 3_600_000) {
        settings.session.cleanup_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SHUTDOWN_GRACE_MS", 0, 600_000) {
        settings.session.shutdown_grace_ms = v;
    }
    if debug_requested() {
        settings.log.debug = true;
    }
}

/// Whether `DEBUG` is set to any non-empty value. Readable before logging is
/// up, so the subscriber can be built at the right level.
pub fn debug_requested() -> bool {
    read_env_string("DEBUG").is_some()
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
