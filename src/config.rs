//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). `JWT_DECODE_SECRET` and
//! `ALLOWED_ORIGINS` are required; everything else falls back to a default.
//! Both upgrade gates fail closed: an origin must be listed (or `*` given
//! explicitly) and the upgrade token is checked unless
//! `UPGRADE_TOKEN_REQUIRED=false`.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ws::rate_limiter::RatePolicy;

/// Default time a fresh connection has to authenticate.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Default time an authenticated connection has to join a room.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// `ALLOWED_ORIGINS` entry that admits any origin, including none.
pub const ANY_ORIGIN: &str = "*";

/// Default minimum length, in characters, of usernames and room names.
pub const DEFAULT_MIN_NAME_LEN: usize = 3;

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// HMAC secret used to verify bearer tokens.
    pub jwt_secret: String,

    /// Origins permitted to open a WebSocket. Never empty; contains
    /// [`ANY_ORIGIN`] when the check is disabled.
    pub allowed_origins: Vec<String>,

    /// Whether the upgrade request itself must carry a valid `?token=`.
    pub upgrade_token_required: bool,

    /// Per-connection behaviour shared by every session.
    pub session: SessionSettings,
}

/// The subset of configuration each [`crate::ws::session`] consults.
///
/// Kept separate from [`RelayConfig`] so tests can build one directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Deadline for reaching `Authenticated`.
    pub auth_timeout: Duration,
    /// Deadline for reaching `Joined`, started once authenticated.
    pub join_timeout: Duration,
    /// Inbound frame throttle.
    pub rate_policy: RatePolicy,
    /// Minimum username / room name length in characters.
    pub min_name_len: usize,
    /// Depth of each connection's outbound frame queue.
    pub outbound_buffer: usize,
    /// Upper bound on a single socket write.
    pub write_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            rate_policy: RatePolicy::default(),
            min_name_len: DEFAULT_MIN_NAME_LEN,
            outbound_buffer: 64,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `JWT_DECODE_SECRET` or `ALLOWED_ORIGINS`
    /// is missing, if `LISTEN_ADDR` is set but cannot be parsed, or if a
    /// size/limit setting is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "LISTEN_ADDR",
                    reason: e.to_string(),
                })?,
            Err(_) => {
                let port: u16 = parse_env("PORT", 8080);
                SocketAddr::from(([0, 0, 0, 0], port))
            }
        };

        let jwt_secret = std::env::var("JWT_DECODE_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_DECODE_SECRET"))?;

        let allowed_origins =
            parse_origins(std::env::var("ALLOWED_ORIGINS").ok().as_deref())?;
        let upgrade_token_required = parse_env_bool("UPGRADE_TOKEN_REQUIRED", true);

        let defaults = SessionSettings::default();
        let session = SessionSettings {
            auth_timeout: Duration::from_millis(parse_env(
                "AUTH_TIMEOUT_MS",
                millis(defaults.auth_timeout),
            )),
            join_timeout: Duration::from_millis(parse_env(
                "JOIN_TIMEOUT_MS",
                millis(defaults.join_timeout),
            )),
            rate_policy: RatePolicy {
                max_per_window: non_zero(
                    "RATE_LIMIT_MAX_MESSAGES",
                    parse_env("RATE_LIMIT_MAX_MESSAGES", defaults.rate_policy.max_per_window),
                )?,
                window: Duration::from_millis(parse_env(
                    "RATE_LIMIT_WINDOW_MS",
                    millis(defaults.rate_policy.window),
                )),
            },
            min_name_len: parse_env("MIN_NAME_LEN", defaults.min_name_len),
            outbound_buffer: non_zero(
                "OUTBOUND_BUFFER",
                parse_env("OUTBOUND_BUFFER", defaults.outbound_buffer),
            )?,
            write_timeout: Duration::from_millis(parse_env(
                "WRITE_TIMEOUT_MS",
                millis(defaults.write_timeout),
            )),
        };

        Ok(Self {
            listen_addr,
            jwt_secret,
            allowed_origins,
            upgrade_token_required,
            session,
        })
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn non_zero<T: PartialEq + Default>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}

/// Parses the `ALLOWED_ORIGINS` value. Unset or blank is an error; use
/// [`ANY_ORIGIN`] to admit every origin.
fn parse_origins(raw: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let origins = raw.map(split_list).unwrap_or_default();
    if origins.is_empty() {
        return Err(ConfigError::Missing("ALLOWED_ORIGINS"));
    }
    Ok(origins)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
