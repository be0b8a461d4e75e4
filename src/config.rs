//! Startup configuration, resolved once from the environment.
//!
//! Request handling never reads the environment; everything it needs is in
//! [`AppConfig`], which lives inside the shared state.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::{DEFAULT_ITERATIONS, MIN_SECRET_LENGTH};

pub const APP_NAME: &str = "HMS";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 900;
const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
const DEFAULT_REPORT_MAX_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:5000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("HMS_JWT_SECRET must be at least {MIN_SECRET_LENGTH} bytes")]
    WeakSecret,

    #[error("Cannot determine home directory")]
    NoHomeDir,
}

/// Where lab reports go.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportStoreConfig {
    /// Files under `dir`, served back as `<public_base_url>/reports/<key>`.
    Local { dir: PathBuf, public_base_url: String },
    /// PUT to `<url>/<key>` with an optional bearer key.
    Http { url: String, api_key: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub password_iterations: u32,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max: u32,
    pub report_max_bytes: usize,
    pub report_store: ReportStoreConfig,
    pub production: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

/// ~/HMS on all platforms.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "hms_lib=info,hms=info,tower_http=info"
}

impl AppConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("HMS_JWT_SECRET").ok_or(ConfigError::Missing("HMS_JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::WeakSecret);
        }

        let database_path = match get("HMS_DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => app_data_dir()?.join("hms.db"),
        };

        let report_store = match get("HMS_REPORT_STORE_URL") {
            Some(url) => ReportStoreConfig::Http {
                url: url.trim_end_matches('/').to_string(),
                api_key: get("HMS_REPORT_STORE_KEY"),
            },
            None => ReportStoreConfig::Local {
                dir: match get("HMS_REPORT_DIR") {
                    Some(dir) => PathBuf::from(dir),
                    None => app_data_dir()?.join("reports"),
                },
                public_base_url: get("HMS_PUBLIC_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.into())
                    .trim_end_matches('/')
                    .to_string(),
            },
        };

        let bootstrap_admin = match (
            get("HMS_BOOTSTRAP_ADMIN_EMAIL"),
            get("HMS_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                name: get("HMS_BOOTSTRAP_ADMIN_NAME").unwrap_or_else(|| "Administrator".into()),
                email,
                password,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("HMS_BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("HMS_BOOTSTRAP_ADMIN_EMAIL")),
        };

        let environment = get("HMS_ENV").unwrap_or_else(|| "development".into());

        Ok(Self {
            addr: parse_or("HMS_ADDR", get("HMS_ADDR"), DEFAULT_ADDR.parse().ok())?,
            database_path,
            jwt_secret,
            token_ttl_hours: parse_or(
                "HMS_TOKEN_TTL_HOURS",
                get("HMS_TOKEN_TTL_HOURS"),
                Some(DEFAULT_TOKEN_TTL_HOURS),
            )?,
            password_iterations: parse_or(
                "HMS_PASSWORD_ITERATIONS",
                get("HMS_PASSWORD_ITERATIONS"),
                Some(DEFAULT_ITERATIONS),
            )?,
            cors_origins: get("HMS_CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit_window_secs: parse_or(
                "HMS_RATE_LIMIT_WINDOW_SECS",
                get("HMS_RATE_LIMIT_WINDOW_SECS"),
                Some(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            )?,
            rate_limit_max: parse_or(
                "HMS_RATE_LIMIT_MAX",
                get("HMS_RATE_LIMIT_MAX"),
                Some(DEFAULT_RATE_LIMIT_MAX),
            )?,
            report_max_bytes: parse_or(
                "HMS_REPORT_MAX_BYTES",
                get("HMS_REPORT_MAX_BYTES"),
                Some(DEFAULT_REPORT_MAX_BYTES),
            )?,
            report_store,
            production: environment.eq_ignore_ascii_case("production"),
            bootstrap_admin,
        })
    }
}

#[cfg(test)]
impl AppConfig {
    /// Fast hashing, generous rate limit, local reports under the db directory.
    pub fn for_tests(database_path: PathBuf) -> Self {
        let dir = database_path
            .parent()
            .map(|p| p.join("reports"))
            .unwrap_or_else(|| PathBuf::from("reports"));
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path,
            jwt_secret: "test-secret-test-secret-test-secret!".into(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            password_iterations: 1_000,
            cors_origins: Vec::new(),
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            rate_limit_max: 10_000,
            report_max_bytes: 64 * 1024,
            report_store: ReportStoreConfig::Local {
                dir,
                public_base_url: DEFAULT_PUBLIC_BASE_URL.into(),
            },
            production: false,
            bootstrap_admin: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}
