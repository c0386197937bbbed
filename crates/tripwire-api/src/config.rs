//! Configuration management for the Tripwire run-task service.

use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tripwire_core::report::DEFAULT_RESULTS_URL;
use tripwire_delivery::{client::ClientConfig, BackoffStrategy, RetryPolicy};
use tripwire_scan::{FetcherConfig, ScannerConfig};

const CONFIG_FILE: &str = "config.toml";

/// Well-known secret used outside production when `HMAC_KEY` is unset.
pub const DEVELOPMENT_HMAC_KEY: &str = "abc123";

const HMAC_KEY_VAR: &str = "HMAC_KEY";

const USER_AGENT: &str = concat!("Tripwire/", env!("CARGO_PKG_VERSION"));

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    /// Signing secret is mandatory.
    Production,
    /// Local development; a fallback signing secret is allowed.
    Development,
    /// Automated tests; a fallback signing secret is allowed.
    Test,
}

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use tripwire_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// Whole-request timeout in seconds; must outlast a full scan.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Largest accepted request body in bytes.
    ///
    /// Environment variable: `MAX_PAYLOAD_BYTES`
    #[serde(default = "default_max_payload_bytes", alias = "MAX_PAYLOAD_BYTES")]
    pub max_payload_bytes: usize,

    // Security
    /// Deployment environment.
    ///
    /// Environment variable: `APP_ENV`
    #[serde(default = "default_app_env", alias = "APP_ENV")]
    pub app_env: AppEnv,
    /// HMAC-SHA512 secret shared with the platform.
    ///
    /// Environment variable: `HMAC_KEY`
    #[serde(default, alias = "HMAC_KEY", skip_serializing)]
    pub hmac_key: Option<String>,

    // Scan
    /// Root directory for per-request workspaces.
    ///
    /// Environment variable: `SCRATCH_DIR`
    #[serde(default = "default_scratch_dir", alias = "SCRATCH_DIR")]
    pub scratch_dir: PathBuf,
    /// Scanner executable.
    ///
    /// Environment variable: `SCANNER_PROGRAM`
    #[serde(default = "default_scanner_program", alias = "SCANNER_PROGRAM")]
    pub scanner_program: String,
    /// Arguments placed before the scanner subcommand.
    ///
    /// Environment variable: `SCANNER_WRAPPER_ARGS`
    #[serde(default, alias = "SCANNER_WRAPPER_ARGS")]
    pub scanner_wrapper_args: Vec<String>,
    /// Scanner timeout in seconds.
    ///
    /// Environment variable: `SCANNER_TIMEOUT_SECONDS`
    #[serde(default = "default_scanner_timeout", alias = "SCANNER_TIMEOUT_SECONDS")]
    pub scanner_timeout_seconds: u64,
    /// Artifact download timeout in seconds.
    ///
    /// Environment variable: `FETCH_TIMEOUT_SECONDS`
    #[serde(default = "default_fetch_timeout", alias = "FETCH_TIMEOUT_SECONDS")]
    pub fetch_timeout_seconds: u64,
    /// Portal link attached to task results.
    ///
    /// Environment variable: `RESULTS_URL`
    #[serde(default = "default_results_url", alias = "RESULTS_URL")]
    pub results_url: String,

    // Callback
    /// Timeout for one callback attempt in seconds.
    ///
    /// Environment variable: `CALLBACK_TIMEOUT_SECONDS`
    #[serde(default = "default_callback_timeout", alias = "CALLBACK_TIMEOUT_SECONDS")]
    pub callback_timeout_seconds: u64,
    /// Maximum callback attempts.
    ///
    /// Environment variable: `CALLBACK_MAX_ATTEMPTS`
    #[serde(default = "default_callback_attempts", alias = "CALLBACK_MAX_ATTEMPTS")]
    pub callback_max_attempts: u32,
    /// Base delay for callback backoff in milliseconds.
    ///
    /// Environment variable: `CALLBACK_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "CALLBACK_RETRY_BASE_DELAY_MS")]
    pub callback_retry_base_delay_ms: u64,
    /// Maximum delay between callback attempts in milliseconds.
    ///
    /// Environment variable: `CALLBACK_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "CALLBACK_RETRY_MAX_DELAY_MS")]
    pub callback_retry_max_delay_ms: u64,
    /// Jitter factor for callback retries (0.0 to 1.0).
    ///
    /// Environment variable: `CALLBACK_RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "CALLBACK_RETRY_JITTER_FACTOR")]
    pub callback_retry_jitter_factor: f64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not pass
    /// [`Config::validate`].
    pub fn load() -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        // Env values are parsed as typed values; the secret must stay the
        // exact string, leading zeros included.
        if let Ok(secret) = std::env::var(HMAC_KEY_VAR) {
            figment = figment.merge(Serialized::default("hmac_key", secret));
        }

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Secret used to verify request signatures.
    ///
    /// Outside production an unset secret falls back to
    /// [`DEVELOPMENT_HMAC_KEY`]; in production `validate` has already
    /// rejected that case.
    pub fn hmac_secret(&self) -> &str {
        match self.hmac_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => DEVELOPMENT_HMAC_KEY,
        }
    }

    /// Whether the fallback secret is in use.
    pub fn uses_development_secret(&self) -> bool {
        self.hmac_key.as_deref().map_or(true, str::is_empty)
    }

    /// Convert to artifact fetcher configuration.
    pub fn to_fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout_seconds),
            user_agent: USER_AGENT.to_string(),
        }
    }

    /// Convert to scanner configuration.
    pub fn to_scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            program: self.scanner_program.clone(),
            wrapper_args: self.scanner_wrapper_args.clone(),
            timeout: Duration::from_secs(self.scanner_timeout_seconds),
        }
    }

    /// Convert to callback client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.callback_timeout_seconds),
            user_agent: USER_AGENT.to_string(),
            max_redirects: 3,
        }
    }

    /// Convert to callback retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.callback_max_attempts,
            base_delay: Duration::from_millis(self.callback_retry_base_delay_ms),
            max_delay: Duration::from_millis(self.callback_retry_max_delay_ms),
            jitter_factor: self.callback_retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Whole-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.max_payload_bytes == 0 {
            anyhow::bail!("max_payload_bytes must be greater than 0");
        }

        if self.scanner_timeout_seconds == 0
            || self.fetch_timeout_seconds == 0
            || self.callback_timeout_seconds == 0
        {
            anyhow::bail!("scanner, fetch and callback timeouts must be greater than 0");
        }

        if self.request_timeout <= self.scanner_timeout_seconds {
            anyhow::bail!(
                "request_timeout ({}s) must exceed scanner_timeout_seconds ({}s)",
                self.request_timeout,
                self.scanner_timeout_seconds
            );
        }

        if self.scanner_program.trim().is_empty() {
            anyhow::bail!("scanner_program must not be empty");
        }

        if self.callback_max_attempts == 0 {
            anyhow::bail!("callback_max_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.callback_retry_jitter_factor) {
            anyhow::bail!("callback_retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.app_env == AppEnv::Production && self.uses_development_secret() {
            anyhow::bail!("HMAC_KEY must be set when APP_ENV is production");
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("request_timeout", &self.request_timeout)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("app_env", &self.app_env)
            .field("hmac_key", &self.hmac_key.as_ref().map(|_| "***"))
            .field("scratch_dir", &self.scratch_dir)
            .field("scanner_program", &self.scanner_program)
            .field("scanner_wrapper_args", &self.scanner_wrapper_args)
            .field("scanner_timeout_seconds", &self.scanner_timeout_seconds)
            .field("fetch_timeout_seconds", &self.fetch_timeout_seconds)
            .field("results_url", &self.results_url)
            .field("callback_timeout_seconds", &self.callback_timeout_seconds)
            .field("callback_max_attempts", &self.callback_max_attempts)
            .field("callback_retry_base_delay_ms", &self.callback_retry_base_delay_ms)
            .field("callback_retry_max_delay_ms", &self.callback_retry_max_delay_ms)
            .field("callback_retry_jitter_factor", &self.callback_retry_jitter_factor)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            max_payload_bytes: default_max_payload_bytes(),
            app_env: default_app_env(),
            hmac_key: None,
            scratch_dir: default_scratch_dir(),
            scanner_program: default_scanner_program(),
            scanner_wrapper_args: Vec::new(),
            scanner_timeout_seconds: default_scanner_timeout(),
            fetch_timeout_seconds: default_fetch_timeout(),
            results_url: default_results_url(),
            callback_timeout_seconds: default_callback_timeout(),
            callback_max_attempts: default_callback_attempts(),
            callback_retry_base_delay_ms: default_base_delay_ms(),
            callback_retry_max_delay_ms: default_max_delay_ms(),
            callback_retry_jitter_factor: default_jitter_factor(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    900
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

fn default_app_env() -> AppEnv {
    AppEnv::Production
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("scratch")
}

fn default_scanner_program() -> String {
    "vault-radar".to_string()
}

fn default_scanner_timeout() -> u64 {
    600
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_results_url() -> String {
    DEFAULT_RESULTS_URL.to_string()
}

fn default_callback_timeout() -> u64 {
    30
}

fn default_callback_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}
