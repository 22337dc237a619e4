use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::workflows::cancellation::domain::{EmployeeId, InvalidEmployeeId};
use crate::workflows::cancellation::http::{DEFAULT_TIMEOUT, DEFAULT_WORKFLOW_SERVICE_PATH};
use crate::workflows::cancellation::orchestrator::OrchestratorSettings;
use crate::workflows::cancellation::sessions::DEFAULT_IDLE_TIMEOUT;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:4004";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub gateway: GatewayConfig,
    pub cancellation: CancellationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&var_or("APP_ENV", "development"));

        let host = var_or("APP_HOST", "127.0.0.1");
        let port = var_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = var_or("APP_LOG_LEVEL", "info");
        let log_format = LogFormat::parse(&var_or("APP_LOG_FORMAT", "compact"))?;

        let base_url = var_or("APP_BACKEND_URL", DEFAULT_BACKEND_URL);
        let is_http_url = reqwest::Url::parse(&base_url).is_ok_and(|url| {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
        });
        if !is_http_url {
            return Err(ConfigError::InvalidBackendUrl(base_url));
        }
        let workflow_service_path =
            var_or("APP_WORKFLOW_SERVICE_PATH", DEFAULT_WORKFLOW_SERVICE_PATH);
        let timeout = positive_secs("APP_GATEWAY_TIMEOUT_SECS", DEFAULT_TIMEOUT)?;
        let idle_timeout = positive_secs("APP_SESSION_IDLE_SECS", DEFAULT_IDLE_TIMEOUT)?;

        let default_identity = match env::var("APP_DEFAULT_IDENTITY") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                EmployeeId::parse(&raw)
                    .map_err(|source| ConfigError::InvalidDefaultIdentity { source })?,
            ),
            _ => None,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            gateway: GatewayConfig {
                base_url,
                workflow_service_path,
                timeout,
            },
            cancellation: CancellationConfig {
                default_identity,
                idle_timeout,
            },
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn positive_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidDuration { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Where the backend lives and how long each call may take.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub workflow_service_path: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CancellationConfig {
    /// Identity used when the current user cannot be resolved. Unset disables
    /// the fallback.
    pub default_identity: Option<EmployeeId>,
    /// Open sessions untouched for this long are closed.
    pub idle_timeout: Duration,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            default_identity: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl CancellationConfig {
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_identity: self.default_identity.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidBackendUrl(String),
    InvalidDuration { key: &'static str, value: String },
    InvalidDefaultIdentity { source: InvalidEmployeeId },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::InvalidBackendUrl(value) => {
                write!(f, "APP_BACKEND_URL must be an http(s) URL, got '{value}'")
            }
            ConfigError::InvalidDuration { key, value } => {
                write!(f, "{key} must be a positive number of seconds, got '{value}'")
            }
            ConfigError::InvalidDefaultIdentity { .. } => {
                write!(f, "APP_DEFAULT_IDENTITY must be a non-zero numeric employee id")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidDefaultIdentity { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidLogFormat(_)
            | ConfigError::InvalidBackendUrl(_)
            | ConfigError::InvalidDuration { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "APP_BACKEND_URL",
            "APP_WORKFLOW_SERVICE_PATH",
            "APP_GATEWAY_TIMEOUT_SECS",
            "APP_DEFAULT_IDENTITY",
            "APP_SESSION_IDLE_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.log_format, LogFormat::Compact);
        assert_eq!(config.gateway.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(
            config.gateway.workflow_service_path,
            DEFAULT_WORKFLOW_SERVICE_PATH
        );
        assert_eq!(config.gateway.timeout, Duration::from_secs(60));
        assert!(config.cancellation.default_identity.is_none());
        assert_eq!(config.cancellation.idle_timeout, Duration::from_secs(30 * 60));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_gateway_and_fallback_identity_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_BACKEND_URL", "https://lms.example.com");
        env::set_var("APP_GATEWAY_TIMEOUT_SECS", "15");
        env::set_var("APP_LOG_FORMAT", "JSON");
        env::set_var("APP_DEFAULT_IDENTITY", "00107119");
        env::set_var("APP_SESSION_IDLE_SECS", "120");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.gateway.base_url, "https://lms.example.com");
        assert_eq!(config.gateway.timeout, Duration::from_secs(15));
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(config.cancellation.idle_timeout, Duration::from_secs(120));
        let settings = config.cancellation.settings();
        assert_eq!(
            settings.default_identity.as_ref().map(EmployeeId::as_str),
            Some("107119")
        );
        reset_env();
    }

    #[test]
    fn rejects_invalid_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");

        reset_env();
        env::set_var("APP_GATEWAY_TIMEOUT_SECS", "0");
        match AppConfig::load() {
            Err(ConfigError::InvalidDuration { key, value }) => {
                assert_eq!(key, "APP_GATEWAY_TIMEOUT_SECS");
                assert_eq!(value, "0");
            }
            other => panic!("expected invalid timeout, got {other:?}"),
        }

        reset_env();
        env::set_var("APP_SESSION_IDLE_SECS", "soon");
        match AppConfig::load() {
            Err(ConfigError::InvalidDuration { key, .. }) => {
                assert_eq!(key, "APP_SESSION_IDLE_SECS")
            }
            other => panic!("expected invalid idle timeout, got {other:?}"),
        }

        for identity in ["000", "P107119"] {
            reset_env();
            env::set_var("APP_DEFAULT_IDENTITY", identity);
            match AppConfig::load() {
                Err(ConfigError::InvalidDefaultIdentity { .. }) => {}
                other => panic!("expected invalid identity for {identity}, got {other:?}"),
            }
        }

        for url in ["lms.example.com", "http://", "https://", "ftp://lms.example.com", "http//lms"] {
            reset_env();
            env::set_var("APP_BACKEND_URL", url);
            match AppConfig::load() {
                Err(ConfigError::InvalidBackendUrl(value)) => assert_eq!(value, url),
                other => panic!("expected invalid backend url for {url}, got {other:?}"),
            }
        }

        reset_env();
        env::set_var("APP_LOG_FORMAT", "pretty");
        match AppConfig::load() {
            Err(ConfigError::InvalidLogFormat(value)) => assert_eq!(value, "pretty"),
            other => panic!("expected invalid log format, got {other:?}"),
        }
        reset_env();
    }
}
