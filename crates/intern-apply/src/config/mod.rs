use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::submissions::SchemaPolicy;

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
    pub worker: WorkerConfig,
    pub ledger: LedgerConfig,
    pub accounts: AccountsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let program = env::var("WORKER_PROGRAM").unwrap_or_else(|_| "node".to_string());
        let args = env::var("WORKER_ARGS")
            .unwrap_or_else(|_| "puppeteer/apply_internships.js".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let timeout_secs = parse_number::<u64>("WORKER_TIMEOUT_SECS", 300)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "WORKER_TIMEOUT_SECS",
            });
        }

        let ledger_path = env::var("LEDGER_PATH")
            .unwrap_or_else(|_| "successful_applications.csv".to_string());
        let schema_policy = match env::var("LEDGER_SCHEMA_POLICY") {
            Ok(raw) => SchemaPolicy::parse(&raw).ok_or(ConfigError::InvalidSchemaPolicy(raw))?,
            Err(_) => SchemaPolicy::Strict,
        };

        let accounts_path =
            env::var("ACCOUNTS_PATH").unwrap_or_else(|_| "accounts.json".to_string());
        let bcrypt_cost = parse_number::<u32>("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidNumber {
                variable: "BCRYPT_COST",
            });
        }
        let session_ttl_minutes = parse_number::<i64>("SESSION_TTL_MINUTES", 720)?;
        let session_ttl = Some(session_ttl_minutes)
            .filter(|minutes| *minutes > 0)
            .and_then(chrono::Duration::try_minutes)
            .ok_or(ConfigError::InvalidNumber {
                variable: "SESSION_TTL_MINUTES",
            })?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            worker: WorkerConfig {
                program,
                args,
                timeout: Duration::from_secs(timeout_secs),
            },
            ledger: LedgerConfig {
                path: PathBuf::from(ledger_path),
                schema_policy,
            },
            accounts: AccountsConfig {
                path: PathBuf::from(accounts_path),
                bcrypt_cost,
                session_ttl,
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// How the automation worker is launched.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Location and drift policy of the submitted-applications ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub schema_policy: SchemaPolicy,
}

#[derive(Debug, Clone)]
pub struct AccountsConfig {
    pub path: PathBuf,
    pub bcrypt_cost: u32,
    pub session_ttl: chrono::Duration,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    InvalidSchemaPolicy(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} is not a valid value")
            }
            ConfigError::InvalidSchemaPolicy(value) => write!(
                f,
                "LEDGER_SCHEMA_POLICY must be 'strict' or 'lenient', got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidSchemaPolicy(_) => None,
        }
    }
}
