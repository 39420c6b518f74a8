use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::matching::domain::{CurrencyCode, ValidationError};
use crate::matching::scoring::ScoringWeights;

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
    pub matching: MatchingConfig,
    pub fx: FxConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            matching: MatchingConfig::from_env()?,
            fx: FxConfig::from_env()?,
        })
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tunables for scoring, indexing, expiry and pagination.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// New pairs scoring below this are never stored.
    pub min_score: f64,
    pub ttl_days: i64,
    pub worker_pool_size: usize,
    pub fx_timeout: Duration,
    pub sweep_interval: Duration,
    pub sweep_batch_size: usize,
    pub max_page_size: usize,
    pub event_buffer: usize,
    pub weights: ScoringWeights,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            min_score: 40.0,
            ttl_days: 30,
            worker_pool_size: 8,
            fx_timeout: Duration::from_millis(2_000),
            sweep_interval: Duration::from_secs(300),
            sweep_batch_size: 200,
            max_page_size: 100,
            event_buffer: 1_024,
            weights: ScoringWeights::default(),
        }
    }
}

impl MatchingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min_score: f64 = parse_var("MATCH_MIN_SCORE", defaults.min_score)?;
        if !(0.0..=100.0).contains(&min_score) {
            return Err(ConfigError::InvalidValue {
                key: "MATCH_MIN_SCORE",
                value: min_score.to_string(),
            });
        }

        let weights = if WEIGHT_KEYS.iter().any(|key| env::var(key).is_ok()) {
            let [budget, location, amenities, lifestyle, move_in, stay] = WEIGHT_DEFAULTS;
            ScoringWeights::new(
                parse_var(WEIGHT_KEYS[0], budget)?,
                parse_var(WEIGHT_KEYS[1], location)?,
                parse_var(WEIGHT_KEYS[2], amenities)?,
                parse_var(WEIGHT_KEYS[3], lifestyle)?,
                parse_var(WEIGHT_KEYS[4], move_in)?,
                parse_var(WEIGHT_KEYS[5], stay)?,
            )
            .map_err(ConfigError::InvalidWeights)?
        } else {
            defaults.weights
        };

        Ok(Self {
            min_score,
            ttl_days: ttl_days(defaults.ttl_days)?,
            worker_pool_size: positive("MATCH_WORKER_POOL", defaults.worker_pool_size)?,
            fx_timeout: Duration::from_millis(parse_var(
                "MATCH_FX_TIMEOUT_MS",
                defaults.fx_timeout.as_millis() as u64,
            )?),
            sweep_interval: Duration::from_secs(parse_var(
                "MATCH_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )?),
            sweep_batch_size: positive("MATCH_SWEEP_BATCH", defaults.sweep_batch_size)?,
            max_page_size: positive("MATCH_MAX_PAGE_SIZE", defaults.max_page_size)?,
            event_buffer: positive("MATCH_EVENT_BUFFER", defaults.event_buffer)?,
            weights,
        })
    }

    /// Pending and viewed matches older than this are retired.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days.clamp(1, MAX_TTL_DAYS))
    }

    /// Sweep lock lease; twice the interval so a slow run keeps its lock.
    pub fn sweep_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.sweep_interval.as_secs() as i64).max(1) * 2)
    }
}

const WEIGHT_KEYS: [&str; 6] = [
    "MATCH_WEIGHT_BUDGET",
    "MATCH_WEIGHT_LOCATION",
    "MATCH_WEIGHT_AMENITIES",
    "MATCH_WEIGHT_LIFESTYLE",
    "MATCH_WEIGHT_MOVE_IN",
    "MATCH_WEIGHT_STAY",
];

const WEIGHT_DEFAULTS: [f64; 6] = [0.20, 0.15, 0.20, 0.15, 0.15, 0.15];

/// Static exchange rates used by the bundled FX adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FxConfig {
    pub rates: Vec<(CurrencyCode, CurrencyCode, f64)>,
}

impl FxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("FX_RATES") {
            Ok(raw) if !raw.trim().is_empty() => Self::parse(&raw),
            _ => Ok(Self::default()),
        }
    }

    /// Parses `USD:GBP=0.79,GBP:USD=1.27`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: "FX_RATES",
            value: raw.to_string(),
        };

        let mut rates = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (pair, rate) = entry.split_once('=').ok_or_else(invalid)?;
            let (from, to) = pair.split_once(':').ok_or_else(invalid)?;
            let from = CurrencyCode::parse(from).map_err(|_| invalid())?;
            let to = CurrencyCode::parse(to).map_err(|_| invalid())?;
            let rate: f64 = rate.trim().parse().map_err(|_| invalid())?;
            if !rate.is_finite() || rate <= 0.0 {
                return Err(invalid());
            }
            rates.push((from, to, rate));
        }
        Ok(Self { rates })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// A hundred years; anything larger overflows chrono's day arithmetic.
const MAX_TTL_DAYS: i64 = 36_500;

fn ttl_days(default: i64) -> Result<i64, ConfigError> {
    let key = "MATCH_TTL_DAYS";
    let value = parse_var(key, default)?;
    if !(1..=MAX_TTL_DAYS).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn positive(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = parse_var(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    InvalidWeights(ValidationError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidWeights(err) => write!(f, "MATCH_WEIGHT_*: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidWeights(source) => Some(source),
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
            "MATCH_MIN_SCORE",
            "MATCH_TTL_DAYS",
            "MATCH_WORKER_POOL",
            "MATCH_FX_TIMEOUT_MS",
            "MATCH_SWEEP_INTERVAL_SECS",
            "MATCH_SWEEP_BATCH",
            "MATCH_MAX_PAGE_SIZE",
            "MATCH_EVENT_BUFFER",
            "FX_RATES",
        ]
        .into_iter()
        .chain(WEIGHT_KEYS)
        {
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
        assert_eq!(config.matching.min_score, 40.0);
        assert_eq!(config.matching.ttl(), chrono::Duration::days(30));
        assert_eq!(config.matching.worker_pool_size, 8);
        assert_eq!(config.matching.weights, ScoringWeights::default());
        assert!(config.fx.rates.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn matching_overrides_are_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MATCH_MIN_SCORE", "55.5");
        env::set_var("MATCH_WORKER_POOL", "2");
        env::set_var("MATCH_FX_TIMEOUT_MS", "150");
        env::set_var("FX_RATES", "USD:GBP=0.79, GBP:USD=1.27");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.matching.min_score, 55.5);
        assert_eq!(config.matching.worker_pool_size, 2);
        assert_eq!(config.matching.fx_timeout, Duration::from_millis(150));
        assert_eq!(config.fx.rates.len(), 2);
        assert_eq!(config.fx.rates[0].2, 0.79);
        reset_env();
    }

    #[test]
    fn weights_that_do_not_sum_to_one_are_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MATCH_WEIGHT_BUDGET", "0.9");
        let err = MatchingConfig::from_env().expect_err("weights sum to 1.7");
        assert!(matches!(err, ConfigError::InvalidWeights(_)));
        reset_env();
    }

    #[test]
    fn zero_worker_pool_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("MATCH_WORKER_POOL", "0");
        let err = MatchingConfig::from_env().expect_err("pool must be positive");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MATCH_WORKER_POOL",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn ttl_days_outside_one_to_a_hundred_years_are_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        for raw in ["-3", "0", "36501", "99999999999999"] {
            reset_env();
            env::set_var("MATCH_TTL_DAYS", raw);
            let err = MatchingConfig::from_env().expect_err("ttl out of range");
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    key: "MATCH_TTL_DAYS",
                    ..
                }
            ));
        }

        reset_env();
        env::set_var("MATCH_TTL_DAYS", "36500");
        let config = MatchingConfig::from_env().expect("upper bound is allowed");
        assert_eq!(config.ttl(), chrono::Duration::days(36_500));
        reset_env();
    }

    #[test]
    fn ttl_is_clamped_when_built_by_hand() {
        let huge = MatchingConfig {
            ttl_days: i64::MAX,
            ..MatchingConfig::default()
        };
        assert_eq!(huge.ttl(), chrono::Duration::days(MAX_TTL_DAYS));

        let negative = MatchingConfig {
            ttl_days: -7,
            ..MatchingConfig::default()
        };
        assert_eq!(negative.ttl(), chrono::Duration::days(1));
    }

    #[test]
    fn malformed_fx_rates_are_rejected() {
        assert!(FxConfig::parse("USD-GBP=0.79").is_err());
        assert!(FxConfig::parse("USD:GBP=-1").is_err());
        assert!(FxConfig::parse("usd:GBP=0.8").is_err());
        assert_eq!(FxConfig::parse("").expect("empty is fine").rates.len(), 0);
    }
}
