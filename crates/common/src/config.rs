use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub query_timeout_secs: u64,
    /// Takes precedence over the individual connection fields when set
    pub url_override: Option<String>,
}

impl DatabaseConfig {
    /// Build database URL from configuration
    pub fn url(&self) -> String {
        if let Some(url) = &self.url_override {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "orders".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 10,
            query_timeout_secs: 5,
            url_override: None,
        }
    }
}

/// Kafka consumer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub poll_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "orders".to_string(),
            group_id: "order-group".to_string(),
            poll_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// Bounded, least-recently-used eviction
    Lru,
    /// Plain map, never evicts
    Unbounded,
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(CacheKind::Lru),
            "unbounded" => Ok(CacheKind::Unbounded),
            other => Err(format!("expected 'lru' or 'unbounded', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Lru,
            capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
    /// Origin allowed by CORS, e.g. the static frontend
    pub front_origin: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            front_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub emulator_interval_ms: u64,
    pub log_level: String,
}

impl AppConfig {
    /// Read configuration from the process environment, loading `.env` first
    /// if present. Unset variables fall back to defaults; set but
    /// unparseable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults_db = DatabaseConfig::default();
        let database = DatabaseConfig {
            host: lookup("DB_HOST").unwrap_or(defaults_db.host),
            port: parse_or(&lookup, "DB_PORT", defaults_db.port)?,
            username: lookup("DB_USER").unwrap_or(defaults_db.username),
            password: lookup("DB_PASSWORD").unwrap_or(defaults_db.password),
            database: lookup("DB_NAME").unwrap_or(defaults_db.database),
            ssl_mode: lookup("DB_SSLMODE").unwrap_or(defaults_db.ssl_mode),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults_db.max_connections)?,
            query_timeout_secs: parse_or(
                &lookup,
                "DB_QUERY_TIMEOUT_SECS",
                defaults_db.query_timeout_secs,
            )?,
            url_override: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
        };

        let defaults_kafka = KafkaConfig::default();
        let kafka = KafkaConfig {
            brokers: lookup("KAFKA_BROKERS").unwrap_or(defaults_kafka.brokers),
            topic: lookup("KAFKA_TOPIC").unwrap_or(defaults_kafka.topic),
            group_id: lookup("KAFKA_GROUP_ID").unwrap_or(defaults_kafka.group_id),
            poll_timeout_ms: parse_or(
                &lookup,
                "KAFKA_POLL_TIMEOUT_MS",
                defaults_kafka.poll_timeout_ms,
            )?,
        };

        let defaults_cache = CacheConfig::default();
        let cache = CacheConfig {
            kind: parse_or(&lookup, "CACHE_KIND", defaults_cache.kind)?,
            capacity: parse_or(&lookup, "CACHE_CAPACITY", defaults_cache.capacity)?,
        };

        let defaults_http = HttpConfig::default();
        let http = HttpConfig {
            port: parse_or(&lookup, "APP_PORT", defaults_http.port)?,
            front_origin: lookup("FRONT_ORIGIN").unwrap_or(defaults_http.front_origin),
        };

        Ok(Self {
            database,
            kafka,
            cache,
            http,
            emulator_interval_ms: parse_or(&lookup, "EMULATOR_INTERVAL_MS", 2000)?,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key,
                value: value.clone(),
                reason: e.to_string(),
            }),
    }
}
