use std::time::Duration;

use crate::messaging::TopicConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_APP_ENV: &str = "local";
const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_METRICS_PORT: u16 = 9090;

const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_USER: &str = "postgres";
const DEFAULT_DB_NAME: &str = "orders";
const DEFAULT_DB_SSL: &str = "disable";
const DEFAULT_DB_MAX_CONNS: u32 = 10;

const DEFAULT_KAFKA_BROKER: &str = "127.0.0.1:9092";
const DEFAULT_ORDER_TOPIC: &str = "orders";
const DEFAULT_ORDER_GROUP: &str = "order-service";
const DEFAULT_RETRY_TOPIC: &str = "orders-retry";
const DEFAULT_RETRY_GROUP: &str = "order-service-retry";
const DEFAULT_DLQ_TOPIC: &str = "orders-dlq";

const DEFAULT_RETRY_MAX: u32 = 3;
const DEFAULT_BACKOFF_MIN_MS: u64 = 100;
const DEFAULT_BACKOFF_MAX_MS: u64 = 2000;

const DEFAULT_CACHE_LIMIT: usize = 1000;
const DEFAULT_CACHE_WARMUP: i64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Port of the Prometheus scrape endpoint
    pub metrics_port: u16,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub broker: String,
    pub topics: TopicConfig,
    pub retry_max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Maximum number of orders kept in memory
    pub limit: usize,
    /// Orders loaded into the cache at startup
    pub warmup: i64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub env: String,
    pub http: HttpConfig,
    pub db: DbConfig,
    pub kafka: KafkaConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Missing keys fall back
    /// to defaults; present but unparsable values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let config = Self {
            env: env.string("APP_ENV", DEFAULT_APP_ENV),
            http: HttpConfig {
                host: env.string("HTTP_HOST", DEFAULT_HTTP_HOST),
                port: env.parse("HTTP_PORT", DEFAULT_HTTP_PORT)?,
                metrics_port: env.parse("METRICS_PORT", DEFAULT_METRICS_PORT)?,
            },
            db: DbConfig {
                url: match env.get("DATABASE_URL") {
                    Some(url) => url,
                    None => database_url_from_parts(&env)?,
                },
                max_connections: env.parse("DB_MAX_CONNS", DEFAULT_DB_MAX_CONNS)?,
            },
            kafka: KafkaConfig {
                broker: env.string("KAFKA_BROKER", DEFAULT_KAFKA_BROKER),
                topics: TopicConfig {
                    order_topic: env.string("KAFKA_ORDER_TOPIC", DEFAULT_ORDER_TOPIC),
                    order_group: env.string("KAFKA_ORDER_GROUP_ID", DEFAULT_ORDER_GROUP),
                    retry_topic: env.string("KAFKA_RETRY_TOPIC", DEFAULT_RETRY_TOPIC),
                    retry_group: env.string("KAFKA_RETRY_GROUP_ID", DEFAULT_RETRY_GROUP),
                    dlq_topic: env.string("KAFKA_DLQ_TOPIC", DEFAULT_DLQ_TOPIC),
                },
                retry_max_attempts: env.parse("KAFKA_RETRY_MAX", DEFAULT_RETRY_MAX)?,
                backoff_min: Duration::from_millis(
                    env.parse("KAFKA_BACKOFF_MIN", DEFAULT_BACKOFF_MIN_MS)?,
                ),
                backoff_max: Duration::from_millis(
                    env.parse("KAFKA_BACKOFF_MAX", DEFAULT_BACKOFF_MAX_MS)?,
                ),
            },
            cache: CacheConfig {
                limit: env.parse("CACHE_LIMIT", DEFAULT_CACHE_LIMIT)?,
                warmup: env.parse("CACHE_WARMUP", DEFAULT_CACHE_WARMUP)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.env == "prod"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.retry_max_attempts < 1 {
            return Err(invalid("KAFKA_RETRY_MAX", "must be at least 1"));
        }
        if self.kafka.backoff_min > self.kafka.backoff_max {
            return Err(invalid(
                "KAFKA_BACKOFF_MIN",
                "must not exceed KAFKA_BACKOFF_MAX",
            ));
        }
        if self.cache.limit < 1 {
            return Err(invalid("CACHE_LIMIT", "must be at least 1"));
        }
        if self.cache.warmup < 0 {
            return Err(invalid("CACHE_WARMUP", "must not be negative"));
        }
        if self.db.max_connections < 1 {
            return Err(invalid("DB_MAX_CONNS", "must be at least 1"));
        }

        let topics = self.kafka.topics.all_topics();
        if topics.iter().any(|topic| topic.is_empty()) {
            return Err(invalid("KAFKA_*_TOPIC", "topic names must not be empty"));
        }
        if topics[0] == topics[1] || topics[0] == topics[2] || topics[1] == topics[2] {
            return Err(invalid("KAFKA_*_TOPIC", "order, retry and DLQ topics must differ"));
        }
        Ok(())
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, format!("{raw:?}: {e}"))),
            None => Ok(default),
        }
    }
}

fn database_url_from_parts<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<String, ConfigError> {
    let host = env.string("DB_HOST", DEFAULT_DB_HOST);
    let port: u16 = env.parse("DB_PORT", DEFAULT_DB_PORT)?;
    let user = env.string("DB_USER", DEFAULT_DB_USER);
    let password = env.get("DB_PASSWORD").unwrap_or_default();
    let name = env.string("DB_NAME", DEFAULT_DB_NAME);
    let ssl = env.string("DB_SSL", DEFAULT_DB_SSL);

    let credentials = if password.is_empty() {
        user
    } else {
        format!("{user}:{password}")
    };
    Ok(format!("postgres://{credentials}@{host}:{port}/{name}?sslmode={ssl}"))
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}
