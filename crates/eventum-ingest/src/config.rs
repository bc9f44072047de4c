//! Daemon configuration loaded from environment variables.

use crate::groups::MongoConfig;
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use crate::source::KafkaConfig;
use crate::staging::RedisConfig;
use crate::{Error, Result};
use eventum_core::{DEFAULT_CONSUMER_GROUP, DEFAULT_FILE_COLLECTION};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Ingest daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub redis: RedisConfig,
    pub mongo: MongoConfig,
    pub pipeline: PipelineConfig,

    /// JSONL file for events that exhaust their retries. Disabled when unset.
    pub dead_letter_path: Option<PathBuf>,

    /// Metrics HTTP server port (0 to disable).
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `KAFKA_BROKER`: Bootstrap servers
    /// - `KAFKA_TOPIC`: Topic carrying event payloads
    /// - `MONGO_URI`: MongoDB connection string
    /// - `MONGO_DB_NAME`: MongoDB database
    ///
    /// Optional:
    /// - `KAFKA_GROUP_ID`: Consumer group (default: "eventum-group")
    /// - `REDIS_ADDR`: Redis `host:port` or full URL (default: "localhost:6379")
    /// - `REDIS_DB`: Redis database index, only with `host:port` (default: 0)
    /// - `MONGO_USER`, `MONGO_PASSWD`: MongoDB credentials
    /// - `MONGO_FILE_COLLECTION_NAME`: Group collection (default: "files")
    /// - `EVENTUM_POLL_INTERVAL_MS`: Longest idle read (default: 1000)
    /// - `EVENTUM_RETRY_ATTEMPTS`: Attempts per store call (default: 3)
    /// - `EVENTUM_RETRY_BACKOFF_MS`: First retry delay (default: 100)
    /// - `EVENTUM_DEAD_LETTER_PATH`: Dead-letter JSONL file
    /// - `EVENTUM_RECOVER_ON_START`: Replay staged events at startup (default: true)
    /// - `EVENTUM_METRICS_PORT`: Metrics port, 0 disables (default: 9090)
    pub fn from_env() -> Result<Self> {
        let kafka = KafkaConfig {
            brokers: required("KAFKA_BROKER")?,
            topic: required("KAFKA_TOPIC")?,
            group_id: optional("KAFKA_GROUP_ID")
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            poll_interval: Duration::from_millis(parsed("EVENTUM_POLL_INTERVAL_MS", 1000)?),
        };

        let redis = RedisConfig {
            addr: optional("REDIS_ADDR").unwrap_or_else(|| RedisConfig::default().addr),
            db: parsed("REDIS_DB", 0)?,
        };
        if redis.addr.contains("://") && optional("REDIS_DB").is_some() {
            return Err(Error::Config(
                "REDIS_DB cannot be combined with a URL in REDIS_ADDR; put the database in the URL path"
                    .to_string(),
            ));
        }

        let mongo = MongoConfig {
            uri: required("MONGO_URI")?,
            database: required("MONGO_DB_NAME")?,
            ..mongo_optional()
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parsed("EVENTUM_RETRY_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff: Duration::from_millis(parsed(
                "EVENTUM_RETRY_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: defaults.max_backoff,
        };
        if retry.max_attempts == 0 {
            return Err(Error::Config(
                "EVENTUM_RETRY_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let pipeline = PipelineConfig {
            retry,
            recover_on_start: parsed("EVENTUM_RECOVER_ON_START", true)?,
        };

        let config = Self {
            kafka,
            redis,
            mongo,
            pipeline,
            dead_letter_path: optional("EVENTUM_DEAD_LETTER_PATH").map(PathBuf::from),
            metrics_port: parsed("EVENTUM_METRICS_PORT", 9090)?,
        };

        tracing::info!(
            brokers = %config.kafka.brokers,
            topic = %config.kafka.topic,
            group_id = %config.kafka.group_id,
            redis = %config.redis.addr,
            database = %config.mongo.database,
            collection = %config.mongo.collection,
            "ingest configuration loaded"
        );

        Ok(config)
    }
}

/// MongoDB settings alone, for tools that only read file groups.
///
/// Falls back to local defaults for the URI and database.
pub fn mongo_from_env() -> MongoConfig {
    let defaults = MongoConfig::default();
    MongoConfig {
        uri: optional("MONGO_URI").unwrap_or(defaults.uri),
        database: optional("MONGO_DB_NAME").unwrap_or(defaults.database),
        ..mongo_optional()
    }
}

fn mongo_optional() -> MongoConfig {
    MongoConfig {
        collection: optional("MONGO_FILE_COLLECTION_NAME")
            .unwrap_or_else(|| DEFAULT_FILE_COLLECTION.to_string()),
        username: optional("MONGO_USER"),
        password: optional("MONGO_PASSWD"),
        ..MongoConfig::default()
    }
}

/// An environment variable, treating empty values as unset.
fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| Error::Config(format!("{key} is not set")))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize config tests that manipulate env vars.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "KAFKA_BROKER",
        "KAFKA_TOPIC",
        "KAFKA_GROUP_ID",
        "REDIS_ADDR",
        "REDIS_DB",
        "MONGO_URI",
        "MONGO_DB_NAME",
        "MONGO_USER",
        "MONGO_PASSWD",
        "MONGO_FILE_COLLECTION_NAME",
        "EVENTUM_POLL_INTERVAL_MS",
        "EVENTUM_RETRY_ATTEMPTS",
        "EVENTUM_RETRY_BACKOFF_MS",
        "EVENTUM_DEAD_LETTER_PATH",
        "EVENTUM_RECOVER_ON_START",
        "EVENTUM_METRICS_PORT",
    ];

    const REQUIRED: &[(&str, &str)] = &[
        ("KAFKA_BROKER", "kafka:9092"),
        ("KAFKA_TOPIC", "file-events"),
        ("MONGO_URI", "mongodb://mongo:27017"),
        ("MONGO_DB_NAME", "scans"),
    ];

    /// Helper to run config tests with isolated env vars.
    fn with_env_vars<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        let saved: Vec<_> = ENV_KEYS
            .iter()
            .map(|k| (*k, std::env::var(k).ok()))
            .collect();

        // SAFETY: Serialized by mutex; only test code touches these vars.
        unsafe {
            for k in ENV_KEYS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        f();

        // SAFETY: Restoring original env state.
        unsafe {
            for (k, v) in &saved {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn config_defaults() {
        with_env_vars(REQUIRED, || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.kafka.brokers, "kafka:9092");
            assert_eq!(config.kafka.topic, "file-events");
            assert_eq!(config.kafka.group_id, "eventum-group");
            assert_eq!(config.kafka.poll_interval, Duration::from_secs(1));
            assert_eq!(config.redis.addr, "localhost:6379");
            assert_eq!(config.redis.db, 0);
            assert_eq!(config.mongo.uri, "mongodb://mongo:27017");
            assert_eq!(config.mongo.database, "scans");
            assert_eq!(config.mongo.collection, "files");
            assert!(config.mongo.username.is_none());
            assert_eq!(config.pipeline.retry, RetryPolicy::default());
            assert!(config.pipeline.recover_on_start);
            assert!(config.dead_letter_path.is_none());
            assert_eq!(config.metrics_port, 9090);
        });
    }

    #[test]
    fn config_custom_values() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("KAFKA_GROUP_ID", "scanners"),
            ("REDIS_ADDR", "redis:6380"),
            ("REDIS_DB", "3"),
            ("MONGO_USER", "ingest"),
            ("MONGO_PASSWD", "secret"),
            ("MONGO_FILE_COLLECTION_NAME", "groups"),
            ("EVENTUM_POLL_INTERVAL_MS", "250"),
            ("EVENTUM_RETRY_ATTEMPTS", "5"),
            ("EVENTUM_RETRY_BACKOFF_MS", "20"),
            ("EVENTUM_DEAD_LETTER_PATH", "/var/lib/eventum/dl.jsonl"),
            ("EVENTUM_RECOVER_ON_START", "false"),
            ("EVENTUM_METRICS_PORT", "0"),
        ]);

        with_env_vars(&vars, || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.kafka.group_id, "scanners");
            assert_eq!(config.kafka.poll_interval, Duration::from_millis(250));
            assert_eq!(config.redis.addr, "redis:6380");
            assert_eq!(config.redis.db, 3);
            assert_eq!(config.mongo.username.as_deref(), Some("ingest"));
            assert_eq!(config.mongo.password.as_deref(), Some("secret"));
            assert_eq!(config.mongo.collection, "groups");
            assert_eq!(config.pipeline.retry.max_attempts, 5);
            assert_eq!(
                config.pipeline.retry.initial_backoff,
                Duration::from_millis(20)
            );
            assert!(!config.pipeline.recover_on_start);
            assert_eq!(
                config.dead_letter_path,
                Some(PathBuf::from("/var/lib/eventum/dl.jsonl"))
            );
            assert_eq!(config.metrics_port, 0);
        });
    }

    #[test]
    fn config_missing_required() {
        with_env_vars(&[("KAFKA_BROKER", "kafka:9092")], || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(ref m) if m.contains("KAFKA_TOPIC")));
        });
    }

    #[test]
    fn config_empty_value_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MONGO_URI", "  "));
        with_env_vars(&vars, || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn config_invalid_number() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("REDIS_DB", "three"));
        with_env_vars(&vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_DB"));
        });
    }

    #[test]
    fn config_redis_url_with_db_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("REDIS_ADDR", "redis://cache:6379/1"), ("REDIS_DB", "2")]);
        with_env_vars(&vars, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_DB"));
        });
    }

    #[test]
    fn config_redis_url_alone_accepted() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("REDIS_ADDR", "redis://cache:6379/1"));
        with_env_vars(&vars, || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.redis.url(), "redis://cache:6379/1");
        });
    }

    #[test]
    fn config_zero_retry_attempts_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("EVENTUM_RETRY_ATTEMPTS", "0"));
        with_env_vars(&vars, || {
            assert!(Config::from_env().is_err());
        });
    }

    #[test]
    fn mongo_from_env_defaults() {
        with_env_vars(&[("MONGO_FILE_COLLECTION_NAME", "groups")], || {
            let mongo = mongo_from_env();
            assert_eq!(mongo.uri, "mongodb://localhost:27017");
            assert_eq!(mongo.collection, "groups");
        });
    }
}
