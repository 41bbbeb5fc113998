//! Configuration module
//!
//! Configuration for the intake service, object storage, queue channels and workers,
//! loaded from environment variables (and an optional `.env` file).

use std::env;
use std::str::FromStr;

use crate::constants;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const MAX_FILE_SIZE_MB: usize = 10;
const RATE_LIMIT_PER_MINUTE: u32 = 20;
const RATE_LIMIT_SHARDS: usize = 16;
const UPLOAD_TIMEOUT_SECS: u64 = 60;
const STORAGE_TIMEOUT_SECS: u64 = 30;
const QUEUE_PUBLISH_TIMEOUT_SECS: u64 = 10;
const QUEUE_MAX_DELIVERY_ATTEMPTS: u32 = 5;
const QUEUE_MIN_BACKOFF_SECS: u64 = 10;
const QUEUE_MAX_BACKOFF_SECS: u64 = 300;
const QUEUE_ACK_DEADLINE_SECS: u64 = 600;
const WORKER_MAX_CONCURRENCY: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const WORKER_HANDLER_TIMEOUT_SECS: u64 = 540;
const TRANSFORM_TIMEOUT_SECS: u64 = 120;
const TRANSFORM_LOCAL_ATTEMPTS: u32 = 2;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "compact" | "text" => Ok(LogFormat::Pretty),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Intake service settings
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub api_keys: Vec<String>,
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_content_types: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_shards: usize,
    pub upload_timeout_secs: u64,
}

/// Object storage settings
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // S3-compatible providers (MinIO, etc.)
    pub gcs_bucket: Option<String>,
    pub timeout_secs: u64,
}

/// Queue channel settings, shared by the request and result channels
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub publish_timeout_secs: u64,
    pub max_delivery_attempts: u32,
    pub min_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub ack_deadline_secs: u64,
}

/// Processing and notification worker settings
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub max_concurrency: usize,
    pub poll_interval_ms: u64,
    pub handler_timeout_secs: u64,
    pub transform_timeout_secs: u64,
    pub transform_local_attempts: u32,
    pub completion_log_path: String,
    pub dead_letter_log_path: String,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub environment: String,
    pub log_format: LogFormat,
    pub intake: IntakeConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    fn as_pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_pipeline().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = PipelineConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn environment(&self) -> &str {
        &self.as_pipeline().environment
    }

    pub fn log_format(&self) -> LogFormat {
        self.as_pipeline().log_format
    }

    pub fn server_port(&self) -> u16 {
        self.as_pipeline().intake.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_pipeline().intake.cors_origins
    }

    pub fn intake(&self) -> &IntakeConfig {
        &self.as_pipeline().intake
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.as_pipeline().storage
    }

    pub fn queue(&self) -> &QueueConfig {
        &self.as_pipeline().queue
    }

    pub fn worker(&self) -> &WorkerConfig {
        &self.as_pipeline().worker
    }
}

impl Default for Config {
    fn default() -> Self {
        Config(Box::new(PipelineConfig::default()))
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_list(name: &str, default: &[&str]) -> Vec<String> {
    match env::var(name) {
        Ok(v) => v
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
            intake: IntakeConfig {
                server_port: SERVER_PORT,
                cors_origins: vec!["*".to_string()],
                api_keys: Vec::new(),
                max_file_size_bytes: MAX_FILE_SIZE_MB * 1024 * 1024,
                allowed_extensions: constants::ALLOWED_EXTENSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                allowed_content_types: constants::ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rate_limit_per_minute: RATE_LIMIT_PER_MINUTE,
                rate_limit_shards: RATE_LIMIT_SHARDS,
                upload_timeout_secs: UPLOAD_TIMEOUT_SECS,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                local_storage_path: None,
                s3_bucket: None,
                s3_region: None,
                s3_endpoint: None,
                gcs_bucket: None,
                timeout_secs: STORAGE_TIMEOUT_SECS,
            },
            queue: QueueConfig {
                publish_timeout_secs: QUEUE_PUBLISH_TIMEOUT_SECS,
                max_delivery_attempts: QUEUE_MAX_DELIVERY_ATTEMPTS,
                min_backoff_secs: QUEUE_MIN_BACKOFF_SECS,
                max_backoff_secs: QUEUE_MAX_BACKOFF_SECS,
                ack_deadline_secs: QUEUE_ACK_DEADLINE_SECS,
            },
            worker: WorkerConfig {
                max_concurrency: WORKER_MAX_CONCURRENCY,
                poll_interval_ms: WORKER_POLL_INTERVAL_MS,
                handler_timeout_secs: WORKER_HANDLER_TIMEOUT_SECS,
                transform_timeout_secs: TRANSFORM_TIMEOUT_SECS,
                transform_local_attempts: TRANSFORM_LOCAL_ATTEMPTS,
                completion_log_path: constants::DEFAULT_COMPLETION_LOG_PATH.to_string(),
                dead_letter_log_path: constants::DEFAULT_DEAD_LETTER_LOG_PATH.to_string(),
            },
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        // Keys are case-sensitive; only whitespace is stripped.
        let api_keys = env::var("API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let log_format = env::var("LOG_FORMAT")
            .ok()
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or(LogFormat::Pretty);

        let backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|v| v.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::Local);

        let max_file_size_mb: usize = env_or("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB);

        let intake = IntakeConfig {
            server_port: env_or("PORT", SERVER_PORT),
            cors_origins,
            api_keys,
            max_file_size_bytes: max_file_size_mb * 1024 * 1024,
            allowed_extensions: env_list("ALLOWED_EXTENSIONS", constants::ALLOWED_EXTENSIONS),
            allowed_content_types: env_list(
                "ALLOWED_CONTENT_TYPES",
                constants::ALLOWED_CONTENT_TYPES,
            ),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", RATE_LIMIT_PER_MINUTE),
            rate_limit_shards: env_or("RATE_LIMIT_SHARDS", RATE_LIMIT_SHARDS),
            upload_timeout_secs: env_or("UPLOAD_TIMEOUT_SECS", UPLOAD_TIMEOUT_SECS),
        };

        let storage = StorageConfig {
            backend,
            local_storage_path: env_opt("LOCAL_STORAGE_PATH")
                .or_else(|| Some(constants::DEFAULT_LOCAL_STORAGE_PATH.to_string())),
            s3_bucket: env_opt("S3_BUCKET"),
            s3_region: env_opt("S3_REGION").or_else(|| env_opt("AWS_REGION")),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            gcs_bucket: env_opt("GCS_BUCKET"),
            timeout_secs: env_or("STORAGE_TIMEOUT_SECS", STORAGE_TIMEOUT_SECS),
        };

        let queue = QueueConfig {
            publish_timeout_secs: env_or("QUEUE_PUBLISH_TIMEOUT_SECS", QUEUE_PUBLISH_TIMEOUT_SECS),
            max_delivery_attempts: env_or(
                "QUEUE_MAX_DELIVERY_ATTEMPTS",
                QUEUE_MAX_DELIVERY_ATTEMPTS,
            ),
            min_backoff_secs: env_or("QUEUE_MIN_BACKOFF_SECS", QUEUE_MIN_BACKOFF_SECS),
            max_backoff_secs: env_or("QUEUE_MAX_BACKOFF_SECS", QUEUE_MAX_BACKOFF_SECS),
            ack_deadline_secs: env_or("QUEUE_ACK_DEADLINE_SECS", QUEUE_ACK_DEADLINE_SECS),
        };

        let worker = WorkerConfig {
            max_concurrency: env_or("WORKER_MAX_CONCURRENCY", WORKER_MAX_CONCURRENCY),
            poll_interval_ms: env_or("WORKER_POLL_INTERVAL_MS", WORKER_POLL_INTERVAL_MS),
            handler_timeout_secs: env_or(
                "WORKER_HANDLER_TIMEOUT_SECS",
                WORKER_HANDLER_TIMEOUT_SECS,
            ),
            transform_timeout_secs: env_or("TRANSFORM_TIMEOUT_SECS", TRANSFORM_TIMEOUT_SECS),
            transform_local_attempts: env_or(
                "TRANSFORM_LOCAL_ATTEMPTS",
                TRANSFORM_LOCAL_ATTEMPTS,
            ),
            completion_log_path: env::var("COMPLETION_LOG_PATH")
                .unwrap_or_else(|_| constants::DEFAULT_COMPLETION_LOG_PATH.to_string()),
            dead_letter_log_path: env::var("DEAD_LETTER_LOG_PATH")
                .unwrap_or_else(|_| constants::DEFAULT_DEAD_LETTER_LOG_PATH.to_string()),
        };

        Ok(Self {
            environment,
            log_format,
            intake,
            storage,
            queue,
            worker,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.intake.api_keys.is_empty() {
            return Err(anyhow::anyhow!(
                "API_KEYS must contain at least one key for the intake service"
            ));
        }

        if self.intake.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }

        if self.intake.rate_limit_per_minute == 0 || self.intake.rate_limit_shards == 0 {
            return Err(anyhow::anyhow!(
                "RATE_LIMIT_PER_MINUTE and RATE_LIMIT_SHARDS must be greater than 0"
            ));
        }

        if self.queue.max_delivery_attempts == 0 {
            return Err(anyhow::anyhow!(
                "QUEUE_MAX_DELIVERY_ATTEMPTS must be greater than 0"
            ));
        }

        if self.queue.min_backoff_secs > self.queue.max_backoff_secs {
            return Err(anyhow::anyhow!(
                "QUEUE_MIN_BACKOFF_SECS must not exceed QUEUE_MAX_BACKOFF_SECS"
            ));
        }

        // A handler that outlives the ack deadline would be redelivered while still running.
        if self.worker.handler_timeout_secs >= self.queue.ack_deadline_secs {
            return Err(anyhow::anyhow!(
                "WORKER_HANDLER_TIMEOUT_SECS must be lower than QUEUE_ACK_DEADLINE_SECS"
            ));
        }

        if self.worker.max_concurrency == 0 || self.worker.transform_local_attempts == 0 {
            return Err(anyhow::anyhow!(
                "WORKER_MAX_CONCURRENCY and TRANSFORM_LOCAL_ATTEMPTS must be greater than 0"
            ));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Gcs => {
                if self.storage.gcs_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "GCS_BUCKET must be set when using GCS storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.intake.api_keys = vec!["secret-key".to_string()];
        config
    }

    #[test]
    fn test_default_config_matches_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.intake.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.intake.rate_limit_per_minute, 20);
        assert_eq!(config.queue.max_delivery_attempts, 5);
        assert_eq!(config.queue.min_backoff_secs, 10);
        assert_eq!(config.queue.max_backoff_secs, 300);
        assert_eq!(config.worker.transform_timeout_secs, 120);
        assert_eq!(config.worker.handler_timeout_secs, 540);
    }

    #[test]
    fn test_validate_requires_api_keys() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_handler_timeout_below_ack_deadline() {
        let mut config = valid_config();
        config.worker.handler_timeout_secs = config.queue.ack_deadline_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_s3_requires_bucket() {
        let mut config = valid_config();
        config.storage.backend = StorageBackend::S3;
        config.storage.s3_region = Some("eu-west-1".to_string());
        assert!(config.validate().is_err());
        config.storage.s3_bucket = Some("uploads".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
