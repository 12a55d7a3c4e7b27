use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MistralConfig {
    pub listen: ListenConfig,
    pub ingest: IngestConfig,
    pub producer: ProducerConfig,
    pub log: LogConfig,
    pub misc: MiscConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListenConfig {
    /// Address the ingestion server binds to
    #[serde(default = "default_listen_address")]
    pub address: String,

    /// Port the ingestion server binds to
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    /// Route path for metric submissions
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,

    /// Bounded capacity of each handler's input queue
    #[serde(default = "default_handler_queue_capacity")]
    pub handler_queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProducerConfig {
    /// Launch the metric socket producer
    #[serde(default = "default_producer_enabled")]
    pub enabled: bool,

    /// Remote host the producer publishes to
    #[serde(default = "default_producer_address")]
    pub address: String,

    /// Remote port the producer publishes to
    #[serde(default = "default_producer_port")]
    pub port: u16,

    /// Seconds between registry snapshot publications
    #[serde(default = "default_producer_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// Directory for the logfile; empty logs to stderr
    #[serde(default)]
    pub path: String,

    /// Logfile name inside `path`
    #[serde(default = "default_log_file")]
    pub file: String,

    /// Reopen the logfile on SIGUSR2
    #[serde(default)]
    pub rotate: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MiscConfig {
    /// Instance name used as a metric label; empty for single-instance setups
    #[serde(default)]
    pub instance_name: String,
}

impl MistralConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("mistral.conf")
    }

    /// Load configuration from a specific file path.
    ///
    /// The file is TOML regardless of extension. A missing or unparseable
    /// file is an error; the process must not start half-configured.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("listen.address", default_listen_address())?
            .set_default("listen.port", default_listen_port())?
            .set_default("ingest.endpoint_path", default_endpoint_path())?
            .set_default(
                "ingest.handler_queue_capacity",
                default_handler_queue_capacity() as i64,
            )?
            .set_default("producer.enabled", default_producer_enabled())?
            .set_default("producer.address", default_producer_address())?
            .set_default("producer.port", default_producer_port())?
            .set_default("producer.interval_secs", default_producer_interval())?
            .set_default("log.path", "")?
            .set_default("log.file", default_log_file())?
            .set_default("log.rotate", false)?
            .set_default("misc.instance_name", "")?
            .add_source(File::new(&path_str, FileFormat::Toml))
            .add_source(Environment::with_prefix("MISTRAL").separator("_"))
            .build()?;

        let config: MistralConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.address.is_empty() {
            return Err(ConfigError::Message(
                "Listen address must not be empty".to_string(),
            ));
        }

        if self.listen.port == 0 {
            return Err(ConfigError::Message(
                "Listen port must be greater than 0".to_string(),
            ));
        }

        if !self.ingest.endpoint_path.starts_with('/') {
            return Err(ConfigError::Message(
                "Ingestion endpoint path must start with '/'".to_string(),
            ));
        }

        if self.ingest.endpoint_path == "/health" {
            return Err(ConfigError::Message(
                "Ingestion endpoint path must not shadow /health".to_string(),
            ));
        }

        if self.ingest.handler_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Handler queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.producer.enabled {
            if self.producer.address.is_empty() {
                return Err(ConfigError::Message(
                    "Producer address must not be empty when the producer is enabled".to_string(),
                ));
            }

            if self.producer.port == 0 {
                return Err(ConfigError::Message(
                    "Producer port must be greater than 0 when the producer is enabled"
                        .to_string(),
                ));
            }

            if self.producer.interval_secs == 0 {
                return Err(ConfigError::Message(
                    "Producer interval must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.address, self.listen.port)
    }
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig {
                address: default_listen_address(),
                port: default_listen_port(),
            },
            ingest: IngestConfig {
                endpoint_path: default_endpoint_path(),
                handler_queue_capacity: default_handler_queue_capacity(),
            },
            producer: ProducerConfig {
                enabled: default_producer_enabled(),
                address: default_producer_address(),
                port: default_producer_port(),
                interval_secs: default_producer_interval(),
            },
            log: LogConfig {
                path: String::new(),
                file: default_log_file(),
                rotate: false,
            },
            misc: MiscConfig {
                instance_name: String::new(),
            },
        }
    }
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    8080
}

fn default_endpoint_path() -> String {
    "/api/metrics".to_string()
}
fn default_handler_queue_capacity() -> usize {
    16
}

fn default_producer_enabled() -> bool {
    false
}
fn default_producer_address() -> String {
    "127.0.0.1".to_string()
}
fn default_producer_port() -> u16 {
    2003
}
fn default_producer_interval() -> u64 {
    10
}

fn default_log_file() -> String {
    "mistral.log".to_string()
}
