use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning for the event-stream connections and their maintenance task
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Keep-alive interval in seconds (server writes `:keep-alive`)
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval: u64,
    /// Idle time in seconds after which a connection is reclaimed
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u64,
    /// Reclamation sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Upper bound for a single event write, in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Buffered frames per connection before writes start to block
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_keep_alive_interval() -> u64 {
    25
}

fn default_stale_threshold() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_write_timeout_ms() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    32
}

impl StreamConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Check that the intervals are usable together.
    ///
    /// A connection must be able to miss one keep-alive round and still
    /// survive the sweep, so the stale threshold has to cover at least two
    /// keep-alive intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_interval == 0 || self.sweep_interval == 0 || self.stale_threshold == 0 {
            return Err(ConfigError::Message(
                "stream intervals must be greater than zero".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "stream.channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.stale_threshold < self.keep_alive_interval.saturating_mul(2) {
            return Err(ConfigError::Message(format!(
                "stream.stale_threshold ({}s) must be at least twice stream.keep_alive_interval ({}s)",
                self.stale_threshold, self.keep_alive_interval
            )));
        }
        if self.write_timeout_ms >= self.keep_alive_interval.saturating_mul(1000) {
            return Err(ConfigError::Message(format!(
                "stream.write_timeout_ms ({}) must be shorter than the keep-alive interval",
                self.write_timeout_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "civreg-notify".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("stream.keep_alive_interval", default_keep_alive_interval())?
            .set_default("stream.stale_threshold", default_stale_threshold())?
            .set_default("stream.sweep_interval", default_sweep_interval())?
            .set_default("stream.write_timeout_ms", default_write_timeout_ms())?
            .set_default("stream.channel_capacity", default_channel_capacity() as u64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, JWT__SECRET, STREAM__STALE_THRESHOLD, ...
            // Double underscore so field names may contain single ones
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.stream.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: default_keep_alive_interval(),
            stale_threshold: default_stale_threshold(),
            sweep_interval: default_sweep_interval(),
            write_timeout_ms: default_write_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
