use serde::Deserialize;
use std::collections::HashMap;
use std::net::{AddrParseError, IpAddr, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// Operator token validation
    pub jwt: JwtAuthConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Device credential store: device id to shared secret
    #[serde(default)]
    pub devices: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

/// Where alarm state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process memory. State is lost on restart.
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Postgres => f.write_str("postgres"),
            StorageBackend::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Peers whose `X-Forwarded-For` is honoured. Empty trusts nobody.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,

    /// Per device id, 0 disables the limit
    #[serde(default = "default_device_rate_limit")]
    pub device_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// RSA public key in PEM format of the identity service
    pub public_key: String,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_central_device_id")]
    pub central_device_id: String,

    /// Lifetime of a queued command
    #[serde(default = "default_command_ttl")]
    pub command_ttl_secs: i64,

    #[serde(default = "default_history_limit")]
    pub history_default_limit: i64,

    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: i64,

    /// 0 disables duplicate sensor report suppression
    #[serde(default = "default_trigger_dedup_window")]
    pub trigger_dedup_window_ms: i64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            central_device_id: default_central_device_id(),
            command_ttl_secs: default_command_ttl(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
            trigger_dedup_window_ms: default_trigger_dedup_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_minutes: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            cleanup_interval_minutes: default_cleanup_interval(),
        }
    }
}

/// MQTT broker connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_mqtt_host")]
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// A random suffix is appended per process
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_ms: u64,

    #[serde(default = "default_reconnect_min")]
    pub reconnect_min_ms: u64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: String::new(),
            password: String::new(),
            client_id_prefix: default_client_id_prefix(),
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive(),
            publish_timeout_ms: default_publish_timeout(),
            reconnect_min_ms: default_reconnect_min(),
            reconnect_max_ms: default_reconnect_max(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_device_rate_limit() -> u32 {
    120
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_central_device_id() -> String {
    "home_alarm_central_001".to_string()
}
fn default_command_ttl() -> i64 {
    300
}
fn default_history_limit() -> i64 {
    50
}
fn default_history_max_limit() -> i64 {
    500
}
fn default_trigger_dedup_window() -> i64 {
    2000
}
fn default_retention_days() -> i64 {
    7
}
fn default_cleanup_interval() -> u64 {
    60
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id_prefix() -> String {
    "home-alarm-bridge".to_string()
}
fn default_topic_prefix() -> String {
    "flowsight".to_string()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_publish_timeout() -> u64 {
    2000
}
fn default_reconnect_min() -> u64 {
    500
}
fn default_reconnect_max() -> u64 {
    30_000
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with HA__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("HA").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 10
            min_connections = 2

            [storage]
            backend = "postgres"

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            device_rate_limit_per_minute = 120

            [jwt]
            public_key = "test-public-key"
            leeway_secs = 30

            [devices]
            home_alarm_central_001 = "central-secret"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "HA__DATABASE__URL must be set for the postgres storage backend".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.devices.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "at least one [devices] credential must be configured".to_string(),
            ));
        }

        if self.alarm.command_ttl_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "alarm.command_ttl_secs must be positive".to_string(),
            ));
        }

        if self.alarm.history_default_limit > self.alarm.history_max_limit {
            return Err(ConfigValidationError::InvalidValue(
                "alarm.history_default_limit cannot exceed alarm.history_max_limit".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Clamps a requested history page size.
    pub fn history_limit(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.alarm.history_default_limit)
            .clamp(1, self.alarm.history_max_limit)
    }
}
