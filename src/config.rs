use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: Server,
    pub db: Db,
    pub workers: Workers,
    pub queue: Queue,
    pub retry: Retry,
    pub idempotency: Idempotency,
    pub maintenance: Maintenance,
    pub storage: Storage,
    pub notify: Notify,
    pub observability: Observability,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Db {
    /// Postgres URL; the in-memory backend is used when unset.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for Db {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Workers {
    /// One worker per entry, bound to that slot for its lifetime.
    pub slots: Vec<String>,
    pub poll_interval_ms: u64,
    pub visibility_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            slots: vec!["gpu-0".to_string()],
            poll_interval_ms: 500,
            visibility_timeout_ms: 30_000,
            heartbeat_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Queue {
    pub starvation_limit: u32,
    pub max_payload_bytes: usize,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            starvation_limit: 8,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            jitter_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Idempotency {
    pub ttl_seconds: u64,
}

impl Default for Idempotency {
    fn default() -> Self {
        Self { ttl_seconds: 3_600 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Maintenance {
    pub poll_interval_ms: u64,
    pub batch_size: u32,
}

impl Default for Maintenance {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Storage {
    pub root: String,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            root: "./data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Notify {
    pub request_timeout_ms: u64,
}

impl Default for Notify {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Observability {
    pub service_name: String,
    pub json_logs: bool,
    pub enable_metrics: bool,
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            service_name: "inferd".to_string(),
            json_logs: false,
            enable_metrics: true,
        }
    }
}

impl Settings {
    /// Reject combinations that would break the worker lease.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let workers = &self.workers;
        if workers.heartbeat_interval_ms >= workers.visibility_timeout_ms {
            return Err(config::ConfigError::Message(format!(
                "workers.heartbeat_interval_ms ({}) must be below workers.visibility_timeout_ms ({})",
                workers.heartbeat_interval_ms, workers.visibility_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Load settings from `config/default.toml`, `config/<env>.toml`, and env overrides.
pub fn load() -> Result<Settings, config::ConfigError> {
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    let settings: Settings = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(config::Environment::with_prefix("INFERD").separator("__"))
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
