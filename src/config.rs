use anyhow::{anyhow, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: MongoDbConfig,
    pub cors: CorsConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Which store implementation backs ride requests and pools
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    MongoDb,
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MongoDbConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub uri: String,
    pub database: String,
    pub connection_timeout_ms: u64,
    pub max_pool_size: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub supports_credentials: bool,
}

/// Constraints applied by the candidate filter and grouping engine
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    pub time_window_minutes: i64,
    pub pickup_radius_km: f64,
    pub destination_radius_km: f64,
    pub max_group_size: usize,
    /// How many times a submission re-reads candidates after losing a claim race
    pub form_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    pub rate_per_km: f64,
    pub solo_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    pub commit_timeout_ms: u64,
    pub commit_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            time_window_minutes: 15,
            pickup_radius_km: 2.0,
            destination_radius_km: 5.0,
            max_group_size: 4,
            form_attempts: 3,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_per_km: 8.0,
            solo_multiplier: 4.0,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 5000,
            commit_attempts: 3,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8081,
                log_level: "info".to_string(),
                api_key: None,
            },
            database: MongoDbConfig {
                backend: StorageBackend::MongoDb,
                uri: "mongodb://localhost:27017".to_string(),
                database: "ridepool".to_string(),
                connection_timeout_ms: 5000,
                max_pool_size: Some(10),
            },
            cors: CorsConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                allowed_methods: vec![
                    "GET".to_string(),
                    "POST".to_string(),
                    "PATCH".to_string(),
                    "DELETE".to_string(),
                ],
                allowed_headers: vec![
                    "Authorization".to_string(),
                    "X-API-Key".to_string(),
                    "X-User-Id".to_string(),
                    "Accept".to_string(),
                    "Content-Type".to_string(),
                ],
                supports_credentials: true,
            },
            matching: MatchingConfig::default(),
            pricing: PricingConfig::default(),
            lifecycle: LifecycleConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl MongoDbConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.uri.is_empty() {
            return Err(anyhow!("MongoDB URI not configured"));
        }

        if self.database.is_empty() {
            return Err(anyhow!("MongoDB database name not configured"));
        }

        Ok(())
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_group_size < 2 {
            return Err(anyhow!(
                "max_group_size must be at least 2, got {}",
                self.max_group_size
            ));
        }
        if self.time_window_minutes < 0 {
            return Err(anyhow!("time_window_minutes must not be negative"));
        }
        if self.pickup_radius_km <= 0.0 || self.destination_radius_km <= 0.0 {
            return Err(anyhow!("matching radii must be positive"));
        }
        if self.form_attempts == 0 {
            return Err(anyhow!("form_attempts must be at least 1"));
        }
        Ok(())
    }
}

impl LifecycleConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        info!("Loading config from {}", path.as_ref().display());
        let config = match Self::load_from_file(path) {
            Ok(config) => {
                info!("Config loaded from file");
                config
            }
            Err(e) => {
                error!("Failed to load config from file: {}", e);
                // Fall back to environment variables or defaults
                info!("Falling back to environment variables or defaults");
                Self::from_env()
            }
        };
        config.matching.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("SERVER_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("SERVER_PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                config.server.port = port_num;
            }
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.server.log_level = log_level;
        }

        if let Ok(uri) = std::env::var("MONGODB_URI") {
            config.database.uri = uri;
        }

        if let Ok(db_name) = std::env::var("MONGODB_DATABASE") {
            config.database.database = db_name;
        }

        if let Ok(backend) = std::env::var("STORAGE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "memory" => config.database.backend = StorageBackend::Memory,
                "mongodb" => config.database.backend = StorageBackend::MongoDb,
                other => error!("Unknown STORAGE_BACKEND '{}', keeping default", other),
            }
        }

        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            config.cors.allowed_origins =
                origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(api_key) = std::env::var("API_KEY") {
            config.server.api_key = Some(api_key);
        }

        config
    }
}
