use config::{Config, ConfigError, FileFormat};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub cities: Cities,
    pub minio: MinioConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    pub buckets: BucketConfig,
    #[serde(default = "default_api_config")]
    pub api: ApiConfig,
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Cities {
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MinioConfig {
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BucketConfig {
    pub weather: String,   // weather staging
    pub climate: String,   // climate staging
    pub archive: String,   // processed staging objects
    pub warehouse: String, // table parts, load ledger, trigger state
    pub reporting: String, // dashboard views
}

impl BucketConfig {
    pub fn all(&self) -> [&str; 5] {
        [
            &self.weather,
            &self.climate,
            &self.archive,
            &self.warehouse,
            &self.reporting,
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_climate_url")]
    pub climate_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClimateConfig {
    /// Only rows for these countries are staged. Empty keeps every country.
    #[serde(default)]
    pub countries: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retries: default_retries(),
            retry_delay_secs: default_retry_delay(),
            unit_timeout_secs: default_unit_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_deduplicate")]
    pub deduplicate_loads: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            deduplicate_loads: default_deduplicate(),
        }
    }
}

/// Everything the dashboard process needs, handed over at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: default_dashboard_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_config() -> ApiConfig {
    ApiConfig {
        geocoding_url: default_geocoding_url(),
        weather_url: default_weather_url(),
        climate_url: default_climate_url(),
        timeout_secs: default_api_timeout(),
        headers: HashMap::new(),
    }
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1/search".to_string()
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_climate_url() -> String {
    "http://localhost:8000/GlobalLandTemperaturesByCountry.csv".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    300
}

fn default_unit_timeout() -> u64 {
    1800
}

fn default_pool_size() -> usize {
    4
}

fn default_deduplicate() -> bool {
    true
}

fn default_dashboard_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3000
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        Self::build(builder.build()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let builder =
            Config::builder().add_source(config::File::from_str(contents, FileFormat::Toml));

        Self::build(builder.build()?)
    }

    fn build(config: Config) -> Result<Self, ConfigError> {
        if let Ok(headers) = config.get_table("api.headers") {
            debug!(?headers, "Loaded API headers from configuration");
        }

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        debug!(
            cities = ?settings.cities.names,
            backend = ?settings.storage.backend,
            "Parsed pipeline settings"
        );

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cities.names.is_empty() {
            return Err(ConfigError::Message(
                "cities.names must list at least one city".into(),
            ));
        }

        let mut cities = HashSet::new();
        for city in &self.cities.names {
            if !cities.insert(city.as_str()) {
                return Err(ConfigError::Message(format!(
                    "city '{}' is listed more than once",
                    city
                )));
            }
        }

        let mut seen = HashSet::new();
        for bucket in self.buckets.all() {
            if !seen.insert(bucket) {
                return Err(ConfigError::Message(format!(
                    "bucket '{}' is configured for more than one role",
                    bucket
                )));
            }
        }

        if self.scheduler.workers == 0 {
            return Err(ConfigError::Message("scheduler.workers must be > 0".into()));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::Message("database.pool_size must be > 0".into()));
        }

        Ok(())
    }
}
