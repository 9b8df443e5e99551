use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub share: SharingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Public share link and calendar feed settings
#[derive(Debug, Clone, Deserialize)]
pub struct SharingConfig {
    /// Origin used when building share and feed URLs
    #[serde(default = "default_public_origin")]
    pub public_origin: String,
    #[serde(default = "default_feed_cache_max_age")]
    pub feed_cache_max_age_secs: u64,
    #[serde(default = "default_feed_refresh_interval")]
    pub feed_refresh_interval_mins: u64,
    #[serde(default = "default_pin_max_attempts")]
    pub pin_max_attempts: u32,
    #[serde(default = "default_pin_lockout_base")]
    pub pin_lockout_base_secs: u64,
    #[serde(default = "default_pin_lockout_max")]
    pub pin_lockout_max_secs: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/pawshare.db".to_string()
}

fn default_public_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_feed_cache_max_age() -> u64 {
    300 // 5 minutes
}

fn default_feed_refresh_interval() -> u64 {
    60
}

fn default_pin_max_attempts() -> u32 {
    5
}

fn default_pin_lockout_base() -> u64 {
    30
}

fn default_pin_lockout_max() -> u64 {
    3600 // 1 hour
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            public_origin: default_public_origin(),
            feed_cache_max_age_secs: default_feed_cache_max_age(),
            feed_refresh_interval_mins: default_feed_refresh_interval(),
            pin_max_attempts: default_pin_max_attempts(),
            pin_lockout_base_secs: default_pin_lockout_base(),
            pin_lockout_max_secs: default_pin_lockout_max(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.normalize();
        config.ensure_directories()?;
        tracing::info!(
            "Share config: public_origin={}, feed max-age={}s, pin attempts={}",
            config.share.public_origin,
            config.share.feed_cache_max_age_secs,
            config.share.pin_max_attempts
        );
        Ok(config)
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    /// Format: PS_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("PS_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("PS_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("PS_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Share overrides
        if let Ok(val) = env::var("PS_CONF_SHARE_PUBLIC_ORIGIN") {
            if !val.trim().is_empty() {
                self.share.public_origin = val;
            }
        }
        if let Ok(val) = env::var("PS_CONF_SHARE_FEED_CACHE_MAX_AGE") {
            if let Ok(secs) = val.parse() {
                self.share.feed_cache_max_age_secs = secs;
            }
        }
        if let Ok(val) = env::var("PS_CONF_SHARE_FEED_REFRESH_INTERVAL") {
            if let Ok(mins) = val.parse() {
                self.share.feed_refresh_interval_mins = mins;
            }
        }
        if let Ok(val) = env::var("PS_CONF_SHARE_PIN_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.share.pin_max_attempts = n;
            }
        }
        if let Ok(val) = env::var("PS_CONF_SHARE_PIN_LOCKOUT_BASE") {
            if let Ok(secs) = val.parse() {
                self.share.pin_lockout_base_secs = secs;
            }
        }
        if let Ok(val) = env::var("PS_CONF_SHARE_PIN_LOCKOUT_MAX") {
            if let Ok(secs) = val.parse() {
                self.share.pin_lockout_max_secs = secs;
            }
        }
    }

    fn normalize(&mut self) {
        let origin = self.share.public_origin.trim().trim_end_matches('/');
        self.share.public_origin = if origin.is_empty() {
            default_public_origin()
        } else {
            origin.to_string()
        };
        if self.share.pin_max_attempts == 0 {
            self.share.pin_max_attempts = default_pin_max_attempts();
        }
        if self.share.pin_lockout_max_secs < self.share.pin_lockout_base_secs {
            self.share.pin_lockout_max_secs = self.share.pin_lockout_base_secs;
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
