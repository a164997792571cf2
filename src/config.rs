use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

/// Remote data store endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub subscribe_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                url: String::new(),
                anon_key: String::new(),
                request_timeout_secs: 30,
            },
            storage: StorageConfig {
                bucket: "warranty-images".to_string(),
                upload_timeout_secs: 10,
            },
            realtime: RealtimeConfig {
                subscribe_timeout_secs: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, reading `path` on top of the default files
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(Some(path))
    }

    fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        let defaults = AppConfig::default();

        let mut builder = Config::builder()
            // Start with default values
            .set_default("remote.url", defaults.remote.url)?
            .set_default("remote.anon_key", defaults.remote.anon_key)?
            .set_default("remote.request_timeout_secs", defaults.remote.request_timeout_secs)?
            .set_default("storage.bucket", defaults.storage.bucket)?
            .set_default("storage.upload_timeout_secs", defaults.storage.upload_timeout_secs)?
            .set_default(
                "realtime.subscribe_timeout_secs",
                defaults.realtime.subscribe_timeout_secs,
            )?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("WARRANTY_WATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // The app's historical variable names win over everything else
            .set_override_option("remote.url", std::env::var("SUPABASE_URL").ok())?
            .set_override_option("remote.anon_key", std::env::var("SUPABASE_ANON_KEY").ok())?
            .set_override_option("storage.bucket", std::env::var("SUPABASE_STORAGE_BUCKET").ok())?
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Missing remote credentials must stop the app before any core operation
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate remote config
        if self.remote.url.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "remote.url is missing (set SUPABASE_URL or WARRANTY_WATCH_REMOTE__URL)"
            ));
        }
        let url = url::Url::parse(&self.remote.url)
            .map_err(|e| anyhow::anyhow!("remote.url is not a valid URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "remote.url must use http or https, got {}",
                url.scheme()
            ));
        }
        if self.remote.anon_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "remote.anon_key is missing (set SUPABASE_ANON_KEY or WARRANTY_WATCH_REMOTE__ANON_KEY)"
            ));
        }
        if self.remote.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be greater than 0"));
        }

        // Validate storage config
        if self.storage.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.bucket cannot be empty"));
        }
        if self.storage.upload_timeout_secs == 0 {
            return Err(anyhow::anyhow!("upload_timeout_secs must be greater than 0"));
        }

        if self.realtime.subscribe_timeout_secs == 0 {
            return Err(anyhow::anyhow!("subscribe_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.upload_timeout_secs)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(self.realtime.subscribe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.request_timeout_secs)
    }

    /// Copy safe to print: the key is masked
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.remote.anon_key.is_empty() {
            let visible: String = copy.remote.anon_key.chars().take(4).collect();
            copy.remote.anon_key = format!("{visible}…");
        }
        copy
    }
}
