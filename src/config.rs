use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::services::WatchBackend;
use crate::sink::SportDirPolicy;

/// Prefix for environment overrides: `WORKOUT_SINK__UPLOAD_FOLDER`, etc.
pub const ENV_PREFIX: &str = "WORKOUT_SINK";

/// Main configuration for the sink importer
#[derive(Debug, Deserialize, Validate, Clone, PartialEq, Eq)]
#[validate(schema(function = "validate_settle_window"))]
pub struct Config {
    /// Base upload folder; the sink root is `<upload_folder>/sink`
    pub upload_folder: PathBuf,

    /// Scan existing files before watching
    pub scan_on_start: bool,

    /// Sport applied to files dropped directly in a username folder
    #[validate(range(min = 1))]
    pub default_sport_id: u32,

    /// Handling of `{username}/{not-a-number}/file`
    pub non_numeric_sport_dir: SportDirPolicy,

    pub watch_backend: WatchBackend,

    #[validate(range(min = 50))]
    pub poll_interval_ms: u64,

    /// Size and mtime must hold still this long before a file is imported
    #[validate(range(min = 10))]
    pub settle_interval_ms: u64,

    pub settle_timeout_ms: u64,

    /// Workout application base URL
    #[validate(length(min = 1))]
    pub api_url: String,

    /// Optional bearer token for the workout application
    pub api_token: Option<String>,

    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,
}

fn validate_settle_window(cfg: &Config) -> Result<(), ValidationError> {
    if cfg.settle_timeout_ms < cfg.settle_interval_ms {
        let mut err = ValidationError::new("settle_window");
        err.message = Some("settle_timeout_ms must be at least settle_interval_ms".into());
        return Err(err);
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_folder: PathBuf::from("./uploads"),
            scan_on_start: false,
            default_sport_id: 1,
            non_numeric_sport_dir: SportDirPolicy::Reject,
            watch_backend: WatchBackend::Auto,
            poll_interval_ms: 2000,
            settle_interval_ms: 500,
            settle_timeout_ms: 60_000,
            api_url: "http://localhost:5000".to_string(),
            api_token: None,
            request_timeout_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads defaults, then `~/.workout-sink/config.*` (or `path` when
    /// given), then `WORKOUT_SINK__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_env_prefix(
        path: Option<&Path>,
        env_prefix: &str,
    ) -> Result<Self, config::ConfigError> {
        let file = match path {
            // An explicit file must exist
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => {
                let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
                let base = home.join(".workout-sink").join("config");
                config::File::with_name(&base.to_string_lossy()).required(false)
            }
        };

        let settings = config::Config::builder()
            .set_default("upload_folder", "./uploads")?
            .set_default("scan_on_start", false)?
            .set_default("default_sport_id", 1)?
            .set_default("non_numeric_sport_dir", "reject")?
            .set_default("watch_backend", "auto")?
            .set_default("poll_interval_ms", 2000)?
            .set_default("settle_interval_ms", 500)?
            .set_default("settle_timeout_ms", 60_000)?
            .set_default("api_url", "http://localhost:5000")?
            .set_default("request_timeout_secs", 60)?
            .set_default("log_level", "info")?
            .add_source(file)
            .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
