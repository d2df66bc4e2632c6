use crate::core::cache::CachePolicy;
use crate::core::scheduler::DailySchedule;
use crate::core::session::SessionLimits;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CbuProviderConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CbuProviderConfig {
    fn default() -> Self {
        CbuProviderConfig {
            base_url: "https://cbu.uz".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub cbu: CbuProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub retry_attempts: usize,
    pub retry_delay_ms: u64,
    pub change_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 300,
            refresh_interval_secs: 300,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            change_threshold: 0.01,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.ttl_secs),
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            change_threshold: self.change_threshold,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    /// Local wall-clock time, `HH:MM`.
    pub time: String,
    /// IANA timezone name.
    pub timezone: String,
    pub send_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            time: "07:30".to_string(),
            timezone: "Asia/Tashkent".to_string(),
            send_delay_ms: 50,
        }
    }
}

impl NotificationConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid notification timezone '{}': {}", self.timezone, e))
    }

    pub fn schedule(&self) -> Result<DailySchedule> {
        let at = NaiveTime::parse_from_str(&self.time, "%H:%M")
            .with_context(|| format!("Invalid notification time '{}', expected HH:MM", self.time))?;
        Ok(DailySchedule {
            at,
            timezone: self.timezone()?,
        })
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub max_targets: usize,
    pub max_amount: f64,
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let limits = SessionLimits::default();
        SessionConfig {
            max_targets: limits.max_targets,
            max_amount: limits.max_amount,
            idle_timeout_secs: 600,
        }
    }
}

impl SessionConfig {
    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_targets: self.max_targets,
            max_amount: self.max_amount,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            bot_token: None,
            api_url: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the default config file, or the built-in defaults when it does
    /// not exist yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("uz", "kurs", "kurs")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("uz", "kurs", "kurs")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = if config_str.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&config_str).with_context(|| {
                format!("Failed to parse config file: {}", path.as_ref().display())
            })?
        };
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.notification.schedule()?;
        if self.session.max_targets == 0 {
            return Err(anyhow!("session.max_targets must be at least 1"));
        }
        if !(self.session.max_amount.is_finite() && self.session.max_amount > 0.0) {
            return Err(anyhow!("session.max_amount must be a positive number"));
        }
        Ok(())
    }
}
