use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Overrides the SQLite file under `data_dir` (e.g. `sqlite::memory:`)
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session in days
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_days: default_session_ttl_days(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_session_ttl_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bookable working window for services, interpreted in UTC
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,
    #[serde(default = "default_day_end_hour")]
    pub day_end_hour: u32,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            day_start_hour: default_day_start_hour(),
            day_end_hour: default_day_end_hour(),
            slot_minutes: default_slot_minutes(),
        }
    }
}

fn default_day_start_hour() -> u32 {
    8
}

fn default_day_end_hour() -> u32 {
    18
}

fn default_slot_minutes() -> u32 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Events queued per live connection before new ones are dropped
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            connection_buffer: default_connection_buffer(),
        }
    }
}

fn default_connection_buffer() -> usize {
    64
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    pub fn validate(&self) -> Result<()> {
        let schedule = &self.schedule;
        if schedule.day_start_hour >= schedule.day_end_hour || schedule.day_end_hour > 24 {
            bail!(
                "schedule: day_start_hour ({}) must be before day_end_hour ({}) and end at or before 24",
                schedule.day_start_hour,
                schedule.day_end_hour
            );
        }
        if schedule.slot_minutes == 0 {
            bail!("schedule: slot_minutes must be positive");
        }
        let window = (schedule.day_end_hour - schedule.day_start_hour) * 60;
        if window % schedule.slot_minutes != 0 {
            bail!(
                "schedule: working window of {} minutes is not a multiple of slot_minutes ({})",
                window,
                schedule.slot_minutes
            );
        }
        if self.notifications.connection_buffer == 0 {
            bail!("notifications: connection_buffer must be positive");
        }
        Ok(())
    }

    /// Database URL, defaulting to a SQLite file inside the data directory
    pub fn database_url(&self) -> String {
        match &self.server.database_url {
            Some(url) => url.clone(),
            None => {
                let db_path = self.server.data_dir.join("skillmarket.db");
                format!("sqlite:{}?mode=rwc", db_path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schedule.day_start_hour, 8);
        assert_eq!(config.schedule.day_end_hour, 18);
        assert_eq!(config.schedule.slot_minutes, 60);
        assert_eq!(config.notifications.connection_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000
            database_url = "sqlite::memory:"

            [schedule]
            day_start_hour = 9
            day_end_hour = 17
            slot_minutes = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.schedule.slot_minutes, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_database_url_uses_data_dir() {
        let config = Config::default();
        assert!(config.database_url().starts_with("sqlite:"));
        assert!(config.database_url().contains("skillmarket.db"));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let inverted = Config::from_toml("[schedule]\nday_start_hour = 18\nday_end_hour = 8").unwrap();
        assert!(inverted.validate().is_err());

        let uneven = Config::from_toml("[schedule]\nslot_minutes = 45").unwrap();
        assert!(uneven.validate().is_err());

        let past_midnight = Config::from_toml("[schedule]\nday_end_hour = 25").unwrap();
        assert!(past_midnight.validate().is_err());
    }
}
