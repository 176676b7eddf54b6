//! # fs-config
//!
//! Layered runtime settings: built-in defaults, then an optional
//! `foodshare.toml`, then `FOODSHARE__SECTION__KEY` environment variables
//! (a `.env` file is loaded into the environment first).

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub sweeper: SweeperSettings,
    pub discovery: DiscoverySettings,
    pub notifications: NotificationSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// e.g. "sqlite:foodshare.db" or "sqlite::memory:"
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperSettings {
    pub interval_secs: u64,
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    pub default_radius_m: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// When false, notifications are skipped entirely
    pub enabled: bool,
    /// Base URL used in links back to the web app
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Settings {
    /// Loads `.env`, `foodshare.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        let builder = defaults()?
            .add_source(File::with_name("foodshare").required(false))
            .add_source(
                Environment::with_prefix("FOODSHARE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sweeper.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "sweeper.interval_secs",
                reason: "must be at least 1 second".into(),
            });
        }
        let radius = self.discovery.default_radius_m;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "discovery.default_radius_m",
                reason: format!("{radius} is not a positive distance"),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "database.max_connections",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("database.url", "sqlite:foodshare.db")?
        .set_default("database.max_connections", 5_i64)?
        .set_default("sweeper.interval_secs", 60_i64)?
        .set_default("discovery.default_radius_m", 5_000.0_f64)?
        .set_default("notifications.enabled", true)?
        .set_default("notifications.frontend_url", "http://localhost:5173")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_builder(defaults().unwrap()).unwrap();
        assert_eq!(settings.database.url, "sqlite:foodshare.db");
        assert_eq!(settings.sweeper.interval(), Duration::from_secs(60));
        assert_eq!(settings.discovery.default_radius_m, 5_000.0);
        assert!(settings.notifications.enabled);
        assert!(!settings.log.json);
    }

    #[test]
    fn test_overrides_win() {
        let builder = defaults()
            .unwrap()
            .set_override("sweeper.interval_secs", 5_i64)
            .unwrap()
            .set_override("notifications.enabled", false)
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.sweeper.interval_secs, 5);
        assert!(!settings.notifications.enabled);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let builder = defaults()
            .unwrap()
            .set_override("sweeper.interval_secs", 0_i64)
            .unwrap();
        let err = Settings::from_builder(builder).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "sweeper.interval_secs",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let builder = defaults()
            .unwrap()
            .set_override("discovery.default_radius_m", 0.0_f64)
            .unwrap();
        assert!(Settings::from_builder(builder).is_err());
    }
}
