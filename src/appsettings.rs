use std::{path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    pub path: PathBuf,
    pub persist_timeout_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub demo: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    pub storage: StorageSettings,
    pub scheduler: SchedulerSettings,
}

impl AppSettings {
    /// Reads `appsettings`, then `appsettings.local`, then `APP_*` environment
    /// variables (`APP_SCHEDULER__INTERVAL_SECS=2`). Later sources win.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("appsettings").required(false))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    fn environment() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
    }

    fn builder() -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("storage.path", "lembretes.json")?
            .set_default("storage.persist_timeout_ms", 5000_i64)?
            .set_default("scheduler.interval_secs", 5_i64)?
            .set_default("scheduler.demo", false)
    }

    /// Poll interval, never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_secs.max(1))
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.persist_timeout_ms.max(1))
    }
}
