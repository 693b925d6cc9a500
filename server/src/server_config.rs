use config::{Config, ConfigError, Environment};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub retention_max_age_days: i64,
    pub item_timeout_secs: u64,
    #[serde(default)]
    pub create_schema_on_startup: bool,
}

impl Settings {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn retention_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_max_age_days)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub sync_interval_secs: u64,
    pub retention_interval_secs: u64,
    pub sync_label_filter: String,
    pub sync_page_size: u32,
    pub sync_max_pages: u32,
    pub max_concurrent_users: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub api_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub settings: Settings,
    pub scheduler: SchedulerConfig,
    pub gmail: GmailConfig,
}

impl ServerConfig {
    /// Reads `{root}/config.toml`, then applies `APP__SECTION__KEY` overrides.
    pub fn from_dir(root: &str) -> Result<Self, ConfigError> {
        let path = format!("{root}/config.toml");
        Config::builder()
            .add_source(config::File::with_name(&path))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n{:?}\n\nScheduler: {:?}\n\nGmail: {:?}",
            self.settings, self.scheduler, self.gmail,
        )
    }
}

pub fn config_dir() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let dir = Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .display()
            .to_string();
        format!("{}/config", dir)
    })
}

lazy_static! {
    pub static ref cfg: ServerConfig =
        ServerConfig::from_dir(&config_dir()).expect("config.toml is missing or invalid");
}
