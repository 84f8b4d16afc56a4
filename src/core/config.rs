use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "ipo-pilot";
const ENV_PREFIX: &str = "IPO_PILOT";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub depository: DepositoryConfig,
    pub retry: RetryConfig,
    pub monitoring: MonitoringConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositoryConfig {
    pub base_url: String,
    pub result_feed_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub default_interval_secs: u64,
    pub health_port: u16,
    pub log_level: String,
    pub autostart: bool,
    /// Apply once for every active profile and exit instead of monitoring.
    pub run_once: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub seed_defaults: bool,
}

impl Config {
    /// Defaults, then `ipo-pilot.toml` if present, then `IPO_PILOT__SECTION__KEY`
    /// environment variables (a `.env` file is loaded first).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("database.path", "data/ipo_pilot.db")?
            .set_default(
                "depository.base_url",
                "https://webbackend.cdsc.com.np/api/meroShare",
            )?
            .set_default("depository.result_feed_url", "https://iporesult.cdsc.com.np")?
            .set_default("depository.request_timeout_secs", 30)?
            .set_default(
                "depository.user_agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.backoff_step_ms", 1000)?
            .set_default("monitoring.default_interval_secs", 300)?
            .set_default("monitoring.health_port", 3000)?
            .set_default("monitoring.log_level", "info")?
            .set_default("monitoring.autostart", true)?
            .set_default("monitoring.run_once", false)?
            .set_default("sources.seed_defaults", true)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("Failed to assemble configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        Ok(config)
    }
}

impl DepositoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RetryConfig {
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }
}

impl MonitoringConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }
}
