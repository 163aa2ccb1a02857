//! Configuration management for Crosspost
//!
//! Platform sections carry client credentials and base URLs. The URLs
//! default to the real platform hosts but are plain config fields, so
//! tests and staging setups can point a publisher at any server. All
//! configuration is passed down explicitly; there is no process-global
//! settings object.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub linkedin: Option<LinkedinConfig>,
    pub x: Option<XConfig>,
    pub tiktok: Option<TiktokConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler/refresher ticks in the daemon.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Posting window opens this many hours ahead of the tick.
    #[serde(default = "default_window_offset_hours")]
    pub window_offset_hours: i64,
    /// Length of the posting window in hours.
    #[serde(default = "default_window_length_hours")]
    pub window_length_hours: i64,
    /// Cap on concurrently running publish units.
    #[serde(default = "default_max_concurrent_publishes")]
    pub max_concurrent_publishes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            window_offset_hours: default_window_offset_hours(),
            window_length_hours: default_window_length_hours(),
            max_concurrent_publishes: default_max_concurrent_publishes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedinConfig {
    pub client_id: String,
    pub client_secret: String,
    /// OAuth host, e.g. "https://www.linkedin.com/"
    #[serde(default = "default_linkedin_base_url")]
    pub base_url: String,
    /// REST API host, e.g. "https://api.linkedin.com/"
    #[serde(default = "default_linkedin_api_url")]
    pub api_url: String,
    /// Refresh tokens when the access token expires within this window.
    #[serde(default = "default_linkedin_refresh_lead_hours")]
    pub refresh_lead_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Tweet API host, e.g. "https://api.x.com/"
    #[serde(default = "default_x_api_url")]
    pub api_url: String,
    /// Media upload host, e.g. "https://upload.twitter.com/"
    #[serde(default = "default_x_upload_url")]
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiktokConfig {
    pub client_key: String,
    pub client_secret: String,
    /// Open API host, e.g. "https://open.tiktokapis.com/v2/"
    #[serde(default = "default_tiktok_api_url")]
    pub api_url: String,
    #[serde(default = "default_tiktok_refresh_lead_hours")]
    pub refresh_lead_hours: i64,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_window_offset_hours() -> i64 {
    3
}

fn default_window_length_hours() -> i64 {
    1
}

fn default_max_concurrent_publishes() -> usize {
    8
}

fn default_linkedin_base_url() -> String {
    "https://www.linkedin.com/".to_string()
}

fn default_linkedin_api_url() -> String {
    "https://api.linkedin.com/".to_string()
}

fn default_linkedin_refresh_lead_hours() -> i64 {
    24
}

fn default_x_api_url() -> String {
    "https://api.x.com/".to_string()
}

fn default_x_upload_url() -> String {
    "https://upload.twitter.com/".to_string()
}

fn default_tiktok_api_url() -> String {
    "https://open.tiktokapis.com/v2/".to_string()
}

fn default_tiktok_refresh_lead_hours() -> i64 {
    6
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}
