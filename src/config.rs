use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

fn default_trigger_field() -> String {
    "estadoPin".to_string()
}

fn default_poll_interval_secs() -> f64 {
    3.0
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_carmen_url() -> Url {
    "https://eu-central-1.api.carmencloud.com/vehicle"
        .parse()
        .unwrap()
}

#[derive(Serialize, Deserialize)]
pub struct Config {
    pub prometheus_bind: Option<SocketAddr>,
    pub snapshot_dir: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    // MAC address -> location identifier, shared by all lanes
    #[serde(default)]
    pub locations: IndexMap<String, String>,
    pub carmen: CarmenConfig,
    pub sink: SinkConfig,
    // if true, a plate already recorded in this process is not sent to the sink again
    #[serde(default)]
    pub dedup_plates: bool,
    pub lanes: IndexMap<String, LaneConfig>,
}

#[derive(Serialize, Deserialize)]
pub struct LaneConfig {
    pub trigger_url: Url,
    #[serde(default = "default_trigger_field")]
    pub trigger_field: String,
    pub camera_url: Url,
    pub mac_address: String,
    #[serde(default)]
    pub mode: LaneMode,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaneMode {
    Disable,
    #[default]
    Enable,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct CarmenConfig {
    #[serde(default = "default_carmen_url")]
    pub url: Url,
    pub api_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Database {
        url: String,
    },
    Rest {
        auth_url: Url,
        insert_url: Url,
        username: String,
        password: String,
    },
    Csv,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&raw)?;
        if config.lanes.is_empty() {
            return Err(ConfigError::NoLanes);
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

pub fn default_config_path() -> PathBuf {
    let var = std::env::var("RPR_CONFIG").unwrap_or_default();
    if var.is_empty() {
        "./config.yaml".into()
    } else {
        var.into()
    }
}
