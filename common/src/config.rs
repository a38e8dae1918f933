use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use homie5::HomieID;

pub const DEFAULT_MYAIR_PORT: u16 = 2025;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    #[serde(alias = "MQTT_BROKER")]
    pub broker: String,
    #[serde(alias = "MQTT_PORT")]
    pub port: u16,
    #[serde(alias = "MQTT_USERNAME")]
    pub username: String,
    #[serde(alias = "MQTT_PASSWORD")]
    pub password: String,
    #[serde(alias = "MQTT_CLIENT_ID")]
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            username: String::new(),
            password: String::new(),
            client_id: "myair-to-mqtt".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyAirSettings {
    pub myair_addr: String,
    #[serde(default = "default_myair_port")]
    pub myair_port: u16,
    #[serde(default = "default_aircon")]
    pub aircon: String,
    pub max_zones: u8,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl MyAirSettings {
    pub fn base_url(&self) -> String {
        if self.myair_addr.starts_with("http://") || self.myair_addr.starts_with("https://") {
            self.myair_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}:{}", self.myair_addr, self.myair_port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_myair_port() -> u16 {
    DEFAULT_MYAIR_PORT
}

fn default_aircon() -> String {
    "ac1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub refresh_interval: u64,
    pub device_id: String,
    pub device_name: String,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
            device_id: "advantageair".to_string(),
            device_name: "AdvantageAir".to_string(),
        }
    }
}

impl RefreshSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub mqtt_settings: MqttSettings,
    pub myair_settings: MyAirSettings,
    #[serde(default)]
    pub myair_to_mqtt_settings: RefreshSettings,
}

impl BridgeConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.myair_settings.myair_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("myair_addr cannot be empty".to_string()));
        }
        if self.myair_settings.max_zones == 0 {
            return Err(ConfigError::Invalid("max_zones must be at least 1".to_string()));
        }
        if self.myair_to_mqtt_settings.refresh_interval == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval must be at least 1 second".to_string(),
            ));
        }
        if self.mqtt_settings.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("MQTT broker cannot be empty".to_string()));
        }
        if self.mqtt_settings.port == 0 {
            return Err(ConfigError::Invalid(
                "MQTT port must be between 1 and 65535".to_string(),
            ));
        }
        if HomieID::try_from(self.myair_to_mqtt_settings.device_id.clone()).is_err() {
            return Err(ConfigError::Invalid(format!(
                "device_id '{}' is not a valid topic id",
                self.myair_to_mqtt_settings.device_id
            )));
        }
        Ok(())
    }
}
