use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::ConfigError,
    profile::{self, CycleProfile},
    types::ApplianceType,
};

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceConfig {
    pub id: String,
    pub name: String,
    pub appliance_type: ApplianceType,
    pub power_sensor: String,
    #[serde(default)]
    pub power_unit: Option<String>,
    #[serde(default)]
    pub door_sensor: Option<String>,
    #[serde(default)]
    pub profile: Map<String, Value>,
}

impl ApplianceConfig {
    pub fn resolve_profile(&self) -> Result<CycleProfile, ConfigError> {
        profile::merge(&self.appliance_type.default_profile(), &self.profile).map_err(|source| {
            ConfigError::Profile {
                id: self.id.clone(),
                source,
            }
        })
    }

    pub fn has_door_sensor(&self) -> bool {
        self.door_sensor
            .as_deref()
            .is_some_and(|topic| !topic.trim().is_empty())
    }

    pub fn validate(&self) -> Result<CycleProfile, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if self.power_sensor.trim().is_empty() {
            return Err(ConfigError::MissingPowerSensor(self.id.clone()));
        }
        self.resolve_profile()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub appliances: Vec<ApplianceConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            http_port: default_http_port(),
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            appliances: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn partition_appliances(&self) -> (Vec<(ApplianceConfig, CycleProfile)>, Vec<ConfigError>) {
        let mut seen = HashSet::new();
        let mut valid = Vec::new();
        let mut errors = Vec::new();

        for appliance in &self.appliances {
            if !seen.insert(appliance.id.as_str()) {
                errors.push(ConfigError::DuplicateId(appliance.id.clone()));
                continue;
            }
            match appliance.validate() {
                Ok(profile) => valid.push((appliance.clone(), profile)),
                Err(err) => errors.push(err),
            }
        }

        (valid, errors)
    }

    pub fn appliance_mut(&mut self, id: &str) -> Option<&mut ApplianceConfig> {
        self.appliances.iter_mut().find(|appliance| appliance.id == id)
    }

    pub fn sanitize(&mut self) {
        if self.tick_interval_secs == 0 {
            self.tick_interval_secs = DEFAULT_TICK_INTERVAL_SECS;
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}
