use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    On,
    Off,
    Cool,
    Heat,
    Vent,
    Dry,
}

impl OperationMode {
    pub const ALL: &'static [&'static str] = &["on", "off", "cool", "heat", "vent", "dry"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Cool => "cool",
            Self::Heat => "heat",
            Self::Vent => "vent",
            Self::Dry => "dry",
        }
    }

    pub fn is_off(self) -> bool {
        self == Self::Off
    }

    pub fn system_status(self) -> SystemStatus {
        if self.is_off() {
            SystemStatus::Off
        } else {
            SystemStatus::On
        }
    }
}

impl FromStr for OperationMode {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "cool" => Ok(Self::Cool),
            "heat" => Ok(Self::Heat),
            "vent" => Ok(Self::Vent),
            "dry" => Ok(Self::Dry),
            other => Err(UnknownVariant {
                kind: "operation mode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanSpeed {
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub const ALL: &'static [&'static str] = &["low", "medium", "high"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for FanSpeed {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnknownVariant {
                kind: "fan speed",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneState {
    Open,
    Close,
}

impl ZoneState {
    pub const ALL: &'static [&'static str] = &["open", "close"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }

    /// A zone is closed exactly when its requested mode is `off`.
    pub fn for_mode(mode: OperationMode) -> Self {
        if mode.is_off() {
            Self::Close
        } else {
            Self::Open
        }
    }
}

impl FromStr for ZoneState {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            other => Err(UnknownVariant {
                kind: "zone state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    On,
    Off,
}

impl SystemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDetail {
    pub number: u8,
    pub name: String,
    pub set_temp: f32,
    pub measured_temp: f32,
    pub state: ZoneState,
}

impl ZoneDetail {
    /// Effective mode of the zone: a closed zone always reads `off`.
    pub fn zone_mode(&self, system_mode: OperationMode) -> OperationMode {
        match self.state {
            ZoneState::Close => OperationMode::Off,
            ZoneState::Open => system_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceSnapshot {
    pub mode: OperationMode,
    /// `None` when the appliance reports a speed outside [`FanSpeed`].
    pub fan_speed: Option<FanSpeed>,
    /// `None` when MyZone is disabled.
    pub my_zone: Option<u8>,
    pub zones: BTreeMap<String, ZoneDetail>,
}

impl ApplianceSnapshot {
    pub fn system_status(&self) -> SystemStatus {
        self.mode.system_status()
    }

    pub fn zone(&self, zone_id: &str) -> Option<&ZoneDetail> {
        self.zones.get(zone_id)
    }
}

impl Default for ApplianceSnapshot {
    fn default() -> Self {
        Self {
            mode: OperationMode::Off,
            fan_speed: None,
            my_zone: None,
            zones: BTreeMap::new(),
        }
    }
}
