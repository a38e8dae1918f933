pub mod config;
pub mod homie;
pub mod mirror;
pub mod topics;
pub mod types;

pub use config::{BridgeConfig, ConfigError, MqttSettings, MyAirSettings, RefreshSettings};
pub use homie::{DeviceInfo, HomieError, Publication, SetError};
pub use homie5::HomieDeviceStatus;
pub use mirror::{ApplianceCommand, CommandHandler, DeviceMirror, MirrorAction, MirrorError};
pub use topics::*;
pub use types::{ApplianceSnapshot, FanSpeed, OperationMode, SystemStatus, ZoneDetail, ZoneState};
