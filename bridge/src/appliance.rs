use std::future::Future;

use myair_common::{ApplianceSnapshot, FanSpeed, OperationMode, ZoneState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplianceError {
    #[error("appliance request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("appliance returned HTTP {0}")]
    Status(u16),
    #[error("malformed appliance response: {0}")]
    Malformed(String),
    #[error("appliance rejected command: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for ApplianceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// The air conditioner as seen by the bridge: a snapshot refreshed by
/// [`ApplianceClient::update`] plus the mutation calls the appliance accepts.
pub trait ApplianceClient: Send + Sync {
    /// Fetches the current state. The snapshot is only replaced once the
    /// whole response has been parsed.
    fn update(&mut self) -> impl Future<Output = Result<(), ApplianceError>> + Send;

    fn snapshot(&self) -> &ApplianceSnapshot;

    fn set_mode(&self, mode: OperationMode)
        -> impl Future<Output = Result<(), ApplianceError>> + Send;

    fn set_fan_speed(
        &self,
        fan_speed: FanSpeed,
    ) -> impl Future<Output = Result<(), ApplianceError>> + Send;

    fn set_my_zone(&self, zone: u8) -> impl Future<Output = Result<(), ApplianceError>> + Send;

    fn set_zone(
        &self,
        number: u8,
        state: Option<ZoneState>,
        setpoint: f32,
        damper: Option<u8>,
    ) -> impl Future<Output = Result<(), ApplianceError>> + Send;
}
