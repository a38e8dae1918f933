use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use myair_common::{
    ApplianceCommand, DeviceInfo, DeviceMirror, HomieDeviceStatus, MirrorAction, MirrorError,
    Publication, SetError,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    appliance::{ApplianceClient, ApplianceError},
    transport::{Transport, TransportError},
};

pub type SharedBridge<C, T> = Arc<Mutex<Bridge<C, T>>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Appliance(#[from] ApplianceError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rejected command: {0}")]
    Command(#[from] SetError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Glue between the appliance, the mirrored device tree and the broker.
pub struct Bridge<C, T> {
    mirror: DeviceMirror,
    client: C,
    transport: T,
}

impl<C: ApplianceClient, T: Transport> Bridge<C, T> {
    /// `client` must already hold a snapshot; its zones define the device nodes.
    pub fn new(
        info: DeviceInfo,
        max_zones: u8,
        client: C,
        transport: T,
    ) -> Result<Self, BridgeError> {
        let mirror = DeviceMirror::new(info, max_zones, client.snapshot().clone(), local_now())?;
        Ok(Self {
            mirror,
            client,
            transport,
        })
    }

    pub fn mirror(&self) -> &DeviceMirror {
        &self.mirror
    }

    pub fn into_shared(self) -> SharedBridge<C, T> {
        Arc::new(Mutex::new(self))
    }

    /// Announces the device and subscribes to its command topics. Runs on
    /// every (re)connect since the broker may have dropped the session.
    pub async fn start(&self) -> Result<(), BridgeError> {
        self.publish_state(HomieDeviceStatus::Init).await?;
        self.transport.send(self.mirror.describe()?).await?;
        self.publish_all(self.mirror.values()).await?;

        for filter in self.mirror.subscriptions()? {
            self.transport.listen(filter).await?;
        }

        self.publish_state(HomieDeviceStatus::Ready).await?;
        info!("device ready");
        Ok(())
    }

    /// Refreshes the snapshot and publishes whatever changed. A failed fetch
    /// leaves every published value, timestamp included, untouched.
    pub async fn update(&mut self) -> Result<(), BridgeError> {
        self.client.update().await?;
        let snapshot = self.client.snapshot().clone();
        let changes = self.mirror.apply_snapshot(snapshot, local_now());
        debug!("refresh produced {} publications", changes.len());
        self.publish_all(changes).await?;
        Ok(())
    }

    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) -> Result<(), BridgeError> {
        let payload = std::str::from_utf8(payload).map_err(|_| SetError::NotUtf8)?;
        let actions = self.mirror.handle_set(topic, payload)?;
        info!("command {topic} = {payload}");

        for action in actions {
            match action {
                MirrorAction::Appliance(command) => self.execute(command).await?,
                MirrorAction::Refresh => self.update().await?,
            }
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.publish_state(HomieDeviceStatus::Disconnected).await
    }

    async fn execute(&self, command: ApplianceCommand) -> Result<(), BridgeError> {
        debug!("appliance command: {command:?}");
        match command {
            ApplianceCommand::SetMode(mode) => self.client.set_mode(mode).await?,
            ApplianceCommand::SetFanSpeed(fan_speed) => {
                self.client.set_fan_speed(fan_speed).await?
            }
            ApplianceCommand::SetMyZone(zone) => self.client.set_my_zone(zone).await?,
            ApplianceCommand::SetZone {
                number,
                state,
                setpoint,
                damper,
            } => {
                self.client
                    .set_zone(number, state, setpoint, damper)
                    .await?
            }
        }
        Ok(())
    }

    async fn publish_state(&self, state: HomieDeviceStatus) -> Result<(), BridgeError> {
        self.transport
            .send(self.mirror.state_publication(state))
            .await?;
        Ok(())
    }

    async fn publish_all(&self, publications: Vec<Publication>) -> Result<(), BridgeError> {
        for publication in publications {
            self.transport.send(publication).await?;
        }
        Ok(())
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}
