//! Client for the MyAir tablet's local HTTP API.
//!
//! State is read from `/getSystemData`; every change goes through
//! `/setAircon?json=...` with a partial aircon document.

use std::collections::{BTreeMap, HashMap};

use myair_common::{
    types::UnknownVariant, ApplianceSnapshot, FanSpeed, MyAirSettings, OperationMode, ZoneDetail,
    ZoneState,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::appliance::{ApplianceClient, ApplianceError};

const SYSTEM_DATA_PATH: &str = "getSystemData";
const SET_AIRCON_PATH: &str = "setAircon";

#[derive(Debug, Deserialize)]
struct SystemData {
    aircons: HashMap<String, Aircon>,
}

#[derive(Debug, Deserialize)]
struct Aircon {
    info: AirconInfo,
    #[serde(default)]
    zones: BTreeMap<String, RawZone>,
}

#[derive(Debug, Deserialize)]
struct AirconInfo {
    state: String,
    mode: String,
    fan: String,
    #[serde(rename = "myZone", default)]
    my_zone: u8,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    name: String,
    number: u8,
    #[serde(rename = "setTemp")]
    set_temp: f32,
    #[serde(rename = "measuredTemp", default)]
    measured_temp: f32,
    state: String,
}

#[derive(Debug, Deserialize)]
struct Ack {
    ack: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MyAirClient {
    http: Client,
    base_url: String,
    aircon: String,
    max_zones: u8,
    snapshot: ApplianceSnapshot,
}

impl MyAirClient {
    pub fn new(settings: &MyAirSettings) -> Result<Self, ApplianceError> {
        let http = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            http,
            base_url: settings.base_url(),
            aircon: settings.aircon.clone(),
            max_zones: settings.max_zones,
            snapshot: ApplianceSnapshot::default(),
        })
    }

    async fn get(&self, url: &str) -> Result<String, ApplianceError> {
        debug!(url = %url, "myair request");
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ApplianceError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn set_aircon(&self, change: Value) -> Result<(), ApplianceError> {
        let mut document = Map::new();
        document.insert(self.aircon.clone(), change);
        let encoded = Value::Object(document).to_string();

        let url = format!(
            "{}/{SET_AIRCON_PATH}?json={}",
            self.base_url,
            urlencoding::encode(&encoded)
        );
        let body = self.get(&url).await?;
        let ack: Ack = serde_json::from_str(&body)?;
        if ack.ack {
            Ok(())
        } else {
            Err(ApplianceError::Rejected(ack.reason.unwrap_or(encoded)))
        }
    }
}

impl ApplianceClient for MyAirClient {
    async fn update(&mut self) -> Result<(), ApplianceError> {
        let url = format!("{}/{SYSTEM_DATA_PATH}", self.base_url);
        let body = self.get(&url).await?;
        let data: SystemData = serde_json::from_str(&body)?;
        self.snapshot = parse_snapshot(data, &self.aircon, self.max_zones)?;
        Ok(())
    }

    fn snapshot(&self) -> &ApplianceSnapshot {
        &self.snapshot
    }

    async fn set_mode(&self, mode: OperationMode) -> Result<(), ApplianceError> {
        let info = match mode {
            OperationMode::Off => json!({ "state": "off" }),
            OperationMode::On => json!({ "state": "on" }),
            active => json!({ "state": "on", "mode": active.as_str() }),
        };
        self.set_aircon(json!({ "info": info })).await
    }

    async fn set_fan_speed(&self, fan_speed: FanSpeed) -> Result<(), ApplianceError> {
        self.set_aircon(json!({ "info": { "fan": fan_speed.as_str() } }))
            .await
    }

    async fn set_my_zone(&self, zone: u8) -> Result<(), ApplianceError> {
        self.set_aircon(json!({ "info": { "myZone": zone } })).await
    }

    async fn set_zone(
        &self,
        number: u8,
        state: Option<ZoneState>,
        setpoint: f32,
        damper: Option<u8>,
    ) -> Result<(), ApplianceError> {
        let mut zone = Map::new();
        zone.insert("setTemp".to_string(), json!(setpoint));
        if let Some(state) = state {
            zone.insert("state".to_string(), json!(state.as_str()));
        }
        if let Some(damper) = damper {
            zone.insert("value".to_string(), json!(damper));
        }

        let mut zones = Map::new();
        zones.insert(zone_key(number), Value::Object(zone));
        self.set_aircon(json!({ "zones": zones })).await
    }
}

fn zone_key(number: u8) -> String {
    format!("z{number:02}")
}

fn malformed(err: UnknownVariant) -> ApplianceError {
    ApplianceError::Malformed(err.to_string())
}

fn parse_snapshot(
    mut data: SystemData,
    aircon: &str,
    max_zones: u8,
) -> Result<ApplianceSnapshot, ApplianceError> {
    let Aircon { info, zones } = data
        .aircons
        .remove(aircon)
        .ok_or_else(|| ApplianceError::Malformed(format!("aircon '{aircon}' not reported")))?;

    // Modes the bridge does not model (e.g. `myauto`) still mean the system is running.
    let mode = if info.state == "off" {
        OperationMode::Off
    } else {
        info.mode.parse().unwrap_or(OperationMode::On)
    };

    let mut parsed = BTreeMap::new();
    for (zone_id, zone) in zones {
        if zone.number == 0 || zone.number > max_zones {
            continue;
        }
        parsed.insert(
            zone_id,
            ZoneDetail {
                number: zone.number,
                name: zone.name,
                set_temp: zone.set_temp,
                measured_temp: zone.measured_temp,
                state: zone.state.parse().map_err(malformed)?,
            },
        );
    }

    let fan_speed = match info.fan.parse::<FanSpeed>() {
        Ok(speed) => Some(speed),
        Err(err) => {
            warn!("{err}; fan speed left unchanged");
            None
        }
    };

    Ok(ApplianceSnapshot {
        mode,
        fan_speed,
        my_zone: Some(info.my_zone).filter(|zone| (1..=max_zones).contains(zone)),
        zones: parsed,
    })
}
