use chrono::NaiveDateTime;
use homie5::{HomieDeviceStatus, HomieID, HomieValue};
use thiserror::Error;

use crate::{
    homie::{
        button_property, enum_property, float_property, format_float, integer_property,
        string_property, Device, DeviceInfo, HomieError, Node, Property, Publication, SetError,
    },
    topics::{
        NODE_CONTROLS, NODE_STATUS, PROP_FAN_SPEED, PROP_LAST_UPDATE, PROP_MODE, PROP_MY_ZONE,
        PROP_REQUEST_REFRESH, PROP_SYSTEM_STATUS, PROP_TEMP_MEASURED, PROP_TEMP_SETPOINT,
        PROP_ZONE_MODE, PROP_ZONE_STATE,
    },
    types::{ApplianceSnapshot, FanSpeed, OperationMode, ZoneDetail, ZoneState},
};

/// Damper percentage sent with every zone open/close request. The appliance
/// requires the field; its meaning is undocumented.
pub const DAMPER_VALUE: u8 = 100;
pub const TEMPERATURE_UNIT: &str = "°C";
pub const LAST_UPDATE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

const SYSTEM_STATUSES: &[&str] = &["on", "off"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MirrorError {
    #[error("max_zones must be at least 1")]
    MissingMaxZones,
    #[error("zone id '{0}' cannot be used as a node id")]
    InvalidZoneId(String),
    #[error(transparent)]
    Homie(#[from] HomieError),
}

/// What a settable property does when an external actor sets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandHandler {
    Mode,
    FanSpeed,
    MyZone,
    RequestRefresh,
    ZoneSetpoint(String),
    ZoneState(String),
    ZoneMode(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplianceCommand {
    SetMode(OperationMode),
    SetFanSpeed(FanSpeed),
    SetMyZone(u8),
    SetZone {
        number: u8,
        state: Option<ZoneState>,
        setpoint: f32,
        damper: Option<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MirrorAction {
    Appliance(ApplianceCommand),
    Refresh,
}

#[derive(Debug)]
pub struct DeviceMirror {
    device: Device<CommandHandler>,
    snapshot: ApplianceSnapshot,
    max_zones: u8,
}

impl DeviceMirror {
    pub fn new(
        info: DeviceInfo,
        max_zones: u8,
        snapshot: ApplianceSnapshot,
        now: NaiveDateTime,
    ) -> Result<Self, MirrorError> {
        if max_zones == 0 {
            return Err(MirrorError::MissingMaxZones);
        }

        let mut fan_speed = Property::new(
            HomieID::new_const(PROP_FAN_SPEED),
            enum_property("Fan Speed", FanSpeed::ALL),
        )
        .settable(CommandHandler::FanSpeed);
        if let Some(speed) = snapshot.fan_speed {
            fan_speed = fan_speed.with_value(speed.as_str());
        }
        let mut my_zone = Property::new(
            HomieID::new_const(PROP_MY_ZONE),
            integer_property("MyZone", 1, i64::from(max_zones)),
        )
        .settable(CommandHandler::MyZone);
        if let Some(zone) = my_zone_value(snapshot.my_zone, max_zones) {
            my_zone = my_zone.with_value(zone);
        }

        let mut nodes = vec![Node::new(HomieID::new_const(NODE_CONTROLS), "Controls", "controls")
            .with_property(
                Property::new(
                    HomieID::new_const(PROP_MODE),
                    enum_property("Mode", OperationMode::ALL),
                )
                .settable(CommandHandler::Mode)
                .with_value(snapshot.mode.as_str()),
            )
            .with_property(fan_speed)
            .with_property(my_zone)
            .with_property(
                Property::new(
                    HomieID::new_const(PROP_REQUEST_REFRESH),
                    button_property("Request Refresh"),
                )
                .settable(CommandHandler::RequestRefresh),
            )];

        for (zone_id, zone) in &snapshot.zones {
            nodes.push(zone_node(zone_id, zone, snapshot.mode)?);
        }

        nodes.push(
            Node::new(HomieID::new_const(NODE_STATUS), "Status", "status")
                .with_property(
                    Property::new(
                        HomieID::new_const(PROP_SYSTEM_STATUS),
                        enum_property("System Status", SYSTEM_STATUSES),
                    )
                    .with_value(snapshot.system_status().as_str()),
                )
                .with_property(
                    Property::new(
                        HomieID::new_const(PROP_LAST_UPDATE),
                        string_property("Last Update"),
                    )
                    .with_value(now.format(LAST_UPDATE_FORMAT).to_string()),
                ),
        );

        let device = Device::new(&info, nodes)?;
        Ok(Self {
            device,
            snapshot,
            max_zones,
        })
    }

    pub fn snapshot(&self) -> &ApplianceSnapshot {
        &self.snapshot
    }

    pub fn value(&self, node_id: &str, property_id: &str) -> Option<&str> {
        self.device.value(node_id, property_id)
    }

    pub fn describe(&self) -> Result<Publication, MirrorError> {
        Ok(self.device.describe()?)
    }

    pub fn subscriptions(&self) -> Result<Vec<String>, MirrorError> {
        Ok(self.device.subscriptions()?)
    }

    pub fn values(&self) -> Vec<Publication> {
        self.device.values()
    }

    pub fn state_publication(&self, state: HomieDeviceStatus) -> Publication {
        self.device.state_publication(state)
    }

    /// Swaps in a freshly fetched snapshot and returns the publications for
    /// every value that changed. The last-update timestamp is always included.
    /// A fan speed or MyZone the appliance did not report keeps its last value.
    pub fn apply_snapshot(
        &mut self,
        snapshot: ApplianceSnapshot,
        now: NaiveDateTime,
    ) -> Vec<Publication> {
        self.snapshot = snapshot;
        let snapshot = &self.snapshot;
        let device = &mut self.device;
        let mut out = Vec::new();

        out.extend(device.set_value(NODE_CONTROLS, PROP_MODE, snapshot.mode.as_str()));
        if let Some(speed) = snapshot.fan_speed {
            out.extend(device.set_value(NODE_CONTROLS, PROP_FAN_SPEED, speed.as_str()));
        }
        if let Some(zone) = my_zone_value(snapshot.my_zone, self.max_zones) {
            out.extend(device.set_value(NODE_CONTROLS, PROP_MY_ZONE, zone));
        }

        // Zones that appeared after startup have no node and are not mirrored.
        for (zone_id, zone) in &snapshot.zones {
            out.extend(device.set_value(zone_id, PROP_TEMP_SETPOINT, format_float(zone.set_temp)));
            out.extend(device.set_value(
                zone_id,
                PROP_TEMP_MEASURED,
                format_float(zone.measured_temp),
            ));
            out.extend(device.set_value(zone_id, PROP_ZONE_STATE, zone.state.as_str()));
            out.extend(device.set_value(
                zone_id,
                PROP_ZONE_MODE,
                zone.zone_mode(snapshot.mode).as_str(),
            ));
        }

        out.extend(device.set_value(
            NODE_STATUS,
            PROP_SYSTEM_STATUS,
            snapshot.system_status().as_str(),
        ));
        out.extend(device.force_value(
            NODE_STATUS,
            PROP_LAST_UPDATE,
            now.format(LAST_UPDATE_FORMAT).to_string(),
        ));

        out
    }

    /// Validates an inbound `/set` message and routes it to its handler.
    pub fn handle_set(&self, topic: &str, payload: &str) -> Result<Vec<MirrorAction>, SetError> {
        let (handler, value) = self.device.parse_set(topic, payload)?;
        self.dispatch(handler, &value)
    }

    fn dispatch(
        &self,
        handler: &CommandHandler,
        value: &HomieValue,
    ) -> Result<Vec<MirrorAction>, SetError> {
        match handler {
            CommandHandler::Mode => Ok(vec![route_mode(enum_value(PROP_MODE, value)?)]),
            CommandHandler::FanSpeed => Ok(vec![MirrorAction::Appliance(
                ApplianceCommand::SetFanSpeed(enum_value(PROP_FAN_SPEED, value)?),
            )]),
            CommandHandler::MyZone => {
                let zone = match value {
                    HomieValue::Integer(zone) => *zone,
                    other => return Err(SetError::invalid(PROP_MY_ZONE, format!("{other:?}"))),
                };
                let zone = u8::try_from(zone)
                    .ok()
                    .filter(|zone| (1..=self.max_zones).contains(zone))
                    .ok_or_else(|| {
                        SetError::invalid(
                            PROP_MY_ZONE,
                            format!("{zone} is outside 1..={}", self.max_zones),
                        )
                    })?;
                Ok(vec![MirrorAction::Appliance(ApplianceCommand::SetMyZone(
                    zone,
                ))])
            }
            CommandHandler::RequestRefresh => Ok(vec![MirrorAction::Refresh]),
            CommandHandler::ZoneSetpoint(zone_id) => {
                let zone = self.cached_zone(zone_id)?;
                let setpoint = match value {
                    HomieValue::Float(setpoint) if setpoint.is_finite() => *setpoint as f32,
                    HomieValue::Integer(setpoint) => *setpoint as f32,
                    other => {
                        return Err(SetError::invalid(PROP_TEMP_SETPOINT, format!("{other:?}")))
                    }
                };
                Ok(vec![MirrorAction::Appliance(ApplianceCommand::SetZone {
                    number: zone.number,
                    state: None,
                    setpoint,
                    damper: None,
                })])
            }
            CommandHandler::ZoneState(zone_id) => {
                let zone = self.cached_zone(zone_id)?;
                Ok(vec![zone_state_command(
                    zone,
                    enum_value(PROP_ZONE_STATE, value)?,
                )])
            }
            CommandHandler::ZoneMode(zone_id) => {
                let zone = self.cached_zone(zone_id)?;
                let mode: OperationMode = enum_value(PROP_ZONE_MODE, value)?;
                let mut actions = vec![zone_state_command(zone, ZoneState::for_mode(mode))];
                // Selecting an active mode on one zone switches the whole system.
                if !mode.is_off() {
                    actions.push(route_mode(mode));
                }
                Ok(actions)
            }
        }
    }

    fn cached_zone(&self, zone_id: &str) -> Result<&ZoneDetail, SetError> {
        self.snapshot
            .zone(zone_id)
            .ok_or_else(|| SetError::UnknownZone(zone_id.to_string()))
    }
}

/// MyZone as published. The appliance reports 0 when MyZone is disabled.
fn my_zone_value(my_zone: Option<u8>, max_zones: u8) -> Option<String> {
    my_zone
        .filter(|zone| (1..=max_zones).contains(zone))
        .map(|zone| zone.to_string())
}

fn enum_value<T: std::str::FromStr>(property: &str, value: &HomieValue) -> Result<T, SetError> {
    match value {
        HomieValue::Enum(raw) => raw
            .parse()
            .map_err(|_| SetError::invalid(property, format!("'{raw}' is not allowed"))),
        other => Err(SetError::invalid(property, format!("{other:?}"))),
    }
}

fn zone_node(
    zone_id: &str,
    zone: &ZoneDetail,
    system_mode: OperationMode,
) -> Result<Node<CommandHandler>, MirrorError> {
    let id = HomieID::try_from(zone_id.to_string()).map_err(|_| MirrorError::InvalidZoneId(zone_id.to_string()))?;
    Ok(Node::new(id, zone.name.clone(), "zone")
        .with_property(
            Property::new(
                HomieID::new_const(PROP_TEMP_SETPOINT),
                float_property("Temperature Setpoint", TEMPERATURE_UNIT),
            )
            .settable(CommandHandler::ZoneSetpoint(zone_id.to_string()))
            .with_value(format_float(zone.set_temp)),
        )
        .with_property(
            Property::new(
                HomieID::new_const(PROP_TEMP_MEASURED),
                float_property("Temperature Measured", TEMPERATURE_UNIT),
            )
            .with_value(format_float(zone.measured_temp)),
        )
        .with_property(
            Property::new(
                HomieID::new_const(PROP_ZONE_STATE),
                enum_property("Zone State", ZoneState::ALL),
            )
            .settable(CommandHandler::ZoneState(zone_id.to_string()))
            .with_value(zone.state.as_str()),
        )
        .with_property(
            Property::new(
                HomieID::new_const(PROP_ZONE_MODE),
                enum_property("Zone Mode", OperationMode::ALL),
            )
            .settable(CommandHandler::ZoneMode(zone_id.to_string()))
            .with_value(zone.zone_mode(system_mode).as_str()),
        ))
}

fn route_mode(mode: OperationMode) -> MirrorAction {
    MirrorAction::Appliance(ApplianceCommand::SetMode(mode))
}

fn zone_state_command(zone: &ZoneDetail, state: ZoneState) -> MirrorAction {
    MirrorAction::Appliance(ApplianceCommand::SetZone {
        number: zone.number,
        state: Some(state),
        setpoint: zone.set_temp,
        damper: Some(DAMPER_VALUE),
    })
}
