//! Homie 5 device wiring on top of the `homie5` crate.
//!
//! `homie5` owns ids, the `$description` document, topic layout and payload
//! parsing. This module adds the two things it leaves to the caller: the
//! last published value of every property and a handler per settable
//! property. Nothing here talks to a broker; operations return
//! [`Publication`]s that the transport layer sends as-is.

use std::collections::BTreeMap;

use homie5::{
    client::Publish,
    device_description::{
        DeviceDescriptionBuilder, HomieDeviceDescription, HomieNodeDescription,
        HomiePropertyDescription, HomiePropertyFormat, IntegerRange, PropertyDescriptionBuilder,
    },
    parse_mqtt_message, Homie5DeviceProtocol, Homie5Message, HomieDataType, HomieDeviceStatus,
    HomieDomain, HomieID, HomieValue,
};
use thiserror::Error;

pub const BUTTON_PAYLOAD: &str = "PUSH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl From<Publish> for Publication {
    fn from(publish: Publish) -> Self {
        Self {
            topic: publish.topic,
            payload: String::from_utf8_lossy(publish.payload.as_ref()).into_owned(),
            retain: publish.retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HomieError {
    #[error("'{0}' is not a valid homie id")]
    InvalidId(String),
    #[error("homie protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SetError {
    #[error("no property behind command topic {0}")]
    UnknownProperty(String),
    #[error("property {0} is not settable")]
    NotSettable(String),
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("invalid value for {property}: {reason}")]
    InvalidValue { property: String, reason: String },
    #[error("zone {0} is not in the current appliance snapshot")]
    UnknownZone(String),
}

impl SetError {
    pub fn invalid(property: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidValue {
            property: property.into(),
            reason: reason.to_string(),
        }
    }
}

pub fn enum_property(name: &str, values: &[&str]) -> HomiePropertyDescription {
    PropertyDescriptionBuilder::new(HomieDataType::Enum)
        .name(name)
        .format(HomiePropertyFormat::Enum(
            values.iter().map(|value| value.to_string()).collect(),
        ))
        .build()
}

pub fn float_property(name: &str, unit: &str) -> HomiePropertyDescription {
    PropertyDescriptionBuilder::new(HomieDataType::Float)
        .name(name)
        .unit(unit)
        .build()
}

pub fn integer_property(name: &str, min: i64, max: i64) -> HomiePropertyDescription {
    PropertyDescriptionBuilder::new(HomieDataType::Integer)
        .name(name)
        .format(HomiePropertyFormat::IntegerRange(IntegerRange {
            min: Some(min),
            max: Some(max),
            step: None,
        }))
        .build()
}

pub fn string_property(name: &str) -> HomiePropertyDescription {
    PropertyDescriptionBuilder::new(HomieDataType::String)
        .name(name)
        .build()
}

/// A write-only trigger: an enum with the single value `PUSH`, never retained.
pub fn button_property(name: &str) -> HomiePropertyDescription {
    let mut description = enum_property(name, &[BUTTON_PAYLOAD]);
    description.retained = false;
    description
}

/// Renders a float the way it is published: `22` rather than `22.0`.
pub fn format_float(value: f32) -> String {
    format!("{value}")
}

pub struct Property<H> {
    id: HomieID,
    description: HomiePropertyDescription,
    handler: Option<H>,
    value: Option<String>,
}

impl<H> Property<H> {
    pub fn new(id: HomieID, description: HomiePropertyDescription) -> Self {
        Self {
            id,
            description,
            handler: None,
            value: None,
        }
    }

    pub fn settable(mut self, handler: H) -> Self {
        self.description.settable = true;
        self.handler = Some(handler);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

pub struct Node<H> {
    id: HomieID,
    name: String,
    node_type: String,
    properties: Vec<Property<H>>,
}

impl<H> Node<H> {
    pub fn new(id: HomieID, name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            node_type: node_type.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: Property<H>) -> Self {
        self.properties.push(property);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn homie_id(&self) -> Result<HomieID, HomieError> {
        HomieID::try_from(self.id.clone()).map_err(|_| HomieError::InvalidId(self.id.clone()))
    }

    /// The retained `$state = lost` message the broker publishes for us when
    /// the connection drops uncleanly.
    pub fn last_will(&self) -> Result<Publication, HomieError> {
        let (protocol, _) = Homie5DeviceProtocol::new(self.homie_id()?, HomieDomain::Default);
        Ok(protocol.publish_state(HomieDeviceStatus::Lost).into())
    }
}

#[derive(Debug)]
struct Slot<H> {
    node: HomieID,
    property: HomieID,
    retained: bool,
    handler: Option<H>,
    value: Option<String>,
}

#[derive(Debug)]
pub struct Device<H> {
    id: HomieID,
    protocol: Homie5DeviceProtocol,
    description: HomieDeviceDescription,
    slots: BTreeMap<(String, String), Slot<H>>,
}

impl<H> Device<H> {
    pub fn new(info: &DeviceInfo, nodes: Vec<Node<H>>) -> Result<Self, HomieError> {
        let id = info.homie_id()?;
        let (protocol, _) = Homie5DeviceProtocol::new(id.clone(), HomieDomain::Default);

        let mut builder = DeviceDescriptionBuilder::new().name(info.name.clone());
        let mut slots = BTreeMap::new();
        for node in nodes {
            let mut properties = BTreeMap::new();
            for property in node.properties {
                slots.insert(
                    (node.id.to_string(), property.id.to_string()),
                    Slot {
                        node: node.id.clone(),
                        property: property.id.clone(),
                        retained: property.description.retained,
                        handler: property.handler,
                        value: property.value,
                    },
                );
                properties.insert(property.id, property.description);
            }
            builder = builder.add_node(
                node.id,
                HomieNodeDescription {
                    name: Some(node.name),
                    r#type: Some(node.node_type),
                    properties,
                },
            );
        }

        Ok(Self {
            id,
            protocol,
            description: builder.build(),
            slots,
        })
    }

    pub fn value(&self, node_id: &str, property_id: &str) -> Option<&str> {
        self.slot(node_id, property_id)?.value.as_deref()
    }

    pub fn state_publication(&self, state: HomieDeviceStatus) -> Publication {
        self.protocol.publish_state(state).into()
    }

    /// The retained `$description` document. `$state` is published separately.
    pub fn describe(&self) -> Result<Publication, HomieError> {
        self.protocol
            .publish_description(&self.description)
            .map(Publication::from)
            .map_err(|err| HomieError::Protocol(err.to_string()))
    }

    /// Topic filters for the `/set` topic of every settable property.
    pub fn subscriptions(&self) -> Result<Vec<String>, HomieError> {
        let subscriptions = self
            .protocol
            .subscribe_props(&self.description)
            .map_err(|err| HomieError::Protocol(err.to_string()))?;
        Ok(subscriptions
            .into_iter()
            .map(|subscription| subscription.topic)
            .collect())
    }

    /// Current value of every property that has one.
    pub fn values(&self) -> Vec<Publication> {
        self.slots
            .values()
            .filter_map(|slot| {
                let value = slot.value.clone()?;
                Some(self.value_publication(slot, value))
            })
            .collect()
    }

    /// Stores a new value and returns the publication for it, or `None` when
    /// the value is unchanged or the property does not exist.
    pub fn set_value(
        &mut self,
        node_id: &str,
        property_id: &str,
        value: impl Into<String>,
    ) -> Option<Publication> {
        self.store_value(node_id, property_id, value.into(), false)
    }

    /// Like [`Device::set_value`] but always publishes.
    pub fn force_value(
        &mut self,
        node_id: &str,
        property_id: &str,
        value: impl Into<String>,
    ) -> Option<Publication> {
        self.store_value(node_id, property_id, value.into(), true)
    }

    /// Resolves a `/set` message to its settable property and parses the
    /// payload against the property description.
    pub fn parse_set(&self, topic: &str, payload: &str) -> Result<(&H, HomieValue), SetError> {
        let unknown = || SetError::UnknownProperty(topic.to_string());

        let Ok(Homie5Message::PropertySet {
            property,
            set_value,
        }) = parse_mqtt_message(topic, payload.as_bytes())
        else {
            return Err(unknown());
        };
        if property.device_id().to_string() != self.id.to_string() {
            return Err(unknown());
        }

        let node_id = property.node_id().to_string();
        let property_id = property.prop_id().to_string();
        let slot = self.slot(&node_id, &property_id).ok_or_else(unknown)?;
        let handler = slot
            .handler
            .as_ref()
            .ok_or_else(|| SetError::NotSettable(format!("{node_id}/{property_id}")))?;
        let description = self
            .description
            .nodes
            .get(&slot.node)
            .and_then(|node| node.properties.get(&slot.property))
            .ok_or_else(unknown)?;

        let value = HomieValue::parse(&set_value, description)
            .map_err(|err| SetError::invalid(format!("{node_id}/{property_id}"), err))?;
        Ok((handler, value))
    }

    fn slot(&self, node_id: &str, property_id: &str) -> Option<&Slot<H>> {
        self.slots
            .get(&(node_id.to_string(), property_id.to_string()))
    }

    fn store_value(
        &mut self,
        node_id: &str,
        property_id: &str,
        value: String,
        force: bool,
    ) -> Option<Publication> {
        let slot = self
            .slots
            .get_mut(&(node_id.to_string(), property_id.to_string()))?;
        if !force && slot.value.as_deref() == Some(value.as_str()) {
            return None;
        }
        slot.value = Some(value.clone());

        let slot = self.slot(node_id, property_id)?;
        Some(self.value_publication(slot, value))
    }

    fn value_publication(&self, slot: &Slot<H>, value: String) -> Publication {
        self.protocol
            .publish_value(&slot.node, &slot.property, value, slot.retained)
            .into()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const COLOURS: &[&str] = &["red", "green"];

    fn device() -> Device<u8> {
        let info = DeviceInfo {
            id: "lamp".to_string(),
            name: "Lamp".to_string(),
        };
        let light = Node::new(HomieID::new_const("light"), "Light", "light")
            .with_property(
                Property::new(HomieID::new_const("colour"), enum_property("Colour", COLOURS))
                    .settable(1)
                    .with_value("red"),
            )
            .with_property(Property::new(
                HomieID::new_const("temp"),
                float_property("Temperature", "°C"),
            ))
            .with_property(
                Property::new(HomieID::new_const("level"), integer_property("Level", 1, 4))
                    .settable(2),
            )
            .with_property(
                Property::new(HomieID::new_const("poke"), button_property("Poke")).settable(3),
            );
        Device::new(&info, vec![light]).unwrap()
    }

    #[test]
    fn describes_device_as_homie_5_document() {
        let device = device();
        let described = device.describe().unwrap();
        assert_eq!(described.topic, "homie/5/lamp/$description");
        assert!(described.retain);
        assert!(described.payload.contains("\"colour\""));
        assert!(described.payload.contains("green"));

        let light = &device.description.nodes[&HomieID::new_const("light")];
        let colour = &light.properties[&HomieID::new_const("colour")];
        assert!(colour.settable);
        let temp = &light.properties[&HomieID::new_const("temp")];
        assert!(!temp.settable);
        assert_eq!(temp.unit.as_deref(), Some("°C"));
        let poke = &light.properties[&HomieID::new_const("poke")];
        assert!(!poke.retained);
    }

    #[test]
    fn publishes_device_state() {
        assert_eq!(
            device().state_publication(HomieDeviceStatus::Ready),
            Publication {
                topic: "homie/5/lamp/$state".to_string(),
                payload: "ready".to_string(),
                retain: true,
            }
        );
        let info = DeviceInfo {
            id: "lamp".to_string(),
            name: "Lamp".to_string(),
        };
        assert_eq!(info.last_will().unwrap().payload, "lost");
    }

    #[test]
    fn subscribes_to_settable_properties() {
        let topics = device().subscriptions().unwrap();
        assert!(topics.iter().all(|topic| topic.ends_with("/set")));
        assert!(topics.iter().any(|topic| topic.contains("colour")));
        assert!(topics.iter().all(|topic| !topic.contains("temp")));
    }

    #[test]
    fn publishes_only_changed_values() {
        let mut device = device();
        assert_eq!(device.set_value("light", "colour", "red"), None);
        assert_eq!(
            device.set_value("light", "colour", "green"),
            Some(Publication {
                topic: "homie/5/lamp/light/colour".to_string(),
                payload: "green".to_string(),
                retain: true,
            })
        );
        assert_eq!(device.value("light", "colour"), Some("green"));
        assert!(device.force_value("light", "colour", "green").is_some());
        assert_eq!(device.set_value("light", "missing", "x"), None);
    }

    #[test]
    fn values_skip_properties_without_a_value() {
        let values = device().values();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].topic, "homie/5/lamp/light/colour");
        assert_eq!(values[0].payload, "red");
    }

    #[test]
    fn parses_set_messages_into_handler_and_value() {
        let device = device();
        let (handler, value) = device
            .parse_set("homie/5/lamp/light/colour/set", "green")
            .unwrap();
        assert_eq!(*handler, 1);
        assert_eq!(value, HomieValue::Enum("green".to_string()));

        let (handler, value) = device.parse_set("homie/5/lamp/light/level/set", "3").unwrap();
        assert_eq!(*handler, 2);
        assert_eq!(value, HomieValue::Integer(3));

        let (handler, _) = device
            .parse_set("homie/5/lamp/light/poke/set", BUTTON_PAYLOAD)
            .unwrap();
        assert_eq!(*handler, 3);
    }

    #[test]
    fn rejects_invalid_set_requests() {
        let device = device();
        assert!(matches!(
            device.parse_set("homie/5/lamp/light/level/set", "four"),
            Err(SetError::InvalidValue { .. })
        ));
        assert!(matches!(
            device.parse_set("homie/5/lamp/light/temp/set", "20"),
            Err(SetError::NotSettable(_))
        ));
        assert!(matches!(
            device.parse_set("homie/5/other/light/colour/set", "red"),
            Err(SetError::UnknownProperty(_))
        ));
        assert!(matches!(
            device.parse_set("homie/5/lamp/light/colour", "red"),
            Err(SetError::UnknownProperty(_))
        ));
    }

    #[test]
    fn rejects_invalid_device_ids() {
        let info = DeviceInfo {
            id: "Lamp 1".to_string(),
            name: "Lamp".to_string(),
        };
        assert_eq!(
            Device::<u8>::new(&info, Vec::new()).err(),
            Some(HomieError::InvalidId("Lamp 1".to_string()))
        );
    }

    #[test]
    fn formats_floats_without_trailing_zero() {
        assert_eq!(format_float(22.0), "22");
        assert_eq!(format_float(23.5), "23.5");
    }
}
