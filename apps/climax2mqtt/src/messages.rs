//! Home Assistant discovery and state messages for panel devices.
//!
//! Generators only build messages; the caller publishes them.

use crate::device::{Device, DeviceId, DeviceInfo};
use crate::status::PowerReading;
use serde::Serialize;

const MANUFACTURER: &str = "Climax";
const STATE_ON: &str = "ON";
const STATE_OFF: &str = "OFF";

#[derive(Debug, Clone)]
pub struct Topics {
    pub discovery_prefix: String,
    pub base_prefix: String,
}

impl Topics {
    pub fn new(discovery_prefix: impl Into<String>, base_prefix: impl Into<String>) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
            base_prefix: base_prefix.into(),
        }
    }

    pub fn discovery(&self, component: &str, id: &DeviceId, measurement: &str) -> String {
        format!(
            "{}/{component}/{id}/{measurement}/config",
            self.discovery_prefix
        )
    }

    pub fn state(&self, id: &DeviceId) -> String {
        format!("{}/sensors/{id}/state", self.base_prefix)
    }

    pub fn command(&self, id: &DeviceId) -> String {
        format!("{}/switches/{id}/set", self.base_prefix)
    }

    pub fn command_filter(&self) -> String {
        format!("{}/switches/+/set", self.base_prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to serialize {kind} message for {device_id}")]
pub struct MessageError {
    pub device_id: DeviceId,
    pub kind: &'static str,
    #[source]
    pub source: serde_json::Error,
}

pub type MessageResult = Result<MqttMessage, MessageError>;

/// Outcome of asking the generator about a device.
#[derive(Debug)]
pub enum Generated {
    Messages(Vec<MessageResult>),
    Unsupported,
}

#[derive(Serialize)]
struct DeviceBlock<'a> {
    identifiers: [&'a str; 1],
    name: &'a str,
    manufacturer: &'static str,
    model: &'static str,
}

#[derive(Serialize)]
struct SensorConfig<'a> {
    unique_id: String,
    state_topic: String,
    name: String,
    device_class: &'static str,
    unit_of_measurement: &'static str,
    value_template: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'static str>,
    device: DeviceBlock<'a>,
}

#[derive(Serialize)]
struct SwitchConfig<'a> {
    unique_id: String,
    command_topic: String,
    state_topic: String,
    name: String,
    payload_on: &'static str,
    payload_off: &'static str,
    state_on: &'static str,
    state_off: &'static str,
    value_template: &'static str,
    device: DeviceBlock<'a>,
}

#[derive(Serialize)]
struct TemperatureState {
    temperature: f64,
}

#[derive(Serialize)]
struct PowerState {
    power_state: &'static str,
    power: f64,
    energy: f64,
}

struct SensorKind {
    measurement: &'static str,
    label: &'static str,
    device_class: &'static str,
    unit: &'static str,
    value_template: &'static str,
    icon: Option<&'static str>,
}

const TEMPERATURE: SensorKind = SensorKind {
    measurement: "temperature",
    label: "Temperature",
    device_class: "temperature",
    unit: "°C",
    value_template: "{{ value_json.temperature }}",
    icon: None,
};

const POWER: SensorKind = SensorKind {
    measurement: "power",
    label: "Power",
    device_class: "power",
    unit: "W",
    value_template: "{{ value_json.power }}",
    icon: None,
};

const ENERGY: SensorKind = SensorKind {
    measurement: "energy",
    label: "Energy Usage",
    device_class: "energy",
    unit: "kWh",
    value_template: "{{ value_json.energy }}",
    icon: Some("mdi:counter"),
};

pub fn discovery_messages(device: &Device, topics: &Topics) -> Generated {
    match device {
        Device::TemperatureSensor { info, .. } => {
            Generated::Messages(vec![sensor_discovery(info, topics, &TEMPERATURE)])
        }
        Device::PowerSwitchMeter { info, .. } => Generated::Messages(vec![
            sensor_discovery(info, topics, &POWER),
            sensor_discovery(info, topics, &ENERGY),
            switch_discovery(info, topics),
        ]),
        Device::Generic(_) => Generated::Unsupported,
    }
}

pub fn update_messages(device: &Device, topics: &Topics) -> Generated {
    match device {
        Device::TemperatureSensor { info, temperature } => {
            let state = TemperatureState {
                temperature: *temperature,
            };
            Generated::Messages(vec![state_message(info, topics, "temperature state", &state)])
        }
        Device::PowerSwitchMeter { info, reading } => {
            let state = power_state(reading);
            Generated::Messages(vec![state_message(info, topics, "power state", &state)])
        }
        Device::Generic(_) => Generated::Unsupported,
    }
}

fn power_state(reading: &PowerReading) -> PowerState {
    PowerState {
        power_state: if reading.on { STATE_ON } else { STATE_OFF },
        power: reading.power_w,
        energy: reading.energy_kwh,
    }
}

fn device_block(info: &DeviceInfo) -> DeviceBlock<'_> {
    DeviceBlock {
        identifiers: [info.id.as_str()],
        name: &info.name,
        manufacturer: MANUFACTURER,
        model: info.device_type.label(),
    }
}

fn sensor_discovery(info: &DeviceInfo, topics: &Topics, kind: &SensorKind) -> MessageResult {
    let config = SensorConfig {
        unique_id: format!("{}_{}", info.id, kind.measurement),
        state_topic: topics.state(&info.id),
        name: format!("{} {}", info.name, kind.label),
        device_class: kind.device_class,
        unit_of_measurement: kind.unit,
        value_template: kind.value_template,
        icon: kind.icon,
        device: device_block(info),
    };
    let topic = topics.discovery("sensor", &info.id, kind.measurement);
    encode(info, topic, "discovery", &config, true)
}

fn switch_discovery(info: &DeviceInfo, topics: &Topics) -> MessageResult {
    let config = SwitchConfig {
        unique_id: format!("{}_power_switch", info.id),
        command_topic: topics.command(&info.id),
        state_topic: topics.state(&info.id),
        name: format!("{} Power Switch", info.name),
        payload_on: STATE_ON,
        payload_off: STATE_OFF,
        state_on: STATE_ON,
        state_off: STATE_OFF,
        value_template: "{{ value_json.power_state }}",
        device: device_block(info),
    };
    let topic = topics.discovery("switch", &info.id, "power_switch");
    encode(info, topic, "switch discovery", &config, true)
}

fn state_message<T: Serialize>(
    info: &DeviceInfo,
    topics: &Topics,
    kind: &'static str,
    state: &T,
) -> MessageResult {
    encode(info, topics.state(&info.id), kind, state, false)
}

fn encode<T: Serialize>(
    info: &DeviceInfo,
    topic: String,
    kind: &'static str,
    payload: &T,
    retain: bool,
) -> MessageResult {
    let payload = serde_json::to_vec(payload).map_err(|source| MessageError {
        device_id: info.id.clone(),
        kind,
        source,
    })?;
    Ok(MqttMessage {
        topic,
        payload,
        retain,
    })
}
