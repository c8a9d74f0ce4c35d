use crate::status::{parse_power_switch_meter_status, parse_temperature, PowerReading};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;

const ID_SEPARATOR: char = ':';
const ZIGBEE_PREFIX: &str = "ZB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Undefined,
    SmokeDetector,
    TemperatureSensor,
    PowerSwitch,
    PowerSwitchMeter,
    RoomSensor,
    HueSensor,
    Unsupported(u64),
}

impl DeviceType {
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => Self::Undefined,
            11 => Self::SmokeDetector,
            20 => Self::TemperatureSensor,
            24 => Self::PowerSwitch,
            48 => Self::PowerSwitchMeter,
            54 => Self::RoomSensor,
            74 => Self::HueSensor,
            other => Self::Unsupported(other),
        }
    }

    pub fn code(self) -> u64 {
        match self {
            Self::Undefined => 0,
            Self::SmokeDetector => 11,
            Self::TemperatureSensor => 20,
            Self::PowerSwitch => 24,
            Self::PowerSwitchMeter => 48,
            Self::RoomSensor => 54,
            Self::HueSensor => 74,
            Self::Unsupported(code) => code,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::SmokeDetector => "Smoke Detector",
            Self::TemperatureSensor => "Temperature Sensor",
            Self::PowerSwitch => "Power Switch",
            Self::PowerSwitchMeter => "Power Switch Meter",
            Self::RoomSensor => "Room Sensor",
            Self::HueSensor => "Hue Sensor",
            Self::Unsupported(_) => "Unsupported",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(code) => write!(f, "unsupported({code})"),
            other => write!(f, "{} ({})", other.label(), other.code()),
        }
    }
}

impl Serialize for DeviceType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.code())
    }
}

/// Topic-safe device key: the panel id with separators removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn normalize(raw: &str) -> Self {
        Self(
            raw.trim()
                .chars()
                .filter(|c| *c != ID_SEPARATOR)
                .collect(),
        )
    }

    /// Rebuilds the id format the panel expects on its command endpoint.
    pub fn to_panel_id(&self) -> String {
        match self.0.strip_prefix(ZIGBEE_PREFIX) {
            Some(rest) if !rest.is_empty() => format!("{ZIGBEE_PREFIX}{ID_SEPARATOR}{rest}"),
            _ => self.0.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields every panel device carries, whatever its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub raw_id: String,
    pub zone: u8,
    pub area: u8,
    pub device_type: DeviceType,
    pub name: String,
    pub status: String,
    pub condition_ok: bool,
    pub battery_ok: bool,
    pub rssi: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Device {
    Generic(DeviceInfo),
    TemperatureSensor {
        #[serde(flatten)]
        info: DeviceInfo,
        temperature: f64,
    },
    PowerSwitchMeter {
        #[serde(flatten)]
        info: DeviceInfo,
        #[serde(flatten)]
        reading: PowerReading,
    },
}

/// The part of a device that decides whether a poll carries a real change.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparableState<'a> {
    Status(&'a str),
    Temperature(f64),
    Power(PowerReading),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("device record is not a JSON object")]
    NotAnObject,
    #[error("device record has no numeric type")]
    MissingType,
    #[error("device record has no id")]
    MissingId,
}

impl Device {
    pub fn from_info(info: DeviceInfo) -> Self {
        match info.device_type {
            DeviceType::TemperatureSensor => {
                let temperature = parse_temperature(&info.status);
                Self::TemperatureSensor { info, temperature }
            }
            DeviceType::PowerSwitch | DeviceType::PowerSwitchMeter => {
                let reading = parse_power_switch_meter_status(&info.status);
                Self::PowerSwitchMeter { info, reading }
            }
            _ => Self::Generic(info),
        }
    }

    /// Builds a device from one `senrows` entry of `deviceListGet`.
    pub fn from_record(record: &JsonValue) -> Result<Self, RecordError> {
        let obj = record.as_object().ok_or(RecordError::NotAnObject)?;
        let type_code = obj
            .get("type")
            .and_then(json_uint)
            .ok_or(RecordError::MissingType)?;
        let raw_id = field_str(obj, "id");
        let id = DeviceId::normalize(&raw_id);
        if id.as_str().is_empty() {
            return Err(RecordError::MissingId);
        }

        let info = DeviceInfo {
            id,
            raw_id,
            zone: obj.get("zone").and_then(json_u8).unwrap_or(0),
            area: obj.get("area").and_then(json_u8).unwrap_or(0),
            device_type: DeviceType::from_code(type_code),
            name: field_str(obj, "name"),
            status: field_str(obj, "status"),
            condition_ok: obj.get("cond_ok").map(json_flag).unwrap_or(false),
            battery_ok: obj.get("battery_ok").map(json_flag).unwrap_or(false),
            rssi: field_str(obj, "rssi"),
        };
        Ok(Self::from_info(info))
    }

    pub fn info(&self) -> &DeviceInfo {
        match self {
            Self::Generic(info) => info,
            Self::TemperatureSensor { info, .. } => info,
            Self::PowerSwitchMeter { info, .. } => info,
        }
    }

    pub fn identity(&self) -> &DeviceId {
        &self.info().id
    }

    pub fn classification(&self) -> DeviceType {
        self.info().device_type
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn comparable_state(&self) -> ComparableState<'_> {
        match self {
            Self::Generic(info) => ComparableState::Status(&info.status),
            Self::TemperatureSensor { temperature, .. } => {
                ComparableState::Temperature(*temperature)
            }
            Self::PowerSwitchMeter { reading, .. } => ComparableState::Power(*reading),
        }
    }
}

fn field_str(obj: &Map<String, JsonValue>, key: &str) -> String {
    obj.get(key)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

fn json_uint(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(num) => num.as_u64().or_else(|| {
            num.as_f64()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64)
                .map(|v| v as u64)
        }),
        JsonValue::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn json_u8(value: &JsonValue) -> Option<u8> {
    json_uint(value).and_then(|v| u8::try_from(v).ok())
}

fn json_flag(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(flag) => *flag,
        JsonValue::Number(num) => num.as_u64() == Some(1),
        JsonValue::String(text) => matches!(text.trim(), "1" | "true"),
        _ => false,
    }
}
