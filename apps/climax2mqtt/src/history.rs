use crate::device::DeviceId;
use crate::status::parse_leading_float;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const PANEL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryKey {
    ActivePower,
    Energy,
    Temperature,
    Other(String),
}

impl HistoryKey {
    fn from_label(label: &str) -> Self {
        match label.trim() {
            "Active Power" => Self::ActivePower,
            "Energy" => Self::Energy,
            "Temperature" => Self::Temperature,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::ActivePower => "Active Power",
            Self::Energy => "Energy",
            Self::Temperature => "Temperature",
            Self::Other(label) => label,
        }
    }
}

impl<'de> Deserialize<'de> for HistoryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Self::from_label(&label))
    }
}

impl Serialize for HistoryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One row of the panel's `historyGet` response. Timestamps are panel local
/// time with no offset attached.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceHistory {
    #[serde(rename = "device_id", default)]
    pub raw_id: String,
    #[serde(with = "panel_datetime")]
    pub datetime: NaiveDateTime,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub name: String,
    pub key: HistoryKey,
    #[serde(default)]
    pub value: String,
}

impl DeviceHistory {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::normalize(&self.raw_id)
    }

    /// Leading number of `value`, e.g. `0.0` for `"0.0W"`.
    pub fn numeric_value(&self) -> Option<f64> {
        parse_leading_float(&self.value)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryEnvelope {
    #[serde(rename = "Hisrows", alias = "hisrows", default)]
    pub(crate) rows: Vec<DeviceHistory>,
}

mod panel_datetime {
    use super::PANEL_DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(raw.trim(), PANEL_DATETIME_FORMAT)
            .map_err(serde::de::Error::custom)
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(PANEL_DATETIME_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn parses_panel_history_row() {
        let raw = r#"{"datetime": "2024-03-26 08:33:46", "area": "1", "zone": "3", "name": "", "device_id": "ZB:b02a01", "key": "Active Power", "value": "0.0W" }"#;
        let row: DeviceHistory = serde_json::from_str(raw).expect("history row");
        assert_eq!(row.device_id().as_str(), "ZBb02a01");
        assert_eq!(
            row.datetime,
            NaiveDate::from_ymd_opt(2024, 3, 26)
                .and_then(|d| d.and_hms_opt(8, 33, 46))
                .expect("valid date")
        );
        assert_eq!(row.key, HistoryKey::ActivePower);
        assert_eq!(row.zone, "3");
        assert_eq!(row.numeric_value(), Some(0.0));
    }

    #[test]
    fn unknown_keys_are_kept() {
        let raw = r#"{"datetime": "2024-03-26 08:33:46", "device_id": "ZB:1", "key": "Humidity", "value": "40 %"}"#;
        let row: DeviceHistory = serde_json::from_str(raw).expect("history row");
        assert_eq!(row.key, HistoryKey::Other("Humidity".to_string()));
        assert_eq!(row.numeric_value(), Some(40.0));
    }

    #[test]
    fn rejects_bad_timestamps() {
        let raw = r#"{"datetime": "yesterday", "device_id": "ZB:1", "key": "Energy", "value": "1kWh"}"#;
        assert!(serde_json::from_str::<DeviceHistory>(raw).is_err());
    }

    #[test]
    fn envelope_reads_hisrows() {
        let raw = r#"{"Hisrows": [{"datetime": "2024-03-26 08:33:46", "device_id": "ZB:1", "key": "Temperature", "value": "6.5 °C"}]}"#;
        let envelope: HistoryEnvelope = serde_json::from_str(raw).expect("envelope");
        assert_eq!(envelope.rows.len(), 1);
        assert_eq!(envelope.rows[0].key, HistoryKey::Temperature);

        let serialized = serde_json::to_value(&envelope.rows[0]).expect("serialize");
        assert_eq!(serialized["datetime"], "2024-03-26 08:33:46");
        assert_eq!(serialized["key"], "Temperature");
    }
}
