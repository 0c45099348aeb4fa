//! Event payload types and the enumerated forward-compatible fields they
//! carry. Every variant's timestamp is ISO-8601 with fractional seconds;
//! a timestamp that fails to parse is a decoder error (see
//! [`super::decoder`]).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// `objectPresent.state` and `waterPresent.state` share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    NotPresent,
    Present,
    Unknown(String),
}

impl<'de> Deserialize<'de> for PresenceState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "NOT_PRESENT" => Self::NotPresent,
            "PRESENT" => Self::Present,
            _ => Self::Unknown(raw),
        })
    }
}

/// `networkStatus.transmissionMode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionMode {
    Low,
    High,
    Unknown(String),
}

impl<'de> Deserialize<'de> for TransmissionMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "LOW_POWER_STANDARD_MODE" => Self::Low,
            "HIGH_POWER_BOOST_MODE" => Self::High,
            _ => Self::Unknown(raw),
        })
    }
}

/// `connectionStatus.connection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    Ethernet,
    Cellular,
    Offline,
    Unknown(String),
}

impl<'de> Deserialize<'de> for ConnectionKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "ETHERNET" => Self::Ethernet,
            "CELLULAR" => Self::Cellular,
            "OFFLINE" => Self::Offline,
            _ => Self::Unknown(raw),
        })
    }
}

/// `connectionStatus.available` entries. Unlike [`ConnectionKind`], this
/// field has no `Unknown` arm: the spec calls for silently filtering out
/// illegal entries (the server occasionally emits `"OFFLINE"` here, which
/// is not a legal member of the available-transports list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailableConnection {
    Ethernet,
    Cellular,
}

impl AvailableConnection {
    fn known(raw: &str) -> Option<Self> {
        match raw {
            "ETHERNET" => Some(Self::Ethernet),
            "CELLULAR" => Some(Self::Cellular),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchEvent {
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureEvent {
    pub update_time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPresentEvent {
    pub update_time: DateTime<Utc>,
    pub state: PresenceState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumidityEvent {
    pub update_time: DateTime<Utc>,
    pub temperature: f64,
    pub relative_humidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPresentCountEvent {
    pub update_time: DateTime<Utc>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchCountEvent {
    pub update_time: DateTime<Utc>,
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterPresentEvent {
    pub update_time: DateTime<Utc>,
    pub state: PresenceState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatusEvent {
    pub update_time: DateTime<Utc>,
    pub signal_strength: i64,
    pub rssi: i64,
    pub transmission_mode: TransmissionMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStatusEvent {
    pub update_time: DateTime<Utc>,
    pub percentage: i64,
}

/// The one variant whose payload lives directly in `data`, one layer
/// shallower than every other variant.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsChangedEvent {
    #[serde(default)]
    pub added: HashMap<String, String>,
    #[serde(default)]
    pub modified: HashMap<String, String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConnectionStatusEvent {
    pub update_time: DateTime<Utc>,
    pub connection: ConnectionKind,
    pub available: Vec<AvailableConnection>,
}

impl<'de> Deserialize<'de> for ConnectionStatusEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            update_time: DateTime<Utc>,
            connection: ConnectionKind,
            #[serde(default)]
            available: Vec<String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Self {
            update_time: raw.update_time,
            connection: raw.connection,
            available: raw
                .available
                .iter()
                .filter_map(|s| AvailableConnection::known(s))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetStatusEvent {
    pub update_time: DateTime<Utc>,
    pub mac_address: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellularStatusEvent {
    pub update_time: DateTime<Utc>,
    pub signal_strength: i64,
}

/// A decoded event payload, tagged by the `eventType` that produced it.
/// `Unknown` carries the raw `eventType` string for logging; the stream
/// drops it without invoking any callback.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Touch(TouchEvent),
    Temperature(TemperatureEvent),
    ObjectPresent(ObjectPresentEvent),
    Humidity(HumidityEvent),
    ObjectPresentCount(ObjectPresentCountEvent),
    TouchCount(TouchCountEvent),
    WaterPresent(WaterPresentEvent),
    NetworkStatus(NetworkStatusEvent),
    BatteryStatus(BatteryStatusEvent),
    LabelsChanged(LabelsChangedEvent),
    ConnectionStatus(ConnectionStatusEvent),
    EthernetStatus(EthernetStatusEvent),
    CellularStatus(CellularStatusEvent),
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_state_is_forward_compatible() {
        let v: PresenceState = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(v, PresenceState::Unknown("SOMETHING_NEW".to_string()));
    }

    #[test]
    fn available_connection_filters_illegal_entries() {
        let v: ConnectionStatusEvent = serde_json::from_value(serde_json::json!({
            "updateTime": "2021-01-01T00:00:00.000Z",
            "connection": "ETHERNET",
            "available": ["ETHERNET", "CELLULAR", "OFFLINE"],
        }))
        .unwrap();
        assert_eq!(
            v.available,
            vec![AvailableConnection::Ethernet, AvailableConnection::Cellular]
        );
    }
}
