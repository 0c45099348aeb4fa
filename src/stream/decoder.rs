//! Event Decoder
//!
//! Dispatches a raw event envelope `{ eventType, targetName, data }` to a
//! tagged [`DeviceEvent`] variant, pairing it with the device identifier
//! extracted from `targetName`.

use super::events::*;
use crate::error::Error;
use serde::Deserialize;

/// Wire shape of one event, as carried inside a `StreamResult` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawEventEnvelope {
    pub event_type: String,
    pub target_name: String,
    pub data: serde_json::Value,
}

/// A decoded event paired with the device it was emitted for.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub device_id: String,
    pub event: DeviceEvent,
}

/// The device identifier is the substring after the last `/` in
/// `target_name`, or empty if no `/` is present.
fn device_id(target_name: &str) -> String {
    match target_name.rsplit_once('/') {
        Some((_, id)) => id.to_string(),
        None => String::new(),
    }
}

/// Decode one envelope. For most variants the payload lives at
/// `data.<eventType>`; `labelsChanged` is the exception, with its payload
/// directly in `data`. An unknown `eventType` decodes to
/// `DeviceEvent::Unknown` rather than failing.
pub(crate) fn decode(envelope: RawEventEnvelope) -> Result<DecodedEvent, Error> {
    let id = device_id(&envelope.target_name);

    let event = match envelope.event_type.as_str() {
        "labelsChanged" => DeviceEvent::LabelsChanged(decode_field(&envelope.data)?),
        "touch" => DeviceEvent::Touch(decode_nested(&envelope.data, "touch")?),
        "temperature" => DeviceEvent::Temperature(decode_nested(&envelope.data, "temperature")?),
        "objectPresent" => {
            DeviceEvent::ObjectPresent(decode_nested(&envelope.data, "objectPresent")?)
        }
        "humidity" => DeviceEvent::Humidity(decode_nested(&envelope.data, "humidity")?),
        "objectPresentCount" => DeviceEvent::ObjectPresentCount(decode_nested(
            &envelope.data,
            "objectPresentCount",
        )?),
        "touchCount" => DeviceEvent::TouchCount(decode_nested(&envelope.data, "touchCount")?),
        "waterPresent" => {
            DeviceEvent::WaterPresent(decode_nested(&envelope.data, "waterPresent")?)
        }
        "networkStatus" => {
            DeviceEvent::NetworkStatus(decode_nested(&envelope.data, "networkStatus")?)
        }
        "batteryStatus" => {
            DeviceEvent::BatteryStatus(decode_nested(&envelope.data, "batteryStatus")?)
        }
        "connectionStatus" => {
            DeviceEvent::ConnectionStatus(decode_nested(&envelope.data, "connectionStatus")?)
        }
        "ethernetStatus" => {
            DeviceEvent::EthernetStatus(decode_nested(&envelope.data, "ethernetStatus")?)
        }
        "cellularStatus" => {
            DeviceEvent::CellularStatus(decode_nested(&envelope.data, "cellularStatus")?)
        }
        other => DeviceEvent::Unknown(other.to_string()),
    };

    Ok(DecodedEvent {
        device_id: id,
        event,
    })
}

fn decode_nested<T: serde::de::DeserializeOwned>(
    data: &serde_json::Value,
    key: &str,
) -> Result<T, Error> {
    let nested = data.get(key).cloned().unwrap_or(serde_json::Value::Null);
    decode_field(&nested)
}

fn decode_field<T: serde::de::DeserializeOwned>(value: &serde_json::Value) -> Result<T, Error> {
    serde_json::from_value(value.clone())
        .map_err(|e| Error::unknown_error(format!("failed to decode event payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_trailing_path_segment() {
        assert_eq!(device_id("projects/x/devices/D1"), "D1");
        assert_eq!(device_id("D1"), "");
    }

    #[test]
    fn touch_event_decodes_nested_payload() {
        let envelope: RawEventEnvelope = serde_json::from_value(serde_json::json!({
            "eventType": "touch",
            "targetName": "projects/x/devices/D1",
            "data": {"touch": {"updateTime": "2021-01-01T00:00:00.000Z"}},
        }))
        .unwrap();
        let decoded = decode(envelope).unwrap();
        assert_eq!(decoded.device_id, "D1");
        assert!(matches!(decoded.event, DeviceEvent::Touch(_)));
    }

    #[test]
    fn labels_changed_decodes_data_directly() {
        let envelope: RawEventEnvelope = serde_json::from_value(serde_json::json!({
            "eventType": "labelsChanged",
            "targetName": "projects/x/devices/D1",
            "data": {"added": {"k": "v"}, "modified": {}, "removed": ["x"]},
        }))
        .unwrap();
        let decoded = decode(envelope).unwrap();
        match decoded.event {
            DeviceEvent::LabelsChanged(labels) => {
                assert_eq!(labels.added.get("k"), Some(&"v".to_string()));
                assert_eq!(labels.removed, vec!["x".to_string()]);
            }
            other => panic!("expected LabelsChanged, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_dropped_gracefully() {
        let envelope: RawEventEnvelope = serde_json::from_value(serde_json::json!({
            "eventType": "somethingNew",
            "targetName": "projects/x/devices/D1",
            "data": {},
        }))
        .unwrap();
        let decoded = decode(envelope).unwrap();
        assert!(matches!(decoded.event, DeviceEvent::Unknown(ref s) if s == "somethingNew"));
    }

    #[test]
    fn bad_timestamp_is_a_decoder_error() {
        let envelope: RawEventEnvelope = serde_json::from_value(serde_json::json!({
            "eventType": "touch",
            "targetName": "projects/x/devices/D1",
            "data": {"touch": {"updateTime": "not-a-time"}},
        }))
        .unwrap();
        assert!(decode(envelope).is_err());
    }
}
