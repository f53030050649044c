use std::collections::BTreeMap;

use serde::Serialize;
use strum::Display;
use strum::EnumString;

use super::identity::DeviceIdentity;
use super::identity::short_address;

/// Keys of the sensor map. These names are a stable contract for consumers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SensorKey {
    /// Degrees Celsius
    Temperature,
    /// PSI
    Pressure,
    /// PSI
    #[strum(serialize = "maxpressure")]
    #[serde(rename = "maxpressure")]
    MaxPressure,
    /// Percent
    Battery,
    /// dBm, from the link layer rather than GATT
    SignalStrength,
}

/// Sensor readings keyed by [`SensorKey`]. `None` means the characteristic was read but held no
/// valid value.
pub type SensorMap = BTreeMap<SensorKey, Option<f64>>;

/// Result of one successful update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub sensors: SensorMap,
}

impl DeviceSnapshot {
    pub fn new(identity: DeviceIdentity, sensors: SensorMap) -> Self {
        Self { identity, sensors }
    }

    pub fn sensor(&self, key: SensorKey) -> Option<f64> {
        self.sensors.get(&key).copied().flatten()
    }

    /// Name, or the product name if the device never reported one.
    pub fn friendly_name(&self) -> &str {
        if self.identity.name.is_empty() {
            self.identity.model.product_name()
        } else {
            &self.identity.name
        }
    }

    /// Serial number when known, otherwise the short address.
    pub fn identifier(&self) -> String {
        if self.identity.serial.is_empty() {
            short_address(&self.identity.address)
        } else {
            self.identity.serial.clone()
        }
    }

    /// Title used when presenting a discovered device.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.friendly_name(), self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::device::device_type::DeviceType;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            address: "C4:7F:51:0A:B2:3E".to_string(),
            manufacturer: "Transducers Direct".to_string(),
            fw_version: "1.4.2".to_string(),
            model: DeviceType::PressureLcr03f,
            name: String::new(),
            serial: String::new(),
            first_sync_complete: true,
        }
    }

    #[test]
    fn test_sensor_key_names() {
        assert_eq!(SensorKey::MaxPressure.to_string(), "maxpressure");
        assert_eq!(SensorKey::SignalStrength.to_string(), "signal_strength");
        assert_eq!(
            SensorKey::from_str("maxpressure").unwrap(),
            SensorKey::MaxPressure
        );
        assert!(SensorKey::from_str("humidity").is_err());
    }

    #[test]
    fn test_naming_without_serial() {
        let snapshot = DeviceSnapshot::new(identity(), SensorMap::new());
        assert_eq!(snapshot.friendly_name(), "Pressure LCR03F");
        assert_eq!(snapshot.identifier(), "B23E");
        assert_eq!(snapshot.display_name(), "Pressure LCR03F (B23E)");
    }

    #[test]
    fn test_naming_with_serial() {
        let mut identity = identity();
        identity.name = "Tank 3".to_string();
        identity.serial = "LC0012345".to_string();
        let snapshot = DeviceSnapshot::new(identity, SensorMap::new());
        assert_eq!(snapshot.display_name(), "Tank 3 (LC0012345)");
    }

    #[test]
    fn test_snapshot_json() {
        let mut sensors = SensorMap::new();
        sensors.insert(SensorKey::Pressure, Some(10.0));
        sensors.insert(SensorKey::MaxPressure, None);
        let snapshot = DeviceSnapshot::new(identity(), sensors);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["address"], "C4:7F:51:0A:B2:3E");
        assert_eq!(json["model"]["kind"], "pressure_lcr03f");
        assert_eq!(json["sensors"]["pressure"], 10.0);
        assert!(json["sensors"]["maxpressure"].is_null());
        assert!(json["sensors"].get("battery").is_none());

        assert_eq!(snapshot.sensor(SensorKey::Pressure), Some(10.0));
        assert_eq!(snapshot.sensor(SensorKey::MaxPressure), None);
    }
}
