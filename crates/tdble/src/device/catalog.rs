//! GATT characteristics read from the device.
//!
//! The catalog is split into identity characteristics (Device Information Service and GAP
//! device name) and sensor characteristics. Each sensor characteristic carries its own
//! [`DecodeSpec`].

use tracing::trace;
use uuid::Uuid;

use super::decoder::ByteOrder;
use super::decoder::DecodeSpec;
use super::decoder::WireFormat;
use super::snapshot::SensorKey;

/// Largest pressure the transducer can report, in PSI. Larger values are fault codes.
pub const MAX_PRESSURE_PSI: f64 = 3000.0;

/// Expand a Bluetooth SIG 16-bit UUID into its 128-bit form.
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

pub const DEVICE_NAME_UUID: Uuid = sig_uuid(0x2A00);
pub const BATTERY_LEVEL_UUID: Uuid = sig_uuid(0x2A19);
pub const MODEL_NUMBER_UUID: Uuid = sig_uuid(0x2A24);
pub const SERIAL_NUMBER_UUID: Uuid = sig_uuid(0x2A25);
pub const FIRMWARE_REVISION_UUID: Uuid = sig_uuid(0x2A26);
pub const MANUFACTURER_NAME_UUID: Uuid = sig_uuid(0x2A29);
pub const PRESSURE_UUID: Uuid = sig_uuid(0x2A6D);
pub const TEMPERATURE_UUID: Uuid = sig_uuid(0x2A6E);
/// Vendor characteristic holding the peak pressure since power-up.
pub const MAX_PRESSURE_UUID: Uuid = Uuid::from_u128(0x5444_0001_7764_4c42_8000_0080_5f9b_34fb);

/// Identity characteristics, in the order they are read.
///
/// The model number comes before the device name so that a missing name can fall back to the
/// product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCharacteristic {
    Manufacturer,
    ModelNumber,
    SerialNumber,
    DeviceName,
    FirmwareRevision,
}

impl IdentityCharacteristic {
    pub const ALL: [IdentityCharacteristic; 5] = [
        IdentityCharacteristic::Manufacturer,
        IdentityCharacteristic::ModelNumber,
        IdentityCharacteristic::SerialNumber,
        IdentityCharacteristic::DeviceName,
        IdentityCharacteristic::FirmwareRevision,
    ];

    pub const fn uuid(self) -> Uuid {
        match self {
            IdentityCharacteristic::Manufacturer => MANUFACTURER_NAME_UUID,
            IdentityCharacteristic::ModelNumber => MODEL_NUMBER_UUID,
            IdentityCharacteristic::SerialNumber => SERIAL_NUMBER_UUID,
            IdentityCharacteristic::DeviceName => DEVICE_NAME_UUID,
            IdentityCharacteristic::FirmwareRevision => FIRMWARE_REVISION_UUID,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            IdentityCharacteristic::Manufacturer => "manufacturer",
            IdentityCharacteristic::ModelNumber => "model",
            IdentityCharacteristic::SerialNumber => "serial",
            IdentityCharacteristic::DeviceName => "name",
            IdentityCharacteristic::FirmwareRevision => "fw_version",
        }
    }
}

/// Sensor characteristics, in the order they are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCharacteristic {
    Temperature,
    Pressure,
    MaxPressure,
    Battery,
}

impl SensorCharacteristic {
    pub const ALL: [SensorCharacteristic; 4] = [
        SensorCharacteristic::Temperature,
        SensorCharacteristic::Pressure,
        SensorCharacteristic::MaxPressure,
        SensorCharacteristic::Battery,
    ];

    pub const fn uuid(self) -> Uuid {
        match self {
            SensorCharacteristic::Temperature => TEMPERATURE_UUID,
            SensorCharacteristic::Pressure => PRESSURE_UUID,
            SensorCharacteristic::MaxPressure => MAX_PRESSURE_UUID,
            SensorCharacteristic::Battery => BATTERY_LEVEL_UUID,
        }
    }

    pub const fn key(self) -> SensorKey {
        match self {
            SensorCharacteristic::Temperature => SensorKey::Temperature,
            SensorCharacteristic::Pressure => SensorKey::Pressure,
            SensorCharacteristic::MaxPressure => SensorKey::MaxPressure,
            SensorCharacteristic::Battery => SensorKey::Battery,
        }
    }

    pub const fn decode_spec(self) -> DecodeSpec {
        match self {
            SensorCharacteristic::Temperature => {
                DecodeSpec::new(WireFormat::Int16(ByteOrder::Big), 0.01)
            }
            SensorCharacteristic::Pressure | SensorCharacteristic::MaxPressure => {
                DecodeSpec::new(WireFormat::Int16(ByteOrder::Big), 0.1).with_max(MAX_PRESSURE_PSI)
            }
            SensorCharacteristic::Battery => DecodeSpec::new(WireFormat::Int8, 1.0),
        }
    }
}

/// A characteristic discovered on a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    Identity(IdentityCharacteristic),
    Sensor(SensorCharacteristic),
    Unrecognized(Uuid),
}

impl Characteristic {
    pub fn from_uuid(uuid: Uuid) -> Self {
        if let Some(c) = IdentityCharacteristic::ALL.into_iter().find(|c| c.uuid() == uuid) {
            return Characteristic::Identity(c);
        }
        if let Some(c) = SensorCharacteristic::ALL.into_iter().find(|c| c.uuid() == uuid) {
            return Characteristic::Sensor(c);
        }
        Characteristic::Unrecognized(uuid)
    }
}

/// The catalog entries a connection exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    pub identity: Vec<IdentityCharacteristic>,
    pub sensors: Vec<SensorCharacteristic>,
}

impl Discovered {
    /// Sort discovered UUIDs into the catalog, skipping anything it does not know.
    pub fn from_uuids(uuids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut discovered = Self::default();
        for uuid in uuids {
            match Characteristic::from_uuid(uuid) {
                Characteristic::Identity(c) => discovered.identity.push(c),
                Characteristic::Sensor(c) => discovered.sensors.push(c),
                Characteristic::Unrecognized(uuid) => {
                    trace!("Skipping unrecognized characteristic {}", uuid);
                }
            }
        }
        discovered
    }

    pub fn has_identity(&self, characteristic: IdentityCharacteristic) -> bool {
        self.identity.contains(&characteristic)
    }
}
