use serde::Serialize;
use tracing::debug;

use super::catalog::IdentityCharacteristic;
use super::device_type::DeviceType;

/// Text some platform drivers substitute for a serial number they could not read.
pub const SERIAL_PLACEHOLDER: &str = "Serial Number";

/// Identity of a device, accumulated across updates.
///
/// Everything except the firmware version is read once, during the first successful update,
/// and is then treated as fixed for as long as this value lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub address: String,
    pub manufacturer: String,
    pub fw_version: String,
    pub model: DeviceType,
    pub name: String,
    pub serial: String,
    pub first_sync_complete: bool,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn needs_full_fetch(&self) -> bool {
        !self.first_sync_complete
    }

    pub fn needs_firmware_refresh(&self) -> bool {
        true
    }

    /// Whether `characteristic` should be read during the next update.
    pub fn needs(&self, characteristic: IdentityCharacteristic) -> bool {
        match characteristic {
            IdentityCharacteristic::FirmwareRevision => self.needs_firmware_refresh(),
            _ => self.needs_full_fetch(),
        }
    }

    /// Store the payload read from an identity characteristic.
    pub fn apply(&mut self, characteristic: IdentityCharacteristic, payload: &[u8]) {
        let text = decode_text(payload);
        debug!("{}: {:?}", characteristic.name(), text);

        match characteristic {
            IdentityCharacteristic::Manufacturer => self.manufacturer = text,
            IdentityCharacteristic::ModelNumber => self.model = DeviceType::from_raw_value(&text),
            IdentityCharacteristic::SerialNumber => {
                self.serial = if text == SERIAL_PLACEHOLDER {
                    debug!("Ignoring placeholder serial number");
                    String::new()
                } else {
                    text
                };
            }
            IdentityCharacteristic::DeviceName => {
                self.name = text;
                self.fill_missing_name();
            }
            IdentityCharacteristic::FirmwareRevision => self.fw_version = text,
        }
    }

    /// Record that the connected device does not expose `characteristic`.
    pub fn mark_absent(&mut self, characteristic: IdentityCharacteristic) {
        debug!("{} characteristic not present", characteristic.name());

        // A missing model leaves the identity unresolved, so the next update fetches it again
        if characteristic == IdentityCharacteristic::DeviceName {
            self.name.clear();
            self.fill_missing_name();
        }
    }

    /// Close out the identity part of an update.
    ///
    /// The first sync only counts as complete once a model value has been obtained.
    pub fn finish_fetch(&mut self) {
        if !self.first_sync_complete && self.model.is_resolved() {
            self.first_sync_complete = true;
            debug!("First identity sync complete for {}", self.address);
        }
    }

    fn fill_missing_name(&mut self) {
        if self.name.is_empty() {
            self.name = format!(
                "{} {}",
                self.model.product_name(),
                short_address(&self.address)
            );
        }
    }
}

/// Last two octets of a Bluetooth address, upper-case, without separator.
pub fn short_address(address: &str) -> String {
    let octets: Vec<&str> = address.split([':', '-']).collect();
    let tail = if octets.len() >= 2 {
        octets[octets.len() - 2..].concat()
    } else {
        address.to_string()
    };
    tail.to_uppercase().chars().take(4).collect()
}

fn decode_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}
