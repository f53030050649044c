use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

/// Company identifier the sensors advertise under.
pub const DEFAULT_COMPANY_ID: u16 = 0xFFFF;

/// Manufacturer-data payload the sensors advertise.
pub const DEFAULT_SIGNATURE: &[u8] = b"TDWLB";

/// A BLE advertisement as seen during a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Advertisement {
    pub address: String,
    pub local_name: Option<String>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub rssi: Option<i16>,
}

/// Decides whether an advertisement comes from a supported sensor.
///
/// A device matches when its manufacturer data holds an entry for the company id whose payload
/// is exactly the signature.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AdvertisementFilter {
    #[serde(default = "default_company_id")]
    pub company_id: u16,

    #[serde(default = "default_signature")]
    pub signature: Vec<u8>,
}

fn default_company_id() -> u16 {
    DEFAULT_COMPANY_ID
}

fn default_signature() -> Vec<u8> {
    DEFAULT_SIGNATURE.to_vec()
}

impl Default for AdvertisementFilter {
    fn default() -> Self {
        Self {
            company_id: default_company_id(),
            signature: default_signature(),
        }
    }
}

impl AdvertisementFilter {
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        let supported = advertisement
            .manufacturer_data
            .get(&self.company_id)
            .is_some_and(|payload| payload.as_slice() == self.signature.as_slice());

        if !supported {
            debug!(
                "Unsupported device '{}' ({}) manufacturer data: {:?}",
                advertisement.local_name.as_deref().unwrap_or_default(),
                advertisement.address,
                advertisement.manufacturer_data
            );
        }
        supported
    }
}
