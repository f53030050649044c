//! Discovery of nearby sensors.
//!
//! Scans for advertisements, keeps the ones passing the [`AdvertisementFilter`] and identifies
//! each device with a short-lived [`DeviceUpdater`] so it can be presented by name.

use std::time::Duration;

use tracing::error;
use tracing::info;

use super::advertisement::Advertisement;
use super::advertisement::AdvertisementFilter;
use super::snapshot::DeviceSnapshot;
use super::transport::Transport;
use super::updater::DeviceUpdater;
use super::updater::UpdateError;
use super::updater::UpdaterOptions;

/// A supported device found during a scan.
#[derive(Debug)]
pub struct Discovery {
    pub advertisement: Advertisement,
    /// Snapshot read while identifying the device, or why that failed.
    pub result: Result<DeviceSnapshot, UpdateError>,
}

impl Discovery {
    /// Title for the device, falling back to the advertised name when it could not be read.
    pub fn title(&self) -> String {
        match &self.result {
            Ok(snapshot) => snapshot.display_name(),
            Err(_) => self
                .advertisement
                .local_name
                .clone()
                .unwrap_or_else(|| self.advertisement.address.clone()),
        }
    }
}

/// Scan for `duration` and identify every supported device found.
///
/// `options` should carry the discovery attempt cap. A device that cannot be read is still
/// reported, with its error.
pub async fn discover<T>(
    transport: &T,
    filter: &AdvertisementFilter,
    duration: Duration,
    options: &UpdaterOptions,
) -> Result<Vec<Discovery>, UpdateError>
where
    T: Transport + Clone,
{
    let found = transport.scan(duration).await?;
    info!("Scan found {} device(s)", found.len());

    let mut discoveries = Vec::new();
    for (device, advertisement) in found {
        if !filter.matches(&advertisement) {
            continue;
        }

        info!("Identifying {}", advertisement.address);
        let mut updater = DeviceUpdater::new(transport.clone(), options.clone());
        let result = updater.update_device(&device).await;
        if let Err(e) = &result {
            error!(
                "Error connecting to and getting data from {}: {}",
                advertisement.address, e
            );
        }
        updater.disconnect(&advertisement.address).await;

        discoveries.push(Discovery {
            advertisement,
            result,
        });
    }

    Ok(discoveries)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::device::catalog::MODEL_NUMBER_UUID;
    use crate::device::catalog::PRESSURE_UUID;
    use crate::device::catalog::SERIAL_NUMBER_UUID;
    use crate::device::transport::MockTransport;
    use crate::device::transport::TransportError;

    fn advertisement(address: &str, data: &[u8]) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            local_name: Some("TDWLB".to_string()),
            manufacturer_data: HashMap::from([(0xFFFF, data.to_vec())]),
            rssi: Some(-60),
        }
    }

    #[tokio::test]
    async fn test_discover_identifies_supported_devices() {
        let transport = MockTransport::new()
            .with_value(MODEL_NUMBER_UUID, b"TDWLB-LCR03F")
            .with_value(SERIAL_NUMBER_UUID, b"LC0012345")
            .with_value(PRESSURE_UUID, &[0x00, 0x64]);
        transport.state().advertisements = vec![
            advertisement("C4:7F:51:0A:B2:3E", b"TDWLB"),
            advertisement("11:22:33:44:55:66", b"other"),
        ];

        let discoveries = discover(
            &transport,
            &AdvertisementFilter::default(),
            Duration::from_millis(10),
            &UpdaterOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(discoveries.len(), 1);
        assert_eq!(
            discoveries[0].title(),
            "Pressure LCR03F B23E (LC0012345)"
        );
        assert_eq!(transport.state().open_clients, 0);
    }

    #[tokio::test]
    async fn test_discover_reports_unreachable_devices() {
        let transport = MockTransport::new();
        transport.state().advertisements = vec![advertisement("C4:7F:51:0A:B2:3E", b"TDWLB")];
        for _ in 0..2 {
            transport.push_establish_failure(TransportError::Link("page timeout".to_string()));
        }

        let discoveries = discover(
            &transport,
            &AdvertisementFilter::default(),
            Duration::from_millis(10),
            &UpdaterOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(discoveries.len(), 1);
        assert!(discoveries[0].result.is_err());
        assert_eq!(discoveries[0].title(), "TDWLB");
        assert_eq!(transport.state().establish_count, 2);
    }
}
