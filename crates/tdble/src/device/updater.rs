use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::catalog::Discovered;
use super::catalog::IdentityCharacteristic;
use super::connection::ConnectionManager;
use super::connection::Session;
use super::identity::DeviceIdentity;
use super::snapshot::DeviceSnapshot;
use super::snapshot::SensorKey;
use super::snapshot::SensorMap;
use super::transport::GattClient;
use super::transport::Transport;
use super::transport::TransportError;

/// Attempts allowed while a device is being discovered.
pub const DEFAULT_DISCOVERY_MAX_ATTEMPTS: u32 = 2;

/// Attempts allowed once a device has answered at least once.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Deadline for the read phase of a single attempt.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("device {0} not found")]
    NotReady(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("device disconnected during update")]
    DisconnectedDuringUpdate,

    #[error("update timed out after {0:?}")]
    Timeout(Duration),
}

impl UpdateError {
    /// Only failures of the link itself are retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateError::NotReady(_) => false,
            UpdateError::Transport(e) => e.is_connectivity(),
            UpdateError::DisconnectedDuringUpdate | UpdateError::Timeout(_) => true,
        }
    }
}

/// Tunables for [`DeviceUpdater`].
#[derive(Debug, Clone)]
pub struct UpdaterOptions {
    pub max_attempts: u32,
    pub update_timeout: Duration,
    /// Keep the connection open between updates.
    pub persistent: bool,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_DISCOVERY_MAX_ATTEMPTS,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            persistent: false,
        }
    }
}

/// Polls one device.
///
/// The updater owns the device's identity, which is filled in during the first successful
/// update and reused afterwards, and the connection to the device.
pub struct DeviceUpdater<T: Transport> {
    connection: ConnectionManager<T>,
    identity: Option<DeviceIdentity>,
    max_attempts: u32,
    update_timeout: Duration,
}

impl<T: Transport> DeviceUpdater<T> {
    pub fn new(transport: T, options: UpdaterOptions) -> Self {
        Self {
            connection: ConnectionManager::new(transport, options.persistent),
            identity: None,
            max_attempts: options.max_attempts.max(1),
            update_timeout: options.update_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        self.connection.transport()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    /// Identity as known so far.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Connect to the device, read it and return a snapshot.
    ///
    /// The whole sequence is retried on connectivity errors until `max_attempts` attempts have
    /// been made; the last error is returned. Other errors are returned immediately.
    pub async fn update_device(
        &mut self,
        device: &T::Device,
    ) -> Result<DeviceSnapshot, UpdateError> {
        let address = self.connection.transport().address(device);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                "Updating {} (attempt {}/{})",
                address, attempt, self.max_attempts
            );

            match self.attempt_update(device, &address).await {
                Ok(snapshot) => {
                    debug!("Updated {} on attempt {}", address, attempt);
                    return Ok(snapshot);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "Update of {} failed (attempt {}/{}): {}, retrying",
                        address, attempt, self.max_attempts, e
                    );
                }
                Err(e) => {
                    warn!(
                        "Update of {} failed after {} attempt(s): {}",
                        address, attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Close the connection, also in persistent mode.
    pub async fn disconnect(&mut self, address: &str) {
        self.connection.disconnect(address).await;
    }

    async fn attempt_update(
        &mut self,
        device: &T::Device,
        address: &str,
    ) -> Result<DeviceSnapshot, UpdateError> {
        let session = self.connection.acquire(device).await?;
        let identity = self
            .identity
            .get_or_insert_with(|| DeviceIdentity::new(address));

        let disconnect = session.disconnect_signal();
        let timeout = self.update_timeout;
        let result = tokio::select! {
            biased;

            _ = disconnect.disconnected() => Err(UpdateError::DisconnectedDuringUpdate),
            fetched = tokio::time::timeout(timeout, fetch(session, identity)) => match fetched {
                Ok(result) => result,
                Err(_) => Err(UpdateError::Timeout(timeout)),
            },
        };

        self.connection.release(address, result.is_err()).await;
        result
    }
}

/// Read identity then sensors over an established session.
async fn fetch<C: GattClient>(
    session: &mut Session<C>,
    identity: &mut DeviceIdentity,
) -> Result<DeviceSnapshot, UpdateError> {
    let discovered = Discovered::from_uuids(session.characteristics());

    for characteristic in IdentityCharacteristic::ALL {
        if !identity.needs(characteristic) {
            continue;
        }
        if !discovered.has_identity(characteristic) {
            identity.mark_absent(characteristic);
            continue;
        }
        let payload = session.read(characteristic.uuid()).await?;
        identity.apply(characteristic, &payload);
    }
    identity.finish_fetch();

    let mut sensors = SensorMap::new();
    for characteristic in discovered.sensors {
        let payload = session.read(characteristic.uuid()).await?;
        let value = match characteristic.decode_spec().decode(&payload) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                warn!(
                    "Discarding out-of-range {} reading from {}",
                    characteristic.key(),
                    identity.address
                );
                None
            }
            Err(e) => {
                warn!(
                    "Failed to decode {} from {}: {}",
                    characteristic.key(),
                    identity.address,
                    e
                );
                None
            }
        };
        sensors.insert(characteristic.key(), value);
    }

    if let Some(rssi) = session.rssi().await {
        sensors.insert(SensorKey::SignalStrength, Some(f64::from(rssi)));
    }

    info!(
        "Read {} ({}): {:?}",
        identity.name, identity.address, sensors
    );
    Ok(DeviceSnapshot::new(identity.clone(), sensors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::catalog::BATTERY_LEVEL_UUID;
    use crate::device::catalog::DEVICE_NAME_UUID;
    use crate::device::catalog::FIRMWARE_REVISION_UUID;
    use crate::device::catalog::MANUFACTURER_NAME_UUID;
    use crate::device::catalog::MAX_PRESSURE_UUID;
    use crate::device::catalog::MODEL_NUMBER_UUID;
    use crate::device::catalog::PRESSURE_UUID;
    use crate::device::catalog::SERIAL_NUMBER_UUID;
    use crate::device::catalog::TEMPERATURE_UUID;
    use crate::device::device_type::DeviceType;
    use crate::device::transport::MockDevice;
    use crate::device::transport::MockTransport;
    use crate::device::transport::ReadBehavior;

    const ADDRESS: &str = "C4:7F:51:0A:B2:3E";

    fn device() -> MockDevice {
        MockDevice {
            address: ADDRESS.to_string(),
        }
    }

    fn lcr03f() -> MockTransport {
        MockTransport::new()
            .with_value(MANUFACTURER_NAME_UUID, b"Transducers Direct")
            .with_value(MODEL_NUMBER_UUID, b"TDWLB-LCR03F")
            .with_value(SERIAL_NUMBER_UUID, b"Serial Number")
            .with_value(DEVICE_NAME_UUID, b"")
            .with_value(FIRMWARE_REVISION_UUID, b"1.4.2")
            .with_value(PRESSURE_UUID, &[0x00, 0x64])
            .with_value(MAX_PRESSURE_UUID, &[0x7F, 0xFF])
            .with_value(BATTERY_LEVEL_UUID, &[0x32])
    }

    fn options(max_attempts: u32) -> UpdaterOptions {
        UpdaterOptions {
            max_attempts,
            update_timeout: Duration::from_secs(5),
            persistent: false,
        }
    }

    #[tokio::test]
    async fn test_full_update() {
        let transport = lcr03f();
        transport.state().rssi = Some(-67);
        let mut updater = DeviceUpdater::new(transport.clone(), options(2));

        let snapshot = updater.update_device(&device()).await.unwrap();

        assert_eq!(snapshot.identity.manufacturer, "Transducers Direct");
        assert_eq!(snapshot.identity.model, DeviceType::PressureLcr03f);
        assert_eq!(snapshot.identity.serial, "");
        assert_eq!(snapshot.identity.name, "Pressure LCR03F B23E");
        assert_eq!(snapshot.identity.fw_version, "1.4.2");
        assert!(snapshot.identity.first_sync_complete);

        assert_eq!(snapshot.sensors.get(&SensorKey::Pressure), Some(&Some(10.0)));
        assert_eq!(snapshot.sensors.get(&SensorKey::MaxPressure), Some(&None));
        assert_eq!(snapshot.sensors.get(&SensorKey::Battery), Some(&Some(50.0)));
        assert_eq!(
            snapshot.sensors.get(&SensorKey::SignalStrength),
            Some(&Some(-67.0))
        );
        // The device has no temperature characteristic
        assert!(!snapshot.sensors.contains_key(&SensorKey::Temperature));

        let state = transport.state();
        assert_eq!(state.open_clients, 0);
        assert_eq!(state.disconnect_count, 1);
    }

    #[tokio::test]
    async fn test_second_update_only_refreshes_firmware() {
        let transport = lcr03f();
        let mut updater = DeviceUpdater::new(transport.clone(), options(2));
        let first = updater.update_device(&device()).await.unwrap();

        transport.state().reads.clear();
        transport
            .state()
            .values
            .insert(MANUFACTURER_NAME_UUID, b"Someone Else".to_vec());
        transport
            .state()
            .values
            .insert(FIRMWARE_REVISION_UUID, b"1.5.0".to_vec());

        let second = updater.update_device(&device()).await.unwrap();

        let reads = transport.state().reads.clone();
        assert!(reads.contains(&FIRMWARE_REVISION_UUID));
        for uuid in [
            MANUFACTURER_NAME_UUID,
            MODEL_NUMBER_UUID,
            SERIAL_NUMBER_UUID,
            DEVICE_NAME_UUID,
        ] {
            assert!(!reads.contains(&uuid), "{} was re-read", uuid);
        }
        assert_eq!(second.identity.manufacturer, first.identity.manufacturer);
        assert_eq!(second.identity.name, first.identity.name);
        assert_eq!(second.identity.fw_version, "1.5.0");
    }

    #[tokio::test]
    async fn test_failed_identity_fetch_is_repeated_in_full() {
        let transport = lcr03f();
        transport.push_read_behavior(
            MODEL_NUMBER_UUID,
            ReadBehavior::Fail(TransportError::Link("reset".to_string())),
        );
        let mut updater = DeviceUpdater::new(transport.clone(), options(1));

        assert!(updater.update_device(&device()).await.is_err());
        assert!(!updater.identity().unwrap().first_sync_complete);

        transport.state().reads.clear();
        updater.update_device(&device()).await.unwrap();
        let reads = transport.state().reads.clone();
        assert!(reads.contains(&MANUFACTURER_NAME_UUID));
        assert!(reads.contains(&MODEL_NUMBER_UUID));
        assert!(updater.identity().unwrap().first_sync_complete);
    }

    #[tokio::test]
    async fn test_model_exposed_later_is_resolved() {
        let transport = MockTransport::new().with_value(PRESSURE_UUID, &[0x00, 0x64]);
        let mut updater = DeviceUpdater::new(transport.clone(), options(1));

        let first = updater.update_device(&device()).await.unwrap();
        assert_eq!(first.identity.model, DeviceType::Unresolved);
        assert_eq!(first.identity.name, "Unknown B23E");
        assert!(!first.identity.first_sync_complete);

        // A later connection sees the full service table
        let transport = transport
            .with_value(MODEL_NUMBER_UUID, b"TDWLB-LCR03F")
            .with_value(DEVICE_NAME_UUID, b"Tank 3");
        let second = updater.update_device(&device()).await.unwrap();
        assert_eq!(second.identity.model, DeviceType::PressureLcr03f);
        assert_eq!(second.identity.name, "Tank 3");
        assert!(second.identity.first_sync_complete);
        assert!(transport.state().reads.contains(&MODEL_NUMBER_UUID));
    }

    #[tokio::test]
    async fn test_retries_connectivity_errors_up_to_max_attempts() {
        let transport = lcr03f();
        for _ in 0..10 {
            transport.push_establish_failure(TransportError::Link("page timeout".to_string()));
        }
        let mut updater = DeviceUpdater::new(transport.clone(), options(3));

        let err = updater.update_device(&device()).await.unwrap_err();
        assert_eq!(
            err,
            UpdateError::Transport(TransportError::Link("page timeout".to_string()))
        );
        insta::assert_snapshot!(err.to_string(), @"bluetooth link error: page timeout");
        assert_eq!(transport.state().establish_count, 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let transport = lcr03f();
        transport.push_establish_failure(TransportError::Link("page timeout".to_string()));
        let mut updater = DeviceUpdater::new(transport.clone(), options(2));

        let snapshot = updater.update_device(&device()).await.unwrap();
        assert_eq!(snapshot.sensor(SensorKey::Pressure), Some(10.0));
        assert_eq!(transport.state().establish_count, 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_other_errors() {
        let transport = lcr03f();
        transport.push_establish_failure(TransportError::PermissionDenied);
        let mut updater = DeviceUpdater::new(transport.clone(), options(5));

        let err = updater.update_device(&device()).await.unwrap_err();
        assert_eq!(err, UpdateError::Transport(TransportError::PermissionDenied));
        assert!(!err.is_retryable());
        assert_eq!(transport.state().establish_count, 1);
    }

    #[tokio::test]
    async fn test_disconnect_mid_fetch_retries_on_fresh_connection() {
        let transport = lcr03f();
        transport.push_read_behavior(PRESSURE_UUID, ReadBehavior::DropLink);
        let mut updater = DeviceUpdater::new(transport.clone(), options(2));

        let snapshot = updater.update_device(&device()).await.unwrap();
        assert_eq!(snapshot.sensor(SensorKey::Pressure), Some(10.0));

        let state = transport.state();
        assert_eq!(state.establish_count, 2);
        assert_eq!(state.disconnect_count, 2);
        assert_eq!(state.open_clients, 0);
    }

    #[tokio::test]
    async fn test_disconnect_mid_fetch_exhausts_budget() {
        let transport = lcr03f();
        transport.push_read_behavior(PRESSURE_UUID, ReadBehavior::DropLink);
        let mut updater = DeviceUpdater::new(transport.clone(), options(1));

        let err = updater.update_device(&device()).await.unwrap_err();
        assert_eq!(err, UpdateError::DisconnectedDuringUpdate);
        assert_eq!(transport.state().open_clients, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_surfaced() {
        let transport = lcr03f();
        transport.push_read_behavior(BATTERY_LEVEL_UUID, ReadBehavior::Hang);
        transport.push_read_behavior(BATTERY_LEVEL_UUID, ReadBehavior::Hang);
        let mut updater = DeviceUpdater::new(
            transport.clone(),
            UpdaterOptions {
                max_attempts: 2,
                update_timeout: Duration::from_millis(50),
                persistent: false,
            },
        );

        let err = updater.update_device(&device()).await.unwrap_err();
        assert_eq!(err, UpdateError::Timeout(Duration::from_millis(50)));
        insta::assert_snapshot!(err.to_string(), @"update timed out after 50ms");

        let state = transport.state();
        assert_eq!(state.establish_count, 2);
        assert_eq!(state.open_clients, 0);
    }

    #[tokio::test]
    async fn test_missing_characteristic_clears_cache_and_retries() {
        let transport = lcr03f();
        transport.push_read_behavior(
            PRESSURE_UUID,
            ReadBehavior::Fail(TransportError::CharacteristicNotFound(PRESSURE_UUID)),
        );
        let mut updater = DeviceUpdater::new(transport.clone(), options(2));

        let snapshot = updater.update_device(&device()).await.unwrap();
        assert_eq!(snapshot.sensor(SensorKey::Pressure), Some(10.0));
        assert_eq!(transport.state().clear_cache_count, 1);
        assert_eq!(transport.state().establish_count, 2);
    }

    #[tokio::test]
    async fn test_bad_payload_yields_null_reading() {
        let transport = lcr03f().with_value(TEMPERATURE_UUID, &[0x01, 0x02, 0x03]);
        let mut updater = DeviceUpdater::new(transport.clone(), options(1));

        let snapshot = updater.update_device(&device()).await.unwrap();
        assert_eq!(snapshot.sensors.get(&SensorKey::Temperature), Some(&None));
        assert_eq!(snapshot.sensor(SensorKey::Pressure), Some(10.0));
    }

    #[tokio::test]
    async fn test_persistent_mode_keeps_connection() {
        let transport = lcr03f();
        let mut updater = DeviceUpdater::new(
            transport.clone(),
            UpdaterOptions {
                persistent: true,
                ..options(2)
            },
        );

        updater.update_device(&device()).await.unwrap();
        updater.update_device(&device()).await.unwrap();
        assert_eq!(transport.state().establish_count, 1);
        assert_eq!(transport.state().open_clients, 1);

        updater.disconnect(ADDRESS).await;
        assert_eq!(transport.state().open_clients, 0);
    }
}
