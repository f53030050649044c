//! [`Transport`] backed by `btleplug`.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::BDAddr;
use btleplug::api::Central;
use btleplug::api::CentralEvent;
use btleplug::api::Characteristic;
use btleplug::api::Manager as _;
use btleplug::api::Peripheral as _;
use btleplug::api::ScanFilter;
use btleplug::platform::Adapter;
use btleplug::platform::Manager;
use btleplug::platform::Peripheral;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::advertisement::Advertisement;
use super::transport::DisconnectSignal;
use super::transport::GattClient;
use super::transport::Transport;
use super::transport::TransportError;

const LOCATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        match e {
            btleplug::Error::PermissionDenied => TransportError::PermissionDenied,
            btleplug::Error::DeviceNotFound => TransportError::Link("device not found".to_string()),
            btleplug::Error::NotConnected => TransportError::NotConnected("peripheral".to_string()),
            btleplug::Error::TimedOut(d) => TransportError::TimedOut(d),
            btleplug::Error::NotSupported(s) => TransportError::Unsupported(s),
            btleplug::Error::RuntimeError(s) => TransportError::Other(s),
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// Connection retry policy applied inside [`Transport::establish`].
#[derive(Debug, Clone)]
pub struct BtleplugOptions {
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
    /// Delay before the second connection attempt; grows linearly after that.
    pub connect_backoff: Duration,
    /// How long [`Transport::locate`] scans for a device it has not seen yet.
    pub locate_timeout: Duration,
}

impl Default for BtleplugOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            connect_timeout: Duration::from_secs(20),
            connect_backoff: Duration::from_millis(250),
            locate_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
    options: BtleplugOptions,
}

impl BtleplugTransport {
    /// Use the first Bluetooth adapter of the host.
    pub async fn new(options: BtleplugOptions) -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::Unsupported("no Bluetooth adapter found".to_string()))?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter {}", info),
            Err(e) => warn!("Could not query Bluetooth adapter: {}", e),
        }

        Ok(Self { adapter, options })
    }

    async fn find_known(&self, address: BDAddr) -> Result<Option<Peripheral>, TransportError> {
        let peripherals = self.adapter.peripherals().await?;
        Ok(peripherals.into_iter().find(|p| p.address() == address))
    }
}

/// Run a btleplug operation with a deadline.
async fn within<T>(
    limit: Duration,
    operation: impl Future<Output = Result<T, btleplug::Error>>,
) -> Result<T, TransportError> {
    match timeout(limit, operation).await {
        Ok(result) => result.map_err(TransportError::from),
        Err(_) => Err(TransportError::TimedOut(limit)),
    }
}

fn parse_address(address: &str) -> Result<BDAddr, TransportError> {
    BDAddr::from_str(address)
        .map_err(|e| TransportError::Other(format!("invalid address {}: {}", address, e)))
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Device = Peripheral;
    type Client = BtleplugClient;

    async fn locate(&self, address: &str) -> Result<Option<Peripheral>, TransportError> {
        let address = parse_address(address)?;
        if let Some(peripheral) = self.find_known(address).await? {
            return Ok(Some(peripheral));
        }

        debug!("{} not known yet, scanning", address);
        self.adapter.start_scan(ScanFilter::default()).await?;
        let deadline = tokio::time::Instant::now() + self.options.locate_timeout;
        let mut found = None;
        while tokio::time::Instant::now() < deadline {
            sleep(LOCATE_POLL_INTERVAL).await;
            found = self.find_known(address).await?;
            if found.is_some() {
                break;
            }
        }
        self.adapter.stop_scan().await?;

        Ok(found)
    }

    async fn scan(
        &self,
        duration: Duration,
    ) -> Result<Vec<(Peripheral, Advertisement)>, TransportError> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        self.adapter.stop_scan().await?;

        let mut found = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };
            let advertisement = Advertisement {
                address: properties.address.to_string(),
                local_name: properties.local_name,
                manufacturer_data: properties.manufacturer_data,
                rssi: properties.rssi,
            };
            found.push((peripheral, advertisement));
        }

        Ok(found)
    }

    fn address(&self, device: &Peripheral) -> String {
        device.address().to_string()
    }

    async fn close_stale(&self, address: &str) -> Result<(), TransportError> {
        let Some(peripheral) = self.find_known(parse_address(address)?).await? else {
            return Ok(());
        };
        if peripheral.is_connected().await? {
            info!("Closing stale connection to {}", address);
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn establish(
        &self,
        device: &Peripheral,
        on_disconnect: DisconnectSignal,
    ) -> Result<BtleplugClient, TransportError> {
        // Subscribe before connecting so a drop right after connect is not missed
        let mut events = self.adapter.events().await?;
        let address = device.address();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match within(self.options.connect_timeout, device.connect()).await {
                Ok(()) => break,
                Err(e) => e,
            };
            if attempt >= self.options.connect_attempts {
                return Err(error);
            }
            warn!(
                "Connecting to {} failed (attempt {}/{}): {}",
                address, attempt, self.options.connect_attempts, error
            );
            sleep(self.options.connect_backoff * attempt).await;
        }

        if let Err(e) = within(self.options.connect_timeout, device.discover_services()).await {
            warn!("Service discovery on {} failed: {}", address, e);
            let _ = device.disconnect().await;
            return Err(e);
        }
        let characteristics: HashMap<Uuid, Characteristic> = device
            .characteristics()
            .into_iter()
            .map(|c| (c.uuid, c))
            .collect();
        debug!(
            "{} exposes {} characteristic(s)",
            address,
            characteristics.len()
        );

        let id = device.id();
        let watcher = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(peripheral) = event {
                    if peripheral == id {
                        debug!("{} disconnected", address);
                        on_disconnect.notify();
                        break;
                    }
                }
            }
        });

        Ok(BtleplugClient {
            peripheral: device.clone(),
            characteristics,
            watcher,
        })
    }
}

/// A connected peripheral with its discovered characteristics.
pub struct BtleplugClient {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
    /// Forwards link loss to the disconnect signal
    watcher: JoinHandle<()>,
}

#[async_trait]
impl GattClient for BtleplugClient {
    fn characteristics(&self) -> Vec<Uuid> {
        self.characteristics.keys().copied().collect()
    }

    async fn read(&mut self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self
            .characteristics
            .get(&uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))?;

        self.peripheral
            .read(characteristic)
            .await
            .map_err(|e| match e {
                btleplug::Error::NoSuchCharacteristic => {
                    TransportError::CharacteristicNotFound(uuid)
                }
                other => other.into(),
            })
    }

    async fn clear_cache(&mut self) {
        self.characteristics.clear();
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn rssi(&self) -> Option<i16> {
        self.peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.rssi)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.watcher.abort();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BtleplugClient {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
