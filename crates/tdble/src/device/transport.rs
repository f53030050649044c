use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use super::advertisement::Advertisement;

/// Errors raised by the BLE transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("bluetooth link error: {0}")]
    Link(String),

    #[error("permission denied by the bluetooth stack")]
    PermissionDenied,

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("bluetooth error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the error comes from the wireless link itself and is worth retrying.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TransportError::CharacteristicNotFound(_)
                | TransportError::NotConnected(_)
                | TransportError::TimedOut(_)
                | TransportError::Link(_)
        )
    }
}

/// Signal raised by the transport when the link drops on its own.
///
/// A disconnect that happens while nobody is waiting is remembered until the next wait.
#[derive(Debug, Clone, Default)]
pub struct DisconnectSignal(Arc<Notify>);

impl DisconnectSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.notify_one();
    }

    pub async fn disconnected(&self) {
        self.0.notified().await;
    }
}

/// A connected GATT client.
#[async_trait]
pub trait GattClient: Send + Sync {
    /// UUIDs of the characteristics discovered on this connection.
    fn characteristics(&self) -> Vec<Uuid>;

    /// Read the current value of a characteristic.
    async fn read(&mut self, uuid: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Forget the discovered characteristics so the next connection rediscovers them.
    async fn clear_cache(&mut self);

    /// Whether the underlying link is still up.
    async fn is_connected(&self) -> bool;

    /// Received signal strength of the link in dBm, if known.
    async fn rssi(&self) -> Option<i16>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Trait for locating and connecting to devices
///
/// This trait allows for mocking the Bluetooth stack for testing purposes
#[async_trait]
pub trait Transport: Send + Sync {
    /// Handle to a connectable device
    type Device: Send + Sync;
    type Client: GattClient;

    /// Look up a device by address. `None` means it is not currently reachable.
    async fn locate(&self, address: &str) -> Result<Option<Self::Device>, TransportError>;

    /// Listen for advertisements for `duration` and return every device seen.
    async fn scan(
        &self,
        duration: Duration,
    ) -> Result<Vec<(Self::Device, Advertisement)>, TransportError>;

    /// Bluetooth address of a device handle.
    fn address(&self, device: &Self::Device) -> String;

    /// Drop any connection the stack still holds for `address`.
    async fn close_stale(&self, address: &str) -> Result<(), TransportError>;

    /// Connect to a device, retrying at the transport level.
    ///
    /// `on_disconnect` must be notified if the link drops after this returns.
    async fn establish(
        &self,
        device: &Self::Device,
        on_disconnect: DisconnectSignal,
    ) -> Result<Self::Client, TransportError>;
}

#[cfg(test)]
pub use mock::MockDevice;
#[cfg(test)]
pub use mock::MockTransport;
#[cfg(test)]
pub use mock::ReadBehavior;
