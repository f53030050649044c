//! Connection management.
//!
//! The [`ConnectionManager`] is the only owner of the transport client. It decides whether a
//! cached session can be reused, repairs stale sessions and tears sessions down according to the
//! persistence policy.

use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::transport::DisconnectSignal;
use super::transport::GattClient;
use super::transport::Transport;
use super::transport::TransportError;

/// A live connection together with the signal raised when it drops.
pub struct Session<C: GattClient> {
    client: C,
    disconnect: DisconnectSignal,
}

impl<C: GattClient> Session<C> {
    /// Characteristics discovered on this connection.
    pub fn characteristics(&self) -> Vec<Uuid> {
        self.client.characteristics()
    }

    /// Read a characteristic.
    ///
    /// A missing characteristic usually means the cached service table is out of date, so the
    /// cache is cleared before the error is returned.
    pub async fn read(&mut self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        match self.client.read(uuid).await {
            Err(e @ TransportError::CharacteristicNotFound(_)) => {
                warn!("{}, clearing characteristic cache", e);
                self.client.clear_cache().await;
                Err(e)
            }
            other => other,
        }
    }

    pub async fn rssi(&self) -> Option<i16> {
        self.client.rssi().await
    }

    pub fn disconnect_signal(&self) -> DisconnectSignal {
        self.disconnect.clone()
    }
}

/// Owns the connection to one device.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    persistent: bool,
    session: Option<Session<T::Client>>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, persistent: bool) -> Self {
        Self {
            transport,
            persistent,
            session: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a usable session for `device`, connecting if needed.
    pub async fn acquire(
        &mut self,
        device: &T::Device,
    ) -> Result<&mut Session<T::Client>, TransportError> {
        let address = self.transport.address(device);

        if let Some(session) = self.session.take() {
            if self.persistent && session.client.is_connected().await {
                debug!("Reusing connection to {}", address);
                return Ok(self.session.insert(session));
            }
            warn!("Dropping stale connection to {}", address);
            Self::teardown(session, &address).await;
        }

        self.transport.close_stale(&address).await?;

        info!("Connecting to {}", address);
        let disconnect = DisconnectSignal::new();
        let client = self.transport.establish(device, disconnect.clone()).await?;
        debug!("Connected to {}", address);

        Ok(self.session.insert(Session { client, disconnect }))
    }

    /// Hand the session back after an update.
    ///
    /// Persistent mode keeps a session that completed an update; everything else is torn down.
    pub async fn release(&mut self, address: &str, failed: bool) {
        if self.persistent && !failed {
            debug!("Keeping connection to {} open", address);
            return;
        }
        if let Some(session) = self.session.take() {
            Self::teardown(session, address).await;
        }
    }

    /// Tear down the session regardless of the persistence policy.
    pub async fn disconnect(&mut self, address: &str) {
        match self.session.take() {
            Some(session) => Self::teardown(session, address).await,
            None => debug!("No connection to {} to close", address),
        }
    }

    async fn teardown(mut session: Session<T::Client>, address: &str) {
        match session.client.disconnect().await {
            Ok(()) => debug!("Disconnected from {}", address),
            Err(e) => warn!("Error disconnecting from {}: {}", address, e),
        }
    }
}
